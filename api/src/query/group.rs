use serde_json::Value;

use crate::store::PipelineStage;

/// Aggregation grouping parsed from the `group_by` parameter: bucket by one
/// field's value and count members per bucket, largest buckets first.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSpec {
    pub field: String,
}

impl GroupSpec {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    /// Aggregation pipeline: pre-filter match stage, bucket-count on the
    /// group field, counts descending.
    pub fn pipeline(&self, match_query: Value) -> Vec<PipelineStage> {
        vec![
            PipelineStage::Match(match_query),
            PipelineStage::Group {
                by: self.field.clone(),
            },
            PipelineStage::Sort {
                field: "count".to_string(),
                descending: true,
            },
        ]
    }
}
