use std::collections::BTreeSet;

use serde_json::{Map, Value};

/// Inclusion projection parsed from the `select` parameter. An empty or
/// absent parameter means no restriction; otherwise the identity field `id`
/// is always part of the projection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    fields: Option<BTreeSet<String>>,
}

impl Projection {
    pub fn parse(param: Option<&str>) -> Projection {
        let fields: BTreeSet<String> = param
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect();
        if fields.is_empty() {
            Projection { fields: None }
        } else {
            Projection::from_set(fields)
        }
    }

    pub fn from_fields(fields: &[&str]) -> Projection {
        Projection::from_set(fields.iter().map(|f| f.to_string()).collect())
    }

    fn from_set(mut fields: BTreeSet<String>) -> Projection {
        fields.insert("id".to_string());
        Projection {
            fields: Some(fields),
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.fields.is_none()
    }

    pub fn with_field(mut self, field: &str) -> Projection {
        if let Some(fields) = &mut self.fields {
            fields.insert(field.to_string());
        }
        self
    }

    /// Projection document for the store (`{"field": 1, ...}`), or None when
    /// unrestricted.
    pub fn to_doc(&self) -> Option<Value> {
        self.fields.as_ref().map(|fields| {
            let mut doc = Map::new();
            for field in fields {
                doc.insert(field.clone(), Value::from(1));
            }
            Value::Object(doc)
        })
    }

    /// Applies the projection to an already-fetched document.
    pub fn apply(&self, doc: Value) -> Value {
        let Some(fields) = &self.fields else {
            return doc;
        };
        let Value::Object(map) = doc else {
            return doc;
        };
        let projected: Map<String, Value> = map
            .into_iter()
            .filter(|(k, _)| fields.contains(k) || k == "_id")
            .collect();
        Value::Object(projected)
    }
}
