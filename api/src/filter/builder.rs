//! Rewrites parsed filter expressions into predicates.
//!
//! Most fields map to a plain comparison, but a number of field names carry
//! domain semantics from the upstream bibliographic schema (array fields
//! matched element-wise, existence shortcuts, a source that may live in two
//! document locations). Those rewrites live in one rule table so new special
//! cases are data rather than control flow.

use serde_json::Value;

use super::parser::parse_filter;
use super::types::{FilterExpression, FilterOperand, FilterOperator, FilterValue};
use crate::query::{CmpOp, Predicate};

#[derive(Debug, Clone, Copy)]
enum FieldPattern {
    Exact(&'static str),
    Prefix(&'static str),
}

impl FieldPattern {
    fn matches(&self, field: &str) -> bool {
        match self {
            FieldPattern::Exact(name) => field == *name,
            FieldPattern::Prefix(prefix) => field.starts_with(prefix),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum RewriteRule {
    /// Element-match over an array field, matching the path minus its first
    /// segment. Requires at least `min_segments` path segments.
    ElemMatchRest {
        array: &'static str,
        min_segments: usize,
    },
    /// Element-match over an array field on the second path segment.
    ElemMatchSecond { array: &'static str },
    /// A source may appear in the primary location or any alternate
    /// location; match either.
    DualLocationSource,
    /// Boolean flag backed by field existence.
    ExistsAt { path: &'static str },
    /// Boolean flag backed by plain equality at another path. `has_pdf`
    /// deliberately shares `open_access.is_oa` with the open-access flags,
    /// matching upstream behavior.
    EqualsAt { path: &'static str },
    /// Boolean flag backed by an existing, non-empty array.
    NonEmptyAt { path: &'static str },
    /// Comparison applied to a different path (publication-date bounds).
    CompareAt { path: &'static str },
    /// Equality on the lower-cased value.
    LowercaseEquals,
    /// Citation filter: equality on the referenced-works list, extracting a
    /// short `W`-prefixed id from a possible full URI.
    CitedWork { path: &'static str },
}

const REWRITE_RULES: &[(FieldPattern, RewriteRule)] = &[
    (
        FieldPattern::Prefix("authorships."),
        RewriteRule::ElemMatchRest {
            array: "authorships",
            min_segments: 3,
        },
    ),
    (
        FieldPattern::Prefix("institutions."),
        RewriteRule::ElemMatchSecond {
            array: "institutions",
        },
    ),
    (
        FieldPattern::Prefix("concepts."),
        RewriteRule::ElemMatchSecond { array: "concepts" },
    ),
    (FieldPattern::Prefix("source."), RewriteRule::DualLocationSource),
    (
        FieldPattern::Exact("has_doi"),
        RewriteRule::ExistsAt { path: "ids.doi" },
    ),
    (
        FieldPattern::Exact("has_pdf"),
        RewriteRule::EqualsAt {
            path: "open_access.is_oa",
        },
    ),
    (
        FieldPattern::Exact("has_references"),
        RewriteRule::NonEmptyAt {
            path: "referenced_works",
        },
    ),
    (
        FieldPattern::Exact("is_oa"),
        RewriteRule::EqualsAt {
            path: "open_access.is_oa",
        },
    ),
    (
        FieldPattern::Exact("open_access.is_oa"),
        RewriteRule::EqualsAt {
            path: "open_access.is_oa",
        },
    ),
    (
        FieldPattern::Exact("from_publication_date"),
        RewriteRule::CompareAt {
            path: "publication_date",
        },
    ),
    (
        FieldPattern::Exact("to_publication_date"),
        RewriteRule::CompareAt {
            path: "publication_date",
        },
    ),
    (FieldPattern::Exact("language"), RewriteRule::LowercaseEquals),
    (
        FieldPattern::Exact("cites"),
        RewriteRule::CitedWork {
            path: "referenced_works",
        },
    ),
    (
        FieldPattern::Exact("cites.id"),
        RewriteRule::CitedWork {
            path: "referenced_works",
        },
    ),
];

fn cmp_op(operator: FilterOperator) -> CmpOp {
    match operator {
        FilterOperator::Eq => CmpOp::Eq,
        FilterOperator::Gt => CmpOp::Gt,
        FilterOperator::Lt => CmpOp::Lt,
        FilterOperator::Gte => CmpOp::Gte,
        FilterOperator::Lte => CmpOp::Lte,
        FilterOperator::Ne => CmpOp::Ne,
        // Search and Exact never reach the comparison path.
        FilterOperator::Search | FilterOperator::Exact => CmpOp::Eq,
    }
}

fn strip_suffix_marker(field: &str, marker: &str) -> String {
    field.strip_suffix(marker).unwrap_or(field).to_string()
}

fn default_compare(field: &str, operator: FilterOperator, value: &FilterValue) -> Predicate {
    Predicate::Cmp {
        path: field.to_string(),
        op: cmp_op(operator),
        value: value.to_json(),
    }
}

/// Builds the predicate for one field/operator/value triple.
fn build_single(field: &str, operator: FilterOperator, value: &FilterValue) -> Option<Predicate> {
    match operator {
        FilterOperator::Search => {
            return Some(Predicate::Matches {
                path: strip_suffix_marker(field, ".search"),
                pattern: value.to_text(),
            });
        }
        FilterOperator::Exact => {
            return Some(Predicate::Equals {
                path: strip_suffix_marker(field, ".equals"),
                value: value.to_json(),
            });
        }
        _ => {}
    }

    if matches!(value, FilterValue::Null) {
        return match operator {
            FilterOperator::Eq => Some(Predicate::IsNull {
                path: field.to_string(),
            }),
            FilterOperator::Ne => Some(Predicate::NotNull {
                path: field.to_string(),
            }),
            _ => {
                tracing::warn!(field, "dropping null value with non-equality operator");
                None
            }
        };
    }

    let rule = REWRITE_RULES
        .iter()
        .find(|(pattern, _)| pattern.matches(field))
        .map(|(_, rule)| rule);

    let predicate = match rule {
        Some(RewriteRule::ElemMatchRest {
            array,
            min_segments,
        }) => {
            let segments: Vec<&str> = field.split('.').collect();
            if segments.len() >= *min_segments {
                Predicate::ElemMatch {
                    path: array.to_string(),
                    sub_path: segments[1..].join("."),
                    op: cmp_op(operator),
                    value: value.to_json(),
                }
            } else {
                default_compare(field, operator, value)
            }
        }
        Some(RewriteRule::ElemMatchSecond { array }) => match field.split('.').nth(1) {
            Some(sub) => Predicate::ElemMatch {
                path: array.to_string(),
                sub_path: sub.to_string(),
                op: cmp_op(operator),
                value: value.to_json(),
            },
            None => default_compare(field, operator, value),
        },
        Some(RewriteRule::DualLocationSource) => match field.split('.').nth(1) {
            Some(sub) => Predicate::Or(vec![
                Predicate::Cmp {
                    path: format!("primary_location.source.{}", sub),
                    op: cmp_op(operator),
                    value: value.to_json(),
                },
                Predicate::Cmp {
                    path: format!("locations.source.{}", sub),
                    op: cmp_op(operator),
                    value: value.to_json(),
                },
            ]),
            None => default_compare(field, operator, value),
        },
        Some(RewriteRule::ExistsAt { path }) => Predicate::Exists {
            path: path.to_string(),
            exists: matches!(value, FilterValue::Bool(true)),
        },
        Some(RewriteRule::EqualsAt { path }) => Predicate::Equals {
            path: path.to_string(),
            value: value.to_json(),
        },
        Some(RewriteRule::NonEmptyAt { path }) => Predicate::ExistsNonEmpty {
            path: path.to_string(),
            exists: matches!(value, FilterValue::Bool(true)),
        },
        Some(RewriteRule::CompareAt { path }) => Predicate::Cmp {
            path: path.to_string(),
            op: cmp_op(operator),
            value: value.to_json(),
        },
        Some(RewriteRule::LowercaseEquals) => {
            let lowered = match value {
                FilterValue::Str(s) => Value::String(s.to_lowercase()),
                other => other.to_json(),
            };
            Predicate::Equals {
                path: field.to_string(),
                value: lowered,
            }
        }
        Some(RewriteRule::CitedWork { path }) => match value.as_str() {
            Some(raw) => {
                let short = raw.rsplit('/').next().unwrap_or(raw);
                if short.starts_with('W') {
                    Predicate::Equals {
                        path: path.to_string(),
                        value: Value::String(short.to_string()),
                    }
                } else {
                    default_compare(field, operator, value)
                }
            }
            None => default_compare(field, operator, value),
        },
        None => default_compare(field, operator, value),
    };
    Some(predicate)
}

/// Builds the predicate fragment for one parsed filter expression. An
/// OR-list value produces an `Or` node with one branch per value.
pub fn build_expression_predicate(expr: &FilterExpression) -> Option<Predicate> {
    match &expr.value {
        FilterOperand::One(value) => build_single(&expr.field, expr.operator, value),
        FilterOperand::Many(values) => {
            let branches: Vec<Predicate> = values
                .iter()
                .filter_map(|v| build_single(&expr.field, expr.operator, v))
                .collect();
            if branches.is_empty() {
                None
            } else {
                Some(Predicate::Or(branches))
            }
        }
    }
}

/// Merges all expression fragments of one filter string under the AND merge
/// policy.
pub fn build_filter_predicate(exprs: &[FilterExpression]) -> Option<Predicate> {
    let fragments: Vec<Predicate> = exprs.iter().filter_map(build_expression_predicate).collect();
    if fragments.is_empty() {
        None
    } else {
        Some(Predicate::And(fragments))
    }
}

/// Parses and builds in one step; None when the parameter is absent or
/// nothing in it parsed.
pub fn parse_filter_predicate(filter: Option<&str>) -> Option<Predicate> {
    filter.and_then(|f| build_filter_predicate(&parse_filter(f)))
}
