//! Backend-neutral query predicates.
//!
//! A `Predicate` is a boolean expression tree over entity fields. It
//! serializes two ways: `to_query_doc` produces the JSON query document the
//! document store consumes, and `to_search_filter` produces the filter clause
//! dialect of the external search index.

use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Gt,
    Lt,
    Gte,
    Lte,
    Ne,
}

impl CmpOp {
    fn query_op(self) -> &'static str {
        match self {
            CmpOp::Eq => "$eq",
            CmpOp::Gt => "$gt",
            CmpOp::Lt => "$lt",
            CmpOp::Gte => "$gte",
            CmpOp::Lte => "$lte",
            CmpOp::Ne => "$ne",
        }
    }

    fn range_op(self) -> Option<&'static str> {
        match self {
            CmpOp::Gt => Some("gt"),
            CmpOp::Lt => Some("lt"),
            CmpOp::Gte => Some("gte"),
            CmpOp::Lte => Some("lte"),
            CmpOp::Eq | CmpOp::Ne => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Field compared to a value with an explicit operator.
    Cmp {
        path: String,
        op: CmpOp,
        value: Value,
    },
    /// Plain literal equality (`{"field": value}` with no operator wrapper).
    Equals { path: String, value: Value },
    /// Case-insensitive substring match.
    Matches { path: String, pattern: String },
    IsNull { path: String },
    NotNull { path: String },
    Exists { path: String, exists: bool },
    /// Field exists (or not) and is not an empty array.
    ExistsNonEmpty { path: String, exists: bool },
    /// Any element of the array at `path` satisfies the inner comparison.
    ElemMatch {
        path: String,
        sub_path: String,
        op: CmpOp,
        value: Value,
    },
    /// Field value is one of the listed values.
    In { path: String, values: Vec<Value> },
    /// Full-text match against the collection's text index.
    Text { query: String },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    /// Serializes to the document store's query-document dialect.
    ///
    /// `And` reproduces the same-field merge policy: child fragments merge
    /// into one map until a top-level key would collide; colliding fragments
    /// are routed into an `$and` list with the plain map appended last, so a
    /// later condition never silently overwrites an earlier one.
    pub fn to_query_doc(&self) -> Value {
        match self {
            Predicate::Cmp { path, op, value } => {
                json!({ path.clone(): { op.query_op(): value.clone() } })
            }
            Predicate::Equals { path, value } => json!({ path.clone(): value.clone() }),
            Predicate::Matches { path, pattern } => {
                json!({ path.clone(): { "$regex": pattern.clone(), "$options": "i" } })
            }
            Predicate::IsNull { path } => json!({ path.clone(): Value::Null }),
            Predicate::NotNull { path } => json!({ path.clone(): { "$ne": Value::Null } }),
            Predicate::Exists { path, exists } => {
                json!({ path.clone(): { "$exists": *exists } })
            }
            Predicate::ExistsNonEmpty { path, exists } => {
                json!({ path.clone(): { "$exists": *exists, "$ne": [] } })
            }
            Predicate::ElemMatch {
                path,
                sub_path,
                op,
                value,
            } => {
                json!({ path.clone(): { "$elemMatch": { sub_path.clone(): { op.query_op(): value.clone() } } } })
            }
            Predicate::In { path, values } => json!({ path.clone(): { "$in": values.clone() } }),
            Predicate::Text { query } => json!({ "$text": { "$search": query.clone() } }),
            Predicate::Or(children) => {
                let docs: Vec<Value> = children.iter().map(Predicate::to_query_doc).collect();
                json!({ "$or": docs })
            }
            Predicate::And(children) => {
                let mut merged = Map::new();
                let mut and_list: Vec<Value> = Vec::new();
                for child in children {
                    let Value::Object(doc) = child.to_query_doc() else {
                        continue;
                    };
                    if doc.keys().any(|k| merged.contains_key(k)) {
                        and_list.push(Value::Object(doc));
                    } else {
                        merged.extend(doc);
                    }
                }
                if and_list.is_empty() {
                    Value::Object(merged)
                } else {
                    if !merged.is_empty() {
                        and_list.push(Value::Object(merged));
                    }
                    json!({ "$and": and_list })
                }
            }
        }
    }

    /// Serializes to the external search index's filter DSL. Filter clauses
    /// restrict inclusion without contributing to the relevance score.
    pub fn to_search_filter(&self) -> Value {
        match self {
            Predicate::Cmp { path, op, value } => match op.range_op() {
                Some(range) => json!({ "range": { path.clone(): { range: value.clone() } } }),
                None if *op == CmpOp::Ne => {
                    json!({ "bool": { "must_not": [ { "term": { path.clone(): value.clone() } } ] } })
                }
                None => json!({ "term": { path.clone(): value.clone() } }),
            },
            Predicate::Equals { path, value } => json!({ "term": { path.clone(): value.clone() } }),
            Predicate::Matches { path, pattern } => {
                json!({ "match": { path.clone(): pattern.clone() } })
            }
            Predicate::IsNull { path } => {
                json!({ "bool": { "must_not": [ { "exists": { "field": path.clone() } } ] } })
            }
            Predicate::NotNull { path } => json!({ "exists": { "field": path.clone() } }),
            Predicate::Exists { path, exists } | Predicate::ExistsNonEmpty { path, exists } => {
                if *exists {
                    json!({ "exists": { "field": path.clone() } })
                } else {
                    json!({ "bool": { "must_not": [ { "exists": { "field": path.clone() } } ] } })
                }
            }
            Predicate::ElemMatch {
                path,
                sub_path,
                value,
                ..
            } => json!({ "term": { format!("{}.{}", path, sub_path): value.clone() } }),
            Predicate::In { path, values } => json!({ "terms": { path.clone(): values.clone() } }),
            Predicate::Text { query } => json!({
                "simple_query_string": { "query": query.clone(), "default_operator": "and" }
            }),
            Predicate::And(children) => {
                let clauses: Vec<Value> = children.iter().map(Predicate::to_search_filter).collect();
                json!({ "bool": { "filter": clauses } })
            }
            Predicate::Or(children) => {
                let clauses: Vec<Value> = children.iter().map(Predicate::to_search_filter).collect();
                json!({ "bool": { "should": clauses, "minimum_should_match": 1 } })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_merges_distinct_fields_into_one_map() {
        let pred = Predicate::And(vec![
            Predicate::Cmp {
                path: "publication_year".into(),
                op: CmpOp::Gt,
                value: json!(2018),
            },
            Predicate::Cmp {
                path: "cited_by_count".into(),
                op: CmpOp::Gte,
                value: json!(100),
            },
        ]);
        assert_eq!(
            pred.to_query_doc(),
            json!({
                "publication_year": { "$gt": 2018 },
                "cited_by_count": { "$gte": 100 }
            })
        );
    }

    #[test]
    fn test_and_routes_colliding_fields_into_and_list() {
        let pred = Predicate::And(vec![
            Predicate::Cmp {
                path: "type".into(),
                op: CmpOp::Eq,
                value: json!("journal-article"),
            },
            Predicate::Cmp {
                path: "type".into(),
                op: CmpOp::Eq,
                value: json!("book"),
            },
        ]);
        assert_eq!(
            pred.to_query_doc(),
            json!({ "$and": [
                { "type": { "$eq": "book" } },
                { "type": { "$eq": "journal-article" } }
            ] })
        );
    }

    #[test]
    fn test_or_serialization() {
        let pred = Predicate::Or(vec![
            Predicate::Cmp {
                path: "publication_year".into(),
                op: CmpOp::Eq,
                value: json!(2020),
            },
            Predicate::Cmp {
                path: "publication_year".into(),
                op: CmpOp::Eq,
                value: json!(2021),
            },
        ]);
        assert_eq!(
            pred.to_query_doc(),
            json!({ "$or": [
                { "publication_year": { "$eq": 2020 } },
                { "publication_year": { "$eq": 2021 } }
            ] })
        );
    }

    #[test]
    fn test_idempotent_serialization() {
        let pred = Predicate::And(vec![
            Predicate::Text {
                query: "neural networks".into(),
            },
            Predicate::Cmp {
                path: "publication_year".into(),
                op: CmpOp::Gte,
                value: json!(2019),
            },
        ]);
        assert_eq!(pred.to_query_doc(), pred.to_query_doc());
    }

    #[test]
    fn test_search_filter_term_and_range() {
        let eq = Predicate::Equals {
            path: "type".into(),
            value: json!("journal"),
        };
        assert_eq!(eq.to_search_filter(), json!({ "term": { "type": "journal" } }));

        let gt = Predicate::Cmp {
            path: "works_count".into(),
            op: CmpOp::Gt,
            value: json!(10),
        };
        assert_eq!(
            gt.to_search_filter(),
            json!({ "range": { "works_count": { "gt": 10 } } })
        );
    }

    #[test]
    fn test_search_filter_or_becomes_should() {
        let pred = Predicate::Or(vec![
            Predicate::Equals {
                path: "type".into(),
                value: json!("journal"),
            },
            Predicate::Equals {
                path: "type".into(),
                value: json!("conference"),
            },
        ]);
        let filter = pred.to_search_filter();
        assert_eq!(filter["bool"]["minimum_should_match"], json!(1));
        assert_eq!(filter["bool"]["should"].as_array().unwrap().len(), 2);
    }
}
