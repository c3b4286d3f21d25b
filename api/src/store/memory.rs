//! In-memory document store.
//!
//! Collections are plain vectors of JSON documents; queries are evaluated
//! with `doc-json-match`. Sorts are stable, so ties keep snapshot insertion
//! order. Serving is read-only, writes happen through `bulk_upsert` at
//! startup or from the out-of-band importer.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{DocumentStore, FindOptions, PipelineStage, SortOrder, StoreError};
use crate::query::SortDirection;

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every `<collection>.jsonl` file in a snapshot directory. Lines
    /// that fail to parse are skipped with a warning.
    pub fn load_snapshot_dir(&self, dir: &Path) -> anyhow::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let Some(collection) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let reader = BufReader::new(File::open(&path)?);
            let mut docs = Vec::new();
            for (lineno, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Value>(&line) {
                    Ok(doc) => docs.push(doc),
                    Err(e) => {
                        tracing::warn!(
                            collection,
                            line = lineno + 1,
                            error = %e,
                            "skipping unparseable snapshot line"
                        );
                    }
                }
            }
            let count = docs.len();
            self.upsert_all(collection, docs);
            tracing::info!(collection, count, "loaded snapshot collection");
        }
        Ok(())
    }

    fn upsert_all(&self, collection: &str, docs: Vec<Value>) -> u64 {
        let mut collections = self.collections.write().expect("store lock poisoned");
        let existing = collections.entry(collection.to_string()).or_default();
        let mut written = 0u64;
        for doc in docs {
            let key = doc_key(&doc);
            match key.and_then(|k| existing.iter().position(|d| doc_key(d) == Some(k.clone()))) {
                Some(pos) => existing[pos] = doc,
                None => existing.push(doc),
            }
            written += 1;
        }
        written
    }

    /// Matching documents with their text score, in insertion order.
    fn select(&self, collection: &str, query: &Value) -> Vec<(Value, Option<f64>)> {
        let collections = self.collections.read().expect("store lock poisoned");
        let Some(docs) = collections.get(collection) else {
            return Vec::new();
        };
        let text_query = query
            .get("$text")
            .and_then(|t| t.get("$search"))
            .and_then(Value::as_str);
        docs.iter()
            .filter(|doc| doc_json_match::matches(query, doc))
            .map(|doc| {
                let score = text_query.and_then(|q| doc_json_match::text_score(q, doc));
                (doc.clone(), score)
            })
            .collect()
    }
}

fn doc_key(doc: &Value) -> Option<String> {
    doc.get("_id")
        .or_else(|| doc.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Total order over JSON scalars for sorting: null < bool < number < string,
/// missing values last.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            _ => 4,
        }
    }
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => match (a.as_str(), b.as_str()) {
                (Some(x), Some(y)) => x.cmp(y),
                _ => rank(a).cmp(&rank(b)),
            },
        },
    }
}

fn sort_documents(rows: &mut [(Value, Option<f64>)], order: &SortOrder) {
    match order {
        SortOrder::Unspecified => {}
        SortOrder::TextScore => {
            rows.sort_by(|(_, a), (_, b)| {
                b.unwrap_or(0.0)
                    .partial_cmp(&a.unwrap_or(0.0))
                    .unwrap_or(Ordering::Equal)
            });
        }
        SortOrder::Fields(fields) => {
            rows.sort_by(|(a, _), (b, _)| {
                for (field, direction) in fields {
                    let av = doc_json_match::lookup_first(a, field);
                    let bv = doc_json_match::lookup_first(b, field);
                    let ord = compare_values(av, bv);
                    let ord = match direction {
                        SortDirection::Ascending => ord,
                        SortDirection::Descending => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }
    }
}

/// Applies an inclusion projection. `_id` is always kept, matching the
/// document-database convention.
fn project(doc: Value, projection: Option<&Value>) -> Value {
    let Some(Value::Object(fields)) = projection else {
        return doc;
    };
    let Value::Object(map) = doc else {
        return doc;
    };
    let projected: Map<String, Value> = map
        .into_iter()
        .filter(|(k, _)| {
            k == "_id"
                || fields
                    .get(k)
                    .map(|v| v.as_i64() != Some(0) && v != &Value::Bool(false))
                    .unwrap_or(false)
        })
        .collect();
    Value::Object(projected)
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(
        &self,
        collection: &str,
        query: &Value,
        options: FindOptions,
    ) -> Result<Vec<Value>, StoreError> {
        let mut rows = self.select(collection, query);
        sort_documents(&mut rows, &options.sort);

        let skip = options.skip as usize;
        let rows = rows.into_iter().skip(skip);
        let rows: Vec<(Value, Option<f64>)> = match options.limit {
            Some(limit) => rows.take(limit as usize).collect(),
            None => rows.collect(),
        };

        Ok(rows
            .into_iter()
            .map(|(doc, score)| {
                let mut doc = project(doc, options.projection.as_ref());
                if let (Some(score), Value::Object(map)) = (score, &mut doc) {
                    map.insert("score".to_string(), Value::from(score));
                }
                doc
            })
            .collect())
    }

    async fn count_documents(&self, collection: &str, query: &Value) -> Result<u64, StoreError> {
        Ok(self.select(collection, query).len() as u64)
    }

    async fn find_one_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Option<Value>, StoreError> {
        let query = serde_json::json!({ field: value.clone() });
        let collections = self.collections.read().expect("store lock poisoned");
        Ok(collections.get(collection).and_then(|docs| {
            docs.iter()
                .find(|doc| doc_json_match::matches(&query, doc))
                .cloned()
        }))
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &[PipelineStage],
    ) -> Result<Vec<Value>, StoreError> {
        let mut rows: Vec<Value> = {
            let collections = self.collections.read().expect("store lock poisoned");
            collections.get(collection).cloned().unwrap_or_default()
        };

        for stage in pipeline {
            match stage {
                PipelineStage::Match(query) => {
                    rows.retain(|doc| doc_json_match::matches(query, doc));
                }
                PipelineStage::Group { by } => {
                    // BTreeMap keyed by the serialized group key keeps bucket
                    // order deterministic before the count sort.
                    let mut buckets: BTreeMap<String, (Value, u64)> = BTreeMap::new();
                    for doc in &rows {
                        let key = doc_json_match::lookup_first(doc, by)
                            .cloned()
                            .unwrap_or(Value::Null);
                        let entry = buckets
                            .entry(key.to_string())
                            .or_insert_with(|| (key, 0));
                        entry.1 += 1;
                    }
                    rows = buckets
                        .into_values()
                        .map(|(key, count)| serde_json::json!({ "key": key, "count": count }))
                        .collect();
                }
                PipelineStage::Sort { field, descending } => {
                    rows.sort_by(|a, b| {
                        let ord = compare_values(a.get(field.as_str()), b.get(field.as_str()));
                        if *descending {
                            ord.reverse()
                        } else {
                            ord
                        }
                    });
                }
                PipelineStage::Project(projection) => {
                    rows = rows
                        .into_iter()
                        .map(|doc| project(doc, Some(projection)))
                        .collect();
                }
                PipelineStage::Limit(n) => rows.truncate(*n as usize),
            }
        }
        Ok(rows)
    }

    async fn bulk_upsert(&self, collection: &str, docs: Vec<Value>) -> Result<u64, StoreError> {
        Ok(self.upsert_all(collection, docs))
    }
}
