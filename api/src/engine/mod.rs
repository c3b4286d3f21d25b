//! Generic entity query engine.
//!
//! One engine serves all ten entity collections: listing with filters and
//! pagination, detail lookup with opt-in hydration, relevance search
//! against the primary store or a configured external index, and group-by
//! aggregation. Every operation takes plain scalar parameters and returns a
//! plain result structure, so the routing layer stays a thin adapter.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::entities::{EntityConfig, EntityKind, EntityRegistry};
use crate::error::ApiError;
use crate::filter::parse_filter_predicate;
use crate::query::{GroupSpec, Predicate, Projection, SortSpec};
use crate::search_backend::SearchBackend;
use crate::store::{DocumentStore, FindOptions, SortOrder};

const MAX_RESULTS_PER_PAGE: u64 = 100;
const DEFAULT_PER_PAGE: u64 = 25;
const DEFAULT_SEARCH_LIMIT: u64 = 10;
const RELATED_WORKS_LIMIT: u64 = 100;

#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub select: Option<String>,
    /// Structured per-entity pre-filter parameters (name, year, ...),
    /// matched against the entity's configured pre-filter fields.
    pub extra: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub q: String,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub select: Option<String>,
    pub explain_score: bool,
}

#[derive(Debug, Serialize)]
pub struct PageMeta {
    pub count: usize,
    pub total_count: u64,
    pub page: u64,
    pub per_page: u64,
    pub total_pages: u64,
}

#[derive(Debug, Serialize)]
pub struct ListPage {
    pub meta: PageMeta,
    pub results: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct SearchPage {
    pub skip: u64,
    pub limit: u64,
    pub has_more: bool,
    /// Exact match count when the backend computed one. The primary-store
    /// path leaves this out: it derives `has_more` by over-fetching one
    /// document instead of paying for a count on a text-matched set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub results: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct GroupBucket {
    pub key: Value,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct GroupResult {
    pub group_by: String,
    pub group_count: usize,
    pub groups: Vec<GroupBucket>,
}

pub struct EntityQueryEngine {
    store: Arc<dyn DocumentStore>,
    search_backend: Option<Arc<dyn SearchBackend>>,
    registry: EntityRegistry,
}

impl EntityQueryEngine {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        search_backend: Option<Arc<dyn SearchBackend>>,
        registry: EntityRegistry,
    ) -> Self {
        Self {
            store,
            search_backend,
            registry,
        }
    }

    /// Document count of one collection, for the API info endpoint.
    pub async fn entity_count(&self, kind: EntityKind) -> Result<u64, ApiError> {
        Ok(self
            .store
            .count_documents(kind.collection(), &json!({}))
            .await?)
    }

    /// Paginated listing with the full filter/sort/select surface.
    pub async fn list(&self, kind: EntityKind, params: ListParams) -> Result<ListPage, ApiError> {
        let config = self.registry.config(kind);

        let page = clamp_page(params.page);
        let per_page = clamp_limit(params.per_page.unwrap_or(DEFAULT_PER_PAGE));

        let query = self
            .combined_predicate(config, params.filter.as_deref(), &params.extra)
            .map(|p| p.to_query_doc())
            .unwrap_or_else(|| json!({}));

        let sort = SortSpec::parse(params.sort.as_deref());
        let order = SortOrder::Fields(sort.listing_order(config.default_sort_field));
        let projection = Projection::parse(params.select.as_deref());

        let total_count = self.store.count_documents(kind.collection(), &query).await?;
        let results = self
            .store
            .find(
                kind.collection(),
                &query,
                FindOptions {
                    projection: projection.to_doc(),
                    sort: order,
                    skip: (page - 1) * per_page,
                    limit: Some(per_page),
                },
            )
            .await?;

        Ok(ListPage {
            meta: PageMeta {
                count: results.len(),
                total_count,
                page,
                per_page,
                total_pages: total_count.div_ceil(per_page),
            },
            results,
        })
    }

    /// Detail lookup by id. The store may key documents by a short internal
    /// id while also holding the long-form canonical id, so the lookup
    /// tries the internal key first and falls back to the canonical field.
    /// Related entities are hydrated only when named in `include`.
    pub async fn get(
        &self,
        kind: EntityKind,
        id: &str,
        select: Option<&str>,
        include: &[String],
    ) -> Result<Value, ApiError> {
        let config = self.registry.config(kind);
        let id_value = Value::String(id.trim().to_string());

        let mut doc = match self
            .store
            .find_one_by_field(kind.collection(), "_id", &id_value)
            .await?
        {
            Some(doc) => doc,
            None => self
                .store
                .find_one_by_field(kind.collection(), "id", &id_value)
                .await?
                .ok_or(ApiError::NotFound {
                    entity: kind.singular(),
                })?,
        };

        let wants = |name: &str| include.iter().any(|i| i == name);

        if wants("works") {
            if let Some(works_key) = config.related_works_key {
                let short_id = doc
                    .get("_id")
                    .and_then(Value::as_str)
                    .unwrap_or(id)
                    .to_string();
                let works = self
                    .store
                    .find(
                        "works",
                        &json!({ works_key: short_id }),
                        FindOptions {
                            projection: Some(json!({
                                "id": 1, "title": 1, "publication_year": 1,
                                "cited_by_count": 1, "type": 1
                            })),
                            sort: SortOrder::Fields(vec![(
                                "cited_by_count".to_string(),
                                crate::query::SortDirection::Descending,
                            )]),
                            skip: 0,
                            limit: Some(RELATED_WORKS_LIMIT),
                        },
                    )
                    .await?;
                set_field(&mut doc, "works", Value::Array(works));
            }
        }

        if config.hydrates_contributors {
            if wants("authors") {
                let related = self
                    .fetch_by_id_list(&doc, "_author_ids", "authors", json!({"id": 1, "display_name": 1}))
                    .await?;
                if let Some(related) = related {
                    set_field(&mut doc, "authors", related);
                }
            }
            if wants("concepts") {
                let related = self
                    .fetch_by_id_list(
                        &doc,
                        "_concept_ids",
                        "concepts",
                        json!({"id": 1, "display_name": 1, "level": 1}),
                    )
                    .await?;
                if let Some(related) = related {
                    set_field(&mut doc, "concepts", related);
                }
            }
        }

        Ok(Projection::parse(select).apply(doc))
    }

    /// Relevance search. Delegates to the external index when one is
    /// configured, otherwise runs a text query against the primary store.
    pub async fn search(
        &self,
        kind: EntityKind,
        params: SearchParams,
    ) -> Result<SearchPage, ApiError> {
        let skip = params.skip.unwrap_or(0);
        let limit = clamp_limit(params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT));
        let filter_predicate = parse_filter_predicate(params.filter.as_deref());

        match &self.search_backend {
            Some(backend) => {
                self.search_external(kind, &params, backend.clone(), filter_predicate, skip, limit)
                    .await
            }
            None => {
                self.search_primary(kind, &params, filter_predicate, skip, limit)
                    .await
            }
        }
    }

    async fn search_primary(
        &self,
        kind: EntityKind,
        params: &SearchParams,
        filter_predicate: Option<Predicate>,
        skip: u64,
        limit: u64,
    ) -> Result<SearchPage, ApiError> {
        let config = self.registry.config(kind);

        let mut fragments = vec![Predicate::Text {
            query: params.q.clone(),
        }];
        fragments.extend(filter_predicate);
        let query = Predicate::And(fragments).to_query_doc();

        let sort = SortSpec::parse(params.sort.as_deref());
        let order = match sort.search_order() {
            Some(fields) => SortOrder::Fields(fields),
            None => SortOrder::TextScore,
        };

        let mut projection = match params.select.as_deref() {
            Some(select) => Projection::parse(Some(select)),
            None => Projection::from_fields(config.search_fields),
        };
        if params.explain_score {
            projection = projection.with_field("search_blob");
        }

        // One query with one extra document takes the place of a count:
        // overflow past the requested page means there is more.
        let mut results = self
            .store
            .find(
                kind.collection(),
                &query,
                FindOptions {
                    projection: projection.to_doc(),
                    sort: order,
                    skip,
                    limit: Some(limit + 1),
                },
            )
            .await
            .map_err(|e| ApiError::SearchUnavailable {
                detail: e.to_string(),
            })?;

        let has_more = results.len() as u64 > limit;
        results.truncate(limit as usize);

        if params.explain_score {
            for doc in &mut results {
                annotate_score_explanation(doc, &params.q);
            }
        }

        Ok(SearchPage {
            skip,
            limit,
            has_more,
            total: None,
            message: zero_results_message(&results, kind),
            results,
        })
    }

    async fn search_external(
        &self,
        kind: EntityKind,
        params: &SearchParams,
        backend: Arc<dyn SearchBackend>,
        filter_predicate: Option<Predicate>,
        skip: u64,
        limit: u64,
    ) -> Result<SearchPage, ApiError> {
        let search_filter = filter_predicate.as_ref().map(Predicate::to_search_filter);
        let ranked = backend
            .search(
                kind.collection(),
                &params.q,
                skip,
                limit,
                search_filter.as_ref(),
            )
            .await
            .map_err(|e| ApiError::SearchUnavailable {
                detail: e.to_string(),
            })?;

        let ids: Vec<Value> = ranked
            .hits
            .iter()
            .map(|hit| Value::String(hit.id.clone()))
            .collect();
        let fetched = self
            .store
            .find(
                kind.collection(),
                &json!({ "_id": { "$in": ids } }),
                FindOptions {
                    projection: Projection::parse(params.select.as_deref()).to_doc(),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| ApiError::SearchUnavailable {
                detail: e.to_string(),
            })?;

        // The primary store returns documents in its own natural order; the
        // response must follow the index's ranking, so reorder here.
        let mut by_id: HashMap<String, Value> = fetched
            .into_iter()
            .filter_map(|doc| {
                doc.get("_id")
                    .and_then(Value::as_str)
                    .map(|id| (id.to_string(), doc.clone()))
            })
            .collect();
        let mut results = Vec::with_capacity(ranked.hits.len());
        for hit in &ranked.hits {
            match by_id.remove(&hit.id) {
                Some(mut doc) => {
                    set_field(&mut doc, "score", Value::from(hit.score));
                    results.push(doc);
                }
                None => {
                    tracing::warn!(
                        collection = kind.collection(),
                        id = %hit.id,
                        "indexed document missing from primary store"
                    );
                }
            }
        }

        Ok(SearchPage {
            skip,
            limit,
            has_more: skip + limit < ranked.total,
            total: Some(ranked.total),
            message: zero_results_message(&results, kind),
            results,
        })
    }

    /// Group-by aggregation: filter match stage, bucket counts, largest
    /// buckets first.
    pub async fn group(
        &self,
        kind: EntityKind,
        group_by: &str,
        filter: Option<&str>,
    ) -> Result<GroupResult, ApiError> {
        let config = self.registry.config(kind);
        if !config.group_by_fields.contains(&group_by) {
            return Err(ApiError::BadRequest {
                detail: format!(
                    "cannot group {} by '{}'; allowed fields: {}",
                    kind.collection(),
                    group_by,
                    config.group_by_fields.join(", ")
                ),
            });
        }

        let match_query = parse_filter_predicate(filter)
            .map(|p| p.to_query_doc())
            .unwrap_or_else(|| json!({}));
        let pipeline = GroupSpec::new(group_by).pipeline(match_query);
        let rows = self.store.aggregate(kind.collection(), &pipeline).await?;

        let groups: Vec<GroupBucket> = rows
            .into_iter()
            .map(|row| GroupBucket {
                count: row.get("count").and_then(Value::as_u64).unwrap_or(0),
                key: row.get("key").cloned().unwrap_or(Value::Null),
            })
            .collect();

        Ok(GroupResult {
            group_by: group_by.to_string(),
            group_count: groups.len(),
            groups,
        })
    }

    /// Merges the filter-string predicate with the entity's structured
    /// pre-filters.
    fn combined_predicate(
        &self,
        config: &EntityConfig,
        filter: Option<&str>,
        extra: &HashMap<String, String>,
    ) -> Option<Predicate> {
        let mut fragments: Vec<Predicate> = Vec::new();
        fragments.extend(parse_filter_predicate(filter));
        for field in config.pre_filters {
            if let Some(raw) = extra.get(field.name) {
                fragments.extend(field.predicate(raw));
            }
        }
        if fragments.is_empty() {
            None
        } else {
            Some(Predicate::And(fragments))
        }
    }

    async fn fetch_by_id_list(
        &self,
        doc: &Value,
        id_field: &str,
        collection: &str,
        projection: Value,
    ) -> Result<Option<Value>, ApiError> {
        let Some(ids) = doc.get(id_field).and_then(Value::as_array) else {
            return Ok(None);
        };
        if ids.is_empty() {
            return Ok(None);
        }
        let related = self
            .store
            .find(
                collection,
                &json!({ "id": { "$in": ids.clone() } }),
                FindOptions {
                    projection: Some(projection),
                    ..Default::default()
                },
            )
            .await?;
        Ok(Some(Value::Array(related)))
    }
}

fn clamp_page(page: Option<u64>) -> u64 {
    match page {
        Some(0) => {
            tracing::warn!("page 0 requested, clamping to 1");
            1
        }
        Some(p) => p,
        None => 1,
    }
}

fn clamp_limit(limit: u64) -> u64 {
    if limit == 0 {
        tracing::warn!("limit 0 requested, clamping to 1");
        1
    } else if limit > MAX_RESULTS_PER_PAGE {
        tracing::warn!(limit, "limit above maximum, clamping to {}", MAX_RESULTS_PER_PAGE);
        MAX_RESULTS_PER_PAGE
    } else {
        limit
    }
}

fn set_field(doc: &mut Value, field: &str, value: Value) {
    if let Value::Object(map) = doc {
        map.insert(field.to_string(), value);
    }
}

fn zero_results_message(results: &[Value], kind: EntityKind) -> Option<String> {
    if results.is_empty() {
        Some(format!(
            "No matching {} found. Try different search terms.",
            kind.collection()
        ))
    } else {
        None
    }
}

/// Attaches a score explanation: the backend-computed score plus the query
/// terms actually present in the document's search blob. The blob itself is
/// included so callers can audit the match, then removed from the projected
/// document.
fn annotate_score_explanation(doc: &mut Value, query: &str) {
    let Value::Object(map) = doc else {
        return;
    };
    let score = map.get("score").cloned().unwrap_or(Value::from(0.0));
    let blob = map
        .remove("search_blob")
        .and_then(|b| b.as_str().map(str::to_lowercase))
        .unwrap_or_default();
    let matching: Vec<Value> = query
        .split_whitespace()
        .map(|term| term.trim_matches('"').to_lowercase())
        .filter(|term| !term.is_empty() && blob.contains(term.as_str()))
        .map(Value::String)
        .collect();

    let mut explanation = Map::new();
    explanation.insert("score".to_string(), score);
    explanation.insert("query".to_string(), Value::String(query.to_string()));
    explanation.insert("matching_terms".to_string(), Value::Array(matching));
    explanation.insert("search_blob".to_string(), Value::String(blob));
    map.insert("_score_explanation".to_string(), Value::Object(explanation));
}
