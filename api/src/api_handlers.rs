use std::collections::HashMap;
use std::sync::Arc;

use poem::{
    handler,
    http::{header, StatusCode},
    web::{Data, Path, Query},
    Response,
};
use serde::Serialize;
use serde_json::json;

use crate::engine::{EntityQueryEngine, ListParams, SearchParams};
use crate::entities::EntityKind;
use crate::error::ApiError;

// Common response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub kind: String,
    pub detail: String,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string()))
}

fn ok_response<T: Serialize>(data: T) -> Response {
    json_response(StatusCode::OK, &ApiResponse::success(data))
}

fn error_response(err: &ApiError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ApiResponse::<()> {
        success: false,
        data: None,
        error: Some(ErrorDetail {
            kind: err.kind().to_string(),
            detail: err.to_string(),
        }),
    };
    json_response(status, &body)
}

fn bad_request(detail: impl Into<String>) -> Response {
    error_response(&ApiError::BadRequest {
        detail: detail.into(),
    })
}

fn parse_entity(name: &str) -> Result<EntityKind, Response> {
    EntityKind::parse(name).ok_or_else(|| bad_request(format!("unknown entity type: {}", name)))
}

/// Lenient integer parameter parsing: a malformed number falls back to the
/// default rather than failing the request.
fn int_param(params: &HashMap<String, String>, name: &str) -> Option<u64> {
    let raw = params.get(name)?;
    match raw.parse::<u64>() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::debug!(parameter = name, value = %raw, "ignoring non-integer parameter");
            None
        }
    }
}

fn bool_param(params: &HashMap<String, String>, name: &str) -> bool {
    params
        .get(name)
        .map(|raw| {
            ["true", "1", "yes", "t"]
                .iter()
                .any(|t| raw.eq_ignore_ascii_case(t))
        })
        .unwrap_or(false)
}

const RESERVED_LIST_PARAMS: &[&str] = &["page", "per_page", "filter", "sort", "select"];

#[handler]
pub async fn list_entities(
    engine: Data<&Arc<EntityQueryEngine>>,
    Path(entity): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let kind = match parse_entity(&entity) {
        Ok(kind) => kind,
        Err(resp) => return resp,
    };

    let extra: HashMap<String, String> = params
        .iter()
        .filter(|(k, _)| !RESERVED_LIST_PARAMS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let list_params = ListParams {
        page: int_param(&params, "page"),
        per_page: int_param(&params, "per_page"),
        filter: params.get("filter").cloned(),
        sort: params.get("sort").cloned(),
        select: params.get("select").cloned(),
        extra,
    };

    match engine.list(kind, list_params).await {
        Ok(page) => ok_response(page),
        Err(e) => error_response(&e),
    }
}

#[handler]
pub async fn get_entity(
    engine: Data<&Arc<EntityQueryEngine>>,
    Path((entity, entity_id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let kind = match parse_entity(&entity) {
        Ok(kind) => kind,
        Err(resp) => return resp,
    };

    let include: Vec<String> = params
        .get("include")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    match engine
        .get(
            kind,
            &entity_id,
            params.get("select").map(String::as_str),
            &include,
        )
        .await
    {
        Ok(doc) => ok_response(doc),
        Err(e) => error_response(&e),
    }
}

#[handler]
pub async fn search_entities(
    engine: Data<&Arc<EntityQueryEngine>>,
    Path(entity): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let kind = match parse_entity(&entity) {
        Ok(kind) => kind,
        Err(resp) => return resp,
    };

    let Some(q) = params.get("q").filter(|q| !q.trim().is_empty()) else {
        return bad_request("Search query parameter 'q' is required");
    };

    let search_params = SearchParams {
        q: q.clone(),
        skip: int_param(&params, "skip"),
        limit: int_param(&params, "limit"),
        filter: params.get("filter").cloned(),
        sort: params.get("sort").cloned(),
        select: params.get("select").cloned(),
        explain_score: bool_param(&params, "explain_score"),
    };

    match engine.search(kind, search_params).await {
        Ok(page) => ok_response(page),
        Err(e) => error_response(&e),
    }
}

#[handler]
pub async fn group_entities(
    engine: Data<&Arc<EntityQueryEngine>>,
    Path((entity, field)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let kind = match parse_entity(&entity) {
        Ok(kind) => kind,
        Err(resp) => return resp,
    };

    match engine
        .group(kind, &field, params.get("filter").map(String::as_str))
        .await
    {
        Ok(result) => ok_response(result),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    success: bool,
    message: String,
}

#[handler]
pub async fn health() -> Response {
    json_response(
        StatusCode::OK,
        &HealthResponse {
            success: true,
            message: "Scholarly metadata API is running".to_string(),
        },
    )
}

/// API info with per-collection document counts.
#[handler]
pub async fn api_info(engine: Data<&Arc<EntityQueryEngine>>) -> Response {
    let mut counts = serde_json::Map::new();
    for kind in EntityKind::ALL {
        let count = engine.entity_count(kind).await.unwrap_or(0);
        counts.insert(format!("{}_count", kind.collection()), json!(count));
    }

    let info = json!({
        "name": "Scholarly Metadata API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            { "path": "/{entity}", "description": "List and filter entities" },
            { "path": "/{entity}/search", "description": "Full-text search with relevance ranking" },
            { "path": "/{entity}/group_by/{field}", "description": "Group entities by a field and count" },
            { "path": "/{entity}/{id}", "description": "Get one entity by id" }
        ],
        "entities": EntityKind::ALL.iter().map(|k| k.collection()).collect::<Vec<_>>(),
        "counts": counts,
    });
    json_response(StatusCode::OK, &info)
}
