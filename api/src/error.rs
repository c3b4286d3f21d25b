use thiserror::Error;

use crate::store::StoreError;

/// Failure taxonomy crossing the engine boundary. The routing layer maps
/// each variant to a status code and a structured `{kind, detail}` payload;
/// backend-native errors never reach the wire.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    /// Search failed in a way that is expected while the text index is still
    /// being built. Distinct from "zero results".
    #[error("text search is not available - the search index is still being built. Error: {detail}")]
    SearchUnavailable { detail: String },

    #[error("{detail}")]
    BadRequest { detail: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::NotFound { .. } => "not_found",
            ApiError::SearchUnavailable { .. } => "search_unavailable",
            ApiError::BadRequest { .. } => "bad_request",
            ApiError::Store(_) => "storage_error",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::NotFound { .. } => 404,
            ApiError::SearchUnavailable { .. } => 503,
            ApiError::BadRequest { .. } => 400,
            ApiError::Store(_) => 500,
        }
    }
}
