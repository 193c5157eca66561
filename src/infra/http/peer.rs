//! Endpoints used by other cache nodes.

use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::{
    application::error::HttpError,
    cache::{CacheError, CacheStats, codec},
};

use super::state::HttpState;

/// Answers `GET /_vellum/{group}/{key}` by loading the key on this node.
pub(super) async fn fetch(
    State(state): State<HttpState>,
    Path((group, key)): Path<(String, String)>,
) -> Response {
    const SOURCE: &str = "infra::http::peer::fetch";

    let Some(group) = state.fs.registry().get(&group) else {
        return HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Unknown cache group",
            format!("cache group `{group}` is not registered"),
        )
        .into_response();
    };
    let key = match codec::decode_key(&key) {
        Ok(key) => key,
        Err(err) => {
            return HttpError::from_error(SOURCE, StatusCode::BAD_REQUEST, "Invalid cache key", &err)
                .into_response();
        }
    };

    match group.get_local(&key).await {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            );
            response
        }
        Err(err @ (CacheError::NotFound { .. } | CacheError::InvalidKey { .. })) => {
            HttpError::from_error(SOURCE, StatusCode::NOT_FOUND, "Not found", &err).into_response()
        }
        Err(err) => HttpError::from_error(
            SOURCE,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Cache load failed",
            &err,
        )
        .into_response(),
    }
}

#[derive(Debug, Serialize)]
pub(super) struct GroupStats {
    group: String,
    #[serde(flatten)]
    stats: CacheStats,
}

/// Per-group cache statistics of this node.
pub(super) async fn stats(State(state): State<HttpState>) -> Json<Vec<GroupStats>> {
    let stats = state
        .fs
        .registry()
        .stats()
        .into_iter()
        .map(|(group, stats)| GroupStats { group, stats })
        .collect();
    Json(stats)
}
