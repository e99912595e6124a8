use super::service::ContentRepository;
use super::types::{ErrorResponse, RepositoryStats};
use crate::error::RepositoryError;
use crate::resource::Resource;
use crate::search::{IndexHealth, SearchQuery, SearchResult};

use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use std::sync::Arc;

type HandlerError = (StatusCode, Json<ErrorResponse>);

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub limit: Option<i64>,
    pub offset: Option<usize>,
}

#[derive(Deserialize)]
pub struct SuggestParams {
    pub dictionary: String,
    pub seed: String,
    pub limit: Option<usize>,
}

fn status_for(error: &RepositoryError) -> StatusCode {
    match error {
        RepositoryError::NotFound(_) => StatusCode::NOT_FOUND,
        RepositoryError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        RepositoryError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        RepositoryError::Conflict(_)
        | RepositoryError::AlreadyLocked { .. }
        | RepositoryError::ReferentialIntegrity { .. } => StatusCode::CONFLICT,
        RepositoryError::IndexUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        RepositoryError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(error: RepositoryError) -> HandlerError {
    let status = status_for(&error);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("Request failed: {}", error);
    } else {
        tracing::debug!("Request failed: {}", error);
    }
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

/// Index synchronization state. Always 200, degraded state is reported in the body.
pub async fn handle_health(Extension(repository): Extension<Arc<ContentRepository>>) -> (StatusCode, Json<IndexHealth>) {
    (StatusCode::OK, Json(repository.index_health()))
}

pub async fn handle_stats(
    Extension(repository): Extension<Arc<ContentRepository>>,
) -> Result<Json<RepositoryStats>, HandlerError> {
    repository.stats().await.map(Json).map_err(failure)
}

/// Live resource by identifier.
pub async fn handle_get_resource(
    Path(identifier): Path<String>,
    Extension(repository): Extension<Arc<ContentRepository>>,
) -> Result<Json<Resource>, HandlerError> {
    repository
        .get(&repository.uri(&identifier))
        .await
        .map(Json)
        .map_err(failure)
}

pub async fn handle_search(
    Query(params): Query<SearchParams>,
    Extension(repository): Extension<Arc<ContentRepository>>,
) -> Result<Json<SearchResult>, HandlerError> {
    let mut query = SearchQuery::new()
        .with_text(&params.q)
        .with_offset(params.offset.unwrap_or(0));
    if let Some(limit) = params.limit {
        query = query.with_limit(limit);
    }
    tracing::debug!("Searching for '{}'", params.q);
    repository.find(&query).await.map(Json).map_err(failure)
}

pub async fn handle_suggest(
    Query(params): Query<SuggestParams>,
    Extension(repository): Extension<Arc<ContentRepository>>,
) -> Result<Json<Vec<String>>, HandlerError> {
    repository
        .suggest(&params.dictionary, &params.seed, params.limit.unwrap_or(10))
        .await
        .map(Json)
        .map_err(failure)
}
