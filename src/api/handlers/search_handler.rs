use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use tracing::debug;

use crate::{
    api::{app_state::AppState, dto::search_dto::SearchRequest},
    error::AppError,
    models::search::{RetrievalStrategy, SearchOutcome},
};

async fn run_search(
    state: &AppState,
    request: SearchRequest,
    forced: Option<RetrievalStrategy>,
) -> Result<Json<SearchOutcome>, AppError> {
    let (query, requested) = request.into_query()?;
    debug!(
        "Search request: query={:?} page={} size={} strategy={:?}",
        query.text(),
        query.page(),
        query.size(),
        forced.or(requested)
    );

    let outcome = state
        .orchestrator
        .search_with(&query, forced.or(requested))
        .await;
    Ok(Json(outcome))
}

pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<impl IntoResponse, AppError> {
    run_search(&state, request, None).await
}

pub async fn search_get(
    State(state): State<AppState>,
    Query(request): Query<SearchRequest>,
) -> Result<impl IntoResponse, AppError> {
    run_search(&state, request, None).await
}

/// AI 转换查询
pub async fn intelligent_search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<impl IntoResponse, AppError> {
    run_search(&state, request, Some(RetrievalStrategy::AiEnhanced)).await
}

pub async fn intelligent_search_get(
    State(state): State<AppState>,
    Query(request): Query<SearchRequest>,
) -> Result<impl IntoResponse, AppError> {
    run_search(&state, request, Some(RetrievalStrategy::AiEnhanced)).await
}
