//! API 模块
//!
//! 提供 REST API 支持。

pub mod app_state;
pub mod dto;
pub mod handlers;
pub mod routes;

use crate::api::app_state::AppState;
use crate::observability::{ObservabilityState, create_observability_router, metrics_middleware};
use axum::Router;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub fn create_router(app_state: AppState, observability: Arc<ObservabilityState>) -> Router {
    let metrics = observability.metrics.clone();

    let api = Router::new()
        .merge(routes::search_routes::create_search_router())
        .merge(routes::document_routes::create_document_router())
        .with_state(app_state)
        .merge(create_observability_router(observability));

    Router::new()
        .nest("/api/v1", api)
        .layer(axum::middleware::from_fn_with_state(
            metrics,
            metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
