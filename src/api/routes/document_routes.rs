//! Document Routes
//!
//! 定义文档写入、浏览与统计路由。

use crate::api::handlers::document_handler::*;
use axum::{
    Router,
    routing::{get, post},
};

use crate::api::app_state::AppState;

/// 创建文档路由器
pub fn create_document_router() -> Router<AppState> {
    Router::new()
        .route("/documents", get(list_documents).post(create_document))
        .route("/documents/batch", post(create_documents))
        .route("/documents/:id/similar", get(similar_documents))
        .route("/stats", get(stats))
}
