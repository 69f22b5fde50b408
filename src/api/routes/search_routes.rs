//! Search Routes
//!
//! 定义搜索相关的 API 路由。

use crate::api::handlers::search_handler::*;
use axum::{Router, routing::get};

use crate::api::app_state::AppState;

/// 创建搜索路由器
pub fn create_search_router() -> Router<AppState> {
    Router::new()
        .route("/search", get(search_get).post(search))
        .route(
            "/search/intelligent",
            get(intelligent_search_get).post(intelligent_search),
        )
}
