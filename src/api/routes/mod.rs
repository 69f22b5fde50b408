//! Routes 模块
//!
//! 定义 API 路由。

pub mod document_routes;
pub mod search_routes;
