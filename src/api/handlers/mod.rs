//! Handlers 模块
//!
//! 处理 API 请求。

pub mod document_handler;
pub mod search_handler;
