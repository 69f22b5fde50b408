//! DTO 模块
//!
//! 定义 API 请求和响应的数据结构。

pub mod document_dto;
pub mod search_dto;

pub use document_dto::*;
pub use search_dto::*;
