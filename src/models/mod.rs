//! 数据模型模块

pub mod document;
pub mod search;

pub use document::{DedupKey, Document};
pub use search::{
    RetrievalStrategy, SEARCH_FIELDS, SearchOutcome, SearchPage, SearchQuery, StructuredQuery,
};
