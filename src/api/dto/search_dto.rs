//! 搜索 DTO
//!
//! 定义搜索相关的请求数据结构；响应直接使用 [`SearchOutcome`](crate::models::SearchOutcome)。

use serde::Deserialize;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::models::search::{RetrievalStrategy, SearchQuery};

/// 默认每页条数
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// 搜索请求，POST body 与 GET 查询参数共用
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct SearchRequest {
    /// 搜索查询
    #[validate(length(min = 1, max = 1000))]
    pub query: String,
    /// 页码，从 0 开始
    pub page: u32,
    /// 每页条数
    #[validate(range(min = 1, max = 100))]
    pub size: u32,
    /// 显式指定策略，为空时自动选择
    pub strategy: Option<String>,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            page: 0,
            size: DEFAULT_PAGE_SIZE,
            strategy: None,
        }
    }
}

impl SearchRequest {
    /// 校验并转换为检索请求与可选策略
    pub fn into_query(self) -> Result<(SearchQuery, Option<RetrievalStrategy>)> {
        self.validate()?;
        if self.query.trim().is_empty() {
            return Err(AppError::Validation("查询内容不能为空".to_string()));
        }

        let strategy = self
            .strategy
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(str::parse::<RetrievalStrategy>)
            .transpose()?;

        Ok((SearchQuery::new(self.query, self.page, self.size), strategy))
    }
}

/// 相似文档查询参数
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct SimilarParams {
    #[validate(range(min = 1, max = 100))]
    pub size: u32,
}

impl Default for SimilarParams {
    fn default() -> Self {
        Self {
            size: DEFAULT_PAGE_SIZE,
        }
    }
}
