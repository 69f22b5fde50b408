//! 文档 DTO

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{AppError, Result};
use crate::models::document::{Document, create_time_format};

/// 批量写入的最大条数
pub const MAX_BATCH_SIZE: usize = 500;

/// 创建文档请求
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocumentRequest {
    /// 标题
    #[validate(length(min = 1, max = 500))]
    pub title: String,
    /// 正文
    #[serde(default)]
    pub content: String,
    /// 分类
    #[serde(default)]
    #[validate(length(max = 100))]
    pub category: String,
    /// 标签
    #[serde(default)]
    pub tags: Vec<String>,
    /// 作者
    #[serde(default)]
    #[validate(length(max = 100))]
    pub author: String,
    /// 创建时间，缺省为当前时间
    #[serde(default = "crate::models::document::now", with = "create_time_format")]
    pub create_time: NaiveDateTime,
}

impl CreateDocumentRequest {
    pub fn into_document(self) -> Result<Document> {
        self.validate()?;
        if self.title.trim().is_empty() {
            return Err(AppError::Validation("标题不能为空".to_string()));
        }

        let mut document = Document::new(
            self.title,
            self.content,
            self.category,
            self.tags,
            self.author,
        );
        document.create_time = self.create_time;
        Ok(document)
    }
}

/// 批量写入请求体即文档数组
pub fn into_documents(requests: Vec<CreateDocumentRequest>) -> Result<Vec<Document>> {
    if requests.is_empty() {
        return Err(AppError::Validation("文档列表不能为空".to_string()));
    }
    if requests.len() > MAX_BATCH_SIZE {
        return Err(AppError::Validation(format!(
            "单次最多写入 {} 个文档",
            MAX_BATCH_SIZE
        )));
    }
    requests
        .into_iter()
        .map(CreateDocumentRequest::into_document)
        .collect()
}

/// 分页参数
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct PageParams {
    pub page: u32,
    #[validate(range(min = 1, max = 100))]
    pub size: u32,
}

impl Default for PageParams {
    fn default() -> Self {
        Self { page: 0, size: 10 }
    }
}

impl PageParams {
    pub fn offset(&self) -> usize {
        self.page as usize * self.size as usize
    }
}

/// 批量写入响应
#[derive(Debug, Serialize)]
pub struct BatchIndexResponse {
    pub indexed: usize,
    pub documents: Vec<Document>,
}

/// 文档分页响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPageResponse {
    pub documents: Vec<Document>,
    pub total_hits: u64,
    pub page: u32,
    pub size: u32,
}

/// 索引统计
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub collection: String,
    pub document_count: u64,
}
