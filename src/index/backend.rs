//! 检索后端客户端抽象

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::config::config::BackendConfig;
use crate::error::{AppError, Result};
use crate::models::document::{Document, create_time_format, now};
use crate::models::search::StructuredQuery;

/// 向量相似度打分脚本：有组合向量的文档得分为余弦相似度 + 1，
/// 没有向量的文档取 `params.missing_score`，只降权不排除。
pub const VECTOR_SIMILARITY_SCRIPT: &str = "if (doc.containsKey('combinedEmbedding') && doc['combinedEmbedding'].size() > 0) { return cosineSimilarity(params.query_vector, 'combinedEmbedding') + 1.0; } return params.missing_score;";

/// 后端存储的文档形态，包含向量字段
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(with = "create_time_format", default = "now")]
    pub create_time: NaiveDateTime,
    #[serde(default)]
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combined_embedding: Option<Vec<f32>>,
}

impl From<&Document> for StoredDocument {
    fn from(doc: &Document) -> Self {
        Self {
            title: doc.title.clone(),
            content: doc.content.clone(),
            category: doc.category.clone(),
            tags: doc.tags.clone(),
            create_time: doc.create_time,
            author: doc.author.clone(),
            title_embedding: doc.title_embedding.clone(),
            content_embedding: doc.content_embedding.clone(),
            combined_embedding: doc.combined_embedding.clone(),
        }
    }
}

impl StoredDocument {
    pub fn into_document(self, id: Option<String>) -> Document {
        Document {
            id,
            title: self.title,
            content: self.content,
            category: self.category,
            tags: self.tags,
            create_time: self.create_time,
            author: self.author,
            title_embedding: self.title_embedding,
            content_embedding: self.content_embedding,
            combined_embedding: self.combined_embedding,
        }
    }
}

/// 后端返回的一条命中
#[derive(Debug, Clone, PartialEq)]
pub struct BackendHit {
    pub id: String,
    pub score: Option<f32>,
    pub source: StoredDocument,
}

/// 后端的一次查询结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendHits {
    pub hits: Vec<BackendHit>,
    pub total: u64,
    pub took_ms: u64,
}

/// 脚本打分查询
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringScript {
    /// 参与打分的文档集合
    pub base_query: Value,
    /// 脚本源码
    pub source: String,
    /// 脚本参数
    pub params: Map<String, Value>,
}

impl ScoringScript {
    /// 全部文档上的向量相似度打分
    pub fn vector_similarity(vector: &[f32], missing_score: f32) -> Self {
        Self::vector_similarity_over(json!({ "match_all": {} }), vector, missing_score)
    }

    /// 指定文档集合上的向量相似度打分
    pub fn vector_similarity_over(base_query: Value, vector: &[f32], missing_score: f32) -> Self {
        let mut params = Map::new();
        params.insert("query_vector".into(), json!(vector));
        params.insert("missing_score".into(), json!(missing_score));
        Self {
            base_query,
            source: VECTOR_SIMILARITY_SCRIPT.to_string(),
            params,
        }
    }

    /// 转成后端的 `script_score` 子句
    pub fn to_clause(&self, min_score: Option<f32>, boost: Option<f32>) -> Value {
        let mut clause = json!({
            "query": self.base_query,
            "script": {
                "source": self.source,
                "params": self.params,
            }
        });
        if let Some(min_score) = min_score {
            clause["min_score"] = json!(min_score);
        }
        if let Some(boost) = boost {
            clause["boost"] = json!(boost);
        }
        json!({ "script_score": clause })
    }
}

/// 检索后端
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn exists(&self, collection: &str) -> Result<bool>;
    async fn create(&self, collection: &str, schema: &Value) -> Result<()>;
    async fn search_structured(
        &self,
        collection: &str,
        query: &StructuredQuery,
        offset: usize,
        limit: usize,
    ) -> Result<BackendHits>;
    async fn search_scripted(
        &self,
        collection: &str,
        script: &ScoringScript,
        min_score: Option<f32>,
        limit: usize,
    ) -> Result<BackendHits>;
    /// 写入文档，返回后端分配的 ID
    async fn index(&self, collection: &str, document: &StoredDocument) -> Result<String>;
    async fn count(&self, collection: &str) -> Result<u64>;
    /// 按 ID 读取完整文档（包含向量字段）
    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>>;
}

pub fn create_search_backend(config: &BackendConfig) -> Result<Box<dyn SearchBackend>> {
    use crate::index::elasticsearch::ElasticsearchBackend;
    use crate::index::memory::MemoryBackend;

    match config.kind.as_str() {
        "elasticsearch" => Ok(Box::new(ElasticsearchBackend::new(config)?)),
        "memory" => Ok(Box::new(MemoryBackend::new())),
        other => Err(AppError::Config(format!("未知的检索后端类型: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_document_keeps_embeddings() {
        let doc = Document::new("t", "c", "k", vec!["x".into()], "a")
            .with_combined_embedding(vec![1.0, 0.0]);
        let stored = StoredDocument::from(&doc);

        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json["combinedEmbedding"], json!([1.0, 0.0]));
        assert!(json.get("titleEmbedding").is_none());

        let back = stored.into_document(Some("id-1".into()));
        assert_eq!(back.id.as_deref(), Some("id-1"));
        assert_eq!(back.combined_embedding, Some(vec![1.0, 0.0]));
    }

    #[test]
    fn test_scoring_script_clause() {
        let script = ScoringScript::vector_similarity(&[0.5, 0.5], 0.1);
        let clause = script.to_clause(Some(0.5), Some(3.0));

        let inner = &clause["script_score"];
        assert_eq!(inner["query"], json!({ "match_all": {} }));
        assert_eq!(inner["script"]["params"]["query_vector"], json!([0.5, 0.5]));
        assert_eq!(inner["min_score"], json!(0.5));
        assert_eq!(inner["boost"], json!(3.0));
    }
}
