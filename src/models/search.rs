//! 检索请求、策略与结果模型

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;

use crate::error::{AppError, Result};
use crate::models::document::Document;

/// 全文检索默认覆盖的字段，标题加权
pub const SEARCH_FIELDS: [&str; 5] = ["title^2", "content", "category", "tags", "author"];

/// 检索请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    text: String,
    page: u32,
    size: u32,
}

impl SearchQuery {
    /// `size` 至少为 1
    pub fn new(text: impl Into<String>, page: u32, size: u32) -> Self {
        Self {
            text: text.into(),
            page,
            size: size.max(1),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn size(&self) -> usize {
        self.size as usize
    }

    /// 分页偏移量 page * size
    pub fn offset(&self) -> usize {
        self.page as usize * self.size as usize
    }
}

/// 检索策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetrievalStrategy {
    /// 向量检索优先，不足时用全量查询补齐
    VectorFirst,
    /// 传统全文检索
    TextFirst,
    /// 后端侧文本 + 向量加权混合
    HybridBalanced,
    /// AI 转换查询，不足时用向量检索补齐
    AiEnhanced,
}

impl RetrievalStrategy {
    pub const ALL: [RetrievalStrategy; 4] = [
        RetrievalStrategy::VectorFirst,
        RetrievalStrategy::TextFirst,
        RetrievalStrategy::HybridBalanced,
        RetrievalStrategy::AiEnhanced,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalStrategy::VectorFirst => "VECTOR_FIRST",
            RetrievalStrategy::TextFirst => "TEXT_FIRST",
            RetrievalStrategy::HybridBalanced => "HYBRID_BALANCED",
            RetrievalStrategy::AiEnhanced => "AI_ENHANCED",
        }
    }
}

impl fmt::Display for RetrievalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetrievalStrategy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == normalized)
            .ok_or_else(|| AppError::Validation(format!("未知的检索策略: {s}")))
    }
}

/// 后端原生的结构化查询
///
/// 只能通过校验过的构造函数得到，保证顶层一定有 `query` 子句。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StructuredQuery(Value);

impl StructuredQuery {
    /// 解析 JSON 文本并校验
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| AppError::Translation(format!("查询不是合法的 JSON: {e}")))?;
        Self::from_value(value)
    }

    /// 校验已有的 JSON 树
    pub fn from_value(value: Value) -> Result<Self> {
        if Self::has_query_clause(&value) {
            Ok(Self(value))
        } else {
            Err(AppError::Translation(
                "查询必须包含顶层 query 子句".to_string(),
            ))
        }
    }

    /// 顶层存在非空的 `query` 对象
    pub fn has_query_clause(value: &Value) -> bool {
        value
            .get("query")
            .and_then(Value::as_object)
            .is_some_and(|clause| !clause.is_empty())
    }

    /// 匹配全部文档
    pub fn match_all() -> Self {
        Self(json!({ "query": { "match_all": {} } }))
    }

    /// 多字段全文匹配，原样使用输入文本
    pub fn multi_match(text: &str) -> Self {
        Self(json!({
            "query": {
                "multi_match": {
                    "query": text,
                    "fields": SEARCH_FIELDS,
                }
            }
        }))
    }

    /// 顶层 query 子句
    pub fn query_clause(&self) -> &Value {
        &self.0["query"]
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl fmt::Display for StructuredQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 单次后端调用的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub documents: Vec<Document>,
    pub total_hits: u64,
    pub took_ms: u64,
}

impl SearchPage {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// 一次检索请求的最终结果，构造后不再修改
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    /// 原始查询文本
    pub original_query: String,
    /// 实际执行的查询或策略标签，用于诊断
    pub generated_dsl: String,
    /// 实际运行的策略标签，降级时为 "Fallback Search" / "Search Failed"
    pub strategy: String,
    /// 是否发生降级
    pub degraded: bool,
    pub documents: Vec<Document>,
    pub total_hits: u64,
    pub page: u32,
    pub size: u32,
    /// 耗时（毫秒）
    pub took: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_query_offset() {
        let query = SearchQuery::new("rust", 3, 10);
        assert_eq!(query.offset(), 30);
        assert_eq!(query.size(), 10);

        let clamped = SearchQuery::new("rust", 0, 0);
        assert_eq!(clamped.size(), 1);
    }

    #[test]
    fn test_strategy_round_trip_names() {
        assert_eq!(
            "hybrid_balanced".parse::<RetrievalStrategy>().unwrap(),
            RetrievalStrategy::HybridBalanced
        );
        assert_eq!(
            "TEXT-FIRST".parse::<RetrievalStrategy>().unwrap(),
            RetrievalStrategy::TextFirst
        );
        assert!("fastest".parse::<RetrievalStrategy>().is_err());
        assert_eq!(RetrievalStrategy::AiEnhanced.to_string(), "AI_ENHANCED");
        assert_eq!(
            serde_json::to_value(RetrievalStrategy::VectorFirst).unwrap(),
            "VECTOR_FIRST"
        );
    }

    #[test]
    fn test_structured_query_requires_query_clause() {
        assert!(StructuredQuery::parse(r#"{"query":{"match_all":{}}}"#).is_ok());
        assert!(StructuredQuery::parse(r#"{"size":10}"#).is_err());
        assert!(StructuredQuery::parse(r#"{"query":{}}"#).is_err());
        assert!(StructuredQuery::parse(r#"{"query":"text"}"#).is_err());
        assert!(StructuredQuery::parse("not json").is_err());
    }

    #[test]
    fn test_multi_match_uses_text_verbatim() {
        let query = StructuredQuery::multi_match("Rust \"并发\"");
        let clause = &query.query_clause()["multi_match"];
        assert_eq!(clause["query"], "Rust \"并发\"");
        assert_eq!(clause["fields"][0], "title^2");
        assert_eq!(clause["fields"].as_array().unwrap().len(), 5);
    }
}
