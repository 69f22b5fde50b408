//! 自然语言 → 结构化查询转换

use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::index::llm::LanguageModel;
use crate::models::search::StructuredQuery;

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^```[a-zA-Z]*\s*(.*?)\s*```$").expect("valid code fence pattern")
});

pub struct QueryTranslator {
    model: Arc<dyn LanguageModel>,
    system_prompt: String,
}

impl QueryTranslator {
    pub fn new(model: Arc<dyn LanguageModel>, system_prompt: impl Into<String>) -> Self {
        Self {
            model,
            system_prompt: system_prompt.into(),
        }
    }

    /// 转换失败时退回到多字段全文匹配，不会报错
    pub async fn translate(&self, text: &str) -> StructuredQuery {
        info!("Translating natural language query: {}", text);

        match self.try_translate(text).await {
            Ok(query) => {
                info!("Translated query: {}", query);
                query
            }
            Err(e) => {
                warn!("Query translation failed, using multi_match fallback: {}", e);
                StructuredQuery::multi_match(text)
            }
        }
    }

    async fn try_translate(&self, text: &str) -> Result<StructuredQuery> {
        let response = self
            .model
            .complete(&self.system_prompt, &Self::user_prompt(text))
            .await?;
        debug!("Raw model response: {}", response);

        StructuredQuery::parse(strip_code_fences(&response))
    }

    /// 可解析且顶层带 `query` 子句
    pub fn validate(raw: &str) -> bool {
        StructuredQuery::parse(raw).is_ok()
    }

    fn user_prompt(text: &str) -> String {
        format!(
            "请将以下自然语言查询转换为Elasticsearch DSL：\n\n\"{}\"\n\n请直接返回JSON格式的DSL，不要包含任何解释文字。",
            text
        )
    }
}

/// 去掉模型回复外层的 Markdown 代码块
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    CODE_FENCE
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map_or(trimmed, |body| body.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::index::llm::MockLanguageModel;
    use serde_json::json;

    fn translator(mock: MockLanguageModel) -> QueryTranslator {
        QueryTranslator::new(Arc::new(mock), "system")
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn test_validate() {
        assert!(QueryTranslator::validate(r#"{"query":{"match":{"title":"rust"}}}"#));
        assert!(!QueryTranslator::validate(r#"{"aggs":{}}"#));
        assert!(!QueryTranslator::validate("SELECT * FROM docs"));
    }

    #[tokio::test]
    async fn test_translate_accepts_fenced_response() {
        let mut mock = MockLanguageModel::new();
        mock.expect_complete()
            .withf(|system, user| system == "system" && user.contains("2023年的技术文章"))
            .times(1)
            .returning(|_, _| {
                Ok("```json\n{\"query\":{\"term\":{\"category\":\"技术\"}}}\n```".to_string())
            });

        let query = translator(mock).translate("2023年的技术文章").await;
        assert_eq!(query.query_clause(), &json!({ "term": { "category": "技术" } }));
    }

    #[tokio::test]
    async fn test_translate_falls_back_on_invalid_response() {
        let mut mock = MockLanguageModel::new();
        mock.expect_complete()
            .returning(|_, _| Ok("I cannot help with that".to_string()));

        let query = translator(mock).translate("统计 作者").await;
        assert_eq!(query, StructuredQuery::multi_match("统计 作者"));
    }

    #[tokio::test]
    async fn test_translate_falls_back_on_model_error() {
        let mut mock = MockLanguageModel::new();
        mock.expect_complete()
            .times(1)
            .returning(|_, _| Err(AppError::Translation("timeout".into())));

        let query = translator(mock).translate("rust").await;
        assert_eq!(query.query_clause()["multi_match"]["query"], "rust");
    }

    #[tokio::test]
    async fn test_translate_rejects_response_without_query() {
        let mut mock = MockLanguageModel::new();
        mock.expect_complete()
            .returning(|_, _| Ok(r#"{"aggs":{"by_author":{"terms":{"field":"author"}}}}"#.to_string()));

        let query = translator(mock).translate("按作者聚合").await;
        assert_eq!(query, StructuredQuery::multi_match("按作者聚合"));
    }
}
