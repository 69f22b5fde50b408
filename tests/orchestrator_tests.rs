// Integration tests for the hybrid search orchestrator
//
// Tests cover:
// - Automatic strategy selection end to end
// - Degradation when the embedding model or the backend is unavailable
// - Result filling for vector-first and AI-enhanced strategies
// - Merge/deduplication through the public API

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use intellisearch::config::AppConfig;
use intellisearch::config::config::BackendConfig;
use intellisearch::error::{AppError, Result};
use intellisearch::index::{
    BackendHits, EmbeddingModel, LanguageModel, MemoryBackend, ScoringScript, SearchBackend,
    StoredDocument, create_search_backend,
};
use intellisearch::models::{Document, RetrievalStrategy, SearchQuery, StructuredQuery};
use intellisearch::services::{
    EmbeddingProvider, HybridOrchestrator, QueryTranslator, SearchFacade, merge_dedup,
};

// ============ Test doubles ============

/// 含“学习”的文本指向 x 轴，含 Rust 的指向 y 轴，其余指向 z 轴
struct KeywordEmbedding;

#[async_trait]
impl EmbeddingModel for KeywordEmbedding {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                if text.contains("学习") {
                    vec![1.0, 0.0, 0.0]
                } else if text.to_lowercase().contains("rust") {
                    vec![0.0, 1.0, 0.0]
                } else {
                    vec![0.0, 0.0, 1.0]
                }
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        3
    }
}

#[derive(Default)]
struct FailingEmbedding {
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingModel for FailingEmbedding {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AppError::Embedding("model offline".to_string()))
    }

    fn dimension(&self) -> usize {
        3
    }
}

/// 固定回复的语言模型，`None` 表示调用失败
struct ScriptedModel {
    reply: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    fn offline() -> Self {
        Self {
            reply: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply
            .clone()
            .ok_or_else(|| AppError::Http("connection refused".to_string()))
    }
}

/// 记录检索调用的内存后端，可以让脚本打分查询失败
#[derive(Default)]
struct RecordingBackend {
    inner: MemoryBackend,
    structured_calls: AtomicUsize,
    scripted_calls: AtomicUsize,
    structured_queries: Mutex<Vec<(Value, usize, usize)>>,
    fail_scripted: bool,
}

impl RecordingBackend {
    fn failing_scripted() -> Self {
        Self {
            fail_scripted: true,
            ..Self::default()
        }
    }

    fn structured_calls(&self) -> usize {
        self.structured_calls.load(Ordering::SeqCst)
    }

    fn scripted_calls(&self) -> usize {
        self.scripted_calls.load(Ordering::SeqCst)
    }

    fn last_structured_query(&self) -> Option<Value> {
        self.structured_queries
            .lock()
            .unwrap()
            .last()
            .map(|(query, _, _)| query.clone())
    }

    /// 最近一次结构化查询的 (offset, limit)
    fn last_structured_window(&self) -> Option<(usize, usize)> {
        self.structured_queries
            .lock()
            .unwrap()
            .last()
            .map(|(_, offset, limit)| (*offset, *limit))
    }
}

#[async_trait]
impl SearchBackend for RecordingBackend {
    async fn exists(&self, collection: &str) -> Result<bool> {
        self.inner.exists(collection).await
    }

    async fn create(&self, collection: &str, schema: &Value) -> Result<()> {
        self.inner.create(collection, schema).await
    }

    async fn search_structured(
        &self,
        collection: &str,
        query: &StructuredQuery,
        offset: usize,
        limit: usize,
    ) -> Result<BackendHits> {
        self.structured_calls.fetch_add(1, Ordering::SeqCst);
        self.structured_queries
            .lock()
            .unwrap()
            .push((query.as_value().clone(), offset, limit));
        self.inner
            .search_structured(collection, query, offset, limit)
            .await
    }

    async fn search_scripted(
        &self,
        collection: &str,
        script: &ScoringScript,
        min_score: Option<f32>,
        limit: usize,
    ) -> Result<BackendHits> {
        self.scripted_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_scripted {
            return Err(AppError::Backend("script execution failed".to_string()));
        }
        self.inner
            .search_scripted(collection, script, min_score, limit)
            .await
    }

    async fn index(&self, collection: &str, document: &StoredDocument) -> Result<String> {
        self.inner.index(collection, document).await
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        self.inner.count(collection).await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>> {
        self.inner.get(collection, id).await
    }
}

// ============ Harness ============

struct Harness {
    orchestrator: HybridOrchestrator,
    facade: Arc<SearchFacade>,
}

fn harness(
    backend: Arc<dyn SearchBackend>,
    embedding_model: Arc<dyn EmbeddingModel>,
    language_model: Arc<dyn LanguageModel>,
) -> Harness {
    let config = AppConfig::development();
    let embeddings = Arc::new(EmbeddingProvider::new(embedding_model));
    let facade = Arc::new(SearchFacade::new(
        backend,
        embeddings.clone(),
        "documents",
        config.search.clone(),
    ));
    let translator = Arc::new(QueryTranslator::new(language_model, config.llm.system_prompt));

    Harness {
        orchestrator: HybridOrchestrator::new(facade.clone(), embeddings, translator),
        facade,
    }
}

async fn seed(facade: &SearchFacade) {
    facade.ensure_collection_ready().await.unwrap();
    facade
        .index_many(vec![
            Document::new("Rust 所有权", "借用检查器", "编程", vec!["rust".into()], "李四"),
            Document::new("机器学习入门", "监督学习", "AI", vec![], "张三"),
            Document::new("数据库索引", "B+ 树", "数据库", vec![], "王五"),
        ])
        .await
        .unwrap();
}

fn titles(docs: &[Document]) -> Vec<&str> {
    docs.iter().map(|d| d.title.as_str()).collect()
}

// ============ Strategy selection ============

#[tokio::test]
async fn test_plain_keyword_runs_single_hybrid_query() {
    let backend = Arc::new(RecordingBackend::default());
    let h = harness(
        backend.clone(),
        Arc::new(KeywordEmbedding),
        Arc::new(ScriptedModel::offline()),
    );
    seed(&h.facade).await;

    let outcome = h.orchestrator.search(&SearchQuery::new("机器学习", 0, 10)).await;

    assert_eq!(outcome.strategy, "Hybrid Search - HYBRID_BALANCED");
    assert!(!outcome.degraded);
    assert_eq!(outcome.documents[0].title, "机器学习入门");
    assert_eq!(backend.structured_calls(), 1);
    assert_eq!(backend.scripted_calls(), 0);

    let query = backend.last_structured_query().unwrap();
    let should = query["query"]["bool"]["should"].as_array().unwrap();
    assert_eq!(should.len(), 2);
    assert!(should[0].get("script_score").is_some());
    assert!(should[1].get("multi_match").is_some());
}

#[tokio::test]
async fn test_semantic_query_runs_vector_first() {
    let backend = Arc::new(RecordingBackend::default());
    let h = harness(
        backend.clone(),
        Arc::new(KeywordEmbedding),
        Arc::new(ScriptedModel::offline()),
    );
    seed(&h.facade).await;

    let outcome = h
        .orchestrator
        .search(&SearchQuery::new("这篇文章和那个有什么相似之处", 0, 2))
        .await;

    assert_eq!(outcome.strategy, "Hybrid Search - VECTOR_FIRST");
    assert_eq!(outcome.generated_dsl, "Hybrid Search - VECTOR_FIRST");
    assert!(!outcome.degraded);
    assert_eq!(outcome.documents.len(), 2);
    assert_eq!(backend.scripted_calls(), 1);
    // 向量结果已足够，不需要补齐
    assert_eq!(backend.structured_calls(), 0);
}

#[tokio::test]
async fn test_explicit_text_first_overrides_selection() {
    let backend = Arc::new(RecordingBackend::default());
    let h = harness(
        backend.clone(),
        Arc::new(KeywordEmbedding),
        Arc::new(ScriptedModel::offline()),
    );
    seed(&h.facade).await;

    let outcome = h
        .orchestrator
        .search_with(
            &SearchQuery::new("Rust 有什么相似的语言", 0, 10),
            Some(RetrievalStrategy::TextFirst),
        )
        .await;

    assert_eq!(outcome.strategy, "Hybrid Search - TEXT_FIRST");
    assert!(outcome.generated_dsl.contains("multi_match"));
    assert_eq!(backend.scripted_calls(), 0);
    assert_eq!(backend.structured_calls(), 1);
}

// ============ Filling ============

#[tokio::test]
async fn test_vector_first_fills_shortfall_from_match_all_at_offset() {
    let backend = Arc::new(RecordingBackend::default());
    let h = harness(
        backend.clone(),
        Arc::new(KeywordEmbedding),
        Arc::new(ScriptedModel::offline()),
    );
    h.facade.ensure_collection_ready().await.unwrap();

    // 只有“乙”带向量，其余文档在向量检索里低于阈值
    for doc in [
        Document::new("甲", "", "", vec![], "x"),
        Document::new("乙", "", "", vec![], "x").with_combined_embedding(vec![0.0, 0.0, 1.0]),
        Document::new("丙", "", "", vec![], "x"),
    ] {
        backend
            .index("documents", &StoredDocument::from(&doc))
            .await
            .unwrap();
    }

    let outcome = h
        .orchestrator
        .search(&SearchQuery::new("这篇文章和那个有什么相似之处", 1, 2))
        .await;

    assert_eq!(outcome.strategy, "Hybrid Search - VECTOR_FIRST");
    assert!(!outcome.degraded);
    assert_eq!(backend.scripted_calls(), 1);
    assert_eq!(backend.structured_calls(), 1);

    let fill = backend.last_structured_query().unwrap();
    assert!(fill["query"].get("match_all").is_some());
    // 第 1 页、每页 2 条：补齐从 offset 2 开始，只取缺少的 1 条
    assert_eq!(backend.last_structured_window(), Some((2, 1)));

    assert_eq!(titles(&outcome.documents), vec!["乙", "丙"]);
    assert_eq!(outcome.total_hits, 2);
}

#[tokio::test]
async fn test_ai_enhanced_fills_from_vector_search() {
    let backend = Arc::new(RecordingBackend::default());
    let model = Arc::new(ScriptedModel::replying(
        "```json\n{\"query\": {\"term\": {\"category\": \"编程\"}}}\n```",
    ));
    let h = harness(backend.clone(), Arc::new(KeywordEmbedding), model.clone());
    seed(&h.facade).await;

    let outcome = h
        .orchestrator
        .search(&SearchQuery::new("rust AND tokio", 0, 3))
        .await;

    assert_eq!(outcome.strategy, "Hybrid Search - AI_ENHANCED");
    assert!(outcome.generated_dsl.contains("\"term\""));
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    assert_eq!(backend.scripted_calls(), 1);

    // 补齐的向量结果里又出现了 Rust 文档，去重后只剩两条
    assert_eq!(titles(&outcome.documents), vec!["Rust 所有权", "机器学习入门"]);
    assert_eq!(outcome.total_hits, 2);
}

#[tokio::test]
async fn test_ai_enhanced_uses_keyword_query_when_model_offline() {
    let backend = Arc::new(RecordingBackend::default());
    let h = harness(
        backend.clone(),
        Arc::new(KeywordEmbedding),
        Arc::new(ScriptedModel::offline()),
    );
    seed(&h.facade).await;

    let outcome = h
        .orchestrator
        .search_with(
            &SearchQuery::new("数据库", 0, 1),
            Some(RetrievalStrategy::AiEnhanced),
        )
        .await;

    assert!(!outcome.degraded);
    assert_eq!(titles(&outcome.documents), vec!["数据库索引"]);
    assert!(outcome.generated_dsl.contains("multi_match"));
    assert_eq!(backend.scripted_calls(), 0);
}

// ============ Degradation ============

#[tokio::test]
async fn test_failing_embedding_returns_uncached_zero_vector() {
    let model = Arc::new(FailingEmbedding::default());
    let provider = EmbeddingProvider::new(model.clone());

    assert_eq!(provider.embed("机器学习").await, vec![0.0; 3]);
    assert_eq!(provider.embed("机器学习").await, vec![0.0; 3]);

    assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    assert_eq!(provider.cache_stats().entries, 0);
}

#[tokio::test]
async fn test_hybrid_without_embeddings_runs_text_clause_only() {
    let backend = Arc::new(RecordingBackend::default());
    let h = harness(
        backend.clone(),
        Arc::new(FailingEmbedding::default()),
        Arc::new(ScriptedModel::offline()),
    );
    seed(&h.facade).await;

    let outcome = h.orchestrator.search(&SearchQuery::new("Rust", 0, 10)).await;

    assert_eq!(outcome.strategy, "Hybrid Search - HYBRID_BALANCED");
    assert!(!outcome.degraded);
    assert_eq!(titles(&outcome.documents), vec!["Rust 所有权"]);

    let query = backend.last_structured_query().unwrap();
    assert!(query["query"].get("multi_match").is_some());
}

#[tokio::test]
async fn test_vector_failure_degrades_to_fallback_search() {
    let backend = Arc::new(RecordingBackend::failing_scripted());
    let h = harness(
        backend.clone(),
        Arc::new(KeywordEmbedding),
        Arc::new(ScriptedModel::offline()),
    );
    seed(&h.facade).await;

    let outcome = h
        .orchestrator
        .search(&SearchQuery::new("what is ownership", 0, 10))
        .await;

    assert!(outcome.degraded);
    assert_eq!(outcome.strategy, "Fallback Search");
    assert_eq!(outcome.generated_dsl, "Fallback Search");
    assert_eq!(outcome.documents.len(), 3);
    assert_eq!(outcome.total_hits, 3);
}

#[tokio::test]
async fn test_unreachable_backend_reports_search_failed() {
    let config = BackendConfig {
        kind: "elasticsearch".into(),
        url: "http://127.0.0.1:1".into(),
        index_name: "documents".into(),
        username: String::new(),
        password: String::new(),
        connect_timeout_ms: 500,
        request_timeout_ms: 1_000,
    };
    let backend: Arc<dyn SearchBackend> = Arc::from(create_search_backend(&config).unwrap());
    let h = harness(
        backend,
        Arc::new(KeywordEmbedding),
        Arc::new(ScriptedModel::offline()),
    );

    let outcome = h.orchestrator.search(&SearchQuery::new("机器学习", 1, 5)).await;

    assert!(outcome.degraded);
    assert_eq!(outcome.strategy, "Search Failed");
    assert_eq!(outcome.original_query, "机器学习");
    assert!(outcome.documents.is_empty());
    assert_eq!(outcome.total_hits, 0);
    assert_eq!(outcome.page, 1);
    assert_eq!(outcome.size, 5);
}

// ============ Merge ============

#[test]
fn test_merge_dedup_public_behaviour() {
    let doc = |title: &str| Document::new(title, "", "", vec![], "x");

    let merged = merge_dedup(vec![doc("A"), doc("B")], vec![doc("B"), doc("C")], 3);
    assert_eq!(titles(&merged), vec!["A", "B", "C"]);

    let again = merge_dedup(merged.clone(), merged.clone(), 3);
    assert_eq!(again, merged);
}
