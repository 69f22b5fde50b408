//! 混合检索编排
//!
//! 选择策略、执行、合并去重，并在任何阶段失败时降级为全量查询。
//! 对调用方而言 [`HybridOrchestrator::search`] 永远不会失败。

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::models::document::Document;
use crate::models::search::{
    RetrievalStrategy, SearchOutcome, SearchPage, SearchQuery, StructuredQuery,
};
use crate::observability::SearchMetrics;
use crate::services::backend::SearchFacade;
use crate::services::embedding::EmbeddingProvider;
use crate::services::selector;
use crate::services::translator::QueryTranslator;

pub const FALLBACK_LABEL: &str = "Fallback Search";
pub const FAILED_LABEL: &str = "Search Failed";

/// 成功时的策略标签
pub fn strategy_label(strategy: RetrievalStrategy) -> String {
    format!("Hybrid Search - {}", strategy)
}

/// 先主后次、保持原顺序，按 (标题, 作者) 去重，最多 `max_size` 条
pub fn merge_dedup(primary: Vec<Document>, secondary: Vec<Document>, max_size: usize) -> Vec<Document> {
    let mut merged: Vec<Document> = Vec::with_capacity(max_size.min(primary.len() + secondary.len()));
    for doc in primary.into_iter().chain(secondary) {
        if merged.len() >= max_size {
            break;
        }
        if merged.iter().any(|seen| seen.dedup_key() == doc.dedup_key()) {
            continue;
        }
        merged.push(doc);
    }
    merged
}

/// 单个策略的执行结果
struct StrategyResult {
    generated: String,
    documents: Vec<Document>,
    total_hits: u64,
}

impl StrategyResult {
    fn single(generated: String, page: SearchPage) -> Self {
        Self {
            generated,
            total_hits: page.total_hits,
            documents: page.documents,
        }
    }

    fn merged(generated: String, primary: SearchPage, secondary: SearchPage, size: usize) -> Self {
        let primary_total = primary.total_hits;
        let documents = merge_dedup(primary.documents, secondary.documents, size);
        Self {
            generated,
            total_hits: primary_total.max(documents.len() as u64),
            documents,
        }
    }
}

pub struct HybridOrchestrator {
    facade: Arc<SearchFacade>,
    embeddings: Arc<EmbeddingProvider>,
    translator: Arc<QueryTranslator>,
    metrics: Option<SearchMetrics>,
}

impl HybridOrchestrator {
    pub fn new(
        facade: Arc<SearchFacade>,
        embeddings: Arc<EmbeddingProvider>,
        translator: Arc<QueryTranslator>,
    ) -> Self {
        Self {
            facade,
            embeddings,
            translator,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: SearchMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// 按查询文本自动选择策略
    pub async fn search(&self, query: &SearchQuery) -> SearchOutcome {
        self.search_with(query, None).await
    }

    /// `strategy` 为空时自动选择
    pub async fn search_with(
        &self,
        query: &SearchQuery,
        strategy: Option<RetrievalStrategy>,
    ) -> SearchOutcome {
        let start = Instant::now();
        let strategy = strategy.unwrap_or_else(|| selector::select(query.text()));
        info!(
            "Hybrid search started: query={:?} strategy={} page={} size={}",
            query.text(),
            strategy,
            query.page(),
            query.size()
        );

        let (result, label, degraded) = match self.execute(strategy, query).await {
            Ok(result) => (result, strategy_label(strategy), false),
            Err(e) => {
                warn!("Strategy {} failed, degrading: {}", strategy, e);
                let (result, label) = self.fallback(query).await;
                (result, label.to_string(), true)
            }
        };

        let elapsed = start.elapsed();
        info!(
            "Hybrid search finished: strategy={} degraded={} hits={} took={}ms",
            label,
            degraded,
            result.documents.len(),
            elapsed.as_millis()
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_search(strategy, degraded, elapsed);
        }

        SearchOutcome {
            original_query: query.text().to_string(),
            generated_dsl: result.generated,
            strategy: label,
            degraded,
            documents: result.documents,
            total_hits: result.total_hits,
            page: query.page(),
            size: query.size() as u32,
            took: elapsed.as_millis() as u64,
        }
    }

    async fn execute(&self, strategy: RetrievalStrategy, query: &SearchQuery) -> Result<StrategyResult> {
        match strategy {
            RetrievalStrategy::VectorFirst => self.vector_first(query).await,
            RetrievalStrategy::TextFirst => self.text_first(query).await,
            RetrievalStrategy::HybridBalanced => self.hybrid_balanced(query).await,
            RetrievalStrategy::AiEnhanced => self.ai_enhanced(query).await,
        }
    }

    /// 向量检索取 2×size，不足时用全量查询补齐
    async fn vector_first(&self, query: &SearchQuery) -> Result<StrategyResult> {
        let size = query.size();
        let vector = self.embeddings.embed(query.text()).await;
        let mut vector_page = self.vector_page(&vector, size * 2).await?;
        let generated = strategy_label(RetrievalStrategy::VectorFirst);

        if vector_page.len() >= size {
            vector_page.documents.truncate(size);
            return Ok(StrategyResult::single(generated, vector_page));
        }

        let shortfall = size - vector_page.len();
        debug!("Vector search returned {}, filling {} from match_all", vector_page.len(), shortfall);
        let text_page = self
            .facade
            .execute_structured(&StructuredQuery::match_all(), query.offset(), shortfall)
            .await?;

        Ok(StrategyResult::merged(generated, vector_page, text_page, size))
    }

    async fn text_first(&self, query: &SearchQuery) -> Result<StrategyResult> {
        let structured = StructuredQuery::multi_match(query.text());
        let page = self
            .facade
            .execute_structured(&structured, query.offset(), query.size())
            .await?;
        Ok(StrategyResult::single(structured.to_string(), page))
    }

    /// 后端混合打分；向量不可用时只跑文本子句
    async fn hybrid_balanced(&self, query: &SearchQuery) -> Result<StrategyResult> {
        let settings = self.facade.settings();
        let vector = self.embeddings.embed(query.text()).await;
        let generated = strategy_label(RetrievalStrategy::HybridBalanced);

        let page = if Self::is_usable(&vector) {
            self.facade
                .execute_hybrid(
                    query.text(),
                    &vector,
                    settings.text_boost,
                    settings.vector_boost,
                    query.size(),
                )
                .await?
        } else {
            warn!("No usable query vector, hybrid search runs text clause only");
            self.facade
                .execute_structured(&StructuredQuery::multi_match(query.text()), 0, query.size())
                .await?
        };

        Ok(StrategyResult::single(generated, page))
    }

    /// AI 转换查询，不足时用向量检索补齐
    async fn ai_enhanced(&self, query: &SearchQuery) -> Result<StrategyResult> {
        let size = query.size();
        let structured = self.translator.translate(query.text()).await;
        let generated = structured.to_string();
        let ai_page = self
            .facade
            .execute_structured(&structured, query.offset(), size)
            .await?;

        if ai_page.len() >= size {
            return Ok(StrategyResult::single(generated, ai_page));
        }

        let shortfall = size - ai_page.len();
        debug!("AI query returned {}, filling {} from vector search", ai_page.len(), shortfall);
        let vector = self.embeddings.embed(query.text()).await;
        let vector_page = self.vector_page(&vector, shortfall).await?;

        Ok(StrategyResult::merged(generated, ai_page, vector_page, size))
    }

    /// 空向量或全零向量不发起后端调用
    async fn vector_page(&self, vector: &[f32], limit: usize) -> Result<SearchPage> {
        if !Self::is_usable(vector) {
            debug!("Skipping vector search without a usable query vector");
            return Ok(SearchPage::empty());
        }
        self.facade
            .execute_vector_similarity(vector, limit, self.facade.settings().vector_min_score)
            .await
    }

    fn is_usable(vector: &[f32]) -> bool {
        !vector.is_empty() && !EmbeddingProvider::is_zero_vector(vector)
    }

    async fn fallback(&self, query: &SearchQuery) -> (StrategyResult, &'static str) {
        warn!("Running fallback search for {:?}", query.text());

        match self
            .facade
            .execute_structured(&StructuredQuery::match_all(), query.offset(), query.size())
            .await
        {
            Ok(page) => (
                StrategyResult::single(FALLBACK_LABEL.to_string(), page),
                FALLBACK_LABEL,
            ),
            Err(e) => {
                error!("Fallback search failed as well: {}", e);
                (
                    StrategyResult::single(FAILED_LABEL.to_string(), SearchPage::empty()),
                    FAILED_LABEL,
                )
            }
        }
    }
}
