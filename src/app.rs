//! 组装服务依赖

use axum::Router;
use std::sync::Arc;
use tracing::info;

use crate::api::{self, app_state::AppState};
use crate::config::AppConfig;
use crate::error::Result;
use crate::index::{
    EmbeddingModel, LanguageModel, OpenAiChatModel, SearchBackend, create_embedding_model,
    create_search_backend,
};
use crate::observability::{ObservabilityState, SearchMetrics};
use crate::services::{
    EmbeddingProvider, HealthProbe, HybridOrchestrator, QueryTranslator, SearchFacade,
};

/// 组装完成的应用
pub struct Application {
    pub state: AppState,
    pub observability: Arc<ObservabilityState>,
}

impl Application {
    /// 按配置创建真实的后端与模型客户端
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let backend: Arc<dyn SearchBackend> = Arc::from(create_search_backend(&config.backend)?);
        info!(
            "Search backend initialized: {} ({})",
            config.backend.kind, config.backend.index_name
        );

        let embedding_model: Arc<dyn EmbeddingModel> =
            Arc::from(create_embedding_model(&config.embedding)?);
        info!(
            "Embedding model initialized: {} (backend: {})",
            config.embedding.model_name, config.embedding.backend
        );

        let language_model: Arc<dyn LanguageModel> = Arc::new(OpenAiChatModel::new(&config.llm)?);
        info!("Language model initialized: {}", config.llm.model_name);

        Self::with_collaborators(config, backend, embedding_model, language_model)
    }

    /// 使用给定的协作方组装，测试中用来注入内存后端与假模型
    pub fn with_collaborators(
        config: &AppConfig,
        backend: Arc<dyn SearchBackend>,
        embedding_model: Arc<dyn EmbeddingModel>,
        language_model: Arc<dyn LanguageModel>,
    ) -> Result<Self> {
        let metrics = SearchMetrics::new()?;
        let embeddings = Arc::new(EmbeddingProvider::new(embedding_model));
        let facade = Arc::new(SearchFacade::new(
            backend,
            embeddings.clone(),
            config.backend.index_name.clone(),
            config.search.clone(),
        ));
        let translator = Arc::new(QueryTranslator::new(
            language_model,
            config.llm.system_prompt.clone(),
        ));
        let orchestrator = Arc::new(
            HybridOrchestrator::new(facade.clone(), embeddings.clone(), translator)
                .with_metrics(metrics.clone()),
        );
        let probe = Arc::new(HealthProbe::new(facade.clone(), embeddings.clone()));

        let observability = Arc::new(ObservabilityState::new(
            metrics,
            probe.clone(),
            embeddings,
            env!("CARGO_PKG_VERSION").to_string(),
        ));

        Ok(Self {
            state: AppState::new(orchestrator, facade, probe),
            observability,
        })
    }

    /// 启动时确保索引存在
    pub async fn initialize(&self) -> Result<()> {
        self.state.probe.initialize().await
    }

    pub fn router(&self) -> Router {
        api::create_router(self.state.clone(), self.observability.clone())
    }
}
