//! 服务模块

pub mod backend;
pub mod embedding;
pub mod health;
pub mod orchestrator;
pub mod selector;
pub mod translator;

pub use backend::{SearchFacade, collection_schema};
pub use embedding::{CacheStats, EmbeddingHandle, EmbeddingProvider};
pub use health::{DependencyCheck, HealthProbe, HealthReport};
pub use orchestrator::{HybridOrchestrator, merge_dedup, strategy_label};
pub use selector::select;
pub use translator::QueryTranslator;
