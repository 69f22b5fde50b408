//! 外部协作方客户端：检索后端、嵌入模型、语言模型

pub mod backend;
pub mod elasticsearch;
pub mod embedding;
pub mod llm;
pub mod memory;

pub use backend::{
    BackendHit, BackendHits, ScoringScript, SearchBackend, StoredDocument, create_search_backend,
};
pub use elasticsearch::ElasticsearchBackend;
pub use embedding::{EmbeddingModel, cosine_similarity, create_embedding_model};
pub use llm::{LanguageModel, OpenAiChatModel};
pub use memory::MemoryBackend;
