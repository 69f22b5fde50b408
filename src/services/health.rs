//! 健康检查与启动初始化

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::error::Result;
use crate::services::backend::SearchFacade;
use crate::services::embedding::EmbeddingProvider;

/// 单个依赖的检查结果
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DependencyCheck {
    pub name: String,
    pub healthy: bool,
    pub message: String,
    pub latency_ms: u64,
}

/// 健康报告；整体状态只取决于检索后端，嵌入模型不可用时检索会自行降级
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HealthReport {
    pub status: String,
    pub collection: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_count: Option<u64>,
    pub checks: Vec<DependencyCheck>,
    pub timestamp: String,
}

impl HealthReport {
    pub fn is_up(&self) -> bool {
        self.status == "UP"
    }
}

pub struct HealthProbe {
    facade: Arc<SearchFacade>,
    embeddings: Arc<EmbeddingProvider>,
}

impl HealthProbe {
    pub fn new(facade: Arc<SearchFacade>, embeddings: Arc<EmbeddingProvider>) -> Self {
        Self { facade, embeddings }
    }

    /// 计数查询能成功即视为健康
    pub async fn is_healthy(&self) -> bool {
        match self.facade.count_all().await {
            Ok(_) => true,
            Err(e) => {
                warn!("Health check failed: {}", e);
                false
            }
        }
    }

    /// 启动时确保索引存在，失败直接返回错误
    pub async fn initialize(&self) -> Result<()> {
        info!("Initializing collection {}", self.facade.collection());
        self.facade.ensure_collection_ready().await
    }

    pub async fn report(&self) -> HealthReport {
        let start = Instant::now();
        let count = self.facade.count_all().await;
        let backend_check = DependencyCheck {
            name: "search_backend".into(),
            healthy: count.is_ok(),
            message: match &count {
                Ok(n) => format!("{} documents", n),
                Err(e) => e.to_string(),
            },
            latency_ms: start.elapsed().as_millis() as u64,
        };

        let start = Instant::now();
        let available = self.embeddings.is_available().await;
        let embedding_check = DependencyCheck {
            name: "embedding_model".into(),
            healthy: available,
            message: if available {
                "available".into()
            } else {
                "unavailable, vector search degrades to zero vectors".into()
            },
            latency_ms: start.elapsed().as_millis() as u64,
        };

        HealthReport {
            status: if backend_check.healthy { "UP" } else { "DOWN" }.into(),
            collection: self.facade.collection().to_string(),
            document_count: count.ok(),
            checks: vec![backend_check, embedding_check],
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}
