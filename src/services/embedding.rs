//! 向量生成服务
//!
//! 在嵌入模型之上加一层按原文缓存，并把模型故障吸收成全零向量：
//! 调用方永远拿得到一个向量，只是全零向量会让相似度退化为 0。

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::index::embedding::{EmbeddingModel, cosine_similarity};

/// 缓存命中统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

pub struct EmbeddingProvider {
    model: Arc<dyn EmbeddingModel>,
    dimension: usize,
    cache: DashMap<String, Vec<f32>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingProvider {
    pub fn new(model: Arc<dyn EmbeddingModel>) -> Self {
        let dimension = model.dimension();
        Self {
            model,
            dimension,
            cache: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// 模型不可用时返回的全零向量
    pub fn zero_vector(&self) -> Vec<f32> {
        vec![0.0; self.dimension]
    }

    /// 非空且全零，即模型故障时的占位向量
    pub fn is_zero_vector(vector: &[f32]) -> bool {
        !vector.is_empty() && vector.iter().all(|v| *v == 0.0)
    }

    /// 单条文本生成向量。空白文本返回空向量；模型失败或维度不符时返回
    /// 全零向量，且不进缓存。
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        if let Some(cached) = self.cache.get(text) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return cached.clone();
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        match self.model.embed(&[text.to_string()]).await {
            Ok(mut vectors) if vectors.len() == 1 => {
                let vector = vectors.swap_remove(0);
                if !self.has_configured_dimension(&vector) {
                    return self.zero_vector();
                }
                self.cache.insert(text.to_string(), vector.clone());
                vector
            }
            Ok(vectors) => {
                warn!(
                    "Embedding model returned {} vectors for one input, using zero vector",
                    vectors.len()
                );
                self.zero_vector()
            }
            Err(e) => {
                warn!("Embedding failed, using zero vector: {}", e);
                self.zero_vector()
            }
        }
    }

    /// 批量生成向量，顺序与输入一致。
    ///
    /// 未命中缓存的文本合并成一次模型调用；批量调用失败或返回条数不对时
    /// 逐条回退到 [`Self::embed`]。
    pub async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let mut results: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut pending: Vec<(usize, String)> = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            if text.trim().is_empty() {
                results.push(Some(Vec::new()));
            } else if let Some(cached) = self.cache.get(text) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                results.push(Some(cached.clone()));
            } else {
                self.misses.fetch_add(1, Ordering::Relaxed);
                results.push(None);
                pending.push((i, text.clone()));
            }
        }

        if !pending.is_empty() {
            let inputs: Vec<String> = pending.iter().map(|(_, text)| text.clone()).collect();
            debug!("Batch embedding {} uncached texts", inputs.len());

            match self.model.embed(&inputs).await {
                Ok(vectors) if vectors.len() == inputs.len() => {
                    for ((i, text), vector) in pending.into_iter().zip(vectors) {
                        let vector = if self.has_configured_dimension(&vector) {
                            self.cache.insert(text, vector.clone());
                            vector
                        } else {
                            self.zero_vector()
                        };
                        results[i] = Some(vector);
                    }
                }
                outcome => {
                    match outcome {
                        Ok(vectors) => warn!(
                            "Batch embedding returned {} vectors for {} inputs, falling back to single calls",
                            vectors.len(),
                            inputs.len()
                        ),
                        Err(e) => warn!("Batch embedding failed, falling back to single calls: {}", e),
                    }
                    for (i, text) in pending {
                        results[i] = Some(self.embed(&text).await);
                    }
                }
            }
        }

        results.into_iter().map(Option::unwrap_or_default).collect()
    }

    /// 模型返回的向量维度必须与配置一致，否则按故障处理
    fn has_configured_dimension(&self, vector: &[f32]) -> bool {
        if vector.len() == self.dimension {
            return true;
        }
        warn!(
            "Embedding model returned {} dimensions, expected {}, using zero vector",
            vector.len(),
            self.dimension
        );
        false
    }

    /// 在后台任务中批量生成向量
    pub fn embed_batch_async(self: &Arc<Self>, texts: Vec<String>) -> EmbeddingHandle {
        let provider = Arc::clone(self);
        EmbeddingHandle {
            inner: tokio::spawn(async move { provider.embed_batch(&texts).await }),
        }
    }

    /// 余弦相似度
    pub fn cosine_similarity(&self, a: &[f32], b: &[f32]) -> Result<f64> {
        cosine_similarity(a, b)
    }

    /// 按权重合并两个向量：(a*wa + b*wb) / (wa + wb)
    pub fn combine(&self, a: &[f32], weight_a: f32, b: &[f32], weight_b: f32) -> Result<Vec<f32>> {
        if a.len() != b.len() {
            return Err(AppError::DimensionMismatch {
                left: a.len(),
                right: b.len(),
            });
        }

        let total = weight_a + weight_b;
        if total == 0.0 {
            return Err(AppError::Validation("向量合并权重之和不能为 0".into()));
        }

        Ok(a.iter()
            .zip(b)
            .map(|(x, y)| (x * weight_a + y * weight_b) / total)
            .collect())
    }

    /// 探测嵌入模型是否可用，结果不进缓存
    pub async fn is_available(&self) -> bool {
        match self.model.embed(&["test".to_string()]).await {
            Ok(vectors) => vectors.first().is_some_and(|v| v.len() == self.dimension),
            Err(e) => {
                debug!("Embedding model unavailable: {}", e);
                false
            }
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.len(),
        }
    }
}

/// 后台向量生成任务的句柄；丢弃句柄不会取消任务
pub struct EmbeddingHandle {
    inner: JoinHandle<Vec<Vec<f32>>>,
}

impl EmbeddingHandle {
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    pub async fn wait(self) -> Result<Vec<Vec<f32>>> {
        self.inner
            .await
            .map_err(|e| AppError::Internal(format!("向量生成任务异常退出: {}", e)))
    }
}
