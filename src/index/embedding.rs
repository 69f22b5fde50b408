//! 嵌入模型客户端

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::config::EmbeddingConfig;
use crate::error::{AppError, Result};

/// 文本 → 向量的外部模型
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// 批量生成向量，返回顺序与输入一致
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    fn dimension(&self) -> usize;
}

/// OpenAI 兼容的 Embedding 客户端（`POST {base_url}/embeddings`）
pub struct OpenAiEmbeddingModel {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model_name: String,
    dimension: usize,
}

#[derive(Serialize)]
struct OpenAiEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'static str,
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedData>,
}

#[derive(Deserialize)]
struct OpenAiEmbedData {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAiEmbeddingModel {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model_name: config.model_name.clone(),
            dimension: config.dimension,
        })
    }
}

#[async_trait]
impl EmbeddingModel for OpenAiEmbeddingModel {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!("Embedding {} texts with model {}", texts.len(), self.model_name);

        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&OpenAiEmbedRequest {
                model: &self.model_name,
                input: texts,
                encoding_format: "float",
            });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Embedding(format!(
                "OpenAI embedding failed ({}): {}",
                status, error_text
            )));
        }

        let mut data = response.json::<OpenAiEmbedResponse>().await?.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Ollama Embedding 模型客户端
pub struct OllamaEmbeddingModel {
    client: reqwest::Client,
    model_name: String,
    base_url: String,
    dimension: usize,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbeddingModel {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;

        Ok(Self {
            client,
            model_name: config.model_name.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            dimension: config.dimension,
        })
    }
}

#[async_trait]
impl EmbeddingModel for OllamaEmbeddingModel {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&serde_json::json!({
                "model": self.model_name,
                "input": texts,
                "truncate": true
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Embedding(format!(
                "Ollama embedding failed: {}",
                error_text
            )));
        }

        let embed_response: OllamaEmbedResponse = response.json().await?;
        Ok(embed_response.embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// 余弦相似度；维度不一致时报错，任一向量模为 0 时返回 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(AppError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let dot_product: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    Ok(dot_product / (norm_a * norm_b))
}

pub fn create_embedding_model(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingModel>> {
    match config.backend.as_str() {
        "openai" => Ok(Box::new(OpenAiEmbeddingModel::new(config)?)),
        "ollama" => Ok(Box::new(OllamaEmbeddingModel::new(config)?)),
        other => Err(AppError::Config(format!(
            "未知的嵌入模型后端: {}",
            other
        ))),
    }
}
