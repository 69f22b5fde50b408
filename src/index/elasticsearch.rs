//! Elasticsearch REST 客户端

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use crate::config::config::BackendConfig;
use crate::error::{AppError, Result};
use crate::index::backend::{BackendHit, BackendHits, ScoringScript, SearchBackend, StoredDocument};
use crate::models::search::StructuredQuery;

/// 返回给调用方的命中不带向量字段
const EMBEDDING_FIELDS: [&str; 3] = ["titleEmbedding", "contentEmbedding", "combinedEmbedding"];

pub struct ElasticsearchBackend {
    client: reqwest::Client,
    base_url: String,
    username: Option<String>,
    password: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    took: u64,
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    total: Option<TotalHits>,
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TotalHits {
    Object { value: u64 },
    Legacy(u64),
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score")]
    score: Option<f32>,
    #[serde(rename = "_source")]
    source: StoredDocument,
}

#[derive(Deserialize)]
struct IndexResponse {
    #[serde(rename = "_id")]
    id: String,
}

#[derive(Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Deserialize)]
struct GetResponse {
    found: bool,
    #[serde(rename = "_source")]
    source: Option<StoredDocument>,
}

impl ElasticsearchBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: (!config.username.is_empty()).then(|| config.username.clone()),
            password: config.password.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.authorized(
            self.client
                .request(method, format!("{}/{}", self.base_url, path)),
        )
    }

    /// 文档地址，ID 作为单独的路径段编码
    fn document_url(&self, collection: &str, id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| AppError::Config(format!("检索后端地址无效: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| AppError::Config(format!("检索后端地址无效: {}", self.base_url)))?
            .pop_if_empty()
            .extend([collection, "_doc", id]);
        Ok(url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(username) => builder.basic_auth(username, Some(&self.password)),
            None => builder,
        }
    }

    async fn send(builder: RequestBuilder, action: &str) -> Result<reqwest::Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| AppError::Backend(format!("{} 请求失败: {}", action, e)))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(AppError::Backend(format!(
            "{} 失败 ({}): {}",
            action, status, body
        )))
    }

    async fn run_search(&self, collection: &str, body: Value) -> Result<BackendHits> {
        debug!("Elasticsearch search on {}: {}", collection, body);

        let response = Self::send(
            self.request(Method::POST, &format!("{}/_search", collection))
                .json(&body),
            "search",
        )
        .await?;

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| AppError::Backend(format!("无法解析检索结果: {}", e)))?;

        let total = match parsed.hits.total {
            Some(TotalHits::Object { value }) | Some(TotalHits::Legacy(value)) => value,
            None => parsed.hits.hits.len() as u64,
        };

        Ok(BackendHits {
            hits: parsed
                .hits
                .hits
                .into_iter()
                .map(|hit| BackendHit {
                    id: hit.id,
                    score: hit.score,
                    source: hit.source,
                })
                .collect(),
            total,
            took_ms: parsed.took,
        })
    }
}

#[async_trait]
impl SearchBackend for ElasticsearchBackend {
    async fn exists(&self, collection: &str) -> Result<bool> {
        let response = self
            .request(Method::HEAD, collection)
            .send()
            .await
            .map_err(|e| AppError::Backend(format!("exists 请求失败: {}", e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(AppError::Backend(format!(
                "exists 失败 ({}) for {}",
                status, collection
            ))),
        }
    }

    async fn create(&self, collection: &str, schema: &Value) -> Result<()> {
        Self::send(
            self.request(Method::PUT, collection)
                .json(&json!({ "mappings": schema })),
            "create index",
        )
        .await?;
        Ok(())
    }

    async fn search_structured(
        &self,
        collection: &str,
        query: &StructuredQuery,
        offset: usize,
        limit: usize,
    ) -> Result<BackendHits> {
        let mut body = json!({
            "query": query.query_clause(),
            "from": offset,
            "size": limit,
            "track_total_hits": true,
            "_source": { "excludes": EMBEDDING_FIELDS },
        });
        if let Some(sort) = query.as_value().get("sort") {
            body["sort"] = sort.clone();
        }
        self.run_search(collection, body).await
    }

    async fn search_scripted(
        &self,
        collection: &str,
        script: &ScoringScript,
        min_score: Option<f32>,
        limit: usize,
    ) -> Result<BackendHits> {
        let body = json!({
            "query": script.to_clause(min_score, None),
            "size": limit,
            "track_total_hits": true,
            "_source": { "excludes": EMBEDDING_FIELDS },
        });
        self.run_search(collection, body).await
    }

    async fn index(&self, collection: &str, document: &StoredDocument) -> Result<String> {
        let response = Self::send(
            self.request(Method::POST, &format!("{}/_doc?refresh=wait_for", collection))
                .json(document),
            "index",
        )
        .await?;

        let parsed: IndexResponse = response
            .json()
            .await
            .map_err(|e| AppError::Backend(format!("无法解析写入结果: {}", e)))?;
        Ok(parsed.id)
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let response = Self::send(
            self.request(Method::GET, &format!("{}/_count", collection)),
            "count",
        )
        .await?;

        let parsed: CountResponse = response
            .json()
            .await
            .map_err(|e| AppError::Backend(format!("无法解析计数结果: {}", e)))?;
        Ok(parsed.count)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>> {
        let url = self.document_url(collection, id)?;
        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(|e| AppError::Backend(format!("get 请求失败: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(AppError::Backend(format!(
                "get 失败 ({}) for {}",
                response.status(),
                id
            )));
        }

        let parsed: GetResponse = response
            .json()
            .await
            .map_err(|e| AppError::Backend(format!("无法解析文档: {}", e)))?;
        Ok(parsed.source.filter(|_| parsed.found))
    }
}
