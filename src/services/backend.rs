//! 检索后端门面
//!
//! 把编排层需要的几种查询形态翻译成 [`SearchBackend`] 调用，并把后端命中
//! 转换成不带向量的 [`Document`]。

use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::config::SearchConfig;
use crate::error::{AppError, Result};
use crate::index::backend::{BackendHits, ScoringScript, SearchBackend, StoredDocument};
use crate::models::document::Document;
use crate::models::search::{SEARCH_FIELDS, SearchPage, StructuredQuery};
use crate::services::embedding::EmbeddingProvider;

/// 标题向量在组合向量中的权重
pub const TITLE_WEIGHT: f32 = 0.4;
/// 正文向量在组合向量中的权重
pub const CONTENT_WEIGHT: f32 = 0.6;

/// 索引的固定字段结构
pub fn collection_schema(dimension: usize) -> Value {
    let vector_field = json!({
        "type": "dense_vector",
        "dims": dimension,
        "index": true,
        "similarity": "cosine"
    });

    json!({
        "properties": {
            "title": {
                "type": "text",
                "fields": { "keyword": { "type": "keyword" } }
            },
            "content": { "type": "text" },
            "category": { "type": "keyword" },
            "tags": { "type": "keyword" },
            "author": { "type": "keyword" },
            "createTime": {
                "type": "date",
                "format": "yyyy-MM-dd HH:mm:ss||yyyy-MM-dd||epoch_millis"
            },
            "titleEmbedding": vector_field,
            "contentEmbedding": vector_field,
            "combinedEmbedding": vector_field
        }
    })
}

pub struct SearchFacade {
    backend: Arc<dyn SearchBackend>,
    embeddings: Arc<EmbeddingProvider>,
    collection: String,
    settings: SearchConfig,
}

impl SearchFacade {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        embeddings: Arc<EmbeddingProvider>,
        collection: impl Into<String>,
        settings: SearchConfig,
    ) -> Self {
        Self {
            backend,
            embeddings,
            collection: collection.into(),
            settings,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn settings(&self) -> &SearchConfig {
        &self.settings
    }

    /// 索引不存在时按固定结构创建；重复调用无副作用
    pub async fn ensure_collection_ready(&self) -> Result<()> {
        if self.backend.exists(&self.collection).await? {
            debug!("Collection {} already exists", self.collection);
            return Ok(());
        }

        info!("Creating collection {}", self.collection);
        self.backend
            .create(
                &self.collection,
                &collection_schema(self.embeddings.dimension()),
            )
            .await?;
        info!("Collection {} created", self.collection);
        Ok(())
    }

    pub async fn execute_structured(
        &self,
        query: &StructuredQuery,
        offset: usize,
        limit: usize,
    ) -> Result<SearchPage> {
        debug!("Structured search offset={} limit={}: {}", offset, limit, query);
        let hits = self
            .backend
            .search_structured(&self.collection, query, offset, limit)
            .await?;
        Ok(to_page(hits))
    }

    /// 全部文档上的向量相似度检索，低于 `min_score` 的结果由后端过滤
    pub async fn execute_vector_similarity(
        &self,
        vector: &[f32],
        limit: usize,
        min_score: f32,
    ) -> Result<SearchPage> {
        let script = ScoringScript::vector_similarity(vector, self.settings.missing_vector_score);
        let hits = self
            .backend
            .search_scripted(&self.collection, &script, Some(min_score), limit)
            .await?;
        Ok(to_page(hits))
    }

    /// 后端侧的文本 + 向量加权混合检索
    pub async fn execute_hybrid(
        &self,
        text: &str,
        vector: &[f32],
        text_boost: f32,
        vector_boost: f32,
        limit: usize,
    ) -> Result<SearchPage> {
        // 混合检索里没有向量的文档只靠文本子句得分
        let vector_clause =
            ScoringScript::vector_similarity(vector, 0.0).to_clause(None, Some(vector_boost));
        let query = StructuredQuery::from_value(json!({
            "query": {
                "bool": {
                    "should": [
                        vector_clause,
                        {
                            "multi_match": {
                                "query": text,
                                "fields": SEARCH_FIELDS,
                                "type": "best_fields",
                                "boost": text_boost
                            }
                        }
                    ]
                }
            }
        }))?;

        self.execute_structured(&query, 0, limit).await
    }

    /// 以已存储文档的组合向量为查询向量，排除文档自身
    ///
    /// 文档不存在返回 [`AppError::NotFound`]；文档没有可用向量时返回空页。
    pub async fn find_similar(&self, id: &str, limit: usize) -> Result<SearchPage> {
        let Some(stored) = self.backend.get(&self.collection, id).await? else {
            return Err(AppError::NotFound(format!("文档 {}", id)));
        };

        let vector = match stored.combined_embedding {
            Some(vector) if !vector.is_empty() && !EmbeddingProvider::is_zero_vector(&vector) => {
                vector
            }
            _ => {
                debug!("Document {} has no combined embedding", id);
                return Ok(SearchPage::empty());
            }
        };

        let script = ScoringScript::vector_similarity_over(
            json!({ "bool": { "must_not": [{ "term": { "_id": id } }] } }),
            &vector,
            self.settings.missing_vector_score,
        );
        let hits = self
            .backend
            .search_scripted(
                &self.collection,
                &script,
                Some(self.settings.similar_min_score),
                limit,
            )
            .await?;
        Ok(to_page(hits))
    }

    /// 写入单个文档，返回带 ID、不带向量的副本
    pub async fn index_one(&self, document: Document) -> Result<Document> {
        let document = if self.settings.embed_on_index {
            self.enrich(document).await
        } else {
            document
        };

        let id = self
            .backend
            .index(&self.collection, &StoredDocument::from(&document))
            .await?;
        info!("Indexed document {} ({})", id, document.title);

        Ok(document.with_id(id).without_embeddings())
    }

    /// 逐个写入，遇到第一个错误即停止
    pub async fn index_many(&self, documents: Vec<Document>) -> Result<Vec<Document>> {
        info!("Indexing {} documents", documents.len());
        let mut indexed = Vec::with_capacity(documents.len());
        for document in documents {
            indexed.push(self.index_one(document).await?);
        }
        Ok(indexed)
    }

    pub async fn count_all(&self) -> Result<u64> {
        self.backend.count(&self.collection).await
    }

    pub async fn get_all(&self, offset: usize, limit: usize) -> Result<SearchPage> {
        self.execute_structured(&StructuredQuery::match_all(), offset, limit)
            .await
    }

    /// 补全缺失的标题、正文与组合向量；全零向量不写入
    async fn enrich(&self, mut document: Document) -> Document {
        if document.has_combined_embedding() {
            return document;
        }

        let mut vectors = self
            .embeddings
            .embed_batch(&[document.title.clone(), document.content.clone()])
            .await
            .into_iter()
            .map(|v| (!v.is_empty() && !EmbeddingProvider::is_zero_vector(&v)).then_some(v));
        let title = vectors.next().flatten();
        let content = vectors.next().flatten();

        document.combined_embedding = match (&title, &content) {
            (Some(t), Some(c)) => match self.embeddings.combine(t, TITLE_WEIGHT, c, CONTENT_WEIGHT)
            {
                Ok(combined) => Some(combined),
                Err(e) => {
                    warn!("Cannot combine embeddings for {}: {}", document.title, e);
                    None
                }
            },
            (Some(only), None) | (None, Some(only)) => Some(only.clone()),
            (None, None) => None,
        };
        if document.title_embedding.is_none() {
            document.title_embedding = title;
        }
        if document.content_embedding.is_none() {
            document.content_embedding = content;
        }
        document
    }
}

fn to_page(hits: BackendHits) -> SearchPage {
    SearchPage {
        documents: hits
            .hits
            .into_iter()
            .map(|hit| hit.source.into_document(Some(hit.id)).without_embeddings())
            .collect(),
        total_hits: hits.total,
        took_ms: hits.took_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::config::AppConfig;
    use crate::error::AppError;
    use crate::index::backend::{BackendHit, MockSearchBackend};
    use crate::index::embedding::MockEmbeddingModel;
    use crate::index::memory::MemoryBackend;

    fn provider(dimension: usize) -> Arc<EmbeddingProvider> {
        let mut model = MockEmbeddingModel::new();
        model.expect_dimension().return_const(dimension);
        model.expect_embed().returning(|texts| {
            Ok(texts
                .iter()
                .map(|t| if t.contains("学习") { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
                .collect())
        });
        Arc::new(EmbeddingProvider::new(Arc::new(model)))
    }

    fn facade(backend: Arc<dyn SearchBackend>) -> SearchFacade {
        SearchFacade::new(
            backend,
            provider(2),
            "docs",
            AppConfig::development().search,
        )
    }

    #[test]
    fn test_collection_schema_fields() {
        let schema = collection_schema(1536);
        let props = &schema["properties"];
        assert_eq!(props["title"]["fields"]["keyword"]["type"], "keyword");
        assert_eq!(props["tags"]["type"], "keyword");
        assert_eq!(props["combinedEmbedding"]["dims"], 1536);
        assert_eq!(
            props["createTime"]["format"],
            "yyyy-MM-dd HH:mm:ss||yyyy-MM-dd||epoch_millis"
        );
    }

    #[tokio::test]
    async fn test_ensure_collection_ready_is_idempotent() {
        let mut backend = MockSearchBackend::new();
        let mut created = false;
        backend.expect_exists().times(2).returning(move |_| {
            let exists = created;
            created = true;
            Ok(exists)
        });
        backend.expect_create().times(1).returning(|_, _| Ok(()));

        let facade = facade(Arc::new(backend));
        facade.ensure_collection_ready().await.unwrap();
        facade.ensure_collection_ready().await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_collection_ready_propagates_create_failure() {
        let mut backend = MockSearchBackend::new();
        backend.expect_exists().returning(|_| Ok(false));
        backend
            .expect_create()
            .returning(|_, _| Err(AppError::Backend("forbidden".into())));

        let facade = facade(Arc::new(backend));
        assert!(facade.ensure_collection_ready().await.is_err());
    }

    #[tokio::test]
    async fn test_execute_hybrid_builds_weighted_should() {
        let mut backend = MockSearchBackend::new();
        backend
            .expect_search_structured()
            .withf(|collection, query, offset, limit| {
                let should = &query.query_clause()["bool"]["should"];
                collection == "docs"
                    && *offset == 0
                    && *limit == 5
                    && should[0]["script_score"]["boost"] == 3.0
                    && should[0]["script_score"]["script"]["params"]["missing_score"] == 0.0
                    && should[1]["multi_match"]["boost"] == 1.0
                    && should[1]["multi_match"]["type"] == "best_fields"
            })
            .times(1)
            .returning(|_, _, _, _| Ok(BackendHits::default()));

        let facade = facade(Arc::new(backend));
        let page = facade
            .execute_hybrid("机器学习", &[1.0, 0.0], 1.0, 3.0, 5)
            .await
            .unwrap();
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn test_pages_strip_embeddings() {
        let mut backend = MockSearchBackend::new();
        backend.expect_search_structured().returning(|_, _, _, _| {
            let doc = Document::new("t", "c", "k", vec![], "a").with_combined_embedding(vec![1.0]);
            Ok(BackendHits {
                hits: vec![BackendHit {
                    id: "x".into(),
                    score: Some(1.0),
                    source: StoredDocument::from(&doc),
                }],
                total: 9,
                took_ms: 2,
            })
        });

        let page = facade(Arc::new(backend)).get_all(0, 10).await.unwrap();
        assert_eq!(page.total_hits, 9);
        assert_eq!(page.documents[0].id.as_deref(), Some("x"));
        assert!(page.documents[0].combined_embedding.is_none());
    }

    #[tokio::test]
    async fn test_index_enriches_and_find_similar_excludes_self() {
        let backend = Arc::new(MemoryBackend::new());
        let facade = facade(backend.clone());
        facade.ensure_collection_ready().await.unwrap();

        let first = facade
            .index_one(Document::new("机器学习", "学习笔记", "AI", vec![], "alice"))
            .await
            .unwrap();
        facade
            .index_one(Document::new("深度学习", "学习实践", "AI", vec![], "bob"))
            .await
            .unwrap();
        facade
            .index_one(Document::new("Rust", "所有权", "编程", vec![], "carol"))
            .await
            .unwrap();

        let id = first.id.clone().unwrap();
        assert!(first.combined_embedding.is_none());
        let stored = backend.get("docs", &id).await.unwrap().unwrap();
        assert_eq!(stored.combined_embedding, Some(vec![1.0, 0.0]));

        let similar = facade.find_similar(&id, 10).await.unwrap();
        let titles: Vec<_> = similar.documents.iter().map(|d| d.title.as_str()).collect();
        // 分数为余弦 + 1，正交的文档也高于 0.7
        assert_eq!(titles, vec!["深度学习", "Rust"]);

        assert!(matches!(
            facade.find_similar("missing", 10).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(facade.count_all().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_vector_similarity_min_score() {
        let backend = Arc::new(MemoryBackend::new());
        let facade = facade(backend);
        facade.ensure_collection_ready().await.unwrap();
        facade
            .index_many(vec![
                Document::new("机器学习", "学习", "AI", vec![], "a"),
                Document::new("Rust", "所有权", "编程", vec![], "b"),
            ])
            .await
            .unwrap();

        let page = facade
            .execute_vector_similarity(&[1.0, 0.0], 10, 1.5)
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page.documents[0].title, "机器学习");
    }
}
