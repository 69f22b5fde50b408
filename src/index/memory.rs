//! 内存检索后端
//!
//! 在进程内保存文档，并解释本服务自己会生成的那部分查询 DSL：
//! `match_all`、`match`、`multi_match`、`term`、`terms`、`bool` 与
//! 向量相似度 `script_score`。遇到其它子句返回 [`AppError::Backend`]。

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::cmp::Ordering;
use std::time::Instant;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::index::backend::{
    BackendHit, BackendHits, ScoringScript, SearchBackend, StoredDocument,
    VECTOR_SIMILARITY_SCRIPT,
};
use crate::index::embedding::cosine_similarity;
use crate::models::search::{SEARCH_FIELDS, StructuredQuery};

pub struct MemoryBackend {
    collections: DashMap<String, Vec<(String, StoredDocument)>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
        }
    }

    fn run(
        &self,
        collection: &str,
        clause: &Value,
        offset: usize,
        limit: usize,
    ) -> Result<BackendHits> {
        let start = Instant::now();
        let documents = self
            .collections
            .get(collection)
            .ok_or_else(|| AppError::Backend(format!("no such index [{}]", collection)))?;

        let mut matched = Vec::new();
        for (id, doc) in documents.iter() {
            if let Some(score) = evaluate(clause, id, doc)? {
                matched.push((score, id, doc));
            }
        }
        // 稳定排序，同分时保持写入顺序
        matched.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        let total = matched.len() as u64;
        let hits = matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(score, id, doc)| BackendHit {
                id: id.clone(),
                score: Some(score),
                source: strip_embeddings(doc.clone()),
            })
            .collect();

        Ok(BackendHits {
            hits,
            total,
            took_ms: start.elapsed().as_millis() as u64,
        })
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchBackend for MemoryBackend {
    async fn exists(&self, collection: &str) -> Result<bool> {
        Ok(self.collections.contains_key(collection))
    }

    async fn create(&self, collection: &str, _schema: &Value) -> Result<()> {
        if self.collections.contains_key(collection) {
            return Err(AppError::Backend(format!(
                "index [{}] already exists",
                collection
            )));
        }
        self.collections.insert(collection.to_string(), Vec::new());
        Ok(())
    }

    async fn search_structured(
        &self,
        collection: &str,
        query: &StructuredQuery,
        offset: usize,
        limit: usize,
    ) -> Result<BackendHits> {
        self.run(collection, query.query_clause(), offset, limit)
    }

    async fn search_scripted(
        &self,
        collection: &str,
        script: &ScoringScript,
        min_score: Option<f32>,
        limit: usize,
    ) -> Result<BackendHits> {
        self.run(collection, &script.to_clause(min_score, None), 0, limit)
    }

    async fn index(&self, collection: &str, document: &StoredDocument) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push((id.clone(), document.clone()));
        Ok(id)
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        self.collections
            .get(collection)
            .map(|docs| docs.len() as u64)
            .ok_or_else(|| AppError::Backend(format!("no such index [{}]", collection)))
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>> {
        Ok(self.collections.get(collection).and_then(|docs| {
            docs.iter()
                .find(|(doc_id, _)| doc_id == id)
                .map(|(_, doc)| doc.clone())
        }))
    }
}

fn strip_embeddings(mut doc: StoredDocument) -> StoredDocument {
    doc.title_embedding = None;
    doc.content_embedding = None;
    doc.combined_embedding = None;
    doc
}

/// 计算单个子句的得分，不匹配时返回 `None`
fn evaluate(clause: &Value, id: &str, doc: &StoredDocument) -> Result<Option<f32>> {
    let (kind, body) = clause
        .as_object()
        .and_then(|map| map.iter().next())
        .ok_or_else(|| AppError::Backend(format!("malformed query clause: {}", clause)))?;

    match kind.as_str() {
        "match_all" => Ok(Some(boost_of(body))),
        "match" => evaluate_match(body, id, doc),
        "multi_match" => evaluate_multi_match(body, id, doc),
        "term" => evaluate_term(body, id, doc),
        "terms" => evaluate_terms(body, id, doc),
        "bool" => evaluate_bool(body, id, doc),
        "script_score" => evaluate_script_score(body, id, doc),
        other => Err(AppError::Backend(format!(
            "unsupported query clause [{}]",
            other
        ))),
    }
}

fn boost_of(body: &Value) -> f32 {
    body.get("boost")
        .and_then(Value::as_f64)
        .map(|b| b as f32)
        .unwrap_or(1.0)
}

fn field_values(field: &str, id: &str, doc: &StoredDocument) -> Vec<String> {
    match field.trim_end_matches(".keyword") {
        "_id" => vec![id.to_string()],
        "title" => vec![doc.title.clone()],
        "content" => vec![doc.content.clone()],
        "category" => vec![doc.category.clone()],
        "author" => vec![doc.author.clone()],
        "tags" => doc.tags.clone(),
        _ => Vec::new(),
    }
}

/// 查询词在字段中出现的个数，不区分大小写
fn text_score(text: &str, values: &[String]) -> f32 {
    let values: Vec<String> = values.iter().map(|v| v.to_lowercase()).collect();
    text.split_whitespace()
        .map(str::to_lowercase)
        .filter(|term| values.iter().any(|v| v.contains(term.as_str())))
        .count() as f32
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `{field: value}` 或 `{field: {<key>: value, boost}}`
fn field_and_value<'a>(body: &'a Value, key: &str) -> Result<(&'a str, &'a Value, f32)> {
    let (field, spec) = body
        .as_object()
        .and_then(|map| map.iter().next())
        .ok_or_else(|| AppError::Backend(format!("malformed field clause: {}", body)))?;

    match spec.get(key) {
        Some(value) if spec.is_object() => Ok((field, value, boost_of(spec))),
        _ => Ok((field, spec, 1.0)),
    }
}

fn evaluate_match(body: &Value, id: &str, doc: &StoredDocument) -> Result<Option<f32>> {
    let (field, value, boost) = field_and_value(body, "query")?;
    let score = text_score(&scalar_text(value), &field_values(field, id, doc));
    Ok((score > 0.0).then_some(score * boost))
}

fn evaluate_multi_match(body: &Value, id: &str, doc: &StoredDocument) -> Result<Option<f32>> {
    let text = body
        .get("query")
        .map(scalar_text)
        .ok_or_else(|| AppError::Backend("multi_match requires [query]".into()))?;

    let fields: Vec<String> = match body.get("fields").and_then(Value::as_array) {
        Some(fields) => fields.iter().map(scalar_text).collect(),
        None => SEARCH_FIELDS.iter().map(|f| f.to_string()).collect(),
    };

    // best_fields：取得分最高的字段
    let best = fields
        .iter()
        .map(|spec| {
            let (field, weight) = match spec.split_once('^') {
                Some((field, weight)) => (field, weight.parse::<f32>().unwrap_or(1.0)),
                None => (spec.as_str(), 1.0),
            };
            text_score(&text, &field_values(field, id, doc)) * weight
        })
        .fold(0.0_f32, f32::max);

    Ok((best > 0.0).then_some(best * boost_of(body)))
}

fn evaluate_term(body: &Value, id: &str, doc: &StoredDocument) -> Result<Option<f32>> {
    let (field, value, boost) = field_and_value(body, "value")?;
    let expected = scalar_text(value);
    let found = field_values(field, id, doc).iter().any(|v| *v == expected);
    Ok(found.then_some(boost))
}

fn evaluate_terms(body: &Value, id: &str, doc: &StoredDocument) -> Result<Option<f32>> {
    let (field, values) = body
        .as_object()
        .and_then(|map| map.iter().find(|(key, _)| key.as_str() != "boost"))
        .ok_or_else(|| AppError::Backend(format!("malformed terms clause: {}", body)))?;

    let expected: Vec<String> = values
        .as_array()
        .map(|values| values.iter().map(scalar_text).collect())
        .unwrap_or_default();
    let found = field_values(field, id, doc)
        .iter()
        .any(|v| expected.contains(v));
    Ok(found.then_some(boost_of(body)))
}

fn clauses(body: &Value, occur: &str) -> Vec<Value> {
    match body.get(occur) {
        Some(Value::Array(items)) => items.clone(),
        Some(single @ Value::Object(_)) => vec![single.clone()],
        _ => Vec::new(),
    }
}

fn evaluate_bool(body: &Value, id: &str, doc: &StoredDocument) -> Result<Option<f32>> {
    let must = clauses(body, "must");
    let filter = clauses(body, "filter");
    let should = clauses(body, "should");
    let must_not = clauses(body, "must_not");

    let mut score = 0.0;
    for clause in &must {
        match evaluate(clause, id, doc)? {
            Some(s) => score += s,
            None => return Ok(None),
        }
    }
    for clause in &filter {
        if evaluate(clause, id, doc)?.is_none() {
            return Ok(None);
        }
    }
    for clause in &must_not {
        if evaluate(clause, id, doc)?.is_some() {
            return Ok(None);
        }
    }

    let mut should_matches = 0;
    for clause in &should {
        if let Some(s) = evaluate(clause, id, doc)? {
            score += s;
            should_matches += 1;
        }
    }

    let required_should = body
        .get("minimum_should_match")
        .and_then(Value::as_u64)
        .unwrap_or(if must.is_empty() && filter.is_empty() && !should.is_empty() {
            1
        } else {
            0
        });
    if should_matches < required_should {
        return Ok(None);
    }

    Ok(Some(score * boost_of(body)))
}

fn evaluate_script_score(body: &Value, id: &str, doc: &StoredDocument) -> Result<Option<f32>> {
    let inner = body
        .get("query")
        .ok_or_else(|| AppError::Backend("script_score requires [query]".into()))?;
    if evaluate(inner, id, doc)?.is_none() {
        return Ok(None);
    }

    let script = body
        .get("script")
        .ok_or_else(|| AppError::Backend("script_score requires [script]".into()))?;
    if script.get("source").and_then(Value::as_str) != Some(VECTOR_SIMILARITY_SCRIPT) {
        return Err(AppError::Backend(
            "only the vector similarity script is supported".into(),
        ));
    }

    let params = &script["params"];
    let query_vector: Vec<f32> = params
        .get("query_vector")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_f64)
                .map(|v| v as f32)
                .collect()
        })
        .ok_or_else(|| AppError::Backend("script params require [query_vector]".into()))?;
    let missing_score = params
        .get("missing_score")
        .and_then(Value::as_f64)
        .unwrap_or(0.0) as f32;

    let raw = match doc.combined_embedding.as_deref() {
        Some(embedding) if !embedding.is_empty() => {
            let similarity = cosine_similarity(&query_vector, embedding)
                .map_err(|e| AppError::Backend(e.to_string()))?;
            similarity as f32 + 1.0
        }
        _ => missing_score,
    };
    let score = raw * boost_of(body);

    let min_score = body.get("min_score").and_then(Value::as_f64);
    if min_score.is_some_and(|min| (score as f64) < min) {
        return Ok(None);
    }
    Ok(Some(score))
}
