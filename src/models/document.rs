//! 文档模型

use chrono::{Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// 时间字段的序列化格式
pub const CREATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 检索文档
///
/// 三个向量字段只在服务内部流转，不会序列化给调用方；写入后端时
/// 由 [`crate::index::backend::StoredDocument`] 负责带上它们。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// 后端分配的 ID，索引前为空
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(with = "create_time_format", default = "now")]
    pub create_time: NaiveDateTime,
    #[serde(default)]
    pub author: String,
    #[serde(skip)]
    pub title_embedding: Option<Vec<f32>>,
    #[serde(skip)]
    pub content_embedding: Option<Vec<f32>>,
    #[serde(skip)]
    pub combined_embedding: Option<Vec<f32>>,
}

impl Document {
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        category: impl Into<String>,
        tags: Vec<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            title: title.into(),
            content: content.into(),
            category: category.into(),
            tags,
            create_time: now(),
            author: author.into(),
            title_embedding: None,
            content_embedding: None,
            combined_embedding: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_combined_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.combined_embedding = Some(embedding);
        self
    }

    /// 去重键：标题 + 作者
    pub fn dedup_key(&self) -> DedupKey<'_> {
        DedupKey {
            title: &self.title,
            author: &self.author,
        }
    }

    /// 是否带有可用于相似度计算的组合向量
    pub fn has_combined_embedding(&self) -> bool {
        self.combined_embedding
            .as_ref()
            .is_some_and(|v| !v.is_empty())
    }

    /// 去掉所有向量字段，得到对外展示的副本
    pub fn without_embeddings(mut self) -> Self {
        self.title_embedding = None;
        self.content_embedding = None;
        self.combined_embedding = None;
        self
    }
}

/// 合并去重时使用的等价键，不做持久化
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey<'a> {
    pub title: &'a str,
    pub author: &'a str,
}

pub(crate) fn now() -> NaiveDateTime {
    let now = Local::now().naive_local();
    // 对齐到秒，与序列化格式一致
    now.with_nanosecond(0).unwrap_or(now)
}

pub(crate) mod create_time_format {
    use super::CREATE_TIME_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(CREATE_TIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, CREATE_TIME_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(&format!("{raw} 00:00:00"), CREATE_TIME_FORMAT))
            .map_err(serde::de::Error::custom)
    }
}
