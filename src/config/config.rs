use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// 服务地址
    pub host: String,
    /// 服务端口
    pub port: u16,
    /// 请求超时（秒）
    pub request_timeout: u64,
}

/// 检索后端配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BackendConfig {
    /// 后端类型: "elasticsearch" 或 "memory"
    pub kind: String,
    /// Elasticsearch 地址
    pub url: String,
    /// 索引名称
    pub index_name: String,
    /// 用户名（为空则不认证）
    pub username: String,
    /// 密码
    pub password: String,
    /// 连接超时（毫秒）
    pub connect_timeout_ms: u64,
    /// 请求超时（毫秒）
    pub request_timeout_ms: u64,
}

/// 嵌入模型配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding 后端类型: "openai" 或 "ollama"
    pub backend: String,
    /// 服务地址
    pub base_url: String,
    /// API 密钥
    pub api_key: Option<String>,
    /// 模型名称
    pub model_name: String,
    /// 向量维度
    pub dimension: usize,
    /// 请求超时（秒）
    pub timeout: u64,
}

/// 语言模型配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI 兼容服务地址
    pub base_url: String,
    /// API 密钥
    pub api_key: Option<String>,
    /// 模型名称
    pub model_name: String,
    /// 系统提示词
    pub system_prompt: String,
    /// 请求超时（秒）
    pub timeout: u64,
}

/// 检索策略参数
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SearchConfig {
    /// 向量检索最低分（余弦 + 1 之后）
    pub vector_min_score: f32,
    /// 相似文档推荐最低分
    pub similar_min_score: f32,
    /// 混合检索中全文子句的权重
    pub text_boost: f32,
    /// 混合检索中向量子句的权重
    pub vector_boost: f32,
    /// 没有向量的文档在向量检索中的保底分
    pub missing_vector_score: f32,
    /// 索引文档时是否自动补全向量
    pub embed_on_index: bool,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
    /// 结构化日志格式
    pub structured: bool,
    /// 日志文件目录
    pub log_dir: Option<PathBuf>,
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 检索后端配置
    pub backend: BackendConfig,
    /// 嵌入模型配置
    pub embedding: EmbeddingConfig,
    /// 语言模型配置
    pub llm: LlmConfig,
    /// 检索策略参数
    pub search: SearchConfig,
    /// 日志配置
    pub logging: LoggingConfig,
    /// 应用名称
    pub app_name: String,
    /// 环境
    pub environment: String,
}

/// 默认的查询转换系统提示词
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"你是一个 Elasticsearch 查询专家。请把用户的自然语言查询转换为 Elasticsearch 查询 DSL。
索引字段：
- title (text，标题，可加权 title^2)
- content (text，正文)
- category (keyword，分类)
- tags (keyword，标签数组)
- author (keyword，作者)
- createTime (date，格式 yyyy-MM-dd HH:mm:ss)
要求：
1. 只返回 JSON，不要任何解释文字；
2. JSON 顶层必须包含 "query" 字段；
3. 统计、聚合类需求可以附加 "aggs"，但必须同时给出 "query"。"#;

impl AppConfig {
    /// 创建开发环境配置
    pub fn development() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 8080,
                request_timeout: 30,
            },
            backend: BackendConfig {
                kind: "elasticsearch".into(),
                url: "http://localhost:9200".into(),
                index_name: "documents".into(),
                username: String::new(),
                password: String::new(),
                connect_timeout_ms: 5_000,
                request_timeout_ms: 60_000,
            },
            embedding: EmbeddingConfig {
                backend: "openai".into(),
                base_url: "https://api.openai.com/v1".into(),
                api_key: None,
                model_name: "text-embedding-ada-002".into(),
                dimension: 1536,
                timeout: 60,
            },
            llm: LlmConfig {
                base_url: "https://api.openai.com/v1".into(),
                api_key: None,
                model_name: "gpt-3.5-turbo".into(),
                system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
                timeout: 60,
            },
            search: SearchConfig {
                vector_min_score: 0.5,
                similar_min_score: 0.7,
                text_boost: 1.0,
                vector_boost: 3.0,
                missing_vector_score: 0.1,
                embed_on_index: true,
            },
            logging: LoggingConfig {
                level: "debug".into(),
                structured: false,
                log_dir: None,
            },
            app_name: "intellisearch".into(),
            environment: "development".into(),
        }
    }

    /// 创建生产环境配置
    pub fn production() -> Self {
        let mut config = Self::development();
        config.environment = "production".into();
        config.logging.level = "info".into();
        config.logging.structured = true;
        config.logging.log_dir = Some(PathBuf::from("./logs"));
        config
    }
}
