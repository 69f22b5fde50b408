use crate::config::config::AppConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::{Path, PathBuf};

/// 环境变量前缀，嵌套字段用双下划线分隔，如 `INTELLISEARCH_BACKEND__INDEX_NAME`
pub const ENV_PREFIX: &str = "INTELLISEARCH_";

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从默认路径加载配置
    ///
    /// 优先级（后者覆盖前者）：
    /// 1. 开发环境默认值
    /// 2. ./config.toml
    /// 3. 环境变量
    pub fn load() -> Result<AppConfig, figment::Error> {
        Self::load_from(default_config_path())
    }

    /// 从指定路径加载配置
    pub fn load_from(path: impl AsRef<Path>) -> Result<AppConfig, figment::Error> {
        Self::figment(path.as_ref()).extract()
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::development()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// 验证配置
    pub fn validate(config: &AppConfig) -> Result<(), ConfigValidationError> {
        if config.server.port == 0 {
            return Err(ConfigValidationError::InvalidPort);
        }

        if config.backend.index_name.trim().is_empty() {
            return Err(ConfigValidationError::MissingIndexName);
        }

        match config.backend.kind.as_str() {
            "memory" => {}
            "elasticsearch" => {
                if config.backend.url.is_empty() {
                    return Err(ConfigValidationError::MissingBackendUrl);
                }
            }
            other => return Err(ConfigValidationError::UnknownBackend(other.to_string())),
        }

        if !matches!(config.embedding.backend.as_str(), "openai" | "ollama") {
            return Err(ConfigValidationError::UnknownEmbeddingBackend(
                config.embedding.backend.clone(),
            ));
        }

        if config.embedding.dimension == 0 {
            return Err(ConfigValidationError::InvalidDimension);
        }

        Ok(())
    }
}

/// 配置验证错误
#[derive(thiserror::Error, Debug)]
pub enum ConfigValidationError {
    #[error("服务端口无效，必须大于 0")]
    InvalidPort,

    #[error("索引名称未配置")]
    MissingIndexName,

    #[error("检索后端地址未配置")]
    MissingBackendUrl,

    #[error("未知的检索后端类型: {0}")]
    UnknownBackend(String),

    #[error("未知的嵌入模型后端: {0}")]
    UnknownEmbeddingBackend(String),

    #[error("向量维度无效，必须大于 0")]
    InvalidDimension,
}

/// 获取默认配置文件路径
pub fn default_config_path() -> PathBuf {
    PathBuf::from("config.toml")
}

/// 检查配置文件是否存在
pub fn config_exists() -> bool {
    default_config_path().exists()
}
