//! 错误处理模块
//!
//! 定义应用程序的错误类型和错误处理逻辑。

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 应用程序错误类型
#[derive(Error, Debug)]
pub enum AppError {
    /// 检索后端错误（传输失败或查询执行失败）
    #[error("检索后端错误: {0}")]
    Backend(String),

    /// 嵌入模型错误
    #[error("嵌入模型错误: {0}")]
    Embedding(String),

    /// 查询转换错误（模型输出无法解析或缺少 query 子句）
    #[error("查询转换错误: {0}")]
    Translation(String),

    /// 向量维度不匹配
    #[error("向量维度不匹配: {left} != {right}")]
    DimensionMismatch { left: usize, right: usize },

    /// 资源不存在
    #[error("资源不存在: {0}")]
    NotFound(String),

    /// 参数验证错误
    #[error("参数验证失败: {0}")]
    Validation(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    Serialization(String),

    /// HTTP 客户端错误
    #[error("HTTP 请求失败: {0}")]
    Http(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(String),
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Http(e.to_string())
    }
}

impl From<figment::Error> for AppError {
    fn from(e: figment::Error) -> Self {
        AppError::Config(e.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl From<prometheus::Error> for AppError {
    fn from(e: prometheus::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

/// Axum response implementation for AppError
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = (&self).into();
        let body = match &self {
            AppError::Validation(detail) => {
                ErrorResponse::new(&code, "参数验证失败").with_details(detail)
            }
            _ => ErrorResponse::new(&code, &self.to_string()),
        };
        let body = Json(body);
        (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body,
        )
            .into_response()
    }
}

/// 错误响应
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// 错误代码
    pub code: String,
    /// 错误消息
    pub message: String,
    /// 详细信息
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// 创建新错误响应
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
            details: None,
        }
    }

    /// 添加详细信息
    pub fn with_details(mut self, details: &str) -> Self {
        self.details = Some(details.to_string());
        self
    }
}

/// HTTP 状态码映射
impl From<&AppError> for (u16, String) {
    fn from(err: &AppError) -> (u16, String) {
        match err {
            AppError::NotFound(_) => (404, "NOT_FOUND".to_string()),
            AppError::Validation(_) => (400, "BAD_REQUEST".to_string()),
            AppError::DimensionMismatch { .. } => (400, "DIMENSION_MISMATCH".to_string()),
            AppError::Backend(_) | AppError::Http(_) => {
                (503, "SERVICE_UNAVAILABLE".to_string())
            }
            AppError::Embedding(_) => (500, "EMBEDDING_ERROR".to_string()),
            AppError::Translation(_) => (500, "TRANSLATION_ERROR".to_string()),
            _ => (500, "INTERNAL_ERROR".to_string()),
        }
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, AppError>;
