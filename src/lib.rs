//! Intellisearch - 智能混合检索编排服务
//!
//! 根据自然语言查询选择检索策略（全文、向量、AI 转换查询或混合），
//! 在检索后端上执行并合并去重结果；任何环节失败都会降级，而不是报错。

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod index;
pub mod models;
pub mod observability;
pub mod services;

pub use app::Application;
