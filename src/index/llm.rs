//! 语言模型客户端

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::config::LlmConfig;
use crate::error::{AppError, Result};

/// 对话补全模型
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

/// OpenAI 兼容的 Chat Completions 客户端
pub struct OpenAiChatModel {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model_name: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}

impl OpenAiChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model_name: config.model_name.clone(),
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if !system_prompt.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: system_prompt,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: user_prompt,
        });

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&ChatRequest {
                model: &self.model_name,
                messages,
                temperature: 0.0,
            });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Translation(format!(
                "chat completion failed ({}): {}",
                status, error_text
            )));
        }

        let content = response
            .json::<ChatResponse>()
            .await?
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::Translation("chat completion returned no choices".into()))?;

        debug!("Completion length: {}", content.len());
        Ok(content)
    }
}
