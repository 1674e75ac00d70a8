//! Chat-completion client for the language model
//!
//! Provides a `ChatModel` trait and an OpenAI-compatible implementation
//! (OpenRouter by default). Upstream failures are mapped to distinct error
//! kinds so callers can show a specific message for auth, rate limits and
//! timeouts. Single attempt per call; no retries.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::LlmConfig;
use crate::models::ChatMessage;

// ============================================================================
// ChatModel trait
// ============================================================================

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send the ordered messages and return the assistant's text.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;

    /// Model name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("authentication rejected by model provider: {0}")]
    Authentication(String),

    #[error("rate limited by model provider: {0}")]
    RateLimited(String),

    #[error("model request timed out")]
    Timeout,

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),

    #[error("model returned an empty response")]
    EmptyResponse,

    #[error("Missing API key")]
    MissingApiKey,
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Http(e)
        }
    }
}

impl LlmError {
    pub fn user_message(&self) -> String {
        match self {
            LlmError::Authentication(_) | LlmError::MissingApiKey => {
                "The AI service rejected our credentials. Please contact support.".to_string()
            }
            LlmError::RateLimited(_) => {
                "Too many requests to the AI service. Please wait a moment and try again."
                    .to_string()
            }
            LlmError::Timeout => {
                "The AI service took too long to respond. Please try again.".to_string()
            }
            LlmError::EmptyResponse => {
                "The AI service returned an empty answer. Please rephrase the question."
                    .to_string()
            }
            LlmError::Api { .. } | LlmError::Http(_) => {
                "Sorry, an error occurred while generating the answer.".to_string()
            }
        }
    }
}

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
    pub referer: String,
    pub title: String,
}

impl From<&LlmConfig> for LlmClientConfig {
    fn from(c: &LlmConfig) -> Self {
        Self {
            api_key: c.api_key(),
            model: c.model.clone(),
            temperature: c.temperature,
            timeout: Duration::from_secs(c.request_timeout_seconds),
            referer: c.referer.clone(),
            title: c.title.clone(),
        }
    }
}

// ============================================================================
// Wire structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

// ============================================================================
// OpenRouterClient
// ============================================================================

/// OpenAI-compatible `/chat/completions` client.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    client: Client,
    config: LlmClientConfig,
    base_url: String,
}

impl OpenRouterClient {
    pub fn new(config: LlmClientConfig, base_url: String) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            config,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        Self::new(LlmClientConfig::from(config), config.base_url.clone())
    }
}

#[async_trait]
impl ChatModel for OpenRouterClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = CompletionRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .header("HTTP-Referer", &self.config.referer)
            .header("X-Title", &self.config.title)
            .json(&request)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error)
                .map(|e| e.message)
                .filter(|m| !m.is_empty())
                .unwrap_or(error_body);

            tracing::error!(
                code = status.as_u16(),
                message = %message,
                "Chat completion API error"
            );

            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    LlmError::Authentication(message)
                }
                StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited(message),
                StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => LlmError::Timeout,
                _ => LlmError::Api {
                    code: status.as_u16(),
                    message,
                },
            });
        }

        let completion: CompletionResponse = response.json().await?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

// ============================================================================
// TESTS
// ============================================================================
