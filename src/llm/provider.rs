//! LLM Provider implementations

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::config::ProviderConfig;
use crate::error::FanoutError;
use crate::llm::ProviderId;

/// A successful answer from one provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    /// HTTP status of the upstream response
    pub http_status: u16,
    /// Upstream finish/stop reason, if the provider reported one
    pub finish_reason: Option<String>,
}

impl Completion {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            http_status: 200,
            finish_reason: None,
        }
    }

    pub fn with_finish_reason(mut self, reason: impl Into<String>) -> Self {
        self.finish_reason = Some(reason.into());
        self
    }
}

/// Why a single provider call failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("provider call panicked")]
    Panicked,
}

impl ProviderError {
    /// Status code reported to clients for this failure
    pub fn status_code(&self) -> u16 {
        match self {
            ProviderError::Timeout => 500,
            ProviderError::Http { status, .. } => *status,
            ProviderError::Transport(_) => 503,
            ProviderError::Malformed(_) => 502,
            ProviderError::Panicked => 500,
        }
    }

    /// Short failure category used as the status detail
    pub fn category(&self) -> &'static str {
        match self {
            ProviderError::Timeout => "timeout",
            ProviderError::Http { status: 401 | 403, .. } => "unauthorized",
            ProviderError::Http { status: 429, .. } => "rate_limited",
            ProviderError::Http { status, .. } if *status >= 500 => "upstream_error",
            ProviderError::Http { .. } => "http_error",
            ProviderError::Transport(_) => "transport",
            ProviderError::Malformed(_) => "malformed_response",
            ProviderError::Panicked => "panic",
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

/// Generic LLM provider trait
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Completion, ProviderError>;
    fn id(&self) -> ProviderId;
}

/// Send a prepared request and decode a JSON body, mapping non-2xx responses to errors
async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<(u16, T), ProviderError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(ProviderError::Http {
            status: status.as_u16(),
            message: error_message(&body),
        });
    }

    let parsed = serde_json::from_str(&body).map_err(|e| ProviderError::Malformed(e.to_string()))?;
    Ok((status.as_u16(), parsed))
}

/// Pull `error.message` out of an upstream error body, falling back to the raw text
fn error_message(body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        });

    from_json.unwrap_or_else(|| truncate(body.trim(), 300).to_string())
}

/// Truncate on a char boundary
fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// OpenAI-compatible chat completions provider (OpenAI, Upstage, Perplexity)
pub struct OpenAiCompatibleProvider {
    id: ProviderId,
    client: Client,
    config: ProviderConfig,
    api_key: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

impl ChatResponse {
    fn into_completion(self, http_status: u16) -> Result<Completion, ProviderError> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Malformed("no choices in response".to_string()))?;
        let text = choice
            .message
            .content
            .ok_or_else(|| ProviderError::Malformed("choice has no content".to_string()))?;

        Ok(Completion {
            text,
            http_status,
            finish_reason: choice.finish_reason,
        })
    }
}

impl OpenAiCompatibleProvider {
    pub fn new(id: ProviderId, config: ProviderConfig, api_key: String) -> Self {
        Self {
            id,
            client: Client::new(),
            config,
            api_key,
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn generate(&self, prompt: &str) -> Result<Completion, ProviderError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
        };

        let url = format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'));
        let (status, response): (u16, ChatResponse) = send_json(
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request),
        )
        .await?;

        response.into_completion(status)
    }

    fn id(&self) -> ProviderId {
        self.id
    }
}

/// Anthropic Claude provider
pub struct AnthropicProvider {
    client: Client,
    config: ProviderConfig,
    api_key: String,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicResponse {
    fn into_completion(self, http_status: u16) -> Result<Completion, ProviderError> {
        let text: String = self
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();

        if text.is_empty() {
            return Err(ProviderError::Malformed("no text content in response".to_string()));
        }

        Ok(Completion {
            text,
            http_status,
            finish_reason: self.stop_reason,
        })
    }
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig, api_key: String) -> Self {
        Self {
            client: Client::new(),
            config,
            api_key,
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    async fn generate(&self, prompt: &str) -> Result<Completion, ProviderError> {
        let request = AnthropicRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens.unwrap_or(4096),
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.config.temperature,
        };

        let url = format!("{}/messages", self.config.endpoint.trim_end_matches('/'));
        let (status, response): (u16, AnthropicResponse) = send_json(
            self.client
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&request),
        )
        .await?;

        response.into_completion(status)
    }

    fn id(&self) -> ProviderId {
        ProviderId::Anthropic
    }
}

/// Google Gemini provider (generateContent API)
pub struct GeminiProvider {
    client: Client,
    config: ProviderConfig,
    api_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContentRequest<'a>>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContentRequest<'a> {
    role: &'a str,
    parts: Vec<GeminiPartRequest<'a>>,
}

#[derive(Serialize)]
struct GeminiPartRequest<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

impl GeminiResponse {
    fn into_completion(self, http_status: u16) -> Result<Completion, ProviderError> {
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Malformed("no candidates in response".to_string()))?;

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ProviderError::Malformed("candidate has no text".to_string()));
        }

        Ok(Completion {
            text,
            http_status,
            finish_reason: candidate.finish_reason,
        })
    }
}

impl GeminiProvider {
    pub fn new(config: ProviderConfig, api_key: String) -> Self {
        Self {
            client: Client::new(),
            config,
            api_key,
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for GeminiProvider {
    async fn generate(&self, prompt: &str) -> Result<Completion, ProviderError> {
        let request = GeminiRequest {
            contents: vec![GeminiContentRequest {
                role: "user",
                parts: vec![GeminiPartRequest { text: prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                max_output_tokens: self.config.max_tokens,
            },
        };

        let url = format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        );
        let (status, response): (u16, GeminiResponse) = send_json(
            self.client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&request),
        )
        .await?;

        response.into_completion(status)
    }

    fn id(&self) -> ProviderId {
        ProviderId::Gemini
    }
}

/// Factory function to create provider from config
pub fn create_provider(
    id: ProviderId,
    config: ProviderConfig,
    api_key: Option<String>,
) -> crate::error::Result<Arc<dyn LlmProvider>> {
    let key = api_key.ok_or(FanoutError::MissingApiKey(id))?;

    Ok(match id {
        ProviderId::OpenAi | ProviderId::Upstage | ProviderId::Perplexity => {
            Arc::new(OpenAiCompatibleProvider::new(id, config, key))
        }
        ProviderId::Anthropic => Arc::new(AnthropicProvider::new(config, key)),
        ProviderId::Gemini => Arc::new(GeminiProvider::new(config, key)),
    })
}
