//! Failure-isolated wrapper around one provider call
//!
//! A [`ProviderAdapter`] never returns an error: every outcome of a provider
//! call, including timeouts, becomes a [`ProviderResult`].

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::llm::{Completion, LlmProvider, ProviderError, ProviderId};
use crate::question::Question;

/// Status metadata reported per provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiStatus {
    pub status: u16,
    pub detail: String,
}

impl ApiStatus {
    pub fn new(status: u16, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One transcript line
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Outcome of one provider call. Exactly one of `answer` and `error` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderResult {
    #[serde(rename = "model")]
    pub provider: ProviderId,
    pub answer: Option<String>,
    pub status: ApiStatus,
    pub error: Option<String>,
    pub messages: Vec<Message>,
}

impl ProviderResult {
    pub fn success(provider: ProviderId, answer: impl Into<String>, status: ApiStatus) -> Self {
        let answer = answer.into();
        let message = Message::assistant(format!("[{}] {}", provider.label(), answer));
        Self {
            provider,
            answer: Some(answer),
            status,
            error: None,
            messages: vec![message],
        }
    }

    pub fn failure(provider: ProviderId, error: impl Into<String>, status: ApiStatus) -> Self {
        let error = error.into();
        let message = Message::assistant(format!("[{} error] {}", provider.label(), error));
        Self {
            provider,
            answer: None,
            status,
            error: Some(error),
            messages: vec![message],
        }
    }

    pub fn from_completion(provider: ProviderId, completion: Completion) -> Self {
        let detail = completion.finish_reason.unwrap_or_else(|| "success".to_string());
        Self::success(
            provider,
            completion.text,
            ApiStatus::new(completion.http_status, detail),
        )
    }

    pub fn from_error(provider: ProviderId, error: &ProviderError) -> Self {
        Self::failure(
            provider,
            error.to_string(),
            ApiStatus::new(error.status_code(), error.category()),
        )
    }

    pub fn is_success(&self) -> bool {
        self.answer.is_some()
    }
}

/// Uniform, timeout-bounded invocation of one provider
#[derive(Clone)]
pub struct ProviderAdapter {
    provider: Arc<dyn LlmProvider>,
    timeout: Option<Duration>,
}

impl ProviderAdapter {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            timeout: None,
        }
    }

    /// Bound the wait for this provider. `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn id(&self) -> ProviderId {
        self.provider.id()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Ask the provider, converting every failure into data
    pub async fn invoke(&self, question: &Question) -> ProviderResult {
        let id = self.id();
        let started = Instant::now();

        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.provider.generate(question.content()))
                .await
                .unwrap_or(Err(ProviderError::Timeout)),
            None => self.provider.generate(question.content()).await,
        };

        debug!(
            provider = id.key(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = outcome.is_ok(),
            "provider call finished"
        );

        match outcome {
            Ok(completion) => ProviderResult::from_completion(id, completion),
            Err(err) => ProviderResult::from_error(id, &err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider {
        delay: Duration,
        outcome: Result<Completion, ProviderError>,
    }

    #[async_trait::async_trait]
    impl LlmProvider for FixedProvider {
        async fn generate(&self, _prompt: &str) -> Result<Completion, ProviderError> {
            tokio::time::sleep(self.delay).await;
            self.outcome.clone()
        }

        fn id(&self) -> ProviderId {
            ProviderId::Anthropic
        }
    }

    fn adapter(delay_ms: u64, outcome: Result<Completion, ProviderError>) -> ProviderAdapter {
        ProviderAdapter::new(Arc::new(FixedProvider {
            delay: Duration::from_millis(delay_ms),
            outcome,
        }))
    }

    fn question() -> Question {
        Question::new("What is Rust?").unwrap()
    }

    #[tokio::test]
    async fn test_success_uses_finish_reason() {
        let adapter = adapter(0, Ok(Completion::new("A language").with_finish_reason("end_turn")));
        let result = adapter.invoke(&question()).await;

        assert!(result.is_success());
        assert_eq!(result.answer.as_deref(), Some("A language"));
        assert_eq!(result.error, None);
        assert_eq!(result.status, ApiStatus::new(200, "end_turn"));
        assert_eq!(result.messages, vec![Message::assistant("[Anthropic] A language")]);
    }

    #[tokio::test]
    async fn test_success_without_finish_reason() {
        let result = adapter(0, Ok(Completion::new("ok"))).invoke(&question()).await;
        assert_eq!(result.status.detail, "success");
    }

    #[tokio::test]
    async fn test_provider_error_becomes_data() {
        let err = ProviderError::Http {
            status: 429,
            message: "slow down".to_string(),
        };
        let result = adapter(0, Err(err)).invoke(&question()).await;

        assert!(!result.is_success());
        assert_eq!(result.answer, None);
        assert_eq!(result.status, ApiStatus::new(429, "rate_limited"));
        assert_eq!(result.error.as_deref(), Some("HTTP 429: slow down"));
        assert_eq!(
            result.messages,
            vec![Message::assistant("[Anthropic error] HTTP 429: slow down")]
        );
    }

    #[tokio::test]
    async fn test_timeout_becomes_failure() {
        let adapter = adapter(2_000, Ok(Completion::new("too late")))
            .with_timeout(Some(Duration::from_millis(20)));
        let started = Instant::now();
        let result = adapter.invoke(&question()).await;

        assert!(started.elapsed() < Duration::from_millis(1_000));
        assert_eq!(result.status, ApiStatus::new(500, "timeout"));
        assert_eq!(result.answer, None);
    }

    #[tokio::test]
    async fn test_no_timeout_waits_for_answer() {
        let adapter = adapter(30, Ok(Completion::new("eventually"))).with_timeout(None);
        let result = adapter.invoke(&question()).await;
        assert_eq!(result.answer.as_deref(), Some("eventually"));
    }

    #[test]
    fn test_partial_serialization_shape() {
        let result = ProviderResult::success(ProviderId::OpenAi, "X", ApiStatus::new(200, "stop"));
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["model"], "OpenAI");
        assert_eq!(value["answer"], "X");
        assert_eq!(value["status"]["status"], 200);
        assert_eq!(value["status"]["detail"], "stop");
        assert!(value["error"].is_null());
    }
}
