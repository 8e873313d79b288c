use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::observer::{AttemptOutcome, AttemptRecord, CompletionObserver, TracingObserver};
use super::prompts::SYSTEM_PROMPT;
use crate::error::CompletionError;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Fixed wait after a rate-limit signal
pub const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(60);

/// Per-request settings
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    /// Model to use (e.g., "claude-sonnet-4-20250514")
    pub model: String,
    /// Maximum tokens in response
    pub max_tokens: u32,
    /// Temperature (0-1, lower = more deterministic)
    pub temperature: f64,
    /// Optional stop sequence
    pub stop: Option<String>,
    /// Retries allowed after a rate-limit signal
    pub retry_budget: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 4096,
            temperature: 0.3,
            stop: None,
            retry_budget: 2,
        }
    }
}

impl CompletionOptions {
    /// Same options with a different output budget
    pub fn with_max_tokens(&self, max_tokens: u32) -> Self {
        Self {
            max_tokens,
            ..self.clone()
        }
    }
}

/// How a single provider request failed
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderFailure {
    /// The provider asked us to slow down; worth retrying after a wait
    RateLimited(String),
    /// Anything else; never retried
    Fatal(String),
}

/// A language model that turns one prompt into one response
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Issue exactly one request
    async fn send(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> std::result::Result<String, ProviderFailure>;
}

/// Configuration for the Anthropic API client
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// API key (from ANTHROPIC_API_KEY env var)
    pub api_key: String,
    /// API root, overridable for proxies (ANTHROPIC_BASE_URL)
    pub base_url: String,
}

impl AnthropicConfig {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .context("ANTHROPIC_API_KEY environment variable not set")?;
        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        Ok(Self { api_key, base_url })
    }

    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }
}

/// Anthropic API client
pub struct AnthropicClient {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicClient {
    pub fn new(config: AnthropicConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl CompletionProvider for AnthropicClient {
    async fn send(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> std::result::Result<String, ProviderFailure> {
        let request = AnthropicRequest {
            model: options.model.clone(),
            max_tokens: options.max_tokens,
            temperature: Some(options.temperature),
            system: Some(SYSTEM_PROMPT.to_string()),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stop_sequences: options.stop.clone().map(|s| vec![s]),
        };

        let response = self
            .client
            .post(self.config.messages_url())
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                ProviderFailure::Fatal(format!("failed to send request to Anthropic API: {}", e))
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderFailure::RateLimited(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderFailure::Fatal(format!(
                "Anthropic API error: {} - {}",
                status, body
            )));
        }

        let response: AnthropicResponse = response.json().await.map_err(|e| {
            ProviderFailure::Fatal(format!("failed to parse Anthropic API response: {}", e))
        })?;

        Ok(response.text())
    }
}

/// Issues completions with the rate-limit retry policy applied.
///
/// Cheap to clone; clones share the provider and the observability sink.
#[derive(Clone)]
pub struct CompletionClient {
    provider: Arc<dyn CompletionProvider>,
    observer: Arc<dyn CompletionObserver>,
    backoff: Duration,
}

impl CompletionClient {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider,
            observer: Arc::new(TracingObserver),
            backoff: RATE_LIMIT_BACKOFF,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn CompletionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Override the wait after a rate-limit signal
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Send a prompt and return the raw response text.
    ///
    /// Rate limits are retried up to `options.retry_budget` times with a fixed
    /// wait in between; every other failure is returned immediately.
    pub async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> std::result::Result<String, CompletionError> {
        let max_attempts = options.retry_budget.saturating_add(1);

        for attempt in 1..=max_attempts {
            let started = Instant::now();
            let result = self.provider.send(prompt, options).await;
            let latency = started.elapsed();

            let mut record = AttemptRecord {
                model: options.model.clone(),
                attempt,
                prompt_chars: prompt.chars().count(),
                response_chars: 0,
                latency,
                outcome: AttemptOutcome::Success,
                detail: None,
            };

            match result {
                Ok(text) if text.trim().is_empty() => {
                    record.outcome = AttemptOutcome::EmptyResponse;
                    self.observer.on_attempt(&record);
                    return Err(CompletionError::EmptyResponse);
                }
                Ok(text) => {
                    record.response_chars = text.chars().count();
                    self.observer.on_attempt(&record);
                    return Ok(text);
                }
                Err(ProviderFailure::RateLimited(detail)) => {
                    record.outcome = AttemptOutcome::RateLimited;
                    record.detail = Some(detail);
                    self.observer.on_attempt(&record);

                    if attempt < max_attempts {
                        self.observer.on_backoff(attempt, self.backoff);
                        tokio::time::sleep(self.backoff).await;
                    }
                }
                Err(ProviderFailure::Fatal(message)) => {
                    record.outcome = AttemptOutcome::ProviderError;
                    record.detail = Some(message.clone());
                    self.observer.on_attempt(&record);
                    return Err(CompletionError::ProviderError(message));
                }
            }
        }

        Err(CompletionError::RateLimitExceeded {
            attempts: max_attempts,
        })
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

impl AnthropicResponse {
    /// Concatenated text of all text blocks
    fn text(&self) -> String {
        self.content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{RecordingObserver, ScriptedProvider};

    fn client(provider: Arc<ScriptedProvider>, observer: Arc<RecordingObserver>) -> CompletionClient {
        CompletionClient::new(provider)
            .with_observer(observer)
            .with_backoff(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_rate_limit_then_success() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderFailure::RateLimited("slow down".into())),
            Ok("second attempt".into()),
        ]));
        let observer = Arc::new(RecordingObserver::default());
        let options = CompletionOptions {
            retry_budget: 2,
            ..Default::default()
        };

        let text = client(provider.clone(), observer.clone())
            .complete("prompt", &options)
            .await
            .unwrap();

        assert_eq!(text, "second attempt");
        assert_eq!(provider.call_count(), 2);
        assert_eq!(observer.backoffs(), 1);
        assert_eq!(
            observer.outcomes(),
            vec![AttemptOutcome::RateLimited, AttemptOutcome::Success]
        );
    }

    #[tokio::test]
    async fn test_rate_limit_budget_exhausted() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderFailure::RateLimited("1".into())),
            Err(ProviderFailure::RateLimited("2".into())),
            Err(ProviderFailure::RateLimited("3".into())),
            Ok("never reached".into()),
        ]));
        let observer = Arc::new(RecordingObserver::default());
        let options = CompletionOptions {
            retry_budget: 2,
            ..Default::default()
        };

        let err = client(provider.clone(), observer.clone())
            .complete("prompt", &options)
            .await
            .unwrap_err();

        assert_eq!(err, CompletionError::RateLimitExceeded { attempts: 3 });
        assert_eq!(provider.call_count(), 3);
        assert_eq!(observer.backoffs(), 2);
    }

    #[tokio::test]
    async fn test_zero_budget_makes_single_attempt() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(
            ProviderFailure::RateLimited("busy".into()),
        )]));
        let observer = Arc::new(RecordingObserver::default());
        let options = CompletionOptions {
            retry_budget: 0,
            ..Default::default()
        };

        let err = client(provider.clone(), observer.clone())
            .complete("prompt", &options)
            .await
            .unwrap_err();

        assert_eq!(err, CompletionError::RateLimitExceeded { attempts: 1 });
        assert_eq!(observer.backoffs(), 0);
    }

    #[tokio::test]
    async fn test_provider_error_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderFailure::Fatal("401 invalid x-api-key".into())),
            Ok("unused".into()),
        ]));
        let observer = Arc::new(RecordingObserver::default());

        let err = client(provider.clone(), observer.clone())
            .complete("prompt", &CompletionOptions::default())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            CompletionError::ProviderError("401 invalid x-api-key".into())
        );
        assert_eq!(provider.call_count(), 1);
        assert_eq!(observer.outcomes(), vec![AttemptOutcome::ProviderError]);
    }

    #[tokio::test]
    async fn test_empty_response_is_distinct() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok("  \n".into())]));
        let observer = Arc::new(RecordingObserver::default());

        let err = client(provider, observer.clone())
            .complete("prompt", &CompletionOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err, CompletionError::EmptyResponse);
        assert_eq!(observer.outcomes(), vec![AttemptOutcome::EmptyResponse]);
    }

    #[test]
    fn test_options_default() {
        let options = CompletionOptions::default();
        assert_eq!(options.max_tokens, 4096);
        assert_eq!(options.retry_budget, 2);
        assert!(options.stop.is_none());
        assert_eq!(options.with_max_tokens(1024).max_tokens, 1024);
    }

    #[test]
    fn test_request_serialization_includes_stop_sequence() {
        let request = AnthropicRequest {
            model: "m".into(),
            max_tokens: 10,
            temperature: Some(0.3),
            system: None,
            messages: vec![],
            stop_sequences: Some(vec!["</json>".into()]),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stop_sequences"][0], "</json>");
        assert!(json.get("system").is_none());
    }

    #[test]
    fn test_response_text_joins_text_blocks() {
        let response: AnthropicResponse = serde_json::from_str(
            r#"{"content": [{"type": "text", "text": "[\"a\","}, {"type": "text", "text": " \"b\"]"}]}"#,
        )
        .unwrap();
        assert_eq!(response.text(), r#"["a", "b"]"#);
    }

    #[test]
    fn test_messages_url_trims_slash() {
        let config = AnthropicConfig {
            api_key: "k".into(),
            base_url: "http://localhost:8080/".into(),
        };
        assert_eq!(config.messages_url(), "http://localhost:8080/v1/messages");
    }
}
