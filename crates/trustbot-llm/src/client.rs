//! Chat-completion and embedding calls wrapped with bounded concurrency, retry with
//! exponential backoff, and per-call timeouts. The semaphore here is the process-wide
//! backpressure mechanism — every LLM-calling component (the call-edge extractor, and
//! the LLM-assisted agent variants) acquires a permit from the same client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::error::LlmError;

const RETRY_BACKOFF_BASE: f64 = 1.5;
const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system", content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user", content: content.into() }
    }
}

/// The two external-provider shapes the core needs. Chat completion is used by
/// profile generation, call extraction, and the LLM-assisted agent variants; embedding is
/// exposed only for a semantic-search subsystem outside this core's scope.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat_completion(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;

    fn model(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub max_concurrent_calls: usize,
    pub request_timeout: Duration,
}

/// An OpenAI-compatible chat-completions + embeddings client. Retry, timeout, and the
/// shared semaphore are applied by [`LlmClient`], which wraps this provider; this struct
/// owns only the wire format.
pub struct HttpLlmProvider {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl HttpLlmProvider {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout: config.request_timeout,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: WireMessageOwned,
}

#[derive(Deserialize)]
struct WireMessageOwned {
    content: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    async fn chat_completion(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: messages.iter().map(|m| WireMessage { role: m.role, content: &m.content }).collect(),
            temperature: 0.0,
        };

        let send = self
            .http
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send();

        let response = timeout(self.timeout, send).await.map_err(|_| LlmError::Timeout(self.timeout))??;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Provider { status, body });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::Malformed("no choices in chat completion response".to_string()))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let request = EmbeddingRequest { model: &self.model, input: text };
        let send = self.http.post(format!("{}/embeddings", self.endpoint)).bearer_auth(&self.api_key).json(&request).send();
        let response = timeout(self.timeout, send).await.map_err(|_| LlmError::Timeout(self.timeout))??;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Provider { status, body });
        }

        let parsed: EmbeddingResponse = response.json().await?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| LlmError::Malformed("no data in embedding response".to_string()))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Wraps a [`LlmProvider`] with the process-wide semaphore and retry policy. Every
/// LLM-calling component in the workspace shares one `LlmClient` instance.
pub struct LlmClient {
    provider: Box<dyn LlmProvider>,
    semaphore: Arc<Semaphore>,
}

impl LlmClient {
    pub fn new(provider: Box<dyn LlmProvider>, max_concurrent_calls: usize) -> Self {
        Self { provider, semaphore: Arc::new(Semaphore::new(max_concurrent_calls.max(1))) }
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    pub async fn chat_completion(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let _permit = self.semaphore.acquire().await.expect("semaphore closed");
        self.with_retry(|| self.provider.chat_completion(messages)).await
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let _permit = self.semaphore.acquire().await.expect("semaphore closed");
        self.with_retry(|| self.provider.embed(text)).await
    }

    /// Retries transient failures with exponential backoff (base 1.5), up to
    /// [`MAX_ATTEMPTS`] attempts total. Non-transient failures (malformed output,
    /// misconfiguration) are returned immediately and treated as extraction
    /// failures to fall back from, not faults to retry.
    async fn with_retry<'a, F, Fut, T>(&'a self, mut call: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, LlmError>> + 'a,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                    let backoff_secs = RETRY_BACKOFF_BASE.powi(attempt as i32 - 1);
                    tracing::warn!(attempt, backoff_secs, error = %err, "retrying transient llm failure");
                    tokio::time::sleep(Duration::from_secs_f64(backoff_secs)).await;
                }
                Err(err) if err.is_transient() => {
                    return Err(LlmError::RetriesExhausted { attempts: attempt, source: Box::new(err) });
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyProvider {
        calls: AtomicU32,
        fail_times: u32,
    }

    #[async_trait]
    impl LlmProvider for FlakyProvider {
        async fn chat_completion(&self, _messages: &[ChatMessage]) -> Result<String, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(LlmError::Provider { status: 503, body: "busy".to_string() })
            } else {
                Ok("ok".to_string())
            }
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
            unimplemented!()
        }

        fn model(&self) -> &str {
            "flaky-test-model"
        }
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let provider = FlakyProvider { calls: AtomicU32::new(0), fail_times: 2 };
        let client = LlmClient::new(Box::new(provider), 2);
        let result = client.chat_completion(&[ChatMessage::user("hi")]).await;
        assert_eq!(result.unwrap(), "ok");
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let provider = FlakyProvider { calls: AtomicU32::new(0), fail_times: 10 };
        let client = LlmClient::new(Box::new(provider), 2);
        let result = client.chat_completion(&[ChatMessage::user("hi")]).await;
        assert!(matches!(result, Err(LlmError::RetriesExhausted { attempts: 3, .. })));
    }
}
