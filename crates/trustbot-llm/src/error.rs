//! Error type for everything that talks to the LLM provider.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("llm transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("llm provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("llm response was not valid JSON: {0}")]
    Malformed(String),

    #[error("llm cache error: {0}")]
    Cache(#[from] rusqlite::Error),

    #[error("llm client misconfigured: {0}")]
    Config(String),

    #[error("retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<LlmError>,
    },
}

impl LlmError {
    /// Transient errors are the ones worth retrying: connection loss, timeouts, and
    /// 5xx/429 provider responses. Malformed JSON and config errors are not retried —
    /// those are treated as a plain extraction failure, not a transient fault.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Timeout(_) => true,
            LlmError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            LlmError::Provider { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
