//! The orchestrator's top-level error type, aggregating every component's own error enum.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Kg(#[from] trustbot_core::KgError),

    #[error(transparent)]
    Verify(#[from] trustbot_core::VerifyError),

    #[error(transparent)]
    Index(#[from] trustbot_index::IndexError),

    #[error(transparent)]
    Llm(#[from] trustbot_llm::LlmError),

    #[error("flow '{0}' has no resolvable root in the source index")]
    UnresolvedRoot(String),
}
