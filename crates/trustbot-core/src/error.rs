//! Error types owned by the core crate: the knowledge-graph contract and the diff engine.
//! Other components (profiles, index, llm, agents) define their own `thiserror` enums in
//! their own crates and convert into the orchestrator's `PipelineError` via `#[from]`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KgError {
    #[error("flow not found: {0}")]
    FlowNotFound(String),
    #[error("query refused (write clause detected): {0}")]
    QueryRefused(String),
    #[error("transient kg failure for flow {flow_key}: {source}")]
    Transient {
        flow_key: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("kg store returned no participants for flow {0}")]
    NoParticipants(String),
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("cannot verify: {0}")]
    Invalid(String),
}
