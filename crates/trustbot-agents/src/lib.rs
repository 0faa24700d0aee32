//! trustbot-agents — the two derivation agents (rule-based and LLM-assisted), the
//! LLM-assisted analyzer, and the orchestrator that wires them together with
//! trustbot-core's normalization and verification. This is the only crate that depends
//! on trustbot-core, trustbot-index, and trustbot-llm all at once.

pub mod analyzer_llm;
pub mod error;
pub mod kg_agent;
pub mod orchestrator;
pub mod source_agent;

pub use analyzer_llm::LlmAssistedAnalyzer;
pub use error::PipelineError;
pub use kg_agent::{KgDerivationAgent, LlmAssistedKgAgent};
pub use orchestrator::{project_trust, FlowOutcome, Orchestrator, ProgressCallback};
pub use source_agent::{LlmAssistedSourceAgent, RootHint, SourceDerivationAgent};
