//! trustbot-core — shared data model, the knowledge-graph contract, normalization,
//! the verification/diff engine, and the rule-based analyzer.
//!
//! This crate deliberately has no knowledge of HTTP, SQLite, or the filesystem: it is the
//! part of the pipeline that is pure data plus pure functions. Everything that reaches an
//! external system (the KG store, the LLM, the on-disk index) lives in a sibling crate and
//! depends on this one, never the other way around.

pub mod analyzer;
pub mod diff;
pub mod error;
pub mod kg;
pub mod model;
pub mod normalize;

pub use analyzer::{Analyzer, RuleBasedAnalyzer};
pub use diff::verify;
pub use error::{KgError, VerifyError};
pub use kg::{guard_read_only, FlowNode, KgCallsEdge, KgStore, SnippetNode};
pub use model::{
    bare_name, normalize_file_path, AliasEntry, AliasTable, AnalysisReport, CallEdge,
    CallGraphOutput, ChunkId, EdgeClassification, EdgeDiagnosis, ExecutionOrderEntry,
    ExtractionMethod, GraphSource, MatchTier, RootAnalysis, RootCause, VerificationResult,
    VerifiedEdge, DEFAULT_BASELINE_TRUST,
};
pub use normalize::{normalize_graph, normalize_name};
