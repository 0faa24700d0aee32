//! Core data structures shared across the call-graph validation pipeline.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// How a `CallEdge` was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Kg,
    Regex,
    LlmPrimary,
    LlmFallback,
}

impl ExtractionMethod {
    /// Baseline trust assigned to an edge derived by this method, before tier adjustment.
    pub fn baseline_trust(self) -> f64 {
        match self {
            ExtractionMethod::Kg => 0.95,
            ExtractionMethod::Regex => 0.90,
            ExtractionMethod::LlmPrimary => 0.80,
            ExtractionMethod::LlmFallback => 0.70,
        }
    }
}

/// Default baseline trust used when an edge carries no recognized extraction method tag.
pub const DEFAULT_BASELINE_TRUST: f64 = 0.75;

/// Which side of the dual derivation a `CallGraphOutput` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphSource {
    Kg,
    Source,
}

/// One directed call relationship, as derived by either side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEdge {
    pub caller: String,
    pub callee: String,
    pub caller_file: String,
    pub callee_file: String,
    pub caller_class: String,
    pub callee_class: String,
    /// Recursion depth at which this edge was discovered; always ≥ 1.
    pub depth: u32,
    pub extraction_method: ExtractionMethod,
    pub confidence: f64,
}

impl CallEdge {
    /// `(caller, callee)` with any leading `Qualifier.` stripped from both sides.
    pub fn bare_pair(&self) -> (String, String) {
        (bare_name(&self.caller), bare_name(&self.callee))
    }

    pub fn exact_pair(&self) -> (String, String) {
        (self.caller.clone(), self.callee.clone())
    }
}

/// Strips a single leading `Qualifier.` segment, if present.
pub fn bare_name(name: &str) -> String {
    match name.split_once('.') {
        Some((_, rest)) if !rest.is_empty() => rest.to_string(),
        _ => name.to_string(),
    }
}

/// Output of either derivation agent (KG-side or source-side), normalized identically
/// regardless of which side produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallGraphOutput {
    pub flow_id: String,
    pub source: GraphSource,
    pub root_function: String,
    pub edges: Vec<CallEdge>,
    pub unresolved_callees: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl CallGraphOutput {
    pub fn new(flow_id: impl Into<String>, source: GraphSource, root_function: impl Into<String>) -> Self {
        Self {
            flow_id: flow_id.into(),
            source,
            root_function: root_function.into(),
            edges: Vec::new(),
            unresolved_callees: Vec::new(),
            metadata: HashMap::new(),
        }
    }
}

/// Which matching tier classified a confirmed edge, carried for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Full,
    NameAndFile,
    NameOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeClassification {
    Confirmed,
    Phantom,
    Missing,
    Conflicted,
}

/// A single KG-or-source edge after classification against the other side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedEdge {
    pub caller: String,
    pub callee: String,
    pub caller_file: String,
    pub callee_file: String,
    pub classification: EdgeClassification,
    pub trust: f64,
    pub details: String,
}

/// An order-consistency check result for one caller's common callees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOrderEntry {
    pub caller: String,
    pub matched: bool,
    pub kg_order: Vec<String>,
    pub index_order: Vec<String>,
}

/// Aggregate output of the verify/diff stage for a single flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub flow_id: String,
    pub graph_trust: f64,
    pub flow_trust: f64,
    pub confirmed: Vec<VerifiedEdge>,
    pub phantom: Vec<VerifiedEdge>,
    pub missing: Vec<VerifiedEdge>,
    pub conflicted: Vec<VerifiedEdge>,
    pub unresolved: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl VerificationResult {
    /// A zero-score stub used when a flow fails before verification can run, so one
    /// broken flow doesn't abort a multi-flow run.
    pub fn error_stub(flow_id: impl Into<String>, error: impl std::fmt::Display) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("error".to_string(), serde_json::Value::String(error.to_string()));
        Self {
            flow_id: flow_id.into(),
            graph_trust: 0.0,
            flow_trust: 0.0,
            confirmed: Vec::new(),
            phantom: Vec::new(),
            missing: Vec::new(),
            conflicted: Vec::new(),
            unresolved: Vec::new(),
            metadata,
        }
    }
}

/// Root-cause categories the analyzer assigns to phantom/missing edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootCause {
    QualifiedVsBareMismatch,
    WrongProjectScope,
    CalleeRenamedOrRemoved,
    DynamicOrIndirectCall,
    FormBindingNotIndexed,
    ExtractionGap,
    CallNotInKgFlow,
    ExtractorOverReporting,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDiagnosis {
    pub caller: String,
    pub callee: String,
    pub root_cause: RootCause,
    pub suggestion: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootAnalysis {
    pub found_in_index: bool,
    pub has_outgoing_edges: bool,
    pub resolution_strategy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub flow_id: String,
    pub phantom_diagnoses: Vec<EdgeDiagnosis>,
    pub missing_diagnoses: Vec<EdgeDiagnosis>,
    pub root_analysis: RootAnalysis,
    pub systemic_patterns: Vec<String>,
    pub recommended_actions: Vec<String>,
}

/// `(normalized_file_path, class_name_or_empty, function_name)`, serialized as `a::b::c`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkId {
    pub file_path: String,
    pub class_name: String,
    pub function_name: String,
}

impl ChunkId {
    pub fn new(file_path: impl Into<String>, class_name: impl Into<String>, function_name: impl Into<String>) -> Self {
        Self {
            file_path: normalize_file_path(&file_path.into()),
            class_name: class_name.into(),
            function_name: function_name.into(),
        }
    }

    pub fn as_string(&self) -> String {
        format!("{}::{}::{}", self.file_path, self.class_name, self.function_name)
    }
}

/// Forward slashes, lowercased; the index and chunker both funnel paths through this.
pub fn normalize_file_path(path: &str) -> String {
    path.replace('\\', "/").to_lowercase()
}

/// A named pair: the canonical name resolves a set of aliases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasEntry {
    pub canonical: String,
    pub aliases: Vec<String>,
}

/// Resolves aliases case-insensitively to their canonical form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AliasTable {
    pub entries: Vec<AliasEntry>,
}

impl AliasTable {
    pub fn new(entries: Vec<AliasEntry>) -> Self {
        Self { entries }
    }

    /// Returns the canonical form for `name`, or `None` if no entry covers it.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        let lower = name.to_lowercase();
        for entry in &self.entries {
            if entry.canonical.to_lowercase() == lower {
                return Some(&entry.canonical);
            }
            if entry.aliases.iter().any(|a| a.to_lowercase() == lower) {
                return Some(&entry.canonical);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_strips_one_qualifier() {
        assert_eq!(bare_name("TForm1.OnClick"), "OnClick");
        assert_eq!(bare_name("OnClick"), "OnClick");
        assert_eq!(bare_name("A.B.C"), "B.C");
    }

    #[test]
    fn chunk_id_round_trips_through_string() {
        let id = ChunkId::new("SRC/Unit.PAS", "TForm1", "OnClick");
        assert_eq!(id.file_path, "src/unit.pas");
        assert_eq!(id.as_string(), "src/unit.pas::TForm1::OnClick");
    }

    #[test]
    fn alias_table_resolves_case_insensitively() {
        let table = AliasTable::new(vec![AliasEntry {
            canonical: "SAVE".to_string(),
            aliases: vec!["store".to_string(), "persist".to_string()],
        }]);
        assert_eq!(table.resolve("Store"), Some("SAVE"));
        assert_eq!(table.resolve("PERSIST"), Some("SAVE"));
        assert_eq!(table.resolve("save"), Some("SAVE"));
        assert_eq!(table.resolve("unknown"), None);
    }

    #[test]
    fn baseline_trust_matches_method() {
        assert_eq!(ExtractionMethod::Kg.baseline_trust(), 0.95);
        assert_eq!(ExtractionMethod::Regex.baseline_trust(), 0.90);
        assert_eq!(ExtractionMethod::LlmPrimary.baseline_trust(), 0.80);
        assert_eq!(ExtractionMethod::LlmFallback.baseline_trust(), 0.70);
    }
}
