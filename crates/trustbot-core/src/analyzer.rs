//! Structured-output analysis of a `VerificationResult`. Rule-based implementation lives
//! here; an LLM-assisted implementation (with rule-based fallback) lives in trustbot-agents,
//! which can reach the LLM client and the code index this crate deliberately does not depend on.

use async_trait::async_trait;

use crate::model::{
    bare_name, AnalysisReport, CallGraphOutput, EdgeDiagnosis, RootAnalysis, RootCause,
    VerificationResult, VerifiedEdge,
};

#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(
        &self,
        result: &VerificationResult,
        kg_graph: &CallGraphOutput,
        source_graph: &CallGraphOutput,
    ) -> AnalysisReport;
}

/// Deterministic, fast: pattern-matches on qualified/bare shapes, file-basename equality,
/// presence in the source graph, and Agent 2's resolution metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleBasedAnalyzer;

impl RuleBasedAnalyzer {
    fn diagnose_phantom(&self, edge: &VerifiedEdge, source_graph: &CallGraphOutput) -> EdgeDiagnosis {
        let caller_bare = bare_name(&edge.caller);
        let callee_bare = bare_name(&edge.callee);

        let bare_exists = source_graph
            .edges
            .iter()
            .any(|e| bare_name(&e.caller) == caller_bare && bare_name(&e.callee) == callee_bare);

        let (root_cause, suggestion) = if bare_exists {
            (
                RootCause::QualifiedVsBareMismatch,
                "KG edge carries a qualifier the index drops; compare bare names explicitly.".to_string(),
            )
        } else if !source_graph
            .edges
            .iter()
            .any(|e| basename(&e.caller_file) == basename(&edge.caller_file))
        {
            (
                RootCause::WrongProjectScope,
                "caller's file is outside the indexed project scope; re-index with a wider root.".to_string(),
            )
        } else if source_graph.unresolved_callees.iter().any(|c| bare_name(c) == callee_bare) {
            (
                RootCause::CalleeRenamedOrRemoved,
                "callee appears unresolved in the source graph; it may have been renamed.".to_string(),
            )
        } else {
            (
                RootCause::ExtractionGap,
                "no structural evidence found; verify manually or widen extraction coverage.".to_string(),
            )
        };

        EdgeDiagnosis { caller: edge.caller.clone(), callee: edge.callee.clone(), root_cause, suggestion }
    }

    fn diagnose_missing(&self, edge: &VerifiedEdge, kg_graph: &CallGraphOutput) -> EdgeDiagnosis {
        let caller_bare = bare_name(&edge.caller);
        let callee_bare = bare_name(&edge.callee);

        let in_kg_flow = kg_graph
            .edges
            .iter()
            .any(|e| bare_name(&e.caller) == caller_bare && bare_name(&e.callee) == callee_bare);

        let (root_cause, suggestion) = if !in_kg_flow {
            (
                RootCause::CallNotInKgFlow,
                "call exists in source but the knowledge graph's flow doesn't cover it.".to_string(),
            )
        } else {
            (
                RootCause::ExtractorOverReporting,
                "call extracted from source but not reflected in the knowledge graph; review extraction confidence.".to_string(),
            )
        };

        EdgeDiagnosis { caller: edge.caller.clone(), callee: edge.callee.clone(), root_cause, suggestion }
    }
}

fn basename(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_lowercase()
}

#[async_trait]
impl Analyzer for RuleBasedAnalyzer {
    async fn analyze(
        &self,
        result: &VerificationResult,
        kg_graph: &CallGraphOutput,
        source_graph: &CallGraphOutput,
    ) -> AnalysisReport {
        let phantom_diagnoses: Vec<_> =
            result.phantom.iter().map(|e| self.diagnose_phantom(e, source_graph)).collect();
        let missing_diagnoses: Vec<_> =
            result.missing.iter().map(|e| self.diagnose_missing(e, kg_graph)).collect();

        let root_bare = bare_name(&source_graph.root_function);
        let has_outgoing_edges = source_graph.edges.iter().any(|e| bare_name(&e.caller) == root_bare);
        let found_in_index = source_graph
            .metadata
            .get("root_found_in_index")
            .and_then(|v| v.as_bool())
            .unwrap_or(has_outgoing_edges);
        let resolution_strategy = source_graph
            .metadata
            .get("root_resolution_strategy")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let mut systemic_patterns = Vec::new();
        if phantom_diagnoses
            .iter()
            .filter(|d| d.root_cause == RootCause::QualifiedVsBareMismatch)
            .count()
            > 1
        {
            systemic_patterns.push("repeated qualified-vs-bare mismatches across phantom edges".to_string());
        }
        if missing_diagnoses
            .iter()
            .filter(|d| d.root_cause == RootCause::CallNotInKgFlow)
            .count()
            > 1
        {
            systemic_patterns.push("multiple source calls fall outside the knowledge graph's flow scope".to_string());
        }

        let mut recommended_actions = Vec::new();
        if !phantom_diagnoses.is_empty() {
            recommended_actions.push("review phantom edges for naming or scope mismatches".to_string());
        }
        if !missing_diagnoses.is_empty() {
            recommended_actions.push("confirm whether missing edges belong in this execution flow".to_string());
        }
        if !has_outgoing_edges {
            recommended_actions.push("root function has no outgoing edges in the source index; re-index or widen scope".to_string());
        }

        AnalysisReport {
            flow_id: result.flow_id.clone(),
            phantom_diagnoses,
            missing_diagnoses,
            root_analysis: RootAnalysis { found_in_index, has_outgoing_edges, resolution_strategy },
            systemic_patterns,
            recommended_actions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CallEdge, EdgeClassification, ExtractionMethod, GraphSource};

    fn mk_edge(caller: &str, callee: &str) -> CallEdge {
        CallEdge {
            caller: caller.to_string(),
            callee: callee.to_string(),
            caller_file: "f.pas".to_string(),
            callee_file: "f.pas".to_string(),
            caller_class: String::new(),
            callee_class: String::new(),
            depth: 1,
            extraction_method: ExtractionMethod::Regex,
            confidence: 0.9,
        }
    }

    #[tokio::test]
    async fn flags_qualified_vs_bare_mismatch() {
        let kg = CallGraphOutput::new("f", GraphSource::Kg, "TForm1.OnClick");
        let mut source = CallGraphOutput::new("f", GraphSource::Source, "OnClick");
        source.edges.push(mk_edge("OnClick", "Save"));

        let result = VerificationResult {
            flow_id: "f".to_string(),
            graph_trust: 0.5,
            flow_trust: 0.0,
            confirmed: Vec::new(),
            phantom: vec![VerifiedEdge {
                caller: "TForm1.OnClick".to_string(),
                callee: "TForm1.Save".to_string(),
                caller_file: "f.pas".to_string(),
                callee_file: "f.pas".to_string(),
                classification: EdgeClassification::Phantom,
                trust: 0.2,
                details: "not found in indexed codebase".to_string(),
            }],
            missing: Vec::new(),
            conflicted: Vec::new(),
            unresolved: Vec::new(),
            metadata: Default::default(),
        };

        let analyzer = RuleBasedAnalyzer;
        let report = analyzer.analyze(&result, &kg, &source).await;
        assert_eq!(report.phantom_diagnoses.len(), 1);
        assert_eq!(report.phantom_diagnoses[0].root_cause, RootCause::QualifiedVsBareMismatch);
    }
}
