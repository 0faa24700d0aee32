//! LLM-assisted analysis, with a small reading toolbelt and a rule-based fallback.
//!
//! The toolbelt is deliberately narrow: it resolves a function name against the local
//! code index and reads its chunked source from the project root on disk. It never
//! accepts a caller/callee file path straight from the knowledge-graph side of a
//! diagnosis — those can be absolute paths from wherever the graph was populated (a
//! remote indexing host, a different checkout), and reading them locally would either
//! fail or silently read the wrong file. The tool re-resolves by function name through
//! the local index instead, which always yields a path relative to `root`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use trustbot_core::{
    Analyzer, AnalysisReport, CallGraphOutput, EdgeDiagnosis, RootCause,
    RuleBasedAnalyzer, VerificationResult,
};
use trustbot_index::CodeIndex;
use trustbot_llm::{extract_json, ChatMessage, LlmClient};

fn basename(path: &str) -> String {
    path.replace('\\', "/").rsplit('/').next().unwrap_or(path).to_string()
}

/// Looks up `function_name` in the index and returns its source text read fresh from
/// `root`, truncated to a token-friendly size. Returns `None` on any lookup or read
/// failure rather than surfacing an error — a missing read is just one fewer thing the
/// LLM gets to look at.
fn read_function_source(root: &Path, index: &CodeIndex, function_name: &str) -> Option<String> {
    let rows = index.find(function_name).ok()?;
    let row = rows.into_iter().next()?;
    let full_path: PathBuf = root.join(&row.file_path);
    let content = std::fs::read_to_string(&full_path).ok()?;
    Some(content.chars().take(2000).collect())
}

#[derive(Debug, Deserialize, Default)]
struct LlmAnalysis {
    #[serde(default)]
    phantom_analysis: Vec<LlmDiagnosis>,
    #[serde(default)]
    missing_analysis: Vec<LlmDiagnosis>,
    #[serde(default)]
    systemic_patterns: Vec<String>,
    #[serde(default)]
    recommended_actions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LlmDiagnosis {
    caller: String,
    callee: String,
    root_cause: String,
    suggestion: String,
}

fn parse_root_cause(raw: &str) -> RootCause {
    match raw.to_lowercase().replace([' ', '-'], "_").as_str() {
        "qualified_vs_bare_mismatch" => RootCause::QualifiedVsBareMismatch,
        "wrong_project_scope" => RootCause::WrongProjectScope,
        "callee_renamed_or_removed" => RootCause::CalleeRenamedOrRemoved,
        "dynamic_or_indirect_call" => RootCause::DynamicOrIndirectCall,
        "form_binding_not_indexed" => RootCause::FormBindingNotIndexed,
        "call_not_in_kg_flow" => RootCause::CallNotInKgFlow,
        "extractor_over_reporting" => RootCause::ExtractorOverReporting,
        _ => RootCause::ExtractionGap,
    }
}

/// Consults the LLM with read access to the local codebase (by function name only, never
/// by a raw file path carried on an edge) to explain phantom/missing edges in more depth
/// than the rule-based pattern matcher can. Falls back to [`RuleBasedAnalyzer`] whenever
/// the LLM call fails or its response doesn't parse.
pub struct LlmAssistedAnalyzer<'a> {
    root: PathBuf,
    index: &'a CodeIndex,
    llm: &'a LlmClient,
    fallback: RuleBasedAnalyzer,
}

impl<'a> LlmAssistedAnalyzer<'a> {
    pub fn new(root: PathBuf, index: &'a CodeIndex, llm: &'a LlmClient) -> Self {
        Self { root, index, llm, fallback: RuleBasedAnalyzer }
    }

    fn build_prompt(&self, result: &VerificationResult, source_graph: &CallGraphOutput) -> String {
        let mut parts = vec![
            format!("Analyze discrepancies for execution flow: {}", result.flow_id),
            format!(
                "Trust scores: flow={:.2}, graph={:.2}. Confirmed: {}, phantom: {}, missing: {}",
                result.flow_trust,
                result.graph_trust,
                result.confirmed.len(),
                result.phantom.len(),
                result.missing.len(),
            ),
            format!("Root function: {}", source_graph.root_function),
        ];

        const MAX_EDGES: usize = 20;
        if !result.phantom.is_empty() {
            parts.push(format!("\nPhantom edges ({} total):", result.phantom.len()));
            for e in result.phantom.iter().take(MAX_EDGES) {
                parts.push(format!("- {} -> {} (files: {}, {})", e.caller, e.callee, basename(&e.caller_file), basename(&e.callee_file)));
                if let Some(src) = read_function_source(&self.root, self.index, &e.caller) {
                    parts.push(format!("  caller source (local index lookup, truncated): {}", src.lines().take(15).collect::<Vec<_>>().join(" | ")));
                }
            }
        }
        if !result.missing.is_empty() {
            parts.push(format!("\nMissing edges ({} total):", result.missing.len()));
            for e in result.missing.iter().take(MAX_EDGES) {
                parts.push(format!("- {} -> {} (files: {}, {})", e.caller, e.callee, basename(&e.caller_file), basename(&e.callee_file)));
            }
        }

        parts.push(
            "\nRespond with JSON: {\"phantom_analysis\": [{\"caller\",\"callee\",\"root_cause\",\"suggestion\"}], \
             \"missing_analysis\": [...], \"systemic_patterns\": [string], \"recommended_actions\": [string]}. \
             root_cause must be one of: qualified_vs_bare_mismatch, wrong_project_scope, callee_renamed_or_removed, \
             dynamic_or_indirect_call, form_binding_not_indexed, extraction_gap, call_not_in_kg_flow, extractor_over_reporting."
                .to_string(),
        );

        parts.join("\n")
    }
}

#[async_trait::async_trait]
impl<'a> Analyzer for LlmAssistedAnalyzer<'a> {
    async fn analyze(&self, result: &VerificationResult, kg_graph: &CallGraphOutput, source_graph: &CallGraphOutput) -> AnalysisReport {
        if result.phantom.is_empty() && result.missing.is_empty() {
            return self.fallback.analyze(result, kg_graph, source_graph).await;
        }

        let messages = vec![
            ChatMessage::system(
                "You diagnose discrepancies between a knowledge graph's recorded call graph and \
                 the one reconstructed from source. Use the provided source snippets (already \
                 resolved locally by function name) rather than any file path mentioned in the \
                 edge data — those paths may point at a different machine entirely.",
            ),
            ChatMessage::user(&self.build_prompt(result, source_graph)),
        ];

        let response = match self.llm.chat_completion(&messages).await {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!(error = %err, flow_id = %result.flow_id, "LLM-assisted analyzer falling back to rule-based");
                return self.fallback.analyze(result, kg_graph, source_graph).await;
            }
        };

        let parsed: LlmAnalysis = match serde_json::from_str(extract_json(&response)) {
            Ok(p) => p,
            Err(err) => {
                tracing::warn!(error = %err, flow_id = %result.flow_id, "LLM-assisted analyzer response unparseable, falling back");
                return self.fallback.analyze(result, kg_graph, source_graph).await;
            }
        };

        let to_diagnosis = |d: LlmDiagnosis| EdgeDiagnosis {
            caller: d.caller,
            callee: d.callee,
            root_cause: parse_root_cause(&d.root_cause),
            suggestion: d.suggestion,
        };

        let fallback_report = self.fallback.analyze(result, kg_graph, source_graph).await;

        AnalysisReport {
            flow_id: result.flow_id.clone(),
            phantom_diagnoses: parsed.phantom_analysis.into_iter().map(to_diagnosis).collect(),
            missing_diagnoses: parsed.missing_analysis.into_iter().map(to_diagnosis).collect(),
            root_analysis: fallback_report.root_analysis,
            systemic_patterns: parsed.systemic_patterns,
            recommended_actions: parsed.recommended_actions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tempfile::tempdir;
    use trustbot_core::{EdgeClassification, GraphSource, VerifiedEdge};
    use trustbot_llm::{LlmError, LlmProvider};

    fn mk_verified(caller: &str, callee: &str, classification: EdgeClassification) -> VerifiedEdge {
        VerifiedEdge {
            caller: caller.to_string(),
            callee: callee.to_string(),
            caller_file: "a.py".to_string(),
            callee_file: "b.py".to_string(),
            classification,
            trust: 0.2,
            details: String::new(),
        }
    }

    struct ScriptedProvider(String);
    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn chat_completion(&self, _messages: &[ChatMessage]) -> Result<String, LlmError> {
            Ok(self.0.clone())
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
            unimplemented!()
        }
        fn model(&self) -> &str {
            "test-model"
        }
    }

    #[tokio::test]
    async fn parses_llm_diagnosis_into_report() {
        let dir = tempdir().unwrap();
        let index = CodeIndex::open_in_memory().unwrap();
        let profiles = HashMap::from([("python".to_string(), trustbot_profiles::seed_profile("python").unwrap())]);
        index.build(dir.path(), &profiles).unwrap();

        let body = r#"{"phantom_analysis": [{"caller": "main", "callee": "save", "root_cause": "extraction_gap", "suggestion": "check it"}], "missing_analysis": [], "systemic_patterns": ["p"], "recommended_actions": ["r"]}"#;
        let llm = LlmClient::new(Box::new(ScriptedProvider(body.to_string())), 1);

        let analyzer = LlmAssistedAnalyzer::new(dir.path().to_path_buf(), &index, &llm);
        let result = VerificationResult {
            flow_id: "f".to_string(),
            graph_trust: 0.5,
            flow_trust: 0.5,
            confirmed: Vec::new(),
            phantom: vec![mk_verified("main", "save", EdgeClassification::Phantom)],
            missing: Vec::new(),
            conflicted: Vec::new(),
            unresolved: Vec::new(),
            metadata: Default::default(),
        };
        let kg = CallGraphOutput::new("f", GraphSource::Kg, "main");
        let source = CallGraphOutput::new("f", GraphSource::Source, "main");

        let report = analyzer.analyze(&result, &kg, &source).await;
        assert_eq!(report.phantom_diagnoses.len(), 1);
        assert_eq!(report.phantom_diagnoses[0].root_cause, RootCause::ExtractionGap);
        assert_eq!(report.systemic_patterns, vec!["p".to_string()]);
    }

    #[tokio::test]
    async fn no_discrepancies_skips_the_llm_entirely() {
        let dir = tempdir().unwrap();
        let index = CodeIndex::open_in_memory().unwrap();
        let llm = LlmClient::new(Box::new(ScriptedProvider("unused".to_string())), 1);

        let analyzer = LlmAssistedAnalyzer::new(dir.path().to_path_buf(), &index, &llm);
        let result = VerificationResult {
            flow_id: "f".to_string(),
            graph_trust: 1.0,
            flow_trust: 1.0,
            confirmed: vec![mk_verified("a", "b", EdgeClassification::Confirmed)],
            phantom: Vec::new(),
            missing: Vec::new(),
            conflicted: Vec::new(),
            unresolved: Vec::new(),
            metadata: Default::default(),
        };
        let kg = CallGraphOutput::new("f", GraphSource::Kg, "a");
        let source = CallGraphOutput::new("f", GraphSource::Source, "a");

        let report = analyzer.analyze(&result, &kg, &source).await;
        assert!(report.phantom_diagnoses.is_empty());
        assert!(report.missing_diagnoses.is_empty());
    }
}
