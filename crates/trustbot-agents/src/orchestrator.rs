//! Composes the two derivation agents, normalization, verification, and analysis into a
//! single- or multi-flow run. This is the only place in the workspace that knows the full
//! shape of the pipeline end to end.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;

use trustbot_core::{normalize_graph, AliasTable, Analyzer, AnalysisReport, KgStore, RuleBasedAnalyzer, VerificationResult};
use trustbot_index::CodeIndex;
use trustbot_llm::LlmClient;

use crate::error::PipelineError;
use crate::kg_agent::KgDerivationAgent;
use crate::source_agent::{RootHint, SourceDerivationAgent};

/// One flow's outcome: the trust/classification result plus a root-cause analysis when
/// there was anything worth explaining.
#[derive(Debug, Clone)]
pub struct FlowOutcome {
    pub verification: VerificationResult,
    pub analysis: Option<AnalysisReport>,
}

/// Reports pipeline progress for a UI or log line: which flow, out of how many, and what
/// stage it's at.
pub type ProgressCallback = Arc<dyn Fn(usize, usize, &str, &str) + Send + Sync>;

#[derive(Clone)]
pub struct Orchestrator {
    kg: Arc<dyn KgStore>,
    index: Arc<CodeIndex>,
    root: PathBuf,
    aliases: AliasTable,
    max_concurrent_flows: usize,
    llm: Option<Arc<LlmClient>>,
}

impl Orchestrator {
    pub fn new(kg: Arc<dyn KgStore>, index: Arc<CodeIndex>, root: PathBuf, aliases: AliasTable, max_concurrent_flows: usize) -> Self {
        Self { kg, index, root, aliases, max_concurrent_flows: max_concurrent_flows.max(1), llm: None }
    }

    pub fn with_llm(mut self, llm: Arc<LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Runs the full pipeline for one flow: fetch the KG side, normalize it, use its root
    /// and file hints to build the source side, normalize that, verify, and analyze any
    /// phantom or missing edges.
    pub async fn validate_flow(&self, flow_key: &str) -> Result<FlowOutcome, PipelineError> {
        let kg_agent = KgDerivationAgent::new(self.kg.clone());
        let kg_graph = kg_agent.fetch(flow_key).await?;
        let kg_graph = normalize_graph(kg_graph, &self.aliases);

        let root_class = kg_graph
            .edges
            .iter()
            .find(|e| e.caller == kg_graph.root_function)
            .map(|e| e.caller_class.as_str())
            .unwrap_or("");
        let root_file = kg_graph
            .edges
            .iter()
            .find(|e| e.caller == kg_graph.root_function)
            .map(|e| e.caller_file.as_str())
            .unwrap_or("");
        let hint_files: Vec<String> = kg_graph
            .edges
            .iter()
            .flat_map(|e| [e.caller_file.clone(), e.callee_file.clone()])
            .filter(|f| !f.is_empty())
            .collect();

        let hint = RootHint {
            root_class: if root_class.is_empty() { None } else { Some(root_class) },
            root_file: if root_file.is_empty() { None } else { Some(root_file) },
            hint_files: &hint_files,
        };

        let source_agent = SourceDerivationAgent::new(&self.index);
        let source_graph = source_agent.build(flow_key, &kg_graph.root_function, hint);
        let source_graph = normalize_graph(source_graph, &self.aliases);

        let verification = trustbot_core::verify(&kg_graph, &source_graph);

        let analysis = if verification.phantom.is_empty() && verification.missing.is_empty() {
            None
        } else {
            let analyzer = RuleBasedAnalyzer;
            Some(analyzer.analyze(&verification, &kg_graph, &source_graph).await)
        };

        Ok(FlowOutcome { verification, analysis })
    }

    /// Runs [`Self::validate_flow`] over every key in `flow_keys`, bounded to
    /// `max_concurrent_flows` at a time, preserving input order in the result. A flow
    /// that errors gets a zero-trust stub rather than aborting the others.
    pub async fn validate_flows(&self, flow_keys: &[String], progress: Option<ProgressCallback>) -> Vec<FlowOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_flows));
        let total = flow_keys.len();
        let mut results: Vec<Option<FlowOutcome>> = (0..total).map(|_| None).collect();

        let mut set = tokio::task::JoinSet::new();
        for (index, flow_key) in flow_keys.iter().cloned().enumerate() {
            let orchestrator = self.clone();
            let semaphore = semaphore.clone();
            let progress = progress.clone();
            set.spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                if let Some(cb) = &progress {
                    cb(index, total, "fetch", &flow_key);
                }
                let outcome = orchestrator.validate_flow(&flow_key).await;
                if let Some(cb) = &progress {
                    cb(index, total, "done", &flow_key);
                }
                let outcome = match outcome {
                    Ok(o) => o,
                    Err(err) => {
                        tracing::warn!(error = %err, flow_key, "flow validation failed, recording a zero-trust stub");
                        FlowOutcome { verification: VerificationResult::error_stub(flow_key, err), analysis: None }
                    }
                };
                (index, outcome)
            });
        }

        while let Some(joined) = set.join_next().await {
            if let Ok((index, outcome)) = joined {
                results[index] = Some(outcome);
            }
        }

        results.into_iter().map(|o| o.expect("every flow index is filled exactly once")).collect()
    }
}

/// Aggregates a project's flow outcomes into a single trust figure: the mean of each
/// flow's graph trust, weighted equally regardless of edge count.
pub fn project_trust(outcomes: &[FlowOutcome]) -> f64 {
    if outcomes.is_empty() {
        return 0.0;
    }
    let sum: f64 = outcomes.iter().map(|o| o.verification.graph_trust).sum();
    sum / outcomes.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tempfile::tempdir;
    use trustbot_core::{FlowNode, KgCallsEdge, KgError, SnippetNode};

    struct FixedStore {
        participants: Vec<SnippetNode>,
        calls: Vec<KgCallsEdge>,
    }

    #[async_trait]
    impl KgStore for FixedStore {
        async fn fetch_flow(&self, flow_key: &str) -> Result<FlowNode, KgError> {
            Ok(FlowNode { flow_key: flow_key.to_string(), properties: HashMap::new() })
        }
        async fn fetch_participants(&self, _flow_key: &str) -> Result<Vec<SnippetNode>, KgError> {
            Ok(self.participants.clone())
        }
        async fn fetch_calls(&self, _flow_key: &str) -> Result<Vec<KgCallsEdge>, KgError> {
            Ok(self.calls.clone())
        }
    }

    fn snippet(key: &str, function_name: &str, file: &str, is_root: bool) -> SnippetNode {
        let mut props = HashMap::new();
        props.insert("key".to_string(), serde_json::json!(key));
        props.insert("function_name".to_string(), serde_json::json!(function_name));
        props.insert("file_path".to_string(), serde_json::json!(file));
        SnippetNode { properties: props, is_root }
    }

    #[tokio::test]
    async fn full_pipeline_confirms_edge_present_on_both_sides() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "def main():\n    helper()\n\ndef helper():\n    pass\n").unwrap();

        let profiles = HashMap::from([("python".to_string(), trustbot_profiles::seed_profile("python").unwrap())]);
        let index = CodeIndex::open_in_memory().unwrap();
        index.build(dir.path(), &profiles).unwrap();
        index.store_edges(&[("main".to_string(), "helper".to_string(), 0.9)]).unwrap();

        let store = FixedStore {
            participants: vec![snippet("n1", "main", "a.py", true), snippet("n2", "helper", "a.py", false)],
            calls: vec![KgCallsEdge { caller_key: "n1".to_string(), callee_key: "n2".to_string(), execution_order: Some(0) }],
        };

        let orchestrator = Orchestrator::new(Arc::new(store), Arc::new(index), dir.path().to_path_buf(), AliasTable::default(), 4);
        let outcome = orchestrator.validate_flow("flow-1").await.unwrap();
        assert_eq!(outcome.verification.confirmed.len(), 1);
        assert!(outcome.analysis.is_none());
    }

    #[tokio::test]
    async fn multi_flow_run_preserves_order_and_isolates_failures() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "def main():\n    pass\n").unwrap();
        let profiles = HashMap::from([("python".to_string(), trustbot_profiles::seed_profile("python").unwrap())]);
        let index = CodeIndex::open_in_memory().unwrap();
        index.build(dir.path(), &profiles).unwrap();

        let store = FixedStore { participants: vec![snippet("n1", "main", "a.py", true)], calls: vec![] };
        let orchestrator = Orchestrator::new(Arc::new(store), Arc::new(index), dir.path().to_path_buf(), AliasTable::default(), 2);

        let flows = vec!["flow-a".to_string(), "flow-b".to_string(), "flow-c".to_string()];
        let outcomes = orchestrator.validate_flows(&flows, None).await;
        assert_eq!(outcomes.len(), 3);
    }

    #[test]
    fn project_trust_is_mean_of_flow_trusts() {
        let a = FlowOutcome { verification: VerificationResult::error_stub("a", "x"), analysis: None };
        let mut b_result = VerificationResult::error_stub("b", "x");
        b_result.graph_trust = 1.0;
        let b = FlowOutcome { verification: b_result, analysis: None };
        assert_eq!(project_trust(&[a, b]), 0.5);
    }
}
