//! The KG-derivation agent: turns whatever a [`KgStore`] reports for a flow into a
//! `CallGraphOutput`, with the root chosen by the same name-priority order the data model
//! already uses for a participant snippet.

use std::collections::HashMap;
use std::sync::Arc;

use trustbot_core::{CallEdge, CallGraphOutput, ExtractionMethod, GraphSource, KgError, KgStore, SnippetNode};
use trustbot_llm::{extract_json, ChatMessage, LlmClient};

fn snippet_key(snippet: &SnippetNode) -> String {
    for key in ["key", "id", "function_name", "name"] {
        let v = snippet.string_prop(key);
        if !v.is_empty() {
            return v;
        }
    }
    String::new()
}

/// Fetches a flow's participants and recorded calls from the graph store and assembles
/// them into a `CallGraphOutput`. Every edge gets confidence 1.0: the graph is taken as
/// ground truth about what it asserts, even when that assertion later turns out to be
/// unconfirmed by the code.
pub struct KgDerivationAgent {
    store: Arc<dyn KgStore>,
}

impl KgDerivationAgent {
    pub fn new(store: Arc<dyn KgStore>) -> Self {
        Self { store }
    }

    pub async fn fetch(&self, flow_key: &str) -> Result<CallGraphOutput, KgError> {
        let _flow = self.store.fetch_flow(flow_key).await?;
        let participants = self.store.fetch_participants(flow_key).await?;
        let calls = self.store.fetch_calls(flow_key).await?;

        let mut by_key: HashMap<String, &SnippetNode> = HashMap::new();
        for p in &participants {
            let key = snippet_key(p);
            if !key.is_empty() {
                by_key.insert(key, p);
            }
        }

        let root_name = participants
            .iter()
            .find(|p| p.is_root)
            .and_then(|p| p.function_name())
            .or_else(|| participants.first().and_then(|p| p.function_name()))
            .unwrap_or_default();

        let mut edges = Vec::new();
        let mut unresolved_callees = Vec::new();

        for call in &calls {
            let caller = by_key.get(&call.caller_key);
            let callee = by_key.get(&call.callee_key);

            let (Some(caller), Some(callee)) = (caller, callee) else {
                unresolved_callees.push(call.callee_key.clone());
                continue;
            };

            let caller_name = caller.function_name().unwrap_or_else(|| call.caller_key.clone());
            let callee_name = callee.function_name().unwrap_or_else(|| call.callee_key.clone());

            edges.push(CallEdge {
                caller: caller_name,
                callee: callee_name,
                caller_file: caller.string_prop("file_path"),
                callee_file: callee.string_prop("file_path"),
                caller_class: caller.string_prop("class_name"),
                callee_class: callee.string_prop("class_name"),
                depth: 1,
                extraction_method: ExtractionMethod::Kg,
                confidence: 1.0,
            });
        }

        let mut metadata = HashMap::new();
        metadata.insert("total_nodes".to_string(), serde_json::json!(participants.len()));
        metadata.insert("total_calls".to_string(), serde_json::json!(calls.len()));
        metadata.insert("agent_type".to_string(), serde_json::json!("rule_based"));

        Ok(CallGraphOutput {
            flow_id: flow_key.to_string(),
            source: GraphSource::Kg,
            root_function: root_name,
            edges,
            unresolved_callees,
            metadata,
        })
    }
}

/// Asks an LLM to add qualitative observations on top of the deterministically-fetched
/// graph — it cannot add or remove edges, only annotate metadata — and falls back to the
/// plain deterministic result on any provider error or unparseable response. This trades
/// away the multi-turn tool-calling loop a richer agent could run in favor of the single
/// request/response shape `LlmClient` exposes.
pub struct LlmAssistedKgAgent {
    inner: KgDerivationAgent,
    llm: Arc<LlmClient>,
}

impl LlmAssistedKgAgent {
    pub fn new(store: Arc<dyn KgStore>, llm: Arc<LlmClient>) -> Self {
        Self { inner: KgDerivationAgent::new(store), llm }
    }

    pub async fn fetch(&self, flow_key: &str) -> Result<CallGraphOutput, KgError> {
        let mut graph = self.inner.fetch(flow_key).await?;

        let summary = format!(
            "Root function: {}\nEdge count: {}\nUnresolved callee count: {}\nCallers and callees: {}",
            graph.root_function,
            graph.edges.len(),
            graph.unresolved_callees.len(),
            graph
                .edges
                .iter()
                .take(50)
                .map(|e| format!("{} -> {}", e.caller, e.callee))
                .collect::<Vec<_>>()
                .join("; "),
        );

        let messages = vec![
            ChatMessage::system(
                "You summarize a call graph fetched from a knowledge graph. Respond with a JSON \
                 object of exactly one key, \"observations\", an array of short strings noting \
                 anything structurally notable (fan-out hubs, isolated root, suspiciously small \
                 graph). Never invent edges that were not given to you.",
            ),
            ChatMessage::user(&summary),
        ];

        match self.llm.chat_completion(&messages).await {
            Ok(response) => {
                let json = extract_json(&response);
                if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(json) {
                    if let Some(observations) = parsed.get("observations") {
                        graph.metadata.insert("llm_observations".to_string(), observations.clone());
                        graph.metadata.insert("agent_type".to_string(), serde_json::json!("llm_assisted"));
                    }
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, flow_key, "LLM-assisted KG agent falling back to the deterministic result");
            }
        }

        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use trustbot_core::FlowNode;

    struct FixedStore {
        participants: Vec<SnippetNode>,
        calls: Vec<trustbot_core::KgCallsEdge>,
    }

    #[async_trait]
    impl KgStore for FixedStore {
        async fn fetch_flow(&self, flow_key: &str) -> Result<FlowNode, KgError> {
            Ok(FlowNode { flow_key: flow_key.to_string(), properties: HashMap::new() })
        }

        async fn fetch_participants(&self, _flow_key: &str) -> Result<Vec<SnippetNode>, KgError> {
            Ok(self.participants.clone())
        }

        async fn fetch_calls(&self, _flow_key: &str) -> Result<Vec<trustbot_core::KgCallsEdge>, KgError> {
            Ok(self.calls.clone())
        }
    }

    fn snippet(key: &str, function_name: &str, is_root: bool) -> SnippetNode {
        let mut props = HashMap::new();
        props.insert("key".to_string(), serde_json::json!(key));
        props.insert("function_name".to_string(), serde_json::json!(function_name));
        props.insert("file_path".to_string(), serde_json::json!("f.py"));
        SnippetNode { properties: props, is_root }
    }

    #[tokio::test]
    async fn builds_graph_from_participants_and_calls() {
        let store = FixedStore {
            participants: vec![snippet("n1", "main", true), snippet("n2", "helper", false)],
            calls: vec![trustbot_core::KgCallsEdge { caller_key: "n1".to_string(), callee_key: "n2".to_string(), execution_order: Some(0) }],
        };

        let agent = KgDerivationAgent::new(Arc::new(store));
        let graph = agent.fetch("flow-1").await.unwrap();
        assert_eq!(graph.root_function, "main");
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].callee, "helper");
        assert!(graph.edges[0].confidence == 1.0);
    }

    #[tokio::test]
    async fn call_referencing_unknown_snippet_is_reported_unresolved() {
        let store = FixedStore {
            participants: vec![snippet("n1", "main", true)],
            calls: vec![trustbot_core::KgCallsEdge { caller_key: "n1".to_string(), callee_key: "ghost".to_string(), execution_order: None }],
        };

        let agent = KgDerivationAgent::new(Arc::new(store));
        let graph = agent.fetch("flow-1").await.unwrap();
        assert!(graph.edges.is_empty());
        assert_eq!(graph.unresolved_callees, vec!["ghost".to_string()]);
    }
}
