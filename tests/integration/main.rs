//! End-to-end integration tests exercising the full validation pipeline against an
//! in-memory knowledge-graph stub and a tempfile-backed code index, without touching a
//! real Neo4j instance or LLM endpoint.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::tempdir;

use trustbot_agents::{project_trust, FlowOutcome, Orchestrator};
use trustbot_core::{AliasTable, FlowNode, KgCallsEdge, KgError, KgStore, SnippetNode};
use trustbot_index::CodeIndex;

struct StubKgStore {
    flows: HashMap<String, (Vec<SnippetNode>, Vec<KgCallsEdge>)>,
}

#[async_trait]
impl KgStore for StubKgStore {
    async fn fetch_flow(&self, flow_key: &str) -> Result<FlowNode, KgError> {
        if self.flows.contains_key(flow_key) {
            Ok(FlowNode { flow_key: flow_key.to_string(), properties: HashMap::new() })
        } else {
            Err(KgError::FlowNotFound(flow_key.to_string()))
        }
    }

    async fn fetch_participants(&self, flow_key: &str) -> Result<Vec<SnippetNode>, KgError> {
        self.flows
            .get(flow_key)
            .map(|(p, _)| p.clone())
            .ok_or_else(|| KgError::FlowNotFound(flow_key.to_string()))
    }

    async fn fetch_calls(&self, flow_key: &str) -> Result<Vec<KgCallsEdge>, KgError> {
        self.flows
            .get(flow_key)
            .map(|(_, c)| c.clone())
            .ok_or_else(|| KgError::FlowNotFound(flow_key.to_string()))
    }
}

fn snippet(key: &str, function_name: &str, file: &str, is_root: bool) -> SnippetNode {
    let mut properties = HashMap::new();
    properties.insert("key".to_string(), serde_json::json!(key));
    properties.insert("function_name".to_string(), serde_json::json!(function_name));
    properties.insert("file_path".to_string(), serde_json::json!(file));
    SnippetNode { properties, is_root }
}

/// A flow whose graph matches source exactly on both sides should come back fully
/// confirmed with no analysis attached.
#[tokio::test]
async fn clean_flow_resolves_to_full_trust() {
    let dir = tempdir().unwrap();
    std::fs::write(
        dir.path().join("orders.py"),
        "def place_order():\n    charge_card()\n    send_receipt()\n\ndef charge_card():\n    pass\n\ndef send_receipt():\n    pass\n",
    )
    .unwrap();

    let profiles = HashMap::from([("python".to_string(), trustbot_profiles::seed_profile("python").unwrap())]);
    let index = CodeIndex::open_in_memory().unwrap();
    index.build(dir.path(), &profiles).unwrap();
    index
        .store_edges(&[
            ("place_order".to_string(), "charge_card".to_string(), 0.9),
            ("place_order".to_string(), "send_receipt".to_string(), 0.9),
        ])
        .unwrap();

    let store = StubKgStore {
        flows: HashMap::from([(
            "checkout".to_string(),
            (
                vec![
                    snippet("n1", "place_order", "orders.py", true),
                    snippet("n2", "charge_card", "orders.py", false),
                    snippet("n3", "send_receipt", "orders.py", false),
                ],
                vec![
                    KgCallsEdge { caller_key: "n1".to_string(), callee_key: "n2".to_string(), execution_order: Some(0) },
                    KgCallsEdge { caller_key: "n1".to_string(), callee_key: "n3".to_string(), execution_order: Some(1) },
                ],
            ),
        )]),
    };

    let orchestrator = Orchestrator::new(Arc::new(store), Arc::new(index), dir.path().to_path_buf(), AliasTable::default(), 4);
    let outcome = orchestrator.validate_flow("checkout").await.unwrap();

    assert_eq!(outcome.verification.confirmed.len(), 2);
    assert!(outcome.verification.phantom.is_empty());
    assert!(outcome.verification.missing.is_empty());
    assert!(outcome.analysis.is_none());
    assert!(outcome.verification.graph_trust > 0.9);
}

/// An edge the graph records but the source no longer contains should classify as
/// phantom and trigger a root-cause analysis.
#[tokio::test]
async fn removed_call_site_classifies_as_phantom() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("orders.py"), "def place_order():\n    pass\n\ndef charge_card():\n    pass\n").unwrap();

    let profiles = HashMap::from([("python".to_string(), trustbot_profiles::seed_profile("python").unwrap())]);
    let index = CodeIndex::open_in_memory().unwrap();
    index.build(dir.path(), &profiles).unwrap();

    let store = StubKgStore {
        flows: HashMap::from([(
            "checkout".to_string(),
            (
                vec![snippet("n1", "place_order", "orders.py", true), snippet("n2", "charge_card", "orders.py", false)],
                vec![KgCallsEdge { caller_key: "n1".to_string(), callee_key: "n2".to_string(), execution_order: Some(0) }],
            ),
        )]),
    };

    let orchestrator = Orchestrator::new(Arc::new(store), Arc::new(index), dir.path().to_path_buf(), AliasTable::default(), 4);
    let outcome = orchestrator.validate_flow("checkout").await.unwrap();

    assert_eq!(outcome.verification.phantom.len(), 1);
    assert!(outcome.analysis.is_some());
}

/// A flow key the store doesn't know about surfaces as an error, not a panic, and
/// `validate_flows` isolates that failure from its siblings.
#[tokio::test]
async fn unknown_flow_is_isolated_not_fatal() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("a.py"), "def main():\n    pass\n").unwrap();
    let profiles = HashMap::from([("python".to_string(), trustbot_profiles::seed_profile("python").unwrap())]);
    let index = CodeIndex::open_in_memory().unwrap();
    index.build(dir.path(), &profiles).unwrap();

    let store = StubKgStore {
        flows: HashMap::from([(
            "known".to_string(),
            (vec![snippet("n1", "main", "a.py", true)], Vec::new()),
        )]),
    };

    let orchestrator = Orchestrator::new(Arc::new(store), Arc::new(index), dir.path().to_path_buf(), AliasTable::default(), 4);

    let flows = vec!["known".to_string(), "missing".to_string()];
    let outcomes: Vec<FlowOutcome> = orchestrator.validate_flows(&flows, None).await;

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes[1].verification.graph_trust <= outcomes[0].verification.graph_trust);

    let trust = project_trust(&outcomes);
    assert!((0.0..=1.0).contains(&trust));
}
