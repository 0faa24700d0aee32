//! The knowledge-graph store contract. Read-only; exactly three query shapes.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::KgError;

/// Clauses that would mutate the graph; any query containing one (case-insensitively) is refused
/// before dispatch.
const WRITE_CLAUSES: &[&str] = &["CREATE", "DELETE", "SET", "MERGE", "REMOVE", "DETACH", "DROP"];

/// Rejects a query that contains a write clause as a case-insensitive substring.
pub fn guard_read_only(query: &str) -> Result<(), KgError> {
    let upper = query.to_uppercase();
    for clause in WRITE_CLAUSES {
        if upper.contains(clause) {
            return Err(KgError::QueryRefused(format!(
                "query contains write clause `{clause}`"
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowNode {
    pub flow_key: String,
    pub properties: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnippetNode {
    pub properties: HashMap<String, Value>,
    /// Whether the `PARTICIPATES_IN_FLOW` relationship marks this as the flow's entry point.
    pub is_root: bool,
}

impl SnippetNode {
    /// `function_name`, then `name`, then `id`, in that priority.
    pub fn function_name(&self) -> Option<String> {
        for key in ["function_name", "name", "id"] {
            if let Some(Value::String(s)) = self.properties.get(key) {
                return Some(s.clone());
            }
        }
        None
    }

    pub fn string_prop(&self, key: &str) -> String {
        match self.properties.get(key) {
            Some(Value::String(s)) => s.clone(),
            _ => String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KgCallsEdge {
    pub caller_key: String,
    pub callee_key: String,
    /// Optional ordinal position among a caller's outgoing calls, when the store tracks it.
    pub execution_order: Option<i64>,
}

/// The three read-only query shapes the core needs from the external graph store.
#[async_trait]
pub trait KgStore: Send + Sync {
    async fn fetch_flow(&self, flow_key: &str) -> Result<FlowNode, KgError>;

    async fn fetch_participants(&self, flow_key: &str) -> Result<Vec<SnippetNode>, KgError>;

    async fn fetch_calls(&self, flow_key: &str) -> Result<Vec<KgCallsEdge>, KgError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_rejects_write_clauses_case_insensitively() {
        assert!(guard_read_only("MATCH (n) RETURN n").is_ok());
        assert!(guard_read_only("match (n) create (m) return n").is_err());
        assert!(guard_read_only("MATCH (n) SET n.x = 1 RETURN n").is_err());
        assert!(guard_read_only("detach delete n").is_err());
    }

    #[test]
    fn snippet_function_name_priority() {
        let mut props = HashMap::new();
        props.insert("name".to_string(), Value::String("Fallback".to_string()));
        props.insert("function_name".to_string(), Value::String("Preferred".to_string()));
        let snippet = SnippetNode { properties: props, is_root: true };
        assert_eq!(snippet.function_name(), Some("Preferred".to_string()));
    }
}
