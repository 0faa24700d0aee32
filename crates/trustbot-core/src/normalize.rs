//! Pure normalization of a `CallGraphOutput` over the alias table.

use crate::model::{AliasTable, CallGraphOutput};

/// trim -> alias resolve -> uppercase.
pub fn normalize_name(name: &str, aliases: &AliasTable) -> String {
    let trimmed = name.trim();
    let resolved = aliases.resolve(trimmed).map(str::to_string).unwrap_or_else(|| trimmed.to_string());
    resolved.to_uppercase()
}

/// Normalizes every caller/callee, the root name, and the unresolved-callee list in place.
/// Files and metadata pass through unchanged.
pub fn normalize_graph(mut graph: CallGraphOutput, aliases: &AliasTable) -> CallGraphOutput {
    for edge in &mut graph.edges {
        edge.caller = normalize_name(&edge.caller, aliases);
        edge.callee = normalize_name(&edge.callee, aliases);
    }
    graph.root_function = normalize_name(&graph.root_function, aliases);
    graph.unresolved_callees = graph
        .unresolved_callees
        .into_iter()
        .map(|n| normalize_name(&n, aliases))
        .collect();
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AliasEntry, CallEdge, ExtractionMethod, GraphSource};

    fn edge(caller: &str, callee: &str) -> CallEdge {
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

    #[test]
    fn normalize_is_idempotent() {
        let aliases = AliasTable::new(vec![AliasEntry {
            canonical: "SAVE".to_string(),
            aliases: vec!["persist".to_string()],
        }]);
        let once = normalize_name("  persist ", &aliases);
        let twice = normalize_name(&once, &aliases);
        assert_eq!(once, twice);
        assert_eq!(once, "SAVE");
    }

    #[test]
    fn normalize_graph_uppercases_all_names() {
        let aliases = AliasTable::default();
        let mut graph = CallGraphOutput::new("flow-1", GraphSource::Source, "main");
        graph.edges.push(edge("main", "helper"));
        graph.unresolved_callees.push("unknown_fn".to_string());
        let normalized = normalize_graph(graph, &aliases);
        assert_eq!(normalized.root_function, "MAIN");
        assert_eq!(normalized.edges[0].caller, "MAIN");
        assert_eq!(normalized.edges[0].callee, "HELPER");
        assert_eq!(normalized.unresolved_callees[0], "UNKNOWN_FN");
    }
}
