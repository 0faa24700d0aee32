//! Tiered edge matching, classification, trust scoring, and execution-order checking.

use std::collections::{HashMap, HashSet};

use serde_json::json;

use crate::model::{
    bare_name, CallEdge, CallGraphOutput, EdgeClassification, ExecutionOrderEntry, MatchTier,
    VerificationResult, VerifiedEdge,
};

const BARE_NAME_FACTOR: f64 = 0.98;
const TIER1_FACTOR: f64 = 1.00;
const TIER2_FACTOR: f64 = 0.95;
const TIER3_FACTOR: f64 = 0.80;
const PHANTOM_TRUST: f64 = 0.20;

fn full_key(e: &CallEdge) -> (String, String, String, String, String, String) {
    (
        e.caller.clone(),
        e.caller_class.clone(),
        e.caller_file.clone(),
        e.callee.clone(),
        e.callee_class.clone(),
        e.callee_file.clone(),
    )
}

fn name_file_key(e: &CallEdge) -> (String, String, String, String) {
    (e.caller.clone(), e.caller_file.clone(), e.callee.clone(), e.callee_file.clone())
}

fn bare_name_file_key(e: &CallEdge) -> (String, String, String, String) {
    (bare_name(&e.caller), e.caller_file.clone(), bare_name(&e.callee), e.callee_file.clone())
}

fn name_only_key(e: &CallEdge) -> (String, String) {
    (e.caller.clone(), e.callee.clone())
}

fn bare_name_only_key(e: &CallEdge) -> (String, String) {
    (bare_name(&e.caller), bare_name(&e.callee))
}

struct SourceIndex<'a> {
    full: HashSet<(String, String, String, String, String, String)>,
    name_file: HashSet<(String, String, String, String)>,
    bare_name_file: HashSet<(String, String, String, String)>,
    name_only: HashSet<(String, String)>,
    bare_name_only: HashSet<(String, String)>,
    edges: &'a [CallEdge],
}

impl<'a> SourceIndex<'a> {
    fn build(edges: &'a [CallEdge]) -> Self {
        Self {
            full: edges.iter().map(full_key).collect(),
            name_file: edges.iter().map(name_file_key).collect(),
            bare_name_file: edges.iter().map(bare_name_file_key).collect(),
            name_only: edges.iter().map(name_only_key).collect(),
            bare_name_only: edges.iter().map(bare_name_only_key).collect(),
            edges,
        }
    }

    /// Returns the matching tier, whether it was a bare-name variant, if any tier matched.
    fn classify(&self, kg_edge: &CallEdge) -> Option<(MatchTier, bool)> {
        if self.full.contains(&full_key(kg_edge)) {
            return Some((MatchTier::Full, false));
        }
        if self.name_file.contains(&name_file_key(kg_edge)) {
            return Some((MatchTier::NameAndFile, false));
        }
        if self.bare_name_file.contains(&bare_name_file_key(kg_edge)) {
            return Some((MatchTier::NameAndFile, true));
        }
        if self.name_only.contains(&name_only_key(kg_edge)) {
            return Some((MatchTier::NameOnly, false));
        }
        if self.bare_name_only.contains(&bare_name_only_key(kg_edge)) {
            return Some((MatchTier::NameOnly, true));
        }
        None
    }
}

fn tier_multiplier(tier: MatchTier, bare: bool) -> f64 {
    let base = match tier {
        MatchTier::Full => TIER1_FACTOR,
        MatchTier::NameAndFile => TIER2_FACTOR,
        MatchTier::NameOnly => TIER3_FACTOR,
    };
    if bare {
        base * BARE_NAME_FACTOR
    } else {
        base
    }
}

fn tier_label(tier: MatchTier, bare: bool) -> &'static str {
    match (tier, bare) {
        (MatchTier::Full, _) => "Full",
        (MatchTier::NameAndFile, false) => "Name+File",
        (MatchTier::NameAndFile, true) => "Name+File (bare)",
        (MatchTier::NameOnly, false) => "Name only",
        (MatchTier::NameOnly, true) => "Name only (bare)",
    }
}

/// Compares `kg_graph` against `source_graph` and produces a full `VerificationResult`.
pub fn verify(kg_graph: &CallGraphOutput, source_graph: &CallGraphOutput) -> VerificationResult {
    let source_index = SourceIndex::build(&source_graph.edges);

    let mut confirmed = Vec::new();
    let mut phantom = Vec::new();
    let mut tier_counts: HashMap<&str, u32> = HashMap::new();
    let mut confirmed_bare_pairs: HashSet<(String, String)> = HashSet::new();

    for kg_edge in &kg_graph.edges {
        match source_index.classify(kg_edge) {
            Some((tier, bare)) => {
                let multiplier = tier_multiplier(tier, bare);
                let trust = (kg_edge.extraction_method.baseline_trust() * multiplier).min(1.0);
                *tier_counts.entry(tier_label(tier, bare)).or_insert(0) += 1;
                confirmed_bare_pairs.insert(kg_edge.bare_pair());
                confirmed.push(VerifiedEdge {
                    caller: kg_edge.caller.clone(),
                    callee: kg_edge.callee.clone(),
                    caller_file: kg_edge.caller_file.clone(),
                    callee_file: kg_edge.callee_file.clone(),
                    classification: EdgeClassification::Confirmed,
                    trust,
                    details: format!("matched at tier {}", tier_label(tier, bare)),
                });
            }
            None => {
                phantom.push(VerifiedEdge {
                    caller: kg_edge.caller.clone(),
                    callee: kg_edge.callee.clone(),
                    caller_file: kg_edge.caller_file.clone(),
                    callee_file: kg_edge.callee_file.clone(),
                    classification: EdgeClassification::Phantom,
                    trust: PHANTOM_TRUST,
                    details: "not found in indexed codebase".to_string(),
                });
            }
        }
    }

    let mut missing = Vec::new();
    for source_edge in &source_graph.edges {
        let bare = source_edge.bare_pair();
        if !confirmed_bare_pairs.contains(&bare) {
            missing.push(VerifiedEdge {
                caller: source_edge.caller.clone(),
                callee: source_edge.callee.clone(),
                caller_file: source_edge.caller_file.clone(),
                callee_file: source_edge.callee_file.clone(),
                classification: EdgeClassification::Missing,
                trust: 0.0,
                details: "present in source graph, absent from knowledge graph".to_string(),
            });
        }
    }

    let kg_edges_by_name: HashSet<(String, String)> =
        kg_graph.edges.iter().map(name_only_key).collect();
    let flow_trust = confirmed.len() as f64 / (kg_edges_by_name.len().max(1) as f64);

    let weighted_sum: f64 = confirmed.iter().map(|e| e.trust * 1.0).sum::<f64>()
        + phantom.iter().map(|e| e.trust * 0.5).sum::<f64>();
    let weight_total: f64 = confirmed.len() as f64 * 1.0 + phantom.len() as f64 * 0.5;
    let graph_trust = if weight_total > 0.0 { weighted_sum / weight_total } else { 0.0 };

    let order_entries = execution_order_check(kg_graph, source_graph);

    let mut metadata = HashMap::new();
    metadata.insert("tier_counts".to_string(), json!(tier_counts));
    metadata.insert("execution_order".to_string(), json!(order_entries));

    VerificationResult {
        flow_id: kg_graph.flow_id.clone(),
        graph_trust,
        flow_trust,
        confirmed,
        phantom,
        missing,
        conflicted: Vec::new(),
        unresolved: kg_graph
            .unresolved_callees
            .iter()
            .chain(source_graph.unresolved_callees.iter())
            .cloned()
            .collect(),
        metadata,
    }
}

/// Keeps only each value's first occurrence. Call extraction emits one edge per call
/// site, so a caller invoking the same callee twice would otherwise inflate the ordered
/// sequence compared below and produce a spurious mismatch even when relative order
/// among distinct callees agrees.
fn dedup_first_occurrence(items: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    items.iter().filter(|c| seen.insert((*c).clone())).cloned().collect()
}

/// For each caller present on both sides with ≥2 common callees, compares relative order.
/// Fewer than 2 common callees is an automatic match, not a skip.
fn execution_order_check(kg_graph: &CallGraphOutput, source_graph: &CallGraphOutput) -> Vec<ExecutionOrderEntry> {
    let mut kg_order: HashMap<String, Vec<String>> = HashMap::new();
    for edge in &kg_graph.edges {
        kg_order.entry(edge.caller.clone()).or_default().push(edge.callee.clone());
    }
    let mut source_order: HashMap<String, Vec<String>> = HashMap::new();
    for edge in &source_graph.edges {
        source_order.entry(edge.caller.clone()).or_default().push(edge.callee.clone());
    }

    let mut callers: Vec<&String> = kg_order.keys().filter(|c| source_order.contains_key(*c)).collect();
    callers.sort();

    let mut entries = Vec::new();
    for caller in callers {
        let kg_callees = dedup_first_occurrence(&kg_order[caller]);
        let src_callees = dedup_first_occurrence(&source_order[caller]);
        let kg_set: HashSet<&String> = kg_callees.iter().collect();
        let src_set: HashSet<&String> = src_callees.iter().collect();
        let common: HashSet<&String> = kg_set.intersection(&src_set).cloned().collect();

        let kg_common_order: Vec<String> = kg_callees.iter().filter(|c| common.contains(c)).cloned().collect();
        let src_common_order: Vec<String> = src_callees.iter().filter(|c| common.contains(c)).cloned().collect();

        let matched = if common.len() < 2 { true } else { kg_common_order == src_common_order };

        entries.push(ExecutionOrderEntry {
            caller: caller.clone(),
            matched,
            kg_order: kg_common_order,
            index_order: src_common_order,
        });
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExtractionMethod, GraphSource};

    fn kg_edge(caller: &str, callee: &str, cfile: &str, efile: &str, cclass: &str, eclass: &str) -> CallEdge {
        CallEdge {
            caller: caller.to_string(),
            callee: callee.to_string(),
            caller_file: cfile.to_string(),
            callee_file: efile.to_string(),
            caller_class: cclass.to_string(),
            callee_class: eclass.to_string(),
            depth: 1,
            extraction_method: ExtractionMethod::Kg,
            confidence: 1.0,
        }
    }

    fn source_edge(caller: &str, callee: &str, cfile: &str, efile: &str, cclass: &str, eclass: &str) -> CallEdge {
        CallEdge {
            extraction_method: ExtractionMethod::Regex,
            confidence: 0.9,
            ..kg_edge(caller, callee, cfile, efile, cclass, eclass)
        }
    }

    #[test]
    fn exact_match_confirms_edge() {
        let mut kg = CallGraphOutput::new("f1", GraphSource::Kg, "A");
        kg.edges.push(kg_edge("A", "B", "fileA", "fileB", "", ""));
        let mut src = CallGraphOutput::new("f1", GraphSource::Source, "A");
        src.edges.push(source_edge("A", "B", "fileA", "fileB", "", ""));

        let result = verify(&kg, &src);
        assert_eq!(result.confirmed.len(), 1);
        assert_eq!(result.phantom.len(), 0);
        assert_eq!(result.missing.len(), 0);
        assert_eq!(result.flow_trust, 1.0);
    }

    #[test]
    fn qualified_kg_edge_matches_bare_source_edge() {
        let mut kg = CallGraphOutput::new("f2", GraphSource::Kg, "TForm1.OnClick");
        kg.edges.push(kg_edge("TForm1.OnClick", "TForm1.Save", "u.pas", "u.pas", "TForm1", "TForm1"));
        let mut src = CallGraphOutput::new("f2", GraphSource::Source, "OnClick");
        src.edges.push(source_edge("OnClick", "Save", "u.pas", "u.pas", "", ""));

        let result = verify(&kg, &src);
        assert_eq!(result.confirmed.len(), 1);
        assert_eq!(result.flow_trust, 1.0);
        assert!(result.confirmed[0].details.contains("bare"));
    }

    #[test]
    fn edge_absent_from_source_is_phantom() {
        let mut kg = CallGraphOutput::new("f3", GraphSource::Kg, "A");
        kg.edges.push(kg_edge("A", "B", "f", "f", "", ""));
        kg.edges.push(kg_edge("A", "X", "f", "f", "", ""));
        let mut src = CallGraphOutput::new("f3", GraphSource::Source, "A");
        src.edges.push(source_edge("A", "B", "f", "f", "", ""));

        let result = verify(&kg, &src);
        assert_eq!(result.confirmed.len(), 1);
        assert_eq!(result.phantom.len(), 1);
        assert_eq!(result.phantom[0].details, "not found in indexed codebase");
        assert_eq!(result.flow_trust, 0.5);
    }

    #[test]
    fn edge_absent_from_kg_is_missing() {
        let mut kg = CallGraphOutput::new("f4", GraphSource::Kg, "A");
        kg.edges.push(kg_edge("A", "B", "f", "f", "", ""));
        let mut src = CallGraphOutput::new("f4", GraphSource::Source, "A");
        src.edges.push(source_edge("A", "B", "f", "f", "", ""));
        src.edges.push(source_edge("B", "Z", "f", "f", "", ""));

        let result = verify(&kg, &src);
        assert_eq!(result.confirmed.len(), 1);
        assert_eq!(result.missing.len(), 1);
        assert_eq!(result.missing[0].callee, "Z");
        assert_eq!(result.flow_trust, 1.0);
    }

    #[test]
    fn execution_order_mismatch_is_flagged() {
        let mut kg = CallGraphOutput::new("f5", GraphSource::Kg, "A");
        for callee in ["B", "C", "D"] {
            kg.edges.push(kg_edge("A", callee, "f", "f", "", ""));
        }
        let mut src = CallGraphOutput::new("f5", GraphSource::Source, "A");
        for callee in ["C", "B", "D"] {
            src.edges.push(source_edge("A", callee, "f", "f", "", ""));
        }

        let result = verify(&kg, &src);
        assert_eq!(result.confirmed.len(), 3);
        let order: Vec<ExecutionOrderEntry> =
            serde_json::from_value(result.metadata["execution_order"].clone()).unwrap();
        let a_entry = order.iter().find(|e| e.caller == "A").unwrap();
        assert!(!a_entry.matched);
        assert_eq!(a_entry.kg_order, vec!["B", "C", "D"]);
        assert_eq!(a_entry.index_order, vec!["C", "B", "D"]);
    }

    #[test]
    fn empty_graphs_yield_zero_trust_without_crashing() {
        let kg = CallGraphOutput::new("empty", GraphSource::Kg, "A");
        let src = CallGraphOutput::new("empty", GraphSource::Source, "A");
        let result = verify(&kg, &src);
        assert_eq!(result.flow_trust, 0.0);
        assert_eq!(result.graph_trust, 0.0);
    }

    #[test]
    fn repeated_call_site_does_not_spuriously_break_order_match() {
        let mut kg = CallGraphOutput::new("f6", GraphSource::Kg, "A");
        for callee in ["B", "C"] {
            kg.edges.push(kg_edge("A", callee, "f", "f", "", ""));
        }
        let mut src = CallGraphOutput::new("f6", GraphSource::Source, "A");
        for callee in ["B", "B", "C"] {
            src.edges.push(source_edge("A", callee, "f", "f", "", ""));
        }

        let result = verify(&kg, &src);
        let order: Vec<ExecutionOrderEntry> =
            serde_json::from_value(result.metadata["execution_order"].clone()).unwrap();
        let a_entry = order.iter().find(|e| e.caller == "A").unwrap();
        assert!(a_entry.matched);
        assert_eq!(a_entry.index_order, vec!["B", "C"]);
    }

    #[test]
    fn fewer_than_two_common_callees_is_automatic_match() {
        let mut kg = CallGraphOutput::new("f", GraphSource::Kg, "A");
        kg.edges.push(kg_edge("A", "B", "f", "f", "", ""));
        let mut src = CallGraphOutput::new("f", GraphSource::Source, "A");
        src.edges.push(source_edge("A", "B", "f", "f", "", ""));

        let result = verify(&kg, &src);
        let order: Vec<ExecutionOrderEntry> =
            serde_json::from_value(result.metadata["execution_order"].clone()).unwrap();
        assert!(order.iter().find(|e| e.caller == "A").unwrap().matched);
    }
}
