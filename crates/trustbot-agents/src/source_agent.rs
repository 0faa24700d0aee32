//! The source-derivation agent: reconstructs a call graph purely from the local code
//! index, with no access to the knowledge graph at all. Given a root function (and
//! whatever the KG side knew about its file/class), resolves it against the index and
//! recursively traverses stored call edges.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use trustbot_core::{CallEdge, CallGraphOutput, ExtractionMethod, GraphSource};
use trustbot_index::CodeIndex;
use trustbot_llm::{extract_json, ChatMessage, LlmClient};

const MAX_DEPTH: u32 = 50;

#[derive(Debug, Clone, Default)]
pub struct RootHint<'a> {
    pub root_class: Option<&'a str>,
    pub root_file: Option<&'a str>,
    pub hint_files: &'a [String],
}

struct FunctionInfo {
    file: String,
    class: String,
}

struct IndexedEdgeView {
    callee_name: String,
    callee_file: String,
    callee_class: String,
    confidence: f64,
}

/// Builds a `CallGraphOutput` purely from a [`CodeIndex`], with no KG dependency. The
/// rule-based implementation of the source-derivation role — an LLM-assisted variant that
/// falls back to this one on failure can be layered on top by a caller that also has a
/// chunker and an `LlmClient` available.
pub struct SourceDerivationAgent<'a> {
    index: &'a CodeIndex,
}

impl<'a> SourceDerivationAgent<'a> {
    pub fn new(index: &'a CodeIndex) -> Self {
        Self { index }
    }

    pub fn build(&self, flow_id: &str, root_function: &str, hint: RootHint<'_>) -> trustbot_core::CallGraphOutput {
        let all_edges = self.index.get_edges().unwrap_or_default();

        let mut edge_map: HashMap<String, Vec<IndexedEdgeView>> = HashMap::new();
        for e in &all_edges {
            let caller_key = e.caller.to_uppercase();
            edge_map.entry(caller_key).or_default().push(IndexedEdgeView {
                callee_name: e.callee.clone(),
                callee_file: String::new(),
                callee_class: String::new(),
                confidence: e.confidence,
            });
        }

        let mut func_to_info: HashMap<String, FunctionInfo> = HashMap::new();
        let mut candidates_by_bare: HashMap<String, Vec<String>> = HashMap::new();
        for name in edge_map.keys().cloned().collect::<Vec<_>>() {
            if let Ok(rows) = self.index.find(&name) {
                for row in rows {
                    let key = row.function_name.to_uppercase();
                    func_to_info.insert(key.clone(), FunctionInfo { file: row.file_path.clone(), class: row.class_name.clone() });
                    candidates_by_bare.entry(key).or_default().push(row.file_path);
                }
            }
        }
        // Also resolve every distinct callee name referenced by an edge, even if it never
        // appears as a caller itself (a leaf function).
        let callee_names: HashSet<String> = all_edges.iter().map(|e| e.callee.to_uppercase()).collect();
        for key in callee_names {
            if func_to_info.contains_key(&key) {
                continue;
            }
            if let Ok(rows) = self.index.find(&key) {
                if let Some(row) = rows.into_iter().next() {
                    func_to_info.insert(key, FunctionInfo { file: row.file_path, class: row.class_name });
                }
            }
        }

        let (resolved_root, resolution_strategy, root_in_index) = self.resolve_root(root_function, &hint, &func_to_info);
        let root_key = resolved_root.to_uppercase();

        let mut edges = Vec::new();
        let mut unresolved = Vec::new();
        let mut visited = HashSet::new();
        self.traverse(&resolved_root, &edge_map, &func_to_info, &mut edges, &mut unresolved, &mut visited, 1);

        let total_nodes: HashSet<String> = edges
            .iter()
            .flat_map(|e: &CallEdge| [e.caller.clone(), e.callee.clone()])
            .collect();
        let mut sample_functions: Vec<String> = func_to_info.keys().cloned().collect();
        sample_functions.sort();
        sample_functions.truncate(15);
        let mut sample_edge_callers: Vec<String> = edge_map.keys().cloned().collect();
        sample_edge_callers.sort();
        sample_edge_callers.truncate(15);

        let mut metadata = HashMap::new();
        metadata.insert("root_found_in_index".to_string(), serde_json::json!(root_in_index));
        metadata.insert("root_resolution_strategy".to_string(), serde_json::json!(resolution_strategy));
        metadata.insert("root_has_outgoing_edges".to_string(), serde_json::json!(edge_map.contains_key(&root_key)));
        metadata.insert("root_outgoing_count".to_string(), serde_json::json!(edge_map.get(&root_key).map(|v| v.len()).unwrap_or(0)));
        metadata.insert("total_nodes".to_string(), serde_json::json!(total_nodes.len()));
        metadata.insert("index_functions".to_string(), serde_json::json!(func_to_info.len()));
        metadata.insert("index_edges".to_string(), serde_json::json!(all_edges.len()));
        metadata.insert("sample_index_functions".to_string(), serde_json::json!(sample_functions));
        metadata.insert("sample_edge_callers".to_string(), serde_json::json!(sample_edge_callers));

        CallGraphOutput { flow_id: flow_id.to_string(), source: GraphSource::Source, root_function: resolved_root, edges, unresolved_callees: unresolved, metadata }
    }

    /// Resolution order: exact match on the given root name (which may itself be
    /// qualified), then its bare form, then a candidate whose class matches `root_class`,
    /// then a candidate whose file shares a directory prefix with `root_file` or any of
    /// `hint_files`. Falls through to the name as given if nothing in the index matches.
    fn resolve_root(&self, root_function: &str, hint: &RootHint<'_>, func_to_info: &HashMap<String, FunctionInfo>) -> (String, String, bool) {
        let exact_key = root_function.to_uppercase();
        if func_to_info.contains_key(&exact_key) {
            return (root_function.to_string(), "exact".to_string(), true);
        }

        let bare = trustbot_core::bare_name(root_function);
        let bare_key = bare.to_uppercase();
        if let Some(info) = func_to_info.get(&bare_key) {
            if hint.root_class.is_some_and(|c| c.eq_ignore_ascii_case(&info.class)) {
                return (bare.clone(), "bare+class".to_string(), true);
            }
        }

        if func_to_info.contains_key(&bare_key) {
            if let Ok(rows) = self.index.find(&bare) {
                if let Some(class) = hint.root_class {
                    if let Some(row) = rows.iter().find(|r| r.class_name.eq_ignore_ascii_case(class)) {
                        let _ = row;
                        return (bare.clone(), "bare+class".to_string(), true);
                    }
                }
                if let Some(dir_hint) = hint.root_file.or_else(|| hint.hint_files.first().map(String::as_str)) {
                    let prefix = directory_prefix(dir_hint);
                    if let Some(row) = rows.iter().find(|r| directory_prefix(&r.file_path) == prefix) {
                        let _ = row;
                        return (bare.clone(), "bare+file-hint".to_string(), true);
                    }
                }
            }
            return (bare, "bare".to_string(), true);
        }

        (root_function.to_string(), "unresolved".to_string(), false)
    }

    /// Depth-first: fully recurses into a callee before moving to the next sibling, so
    /// `depth` tracks recursion depth rather than a breadth-first level.
    fn traverse(
        &self,
        function_name: &str,
        edge_map: &HashMap<String, Vec<IndexedEdgeView>>,
        func_to_info: &HashMap<String, FunctionInfo>,
        edges: &mut Vec<CallEdge>,
        unresolved: &mut Vec<String>,
        visited: &mut HashSet<String>,
        depth: u32,
    ) {
        if depth > MAX_DEPTH {
            return;
        }
        let key = function_name.to_uppercase();
        if visited.contains(&key) {
            return;
        }
        visited.insert(key.clone());

        let empty = FunctionInfo { file: String::new(), class: String::new() };
        let caller_info = func_to_info.get(&key).unwrap_or(&empty);

        let Some(outgoing) = edge_map.get(&key) else { return };
        for e in outgoing {
            let callee_key = e.callee_name.to_uppercase();
            let callee_info = func_to_info.get(&callee_key);
            let callee_file = if !e.callee_file.is_empty() { e.callee_file.clone() } else { callee_info.map(|i| i.file.clone()).unwrap_or_default() };
            let callee_class = if !e.callee_class.is_empty() { e.callee_class.clone() } else { callee_info.map(|i| i.class.clone()).unwrap_or_default() };

            if callee_file.is_empty() {
                if !unresolved.contains(&e.callee_name) {
                    unresolved.push(e.callee_name.clone());
                }
                continue;
            }

            edges.push(CallEdge {
                caller: function_name.to_string(),
                callee: e.callee_name.clone(),
                caller_file: caller_info.file.clone(),
                callee_file,
                caller_class: caller_info.class.clone(),
                callee_class,
                depth,
                extraction_method: ExtractionMethod::Regex,
                confidence: e.confidence,
            });

            self.traverse(&e.callee_name, edge_map, func_to_info, edges, unresolved, visited, depth + 1);
        }
    }
}

fn directory_prefix(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((dir, _)) => dir.to_lowercase(),
        None => String::new(),
    }
}

#[derive(Debug, Deserialize, Default)]
struct LlmGraphResponse {
    #[serde(default)]
    root_function: Option<String>,
    #[serde(default)]
    edges: Vec<LlmEdge>,
    #[serde(default)]
    unresolved: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LlmEdge {
    caller: String,
    callee: String,
    #[serde(default)]
    caller_file: String,
    #[serde(default)]
    callee_file: String,
    #[serde(default)]
    caller_class: String,
    #[serde(default)]
    callee_class: String,
    #[serde(default = "default_depth")]
    depth: u32,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_depth() -> u32 {
    1
}

fn default_confidence() -> f64 {
    0.85
}

/// Runs the rule-based traversal first — a SQLite lookup chain, no LLM needed — and only
/// asks the LLM to take over when that traversal can't resolve the root or produces no
/// edges at all. The rule-based result is kept as the answer whenever the LLM doesn't
/// strictly improve on it (more edges than the rule-based pass found).
pub struct LlmAssistedSourceAgent<'a> {
    rule_based: SourceDerivationAgent<'a>,
    llm: &'a LlmClient,
}

impl<'a> LlmAssistedSourceAgent<'a> {
    pub fn new(index: &'a CodeIndex, llm: &'a LlmClient) -> Self {
        Self { rule_based: SourceDerivationAgent::new(index), llm }
    }

    pub async fn build(&self, flow_id: &str, root_function: &str, hint: RootHint<'_>) -> CallGraphOutput {
        let rule_based_hint = RootHint { root_class: hint.root_class, root_file: hint.root_file, hint_files: hint.hint_files };
        let base = self.rule_based.build(flow_id, root_function, rule_based_hint);

        let root_found = base.metadata.get("root_found_in_index").and_then(|v| v.as_bool()).unwrap_or(false);
        if root_found && !base.edges.is_empty() {
            let mut base = base;
            base.metadata.insert("agent_type".to_string(), serde_json::json!("rule_based"));
            return base;
        }

        match self.llm_resolve(flow_id, root_function, &hint, &base).await {
            Some(llm_graph) if llm_graph.edges.len() > base.edges.len() => llm_graph,
            _ => {
                let mut base = base;
                base.metadata.insert("agent_type".to_string(), serde_json::json!("rule_based"));
                base
            }
        }
    }

    async fn llm_resolve(
        &self,
        flow_id: &str,
        root_function: &str,
        hint: &RootHint<'_>,
        base: &CallGraphOutput,
    ) -> Option<CallGraphOutput> {
        let sample_functions = base.metadata.get("sample_index_functions").cloned().unwrap_or_default();
        let sample_edge_callers = base.metadata.get("sample_edge_callers").cloned().unwrap_or_default();

        let prompt = format!(
            "The rule-based traversal could not resolve root function `{root_function}` (class: {}, file: {}). \
             Sample indexed functions: {sample_functions}. Sample functions with outgoing calls: {sample_edge_callers}. \
             Respond with a JSON object: {{\"root_function\": string, \"edges\": [{{\"caller\", \"callee\", \
             \"caller_file\", \"callee_file\", \"caller_class\", \"callee_class\", \"depth\", \"confidence\"}}], \
             \"unresolved\": [string]}}. Only use functions and files you were told about; never invent one.",
            hint.root_class.unwrap_or(""),
            hint.root_file.unwrap_or(""),
        );

        let messages = vec![
            ChatMessage::system(
                "You resolve ambiguous call-graph roots against a known function index. \
                 Return only the JSON object asked for, nothing else.",
            ),
            ChatMessage::user(&prompt),
        ];

        let response = self.llm.chat_completion(&messages).await.ok()?;
        let json = extract_json(&response);
        let parsed: LlmGraphResponse = serde_json::from_str(json).ok()?;

        let edges: Vec<CallEdge> = parsed
            .edges
            .into_iter()
            .map(|e| CallEdge {
                caller: e.caller,
                callee: e.callee,
                caller_file: e.caller_file,
                callee_file: e.callee_file,
                caller_class: e.caller_class,
                callee_class: e.callee_class,
                depth: e.depth,
                extraction_method: ExtractionMethod::LlmFallback,
                confidence: e.confidence,
            })
            .collect();

        let mut metadata = base.metadata.clone();
        metadata.insert("agent_type".to_string(), serde_json::json!("llm_resolved"));
        metadata.insert("original_root".to_string(), serde_json::json!(root_function));

        Some(CallGraphOutput {
            flow_id: flow_id.to_string(),
            source: GraphSource::Source,
            root_function: parsed.root_function.unwrap_or_else(|| root_function.to_string()),
            edges,
            unresolved_callees: parsed.unresolved,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;
    use tempfile::tempdir;
    use trustbot_profiles::seed_profile;

    fn build_index(dir: &std::path::Path, files: &[(&str, &str)]) -> CodeIndex {
        for (name, content) in files {
            std::fs::write(dir.join(name), content).unwrap();
        }
        let profiles = Map::from([("python".to_string(), seed_profile("python").unwrap())]);
        let index = CodeIndex::open_in_memory().unwrap();
        index.build(dir, &profiles).unwrap();
        index
    }

    #[test]
    fn traverses_from_exact_root_and_resolves_callee_files() {
        let dir = tempdir().unwrap();
        let index = build_index(dir.path(), &[("a.py", "def main():\n    helper()\n\ndef helper():\n    pass\n")]);
        index.store_edges(&[("main".to_string(), "helper".to_string(), 0.9)]).unwrap();

        let agent = SourceDerivationAgent::new(&index);
        let graph = agent.build("f1", "main", RootHint::default());
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].callee, "helper");
        assert_eq!(graph.edges[0].callee_file, "a.py");
    }

    #[test]
    fn unresolvable_callee_is_recorded_not_dropped() {
        let dir = tempdir().unwrap();
        let index = build_index(dir.path(), &[("a.py", "def main():\n    pass\n")]);
        index.store_edges(&[("main".to_string(), "Ghost".to_string(), 0.9)]).unwrap();

        let agent = SourceDerivationAgent::new(&index);
        let graph = agent.build("f1", "main", RootHint::default());
        assert!(graph.edges.is_empty());
        assert_eq!(graph.unresolved_callees, vec!["Ghost".to_string()]);
    }

    #[test]
    fn depth_cap_halts_unbounded_recursion() {
        let dir = tempdir().unwrap();
        let index = build_index(dir.path(), &[("a.py", "def a():\n    pass\n")]);
        index.store_edges(&[("a".to_string(), "a".to_string(), 0.9)]).unwrap();

        let agent = SourceDerivationAgent::new(&index);
        let graph = agent.build("f1", "a", RootHint::default());
        assert!(graph.edges.is_empty(), "a self-edge is visited once then the visited-set halts recursion");
    }

    #[test]
    fn unresolved_root_is_reported_in_metadata() {
        let dir = tempdir().unwrap();
        let index = build_index(dir.path(), &[("a.py", "def main():\n    pass\n")]);

        let agent = SourceDerivationAgent::new(&index);
        let graph = agent.build("f1", "NoSuchFunction", RootHint::default());
        assert_eq!(graph.metadata["root_found_in_index"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn llm_assisted_agent_keeps_rule_based_result_when_llm_is_unavailable() {
        use async_trait::async_trait;
        use trustbot_llm::{LlmError, LlmProvider};

        struct AlwaysFails;
        #[async_trait]
        impl LlmProvider for AlwaysFails {
            async fn chat_completion(&self, _messages: &[ChatMessage]) -> Result<String, LlmError> {
                Err(LlmError::Provider { status: 500, body: "down".to_string() })
            }
            async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
                unimplemented!()
            }
            fn model(&self) -> &str {
                "test-model"
            }
        }

        let dir = tempdir().unwrap();
        let index = build_index(dir.path(), &[("a.py", "def main():\n    pass\n")]);
        let llm = LlmClient::new(Box::new(AlwaysFails), 1);

        let agent = LlmAssistedSourceAgent::new(&index, &llm);
        let graph = agent.build("f1", "NoSuchFunction", RootHint::default()).await;
        assert_eq!(graph.metadata["agent_type"], serde_json::json!("rule_based"));
        assert!(graph.edges.is_empty());
    }
}
