//! Call-edge extraction from a [`Chunk`]: an LLM call constrained to a known-function
//! list, with a three-strategy regex fallback when the LLM is unavailable or returns
//! something unusable. Results are cached by content hash so re-indexing an unchanged
//! chunk never re-pays the LLM call.

use std::collections::HashSet;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use serde_json::Value;

use trustbot_llm::{cache_key, extract_json, ChatMessage, LlmCache, LlmClient};
use trustbot_profiles::LanguageProfile;

use crate::chunker::Chunk;
use crate::error::ExtractError;

const PROMPT_VERSION: &str = "v1-strip-noncode-preamble";
const MAX_KNOWN_FUNCTIONS_IN_PROMPT: usize = 200;
const MAX_CHUNK_CHARS: usize = 6000;

const SYSTEM_PROMPT_BASE: &str = "\
You are a precise static-code-analysis engine. Given a code chunk and a list \
of known project functions, identify every function / procedure / method CALL \
made inside the chunk.

RULES — follow them strictly:
1. Only report actual calls (procedure invocations, function calls, method calls).
2. Do NOT report:
   - variable or field declarations
   - type / class references
   - module or unit imports
   - class inheritance or interface declarations
   - the function's own name (self-reference from its declaration line)
3. Only report callees whose name appears in the KNOWN FUNCTIONS list.
4. If the chunk contains zero calls, return an empty array.

Return ONLY a JSON array — no markdown fences, no commentary:
[{\"callee\": \"ExactFunctionName\", \"confidence\": 0.95}]
";

fn system_prompt(profile: Option<&LanguageProfile>) -> String {
    match profile.filter(|p| !p.llm_call_prompt.is_empty()) {
        Some(p) => format!("{SYSTEM_PROMPT_BASE}{}", p.llm_call_prompt),
        None => SYSTEM_PROMPT_BASE.to_string(),
    }
}

fn user_prompt(chunk: &Chunk, known: &[String]) -> String {
    let display: Vec<&str> = known.iter().take(MAX_KNOWN_FUNCTIONS_IN_PROMPT).map(String::as_str).collect();
    let mut known_str = display.join(", ");
    if known.len() > MAX_KNOWN_FUNCTIONS_IN_PROMPT {
        known_str.push_str(&format!(" ... and {} more", known.len() - MAX_KNOWN_FUNCTIONS_IN_PROMPT));
    }

    let mut content = chunk.content.clone();
    if content.len() > MAX_CHUNK_CHARS {
        content.truncate(MAX_CHUNK_CHARS);
        content.push_str("\n... (truncated)");
    }

    format!(
        "LANGUAGE: {}\nFILE: {}\nFUNCTION: {}\n\nKNOWN FUNCTIONS in this project:\n{known_str}\n\nCODE CHUNK:\n```\n{content}\n```",
        chunk.language, chunk.file_path, if chunk.function_name.is_empty() { "unknown" } else { &chunk.function_name },
    )
}

#[derive(Debug, Deserialize)]
struct RawCall {
    callee: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_confidence() -> f64 {
    0.85
}

fn parse_calls(raw: &str) -> Result<Vec<RawCall>, ExtractError> {
    let text = extract_json(raw);
    let value: Value = serde_json::from_str(text).map_err(|e| ExtractError::Malformed(e.to_string()))?;
    match value {
        Value::Array(_) => serde_json::from_value(value).map_err(|e| ExtractError::Malformed(e.to_string())),
        Value::Object(ref map) if map.contains_key("calls") => {
            serde_json::from_value(map["calls"].clone()).map_err(|e| ExtractError::Malformed(e.to_string()))
        }
        _ => Ok(Vec::new()),
    }
}

/// A caller/callee edge at the granularity call extraction actually produces: one entry
/// per call *site*, not per unique callee — a function called three times yields three
/// edges, each independently contributing to later trust scoring.
#[derive(Debug, Clone)]
pub struct CallEdge {
    pub caller_chunk_id: String,
    pub callee: String,
    pub confidence: f64,
}

fn word_boundary_re(name: &str) -> Option<Regex> {
    RegexBuilder::new(&format!(r"\b{}\b", regex::escape(name))).case_insensitive(true).build().ok()
}

/// Strips string literals, comments, and the declaration line so identifier scanning
/// doesn't match names that only appear inside a string, a comment, or the function's
/// own signature. Entirely driven by the profile — no hardcoded per-language rules.
fn strip_non_code_content(content: &str, profile: &LanguageProfile) -> String {
    let mut lines: Vec<&str> = content.split_inclusive('\n').collect();
    if !lines.is_empty() {
        lines[0] = "\n";
    }
    let mut text = lines.concat();

    if !profile.single_line_comment.is_empty() {
        if let Ok(re) = RegexBuilder::new(&format!("{}.*$", regex::escape(&profile.single_line_comment))).multi_line(true).build() {
            text = re.replace_all(&text, "").to_string();
        }
    }

    if !profile.multi_line_comment_open.is_empty()
        && !profile.multi_line_comment_close.is_empty()
        && profile.multi_line_comment_open != profile.single_line_comment
    {
        let pattern = format!(
            "{}[\\s\\S]*?{}",
            regex::escape(&profile.multi_line_comment_open),
            regex::escape(&profile.multi_line_comment_close)
        );
        if let Ok(re) = Regex::new(&pattern) {
            text = re.replace_all(&text, " ").to_string();
        }
    }

    for delim in &profile.string_delimiters {
        let escaped = regex::escape(delim);
        let pattern = if delim.chars().count() == 1 {
            format!("{escaped}[^{escaped}]*{escaped}")
        } else {
            format!("{escaped}[\\s\\S]*?{escaped}")
        };
        if let Ok(re) = Regex::new(&pattern) {
            text = re.replace_all(&text, delim.repeat(2)).to_string();
        }
    }

    text
}

fn call_keyword_patterns(profile: &LanguageProfile) -> Vec<Regex> {
    profile
        .call_keyword_patterns
        .iter()
        .filter_map(|p| RegexBuilder::new(p).case_insensitive(true).build().ok())
        .collect()
}

/// Strategy A (parenthesised calls), A2 (profile call-keyword patterns), and B
/// (bare-identifier matching, only for profiles that opt in) run against a chunk whose
/// LLM call failed or was never attempted.
fn regex_fallback(chunk: &Chunk, known_upper: &HashSet<String>, profile: &LanguageProfile, dfm_names: &HashSet<String>) -> Vec<RawCall> {
    let mut results = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    if chunk.content.is_empty() {
        return results;
    }

    let self_upper = chunk.function_name.to_uppercase();
    let skip: HashSet<String> = profile.skip_tokens.iter().map(|t| t.to_uppercase()).collect();
    let clean = strip_non_code_content(&chunk.content, profile);

    let paren_re = Regex::new(r"\b([A-Za-z_]\w*)\s*\(").unwrap();
    for caps in paren_re.captures_iter(&clean) {
        let callee = &caps[1];
        let upper = callee.to_uppercase();
        if !known_upper.contains(&upper) || seen.contains(&upper) {
            continue;
        }
        if upper == self_upper {
            let count_re = RegexBuilder::new(&format!(r"\b{}\s*\(", regex::escape(&upper))).case_insensitive(true).build().unwrap();
            if count_re.find_iter(&clean).count() > 1 {
                seen.insert(upper);
                results.push(RawCall { callee: callee.to_string(), confidence: 0.70 });
            }
        } else if !dfm_names.contains(&upper) {
            seen.insert(upper);
            results.push(RawCall { callee: callee.to_string(), confidence: 0.70 });
        }
    }

    for kw_re in call_keyword_patterns(profile) {
        for caps in kw_re.captures_iter(&chunk.content) {
            let Some(callee) = caps.name("callee") else { continue };
            let upper = callee.as_str().to_uppercase();
            if known_upper.contains(&upper) && !seen.contains(&upper) {
                seen.insert(upper.clone());
                results.push(RawCall { callee: callee.as_str().to_string(), confidence: 0.80 });
            }
        }
    }

    if profile.supports_bare_identifiers {
        for func_upper in known_upper {
            if seen.contains(func_upper) || skip.contains(func_upper) || dfm_names.contains(func_upper) || func_upper.len() < 3 {
                continue;
            }
            if *func_upper == self_upper {
                let Some(re) = word_boundary_re(func_upper) else { continue };
                if re.find_iter(&clean).count() <= 1 {
                    continue;
                }
            }
            let mut pattern = format!(r"\b{}\b", regex::escape(func_upper));
            if !profile.bare_id_negative_lookahead.is_empty() {
                pattern.push_str(&profile.bare_id_negative_lookahead);
            }
            let Ok(re) = RegexBuilder::new(&pattern).case_insensitive(true).build() else { continue };
            if re.is_match(&clean) {
                seen.insert(func_upper.clone());
                results.push(RawCall { callee: func_upper.clone(), confidence: 0.60 });
            }
        }
    }

    results
}

/// Validates raw LLM (or fallback) output against the known-function set and rejects
/// hallucinations: a callee must both be a known project function and occur, whole-word,
/// somewhere in the chunk's own content. Self-calls require a second occurrence beyond
/// the declaration line.
fn calls_to_edges(chunk: &Chunk, calls: Vec<RawCall>, known_upper: &HashSet<String>) -> Vec<(String, f64)> {
    let mut edges = Vec::new();
    let mut seen = HashSet::new();
    let content_upper = chunk.content.to_uppercase();
    let self_upper = chunk.function_name.to_uppercase();

    for call in calls {
        let callee = call.callee.trim().to_string();
        if callee.is_empty() {
            continue;
        }
        let upper = callee.to_uppercase();
        if !known_upper.contains(&upper) || seen.contains(&upper) {
            continue;
        }
        if upper == self_upper {
            let Some(re) = word_boundary_re(&upper) else { continue };
            if re.find_iter(&content_upper).count() <= 1 {
                continue;
            }
        }
        let Some(re) = word_boundary_re(&upper) else { continue };
        if !re.is_match(&content_upper) {
            tracing::debug!(caller = %chunk.function_name, callee = %callee, "rejected hallucinated call: not present in chunk content");
            continue;
        }
        seen.insert(upper);
        edges.push((callee, call.confidence.clamp(0.0, 1.0)));
    }
    edges
}

/// Catches known function names the LLM (or the primary regex pass) missed, at a lower
/// confidence than anything found by an explicit strategy.
fn supplement_bare_identifiers(
    chunk: &Chunk,
    existing: Vec<(String, f64)>,
    known_upper: &HashSet<String>,
    profile: &LanguageProfile,
    dfm_names: &HashSet<String>,
) -> Vec<(String, f64)> {
    if chunk.content.is_empty() || !profile.supports_bare_identifiers {
        return existing;
    }

    let mut already: HashSet<String> = existing.iter().map(|(c, _)| c.to_uppercase()).collect();
    let self_upper = chunk.function_name.to_uppercase();
    let skip: HashSet<String> = profile.skip_tokens.iter().map(|t| t.to_uppercase()).collect();
    let clean = strip_non_code_content(&chunk.content, profile);
    let mut out = existing;

    for func_upper in known_upper {
        if already.contains(func_upper) || skip.contains(func_upper) || dfm_names.contains(func_upper) || func_upper.len() < 3 {
            continue;
        }
        if *func_upper == self_upper {
            let Some(re) = word_boundary_re(func_upper) else { continue };
            if re.find_iter(&clean).count() <= 1 {
                continue;
            }
        }
        let mut pattern = format!(r"\b{}\b", regex::escape(func_upper));
        if !profile.bare_id_negative_lookahead.is_empty() {
            pattern.push_str(&profile.bare_id_negative_lookahead);
        }
        let Ok(re) = RegexBuilder::new(&pattern).case_insensitive(true).build() else { continue };
        if re.is_match(&clean) {
            out.push((func_upper.clone(), 0.55));
            already.insert(func_upper.clone());
        }
    }

    out
}

/// Expands unique callee edges into per-call-site edges: a callee invoked three times in
/// one chunk contributes three edges, not one, so later diffing can reason about call
/// multiplicity rather than mere presence.
fn expand_call_sites(chunk: &Chunk, edges: Vec<(String, f64)>) -> Vec<CallEdge> {
    if chunk.content.is_empty() {
        return edges
            .into_iter()
            .map(|(callee, confidence)| CallEdge { caller_chunk_id: chunk.chunk_id(), callee, confidence })
            .collect();
    }

    let self_upper = chunk.function_name.to_uppercase();
    let mut out = Vec::new();

    for (callee, confidence) in edges {
        let upper = callee.to_uppercase();
        let paren_re = RegexBuilder::new(&format!(r"\b{}\s*\(", regex::escape(&upper))).case_insensitive(true).build().unwrap();
        let mut paren_count = paren_re.find_iter(&chunk.content).count();
        if upper == self_upper && paren_count > 0 {
            paren_count -= 1;
        }

        let site_count = if paren_count >= 2 {
            paren_count
        } else if paren_count == 0 {
            let bare_re = word_boundary_re(&upper).unwrap();
            let mut bare_count = bare_re.find_iter(&chunk.content).count();
            if upper == self_upper {
                bare_count = bare_count.saturating_sub(1);
            }
            bare_count.max(1)
        } else {
            1
        };

        for _ in 0..site_count {
            out.push(CallEdge { caller_chunk_id: chunk.chunk_id(), callee: callee.clone(), confidence });
        }
    }

    out
}

fn eligible(chunk: &Chunk) -> bool {
    !chunk.function_name.is_empty()
        && chunk.function_name != "<module>"
        && !chunk.content.is_empty()
        && !chunk.metadata.get("is_dfm_form").and_then(Value::as_bool).unwrap_or(false)
}

/// Collects every handler name bound in a `.dfm` form chunk's `event_handlers` metadata,
/// upper-cased, so extraction can exclude them from the known-callee set: a handler wired
/// to a UI event is invoked by the framework, not by anything visible in the chunk's own
/// content, so treating it as an ordinary callee only produces hallucinated matches.
fn dfm_names(chunks: &[Chunk]) -> HashSet<String> {
    chunks
        .iter()
        .filter(|c| c.metadata.get("is_dfm_form").and_then(Value::as_bool).unwrap_or(false))
        .filter_map(|c| c.metadata.get("event_handlers").and_then(Value::as_array))
        .flatten()
        .filter_map(Value::as_str)
        .map(str::to_uppercase)
        .collect()
}

enum ExtractKind {
    Cached,
    LlmCalled,
    Fallback,
}

/// One eligible chunk's worth of work: probe the cache, call the LLM on a miss, and fall
/// back to regex extraction if the call fails or returns something unparsable. Spawned
/// once per chunk by [`extract_calls`]; the LLM call itself blocks on `llm`'s own
/// semaphore, which is what actually bounds how many of these run concurrently.
#[allow(clippy::too_many_arguments)]
async fn extract_for_chunk(
    chunk: Chunk,
    known_function_names: Arc<Vec<String>>,
    known_upper: Arc<HashSet<String>>,
    dfm: Arc<HashSet<String>>,
    sys_prompt: Arc<String>,
    fallback_profile: Arc<LanguageProfile>,
    llm: Arc<LlmClient>,
    cache: Option<Arc<LlmCache>>,
) -> (ExtractKind, Vec<CallEdge>) {
    let content_hash = cache_key(PROMPT_VERSION, &chunk.content, &chunk.language);

    if let Some(cache) = &cache {
        if let Ok(Some(raw)) = cache.get(&content_hash) {
            if let Ok(calls) = parse_calls(&raw) {
                let edges = calls_to_edges(&chunk, calls, &known_upper);
                let edges = supplement_bare_identifiers(&chunk, edges, &known_upper, &fallback_profile, &dfm);
                return (ExtractKind::Cached, expand_call_sites(&chunk, edges));
            }
        }
    }

    let user_msg = user_prompt(&chunk, &known_function_names);
    let messages = [ChatMessage::system((*sys_prompt).clone()), ChatMessage::user(user_msg)];

    match llm.chat_completion(&messages).await {
        Ok(raw) => match parse_calls(&raw) {
            Ok(calls) => {
                if let Some(cache) = &cache {
                    if let Ok(json) = serde_json::to_string(&calls.iter().map(|c| (&c.callee, c.confidence)).collect::<Vec<_>>()) {
                        let _ = cache.put(&content_hash, &json, llm.model());
                    }
                }
                let edges = calls_to_edges(&chunk, calls, &known_upper);
                let edges = supplement_bare_identifiers(&chunk, edges, &known_upper, &fallback_profile, &dfm);
                (ExtractKind::LlmCalled, expand_call_sites(&chunk, edges))
            }
            Err(err) => {
                tracing::warn!(file = %chunk.file_path, function = %chunk.function_name, error = %err, "unparsable llm extraction response, falling back to regex");
                let calls = regex_fallback(&chunk, &known_upper, &fallback_profile, &dfm);
                let edges = calls_to_edges(&chunk, calls, &known_upper);
                let edges = supplement_bare_identifiers(&chunk, edges, &known_upper, &fallback_profile, &dfm);
                (ExtractKind::Fallback, expand_call_sites(&chunk, edges))
            }
        },
        Err(err) => {
            tracing::warn!(file = %chunk.file_path, function = %chunk.function_name, error = %err, "llm extraction failed, falling back to regex");
            let calls = regex_fallback(&chunk, &known_upper, &fallback_profile, &dfm);
            let edges = calls_to_edges(&chunk, calls, &known_upper);
            let edges = supplement_bare_identifiers(&chunk, edges, &known_upper, &fallback_profile, &dfm);
            (ExtractKind::Fallback, expand_call_sites(&chunk, edges))
        }
    }
}

/// Extracts call edges from every eligible chunk in `chunks`, fanning the work out one
/// task per chunk under a [`tokio::task::JoinSet`]. Concurrency is bounded not here but by
/// `llm`'s own semaphore — every spawned task blocks on the same permit pool, so raising
/// `max_concurrent_llm_calls` is what actually changes how many chunks extract in
/// parallel. `profile` supplies the language-specific prompt addendum, skip tokens, and
/// bare-identifier rules; pass the profile for the chunks' own language.
pub async fn extract_calls(
    chunks: &[Chunk],
    known_function_names: &[String],
    profile: Option<&LanguageProfile>,
    llm: Arc<LlmClient>,
    cache: Option<Arc<LlmCache>>,
) -> Vec<CallEdge> {
    let known_upper = Arc::new(known_upper_set(known_function_names));
    let dfm = Arc::new(dfm_names(chunks));
    let sys_prompt = Arc::new(system_prompt(profile));
    let fallback_profile = Arc::new(profile.cloned().unwrap_or_default());
    let known_names = Arc::new(known_function_names.to_vec());

    let mut seen_chunk_ids = HashSet::new();
    let eligible_chunks: Vec<Chunk> = chunks
        .iter()
        .filter(|c| eligible(c))
        .filter(|c| seen_chunk_ids.insert(c.chunk_id()))
        .cloned()
        .collect();

    let mut set = tokio::task::JoinSet::new();
    for chunk in eligible_chunks {
        set.spawn(extract_for_chunk(
            chunk,
            known_names.clone(),
            known_upper.clone(),
            dfm.clone(),
            sys_prompt.clone(),
            fallback_profile.clone(),
            llm.clone(),
            cache.clone(),
        ));
    }

    let mut all_edges = Vec::new();
    let mut cached = 0usize;
    let mut llm_called = 0usize;
    let mut fallback_used = 0usize;

    while let Some(joined) = set.join_next().await {
        let Ok((kind, edges)) = joined else { continue };
        match kind {
            ExtractKind::Cached => cached += 1,
            ExtractKind::LlmCalled => llm_called += 1,
            ExtractKind::Fallback => fallback_used += 1,
        }
        all_edges.extend(edges);
    }

    tracing::info!(cached, llm_called, fallback_used, edges = all_edges.len(), "call extraction complete");
    all_edges
}

fn known_upper_set(known_function_names: &[String]) -> HashSet<String> {
    known_function_names.iter().map(|n| n.to_uppercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn chunk(function_name: &str, content: &str) -> Chunk {
        Chunk {
            file_path: "a.py".to_string(),
            language: "python".to_string(),
            function_name: function_name.to_string(),
            class_name: String::new(),
            line_start: 1,
            line_end: content.lines().count(),
            content: content.to_string(),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn dfm_names_reads_event_handlers_metadata_not_function_name() {
        let mut form = chunk("<form>", "object Form1: TForm1\nend\n");
        form.metadata.insert("is_dfm_form".to_string(), Value::Bool(true));
        form.metadata.insert("event_handlers".to_string(), Value::Array(vec![Value::String("Button1Click".to_string())]));

        let names = dfm_names(&[form]);
        assert!(names.contains("BUTTON1CLICK"));
        assert!(!names.contains("<FORM>"));
    }

    #[test]
    fn regex_fallback_finds_parenthesised_calls() {
        let profile = trustbot_profiles::seed_profile("python").unwrap();
        let chunk = chunk("caller", "def caller():\n    helper()\n");
        let known: HashSet<String> = ["CALLER".to_string(), "HELPER".to_string()].into_iter().collect();
        let calls = regex_fallback(&chunk, &known, &profile, &HashSet::new());
        assert!(calls.iter().any(|c| c.callee.eq_ignore_ascii_case("helper")));
    }

    #[test]
    fn calls_to_edges_rejects_hallucinated_callee() {
        let chunk = chunk("caller", "def caller():\n    helper()\n");
        let known: HashSet<String> = ["CALLER".to_string(), "GHOST".to_string()].into_iter().collect();
        let calls = vec![RawCall { callee: "Ghost".to_string(), confidence: 0.9 }];
        let edges = calls_to_edges(&chunk, calls, &known);
        assert!(edges.is_empty());
    }

    #[test]
    fn calls_to_edges_requires_second_occurrence_for_self_call() {
        let chunk = chunk("Recurse", "def Recurse():\n    pass\n");
        let known: HashSet<String> = ["RECURSE".to_string()].into_iter().collect();
        let calls = vec![RawCall { callee: "Recurse".to_string(), confidence: 0.9 }];
        assert!(calls_to_edges(&chunk, calls, &known).is_empty());

        let chunk2 = chunk("Recurse", "def Recurse():\n    Recurse()\n");
        let calls2 = vec![RawCall { callee: "Recurse".to_string(), confidence: 0.9 }];
        assert_eq!(calls_to_edges(&chunk2, calls2, &known).len(), 1);
    }

    #[test]
    fn expand_call_sites_duplicates_per_invocation() {
        let chunk = chunk("caller", "def caller():\n    helper()\n    helper()\n");
        let edges = expand_call_sites(&chunk, vec![("helper".to_string(), 0.7)]);
        assert_eq!(edges.len(), 2);
    }

    #[test]
    fn parse_calls_accepts_fenced_json_array() {
        let raw = "```json\n[{\"callee\": \"Save\", \"confidence\": 0.9}]\n```";
        let calls = parse_calls(raw).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].callee, "Save");
    }

    #[tokio::test]
    async fn extract_calls_falls_back_without_an_llm_on_provider_error() {
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

        let llm = Arc::new(LlmClient::new(Box::new(AlwaysFails), 1));
        let profile = trustbot_profiles::seed_profile("python").unwrap();
        let chunks = vec![chunk("caller", "def caller():\n    helper()\n")];
        let known = vec!["caller".to_string(), "helper".to_string()];

        let edges = extract_calls(&chunks, &known, Some(&profile), llm, None).await;
        assert!(edges.iter().any(|e| e.callee.eq_ignore_ascii_case("helper")));
    }
}
