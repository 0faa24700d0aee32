//! Five-phase profile generation: detect which files belong to which language, sample a
//! representative handful of them, ask the LLM for a profile, validate the profile's
//! regex patterns against a naive keyword scan, and refine up to a fixed number of times
//! if validation finds gaps.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use regex::RegexBuilder;

use trustbot_llm::{cache_key, ChatMessage, LlmClient};

use crate::error::ProfileError;
use crate::model::{BlockRuleConfig, ForwardDeclarationConfig, LanguageProfile, SpecialFileConfig};
use crate::registry;
use crate::seed::{extension_map, seed_profile};

pub const IGNORED_DIRS: &[&str] = &[
    ".git", "node_modules", "__pycache__", ".venv", "venv", "dist", "build", ".idea", ".vs",
    "bin", "obj", "target", ".trustbot",
];

const MAX_SAMPLE_FILES: usize = 8;
const MAX_SAMPLE_LINES: usize = 500;
const MAX_REFINEMENT_CYCLES: u32 = 3;
const SAMPLE_SEED: u64 = 42;

const PROFILE_GENERATION_PROMPT: &str = "\
You are analysing a codebase written in a specific programming language to produce a \
structured JSON profile describing how to find function definitions, class definitions, \
and function calls using regular expressions.

Return ONLY a JSON object with this exact shape:
{
  \"language\": \"<string>\",
  \"aliases\": [\"<string>\", ...],
  \"file_extensions\": [\"<string>\", ...],
  \"function_def_patterns\": [\"<regex with (?P<name>...)>\", ...],
  \"class_def_patterns\": [\"<regex with (?P<name>...)>\", ...],
  \"named_regex_groups\": {\"name\": \"name\"},
  \"forward_declaration_rules\": {\"keyword\": \"\", \"strategy\": \"\"} | null,
  \"special_file_types\": [{\"extension\": \"\", \"parser_type\": \"\", \"object_pattern\": \"\", \"event_pattern\": \"\", \"metadata_keys\": []}],
  \"block_rules\": [{\"block_type\": \"\", \"open_pattern\": \"\", \"close_pattern\": \"\", \"name_group\": \"name\"}],
  \"llm_call_prompt\": \"<string>\",
  \"skip_tokens\": [\"<string>\", ...],
  \"supports_bare_identifiers\": false,
  \"bare_id_negative_lookahead\": \"\",
  \"call_keyword_patterns\": [\"<regex with (?P<callee>...)>\", ...],
  \"call_pattern_examples\": [\"<example from code>\", ...],
  \"non_call_examples\": [\"<example from code>\", ...],
  \"single_line_comment\": \"//\",
  \"multi_line_comment_open\": \"/*\",
  \"multi_line_comment_close\": \"*/\",
  \"string_delimiters\": [\"\\\"\"]
}";

const REFINEMENT_PROMPT_HEADER: &str = "\
Your previously generated regex patterns MISSED some function definitions in the target \
codebase. Below are the lines that contain real function/procedure definitions but were \
NOT matched by your patterns.

MISSED LINES (file → line):\n";

const REFINEMENT_PROMPT_FOOTER: &str = "\n\nAnalyse these missed lines, update your \
function_def_patterns and class_def_patterns to cover them. Return the FULL updated JSON \
profile (same schema as before) — not just the changed fields.\n\nCURRENT PROFILE:\n";

fn extensionless_signatures() -> HashMap<&'static str, Vec<&'static str>> {
    HashMap::from([
        (
            "natural",
            vec![
                "DEFINE DATA", "END-DEFINE", "DEFINE SUBROUTINE", "END-SUBROUTINE",
                "DEFINE FUNCTION", "CALLNAT", "PERFORM ", "RESET ", "FETCH ",
                "INPUT USING MAP",
            ],
        ),
        (
            "cobol",
            vec![
                "IDENTIFICATION DIVISION", "DATA DIVISION", "PROCEDURE DIVISION",
                "WORKING-STORAGE SECTION", "PERFORM ", "EVALUATE ", "MOVE ",
            ],
        ),
        (
            "rpg",
            vec!["DCL-PROC ", "END-PROC", "DCL-S ", "DCL-DS ", "BEGSR ", "ENDSR", "DCL-PI ", "CALLP "],
        ),
        (
            "focus",
            vec!["TABLE FILE", "-DEFINE FUNCTION", "-DEFINE FILE", "GRAPH FILE", "-IF ", "-ENDIF"],
        ),
    ])
}

fn naive_keywords(language: &str) -> Vec<&'static str> {
    match language {
        "python" => vec!["def ", "class "],
        "java" => vec!["void ", "public ", "private ", "protected "],
        "javascript" => vec!["function ", "class "],
        "typescript" => vec!["function ", "class ", "interface "],
        "delphi" => vec!["procedure ", "function ", "constructor ", "destructor "],
        "csharp" => vec!["void ", "public ", "private ", "protected ", "class "],
        "go" => vec!["func "],
        "kotlin" => vec!["fun ", "class "],
        "cobol" => vec!["SECTION.", "DIVISION."],
        "rpg" => vec!["DCL-PROC ", "BEGSR "],
        "natural" => vec!["DEFINE SUBROUTINE ", "DEFINE FUNCTION ", "1NEXT "],
        "focus" => vec!["-DEFINE FUNCTION ", "-DEFINE FILE "],
        _ => vec!["function ", "procedure ", "def ", "sub "],
    }
}

/// Phase 1: walk the codebase and group source files by detected language. Files with a
/// known extension are mapped directly; files with no extension, or an extension nothing
/// recognises, are grouped and then identified by a keyword vote over their content.
pub fn detect_languages(root: &Path) -> HashMap<String, Vec<PathBuf>> {
    let ext_map = extension_map();
    let mut by_lang: HashMap<String, Vec<PathBuf>> = HashMap::new();
    let mut unknown: Vec<PathBuf> = Vec::new();

    let skip_names: std::collections::HashSet<&str> = [
        "readme", "license", "licence", "makefile", "dockerfile", "changelog",
        "contributing", "authors", ".gitignore", ".gitattributes", ".editorconfig",
        ".env", ".env.example", "repo-metadata.txt",
    ]
    .into_iter()
    .collect();

    let skip_exts: std::collections::HashSet<&str> = [
        ".md", ".txt", ".json", ".xml", ".yaml", ".yml", ".toml", ".cfg", ".ini", ".csv",
        ".log", ".lock", ".svg", ".png", ".jpg", ".gif", ".ico", ".pdf", ".zip", ".tar",
        ".gz", ".exe", ".dll", ".so", ".dylib", ".o", ".a", ".class", ".jar", ".war",
        ".pyc", ".pyo", ".whl", ".egg",
    ]
    .into_iter()
    .collect();

    for entry in walk(root) {
        let ext = entry
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase()))
            .unwrap_or_default();

        if !ext.is_empty() {
            if let Some(lang) = ext_map.get(ext.as_str()) {
                by_lang.entry(lang.to_string()).or_default().push(entry);
            } else if !skip_exts.contains(ext.as_str()) {
                unknown.push(entry);
            }
        } else {
            let name = entry.file_name().map(|n| n.to_string_lossy().to_ascii_lowercase()).unwrap_or_default();
            if !skip_names.contains(name.as_str()) {
                unknown.push(entry);
            }
        }
    }

    if !unknown.is_empty() {
        if let Some((lang, files)) = identify_unknown_files(&unknown) {
            by_lang.entry(lang).or_default().extend(files);
        }
    }

    by_lang
}

fn walk(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if path.is_dir() {
                if !IGNORED_DIRS.contains(&name.as_str()) {
                    stack.push(path);
                }
            } else {
                out.push(path);
            }
        }
    }
    out
}

fn identify_unknown_files(unknown: &[PathBuf]) -> Option<(String, Vec<PathBuf>)> {
    let signatures = extensionless_signatures();
    let mut votes: HashMap<&str, u32> = HashMap::new();

    for path in unknown.iter().take(20) {
        let Ok(content) = std::fs::read_to_string(path) else { continue };
        let upper = content.to_ascii_uppercase();
        for (lang, sigs) in &signatures {
            let hits = sigs.iter().filter(|s| upper.contains(s.to_ascii_uppercase().as_str())).count() as u32;
            if hits >= 2 {
                *votes.entry(lang).or_insert(0) += hits;
            }
        }
    }

    let best = votes.into_iter().max_by_key(|(_, v)| *v)?;
    Some((best.0.to_string(), unknown.to_vec()))
}

/// Phase 2: pick the smallest, largest, and median-sized file plus up to
/// `MAX_SAMPLE_FILES - 3` more chosen deterministically at random, and return each
/// file's path (relative to `root`) and its first `MAX_SAMPLE_LINES` lines.
pub fn sample_files(root: &Path, files: &[PathBuf]) -> Vec<(String, String)> {
    let mut sized: Vec<(&PathBuf, u64)> = files
        .iter()
        .filter_map(|f| std::fs::metadata(f).ok().map(|m| (f, m.len())))
        .collect();
    if sized.is_empty() {
        return Vec::new();
    }
    sized.sort_by_key(|(_, size)| *size);

    let mut selected: Vec<&PathBuf> = Vec::new();
    selected.push(sized[0].0);
    if sized.len() > 1 {
        selected.push(sized[sized.len() - 1].0);
    }
    let mid = sized.len() / 2;
    if sized.len() > 2 && !selected.contains(&sized[mid].0) {
        selected.push(sized[mid].0);
    }

    let mut remaining: Vec<&PathBuf> = sized.iter().map(|(f, _)| *f).filter(|f| !selected.contains(f)).collect();
    let mut rng = StdRng::seed_from_u64(SAMPLE_SEED);
    remaining.shuffle(&mut rng);
    let take = MAX_SAMPLE_FILES.saturating_sub(selected.len()).min(remaining.len());
    selected.extend(remaining.into_iter().take(take));

    let mut samples = Vec::new();
    for path in selected.into_iter().take(MAX_SAMPLE_FILES) {
        let Ok(content) = std::fs::read_to_string(path) else { continue };
        let truncated: String = content.lines().take(MAX_SAMPLE_LINES).collect::<Vec<_>>().join("\n");
        let rel = path.strip_prefix(root).unwrap_or(path).to_string_lossy().replace('\\', "/");
        samples.push((rel, truncated));
    }
    samples
}

/// Phase 3: ask the LLM to generate a profile from sampled source; falls back to the seed
/// profile for this language (or a minimal generic one) if the call fails or the response
/// can't be parsed.
pub async fn generate_profile(
    llm: &LlmClient,
    language: &str,
    extensions: &[String],
    samples: &[(String, String)],
) -> LanguageProfile {
    let mut sample_text = String::new();
    for (rel, content) in samples {
        sample_text.push_str(&format!("\n--- FILE: {rel} ---\n{content}\n"));
    }
    let user_msg = format!(
        "LANGUAGE: {language}\nFILE EXTENSIONS: {}\n\nSAMPLE SOURCE FILES ({} files):\n{sample_text}",
        extensions.join(", "),
        samples.len(),
    );

    let messages = [ChatMessage::system(PROFILE_GENERATION_PROMPT), ChatMessage::user(user_msg)];

    match llm.chat_completion(&messages).await {
        Ok(raw) => match parse_profile_response(&raw, language, extensions) {
            Ok(profile) => {
                tracing::info!(language, "llm generated profile successfully");
                profile
            }
            Err(err) => {
                tracing::warn!(language, error = %err, "llm profile response unparsable, using seed fallback");
                fallback_profile(language, extensions)
            }
        },
        Err(err) => {
            tracing::warn!(language, error = %err, "llm profile generation failed, using seed fallback");
            fallback_profile(language, extensions)
        }
    }
}

fn fallback_profile(language: &str, extensions: &[String]) -> LanguageProfile {
    let mut profile = seed_profile(language).unwrap_or_else(|| LanguageProfile {
        language: language.to_string(),
        file_extensions: extensions.to_vec(),
        function_def_patterns: vec![
            r"^\s*(?:async\s+)?(?:def|function|procedure|func|fun|sub)\s+(?P<name>\w+)".to_string(),
        ],
        ..Default::default()
    });
    if !extensions.is_empty() {
        profile.file_extensions = extensions.to_vec();
    }
    profile
}

fn parse_profile_response(raw: &str, language: &str, extensions: &[String]) -> Result<LanguageProfile, ProfileError> {
    let json_text = trustbot_llm::extract_json(raw);
    let data: serde_json::Value = serde_json::from_str(json_text)?;
    Ok(dict_to_profile(&data, language, extensions))
}

fn dict_to_profile(data: &serde_json::Value, language: &str, extensions: &[String]) -> LanguageProfile {
    let get_str = |key: &str, default: &str| -> String {
        data.get(key).and_then(|v| v.as_str()).unwrap_or(default).to_string()
    };
    let get_str_vec = |key: &str| -> Vec<String> {
        data.get(key)
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    };

    let forward_declaration_rules = data.get("forward_declaration_rules").and_then(|fwd| {
        let keyword = fwd.get("keyword")?.as_str()?.to_string();
        if keyword.is_empty() {
            return None;
        }
        Some(ForwardDeclarationConfig { keyword, strategy: fwd.get("strategy").and_then(|v| v.as_str()).unwrap_or("").to_string() })
    });

    let special_file_types = data
        .get("special_file_types")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|sf| {
                    let extension = sf.get("extension")?.as_str()?.to_string();
                    if extension.is_empty() {
                        return None;
                    }
                    Some(SpecialFileConfig {
                        extension,
                        parser_type: sf.get("parser_type").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                        object_pattern: sf.get("object_pattern").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                        event_pattern: sf.get("event_pattern").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                        metadata_keys: sf
                            .get("metadata_keys")
                            .and_then(|v| v.as_array())
                            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                            .unwrap_or_default(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let block_rules = data
        .get("block_rules")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|br| {
                    let open_pattern = br.get("open_pattern")?.as_str()?.to_string();
                    if open_pattern.is_empty() {
                        return None;
                    }
                    Some(BlockRuleConfig {
                        block_type: br.get("block_type").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                        open_pattern,
                        close_pattern: br.get("close_pattern").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                        name_group: br.get("name_group").and_then(|v| v.as_str()).unwrap_or("name").to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let named_regex_groups = data
        .get("named_regex_groups")
        .and_then(|v| v.as_object())
        .map(|m| m.iter().filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string()))).collect())
        .unwrap_or_else(|| HashMap::from([("name".to_string(), "name".to_string())]));

    let file_extensions = {
        let parsed = get_str_vec("file_extensions");
        if parsed.is_empty() { extensions.to_vec() } else { parsed }
    };

    LanguageProfile {
        language: get_str("language", language),
        aliases: get_str_vec("aliases"),
        file_extensions,
        function_def_patterns: get_str_vec("function_def_patterns"),
        class_def_patterns: get_str_vec("class_def_patterns"),
        named_regex_groups,
        forward_declaration_rules,
        special_file_types,
        block_rules,
        llm_call_prompt: get_str("llm_call_prompt", ""),
        skip_tokens: get_str_vec("skip_tokens"),
        supports_bare_identifiers: data.get("supports_bare_identifiers").and_then(|v| v.as_bool()).unwrap_or(false),
        bare_id_negative_lookahead: get_str("bare_id_negative_lookahead", ""),
        call_keyword_patterns: get_str_vec("call_keyword_patterns"),
        call_pattern_examples: get_str_vec("call_pattern_examples"),
        non_call_examples: get_str_vec("non_call_examples"),
        single_line_comment: get_str("single_line_comment", "//"),
        multi_line_comment_open: get_str("multi_line_comment_open", "/*"),
        multi_line_comment_close: get_str("multi_line_comment_close", "*/"),
        string_delimiters: {
            let parsed = get_str_vec("string_delimiters");
            if parsed.is_empty() { vec!["\"".to_string()] } else { parsed }
        },
        ..Default::default()
    }
}

/// Phase 4: run `profile`'s own patterns against every file and compare the hit count to
/// a naive keyword scan. Returns the coverage fraction and up to 50 example lines the
/// patterns missed, for use as refinement input.
pub fn validate_patterns(root: &Path, profile: &LanguageProfile, files: &[PathBuf]) -> (f64, Vec<String>) {
    let compiled: Vec<regex::Regex> = profile
        .function_def_patterns
        .iter()
        .chain(profile.class_def_patterns.iter())
        .filter_map(|pat| {
            RegexBuilder::new(pat)
                .multi_line(true)
                .case_insensitive(true)
                .build()
                .inspect_err(|e| tracing::warn!(pattern = pat, error = %e, "invalid regex in profile"))
                .ok()
        })
        .collect();

    let keywords = naive_keywords(&profile.language);
    let mut total_keyword_hits = 0usize;
    let mut total_pattern_hits = 0usize;
    let mut missed_lines = Vec::new();

    for path in files {
        let ext = path.extension().map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase())).unwrap_or_default();
        if profile.special_file_for(&ext).is_some() {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(path) else { continue };
        let rel = path.strip_prefix(root).unwrap_or(path).to_string_lossy().replace('\\', "/");

        let mut keyword_lines = std::collections::BTreeSet::new();
        for kw in &keywords {
            let escaped = regex::escape(kw.trim_end());
            if let Ok(kw_re) = RegexBuilder::new(&format!(r"(?:^|\s){escaped}\s")).multi_line(true).case_insensitive(true).build() {
                for m in kw_re.find_iter(&content) {
                    let lineno = content[..m.start()].matches('\n').count() + 1;
                    keyword_lines.insert(lineno);
                }
            }
        }

        let mut pattern_lines = std::collections::BTreeSet::new();
        for pat in &compiled {
            for m in pat.find_iter(&content) {
                let lineno = content[..m.start()].matches('\n').count() + 1;
                pattern_lines.insert(lineno);
            }
        }

        total_keyword_hits += keyword_lines.len();
        total_pattern_hits += pattern_lines.len();

        let lines: Vec<&str> = content.lines().collect();
        for lineno in keyword_lines.difference(&pattern_lines) {
            if *lineno > 0 && *lineno <= lines.len() {
                let text = lines[lineno - 1].trim();
                if !text.is_empty() {
                    missed_lines.push(format!("{rel}:{lineno}: {text}"));
                }
            }
        }
    }

    if total_keyword_hits == 0 {
        return (1.0, Vec::new());
    }

    let coverage = (total_pattern_hits as f64 / total_keyword_hits as f64).min(1.0);
    missed_lines.truncate(50);
    (coverage, missed_lines)
}

/// Phase 4 (continued): ask the LLM to patch the profile's patterns against the lines
/// validation found it missed. Keeps the previous profile on failure.
pub async fn refine_profile(llm: &LlmClient, profile: LanguageProfile, missed: &[String]) -> LanguageProfile {
    let missed_text = missed.join("\n");
    let profile_json = serde_json::to_string_pretty(&profile).unwrap_or_default();
    let user_msg = format!("{REFINEMENT_PROMPT_HEADER}{missed_text}{REFINEMENT_PROMPT_FOOTER}{profile_json}");

    let messages = [ChatMessage::system(PROFILE_GENERATION_PROMPT), ChatMessage::user(user_msg)];
    match llm.chat_completion(&messages).await {
        Ok(raw) => match parse_profile_response(&raw, &profile.language, &profile.file_extensions) {
            Ok(mut refined) => {
                refined.codebase_hash = profile.codebase_hash;
                refined.source_file_count = profile.source_file_count;
                refined
            }
            Err(err) => {
                tracing::warn!(error = %err, "refinement response unparsable, keeping current profile");
                profile
            }
        },
        Err(err) => {
            tracing::warn!(error = %err, "refinement llm call failed, keeping current profile");
            profile
        }
    }
}

/// Runs validation and up to [`MAX_REFINEMENT_CYCLES`] refinement rounds, stopping as
/// soon as coverage reaches 100% or validation finds nothing left to refine against.
pub async fn validate_and_refine(
    llm: &LlmClient,
    root: &Path,
    mut profile: LanguageProfile,
    files: &[PathBuf],
) -> LanguageProfile {
    for cycle in 0..MAX_REFINEMENT_CYCLES {
        let (coverage, missed) = validate_patterns(root, &profile, files);
        profile.validation_coverage = coverage;
        if coverage >= 1.0 || missed.is_empty() {
            tracing::info!(language = %profile.language, coverage, cycle, "profile validation passed");
            return profile;
        }
        tracing::info!(language = %profile.language, coverage, missed = missed.len(), cycle = cycle + 1, "refining profile");
        profile = refine_profile(llm, profile, &missed).await;
    }
    let (final_coverage, _) = validate_patterns(root, &profile, files);
    profile.validation_coverage = final_coverage;
    profile
}

/// Runs the full detect → sample → generate → validate pipeline for every language found
/// under `root`, persisting each result and skipping languages whose cached profile
/// already matches the current file set.
pub async fn run(llm: &LlmClient, root: &Path) -> HashMap<String, LanguageProfile> {
    let files_by_lang = detect_languages(root);
    let mut profiles = HashMap::new();

    for (language, files) in files_by_lang {
        let hash = registry::fingerprint_files(root, &files);
        if let Some(cached) = registry::load_cached(root, &language, &hash) {
            tracing::info!(language, "using cached profile");
            profiles.insert(language, cached);
            continue;
        }

        let extensions: Vec<String> = files
            .iter()
            .filter_map(|f| f.extension().map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase())))
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();

        let samples = sample_files(root, &files);
        let generated = generate_profile(llm, &language, &extensions, &samples).await;
        let mut profile = validate_and_refine(llm, root, generated, &files).await;
        profile.codebase_hash = hash;
        profile.source_file_count = files.len();

        if let Err(err) = registry::persist(root, &profile) {
            tracing::warn!(language, error = %err, "failed to persist generated profile");
        }
        profiles.insert(language, profile);
    }

    profiles
}

/// Used by callers that want a prompt-cache key consistent with the one the call-edge
/// extractor uses for chunk bodies — profile generation and extraction share the same
/// hashing scheme so a cache inspection tool can reason about both with one function.
pub fn generation_cache_key(language: &str, files: &[PathBuf]) -> String {
    let joined: String = files.iter().map(|f| f.to_string_lossy()).collect::<Vec<_>>().join("\n");
    cache_key("profile-gen-v1", &joined, language)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn detects_python_files_by_extension() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "def foo():\n    pass\n").unwrap();
        std::fs::write(dir.path().join("README.md"), "hello").unwrap();

        let found = detect_languages(dir.path());
        assert_eq!(found.get("python").map(Vec::len), Some(1));
        assert!(found.get("markdown").is_none());
    }

    #[test]
    fn identifies_extensionless_natural_files_by_keyword_vote() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("PROGRAM1"),
            "DEFINE DATA\nLOCAL\nEND-DEFINE\nDEFINE SUBROUTINE SUB1\nEND-SUBROUTINE\n",
        )
        .unwrap();

        let found = detect_languages(dir.path());
        assert_eq!(found.get("natural").map(Vec::len), Some(1));
    }

    #[test]
    fn sample_files_includes_smallest_and_largest() {
        let dir = tempdir().unwrap();
        let small = dir.path().join("small.py");
        let large = dir.path().join("large.py");
        std::fs::write(&small, "x").unwrap();
        std::fs::write(&large, "x".repeat(5000)).unwrap();

        let samples = sample_files(dir.path(), &[small.clone(), large.clone()]);
        let names: Vec<&str> = samples.iter().map(|(p, _)| p.as_str()).collect();
        assert!(names.contains(&"small.py"));
        assert!(names.contains(&"large.py"));
    }

    #[test]
    fn validate_patterns_reports_full_coverage_for_matching_seed_profile() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.py");
        std::fs::write(&file, "def foo():\n    pass\n\nclass Bar:\n    pass\n").unwrap();

        let profile = seed_profile("python").unwrap();
        let (coverage, missed) = validate_patterns(dir.path(), &profile, &[file]);
        assert!(coverage >= 0.99);
        assert!(missed.is_empty());
    }

    #[test]
    fn validate_patterns_flags_missed_definitions() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.py");
        std::fs::write(&file, "class Bar:\n    pass\n").unwrap();

        let mut profile = seed_profile("python").unwrap();
        profile.class_def_patterns.clear();
        let (coverage, missed) = validate_patterns(dir.path(), &profile, &[file]);
        assert!(coverage < 1.0);
        assert!(!missed.is_empty());
    }
}
