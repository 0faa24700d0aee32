//! Splits source files into function-level chunks using a language profile's regex
//! patterns — no AST parser involved. Three chunking strategies, chosen per profile:
//!
//! - **Definition-to-next**: find each function/class definition line and let the chunk
//!   run from there to the next definition (or EOF). The default for most profiles.
//! - **Structural (block rules)**: for languages whose functions don't end at the next
//!   definition but at an explicit closing keyword (RPG's `END-PROC`, Natural's
//!   `END-SUBROUTINE`, FOCUS's `END`), match open/close pairs instead.
//! - **Special file** (e.g. a Delphi `.dfm` form): parsed by its own pattern pair rather
//!   than as source code at all.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::{Regex, RegexBuilder};
use serde_json::Value;

use trustbot_core::normalize_file_path;
use trustbot_profiles::LanguageProfile;

use crate::error::ChunkError;

pub const IGNORED_DIRS: &[&str] = &[
    ".git", "node_modules", "__pycache__", ".venv", "venv", "dist", "build", ".idea", ".vs",
    "bin", "obj", "target", ".trustbot",
];

#[derive(Debug, Clone)]
pub struct Chunk {
    pub file_path: String,
    pub language: String,
    pub function_name: String,
    pub class_name: String,
    pub line_start: usize,
    pub line_end: usize,
    pub content: String,
    pub metadata: HashMap<String, Value>,
}

impl Chunk {
    pub fn chunk_id(&self) -> String {
        format!("{}::{}::{}", self.file_path, self.class_name, self.function_name)
    }
}

struct Definition {
    line_num: usize,
    name: String,
    class_prefix: Option<String>,
    is_class: bool,
}

fn compile_named(pattern: &str, language: &str) -> Result<Regex, ChunkError> {
    RegexBuilder::new(pattern)
        .multi_line(true)
        .build()
        .map_err(|source| ChunkError::InvalidPattern { language: language.to_string(), pattern: pattern.to_string(), source })
}

fn find_definitions(content: &str, profile: &LanguageProfile) -> Result<Vec<Definition>, ChunkError> {
    let mut defs = Vec::new();

    for pattern in &profile.function_def_patterns {
        let re = compile_named(pattern, &profile.language)?;
        for caps in re.captures_iter(content) {
            let Some(name) = caps.name("name") else { continue };
            let line_num = content[..name.start()].matches('\n').count() + 1;
            let class_prefix = caps.name("class_prefix").map(|m| m.as_str().to_string());
            defs.push(Definition { line_num, name: name.as_str().to_string(), class_prefix, is_class: false });
        }
    }
    for pattern in &profile.class_def_patterns {
        let re = compile_named(pattern, &profile.language)?;
        for caps in re.captures_iter(content) {
            let Some(name) = caps.name("name") else { continue };
            let line_num = content[..name.start()].matches('\n').count() + 1;
            defs.push(Definition { line_num, name: name.as_str().to_string(), class_prefix: None, is_class: true });
        }
    }

    defs.sort_by_key(|d| d.line_num);
    Ok(defs)
}

/// Drops interface-section forward declarations per the profile's forward-declaration
/// rule: a definition above the split keyword with no qualifying class prefix is assumed
/// to be a signature-only declaration, not the real body.
fn apply_forward_declaration_rule(content: &str, profile: &LanguageProfile, defs: Vec<Definition>) -> Vec<Definition> {
    let Some(rule) = &profile.forward_declaration_rules else { return defs };
    if rule.strategy != "discard_before_keyword_unless_class_prefix" {
        return defs;
    }
    let Ok(keyword_re) = RegexBuilder::new(&format!(r"(?m)^\s*{}\b", regex::escape(&rule.keyword)))
        .case_insensitive(true)
        .build()
    else {
        return defs;
    };
    let Some(m) = keyword_re.find(content) else { return defs };
    let cutoff_line = content[..m.start()].matches('\n').count() + 1;

    defs.into_iter()
        .filter(|d| d.line_num >= cutoff_line || d.class_prefix.as_deref().is_some_and(|p| !p.is_empty()))
        .collect()
}

fn definition_chunks(rel_path: &str, language: &str, content: &str, profile: &LanguageProfile) -> Result<Vec<Chunk>, ChunkError> {
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        return Ok(Vec::new());
    }

    let defs = apply_forward_declaration_rule(content, profile, find_definitions(content, profile)?);

    if defs.is_empty() {
        return Ok(vec![Chunk {
            file_path: rel_path.to_string(),
            language: language.to_string(),
            function_name: "<module>".to_string(),
            class_name: String::new(),
            line_start: 1,
            line_end: lines.len(),
            content: content.to_string(),
            metadata: HashMap::new(),
        }]);
    }

    let uses_class_prefix = defs.iter().any(|d| d.class_prefix.is_some());
    let mut chunks = Vec::new();
    let mut current_class = String::new();

    for (i, def) in defs.iter().enumerate() {
        if def.is_class {
            current_class = def.name.clone();
        }

        let start = def.line_num;
        let mut end = if i + 1 < defs.len() { defs[i + 1].line_num.saturating_sub(1) } else { lines.len() };
        while end > start && lines.get(end.saturating_sub(1)).is_some_and(|l| l.trim().is_empty()) {
            end -= 1;
        }
        if end < start {
            end = start;
        }

        let class_name = if uses_class_prefix {
            def.class_prefix.clone().unwrap_or_default()
        } else if def.is_class {
            String::new()
        } else {
            current_class.clone()
        };

        if def.is_class && !uses_class_prefix {
            // Class header itself still gets a chunk too (its own body up to next def).
        }

        let chunk_content = lines[start.saturating_sub(1)..end.min(lines.len())].join("\n");

        chunks.push(Chunk {
            file_path: rel_path.to_string(),
            language: language.to_string(),
            function_name: def.name.clone(),
            class_name,
            line_start: start,
            line_end: end,
            content: chunk_content,
            metadata: HashMap::new(),
        });
    }

    Ok(chunks)
}

fn line_of(text: &str, offset: usize) -> usize {
    text[..offset.min(text.len())].matches('\n').count() + 1
}

const STRUCTURAL_CHUNK_SIZE: usize = 2048;

fn structural_chunks(rel_path: &str, language: &str, content: &str, profile: &LanguageProfile) -> Result<Vec<Chunk>, ChunkError> {
    let mut blocks: Vec<(usize, usize, String, String)> = Vec::new();

    for rule in &profile.block_rules {
        let open_re = RegexBuilder::new(&rule.open_pattern).multi_line(true).case_insensitive(true).build().map_err(|source| {
            ChunkError::InvalidPattern { language: profile.language.clone(), pattern: rule.open_pattern.clone(), source }
        })?;
        let close_re = RegexBuilder::new(&rule.close_pattern).multi_line(true).case_insensitive(true).build().map_err(|source| {
            ChunkError::InvalidPattern { language: profile.language.clone(), pattern: rule.close_pattern.clone(), source }
        })?;

        let closers: Vec<_> = close_re.find_iter(content).collect();
        let mut ci = 0;
        for opener in open_re.captures_iter(content) {
            let name = opener.name(&rule.name_group).or_else(|| opener.name("name")).map(|m| m.as_str().to_string()).unwrap_or_default();
            let open_start = opener.get(0).unwrap().start();
            while ci < closers.len() && closers[ci].start() <= open_start {
                ci += 1;
            }
            if ci < closers.len() {
                blocks.push((open_start, closers[ci].end(), rule.block_type.clone(), name));
                ci += 1;
            } else {
                blocks.push((open_start, content.len(), rule.block_type.clone(), name));
            }
        }
    }

    blocks.sort_by_key(|b| b.0);
    let mut merged: Vec<(usize, usize, String, String)> = Vec::new();
    for block in blocks {
        if let Some(last) = merged.last() {
            if block.0 < last.1 {
                continue;
            }
        }
        merged.push(block);
    }

    let mut chunks = Vec::new();
    let mut pos = 0;
    for (start, end, block_type, name) in &merged {
        if *start > pos {
            let inter = content[pos..*start].trim();
            if inter.len() > 3 {
                chunks.push(Chunk {
                    file_path: rel_path.to_string(),
                    language: language.to_string(),
                    function_name: "<declarations>".to_string(),
                    class_name: String::new(),
                    line_start: line_of(content, pos),
                    line_end: line_of(content, *start),
                    content: inter.to_string(),
                    metadata: HashMap::from([("block_type".to_string(), Value::String("preamble".to_string()))]),
                });
            }
        }

        chunks.push(Chunk {
            file_path: rel_path.to_string(),
            language: language.to_string(),
            function_name: name.clone(),
            class_name: String::new(),
            line_start: line_of(content, *start),
            line_end: line_of(content, *end),
            content: content[*start..*end].to_string(),
            metadata: HashMap::from([("block_type".to_string(), Value::String(block_type.clone()))]),
        });
        pos = *end;
    }

    if pos < content.len() {
        let tail = content[pos..].trim();
        if tail.len() > 3 {
            chunks.push(Chunk {
                file_path: rel_path.to_string(),
                language: language.to_string(),
                function_name: "<trailing>".to_string(),
                class_name: String::new(),
                line_start: line_of(content, pos),
                line_end: line_of(content, content.len()),
                content: tail.to_string(),
                metadata: HashMap::from([("block_type".to_string(), Value::String("epilogue".to_string()))]),
            });
        }
    }

    Ok(chunks.into_iter().flat_map(|c| split_oversized(c)).collect())
}

fn split_oversized(chunk: Chunk) -> Vec<Chunk> {
    if chunk.content.len() <= STRUCTURAL_CHUNK_SIZE {
        return vec![chunk];
    }
    let mut out = Vec::new();
    let mut buf: Vec<&str> = Vec::new();
    let mut buf_len = 0usize;
    let mut line_cursor = chunk.line_start;
    let mut seg_start_line = chunk.line_start;

    for line in chunk.content.lines() {
        if !buf.is_empty() && buf_len + line.len() + 1 > STRUCTURAL_CHUNK_SIZE {
            out.push(Chunk {
                file_path: chunk.file_path.clone(),
                language: chunk.language.clone(),
                function_name: chunk.function_name.clone(),
                class_name: chunk.class_name.clone(),
                line_start: seg_start_line,
                line_end: line_cursor.saturating_sub(1),
                content: buf.join("\n"),
                metadata: chunk.metadata.clone(),
            });
            buf.clear();
            buf_len = 0;
            seg_start_line = line_cursor;
        }
        buf.push(line);
        buf_len += line.len() + 1;
        line_cursor += 1;
    }
    if !buf.is_empty() {
        out.push(Chunk {
            file_path: chunk.file_path.clone(),
            language: chunk.language.clone(),
            function_name: chunk.function_name.clone(),
            class_name: chunk.class_name.clone(),
            line_start: seg_start_line,
            line_end: line_cursor.saturating_sub(1),
            content: buf.join("\n"),
            metadata: chunk.metadata,
        });
    }
    out
}

/// Chunks a Delphi-style `.dfm` form descriptor: not source code, but a declarative list
/// of UI objects and the event-handler method names they're bound to. Produces a single
/// chunk per file whose metadata lists every bound handler; the form chunk itself is
/// excluded from call extraction (`extractor::eligible`), and the handler names exist
/// only so the extractor can exclude them from the known-callee set elsewhere — a handler
/// wired up in a form is not "called" by anything extraction can see.
fn special_file_chunk(rel_path: &str, language: &str, content: &str, config: &trustbot_profiles::SpecialFileConfig) -> Result<Chunk, ChunkError> {
    let object_re = RegexBuilder::new(&config.object_pattern).multi_line(true).build().map_err(|source| {
        ChunkError::InvalidPattern { language: language.to_string(), pattern: config.object_pattern.clone(), source }
    })?;
    let event_re = RegexBuilder::new(&config.event_pattern).multi_line(true).build().map_err(|source| {
        ChunkError::InvalidPattern { language: language.to_string(), pattern: config.event_pattern.clone(), source }
    })?;

    let root_object = object_re.captures(content).and_then(|c| c.name("class")).map(|m| m.as_str().to_string()).unwrap_or_default();

    let handlers: Vec<Value> = event_re
        .captures_iter(content)
        .filter_map(|c| c.name("handler").map(|m| Value::String(m.as_str().to_string())))
        .collect();

    let mut metadata = HashMap::new();
    metadata.insert("is_dfm_form".to_string(), Value::Bool(true));
    metadata.insert("event_handlers".to_string(), Value::Array(handlers));

    Ok(Chunk {
        file_path: rel_path.to_string(),
        language: language.to_string(),
        function_name: "<form>".to_string(),
        class_name: root_object,
        line_start: 1,
        line_end: content.lines().count().max(1),
        content: content.to_string(),
        metadata,
    })
}

/// Chunks one file given its language profile, dispatching to whichever of the three
/// strategies above applies.
pub fn chunk_file(path: &Path, root: &Path, profile: &LanguageProfile) -> Result<Vec<Chunk>, ChunkError> {
    let content = std::fs::read_to_string(path).map_err(|source| ChunkError::Io { path: path.display().to_string(), source })?;
    let rel_path = normalize_file_path(&path.strip_prefix(root).unwrap_or(path).to_string_lossy());
    let ext = path.extension().map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase())).unwrap_or_default();

    if let Some(special) = profile.special_file_for(&ext) {
        return Ok(vec![special_file_chunk(&rel_path, &profile.language, &content, special)?]);
    }
    if !profile.block_rules.is_empty() {
        return structural_chunks(&rel_path, &profile.language, &content, profile);
    }
    definition_chunks(&rel_path, &profile.language, &content, profile)
}

/// Walks `root`, chunking every file whose extension a profile in `profiles` claims.
pub fn chunk_codebase(root: &Path, profiles: &HashMap<String, LanguageProfile>) -> Vec<Chunk> {
    let mut all = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else { continue };
        for entry in entries.flatten() {
            let path: PathBuf = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if path.is_dir() {
                if !IGNORED_DIRS.contains(&name.as_str()) {
                    stack.push(path);
                }
                continue;
            }
            let ext = path.extension().map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase())).unwrap_or_default();
            let Some(profile) = profiles.values().find(|p| p.matches_extension(&ext)) else { continue };
            match chunk_file(&path, root, profile) {
                Ok(chunks) => all.extend(chunks),
                Err(err) => tracing::debug!(path = %path.display(), error = %err, "skipping file during chunking"),
            }
        }
    }

    all
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use trustbot_profiles::seed_profile;

    #[test]
    fn chunks_python_functions_by_definition() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.py");
        std::fs::write(&file, "def foo():\n    pass\n\ndef bar():\n    foo()\n").unwrap();

        let profile = seed_profile("python").unwrap();
        let chunks = chunk_file(&file, dir.path(), &profile).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].function_name, "foo");
        assert_eq!(chunks[1].function_name, "bar");
    }

    #[test]
    fn chunks_class_methods_with_class_name() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.py");
        std::fs::write(&file, "class Widget:\n    def render(self):\n        pass\n").unwrap();

        let profile = seed_profile("python").unwrap();
        let chunks = chunk_file(&file, dir.path(), &profile).unwrap();
        let render = chunks.iter().find(|c| c.function_name == "render").unwrap();
        assert_eq!(render.class_name, "Widget");
    }

    #[test]
    fn delphi_forward_declarations_are_discarded() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("unit1.pas");
        std::fs::write(
            &file,
            "unit Unit1;\ninterface\nprocedure DoThing;\nimplementation\nprocedure TForm1.DoThing;\nbegin\nend;\n",
        )
        .unwrap();

        let profile = seed_profile("delphi").unwrap();
        let chunks = chunk_file(&file, dir.path(), &profile).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].class_name, "TForm1");
    }

    #[test]
    fn rpg_structural_chunks_respect_block_boundaries() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("prog.rpgle");
        std::fs::write(
            &file,
            "DCL-PROC Main;\n  CALLP Helper();\nEND-PROC;\nDCL-PROC Helper;\nEND-PROC;\n",
        )
        .unwrap();

        let profile = seed_profile("rpg").unwrap();
        let chunks = chunk_file(&file, dir.path(), &profile).unwrap();
        let names: Vec<&str> = chunks.iter().map(|c| c.function_name.as_str()).collect();
        assert!(names.contains(&"Main"));
        assert!(names.contains(&"Helper"));
    }

    #[test]
    fn dfm_special_file_captures_event_handlers() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("Unit1.dfm");
        std::fs::write(
            &file,
            "object Form1: TForm1\n  object Button1: TButton\n    OnClick = Button1Click\n  end\nend\n",
        )
        .unwrap();

        let profile = seed_profile("delphi").unwrap();
        let chunks = chunk_file(&file, dir.path(), &profile).unwrap();
        assert_eq!(chunks.len(), 1);
        let handlers = chunks[0].metadata.get("event_handlers").unwrap().as_array().unwrap();
        assert_eq!(handlers.len(), 1);
        assert_eq!(handlers[0], "Button1Click");
    }
}
