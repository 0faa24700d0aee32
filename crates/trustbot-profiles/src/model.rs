//! The language profile shape: everything the chunker and call-edge extractor need to
//! handle one language without a dedicated parser for it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// How a language resolves a forward-declared function to its later definition — e.g.
/// Delphi's `interface`/`implementation` split, where the `interface` section only lists
/// signatures and the real bodies live past the `implementation` keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardDeclarationConfig {
    pub keyword: String,
    pub strategy: String,
}

/// A file type that needs its own chunking strategy rather than the language's regular
/// function/class patterns — e.g. a Delphi `.dfm` form descriptor, whose UI objects and
/// event-handler bindings are chunked as form metadata, not as source functions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialFileConfig {
    pub extension: String,
    pub parser_type: String,
    pub object_pattern: String,
    pub event_pattern: String,
    #[serde(default)]
    pub metadata_keys: Vec<String>,
}

/// An open/close regex pair that delimits a structural block (procedure, subroutine, data
/// structure, ...) for languages whose functions don't end at the next top-level
/// definition but at an explicit closing keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRuleConfig {
    pub block_type: String,
    pub open_pattern: String,
    pub close_pattern: String,
    #[serde(default = "default_name_group")]
    pub name_group: String,
}

fn default_name_group() -> String {
    "name".to_string()
}

/// Everything the chunker and extractor need to process one language's source files
/// without an AST parser: where functions and classes start, how to skip past
/// forward declarations, which file types need bespoke handling, which tokens are never
/// calls, and the wording the extractor should add to its prompt for this language.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageProfile {
    pub language: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub file_extensions: Vec<String>,
    pub function_def_patterns: Vec<String>,
    #[serde(default)]
    pub class_def_patterns: Vec<String>,
    #[serde(default)]
    pub named_regex_groups: HashMap<String, String>,
    #[serde(default)]
    pub forward_declaration_rules: Option<ForwardDeclarationConfig>,
    #[serde(default)]
    pub special_file_types: Vec<SpecialFileConfig>,
    #[serde(default)]
    pub block_rules: Vec<BlockRuleConfig>,
    #[serde(default)]
    pub llm_call_prompt: String,
    #[serde(default)]
    pub skip_tokens: Vec<String>,
    #[serde(default)]
    pub supports_bare_identifiers: bool,
    #[serde(default)]
    pub bare_id_negative_lookahead: String,
    #[serde(default)]
    pub call_keyword_patterns: Vec<String>,
    #[serde(default)]
    pub call_pattern_examples: Vec<String>,
    #[serde(default)]
    pub non_call_examples: Vec<String>,
    #[serde(default = "default_single_comment")]
    pub single_line_comment: String,
    #[serde(default = "default_ml_open")]
    pub multi_line_comment_open: String,
    #[serde(default = "default_ml_close")]
    pub multi_line_comment_close: String,
    #[serde(default = "default_string_delims")]
    pub string_delimiters: Vec<String>,

    /// Populated once a profile has been generated or loaded against a specific
    /// codebase; empty for a freshly-built seed profile.
    #[serde(default)]
    pub codebase_hash: String,
    #[serde(default)]
    pub source_file_count: usize,
    #[serde(default)]
    pub generated_at: String,
    #[serde(default)]
    pub validation_coverage: f64,
}

fn default_single_comment() -> String {
    "//".to_string()
}
fn default_ml_open() -> String {
    "/*".to_string()
}
fn default_ml_close() -> String {
    "*/".to_string()
}
fn default_string_delims() -> Vec<String> {
    vec!["\"".to_string()]
}

impl Default for LanguageProfile {
    fn default() -> Self {
        Self {
            language: String::new(),
            aliases: Vec::new(),
            file_extensions: Vec::new(),
            function_def_patterns: Vec::new(),
            class_def_patterns: Vec::new(),
            named_regex_groups: HashMap::from([("name".to_string(), "name".to_string())]),
            forward_declaration_rules: None,
            special_file_types: Vec::new(),
            block_rules: Vec::new(),
            llm_call_prompt: String::new(),
            skip_tokens: Vec::new(),
            supports_bare_identifiers: false,
            bare_id_negative_lookahead: String::new(),
            call_keyword_patterns: Vec::new(),
            call_pattern_examples: Vec::new(),
            non_call_examples: Vec::new(),
            single_line_comment: default_single_comment(),
            multi_line_comment_open: default_ml_open(),
            multi_line_comment_close: default_ml_close(),
            string_delimiters: default_string_delims(),
            codebase_hash: String::new(),
            source_file_count: 0,
            generated_at: String::new(),
            validation_coverage: 0.0,
        }
    }
}

impl LanguageProfile {
    pub fn matches_extension(&self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        self.file_extensions.iter().any(|e| e.to_ascii_lowercase() == ext)
    }

    pub fn special_file_for(&self, ext: &str) -> Option<&SpecialFileConfig> {
        let ext = ext.to_ascii_lowercase();
        self.special_file_types.iter().find(|s| s.extension.to_ascii_lowercase() == ext)
    }
}
