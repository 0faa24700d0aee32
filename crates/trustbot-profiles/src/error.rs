//! Error type for language-profile loading, generation, and validation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("no profile available for language '{0}'")]
    UnknownLanguage(String),

    #[error("invalid regex '{pattern}' in profile for '{language}': {source}")]
    InvalidPattern {
        language: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to read profile store at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse profile JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("profile generation failed for '{0}': {1}")]
    GenerationFailed(String, String),
}
