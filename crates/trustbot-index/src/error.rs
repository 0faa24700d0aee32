//! Error types for chunking, call-edge extraction, and the on-disk code index.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid regex '{pattern}' in profile for '{language}': {source}")]
    InvalidPattern {
        language: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Llm(#[from] trustbot_llm::LlmError),

    #[error("failed to parse extractor response as JSON: {0}")]
    Malformed(String),

    #[error(transparent)]
    Chunk(#[from] ChunkError),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("codebase root does not exist: {0}")]
    RootNotFound(String),

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
