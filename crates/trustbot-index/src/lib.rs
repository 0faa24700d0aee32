//! trustbot-index — turns a codebase into queryable structure: regex-driven chunking
//! (no tree-sitter, no AST; the whole point is that a language's profile is enough),
//! call-edge extraction from each chunk, and a SQLite-backed function-name index the
//! source-derivation agent traverses.

pub mod chunker;
pub mod error;
pub mod extractor;
pub mod store;

pub use chunker::{chunk_codebase, chunk_file, Chunk};
pub use error::{ChunkError, ExtractError, IndexError};
pub use extractor::{extract_calls, CallEdge};
pub use store::{CodeIndex, IndexStats, IndexedEdge, IndexedFunction};
