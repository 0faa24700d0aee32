//! trustbot-llm — the LLM client, cache, and JSON-extraction utility. Exclusively
//! owns the LLM semaphore and the LLM cache; every other crate that needs the LLM
//! goes through [`LlmClient`].

pub mod cache;
pub mod client;
pub mod error;
pub mod json;

pub use cache::{cache_key, LlmCache};
pub use client::{ChatMessage, HttpLlmProvider, LlmClient, LlmConfig, LlmProvider};
pub use error::LlmError;
pub use json::extract_json;
