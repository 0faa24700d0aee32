//! The LLM result cache, `(content_hash, result_json, model, created_at)` keyed on
//! `content_hash`. Owned exclusively by this crate; the extractor and the LLM-assisted
//! agent variants are the only other components that touch it, and only through this API.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};

use crate::error::LlmError;

/// Composes `prompt_version ∥ content ∥ language` and hashes it. Uses `sha2` rather than
/// md5 for the content fingerprint, consistent with how content hashes are computed
/// elsewhere in this stack (see DESIGN.md).
pub fn cache_key(prompt_version: &str, content: &str, language: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt_version.as_bytes());
    hasher.update(b"\0");
    hasher.update(content.as_bytes());
    hasher.update(b"\0");
    hasher.update(language.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A content-addressed cache over a local embedded store. Reads may race benignly with
/// writes; writes are serialized by the connection's internal mutex.
pub struct LlmCache {
    conn: Mutex<Connection>,
}

impl LlmCache {
    pub fn open(path: &Path) -> Result<Self, LlmError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LlmError::Config(e.to_string()))?;
        }
        let conn = Connection::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS llm_cache (
                content_hash TEXT PRIMARY KEY,
                result_json TEXT NOT NULL,
                model TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self, LlmError> {
        let conn = Connection::open_in_memory()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS llm_cache (
                content_hash TEXT PRIMARY KEY,
                result_json TEXT NOT NULL,
                model TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, LlmError> {
        let conn = self.conn.lock().expect("llm cache mutex poisoned");
        let mut stmt = conn.prepare("SELECT result_json FROM llm_cache WHERE content_hash = ?1")?;
        let mut rows = stmt.query(params![key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    pub fn put(&self, key: &str, result_json: &str, model: &str) -> Result<(), LlmError> {
        let conn = self.conn.lock().expect("llm cache mutex poisoned");
        conn.execute(
            "INSERT INTO llm_cache (content_hash, result_json, model, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(content_hash) DO UPDATE SET
                result_json = excluded.result_json,
                model = excluded.model,
                created_at = excluded.created_at",
            params![key, result_json, model, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_stable_and_order_sensitive() {
        let a = cache_key("v1", "fn foo() {}", "rust");
        let b = cache_key("v1", "fn foo() {}", "rust");
        let c = cache_key("v2", "fn foo() {}", "rust");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn round_trips_through_store() {
        let cache = LlmCache::open_in_memory().unwrap();
        let key = cache_key("v1", "body", "python");
        assert!(cache.get(&key).unwrap().is_none());
        cache.put(&key, "[]", "test-model").unwrap();
        assert_eq!(cache.get(&key).unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn put_overwrites_on_conflict() {
        let cache = LlmCache::open_in_memory().unwrap();
        let key = cache_key("v1", "body", "python");
        cache.put(&key, "[]", "m1").unwrap();
        cache.put(&key, "[{\"callee\":\"X\"}]", "m2").unwrap();
        assert_eq!(cache.get(&key).unwrap().as_deref(), Some("[{\"callee\":\"X\"}]"));
    }
}
