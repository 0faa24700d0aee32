//! Configuration: built-in defaults, overlaid by an optional `trustbot.toml`, overlaid by
//! environment variables (loaded from `.env` first via `dotenvy`, then whatever is already
//! in the process environment). Later sources win.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_api_key_env: String,
    pub max_concurrent_llm_calls: usize,
    pub max_concurrent_flows: usize,
    pub code_index_path: PathBuf,
    pub llm_cache_path: PathBuf,
    pub profile_cache_dir: PathBuf,
    pub llm_request_timeout_secs: u64,
    pub retry_max_attempts: u32,
    pub retry_backoff_base: f64,
    pub kg_base_url: String,
    pub kg_database: String,
    pub kg_username_env: String,
    pub kg_password_env: String,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            llm_base_url: "https://api.openai.com/v1/chat/completions".to_string(),
            llm_model: "gpt-4o-mini".to_string(),
            llm_api_key_env: "TRUSTBOT_LLM_API_KEY".to_string(),
            max_concurrent_llm_calls: 4,
            max_concurrent_flows: 4,
            code_index_path: PathBuf::from(".trustbot/index.sqlite"),
            llm_cache_path: PathBuf::from(".trustbot/llm_cache.sqlite"),
            profile_cache_dir: PathBuf::from(".trustbot/profiles"),
            llm_request_timeout_secs: 60,
            retry_max_attempts: 3,
            retry_backoff_base: 1.5,
            kg_base_url: "http://localhost:7474".to_string(),
            kg_database: "neo4j".to_string(),
            kg_username_env: "TRUSTBOT_KG_USERNAME".to_string(),
            kg_password_env: "TRUSTBOT_KG_PASSWORD".to_string(),
        }
    }
}

impl TrustConfig {
    /// Loads defaults, then `trustbot.toml` in `root` if present, then environment overrides.
    /// `.env` is loaded (if present) before reading the environment so local development
    /// doesn't need the variables exported in the shell.
    pub fn load(root: &std::path::Path) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = Self::default();

        let toml_path = root.join("trustbot.toml");
        if toml_path.exists() {
            let text = std::fs::read_to_string(&toml_path)?;
            config = toml::from_str(&text)?;
        }

        if let Ok(v) = std::env::var("TRUSTBOT_LLM_BASE_URL") {
            config.llm_base_url = v;
        }
        if let Ok(v) = std::env::var("TRUSTBOT_LLM_MODEL") {
            config.llm_model = v;
        }
        if let Ok(v) = std::env::var("TRUSTBOT_MAX_CONCURRENT_LLM_CALLS") {
            config.max_concurrent_llm_calls = v.parse().unwrap_or(config.max_concurrent_llm_calls);
        }
        if let Ok(v) = std::env::var("TRUSTBOT_MAX_CONCURRENT_FLOWS") {
            config.max_concurrent_flows = v.parse().unwrap_or(config.max_concurrent_flows);
        }
        if let Ok(v) = std::env::var("TRUSTBOT_KG_BASE_URL") {
            config.kg_base_url = v;
        }
        if let Ok(v) = std::env::var("TRUSTBOT_KG_DATABASE") {
            config.kg_database = v;
        }

        Ok(config)
    }

    pub fn llm_api_key(&self) -> String {
        std::env::var(&self.llm_api_key_env).unwrap_or_default()
    }

    pub fn kg_username(&self) -> Option<String> {
        std::env::var(&self.kg_username_env).ok()
    }

    pub fn kg_password(&self) -> Option<String> {
        std::env::var(&self.kg_password_env).ok()
    }

    pub fn llm_request_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_request_timeout_secs)
    }

    pub fn code_index_path(&self, root: &std::path::Path) -> PathBuf {
        root.join(&self.code_index_path)
    }

    pub fn llm_cache_path(&self, root: &std::path::Path) -> PathBuf {
        root.join(&self.llm_cache_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_self_consistent() {
        let config = TrustConfig::default();
        assert!(config.max_concurrent_flows > 0);
        assert!(config.retry_max_attempts > 0);
    }

    #[test]
    fn trustbot_toml_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("trustbot.toml"), "llm_model = \"custom-model\"\nmax_concurrent_flows = 8\n").unwrap();
        let config = TrustConfig::load(dir.path()).unwrap();
        assert_eq!(config.llm_model, "custom-model");
        assert_eq!(config.max_concurrent_flows, 8);
    }
}
