//! Subcommand implementations, wiring the library crates together behind the CLI.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use trustbot_agents::Orchestrator;
use trustbot_core::AliasTable;
use trustbot_index::{chunk_codebase, extract_calls, CodeIndex};
use trustbot_llm::{HttpLlmProvider, LlmCache, LlmClient, LlmConfig};

use crate::config::TrustConfig;
use crate::kg_store::HttpKgStore;

fn build_llm_client(config: &TrustConfig) -> LlmClient {
    let llm_config = LlmConfig {
        endpoint: config.llm_base_url.clone(),
        api_key: config.llm_api_key(),
        model: config.llm_model.clone(),
        max_concurrent_calls: config.max_concurrent_llm_calls,
        request_timeout: config.llm_request_timeout(),
    };
    LlmClient::new(Box::new(HttpLlmProvider::new(&llm_config)), config.max_concurrent_llm_calls)
}

/// Builds (or rebuilds) the on-disk code index: chunks every recognized file, records one
/// row per named function/class, then extracts call edges chunk by chunk and stores them
/// alongside the function table.
pub async fn index(root: &Path, config: &TrustConfig) -> anyhow::Result<()> {
    let profiles = trustbot_profiles::all_seed_profiles();

    let index_path = config.code_index_path(root);
    if let Some(parent) = index_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let index = CodeIndex::open(&index_path)?;
    let stats = index.build(root, &profiles)?;
    tracing::info!(functions = stats.functions, files = stats.files, duration_seconds = stats.duration_seconds, "indexed codebase");

    let chunks = chunk_codebase(root, &profiles);
    let known_names: Vec<String> = chunks
        .iter()
        .filter(|c| !c.function_name.is_empty())
        .map(|c| c.function_name.clone())
        .collect();

    let llm = Arc::new(build_llm_client(config));
    let cache_path = config.llm_cache_path(root);
    let cache = LlmCache::open(&cache_path).ok().map(Arc::new);

    let chunks_by_id: HashMap<String, &trustbot_index::Chunk> = chunks.iter().map(|c| (c.chunk_id(), c)).collect();

    let mut chunks_by_language: HashMap<String, Vec<trustbot_index::Chunk>> = HashMap::new();
    for chunk in &chunks {
        chunks_by_language.entry(chunk.language.clone()).or_default().push(chunk.clone());
    }

    let mut resolved: Vec<(String, String, f64)> = Vec::new();
    for (language, language_chunks) in &chunks_by_language {
        let profile = profiles.get(language);
        let edges = extract_calls(language_chunks, &known_names, profile, llm.clone(), cache.clone()).await;
        resolved.extend(edges.iter().filter_map(|e| {
            let caller = chunks_by_id.get(&e.caller_chunk_id)?;
            if caller.function_name.is_empty() {
                return None;
            }
            Some((caller.function_name.clone(), e.callee.clone(), e.confidence))
        }));
    }

    let stored = index.store_edges(&resolved)?;
    tracing::info!(edges = stored, "stored call edges");
    println!("indexed {} functions across {} files, {} call edges", stats.functions, stats.files, stored);

    Ok(())
}

/// Detects languages present in the repository and generates (or refreshes, from cache) a
/// chunking profile for each, optionally restricted to a single language.
pub async fn profile(root: &Path, config: &TrustConfig, only_language: Option<&str>) -> anyhow::Result<()> {
    let llm = build_llm_client(config);
    let profiles = trustbot_profiles::profiling::run(&llm, root).await;

    for (language, profile) in &profiles {
        if let Some(only) = only_language {
            if language != only {
                continue;
            }
        }
        println!("{language}: {} patterns, {} block rules", profile.function_def_patterns.len(), profile.block_rules.len());
    }

    Ok(())
}

/// Validates one or more flows against the knowledge graph, printing a summary report.
pub async fn validate(root: &Path, config: &TrustConfig, flow_keys: &[String], project: Option<String>, run: Option<String>) -> anyhow::Result<()> {
    if flow_keys.is_empty() {
        anyhow::bail!("no flow keys given");
    }

    let index_path = config.code_index_path(root);
    let index = Arc::new(CodeIndex::open(&index_path)?);

    let kg = Arc::new(HttpKgStore::new(&config.kg_base_url, &config.kg_database, config.kg_username(), config.kg_password()));

    let orchestrator = Orchestrator::new(kg, index, root.to_path_buf(), AliasTable::default(), config.max_concurrent_flows);

    if let Some(project) = &project {
        tracing::info!(project, run = run.as_deref().unwrap_or(""), "validating project flows");
    }

    let outcomes = orchestrator.validate_flows(flow_keys, None).await;

    for (key, outcome) in flow_keys.iter().zip(&outcomes) {
        let v = &outcome.verification;
        println!(
            "{key}: graph_trust={:.2} flow_trust={:.2} confirmed={} phantom={} missing={} conflicted={}",
            v.graph_trust,
            v.flow_trust,
            v.confirmed.len(),
            v.phantom.len(),
            v.missing.len(),
            v.conflicted.len(),
        );
        if let Some(analysis) = &outcome.analysis {
            for pattern in &analysis.systemic_patterns {
                println!("  - {pattern}");
            }
        }
    }

    let project_trust = trustbot_agents::project_trust(&outcomes);
    println!("project trust: {project_trust:.2}");

    Ok(())
}
