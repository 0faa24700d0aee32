//! A [`KgStore`] backed by Neo4j's HTTP transactional query endpoint.
//!
//! The knowledge graph this project validates against is conventionally reached over the
//! Bolt protocol, but no crate in this workspace's dependency tree speaks Bolt. Neo4j also
//! exposes the same Cypher surface over plain HTTP (`POST /db/{name}/tx/commit`), which is
//! reachable with the `reqwest` client already used for the LLM provider. This store issues
//! the same three read-only query shapes the original tool used, just transported as JSON
//! over HTTP instead of a native driver session.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use trustbot_core::{guard_read_only, FlowNode, KgCallsEdge, KgError, KgStore, SnippetNode};

pub struct HttpKgStore {
    client: reqwest::Client,
    tx_commit_url: String,
    auth: Option<(String, String)>,
}

impl HttpKgStore {
    /// `base_url` is the server root, e.g. `http://localhost:7474`; `database` is the Neo4j
    /// database name (`neo4j` unless multi-database is in use).
    pub fn new(base_url: &str, database: &str, username: Option<String>, password: Option<String>) -> Self {
        let tx_commit_url = format!("{}/db/{}/tx/commit", base_url.trim_end_matches('/'), database);
        let auth = match (username, password) {
            (Some(u), Some(p)) => Some((u, p)),
            _ => None,
        };
        Self { client: reqwest::Client::new(), tx_commit_url, auth }
    }

    async fn run(&self, flow_key: &str, statement: &str) -> Result<Vec<Value>, KgError> {
        guard_read_only(statement)?;

        let body = json!({
            "statements": [{ "statement": statement, "parameters": { "key": flow_key } }]
        });

        let mut request = self.client.post(&self.tx_commit_url).json(&body);
        if let Some((user, pass)) = &self.auth {
            request = request.basic_auth(user, Some(pass));
        }

        let response = request.send().await.map_err(|e| KgError::Transient { flow_key: flow_key.to_string(), source: e.into() })?;

        let parsed: TxCommitResponse = response
            .json()
            .await
            .map_err(|e| KgError::Transient { flow_key: flow_key.to_string(), source: e.into() })?;

        if let Some(err) = parsed.errors.into_iter().next() {
            return Err(KgError::Transient {
                flow_key: flow_key.to_string(),
                source: anyhow::anyhow!("{}: {}", err.code, err.message),
            });
        }

        let Some(result) = parsed.results.into_iter().next() else {
            return Ok(Vec::new());
        };

        Ok(result
            .data
            .into_iter()
            .map(|row| {
                let mut obj = serde_json::Map::new();
                for (column, value) in result.columns.iter().zip(row.row.into_iter()) {
                    obj.insert(column.clone(), value);
                }
                Value::Object(obj)
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct TxCommitResponse {
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    columns: Vec<String>,
    data: Vec<TxRow>,
}

#[derive(Debug, Deserialize)]
struct TxRow {
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TxError {
    code: String,
    message: String,
}

fn as_props(value: Option<&Value>) -> HashMap<String, Value> {
    match value {
        Some(Value::Object(map)) => map.clone().into_iter().collect(),
        _ => HashMap::new(),
    }
}

#[async_trait]
impl KgStore for HttpKgStore {
    async fn fetch_flow(&self, flow_key: &str) -> Result<FlowNode, KgError> {
        let rows = self
            .run(flow_key, "MATCH (ef:ExecutionFlow {key: $key}) RETURN properties(ef) AS props")
            .await?;
        let row = rows.first().ok_or_else(|| KgError::FlowNotFound(flow_key.to_string()))?;
        Ok(FlowNode { flow_key: flow_key.to_string(), properties: as_props(row.get("props")) })
    }

    async fn fetch_participants(&self, flow_key: &str) -> Result<Vec<SnippetNode>, KgError> {
        let rows = self
            .run(
                flow_key,
                "MATCH (ef:ExecutionFlow {key: $key})<-[r:PARTICIPATES_IN_FLOW]-(s:Snippet) \
                 RETURN properties(s) AS props, coalesce(r.starts_flow, false) AS is_root",
            )
            .await?;

        if rows.is_empty() {
            return Err(KgError::NoParticipants(flow_key.to_string()));
        }

        Ok(rows
            .into_iter()
            .map(|row| SnippetNode {
                properties: as_props(row.get("props")),
                is_root: row.get("is_root").and_then(Value::as_bool).unwrap_or(false),
            })
            .collect())
    }

    async fn fetch_calls(&self, flow_key: &str) -> Result<Vec<KgCallsEdge>, KgError> {
        let rows = self
            .run(
                flow_key,
                "MATCH (ef:ExecutionFlow {key: $key})<-[:PARTICIPATES_IN_FLOW]-(s:Snippet) \
                 OPTIONAL MATCH (s)-[c:CALLS]->(target:Snippet) \
                 RETURN s.key AS caller_key, target.key AS callee_key, \
                        c.execution_order AS execution_order",
            )
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let caller_key = row.get("caller_key")?.as_str()?.to_string();
                let callee_key = row.get("callee_key").and_then(Value::as_str)?.to_string();
                let execution_order = row.get("execution_order").and_then(Value::as_i64);
                Some(KgCallsEdge { caller_key, callee_key, execution_order })
            })
            .collect())
    }
}
