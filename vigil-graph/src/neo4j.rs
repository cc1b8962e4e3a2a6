//! Neo4j graph store over the transactional HTTP API
//!
//! Statements go to `POST {endpoint}/db/{database}/tx/commit` with basic
//! auth. Neo4j reports query failures with HTTP 200 and a non-empty
//! `errors` array, so both the status and the body are checked.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::{ConnectionUpsert, GraphError, GraphStore};

/// Neo4j connection configuration
#[derive(Debug, Clone)]
pub struct Neo4jConfig {
    /// HTTP endpoint (default: http://127.0.0.1:7474)
    pub endpoint: String,
    /// Database name
    pub database: String,
    pub user: String,
    pub password: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:7474".to_string(),
            database: "neo4j".to_string(),
            user: "neo4j".to_string(),
            password: "password".to_string(),
            timeout_secs: 10,
        }
    }
}

const UPSERT_CONNECTION: &str = "\
MERGE (src:Host {address: $src_address}) \
SET src.ip = $src_ip, src.port = $src_port, src.likelihood = $src_likelihood \
MERGE (dst:Host {address: $dst_address}) \
SET dst.ip = $dst_ip, dst.port = $dst_port, dst.likelihood = $dst_likelihood \
MERGE (src)-[c:CONNECTED]->(dst) \
SET c.likelihood = $likelihood";

/// Neo4j-backed graph store
pub struct Neo4jStore {
    client: reqwest::Client,
    config: Neo4jConfig,
}

impl Neo4jStore {
    pub fn new(config: Neo4jConfig) -> Result<Self, GraphError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn commit_url(&self) -> String {
        format!(
            "{}/db/{}/tx/commit",
            self.config.endpoint.trim_end_matches('/'),
            self.config.database
        )
    }

    async fn execute(
        &self,
        statement: &str,
        parameters: serde_json::Value,
    ) -> Result<(), GraphError> {
        let body = json!({
            "statements": [
                {"statement": statement, "parameters": parameters}
            ]
        });

        debug!("neo4j: {statement}");
        let response = self
            .client
            .post(self.commit_url())
            .basic_auth(&self.config.user, Some(&self.config.password))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(GraphError::Server { status, message });
        }

        let json: serde_json::Value = response.json().await?;
        if let Some(error) = json["errors"].as_array().and_then(|errors| errors.first()) {
            let message = error["message"].as_str().unwrap_or("unknown error");
            return Err(GraphError::Query(message.to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn ping(&self) -> Result<(), GraphError> {
        self.execute("RETURN 1", json!({})).await
    }

    async fn clear(&self) -> Result<(), GraphError> {
        self.execute("MATCH (n) DETACH DELETE n", json!({})).await
    }

    async fn upsert_connection(&self, upsert: &ConnectionUpsert) -> Result<(), GraphError> {
        let parameters = json!({
            "src_address": upsert.source.address,
            "src_ip": upsert.source.ip,
            "src_port": upsert.source.port,
            "src_likelihood": upsert.source.likelihood,
            "dst_address": upsert.destination.address,
            "dst_ip": upsert.destination.ip,
            "dst_port": upsert.destination.port,
            "dst_likelihood": upsert.destination.likelihood,
            "likelihood": upsert.likelihood,
        });
        self.execute(UPSERT_CONNECTION, parameters).await
    }
}
