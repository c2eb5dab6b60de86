//! Replica HTTP client.
//!
//! One client serves the whole run: connection pooling lives in the inner
//! `reqwest::Client`, every operation goes through the retry policy, and
//! every response is deserialized into a typed shape at this boundary.

use std::time::Duration;

use anyhow::Context;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::domain::models::{
    AuditInfo, DeploymentEvent, Entity, EntityId, EntityType, FileHash,
    PartialDeploymentHistory, Pointer, Timestamp,
};

use super::error::ReplicaError;
use super::retry::RetryPolicy;

/// Response entry of `GET /available-content`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AvailabilityEntry {
    /// Queried content hash.
    pub cid: FileHash,
    /// Whether the replica can serve it.
    pub available: bool,
}

/// HTTP transport for one replica cluster.
pub struct ReplicaClient {
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl ReplicaClient {
    /// Build a client with the given retry policy and per-request timeout.
    pub fn new(retry: RetryPolicy, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, retry })
    }

    /// Whether the replica answers its status endpoint.
    pub async fn is_up(&self, server: &str) -> bool {
        self.get_json::<serde_json::Value>(server, "/status")
            .await
            .is_ok()
    }

    /// Fetch the full deployment history up to `to`, following pagination
    /// until the server reports no more data.
    pub async fn fetch_history(
        &self,
        server: &str,
        to: Timestamp,
    ) -> Result<Vec<DeploymentEvent>, ReplicaError> {
        let mut events = Vec::new();
        let mut offset = 0;
        loop {
            debug!(server, offset, "fetching history page");
            let page: PartialDeploymentHistory = self
                .get_json(server, &format!("/history?offset={offset}&to={to}"))
                .await?;
            events.extend(page.events);
            if !page.pagination.more_data {
                break;
            }
            offset = page.pagination.offset + page.pagination.limit;
        }
        Ok(events)
    }

    /// Fetch entity bodies by id. The result is sorted by id so two fetches
    /// of the same ids on different replicas compare deterministically.
    pub async fn fetch_entities_by_id(
        &self,
        server: &str,
        entity_type: &EntityType,
        ids: &[EntityId],
    ) -> Result<Vec<Entity>, ReplicaError> {
        let query = repeated_query("id", ids);
        let mut entities: Vec<Entity> = self
            .get_json(server, &format!("/entities/{entity_type}?{query}"))
            .await?;
        entities.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entities)
    }

    /// Fetch the entities currently resolving the given pointers.
    pub async fn fetch_entities_by_pointer(
        &self,
        server: &str,
        entity_type: &EntityType,
        pointers: &[Pointer],
    ) -> Result<Vec<Entity>, ReplicaError> {
        let query = repeated_query("pointer", pointers);
        self.get_json(server, &format!("/entities/{entity_type}?{query}"))
            .await
    }

    /// Fetch the audit record a replica keeps for one entity.
    pub async fn fetch_audit_info(
        &self,
        server: &str,
        entity_type: &EntityType,
        entity_id: &str,
    ) -> Result<AuditInfo, ReplicaError> {
        self.get_json(server, &format!("/audit/{entity_type}/{entity_id}"))
            .await
    }

    /// Ask a replica which of the given hashes it can serve.
    pub async fn fetch_availability(
        &self,
        server: &str,
        hashes: &[FileHash],
    ) -> Result<Vec<AvailabilityEntry>, ReplicaError> {
        let query = repeated_query("cid", hashes);
        self.get_json(server, &format!("/available-content?{query}"))
            .await
    }

    /// Download the raw bytes of one content blob.
    pub async fn fetch_content(
        &self,
        server: &str,
        hash: &str,
    ) -> Result<Vec<u8>, ReplicaError> {
        let path = format!("/contents/{hash}");
        let url = format!("{server}{path}");
        self.retry
            .execute(&url, || {
                let url = url.clone();
                let path = path.clone();
                async move {
                    let response = self.http.get(&url).send().await.map_err(|source| {
                        ReplicaError::Network {
                            server: server.to_string(),
                            source,
                        }
                    })?;
                    let status = response.status();
                    if !status.is_success() {
                        return Err(ReplicaError::Status {
                            server: server.to_string(),
                            path,
                            status,
                        });
                    }
                    let bytes = response.bytes().await.map_err(|source| {
                        ReplicaError::Network {
                            server: server.to_string(),
                            source,
                        }
                    })?;
                    Ok(bytes.to_vec())
                }
            })
            .await
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        server: &str,
        path_and_query: &str,
    ) -> Result<T, ReplicaError> {
        let url = format!("{server}{path_and_query}");
        self.retry
            .execute(&url, || {
                let url = url.clone();
                let path = path_and_query.to_string();
                async move {
                    let response = self.http.get(&url).send().await.map_err(|source| {
                        ReplicaError::Network {
                            server: server.to_string(),
                            source,
                        }
                    })?;
                    let status = response.status();
                    if !status.is_success() {
                        return Err(ReplicaError::Status {
                            server: server.to_string(),
                            path,
                            status,
                        });
                    }
                    response
                        .json::<T>()
                        .await
                        .map_err(|source| ReplicaError::Decode {
                            server: server.to_string(),
                            source,
                        })
                }
            })
            .await
    }
}

/// Build a `key=a&key=b` query string for the replica APIs' repeated keys.
///
/// Values are interpolated verbatim: the ids, hashes, coordinates and
/// wallet addresses in play never contain `&`, `=` or other characters
/// that would need percent-encoding.
fn repeated_query(key: &str, values: &[String]) -> String {
    values
        .iter()
        .map(|value| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}
