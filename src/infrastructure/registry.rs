//! Replica discovery through a registry endpoint.
//!
//! Used when no explicit server list is configured: the registry returns
//! the known replica domains, which are normalized to https and suffixed
//! with the content path.

use serde::Deserialize;
use tracing::warn;

use crate::domain::models::ServerAddress;

use super::replica::{ReplicaClient, ReplicaError};

/// One replica record as served by the registry.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerRecord {
    /// Domain or base URL of the replica.
    pub address: String,
}

/// Fetch the replica list from `GET {registry_url}/servers`.
///
/// Plain-http entries are skipped with a warning; entries without a scheme
/// get `https://` prepended, and every address is suffixed with `/content`.
pub async fn discover_servers(
    client: &ReplicaClient,
    registry_url: &str,
) -> Result<Vec<ServerAddress>, ReplicaError> {
    let records: Vec<ServerRecord> = client
        .get_json(registry_url.trim_end_matches('/'), "/servers")
        .await?;
    let mut servers = Vec::new();
    for record in records {
        match normalize_address(&record.address) {
            Some(address) => servers.push(address),
            None => warn!(
                address = record.address,
                "registry entry uses plain http, skipping"
            ),
        }
    }
    Ok(servers)
}

fn normalize_address(address: &str) -> Option<ServerAddress> {
    if address.starts_with("http://") {
        return None;
    }
    let base = if address.starts_with("https://") {
        address.to_string()
    } else {
        format!("https://{address}")
    };
    Some(format!("{}/content", base.trim_end_matches('/')))
}
