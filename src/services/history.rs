//! History collection and synchronized-replica classification.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use tracing::{info, warn};

use crate::domain::models::{CheckConfig, DeploymentEvent, ServerAddress};
use crate::infrastructure::replica::ReplicaClient;
use crate::infrastructure::sink::ResultSink;

use super::error::CheckError;
use super::task_runner::run_bounded;

/// Canonical history plus the replicas that agree with it.
#[derive(Debug, Clone)]
pub struct CollectedHistory {
    /// The reference replica's filtered history, newest first.
    pub canonical: Vec<DeploymentEvent>,
    /// Replicas whose filtered history matches the canonical sequence
    /// index for index. The reference replica is always first.
    pub synced_servers: Vec<ServerAddress>,
}

/// First disagreement between two histories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryDivergence {
    /// The histories have different lengths.
    Length {
        /// Canonical length.
        reference: usize,
        /// Other replica's length.
        other: usize,
    },
    /// The histories disagree at one index.
    Event {
        /// First differing index.
        index: usize,
        /// Canonical event at that index.
        reference: DeploymentEvent,
        /// The other replica's event at that index.
        other: DeploymentEvent,
    },
}

/// Compare two filtered histories index for index on
/// `(entity_type, entity_id, timestamp)`. Order-sensitive, exact, no
/// tolerance; `server_name` is ignored (replicas may relay through
/// different origins).
pub fn compare_histories(
    reference: &[DeploymentEvent],
    other: &[DeploymentEvent],
) -> Option<HistoryDivergence> {
    if reference.len() != other.len() {
        return Some(HistoryDivergence::Length {
            reference: reference.len(),
            other: other.len(),
        });
    }
    for (index, (a, b)) in reference.iter().zip(other).enumerate() {
        if a.entity_type != b.entity_type
            || a.entity_id != b.entity_id
            || a.timestamp != b.timestamp
        {
            return Some(HistoryDivergence::Event {
                index,
                reference: a.clone(),
                other: b.clone(),
            });
        }
    }
    None
}

/// Collects every replica's history and classifies which replicas are
/// synchronized with the reference (the first replica that answered).
pub struct HistoryCollector<'a> {
    client: &'a ReplicaClient,
    sink: &'a ResultSink,
    config: &'a CheckConfig,
}

impl<'a> HistoryCollector<'a> {
    /// Bundle the collaborators a collection run needs.
    pub fn new(client: &'a ReplicaClient, sink: &'a ResultSink, config: &'a CheckConfig) -> Self {
        Self {
            client,
            sink,
            config,
        }
    }

    /// Fetch all histories up to the cutoff, filter the deny-list, and
    /// classify synchronized replicas.
    ///
    /// Fatal when fewer than two replicas end up synchronized; a replica
    /// whose history merely diverges is excluded and reported, not fatal.
    pub async fn collect(
        &self,
        servers: &[ServerAddress],
    ) -> Result<CollectedHistory, CheckError> {
        let cutoff = Utc::now().timestamp_millis() - self.config.history_skew_ms;
        self.sink
            .log(format!("Collecting deployment histories up to {cutoff}"))
            .await;

        let outcomes = run_bounded(
            "Collecting histories",
            servers.to_vec(),
            self.config.concurrency,
            |server| async move {
                let result = self.client.fetch_history(&server, cutoff).await;
                (server, result)
            },
        )
        .await;

        let denied: HashSet<&str> = self
            .config
            .denied_entities
            .iter()
            .map(String::as_str)
            .collect();

        let mut histories: HashMap<ServerAddress, Vec<DeploymentEvent>> = HashMap::new();
        for (server, result) in outcomes {
            match result {
                Ok(mut events) => {
                    events.retain(|event| !denied.contains(event.entity_id.as_str()));
                    histories.insert(server, events);
                }
                Err(err) => {
                    warn!(server, %err, "failed to fetch history, excluding replica");
                    self.sink
                        .failed(format!("Failed to fetch history from {server}: {err}"))
                        .await;
                }
            }
        }

        // The first configured replica is the reference; its absence is fatal.
        let Some(reference_server) = servers.iter().find(|s| histories.contains_key(*s)) else {
            return Err(CheckError::InsufficientSyncedReplicas(0));
        };
        let canonical = histories
            .get(reference_server)
            .cloned()
            .unwrap_or_default();
        info!(
            reference = reference_server,
            events = canonical.len(),
            "collected reference history"
        );
        self.sink
            .log(format!("Total length of history {}", canonical.len()))
            .await;

        let mut synced_servers = Vec::new();
        for server in servers {
            let Some(history) = histories.get(server) else {
                continue;
            };
            match compare_histories(&canonical, history) {
                None => synced_servers.push(server.clone()),
                Some(HistoryDivergence::Length { reference, other }) => {
                    warn!(
                        server,
                        reference, other, "history length differs from reference"
                    );
                    self.sink
                        .failed(format!(
                            "History of {server} has {other} events, reference \
                             {reference_server} has {reference}"
                        ))
                        .await;
                }
                Some(HistoryDivergence::Event {
                    index,
                    reference,
                    other,
                }) => {
                    warn!(
                        server,
                        index,
                        found = ?other,
                        expected = ?reference,
                        "history diverges from reference"
                    );
                    self.sink
                        .failed(format!(
                            "History of {server} diverges at index {index}: found \
                             ({}, {}, {}), expected ({}, {}, {})",
                            other.entity_type,
                            other.entity_id,
                            other.timestamp,
                            reference.entity_type,
                            reference.entity_id,
                            reference.timestamp,
                        ))
                        .await;
                }
            }
        }

        if synced_servers.len() == servers.len() {
            info!("all replicas reported the same history");
        } else {
            let out_of_sync: Vec<&ServerAddress> = servers
                .iter()
                .filter(|s| !synced_servers.contains(s))
                .collect();
            warn!(?out_of_sync, "replicas differ from the reference history");
        }

        if synced_servers.len() < 2 {
            self.sink
                .log("Need 2 or more replicas with the same history to continue checks")
                .await;
            return Err(CheckError::InsufficientSyncedReplicas(synced_servers.len()));
        }

        Ok(CollectedHistory {
            canonical,
            synced_servers,
        })
    }
}
