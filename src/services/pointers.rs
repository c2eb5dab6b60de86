//! Pointer resolution reconciliation with overwrite-aware tie-breaking.

use std::collections::{BTreeMap, HashMap};

use tracing::info;

use crate::domain::models::{
    ActivePointerMap, CheckConfig, EntityType, Pointer, ServerAddress,
};
use crate::infrastructure::replica::{ReplicaClient, ReplicaError};
use crate::infrastructure::sink::ResultSink;

use super::chunking::{pointer_chunks, PointerRef};
use super::task_runner::run_bounded;

/// Verifies every active pointer resolves to the expected entity on every
/// synchronized replica, treating not-yet-propagated overwrites as benign.
pub struct PointerReconciler<'a> {
    client: &'a ReplicaClient,
    sink: &'a ResultSink,
    config: &'a CheckConfig,
}

impl<'a> PointerReconciler<'a> {
    /// Bundle the collaborators the phase needs.
    pub fn new(client: &'a ReplicaClient, sink: &'a ResultSink, config: &'a CheckConfig) -> Self {
        Self {
            client,
            sink,
            config,
        }
    }

    /// Check all active pointers against every synchronized replica and
    /// return the genuinely failed ones.
    pub async fn check(
        &self,
        active: &ActivePointerMap,
        synced: &[ServerAddress],
    ) -> BTreeMap<Pointer, EntityType> {
        let chunks = pointer_chunks(active, self.config.chunk_size);

        let outcomes = run_bounded(
            "Checking pointers",
            chunks,
            self.config.concurrency,
            |chunk| async move { self.check_chunk(&chunk, synced).await },
        )
        .await;

        let mut failed_pointers = BTreeMap::new();
        let mut overwritten_tally: u64 = 0;
        for (failed, tally) in outcomes {
            overwritten_tally += tally;
            for (pointer, entity_type) in failed {
                failed_pointers.insert(pointer, entity_type);
            }
        }

        info!(overwritten_tally, "checked pointers");
        self.sink
            .log(format!(
                "Checked pointers. {overwritten_tally} were overwritten"
            ))
            .await;
        failed_pointers
    }

    async fn check_chunk(
        &self,
        chunk: &[PointerRef],
        synced: &[ServerAddress],
    ) -> (Vec<(Pointer, EntityType)>, u64) {
        let mut failed = Vec::new();
        let mut overwritten_tally = 0;

        for server in synced {
            match self.resolve_on_server(server, chunk).await {
                Ok((failed_here, tally)) => {
                    failed.extend(failed_here);
                    overwritten_tally += tally;
                }
                Err(err) => {
                    // The whole chunk is unverifiable on this replica.
                    self.sink
                        .failed(format!(
                            "Failed to resolve {} pointers of type {} on {server}: {err}",
                            chunk.len(),
                            chunk[0].entity_type
                        ))
                        .await;
                    failed.extend(
                        chunk
                            .iter()
                            .map(|r| (r.pointer.clone(), r.entity_type.clone())),
                    );
                }
            }
        }

        (failed, overwritten_tally)
    }

    async fn resolve_on_server(
        &self,
        server: &ServerAddress,
        chunk: &[PointerRef],
    ) -> Result<(Vec<(Pointer, EntityType)>, u64), ReplicaError> {
        let entity_type = &chunk[0].entity_type;
        let pointers: Vec<Pointer> = chunk.iter().map(|r| r.pointer.clone()).collect();
        let entities = self
            .client
            .fetch_entities_by_pointer(server, entity_type, &pointers)
            .await?;

        let mut by_pointer: HashMap<&str, &str> = HashMap::new();
        for entity in &entities {
            for pointer in &entity.pointers {
                by_pointer.insert(pointer.as_str(), entity.id.as_str());
            }
        }

        let mut failed = Vec::new();
        let mut overwritten_tally = 0;
        for pointer_ref in chunk {
            let resolved = by_pointer.get(pointer_ref.pointer.as_str()).copied();
            if resolved == Some(pointer_ref.entity_id.as_str()) {
                continue;
            }
            // Disagreement: only a failure when the expected entity has not
            // been overwritten on this replica; otherwise the overwrite
            // simply raced the check.
            let audit = self
                .client
                .fetch_audit_info(server, entity_type, &pointer_ref.entity_id)
                .await?;
            if audit.overwritten_by.is_some() {
                overwritten_tally += 1;
            } else {
                self.sink
                    .failed(format!(
                        "Found a mismatch. Entity in pointer {} was expected to be {}, \
                         but it is {} on {server}",
                        pointer_ref.pointer,
                        pointer_ref.entity_id,
                        resolved.unwrap_or("<nothing>"),
                    ))
                    .await;
                failed.push((pointer_ref.pointer.clone(), pointer_ref.entity_type.clone()));
            }
        }
        Ok((failed, overwritten_tally))
    }
}
