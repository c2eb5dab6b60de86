//! Entity body reconciliation and reference-state derivation.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use crate::domain::models::{
    ActivePointerMap, CheckConfig, DeploymentEvent, Entity, EntityId, EntityRef, EntityType,
    ReferencedContentMap, ServerAddress,
};
use crate::infrastructure::replica::ReplicaClient;
use crate::infrastructure::sink::ResultSink;

use super::chunking::entity_chunks;
use super::overwritten::OverwrittenSet;
use super::task_runner::{run_bounded_cancellable, CancelFlag};

/// Outputs of the entity phase, consumed by the pointer and content phases.
#[derive(Debug, Clone, Default)]
pub struct EntityReconciliation {
    /// Pointer resolution derived from the reference replica.
    pub active_pointers: ActivePointerMap,
    /// Content hashes referenced by active entities plus all entity ids.
    pub referenced_content: ReferencedContentMap,
    /// Entities whose bodies differ between replicas or could not be
    /// fetched from a non-reference replica.
    pub failed_entities: BTreeMap<EntityId, EntityType>,
}

struct ChunkOutcome {
    index: usize,
    chunk: Vec<EntityRef>,
    /// Reference bodies for the chunk; `None` when the reference fetch
    /// failed structurally and the chunk was skipped.
    reference: Option<Vec<Entity>>,
    failed: Vec<EntityRef>,
}

/// Fetches full entity bodies per chunk, diffs every synchronized replica
/// against the reference, and derives the active-pointer and
/// referenced-content maps from the reference's newest-first entities.
pub struct EntityReconciler<'a> {
    client: &'a ReplicaClient,
    sink: &'a ResultSink,
    config: &'a CheckConfig,
    overwritten: &'a OverwrittenSet,
    cancel: &'a CancelFlag,
}

impl<'a> EntityReconciler<'a> {
    /// Bundle the collaborators the phase needs.
    pub fn new(
        client: &'a ReplicaClient,
        sink: &'a ResultSink,
        config: &'a CheckConfig,
        overwritten: &'a OverwrittenSet,
        cancel: &'a CancelFlag,
    ) -> Self {
        Self {
            client,
            sink,
            config,
            overwritten,
            cancel,
        }
    }

    /// Run the phase over the canonical history.
    ///
    /// Body mismatches are accumulated, not fatal; with `fail_fast`
    /// enabled the cancel flag is raised on the first mismatch and no
    /// further chunks are submitted.
    pub async fn check(
        &self,
        canonical: &[DeploymentEvent],
        synced: &[ServerAddress],
    ) -> EntityReconciliation {
        let chunks = entity_chunks(canonical, &self.config.entity_types, self.config.chunk_size);
        let indexed: Vec<(usize, Vec<EntityRef>)> = chunks.into_iter().enumerate().collect();

        let mut outcomes = run_bounded_cancellable(
            "Checking entities",
            indexed,
            self.config.concurrency,
            self.cancel,
            |(index, chunk)| async move { self.check_chunk(index, chunk, synced).await },
        )
        .await;

        // Derivation must walk the reference entities in canonical
        // (newest-first) order, so chunks are re-applied in submission
        // order regardless of completion order.
        outcomes.sort_by_key(|outcome| outcome.index);

        let mut reconciliation = EntityReconciliation::default();
        for outcome in outcomes {
            for entity_ref in outcome.failed {
                reconciliation
                    .failed_entities
                    .insert(entity_ref.entity_id, entity_ref.entity_type);
            }
            if let Some(reference) = outcome.reference {
                apply_reference_entities(
                    &outcome.chunk,
                    &reference,
                    &mut reconciliation.active_pointers,
                    &mut reconciliation.referenced_content,
                    self.overwritten,
                );
            }
        }
        reconciliation
    }

    async fn check_chunk(
        &self,
        index: usize,
        chunk: Vec<EntityRef>,
        synced: &[ServerAddress],
    ) -> ChunkOutcome {
        let entity_type = chunk[0].entity_type.clone();
        let ids: Vec<EntityId> = chunk.iter().map(|r| r.entity_id.clone()).collect();
        let reference_server = &synced[0];

        let reference = match self
            .client
            .fetch_entities_by_id(reference_server, &entity_type, &ids)
            .await
        {
            Ok(entities) => entities,
            Err(err) => {
                self.sink
                    .failed(format!(
                        "Failed to fetch {} entities of type {entity_type} from reference \
                         {reference_server}: {err}",
                        ids.len()
                    ))
                    .await;
                let failed = chunk.clone();
                return ChunkOutcome {
                    index,
                    chunk,
                    reference: None,
                    failed,
                };
            }
        };

        // Batch-size validation at the boundary: a short answer means the
        // reference itself is missing entities, so comparing would only
        // produce noise.
        if reference.len() != ids.len() {
            self.sink
                .failed(format!(
                    "Expected to find {} entities when searching for ids {ids:?} on \
                     {reference_server}. Instead found {}",
                    ids.len(),
                    reference.len()
                ))
                .await;
            let failed = chunk.clone();
            return ChunkOutcome {
                index,
                chunk,
                reference: None,
                failed,
            };
        }

        let mut failed = Vec::new();
        for server in &synced[1..] {
            match self
                .client
                .fetch_entities_by_id(server, &entity_type, &ids)
                .await
            {
                Ok(entities) => {
                    if entities != reference {
                        warn!(
                            server,
                            reference = reference_server.as_str(),
                            "entity bodies differ"
                        );
                        self.sink
                            .failed(format!(
                                "Found a mismatch. Entities with ids {ids:?} are different \
                                 in {reference_server} and {server}"
                            ))
                            .await;
                        failed.extend(chunk.iter().cloned());
                        if self.config.fail_fast {
                            self.cancel.cancel();
                        }
                    }
                }
                Err(err) => {
                    self.sink
                        .failed(format!(
                            "Failed to fetch entities with ids {ids:?} from {server}: {err}"
                        ))
                        .await;
                    failed.extend(chunk.iter().cloned());
                }
            }
        }

        ChunkOutcome {
            index,
            chunk,
            reference: Some(reference),
            failed,
        }
    }
}

/// Apply one chunk of reference entities, in canonical order, to the active
/// maps.
///
/// An entity none of whose pointers are active yet claims all its pointers
/// and registers its content hashes; otherwise it was overwritten by a
/// newer entity seen earlier in the walk. Every entity id is registered in
/// referenced-content regardless: the entity document itself must stay
/// fetchable even when overwritten.
pub(crate) fn apply_reference_entities(
    chunk: &[EntityRef],
    entities: &[Entity],
    active: &mut ActivePointerMap,
    referenced: &mut ReferencedContentMap,
    overwritten: &OverwrittenSet,
) {
    let by_id: HashMap<&str, &Entity> = entities
        .iter()
        .map(|entity| (entity.id.as_str(), entity))
        .collect();

    for entity_ref in chunk {
        let Some(entity) = by_id.get(entity_ref.entity_id.as_str()) else {
            continue;
        };
        referenced.insert(
            entity.id.clone(),
            vec![EntityRef {
                entity_type: entity_ref.entity_type.clone(),
                entity_id: entity.id.clone(),
            }],
        );

        let type_map = active.entry(entity_ref.entity_type.clone()).or_default();
        let any_pointer_taken = entity
            .pointers
            .iter()
            .any(|pointer| type_map.contains_key(pointer));

        if any_pointer_taken {
            overwritten.insert(&entity.id);
            continue;
        }

        for pointer in &entity.pointers {
            type_map.insert(pointer.clone(), entity.id.clone());
        }
        for content in &entity.content {
            referenced
                .entry(content.hash.clone())
                .or_default()
                .push(EntityRef {
                    entity_type: entity_ref.entity_type.clone(),
                    entity_id: entity.id.clone(),
                });
        }
    }
}
