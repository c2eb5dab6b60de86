//! Type-scoped chunking of work items.
//!
//! The backing query APIs are type-scoped and bounded in query length, so
//! batches never mix entity types and never exceed the configured chunk
//! size. Order within and across chunks preserves the input order, which
//! carries the newest-first semantics of the canonical history.

use std::collections::HashSet;

use crate::domain::models::{
    ActivePointerMap, DeploymentEvent, EntityId, EntityRef, EntityType, Pointer,
};

/// One active pointer together with the entity it is expected to resolve to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerRef {
    /// Type scope of the pointer.
    pub entity_type: EntityType,
    /// The pointer key.
    pub pointer: Pointer,
    /// Entity id the reference replica resolves it to.
    pub entity_id: EntityId,
}

/// Split `items` into chunks of at most `chunk_size`, preserving order.
pub fn split_into_chunks<T: Clone>(items: &[T], chunk_size: usize) -> Vec<Vec<T>> {
    assert!(chunk_size > 0, "chunk_size must be positive");
    items.chunks(chunk_size).map(<[T]>::to_vec).collect()
}

/// Group history events into per-type chunks of deduplicated entity refs.
///
/// Types are visited in the order given; within a type, ids keep their
/// first (newest) position in the history.
pub fn entity_chunks(
    events: &[DeploymentEvent],
    entity_types: &[EntityType],
    chunk_size: usize,
) -> Vec<Vec<EntityRef>> {
    let mut chunks = Vec::new();
    for entity_type in entity_types {
        let mut seen: HashSet<&str> = HashSet::new();
        let refs: Vec<EntityRef> = events
            .iter()
            .filter(|event| &event.entity_type == entity_type)
            .filter(|event| seen.insert(event.entity_id.as_str()))
            .map(|event| EntityRef {
                entity_type: event.entity_type.clone(),
                entity_id: event.entity_id.clone(),
            })
            .collect();
        chunks.extend(split_into_chunks(&refs, chunk_size));
    }
    chunks
}

/// Flatten the active-pointer map into per-type chunks of pointer refs.
pub fn pointer_chunks(active: &ActivePointerMap, chunk_size: usize) -> Vec<Vec<PointerRef>> {
    let mut chunks = Vec::new();
    for (entity_type, pointers) in active {
        let refs: Vec<PointerRef> = pointers
            .iter()
            .map(|(pointer, entity_id)| PointerRef {
                entity_type: entity_type.clone(),
                pointer: pointer.clone(),
                entity_id: entity_id.clone(),
            })
            .collect();
        chunks.extend(split_into_chunks(&refs, chunk_size));
    }
    chunks
}
