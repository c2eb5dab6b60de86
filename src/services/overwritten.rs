//! Run-scoped accumulator of entities known to be overwritten.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::domain::models::EntityId;

/// Append-only set of entity ids confirmed overwritten on at least one
/// replica. Created at run start and passed to every phase; the entity
/// reconciler and audit reconciler insert, the content checker consults it
/// to exempt content that may legitimately be gone.
///
/// An id, once inserted, is never removed within a run. Readers must
/// tolerate late arrival: an entity may be classified overwritten after
/// some other phase already looked it up.
#[derive(Debug, Clone, Default)]
pub struct OverwrittenSet {
    inner: Arc<Mutex<HashSet<EntityId>>>,
}

impl OverwrittenSet {
    /// Record an entity as overwritten.
    pub fn insert(&self, entity_id: &str) {
        self.inner
            .lock()
            .expect("overwritten set poisoned")
            .insert(entity_id.to_string());
    }

    /// Whether the entity has been observed overwritten.
    pub fn contains(&self, entity_id: &str) -> bool {
        self.inner
            .lock()
            .expect("overwritten set poisoned")
            .contains(entity_id)
    }

    /// Number of entities classified overwritten so far.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("overwritten set poisoned").len()
    }

    /// Whether nothing has been classified overwritten yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
