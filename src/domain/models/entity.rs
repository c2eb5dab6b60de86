//! Immutable content-addressed entity documents.

use serde::{Deserialize, Serialize};

use super::{EntityId, EntityType, FileHash, Pointer, Timestamp};

/// A deployed entity document. Immutable once deployed; its id is the hash
/// of its own content, so two replicas holding the same id must hold
/// byte-identical documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Content hash of the entity document.
    pub id: EntityId,
    /// Entity category.
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Pointers this entity claims. The newest entity claiming a pointer
    /// owns it; older claimants are implicitly overwritten.
    pub pointers: Vec<Pointer>,
    /// Deployment timestamp recorded in the document.
    pub timestamp: Timestamp,
    /// Files referenced by this entity.
    #[serde(default)]
    pub content: Vec<EntityContent>,
    /// Free-form metadata. Compared structurally (object key order does not
    /// matter) when diffing replicas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// One file referenced by an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityContent {
    /// Path of the file within the entity.
    pub file: String,
    /// Content hash of the file.
    pub hash: FileHash,
}

/// Lightweight `(type, id)` reference to an entity, used for chunking and
/// for the referenced-content map.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef {
    /// Entity category.
    pub entity_type: EntityType,
    /// Entity identifier.
    pub entity_id: EntityId,
}
