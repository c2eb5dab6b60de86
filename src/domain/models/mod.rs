//! Typed data model for replica auditing.
//!
//! The wire shapes mirror the replica HTTP API (camelCase JSON); identifiers
//! are content hashes, so most ids are plain strings with aliases for intent.

pub mod audit;
pub mod config;
pub mod entity;
pub mod history;
pub mod report;

pub use audit::AuditInfo;
pub use config::CheckConfig;
pub use entity::{Entity, EntityContent, EntityRef};
pub use history::{DeploymentEvent, Pagination, PartialDeploymentHistory};
pub use report::CheckReport;

use std::collections::BTreeMap;

/// Content hash identifying a stored blob.
pub type FileHash = String;

/// Entity identifier; always the content hash of the entity document.
pub type EntityId = FileHash;

/// Category an entity belongs to (e.g. `scene`, `profile`). Open on the wire;
/// the checker iterates a configured list.
pub type EntityType = String;

/// Mutable key resolving to the currently active entity of a type.
pub type Pointer = String;

/// Base URL of one replica, e.g. `https://peer.example/content`.
pub type ServerAddress = String;

/// Epoch milliseconds, matching the replica API.
pub type Timestamp = i64;

/// Active resolution state derived from the reference replica: for each
/// entity type, which entity every live pointer currently resolves to.
pub type ActivePointerMap = BTreeMap<EntityType, BTreeMap<Pointer, EntityId>>;

/// Which entities reference each content hash. Built from active entities
/// plus every entity id itself (the entity document must stay fetchable
/// even after an overwrite).
pub type ReferencedContentMap = BTreeMap<FileHash, Vec<EntityRef>>;
