//! Per-entity, per-replica audit metadata.

use serde::{Deserialize, Serialize};

use super::{EntityId, FileHash, Timestamp};

/// Audit metadata a replica keeps for one entity.
///
/// `overwritten_by` is set asynchronously once the replica observes a newer
/// entity claiming one of the same pointers; propagation across replicas is
/// not instantaneous, which is the principal source of benign divergence
/// between otherwise-synchronized replicas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditInfo {
    /// Entity format version.
    pub version: String,
    /// When this replica recorded the deployment.
    pub deployed_timestamp: Timestamp,
    /// Signature chain authorizing the deployment. Compared structurally.
    pub auth_chain: serde_json::Value,
    /// Id of the newer entity that superseded this one, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overwritten_by: Option<EntityId>,
    /// Metadata preserved from a legacy migration, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_metadata: Option<serde_json::Value>,
    /// Content hashes of this entity that were blacklisted on the replica.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blacklisted_content: Option<Vec<FileHash>>,
}
