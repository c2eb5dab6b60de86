//! Deployment history records and pagination.

use serde::{Deserialize, Serialize};

use super::{EntityId, EntityType, Timestamp};

/// One append-only history record on a replica. Histories are served newest
/// timestamp first; ordering within a history is significant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentEvent {
    /// Category of the deployed entity.
    pub entity_type: EntityType,
    /// Id of the deployed entity.
    pub entity_id: EntityId,
    /// Name of the replica that originally accepted the deployment.
    pub server_name: String,
    /// When the deployment happened.
    pub timestamp: Timestamp,
}

/// One page of `GET /history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialDeploymentHistory {
    /// Events in this page, newest first.
    pub events: Vec<DeploymentEvent>,
    /// Cursor for the next page.
    pub pagination: Pagination,
}

/// Pagination cursor returned by the history endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Offset of this page.
    pub offset: usize,
    /// Page size.
    pub limit: usize,
    /// Whether another page follows.
    pub more_data: bool,
}
