//! Audit metadata reconciliation with the race-tolerant overwrite rule.

use std::collections::BTreeMap;

use futures::future;

use crate::domain::models::{
    AuditInfo, CheckConfig, DeploymentEvent, EntityId, EntityType, ServerAddress,
};
use crate::infrastructure::replica::{ReplicaClient, ReplicaError};
use crate::infrastructure::sink::ResultSink;

use super::overwritten::OverwrittenSet;
use super::task_runner::run_bounded;

/// The parts of two audit records that must match exactly, before the
/// overwrite race rule is considered.
pub(crate) fn immutable_props_match(a: &AuditInfo, b: &AuditInfo) -> bool {
    a.version == b.version
        && a.deployed_timestamp == b.deployed_timestamp
        && a.auth_chain == b.auth_chain
        && a.original_metadata == b.original_metadata
}

/// Compares per-entity audit metadata across replicas, feeding observed
/// overwrites into the shared overwritten set.
pub struct AuditReconciler<'a> {
    client: &'a ReplicaClient,
    sink: &'a ResultSink,
    config: &'a CheckConfig,
    overwritten: &'a OverwrittenSet,
}

impl<'a> AuditReconciler<'a> {
    /// Bundle the collaborators the phase needs.
    pub fn new(
        client: &'a ReplicaClient,
        sink: &'a ResultSink,
        config: &'a CheckConfig,
        overwritten: &'a OverwrittenSet,
    ) -> Self {
        Self {
            client,
            sink,
            config,
            overwritten,
        }
    }

    /// Compare audit info for every canonical event across all
    /// synchronized replicas.
    pub async fn check(
        &self,
        canonical: &[DeploymentEvent],
        synced: &[ServerAddress],
    ) -> BTreeMap<EntityId, EntityType> {
        let outcomes = run_bounded(
            "Checking audit info",
            canonical.to_vec(),
            self.config.concurrency,
            |event| async move { self.check_event(&event, synced).await },
        )
        .await;

        outcomes.into_iter().flatten().collect()
    }

    async fn check_event(
        &self,
        event: &DeploymentEvent,
        synced: &[ServerAddress],
    ) -> Option<(EntityId, EntityType)> {
        let fetches = synced.iter().map(|server| {
            self.client
                .fetch_audit_info(server, &event.entity_type, &event.entity_id)
        });
        let results = future::join_all(fetches).await;

        let reference_server = &synced[0];
        let reference = match &results[0] {
            Ok(audit) => audit,
            Err(err) => {
                self.sink
                    .failed(format!(
                        "Failed to fetch audit info ({}, {}) on reference {reference_server}: \
                         {err}",
                        event.entity_type, event.entity_id
                    ))
                    .await;
                return Some((event.entity_id.clone(), event.entity_type.clone()));
            }
        };
        if reference.overwritten_by.is_some() {
            self.overwritten.insert(&event.entity_id);
        }

        let mut failed = false;
        for (server, result) in synced[1..].iter().zip(&results[1..]) {
            match result {
                Ok(audit) => {
                    if audit.overwritten_by.is_some() {
                        self.overwritten.insert(&event.entity_id);
                    }
                    match self
                        .audits_match(reference_server, server, &event.entity_type, reference, audit)
                        .await
                    {
                        Ok(true) => {}
                        Ok(false) => {
                            failed = true;
                            self.sink
                                .failed(format!(
                                    "Found a mismatch. Audit info for ({}, {}) is different \
                                     in {reference_server} and {server}",
                                    event.entity_type, event.entity_id
                                ))
                                .await;
                        }
                        Err(err) => {
                            failed = true;
                            self.sink
                                .failed(format!(
                                    "Failed to compare audit info ({}, {}) between \
                                     {reference_server} and {server}: {err}",
                                    event.entity_type, event.entity_id
                                ))
                                .await;
                        }
                    }
                }
                Err(err) => {
                    failed = true;
                    self.sink
                        .failed(format!(
                            "Failed to fetch audit info ({}, {}) on server {server}: {err}",
                            event.entity_type, event.entity_id
                        ))
                        .await;
                }
            }
        }

        failed.then(|| (event.entity_id.clone(), event.entity_type.clone()))
    }

    /// Two audit records agree when their immutable properties match and
    /// their overwrite status agrees under the race rule: an overwrite seen
    /// on only one side passes as long as the overwriting entity really is
    /// newer there, since propagation to the other replica is asynchronous.
    /// Two different overwriters never agree.
    async fn audits_match(
        &self,
        server_a: &ServerAddress,
        server_b: &ServerAddress,
        entity_type: &EntityType,
        a: &AuditInfo,
        b: &AuditInfo,
    ) -> Result<bool, ReplicaError> {
        if !immutable_props_match(a, b) {
            return Ok(false);
        }
        match (&a.overwritten_by, &b.overwritten_by) {
            (Some(x), Some(y)) if x != y => Ok(false),
            (Some(overwriting), None) => {
                let info = self
                    .client
                    .fetch_audit_info(server_a, entity_type, overwriting)
                    .await?;
                Ok(info.deployed_timestamp > a.deployed_timestamp)
            }
            (None, Some(overwriting)) => {
                let info = self
                    .client
                    .fetch_audit_info(server_b, entity_type, overwriting)
                    .await?;
                Ok(info.deployed_timestamp > b.deployed_timestamp)
            }
            _ => Ok(true),
        }
    }
}
