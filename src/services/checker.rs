//! Run orchestration: liveness, history, and the four reconciliation axes.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{info, warn};

use crate::domain::models::{CheckConfig, CheckReport, ServerAddress};
use crate::infrastructure::replica::{ReplicaClient, RetryPolicy};
use crate::infrastructure::sink::ResultSink;

use super::audit::AuditReconciler;
use super::content::ContentChecker;
use super::entities::EntityReconciler;
use super::error::CheckError;
use super::history::HistoryCollector;
use super::overwritten::OverwrittenSet;
use super::pointers::PointerReconciler;
use super::task_runner::{run_bounded, CancelFlag};

/// One full consistency check across a replica cluster.
///
/// Every comparison is against the first replica that answered (the
/// reference). This is a deliberate bias, not N-way consensus: when two
/// replicas agree with each other but not with the reference, the report
/// blames them, not the reference.
pub struct ClusterChecker {
    client: ReplicaClient,
    sink: ResultSink,
    config: CheckConfig,
    overwritten: OverwrittenSet,
    cancel: CancelFlag,
}

impl ClusterChecker {
    /// Build a checker, its transport and its result sink from the run
    /// configuration.
    pub async fn new(config: CheckConfig) -> anyhow::Result<Self> {
        let retry = RetryPolicy::new(
            config.retries,
            Duration::from_millis(config.min_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
        );
        let client = ReplicaClient::new(retry, Duration::from_secs(config.request_timeout_secs))?;
        let sink = ResultSink::create(&config.output_dir).await?;
        Ok(Self {
            client,
            sink,
            config,
            overwritten: OverwrittenSet::default(),
            cancel: CancelFlag::default(),
        })
    }

    /// Transport handle, shared with registry discovery.
    pub fn client(&self) -> &ReplicaClient {
        &self.client
    }

    /// Entities observed overwritten during the last run.
    pub fn overwritten(&self) -> &OverwrittenSet {
        &self.overwritten
    }

    /// Run the full check against the given replicas.
    pub async fn run(&self, servers: &[ServerAddress]) -> Result<CheckReport, CheckError> {
        if servers.len() < 2 {
            return Err(CheckError::InsufficientServers(servers.len()));
        }
        self.sink.log("Starting synchronization check").await;

        let live = self.filter_live(servers).await;

        let collected = HistoryCollector::new(&self.client, &self.sink, &self.config)
            .collect(&live)
            .await?;
        let synced = &collected.synced_servers;

        let reconciliation =
            EntityReconciler::new(&self.client, &self.sink, &self.config, &self.overwritten, &self.cancel)
                .check(&collected.canonical, synced)
                .await;

        let mut report = CheckReport {
            failed_entities: reconciliation.failed_entities,
            ..CheckReport::default()
        };

        if self.cancel.is_cancelled() {
            warn!("entity bodies diverged with fail-fast enabled, skipping remaining phases");
            self.sink
                .log("Entity mismatch with fail-fast enabled. Remaining checks were skipped")
                .await;
        } else {
            report.failed_pointers =
                PointerReconciler::new(&self.client, &self.sink, &self.config)
                    .check(&reconciliation.active_pointers, synced)
                    .await;

            // Audit runs before the content phases: overwrites it observes
            // feed the exemption logic of the existence check.
            report.failed_audit =
                AuditReconciler::new(&self.client, &self.sink, &self.config, &self.overwritten)
                    .check(&collected.canonical, synced)
                    .await;

            let content_checker =
                ContentChecker::new(&self.client, &self.sink, &self.config, &self.overwritten);
            let existence = content_checker
                .check_existence(&reconciliation.referenced_content, synced)
                .await;
            report.failed_content = existence.failed_content;
            report.failed_content_files = content_checker
                .check_files(&existence.available_everywhere, synced)
                .await;
        }

        self.write_summary(&report).await;
        Ok(report)
    }

    /// Drop replicas that do not answer their status endpoint, reporting
    /// the ones that are down.
    async fn filter_live(&self, servers: &[ServerAddress]) -> Vec<ServerAddress> {
        let statuses = run_bounded(
            "Checking replica status",
            servers.to_vec(),
            self.config.concurrency,
            |server| async move {
                let up = self.client.is_up(&server).await;
                (server, up)
            },
        )
        .await;
        let up: HashMap<ServerAddress, bool> = statuses.into_iter().collect();

        let live: Vec<ServerAddress> = servers
            .iter()
            .filter(|server| up.get(*server).copied().unwrap_or(false))
            .cloned()
            .collect();

        if live.len() == servers.len() {
            info!("all replicas are up");
        } else {
            let down: Vec<&ServerAddress> =
                servers.iter().filter(|s| !live.contains(s)).collect();
            warn!(?down, "some replicas are down");
            self.sink
                .log(format!("The following servers are down: {down:?}"))
                .await;
        }
        live
    }

    async fn write_summary(&self, report: &CheckReport) {
        self.sink
            .log(format!("Failed entities: {}", report.failed_entities.len()))
            .await;
        self.sink
            .log(format!("Failed audit infos: {}", report.failed_audit.len()))
            .await;
        self.sink
            .log(format!("Failed pointers: {}", report.failed_pointers.len()))
            .await;
        self.sink
            .log(format!(
                "Failed content availability: {}",
                report.failed_content.len()
            ))
            .await;
        self.sink
            .log(format!(
                "Failed content files: {}",
                report.failed_content_files.len()
            ))
            .await;
        self.sink
            .log("\nFor more information, check the 'results' file")
            .await;
        self.sink.results(report.render_results()).await;
    }
}
