//! Content existence and byte-level integrity checks.

use std::collections::BTreeSet;

use rand::seq::SliceRandom;
use tracing::info;

use crate::domain::models::{
    CheckConfig, EntityRef, FileHash, ReferencedContentMap, ServerAddress,
};
use crate::infrastructure::replica::ReplicaClient;
use crate::infrastructure::sink::ResultSink;

use super::chunking::split_into_chunks;
use super::overwritten::OverwrittenSet;
use super::task_runner::run_bounded;

/// Result of the existence pass.
#[derive(Debug, Clone, Default)]
pub struct ExistenceOutcome {
    /// Hashes missing somewhere or unverifiable.
    pub failed_content: BTreeSet<FileHash>,
    /// Hashes confirmed available on every synchronized replica; the pool
    /// the integrity pass samples from.
    pub available_everywhere: Vec<FileHash>,
}

/// A referenced hash must be checked unless every entity referencing it is
/// known overwritten. A hash that is itself an entity id is always checked:
/// entity documents must stay fetchable regardless of overwrite status.
pub(crate) fn must_check(
    hash: &str,
    referencing: &[EntityRef],
    overwritten: &OverwrittenSet,
) -> bool {
    if referencing
        .first()
        .is_some_and(|r| r.entity_id == hash)
    {
        return true;
    }
    referencing
        .iter()
        .any(|r| !overwritten.contains(&r.entity_id))
}

/// Verifies that referenced content is available on every replica and,
/// optionally, that a sampled subset of payloads is byte-identical.
pub struct ContentChecker<'a> {
    client: &'a ReplicaClient,
    sink: &'a ResultSink,
    config: &'a CheckConfig,
    overwritten: &'a OverwrittenSet,
}

impl<'a> ContentChecker<'a> {
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

    /// Batch-query availability of every non-exempt referenced hash on
    /// every synchronized replica.
    pub async fn check_existence(
        &self,
        referenced: &ReferencedContentMap,
        synced: &[ServerAddress],
    ) -> ExistenceOutcome {
        let checked: Vec<FileHash> = referenced
            .iter()
            .filter(|(hash, referencing)| must_check(hash, referencing, self.overwritten))
            .map(|(hash, _)| hash.clone())
            .collect();
        let exempted = referenced.len() - checked.len();

        let batches = split_into_chunks(&checked, self.config.chunk_size);
        let outcomes = run_bounded(
            "Checking content existence",
            batches,
            self.config.concurrency,
            |batch| async move { self.check_batch(&batch, synced).await },
        )
        .await;

        let mut unavailable: BTreeSet<FileHash> = BTreeSet::new();
        let mut failed_content: BTreeSet<FileHash> = BTreeSet::new();
        for (batch_unavailable, batch_failed) in outcomes {
            unavailable.extend(batch_unavailable);
            failed_content.extend(batch_failed);
        }

        info!(
            checked = checked.len(),
            exempted, "checked available hashes"
        );
        self.sink
            .log(format!(
                "Checked available hashes. {exempted} were not present due to overwrite"
            ))
            .await;

        for hash in &unavailable {
            failed_content.insert(hash.clone());
            self.sink
                .failed(format!(
                    "The following hash was not available, when it should have: {hash}"
                ))
                .await;
        }

        let available_everywhere = checked
            .into_iter()
            .filter(|hash| !unavailable.contains(hash) && !failed_content.contains(hash))
            .collect();

        ExistenceOutcome {
            failed_content,
            available_everywhere,
        }
    }

    async fn check_batch(
        &self,
        batch: &[FileHash],
        synced: &[ServerAddress],
    ) -> (BTreeSet<FileHash>, BTreeSet<FileHash>) {
        let mut unavailable = BTreeSet::new();
        let mut failed = BTreeSet::new();
        for server in synced {
            match self.client.fetch_availability(server, batch).await {
                Ok(entries) => {
                    for entry in entries {
                        if !entry.available {
                            unavailable.insert(entry.cid);
                        }
                    }
                }
                Err(err) => {
                    self.sink
                        .failed(format!(
                            "Failed to check availability of {} hashes on {server}: {err}",
                            batch.len()
                        ))
                        .await;
                    failed.extend(batch.iter().cloned());
                }
            }
        }
        (unavailable, failed)
    }

    /// Download a sampled subset of everywhere-available payloads from the
    /// reference and every other replica and compare byte for byte.
    /// Disabled when the sampling percentage is zero.
    pub async fn check_files(
        &self,
        available: &[FileHash],
        synced: &[ServerAddress],
    ) -> BTreeSet<FileHash> {
        let percent = usize::from(self.config.content_sample_percent);
        if percent == 0 || available.is_empty() {
            return BTreeSet::new();
        }

        let mut sample = available.to_vec();
        sample.shuffle(&mut rand::thread_rng());
        let count = (available.len() * percent).div_ceil(100).min(sample.len());
        sample.truncate(count);

        self.sink
            .log(format!(
                "Comparing the bytes of {count} of {} content files present on all servers",
                available.len()
            ))
            .await;

        let outcomes = run_bounded(
            "Checking content values",
            sample,
            self.config.concurrency,
            |hash| async move { self.compare_file(&hash, synced).await },
        )
        .await;

        outcomes.into_iter().flatten().collect()
    }

    async fn compare_file(
        &self,
        hash: &FileHash,
        synced: &[ServerAddress],
    ) -> Option<FileHash> {
        let reference_server = &synced[0];
        let reference_bytes = match self.client.fetch_content(reference_server, hash).await {
            Ok(bytes) => bytes,
            Err(err) => {
                self.sink
                    .failed(format!(
                        "Failed to fetch content with hash {hash} from reference \
                         {reference_server}: {err}"
                    ))
                    .await;
                return Some(hash.clone());
            }
        };

        let mut failed = false;
        for server in &synced[1..] {
            match self.client.fetch_content(server, hash).await {
                Ok(bytes) => {
                    if bytes != reference_bytes {
                        failed = true;
                        self.sink
                            .failed(format!(
                                "Found a mismatch. Content from file {hash} is different \
                                 in {reference_server} and {server}"
                            ))
                            .await;
                    }
                }
                Err(err) => {
                    failed = true;
                    self.sink
                        .failed(format!(
                            "Failed to fetch content with hash {hash} from server \
                             {server}: {err}"
                        ))
                        .await;
                }
            }
        }
        failed.then(|| hash.clone())
    }
}
