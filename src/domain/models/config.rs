//! Run configuration for a consistency check.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{EntityId, EntityType, ServerAddress};

/// Configuration for one check run.
///
/// Loaded hierarchically (defaults, then `replicheck.yaml`, then `RC_*`
/// environment variables) and finally overridden by CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// Replica base URLs to audit. When empty, discovery goes through
    /// `registry_url`.
    pub servers: Vec<ServerAddress>,
    /// Registry endpoint used to discover replicas when `servers` is empty.
    pub registry_url: Option<String>,
    /// Directory where log/failed/results artifacts are written.
    pub output_dir: PathBuf,
    /// Attempt budget for every transport call.
    pub retries: u32,
    /// Maximum number of units of work in flight per phase.
    pub concurrency: usize,
    /// Maximum ids/pointers/hashes per request batch. Batches never mix
    /// entity types (the backing APIs are type-scoped).
    pub chunk_size: usize,
    /// Entity types to audit.
    pub entity_types: Vec<EntityType>,
    /// Known-bad entity ids dropped from every history before comparison.
    /// Operational exclusions, not part of the algorithm.
    pub denied_entities: Vec<EntityId>,
    /// Percentage (0-100) of available content files to byte-compare across
    /// replicas. 0 disables the integrity pass.
    pub content_sample_percent: u8,
    /// Stop submitting entity chunks after the first body mismatch instead
    /// of enumerating every divergence.
    pub fail_fast: bool,
    /// How far behind "now" the history cutoff sits, to avoid racing
    /// in-flight deployments.
    pub history_skew_ms: i64,
    /// Lower bound of the jittered wait between retry attempts.
    pub min_backoff_ms: u64,
    /// Upper bound of the jittered wait between retry attempts.
    pub max_backoff_ms: u64,
    /// Per-request timeout.
    pub request_timeout_secs: u64,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            registry_url: None,
            output_dir: PathBuf::from("."),
            retries: 5,
            concurrency: 15,
            chunk_size: 40,
            entity_types: vec!["scene".into(), "profile".into()],
            denied_entities: Vec::new(),
            content_sample_percent: 0,
            fail_fast: false,
            history_skew_ms: 120_000,
            min_backoff_ms: 1_000,
            max_backoff_ms: 10_000,
            request_timeout_secs: 120,
        }
    }
}
