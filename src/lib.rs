//! Replicheck - Replica cluster consistency auditor
//!
//! Replicheck audits a cluster of eventually-consistent content replicas.
//! It collects the deployment history of every replica, elects a reference
//! replica, and verifies that the others agree on entity bodies, active
//! pointer resolution, audit metadata, and content availability, while
//! tolerating the races that legitimate overwrites introduce.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Wire and configuration models
//! - **Service Layer** (`services`): The reconciliation phases and orchestrator
//! - **Infrastructure Layer** (`infrastructure`): HTTP transport, registry,
//!   result sink and configuration loading
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use replicheck::domain::models::CheckConfig;
//! use replicheck::services::ClusterChecker;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = CheckConfig::default();
//!     let servers = vec!["https://peer.example/content".to_string()];
//!     let checker = ClusterChecker::new(config).await?;
//!     let report = checker.run(&servers).await?;
//!     println!("{} failures", report.total_failures());
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    ActivePointerMap, AuditInfo, CheckConfig, CheckReport, DeploymentEvent, Entity, EntityContent,
    EntityRef, PartialDeploymentHistory, ReferencedContentMap,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use infrastructure::replica::{ReplicaClient, ReplicaError, RetryPolicy};
pub use services::{CancelFlag, CheckError, ClusterChecker, OverwrittenSet};
