//! The consistency-reconciliation engine.
//!
//! Control flow: the history collector yields a canonical event sequence and
//! the set of synchronized replicas; the entity reconciler derives the
//! active-pointer and referenced-content maps while diffing entity bodies;
//! the pointer, audit and content phases then run over those outputs. Each
//! phase accumulates its own failure collection, merged by the checker into
//! one report.

pub mod audit;
pub mod checker;
pub mod chunking;
pub mod content;
pub mod entities;
pub mod error;
pub mod history;
pub mod overwritten;
pub mod pointers;
pub mod task_runner;

pub use checker::ClusterChecker;
pub use error::CheckError;
pub use overwritten::OverwrittenSet;
pub use task_runner::CancelFlag;
