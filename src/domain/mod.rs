//! Domain layer: the data model shared by the reconciliation phases.

pub mod models;
