//! Subcommand implementations.

pub mod check;
