//! Infrastructure layer: replica transport, discovery, configuration and
//! the result sink.

pub mod config;
pub mod registry;
pub mod replica;
pub mod sink;
