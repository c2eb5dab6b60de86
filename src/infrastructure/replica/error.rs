//! Transport error taxonomy for replica requests.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when talking to a replica.
#[derive(Error, Debug)]
pub enum ReplicaError {
    /// The replica answered with a non-success status.
    #[error("server {server} returned status {status} for {path}")]
    Status {
        /// Replica base URL.
        server: String,
        /// Request path and query.
        path: String,
        /// HTTP status returned.
        status: StatusCode,
    },

    /// The request never completed (connect, timeout, TLS, ...).
    #[error("network error talking to {server}: {source}")]
    Network {
        /// Replica base URL.
        server: String,
        /// Underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// The replica answered 2xx but the body did not match the expected shape.
    #[error("invalid response body from {server}: {source}")]
    Decode {
        /// Replica base URL.
        server: String,
        /// Underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

impl ReplicaError {
    /// Whether the error is worth retrying.
    ///
    /// Server-side statuses (5xx, 429) and network errors are transient;
    /// client errors and malformed bodies are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Network { .. } => true,
            Self::Decode { .. } => false,
        }
    }
}
