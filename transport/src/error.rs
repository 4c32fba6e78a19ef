//! Transport error taxonomy
//!
//! Unreachable endpoints and auth rejections are fatal to the run;
//! malformed response bodies are logged by the client and surface as an
//! absent result instead of an error.

use thiserror::Error;

/// Transport error
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection-level failure: refused, DNS, reset mid-request
    #[error("endpoint {endpoint} unreachable: {source}")]
    Unreachable {
        /// host:port that could not be reached
        endpoint: String,
        /// underlying client error
        #[source]
        source: reqwest::Error,
    },

    /// The shard rejected our credentials (version skew or wrong prefix)
    #[error("shard {shard_id} at {endpoint} returned 403")]
    Forbidden {
        /// shard that rejected the request
        shard_id: String,
        /// its endpoint
        endpoint: String,
    },

    /// A status the control plane never returns on the happy path
    #[error("unexpected status {status} from {endpoint}/{path}")]
    UnexpectedStatus {
        /// HTTP status received
        status: u16,
        /// host:port
        endpoint: String,
        /// endpoint path
        path: String,
    },

    /// Request body could not be serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No endpoint is known for the target shard
    #[error("no endpoint known for shard {0}")]
    UnknownShard(String),
}

/// Result type
pub type Result<T> = std::result::Result<T, TransportError>;
