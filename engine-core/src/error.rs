//! Error types for the core engine

use thiserror::Error;

/// Core engine error
#[derive(Debug, Error)]
pub enum EngineError {
    /// No UnitOfWork registered under the requested name
    #[error("unknown unit of work: {0}")]
    UnknownUow(String),

    /// An engine parameter is outside its legal range
    #[error("invalid parameter {name}: {reason}")]
    InvalidParam {
        /// Parameter name
        name: &'static str,
        /// Why the value was rejected
        reason: String,
    },
}

/// Result type
pub type Result<T> = std::result::Result<T, EngineError>;
