//! Orchestrator error type

use engine_core::EngineError;
use thiserror::Error;
use transport::TransportError;

/// Anything that aborts a run.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Configuration failure: unknown UoW, bad parameters, empty cluster
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Unreachable shard or credential skew
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Result type
pub type Result<T> = std::result::Result<T, OrchestratorError>;
