//! Run orchestrator
//!
//! The single driver process: assigns shard identities, mirrors the hash
//! ring, walks the cluster through the generation cycle behind a
//! two-phase barrier, aggregates partial results and reports the final
//! population.

pub mod error;
pub mod framework;

pub use error::OrchestratorError;
pub use framework::Framework;
