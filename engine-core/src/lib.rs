//! Core engine types for the Evoring coordinator
//!
//! Domain-neutral pieces shared by workers and the orchestrator:
//! consistent-hash routing, approximate key membership, fitness
//! histograms, and the UnitOfWork plugin interface.

#![forbid(unsafe_code)]

pub mod candidate;
pub mod error;
pub mod hashring;
pub mod histogram;
pub mod keyset;
pub mod uow;

pub use candidate::Candidate;
pub use error::{EngineError, Result};
pub use hashring::HashRing;
pub use histogram::Histogram;
pub use keyset::{BloomFilter, KeySet};
pub use uow::{UnitOfWork, UowParams, UowRegistry};
