//! Chain-of-Trust Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP
//! - Signature libraries
//! - Runtime specifics
//!
//! Everything here is parsed and validated on construction, so the
//! verification engine only ever sees well-formed task definitions and
//! attestations.

pub mod attestation;
pub mod digest;
pub mod error;
pub mod ids;
pub mod role;
pub mod task;
pub mod worker;

// Re-export commonly used types
pub use attestation::Attestation;
pub use digest::{bytes_digest, file_digest, DigestAlgorithm};
pub use error::{CotError, Result};
pub use ids::TaskId;
pub use role::{RoleLabel, TaskType};
pub use task::{TaskDefinition, UpstreamArtifact};
pub use worker::WorkerImpl;
