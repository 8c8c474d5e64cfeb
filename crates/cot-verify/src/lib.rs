//! Chain-of-Trust Verification Engine
//!
//! This crate resolves the dependency graph of a task, downloads and
//! verifies the signed attestation of every task in it, and runs the
//! policy checks that decide whether the task's inputs can be trusted.

pub mod audit;
pub mod chain;
pub mod checks;
pub mod client;
pub mod config;
pub mod context;
pub mod download;
pub mod link;
pub mod queue;
pub mod resolve;
pub mod signature;
pub mod verify;

#[cfg(test)]
pub(crate) mod testing;

pub use audit::AuditLog;
pub use chain::Chain;
pub use checks::{raise_on_errors, Findings};
pub use client::HttpQueueClient;
pub use config::{Config, InteractivePolicy};
pub use context::Context;
pub use link::Link;
pub use queue::{ArtifactTransport, ClientError, TaskQueue};
pub use signature::{MinisignVerifier, SignatureError, SignatureVerifier};
pub use verify::verify_chain_of_trust;
