//! Shared verification context.

use std::sync::Arc;

use crate::config::Config;
use crate::queue::{ArtifactTransport, TaskQueue};
use crate::signature::SignatureVerifier;

/// Configuration and collaborators shared by every link of a chain.
#[derive(Clone)]
pub struct Context {
    /// Read-only configuration.
    pub config: Arc<Config>,

    /// Task definition lookup.
    pub queue: Arc<dyn TaskQueue>,

    /// Artifact URL resolution and download.
    pub transport: Arc<dyn ArtifactTransport>,

    /// Signature primitive holding the trusted keys.
    pub verifier: Arc<dyn SignatureVerifier>,
}

impl Context {
    /// Create a new Context wrapped in Arc.
    pub fn new(
        config: Config,
        queue: Arc<dyn TaskQueue>,
        transport: Arc<dyn ArtifactTransport>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config: Arc::new(config),
            queue,
            transport,
            verifier,
        })
    }
}
