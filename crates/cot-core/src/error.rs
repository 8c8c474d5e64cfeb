//! Chain-of-trust errors.

use thiserror::Error;

/// Result alias used across the chain-of-trust crates.
pub type Result<T> = std::result::Result<T, CotError>;

/// Trust verification failure.
///
/// Every variant means the chain cannot be trusted. The variants only
/// differ in where the failure was detected, which keeps the audit log
/// readable.
#[derive(Debug, Error)]
pub enum CotError {
    /// Task definition is not a mapping or is missing required fields.
    #[error("Invalid task definition for {task_id}: {reason}")]
    InvalidTask { task_id: String, reason: String },

    /// Attestation content is not a mapping or is malformed.
    #[error("Invalid chain of trust for {task_id}: {reason}")]
    InvalidAttestation { task_id: String, reason: String },

    /// Link lookup did not match exactly one link.
    #[error("Link lookup failed: {0}")]
    LinkLookup(String),

    /// Attestation was assigned twice.
    #[error("Chain of trust already set for {0}")]
    AttestationAlreadySet(String),

    /// Task definition could not be fetched from the queue.
    #[error("Can't fetch task {task_id}: {reason}")]
    DependencyFetch { task_id: String, reason: String },

    /// Role label nests deeper than allowed.
    #[error("Chain too long: {role} exceeds {max} levels")]
    ChainTooLong { role: String, max: usize },

    /// Artifact download failed.
    #[error("Download failed for {task_id} {path}: {reason}")]
    Download {
        task_id: String,
        path: String,
        reason: String,
    },

    /// Signature verification failed.
    #[error("Signature verification failed for {task_id}: {reason}")]
    Signature { task_id: String, reason: String },

    /// Declared digest is absent, malformed, or does not match.
    #[error("Digest verification failed for {task_id} {path}: {reason}")]
    Digest {
        task_id: String,
        path: String,
        reason: String,
    },

    /// Digest algorithm is not supported.
    #[error("Unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Worker implementation could not be determined unambiguously.
    #[error("Can't guess worker implementation for {task_id}: {reason}")]
    WorkerImpl { task_id: String, reason: String },

    /// Role label does not end in a known task type.
    #[error("Unknown task type for {0}")]
    UnknownTaskType(String),

    /// Local file access failed.
    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },

    /// Aggregated policy findings.
    #[error("Chain of trust verification failed:\n{}", .0.join("\n"))]
    Findings(Vec<String>),
}

impl CotError {
    /// Build an [`CotError::Io`] from a path and any displayable error.
    pub fn io(path: impl AsRef<std::path::Path>, err: impl std::fmt::Display) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_findings_display_lists_every_finding() {
        let err = CotError::Findings(vec!["first".to_string(), "second".to_string()]);
        let msg = err.to_string();
        assert!(msg.contains("first"));
        assert!(msg.contains("second"));
    }
}
