//! Collaborators for task lookup and artifact transport.
//!
//! Verification only talks to the queue through these traits. Failures come
//! back as [`ClientError`] and are re-expressed as [`cot_core::CotError`] at
//! the call site.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use cot_core::TaskId;

/// Errors returned by queue and transport collaborators.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Request could not be completed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Local file could not be written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Looks up task definitions by id.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Fetch the raw task definition.
    async fn get_task(&self, task_id: &TaskId) -> Result<Value, ClientError>;
}

/// Resolves and downloads task artifacts.
#[async_trait]
pub trait ArtifactTransport: Send + Sync {
    /// URL of the artifact at `path` of `task_id`.
    fn artifact_url(&self, task_id: &TaskId, path: &str) -> String;

    /// Download `url` to `destination`, creating parent directories.
    async fn download(&self, url: &str, destination: &Path) -> Result<(), ClientError>;
}
