//! Per-verification audit log.
//!
//! Every event emitted while a verification future runs is recorded to a
//! plain-text file, alongside the usual console output. The recorder is a
//! scoped dispatcher attached to that one future; nothing is installed
//! process-wide.

use std::fs::File;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::instrument::WithSubscriber;
use tracing::{warn, Dispatch};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use cot_core::{CotError, Result};

/// Audit recorder for one verification.
pub struct AuditLog {
    path: PathBuf,
    file: Arc<File>,
    dispatch: Dispatch,
}

impl AuditLog {
    /// Create (or truncate) the audit log at `path`.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CotError::io(parent, e))?;
        }
        let file = Arc::new(File::create(&path).map_err(|e| CotError::io(&path, e))?);

        let audit = fmt::layer()
            .with_writer(file.clone())
            .with_ansi(false)
            .with_target(false)
            .with_filter(LevelFilter::DEBUG);
        let console = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            );
        let subscriber = tracing_subscriber::registry().with(audit).with(console);

        Ok(Self {
            path,
            file,
            dispatch: Dispatch::new(subscriber),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `future` with its events recorded, then flush the log.
    ///
    /// The log is flushed whether the future succeeds or fails.
    pub async fn scope<F: Future>(&self, future: F) -> F::Output {
        let output = future.with_subscriber(self.dispatch.clone()).await;
        if let Err(e) = self.file.sync_all() {
            warn!(path = %self.path.display(), error = %e, "Failed to flush audit log");
        }
        output
    }
}
