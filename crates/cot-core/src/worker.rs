//! Worker implementation classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Worker implementation that executed a task.
///
/// Always derived from a task definition, never stored next to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerImpl {
    DockerWorker,
    GenericWorker,
    Scriptworker,
    TaskclusterWorker,
}

impl WorkerImpl {
    /// Name as it appears in logs and findings.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerImpl::DockerWorker => "docker-worker",
            WorkerImpl::GenericWorker => "generic-worker",
            WorkerImpl::Scriptworker => "scriptworker",
            WorkerImpl::TaskclusterWorker => "taskcluster-worker",
        }
    }

    /// Scope prefix that only tasks for this implementation carry.
    pub fn scope_prefix(&self) -> Option<&'static str> {
        match self {
            WorkerImpl::DockerWorker => Some("docker-worker:"),
            WorkerImpl::GenericWorker => Some("generic-worker:"),
            WorkerImpl::Scriptworker | WorkerImpl::TaskclusterWorker => None,
        }
    }

    /// Implementation whose scope prefix `scope` starts with, if any.
    pub fn from_scope(scope: &str) -> Option<Self> {
        [
            WorkerImpl::DockerWorker,
            WorkerImpl::GenericWorker,
            WorkerImpl::Scriptworker,
            WorkerImpl::TaskclusterWorker,
        ]
        .into_iter()
        .find(|w| w.scope_prefix().is_some_and(|p| scope.starts_with(p)))
    }
}

impl fmt::Display for WorkerImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_scope() {
        assert_eq!(
            WorkerImpl::from_scope("docker-worker:cache:foo"),
            Some(WorkerImpl::DockerWorker)
        );
        assert_eq!(
            WorkerImpl::from_scope("generic-worker:os-group:x"),
            Some(WorkerImpl::GenericWorker)
        );
        assert_eq!(WorkerImpl::from_scope("queue:route:index"), None);
    }
}
