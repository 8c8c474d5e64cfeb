//! Role labels and the task types they resolve to.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CotError;

/// Separator between the segments of a role label.
pub const ROLE_SEPARATOR: char = ':';

/// Position of a link in the graph, relative to the root.
///
/// A colon-joined path such as `signing:build:docker-image`: the root's
/// role followed by one segment per edge walked to reach the link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleLabel(String);

impl RoleLabel {
    /// Create a new RoleLabel from a string.
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extend the label with one more edge.
    pub fn join(&self, edge: &str) -> Self {
        Self(format!("{}{}{}", self.0, ROLE_SEPARATOR, edge))
    }

    /// Number of edges walked from the root.
    pub fn depth(&self) -> usize {
        self.0.matches(ROLE_SEPARATOR).count()
    }

    /// Last segment of the label.
    pub fn last_segment(&self) -> &str {
        self.0.rsplit(ROLE_SEPARATOR).next().unwrap_or(&self.0)
    }

    /// Resolve the task type named by the last segment.
    ///
    /// The segment must match a known type exactly.
    pub fn task_type(&self) -> Result<TaskType, CotError> {
        self.last_segment()
            .parse()
            .map_err(|_| CotError::UnknownTaskType(self.0.clone()))
    }
}

impl fmt::Display for RoleLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RoleLabel {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for RoleLabel {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Kind of task a link represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    /// Compiles and packages the product.
    Build,
    /// Localized repack of a build.
    L10n,
    /// Computes and schedules the task graph.
    Decision,
    /// Builds a docker image used by other tasks.
    DockerImage,
    /// Signs upstream artifacts.
    Signing,
}

impl TaskType {
    /// All known task types.
    pub const ALL: [TaskType; 5] = [
        TaskType::Build,
        TaskType::L10n,
        TaskType::Decision,
        TaskType::DockerImage,
        TaskType::Signing,
    ];

    /// Name used in role labels and config keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Build => "build",
            TaskType::L10n => "l10n",
            TaskType::Decision => "decision",
            TaskType::DockerImage => "docker-image",
            TaskType::Signing => "signing",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = CotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CotError::UnknownTaskType(s.to_string()))
    }
}
