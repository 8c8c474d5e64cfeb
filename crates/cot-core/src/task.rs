//! Validated task definitions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{CotError, Result, TaskId};

/// Fields every task definition must carry.
pub const REQUIRED_TASK_FIELDS: [&str; 5] = [
    "scopes",
    "provisionerId",
    "workerType",
    "taskGroupId",
    "payload",
];

/// Environment variable naming the repository a gecko task was built from.
const HEAD_REPOSITORY_VAR: &str = "GECKO_HEAD_REPOSITORY";

/// Environment variable naming the mozharness branch.
const BRANCH_VAR: &str = "MH_BRANCH";

/// Scheduler id suffix of the non-production tier.
const LEVEL_1_SUFFIX: &str = "-level-1";

/// One entry of `payload.upstreamArtifacts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamArtifact {
    /// Task that produced the artifacts.
    pub task_id: TaskId,

    /// Role of the producing task (becomes the edge name).
    pub task_type: String,

    /// Artifact paths consumed from that task.
    #[serde(default)]
    pub paths: Vec<String>,
}

/// A task definition as returned by the queue.
///
/// Construction validates the required fields, so accessors for them never
/// fail. The raw JSON is kept so definitions can be compared exactly.
#[derive(Debug, Clone)]
pub struct TaskDefinition {
    task_id: TaskId,
    raw: Map<String, Value>,
}

impl TaskDefinition {
    /// Parse and validate a task definition.
    pub fn from_value(task_id: &TaskId, value: Value) -> Result<Self> {
        let invalid = |reason: String| CotError::InvalidTask {
            task_id: task_id.to_string(),
            reason,
        };

        let Value::Object(raw) = value else {
            return Err(invalid("task definition is not a mapping".to_string()));
        };

        let missing: Vec<&str> = REQUIRED_TASK_FIELDS
            .iter()
            .copied()
            .filter(|field| !raw.contains_key(*field))
            .collect();
        if !missing.is_empty() {
            return Err(invalid(format!("missing {}", missing.join(", "))));
        }

        for field in ["provisionerId", "workerType", "taskGroupId"] {
            if !raw[field].is_string() {
                return Err(invalid(format!("{field} is not a string")));
            }
        }
        let scopes_ok = raw["scopes"]
            .as_array()
            .is_some_and(|scopes| scopes.iter().all(Value::is_string));
        if !scopes_ok {
            return Err(invalid("scopes is not a list of strings".to_string()));
        }
        if !raw["payload"].is_object() {
            return Err(invalid("payload is not a mapping".to_string()));
        }

        Ok(Self {
            task_id: task_id.clone(),
            raw,
        })
    }

    /// Task this definition belongs to.
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// The full definition as JSON.
    pub fn as_json(&self) -> &Map<String, Value> {
        &self.raw
    }

    fn required_str(&self, field: &str) -> &str {
        self.raw[field].as_str().unwrap_or_default()
    }

    pub fn task_group_id(&self) -> TaskId {
        TaskId::new(self.required_str("taskGroupId"))
    }

    pub fn provisioner_id(&self) -> &str {
        self.required_str("provisionerId")
    }

    pub fn worker_type(&self) -> &str {
        self.required_str("workerType")
    }

    pub fn scheduler_id(&self) -> Option<&str> {
        self.raw.get("schedulerId").and_then(Value::as_str)
    }

    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.raw["scopes"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
    }

    /// `payload`, guaranteed to be a mapping.
    pub fn payload(&self) -> &Map<String, Value> {
        static EMPTY: std::sync::OnceLock<Map<String, Value>> = std::sync::OnceLock::new();
        self.raw["payload"]
            .as_object()
            .unwrap_or_else(|| EMPTY.get_or_init(Map::new))
    }

    /// `payload.env`, if present and a mapping.
    pub fn env(&self) -> Option<&Map<String, Value>> {
        self.payload().get("env").and_then(Value::as_object)
    }

    /// `payload.features`, if present and a mapping.
    pub fn features(&self) -> Option<&Map<String, Value>> {
        self.payload().get("features").and_then(Value::as_object)
    }

    /// `payload.image`, unless absent or null.
    pub fn image(&self) -> Option<&Value> {
        self.payload().get("image").filter(|v| !v.is_null())
    }

    /// `payload.command` as a list of strings.
    pub fn command(&self) -> Result<Vec<&str>> {
        let invalid = || CotError::InvalidTask {
            task_id: self.task_id.to_string(),
            reason: "payload.command is not a list of strings".to_string(),
        };
        self.payload()
            .get("command")
            .and_then(Value::as_array)
            .ok_or_else(invalid)?
            .iter()
            .map(|part| part.as_str().ok_or_else(invalid))
            .collect()
    }

    /// `payload.upstreamArtifacts`, empty when absent.
    pub fn upstream_artifacts(&self) -> Result<Vec<UpstreamArtifact>> {
        match self.payload().get("upstreamArtifacts") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                CotError::InvalidTask {
                    task_id: self.task_id.to_string(),
                    reason: format!("malformed payload.upstreamArtifacts: {e}"),
                }
            }),
        }
    }

    /// `extra.chainOfTrust.inputs.docker-image`.
    pub fn docker_image_input(&self) -> Option<TaskId> {
        self.raw
            .get("extra")?
            .get("chainOfTrust")?
            .get("inputs")?
            .get("docker-image")?
            .as_str()
            .map(TaskId::from)
    }

    /// `metadata.source`.
    pub fn metadata_source(&self) -> Option<&str> {
        self.raw.get("metadata")?.get("source")?.as_str()
    }

    /// Whether the task came from a try (non-production) submission.
    pub fn is_try(&self) -> bool {
        let env_var = |name: &str| {
            self.env()
                .and_then(|env| env.get(name))
                .and_then(Value::as_str)
        };

        env_var(HEAD_REPOSITORY_VAR).is_some_and(has_try_segment)
            || env_var(BRANCH_VAR) == Some("try")
            || self.metadata_source().is_some_and(has_try_segment)
            || self
                .scheduler_id()
                .is_some_and(|id| id.ends_with(LEVEL_1_SUFFIX))
    }
}

/// Deep equality on the definition itself.
impl PartialEq for TaskDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

/// True if any path segment of `url` is `try`.
fn has_try_segment(url: &str) -> bool {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    without_scheme.split('/').skip(1).any(|segment| segment == "try")
}
