//! One node of the chain of trust.

use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use serde_json::{Map, Value};

use cot_core::{
    Attestation, CotError, Result, RoleLabel, TaskDefinition, TaskId, TaskType, WorkerImpl,
};

use crate::checks::guess_worker_impl;
use crate::config::Config;

/// Artifact path of the signed chain-of-trust document.
pub const SIGNED_COT_PATH: &str = "public/chainOfTrust.json.asc";

/// File name of the verified, unsigned copy inside a cot dir.
pub const UNSIGNED_COT_NAME: &str = "chainOfTrust.json";

/// Artifact path of the decision task's published task graph.
pub const TASK_GRAPH_PATH: &str = "public/task-graph.json";

/// A task in the graph under verification.
///
/// The task definition is fixed at construction. The attestation slot is
/// filled once, after its signature has been verified.
#[derive(Debug)]
pub struct Link {
    task_id: TaskId,
    role: RoleLabel,
    task: TaskDefinition,
    cot_dir: PathBuf,
    attestation: OnceLock<Attestation>,
}

impl Link {
    /// Create a new Link for an already validated task definition.
    pub fn new(role: RoleLabel, task: TaskDefinition, cot_dir: impl Into<PathBuf>) -> Self {
        Self {
            task_id: task.task_id().clone(),
            role,
            task,
            cot_dir: cot_dir.into(),
            attestation: OnceLock::new(),
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn role(&self) -> &RoleLabel {
        &self.role
    }

    pub fn task(&self) -> &TaskDefinition {
        &self.task
    }

    /// Local directory for this link's downloads.
    pub fn cot_dir(&self) -> &Path {
        &self.cot_dir
    }

    /// The verified attestation.
    pub fn attestation(&self) -> Result<&Attestation> {
        self.attestation
            .get()
            .ok_or_else(|| CotError::InvalidAttestation {
                task_id: self.task_id.to_string(),
                reason: "chain of trust has not been verified yet".to_string(),
            })
    }

    /// Assign the verified attestation. Fails if one is already set.
    pub fn set_attestation(&self, attestation: Attestation) -> Result<()> {
        self.attestation
            .set(attestation)
            .map_err(|_| CotError::AttestationAlreadySet(self.task_id.to_string()))
    }

    pub fn is_try(&self) -> bool {
        self.task.is_try()
    }

    pub fn task_type(&self) -> Result<TaskType> {
        self.role.task_type()
    }

    pub fn worker_impl(&self, config: &Config) -> Result<WorkerImpl> {
        guess_worker_impl(self, config)
    }

    /// Local path of an artifact of this link.
    ///
    /// Artifact paths come from task definitions, so anything that could
    /// escape the cot dir is rejected.
    pub fn artifact_path(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if path.is_empty() || escapes {
            return Err(CotError::Download {
                task_id: self.task_id.to_string(),
                path: path.to_string(),
                reason: "artifact path must be relative and stay inside the cot dir".to_string(),
            });
        }
        Ok(self.cot_dir.join(relative))
    }

    /// Local path of the downloaded signed attestation.
    pub fn signed_cot_path(&self) -> PathBuf {
        self.cot_dir.join(SIGNED_COT_PATH)
    }

    /// Local path of the verified, unsigned attestation.
    pub fn unsigned_cot_path(&self) -> PathBuf {
        self.cot_dir.join(UNSIGNED_COT_NAME)
    }

    /// The task graph published by a decision link, keyed by task id.
    ///
    /// Loaded from the cot dir on every call.
    pub fn task_graph(&self) -> Result<Map<String, Value>> {
        if self.task_type()? != TaskType::Decision {
            return Err(CotError::InvalidTask {
                task_id: self.task_id.to_string(),
                reason: format!("{} is not a decision task and has no task graph", self.role),
            });
        }

        let path = self.cot_dir.join(TASK_GRAPH_PATH);
        let contents = std::fs::read_to_string(&path).map_err(|e| CotError::io(&path, e))?;
        match serde_json::from_str(&contents).map_err(|e| CotError::io(&path, e))? {
            Value::Object(graph) => Ok(graph),
            _ => Err(CotError::InvalidAttestation {
                task_id: self.task_id.to_string(),
                reason: format!("{} is not a mapping", path.display()),
            }),
        }
    }
}
