//! Verifier configuration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use cot_core::{CotError, Result};

/// How interactive-task findings are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractivePolicy {
    /// Findings fail verification.
    #[default]
    Fatal,
    /// Findings are logged and dropped.
    Advisory,
}

/// Allow-lists for the decision task's launch command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionCommandConfig {
    /// Required first element of the command.
    pub run_task_path: String,

    /// Exact options allowed between the executable and the shell script.
    pub allowed_options: Vec<String>,

    /// Option prefixes allowed between the executable and the shell script.
    pub allowed_option_prefixes: Vec<String>,

    /// Shell commands allowed as the start of a `&&` segment.
    pub allowed_shell_commands: Vec<String>,

    /// Words allowed in the build-graph invocation, besides `--` flags.
    pub allowed_graph_words: Vec<String>,
}

impl Default for DecisionCommandConfig {
    fn default() -> Self {
        Self {
            run_task_path: "/home/worker/bin/run-task".to_string(),
            allowed_options: strings(&["--", "bash", "-cx"]),
            allowed_option_prefixes: strings(&["--vcs-checkout="]),
            allowed_shell_commands: strings(&["cd", "ln"]),
            allowed_graph_words: strings(&["./mach", "taskgraph", "decision"]),
        }
    }
}

/// Verifier configuration.
///
/// Read-only for the duration of a verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root for per-link cot directories.
    pub work_dir: PathBuf,

    /// Root for artifacts this worker publishes (audit log).
    pub artifact_dir: PathBuf,

    /// Queue root URL used by the HTTP client.
    pub taskcluster_root_url: String,

    /// Maximum number of edges in a role label.
    pub max_chain_length: usize,

    /// Provisioner ids of scriptworker pools.
    pub scriptworker_provisioners: Vec<String>,

    /// Worker types of scriptworker pools.
    pub scriptworker_worker_types: Vec<String>,

    /// Allowed runtime image hashes, keyed by task type.
    pub docker_image_allowlists: HashMap<String, Vec<String>>,

    /// Worker types allowed to run decision tasks.
    pub valid_decision_worker_types: Vec<String>,

    /// Environment variable names a decision task may set.
    pub valid_decision_env_vars: Vec<String>,

    /// Decision command allow-lists.
    pub decision_command: DecisionCommandConfig,

    /// Treatment of interactive docker-worker findings.
    pub interactive_policy: InteractivePolicy,

    /// Trusted minisign public keys (base64).
    pub trusted_keys: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("work"),
            artifact_dir: PathBuf::from("artifacts"),
            taskcluster_root_url: "https://taskcluster.net".to_string(),
            max_chain_length: 5,
            scriptworker_provisioners: strings(&["scriptworker-prov-v1"]),
            scriptworker_worker_types: Vec::new(),
            docker_image_allowlists: HashMap::new(),
            valid_decision_worker_types: strings(&["gecko-decision"]),
            valid_decision_env_vars: strings(&[
                "GECKO_BASE_REPOSITORY",
                "GECKO_HEAD_REPOSITORY",
                "GECKO_HEAD_REV",
                "GECKO_HEAD_REF",
                "TARGET_TASKS_METHOD",
                "HG_STORE_PATH",
            ]),
            decision_command: DecisionCommandConfig::default(),
            interactive_policy: InteractivePolicy::default(),
            trusted_keys: Vec::new(),
        }
    }
}

impl Config {
    /// Load a JSON config file; missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| CotError::io(path, e))?;
        serde_json::from_str(&contents).map_err(|e| CotError::io(path, e))
    }

    /// Directory holding one link's downloaded chain-of-trust files.
    ///
    /// Fails for task ids that are not slugs.
    pub fn cot_dir(&self, task_id: &cot_core::TaskId) -> Result<PathBuf> {
        if !task_id.is_slug() {
            return Err(CotError::InvalidTask {
                task_id: task_id.to_string(),
                reason: "task id is not a slug".to_string(),
            });
        }
        Ok(self.work_dir.join("cot").join(task_id.as_str()))
    }

    /// Location of the audit log for one verification.
    pub fn audit_log_path(&self) -> PathBuf {
        self.artifact_dir.join("public").join("cot").join("audit.log")
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"max_chain_length": 9, "interactive_policy": "advisory",
                "docker_image_allowlists": {"decision": ["sha256:abc"]}}"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.max_chain_length, 9);
        assert_eq!(config.interactive_policy, InteractivePolicy::Advisory);
        assert_eq!(config.docker_image_allowlists["decision"], vec!["sha256:abc"]);
        assert_eq!(config.valid_decision_worker_types, vec!["gecko-decision"]);
        assert_eq!(
            config.decision_command.run_task_path,
            "/home/worker/bin/run-task"
        );
    }

    #[test]
    fn test_missing_file() {
        assert!(Config::from_file("/nonexistent/config.json").is_err());
    }

    #[test]
    fn test_paths() {
        let config = Config {
            work_dir: PathBuf::from("/w"),
            artifact_dir: PathBuf::from("/a"),
            ..Config::default()
        };
        assert_eq!(
            config.cot_dir(&cot_core::TaskId::new("abc")).unwrap(),
            PathBuf::from("/w/cot/abc")
        );
        assert_eq!(config.audit_log_path(), PathBuf::from("/a/public/cot/audit.log"));
    }

    #[test]
    fn test_cot_dir_rejects_escaping_ids() {
        let config = Config {
            work_dir: PathBuf::from("/w"),
            ..Config::default()
        };
        for id in ["../../escaped", "/abs", "a/../b", ".", ""] {
            assert!(
                matches!(
                    config.cot_dir(&cot_core::TaskId::new(id)),
                    Err(CotError::InvalidTask { .. })
                ),
                "{id}"
            );
        }
    }
}
