//! Policy checks over resolved and verified links.
//!
//! Checks return findings: human-readable problem descriptions, empty when
//! the check passed. `Err` is reserved for input that makes a check
//! impossible to evaluate. Findings only become fatal in
//! [`raise_on_errors`], after every check has run.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use cot_core::{CotError, DigestAlgorithm, Result, TaskType, WorkerImpl};

use crate::chain::Chain;
use crate::config::{Config, DecisionCommandConfig, InteractivePolicy};
use crate::link::Link;

/// Problems found by a check. Empty means the check passed.
pub type Findings = Vec<String>;

/// Number of links of each task type in a chain.
pub type TaskCounts = BTreeMap<TaskType, usize>;

/// Environment variable that turns a docker-worker task interactive.
const INTERACTIVE_ENV_VAR: &str = "TASKCLUSTER_INTERACTIVE";

/// Shell syntax never allowed in a decision script, besides `&&`.
const SHELL_METACHARACTERS: &[&str] = &[";", "|", "`", "$(", ">", "<", "&", "\n"];

/// Fail with every finding, or do nothing if there are none.
pub fn raise_on_errors(findings: Findings) -> Result<()> {
    if findings.is_empty() {
        Ok(())
    } else {
        Err(CotError::Findings(findings))
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Classify the worker implementation that ran `link`.
///
/// Exactly one implementation must match; zero or several is an error.
pub fn guess_worker_impl(link: &Link, config: &Config) -> Result<WorkerImpl> {
    let task = link.task();
    let mut candidates = BTreeSet::new();

    if task.image().is_some() {
        candidates.insert(WorkerImpl::DockerWorker);
    }
    if config
        .scriptworker_provisioners
        .iter()
        .any(|p| p == task.provisioner_id())
        || config
            .scriptworker_worker_types
            .iter()
            .any(|w| w == task.worker_type())
    {
        candidates.insert(WorkerImpl::Scriptworker);
    }
    candidates.extend(task.scopes().filter_map(WorkerImpl::from_scope));

    let mut iter = candidates.iter();
    match (iter.next(), iter.next()) {
        (Some(worker_impl), None) => {
            debug!(task_id = %link.task_id(), role = %link.role(), worker_impl = %worker_impl, "Guessed worker implementation");
            Ok(*worker_impl)
        }
        (None, _) => Err(CotError::WorkerImpl {
            task_id: link.task_id().to_string(),
            reason: "no worker implementation matches".to_string(),
        }),
        (Some(_), Some(_)) => Err(CotError::WorkerImpl {
            task_id: link.task_id().to_string(),
            reason: format!(
                "too many matches: {}",
                candidates
                    .iter()
                    .map(WorkerImpl::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }),
    }
}

/// Flag docker-worker tasks that allowed interactive sessions.
pub fn check_interactive_docker_worker(link: &Link) -> Findings {
    info!(task_id = %link.task_id(), role = %link.role(), "Checking for interactive docker-worker");
    let task = link.task();

    let (Some(features), Some(env)) = (task.features(), task.env()) else {
        return vec![format!(
            "{} {}: task definition is malformed: payload.features and payload.env are required",
            link.role(),
            link.task_id()
        )];
    };

    let mut findings = Findings::new();
    if features.get("interactive").is_some_and(is_truthy) {
        findings.push(format!(
            "{} {} is interactive: task.payload.features.interactive!",
            link.role(),
            link.task_id()
        ));
    }
    if env.get(INTERACTIVE_ENV_VAR).is_some_and(is_truthy) {
        findings.push(format!(
            "{} {} is interactive: task.payload.env.{}!",
            link.role(),
            link.task_id(),
            INTERACTIVE_ENV_VAR
        ));
    }
    findings
}

/// Verify the docker image a link ran in.
///
/// A prebuilt image (`payload.image` is a mapping) must come from the
/// docker-image task the link declares, and that task must declare a digest
/// for the image artifact. Any other image must have an allow-listed hash.
///
/// A built image digest that differs from the one the link reports is only
/// logged.
pub fn verify_docker_image_sha(chain: &Chain, link: &Link) -> Result<Findings> {
    let task = link.task();
    let cot = link.attestation()?;
    let mut findings = Findings::new();

    let Some(Value::Object(image)) = task.image() else {
        let task_type = link.task_type()?;
        let allowlist = chain
            .context()
            .config
            .docker_image_allowlists
            .get(task_type.as_str());
        match (cot.image_hash(), allowlist) {
            (Some(hash), Some(allowed)) if allowed.iter().any(|a| a == hash) => {
                debug!(task_id = %link.task_id(), image_hash = %hash, "Image hash is allow-listed");
            }
            (hash, _) => findings.push(format!(
                "{} {}: docker image hash {:?} is not in the {} allowlist",
                link.role(),
                link.task_id(),
                hash,
                task_type
            )),
        }
        return Ok(findings);
    };

    let declared = task.docker_image_input();
    let image_task_id = image.get("taskId").and_then(Value::as_str);
    let Some(declared) = declared.filter(|d| Some(d.as_str()) == image_task_id) else {
        findings.push(format!(
            "{} {}: docker-image taskId isn't consistent: {:?} vs {:?}",
            link.role(),
            link.task_id(),
            task.docker_image_input().map(|t| t.into_inner()),
            image_task_id
        ));
        return Ok(findings);
    };
    debug!(task_id = %link.task_id(), docker_image = %declared, "Verifying against docker-image task");

    let image_link = match chain.get_link(&declared) {
        Ok(image_link) => image_link,
        Err(e) => {
            findings.push(format!(
                "{} {}: docker-image {} is not in the chain: {}",
                link.role(),
                link.task_id(),
                declared,
                e
            ));
            return Ok(findings);
        }
    };

    let path = image.get("path").and_then(Value::as_str);
    let image_hash = cot.image_hash().and_then(|h| h.split_once(':'));
    let (Some(path), Some((alg, sha))) = (path, image_hash) else {
        findings.push(format!(
            "{} {}: payload.image.path or environment.imageHash is missing",
            link.role(),
            link.task_id()
        ));
        return Ok(findings);
    };
    let algorithm: DigestAlgorithm = match alg.parse() {
        Ok(algorithm) => algorithm,
        Err(e) => {
            findings.push(format!("{} {}: {}", link.role(), link.task_id(), e));
            return Ok(findings);
        }
    };

    match image_link.attestation()?.artifact_digest(path, algorithm) {
        Err(e) => findings.push(format!(
            "{} {}: docker-image {} digest is missing: {}",
            link.role(),
            link.task_id(),
            declared,
            e
        )),
        Ok(upstream) if !upstream.eq_ignore_ascii_case(sha) => {
            warn!(
                task_id = %link.task_id(),
                docker_image = %declared,
                expected = %sha,
                upstream = %upstream,
                "Built docker image digest doesn't match"
            );
        }
        Ok(upstream) => {
            debug!(task_id = %link.task_id(), digest = %upstream, "Found matching docker-image digest");
        }
    }
    Ok(findings)
}

fn compare_with_graph(graph: &Map<String, Value>, decision_link: &Link, link: &Link) -> Findings {
    let prefix = format!(
        "{} {} vs decision {} task graph",
        link.role(),
        link.task_id(),
        decision_link.task_id()
    );

    let Some(entry) = graph.get(link.task_id().as_str()) else {
        return vec![format!("{prefix}: task is not in the task graph")];
    };
    let Some(Value::Object(graph_task)) = entry.get("task") else {
        return vec![format!("{prefix}: task graph entry has no task definition")];
    };

    let runtime_task = link.task().as_json();
    let keys: BTreeSet<&String> = graph_task.keys().chain(runtime_task.keys()).collect();
    keys.into_iter()
        .filter(|key| graph_task.get(*key) != runtime_task.get(*key))
        .map(|key| {
            format!(
                "{prefix}: {key} differs: {} vs {}",
                runtime_task.get(key).unwrap_or(&Value::Null),
                graph_task.get(key).unwrap_or(&Value::Null)
            )
        })
        .collect()
}

/// Compare a link's definition with the one its decision task scheduled.
///
/// Any added, removed, or changed field is a finding.
pub fn verify_link_in_task_graph(decision_link: &Link, link: &Link) -> Result<Findings> {
    let graph = decision_link.task_graph()?;
    Ok(compare_with_graph(&graph, decision_link, link))
}

/// Check the decision task's command against the allow-lists.
pub fn verify_firefox_decision_command(decision_link: &Link, allowed: &DecisionCommandConfig) -> Findings {
    info!(task_id = %decision_link.task_id(), "Verifying decision command");
    let name = format!("{} {}", decision_link.role(), decision_link.task_id());

    let command = match decision_link.task().command() {
        Ok(command) => command,
        Err(e) => return vec![format!("{name}: {e}")],
    };
    let Some((first, rest)) = command.split_first() else {
        return vec![format!("{name}: command is empty")];
    };

    let mut findings = Findings::new();
    if *first != allowed.run_task_path {
        findings.push(format!(
            "{name}: command must start with {}!",
            allowed.run_task_path
        ));
    }

    let Some((script, options)) = rest.split_last() else {
        findings.push(format!("{name}: command has no shell script"));
        return findings;
    };
    for option in options {
        let listed = allowed.allowed_options.iter().any(|o| o == option);
        let prefixed = allowed
            .allowed_option_prefixes
            .iter()
            .any(|p| option.starts_with(p.as_str()));
        if !(listed || prefixed) {
            findings.push(format!("{name}: illegal option {option} in the command!"));
        }
    }

    findings.extend(verify_decision_script(&name, script, allowed));
    findings
}

/// Check the shell script of a decision command.
///
/// The script is a `&&` chain of allow-listed setup commands ending in the
/// build-graph invocation. No other shell syntax is accepted.
fn verify_decision_script(name: &str, script: &str, allowed: &DecisionCommandConfig) -> Findings {
    let mut findings = Findings::new();
    let segments: Vec<&str> = script.split("&&").map(str::trim).collect();

    for segment in &segments {
        if let Some(meta) = SHELL_METACHARACTERS.iter().find(|m| segment.contains(*m)) {
            findings.push(format!("{name}: illegal {meta:?} in ``{segment}``"));
        }
    }

    let Some((graph_call, setup)) = segments.split_last() else {
        findings.push(format!("{name}: shell script is empty"));
        return findings;
    };
    for segment in setup {
        match segment.split_whitespace().next() {
            Some(head) if allowed.allowed_shell_commands.iter().any(|c| c == head) => {}
            Some(_) => findings.push(format!("{name}: illegal command ``{segment}``")),
            None => findings.push(format!("{name}: empty command in ``{script}``")),
        }
    }
    if !is_graph_invocation(graph_call, &allowed.allowed_graph_words) {
        findings.push(format!(
            "{name}: script must end with ``{}``, got ``{graph_call}``",
            allowed.allowed_graph_words.join(" ")
        ));
    }
    findings
}

/// Whether `segment` is `words` in order, plus `--` flags after the first word.
fn is_graph_invocation(segment: &str, words: &[String]) -> bool {
    let mut tokens = segment.split_whitespace();
    let Some(program) = tokens.next() else {
        return false;
    };
    let rest: Vec<&str> = std::iter::once(program)
        .chain(tokens.filter(|t| !t.starts_with("--")))
        .collect();
    rest.len() == words.len() && rest.iter().zip(words).all(|(t, w)| *t == w.as_str())
}

/// Verify a decision task and every task it scheduled.
///
/// Every link in its task group is compared with the task graph, the root
/// link included.
pub fn verify_decision_task(chain: &Chain, decision_link: &Link) -> Result<Findings> {
    info!(task_id = %decision_link.task_id(), role = %decision_link.role(), "Verifying decision task");
    let config = &chain.context().config;
    let name = format!("{} {}", decision_link.role(), decision_link.task_id());
    let mut findings = Findings::new();

    let worker_type = decision_link.task().worker_type();
    if !config
        .valid_decision_worker_types
        .iter()
        .any(|w| w == worker_type)
    {
        findings.push(format!("{name}: {worker_type} is not a valid decision workerType!"));
    }

    let graph = match decision_link.task_graph() {
        Ok(graph) => graph,
        Err(e) => {
            findings.push(format!("{name}: can't load task graph: {e}"));
            return Err(CotError::Findings(findings));
        }
    };

    findings.extend(verify_firefox_decision_command(
        decision_link,
        &config.decision_command,
    ));

    if let Some(env) = decision_link.task().env() {
        for key in env.keys() {
            if !config.valid_decision_env_vars.iter().any(|v| v == key) {
                findings.push(format!("{name}: illegal env var {key}!"));
            }
        }
    }

    for link in chain.links() {
        let scheduled_here = link.task().task_group_id() == *decision_link.task_id();
        if scheduled_here && link.task_id() != decision_link.task_id() {
            findings.extend(compare_with_graph(&graph, decision_link, link));
        }
    }
    Ok(findings)
}

/// Run the task-type specific checks on every link.
pub fn verify_task_types(chain: &Chain) -> Result<(Findings, TaskCounts)> {
    let mut findings = Findings::new();
    let mut counts = TaskCounts::new();

    for link in chain.links() {
        let task_type = link.task_type()?;
        *counts.entry(task_type).or_default() += 1;
        match task_type {
            TaskType::Decision => findings.extend(verify_decision_task(chain, link)?),
            // covered by the worker implementation checks
            TaskType::Build | TaskType::L10n | TaskType::DockerImage | TaskType::Signing => {}
        }
    }
    Ok((findings, counts))
}

/// The chain must be anchored by at least one decision task.
pub fn check_num_tasks(counts: &TaskCounts) -> Findings {
    let decisions = counts.get(&TaskType::Decision).copied().unwrap_or_default();
    if decisions < 1 {
        vec![format!("{decisions} decision tasks; we must have at least 1!")]
    } else {
        Vec::new()
    }
}

/// Run the worker-implementation specific checks on every link.
pub fn verify_worker_impls(chain: &Chain) -> Result<Findings> {
    let config = &chain.context().config;
    let mut findings = Findings::new();

    for link in chain.links() {
        match link.worker_impl(config)? {
            WorkerImpl::DockerWorker => {
                let interactive = check_interactive_docker_worker(link);
                match config.interactive_policy {
                    InteractivePolicy::Fatal => findings.extend(interactive),
                    InteractivePolicy::Advisory => {
                        for finding in interactive {
                            warn!(task_id = %link.task_id(), "{}", finding);
                        }
                    }
                }
                findings.extend(verify_docker_image_sha(chain, link)?);
            }
            WorkerImpl::GenericWorker | WorkerImpl::Scriptworker | WorkerImpl::TaskclusterWorker => {}
        }
    }
    Ok(findings)
}
