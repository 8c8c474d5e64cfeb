//! Test fixtures and in-memory collaborators.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use cot_core::{Attestation, RoleLabel, TaskDefinition, TaskId};

use crate::config::Config;
use crate::context::Context;
use crate::link::Link;
use crate::queue::{ArtifactTransport, ClientError, TaskQueue};
use crate::signature::{SignatureError, SignatureVerifier};

/// Minimal valid task definition, with top-level keys of `overrides` replacing the defaults.
pub fn task(task_id: &str, overrides: Value) -> TaskDefinition {
    let mut raw = json!({
        "scopes": [],
        "provisionerId": "provisioner",
        "workerType": "worker-type",
        "taskGroupId": "decision_task_id",
        "schedulerId": "gecko-level-3",
        "metadata": {},
        "payload": {},
    });
    if let (Some(raw), Value::Object(overrides)) = (raw.as_object_mut(), overrides) {
        raw.extend(overrides);
    }
    TaskDefinition::from_value(&TaskId::new(task_id), raw).unwrap()
}

pub fn attestation(task_id: &str, value: Value) -> Attestation {
    Attestation::from_value(&TaskId::new(task_id), value).unwrap()
}

pub fn link(context: &Arc<Context>, role: &str, task_id: &str, overrides: Value) -> Link {
    Link::new(
        RoleLabel::new(role),
        task(task_id, overrides),
        context.config.cot_dir(&TaskId::new(task_id)).unwrap(),
    )
}

pub fn config(dir: &Path) -> Config {
    Config {
        work_dir: dir.join("work"),
        artifact_dir: dir.join("artifacts"),
        ..Config::default()
    }
}

pub fn context(dir: &Path) -> Arc<Context> {
    context_with_config(config(dir))
}

pub fn context_with_config(config: Config) -> Arc<Context> {
    Context::new(
        config,
        Arc::new(FakeQueue::new()),
        Arc::new(FakeTransport::new()),
        Arc::new(PassthroughVerifier),
    )
}

pub fn context_with_queue(dir: &Path, queue: Arc<FakeQueue>) -> Arc<Context> {
    Context::new(
        config(dir),
        queue,
        Arc::new(FakeTransport::new()),
        Arc::new(PassthroughVerifier),
    )
}

pub fn context_with_transport(dir: &Path, transport: Arc<FakeTransport>) -> Arc<Context> {
    Context::new(
        config(dir),
        Arc::new(FakeQueue::new()),
        transport,
        Arc::new(PassthroughVerifier),
    )
}

pub fn context_with_verifier(dir: &Path, verifier: Arc<dyn SignatureVerifier>) -> Arc<Context> {
    Context::new(
        config(dir),
        Arc::new(FakeQueue::new()),
        Arc::new(FakeTransport::new()),
        verifier,
    )
}

/// In-memory task queue that counts lookups.
#[derive(Default)]
pub struct FakeQueue {
    tasks: HashMap<String, Value>,
    fetches: Mutex<HashMap<String, usize>>,
}

impl FakeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task(mut self, task_id: &str, definition: Value) -> Self {
        self.tasks.insert(task_id.to_string(), definition);
        self
    }

    pub fn fetch_count(&self, task_id: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .get(task_id)
            .copied()
            .unwrap_or_default()
    }
}

#[async_trait]
impl TaskQueue for FakeQueue {
    async fn get_task(&self, task_id: &TaskId) -> Result<Value, ClientError> {
        *self
            .fetches
            .lock()
            .unwrap()
            .entry(task_id.to_string())
            .or_default() += 1;
        // let sibling branches interleave
        tokio::task::yield_now().await;
        self.tasks
            .get(task_id.as_str())
            .cloned()
            .ok_or_else(|| ClientError::NotFound(task_id.to_string()))
    }
}

/// In-memory artifact store keyed by `fake://<task id>/<path>`.
#[derive(Default)]
pub struct FakeTransport {
    artifacts: HashMap<String, Vec<u8>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_artifact(mut self, task_id: &str, path: &str, content: &[u8]) -> Self {
        self.artifacts
            .insert(format!("fake://{task_id}/{path}"), content.to_vec());
        self
    }
}

#[async_trait]
impl ArtifactTransport for FakeTransport {
    fn artifact_url(&self, task_id: &TaskId, path: &str) -> String {
        format!("fake://{task_id}/{path}")
    }

    async fn download(&self, url: &str, destination: &Path) -> Result<(), ClientError> {
        let content = self
            .artifacts
            .get(url)
            .ok_or_else(|| ClientError::NotFound(url.to_string()))?;
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(destination, content).await?;
        Ok(())
    }
}

/// Accepts anything and returns it unchanged.
pub struct PassthroughVerifier;

impl SignatureVerifier for PassthroughVerifier {
    fn verify(&self, signed: &[u8]) -> Result<Vec<u8>, SignatureError> {
        Ok(signed.to_vec())
    }
}

/// Rejects everything.
pub struct RejectingVerifier;

impl SignatureVerifier for RejectingVerifier {
    fn verify(&self, _signed: &[u8]) -> Result<Vec<u8>, SignatureError> {
        Err(SignatureError::Untrusted("rejected".to_string()))
    }
}

// A consistent decision -> build -> docker-image graph.

pub const DECISION_ID: &str = "decision_task_id";
pub const BUILD_ID: &str = "build_task_id";
pub const DOCKER_IMAGE_ID: &str = "docker_image_task_id";
pub const IMAGE_ARTIFACT: &str = "public/image.tar.zst";

pub fn decision_image_hash() -> String {
    format!("sha256:{}", "a".repeat(64))
}

pub fn docker_image_hash() -> String {
    format!("sha256:{}", "b".repeat(64))
}

/// Digest of the image the docker-image task built.
pub fn built_image_digest() -> String {
    "c".repeat(64)
}

/// Config whose allow-lists accept the fixture images.
pub fn firefox_config(dir: &Path) -> Config {
    let mut config = config(dir);
    config
        .docker_image_allowlists
        .insert("decision".to_string(), vec![decision_image_hash()]);
    config
        .docker_image_allowlists
        .insert("docker-image".to_string(), vec![docker_image_hash()]);
    config
}

pub fn decision_command() -> Value {
    json!([
        "/home/worker/bin/run-task",
        "--vcs-checkout=/home/worker/checkouts/gecko",
        "--",
        "bash",
        "-cx",
        "cd /home/worker/checkouts/gecko && ln -s /home/worker/artifacts artifacts && ./mach --log-no-times taskgraph decision --pushlog-id='83445' --project=mozilla-central",
    ])
}

pub fn decision_task_json() -> Value {
    json!({
        "scopes": ["queue:create-task:aws-provisioner-v1/gecko-3-b-linux"],
        "provisionerId": "aws-provisioner-v1",
        "workerType": "gecko-decision",
        "taskGroupId": DECISION_ID,
        "schedulerId": "gecko-level-3",
        "metadata": {"source": "https://hg.mozilla.org/mozilla-central/raw-file/abcdef/.taskcluster.yml"},
        "payload": {
            "image": format!("mozilla/decision@{}", decision_image_hash()),
            "features": {"taskclusterProxy": true, "chainOfTrust": true},
            "env": {
                "GECKO_BASE_REPOSITORY": "https://hg.mozilla.org/mozilla-unified",
                "GECKO_HEAD_REPOSITORY": "https://hg.mozilla.org/mozilla-central",
                "GECKO_HEAD_REV": "abcdef",
            },
            "command": decision_command(),
        },
    })
}

pub fn build_task_json() -> Value {
    json!({
        "scopes": ["docker-worker:cache:gecko-build"],
        "provisionerId": "aws-provisioner-v1",
        "workerType": "gecko-3-b-linux",
        "taskGroupId": DECISION_ID,
        "schedulerId": "gecko-level-3",
        "metadata": {"source": "https://hg.mozilla.org/mozilla-central/raw-file/abcdef/.taskcluster.yml"},
        "payload": {
            "image": {"type": "task-image", "taskId": DOCKER_IMAGE_ID, "path": IMAGE_ARTIFACT},
            "features": {"chainOfTrust": true},
            "env": {"MOZ_BUILD_DATE": "20171004000000"},
        },
        "extra": {"chainOfTrust": {"inputs": {"docker-image": DOCKER_IMAGE_ID}}},
    })
}

pub fn docker_image_task_json() -> Value {
    json!({
        "scopes": ["docker-worker:capability:privileged"],
        "provisionerId": "aws-provisioner-v1",
        "workerType": "gecko-images",
        "taskGroupId": DECISION_ID,
        "schedulerId": "gecko-level-3",
        "metadata": {"source": "https://hg.mozilla.org/mozilla-central/raw-file/abcdef/.taskcluster.yml"},
        "payload": {
            "image": format!("taskcluster/image_builder@{}", docker_image_hash()),
            "features": {"dind": true, "chainOfTrust": true},
            "env": {},
        },
    })
}

/// Task graph the decision task published for the fixture graph.
pub fn task_graph_json() -> Value {
    json!({
        BUILD_ID: {"task": build_task_json()},
        DOCKER_IMAGE_ID: {"task": docker_image_task_json()},
    })
}

pub fn decision_cot(task_graph_sha256: &str) -> Value {
    json!({
        "taskId": DECISION_ID,
        "environment": {"imageHash": decision_image_hash()},
        "artifacts": {"public/task-graph.json": {"sha256": task_graph_sha256}},
    })
}

pub fn build_cot() -> Value {
    json!({
        "taskId": BUILD_ID,
        "environment": {"imageHash": format!("sha256:{}", built_image_digest())},
        "artifacts": {},
    })
}

pub fn docker_image_cot() -> Value {
    json!({
        "taskId": DOCKER_IMAGE_ID,
        "environment": {"imageHash": docker_image_hash()},
        "artifacts": {IMAGE_ARTIFACT: {"sha256": built_image_digest()}},
    })
}
