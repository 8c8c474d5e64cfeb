//! Verified chain-of-trust attestations.

use serde_json::{Map, Value};

use crate::{CotError, DigestAlgorithm, Result, TaskId};

/// The parsed content of a signed chain-of-trust document.
///
/// Only built from plaintext that already passed signature verification.
#[derive(Debug, Clone, PartialEq)]
pub struct Attestation {
    task_id: TaskId,
    raw: Map<String, Value>,
}

impl Attestation {
    /// Validate that `value` is a mapping and wrap it.
    pub fn from_value(task_id: &TaskId, value: Value) -> Result<Self> {
        match value {
            Value::Object(raw) => Ok(Self {
                task_id: task_id.clone(),
                raw,
            }),
            other => Err(CotError::InvalidAttestation {
                task_id: task_id.to_string(),
                reason: format!("expected a mapping, got {}", json_kind(&other)),
            }),
        }
    }

    pub fn as_json(&self) -> &Map<String, Value> {
        &self.raw
    }

    /// `environment.imageHash`, e.g. `sha256:abcd...`.
    pub fn image_hash(&self) -> Option<&str> {
        self.raw.get("environment")?.get("imageHash")?.as_str()
    }

    /// Declared digest of the artifact at `path`.
    ///
    /// Fails when the artifact or its digest is absent, or when the digest
    /// is not well-formed hex for `algorithm`.
    pub fn artifact_digest(&self, path: &str, algorithm: DigestAlgorithm) -> Result<&str> {
        let fail = |reason: String| CotError::Digest {
            task_id: self.task_id.to_string(),
            path: path.to_string(),
            reason,
        };

        let digest = self
            .raw
            .get("artifacts")
            .and_then(|artifacts| artifacts.get(path))
            .and_then(|entry| entry.get(algorithm.as_str()))
            .filter(|digest| !digest.is_null())
            .ok_or_else(|| fail(format!("no {algorithm} digest declared")))?;

        let digest = digest
            .as_str()
            .ok_or_else(|| fail(format!("{algorithm} digest is not a string")))?;
        if !algorithm.is_well_formed(digest) {
            return Err(fail(format!("malformed {algorithm} digest {digest:?}")));
        }
        Ok(digest)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
