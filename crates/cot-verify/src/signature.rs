//! Signature verification of chain-of-trust documents.
//!
//! The signed document is a JSON envelope carrying the attestation text and
//! a minisign signature over it:
//!
//! ```text
//! {"payload": "<attestation JSON>", "signature": "<minisign signature file>"}
//! ```

use minisign_verify::{PublicKey, Signature};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use cot_core::{Attestation, CotError, Result};

use crate::chain::Chain;

/// Errors returned by signature collaborators.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// A configured public key could not be decoded.
    #[error("Invalid public key: {0}")]
    InvalidKey(String),

    /// The signed document could not be parsed.
    #[error("Malformed signed document: {0}")]
    Malformed(String),

    /// No trusted key verifies the signature.
    #[error("Signature verification FAILED - no trusted key matches: {0}")]
    Untrusted(String),
}

/// Verifies signed bytes and returns the authenticated plaintext.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, signed: &[u8]) -> std::result::Result<Vec<u8>, SignatureError>;
}

/// Envelope holding a payload and its detached minisign signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedEnvelope {
    pub payload: String,
    pub signature: String,
}

/// [`SignatureVerifier`] backed by minisign public keys.
pub struct MinisignVerifier {
    keys: Vec<PublicKey>,
}

impl MinisignVerifier {
    /// Build a verifier from base64-encoded minisign public keys.
    pub fn from_base64_keys(keys: &[String]) -> std::result::Result<Self, SignatureError> {
        let keys = keys
            .iter()
            .map(|key| {
                PublicKey::from_base64(key).map_err(|e| SignatureError::InvalidKey(e.to_string()))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { keys })
    }
}

impl SignatureVerifier for MinisignVerifier {
    fn verify(&self, signed: &[u8]) -> std::result::Result<Vec<u8>, SignatureError> {
        let envelope: SignedEnvelope =
            serde_json::from_slice(signed).map_err(|e| SignatureError::Malformed(e.to_string()))?;
        let signature = Signature::decode(&envelope.signature)
            .map_err(|e| SignatureError::Malformed(e.to_string()))?;

        let mut last_error = "no trusted keys configured".to_string();
        for key in &self.keys {
            match key.verify(envelope.payload.as_bytes(), &signature, false) {
                Ok(()) => return Ok(envelope.payload.into_bytes()),
                Err(e) => last_error = e.to_string(),
            }
        }
        Err(SignatureError::Untrusted(last_error))
    }
}

/// Verify every link's signed attestation and attach the parsed content.
///
/// The verified plaintext is also written, pretty-printed, next to the
/// signed file for downstream consumers.
pub async fn verify_cot_signatures(chain: &Chain) -> Result<()> {
    let verifier = &chain.context().verifier;

    for link in chain.links() {
        let path = link.signed_cot_path();
        info!(task_id = %link.task_id(), role = %link.role(), "Verifying chain of trust signature");

        let signed = tokio::fs::read(&path)
            .await
            .map_err(|e| CotError::Signature {
                task_id: link.task_id().to_string(),
                reason: format!("can't read {}: {}", path.display(), e),
            })?;

        let plaintext = verifier
            .verify(&signed)
            .map_err(|e| CotError::Signature {
                task_id: link.task_id().to_string(),
                reason: e.to_string(),
            })?;

        let value: Value =
            serde_json::from_slice(&plaintext).map_err(|e| CotError::InvalidAttestation {
                task_id: link.task_id().to_string(),
                reason: format!("verified body is not JSON: {e}"),
            })?;
        let attestation = Attestation::from_value(link.task_id(), value)?;

        let unsigned = serde_json::to_string_pretty(attestation.as_json()).map_err(|e| {
            CotError::InvalidAttestation {
                task_id: link.task_id().to_string(),
                reason: e.to_string(),
            }
        })?;
        link.set_attestation(attestation)?;

        let unsigned_path = link.unsigned_cot_path();
        tokio::fs::write(&unsigned_path, unsigned)
            .await
            .map_err(|e| CotError::io(&unsigned_path, e))?;
        debug!(path = %unsigned_path.display(), "Wrote verified chain of trust");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;
    use crate::link::Link;
    use crate::testing::{context_with_verifier, task, PassthroughVerifier, RejectingVerifier};
    use cot_core::{RoleLabel, TaskId};
    use serde_json::json;
    use std::sync::Arc;

    const PUBLIC_KEY: &str = "RWQBAgMEBQYHCAOhB7/zzhC+HXDdGOdLwJln5NYwm6UNXx3chmQSVTG4";
    const PAYLOAD: &str =
        r#"{"artifacts":{},"environment":{"imageHash":"sha256:abc"},"taskId":"t1"}"#;
    const SIGNATURE: &str = "untrusted comment: signature from minisign secret key\nRUQBAgMEBQYHCDxidhbw9a+H1FDFLEds7rdBXIjrctQEPuGlwmWjxyRurbD7mdEt7hOb72uOrXviDbjtlsm1I5s90Ldt2Q9udgo=\ntrusted comment: timestamp:1700000000\tfile:chainOfTrust.json\nu95Lmhc2sKnmKL2ZIo8Fin7TfkTMIit2KO22fHDMdBUiuKdQpju0e7YlvCfUCyiZO34Mt1JW6GwXWXAo0Z7iAA==\n";

    fn envelope(payload: &str) -> Vec<u8> {
        serde_json::to_vec(&SignedEnvelope {
            payload: payload.to_string(),
            signature: SIGNATURE.to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_minisign_accepts_valid_signature() {
        let verifier = MinisignVerifier::from_base64_keys(&[PUBLIC_KEY.to_string()]).unwrap();
        let plaintext = verifier.verify(&envelope(PAYLOAD)).unwrap();
        assert_eq!(plaintext, PAYLOAD.as_bytes());
    }

    #[test]
    fn test_minisign_rejects_tampered_payload() {
        let verifier = MinisignVerifier::from_base64_keys(&[PUBLIC_KEY.to_string()]).unwrap();
        let tampered = PAYLOAD.replace("abc", "abd");
        assert!(matches!(
            verifier.verify(&envelope(&tampered)),
            Err(SignatureError::Untrusted(_))
        ));
    }

    #[test]
    fn test_minisign_rejects_without_keys() {
        let verifier = MinisignVerifier::from_base64_keys(&[]).unwrap();
        assert!(verifier.verify(&envelope(PAYLOAD)).is_err());
    }

    #[test]
    fn test_minisign_rejects_malformed() {
        let verifier = MinisignVerifier::from_base64_keys(&[PUBLIC_KEY.to_string()]).unwrap();
        assert!(matches!(
            verifier.verify(b"not json"),
            Err(SignatureError::Malformed(_))
        ));
        assert!(MinisignVerifier::from_base64_keys(&["nope".to_string()]).is_err());
    }

    fn chain_with_build(dir: &std::path::Path, verifier: Arc<dyn SignatureVerifier>) -> Chain {
        let ctx = context_with_verifier(dir, verifier);
        let link = Link::new(
            RoleLabel::new("build"),
            task("build_task_id", json!({})),
            ctx.config.cot_dir(&TaskId::new("build_task_id")).unwrap(),
        );
        Chain::from_links(ctx, vec![Arc::new(link)]).unwrap()
    }

    fn write_signed(chain: &Chain, body: &str) {
        let path = chain.links()[0].signed_cot_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[tokio::test]
    async fn test_verify_cot_signatures_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let chain = chain_with_build(dir.path(), Arc::new(PassthroughVerifier));
        let err = verify_cot_signatures(&chain).await.unwrap_err();
        assert!(matches!(err, CotError::Signature { .. }));
    }

    #[tokio::test]
    async fn test_verify_cot_signatures_bad_sig() {
        let dir = tempfile::tempdir().unwrap();
        let chain = chain_with_build(dir.path(), Arc::new(RejectingVerifier));
        write_signed(&chain, "{}");
        let err = verify_cot_signatures(&chain).await.unwrap_err();
        assert!(matches!(err, CotError::Signature { .. }));
        assert!(chain.links()[0].attestation().is_err());
    }

    #[tokio::test]
    async fn test_verify_cot_signatures_non_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let chain = chain_with_build(dir.path(), Arc::new(PassthroughVerifier));
        write_signed(&chain, "[1, 2]");
        let err = verify_cot_signatures(&chain).await.unwrap_err();
        assert!(matches!(err, CotError::InvalidAttestation { .. }));
    }

    #[tokio::test]
    async fn test_verify_cot_signatures() {
        let dir = tempfile::tempdir().unwrap();
        let chain = chain_with_build(dir.path(), Arc::new(PassthroughVerifier));
        write_signed(&chain, "{}");

        verify_cot_signatures(&chain).await.unwrap();

        let link = &chain.links()[0];
        assert!(link.attestation().unwrap().as_json().is_empty());
        let unsigned = std::fs::read_to_string(link.unsigned_cot_path()).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&unsigned).unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_verify_cot_signatures_with_minisign() {
        let dir = tempfile::tempdir().unwrap();
        let verifier = MinisignVerifier::from_base64_keys(&[PUBLIC_KEY.to_string()]).unwrap();
        let chain = chain_with_build(dir.path(), Arc::new(verifier));
        write_signed(&chain, std::str::from_utf8(&envelope(PAYLOAD)).unwrap());

        verify_cot_signatures(&chain).await.unwrap();
        assert_eq!(
            chain.links()[0].attestation().unwrap().image_hash(),
            Some("sha256:abc")
        );
    }
}
