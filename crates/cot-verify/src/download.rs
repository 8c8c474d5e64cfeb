//! Downloads of signed attestations and hash-checked artifacts.

use std::collections::BTreeMap;
use std::path::PathBuf;

use futures_util::future::try_join_all;
use tracing::{debug, info};

use cot_core::{file_digest, CotError, DigestAlgorithm, Result, TaskId};

use crate::chain::Chain;
use crate::link::{Link, SIGNED_COT_PATH, TASK_GRAPH_PATH};

/// Artifact paths to download, per task.
pub type ArtifactRequests = BTreeMap<TaskId, Vec<String>>;

async fn download_to(chain: &Chain, link: &Link, path: &str) -> Result<PathBuf> {
    let destination = link.artifact_path(path)?;
    let transport = &chain.context().transport;
    let url = transport.artifact_url(link.task_id(), path);

    transport
        .download(&url, &destination)
        .await
        .map_err(|e| CotError::Download {
            task_id: link.task_id().to_string(),
            path: path.to_string(),
            reason: e.to_string(),
        })?;
    Ok(destination)
}

/// Hash a downloaded file on the blocking pool.
async fn hash_file(path: PathBuf, algorithm: DigestAlgorithm) -> Result<String> {
    let hashed = path.clone();
    tokio::task::spawn_blocking(move || file_digest(&hashed, algorithm))
        .await
        .map_err(|e| CotError::io(&path, e))?
}

/// Download every link's signed chain-of-trust document.
///
/// All downloads run concurrently; any failure fails the whole chain.
pub async fn download_cot(chain: &Chain) -> Result<()> {
    info!(links = chain.links().len(), "Downloading chain of trust documents");
    try_join_all(
        chain
            .links()
            .iter()
            .map(|link| download_to(chain, link, SIGNED_COT_PATH)),
    )
    .await?;
    Ok(())
}

/// Download one artifact and check it against its declared digest.
///
/// The link's attestation must already be verified.
pub async fn download_cot_artifact(chain: &Chain, task_id: &TaskId, path: &str) -> Result<PathBuf> {
    let link = chain.get_link(task_id)?;
    let algorithm = DigestAlgorithm::Sha256;
    let expected = link.attestation()?.artifact_digest(path, algorithm)?.to_ascii_lowercase();

    let local = download_to(chain, link, path).await?;
    let actual = hash_file(local.clone(), algorithm).await?;
    if actual != expected {
        return Err(CotError::Digest {
            task_id: task_id.to_string(),
            path: path.to_string(),
            reason: format!("expected {algorithm} {expected}, got {actual}"),
        });
    }

    debug!(task_id = %task_id, path = %path, digest = %actual, "Artifact digest verified");
    Ok(local)
}

/// Download and verify every requested artifact concurrently.
///
/// Returns the local paths of all downloaded artifacts.
pub async fn download_cot_artifacts(chain: &Chain, requests: &ArtifactRequests) -> Result<Vec<PathBuf>> {
    let downloads = requests.iter().flat_map(|(task_id, paths)| {
        paths
            .iter()
            .map(move |path| download_cot_artifact(chain, task_id, path))
    });
    try_join_all(downloads).await
}

/// Artifacts a release task needs verified: the decision task's task graph
/// and every upstream artifact of the root task.
pub fn firefox_cot_artifact_requests(chain: &Chain) -> Result<ArtifactRequests> {
    let mut requests = ArtifactRequests::new();
    requests
        .entry(chain.decision_task_id()?)
        .or_default()
        .push(TASK_GRAPH_PATH.to_string());

    for upstream in chain.task()?.upstream_artifacts()? {
        let paths = requests.entry(upstream.task_id).or_default();
        for path in upstream.paths {
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
    }
    Ok(requests)
}

/// Download the artifacts named by [`firefox_cot_artifact_requests`].
pub async fn download_firefox_cot_artifacts(chain: &Chain) -> Result<Vec<PathBuf>> {
    let requests = firefox_cot_artifact_requests(chain)?;
    info!(tasks = requests.len(), "Downloading chain of trust artifacts");
    download_cot_artifacts(chain, &requests).await
}
