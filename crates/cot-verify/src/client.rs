//! HTTP client for the task queue.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use cot_core::TaskId;

use crate::queue::{ArtifactTransport, ClientError, TaskQueue};

/// HTTP client for a Taskcluster-style queue.
pub struct HttpQueueClient {
    inner: reqwest::Client,
    root_url: String,
}

impl HttpQueueClient {
    /// Create a new HTTP client.
    pub fn new(root_url: &str) -> Self {
        Self {
            inner: reqwest::Client::new(),
            root_url: root_url.trim_end_matches('/').to_string(),
        }
    }

    fn task_url(&self, task_id: &TaskId) -> String {
        format!("{}/api/queue/v1/task/{}", self.root_url, task_id)
    }
}

#[async_trait]
impl TaskQueue for HttpQueueClient {
    async fn get_task(&self, task_id: &TaskId) -> Result<Value, ClientError> {
        let url = self.task_url(task_id);
        debug!(url = %url, "GET task");

        let response = self.inner.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ClientError::NotFound(format!(
                "HTTP {}: {}",
                response.status(),
                url
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl ArtifactTransport for HttpQueueClient {
    fn artifact_url(&self, task_id: &TaskId, path: &str) -> String {
        format!("{}/artifacts/{}", self.task_url(task_id), path)
    }

    async fn download(&self, url: &str, destination: &Path) -> Result<(), ClientError> {
        debug!(url = %url, destination = %destination.display(), "Downloading artifact");

        let mut response = self.inner.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ClientError::NotFound(format!(
                "HTTP {}: {}",
                response.status(),
                url
            )));
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(destination).await?;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let client = HttpQueueClient::new("https://queue.example.com/");
        let id = TaskId::new("abc");
        assert_eq!(
            client.task_url(&id),
            "https://queue.example.com/api/queue/v1/task/abc"
        );
        assert_eq!(
            client.artifact_url(&id, "public/chainOfTrust.json.asc"),
            "https://queue.example.com/api/queue/v1/task/abc/artifacts/public/chainOfTrust.json.asc"
        );
    }
}
