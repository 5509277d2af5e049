//! Remote push collaborator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use fieldsync_common::{BucketKind, Error, Result, SyncItem};

/// One bucket's dirty items, as sent to the remote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushBatch {
    #[serde(rename = "type")]
    pub kind: BucketKind,
    pub items: Vec<SyncItem>,
    pub timestamp: DateTime<Utc>,
}

impl PushBatch {
    pub fn new(kind: BucketKind, items: Vec<SyncItem>) -> Self {
        Self {
            kind,
            items,
            timestamp: Utc::now(),
        }
    }
}

/// The remote's verdict on a batch. There is no per-item acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PushResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }

    /// Turn a negative verdict into `RemoteRejected`.
    pub fn into_result(self) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            Err(Error::RemoteRejected(
                self.error.unwrap_or_else(|| "no reason given".to_string()),
            ))
        }
    }
}

/// Endpoint that accepts a bucket of dirty records.
#[async_trait]
pub trait RemotePush: Send + Sync {
    /// Push a whole bucket.
    ///
    /// # Errors
    /// - `Network` for transport failures
    /// - `RemoteRejected` for non-2xx responses
    async fn push(&self, batch: PushBatch) -> Result<PushResponse>;
}

/// HTTP implementation posting JSON batches to `<base>/sync/<bucket>`.
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: url::Url,
}

impl HttpRemote {
    /// Create a remote for the given base URL.
    ///
    /// # Errors
    /// - Invalid URL
    /// - HTTP client construction failure
    pub fn new(base_url: &str, request_timeout: Option<Duration>) -> Result<Self> {
        let mut base_url = url::Url::parse(base_url)
            .map_err(|e| Error::InvalidInput(format!("Invalid remote URL '{}': {}", base_url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut builder = reqwest::Client::builder();
        if let Some(request_timeout) = request_timeout {
            builder = builder.timeout(request_timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    /// Endpoint for a bucket.
    pub fn endpoint(&self, kind: BucketKind) -> Result<url::Url> {
        self.base_url
            .join(&format!("sync/{}", kind))
            .map_err(|e| Error::InvalidInput(e.to_string()))
    }
}

#[async_trait]
impl RemotePush for HttpRemote {
    async fn push(&self, batch: PushBatch) -> Result<PushResponse> {
        let endpoint = self.endpoint(batch.kind)?;
        debug!("POST {} ({} items)", endpoint, batch.items.len());

        let response = self
            .client
            .post(endpoint)
            .json(&batch)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::RemoteRejected(format!("HTTP {}", status.as_u16())));
        }

        // A 2xx with no parseable verdict counts as acceptance
        let body = response
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        match serde_json::from_str::<PushResponse>(&body) {
            Ok(verdict) => Ok(verdict),
            Err(_) => {
                debug!("Unparseable 2xx body from remote, treating as success");
                Ok(PushResponse::ok())
            }
        }
    }
}
