//! Blocking request transports used by a caller waiting on the responder.

use super::service::{SourceIdReply, SyncService};
use crate::config::SyncConfig;
use crate::error::{BridgeError, Result};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::debug;
use url::Url;

/// Blocking request primitive.
///
/// Every method blocks the calling thread until the responder answers, so
/// none of them may be called from inside an async task.
pub trait BlockingTransport: Send + Sync {
    /// `GetId`.
    fn request_id(&self) -> Result<SourceIdReply>;

    /// `GetResult`; `Ok(None)` when the responder timed out.
    fn request_result(&self, id: u8) -> Result<Option<Bytes>>;

    /// Deliver a result record to the responder's store.
    fn post_result(&self, record: Bytes) -> Result<()>;
}

/// Transport to a [`SyncService`] running on a tokio runtime in this process.
#[derive(Debug, Clone)]
pub struct InProcessTransport {
    service: Arc<SyncService>,
    runtime: Handle,
}

impl InProcessTransport {
    pub fn new(service: Arc<SyncService>, runtime: Handle) -> Self {
        Self { service, runtime }
    }

    pub fn service(&self) -> &Arc<SyncService> {
        &self.service
    }
}

impl BlockingTransport for InProcessTransport {
    fn request_id(&self) -> Result<SourceIdReply> {
        Ok(self.service.assign_id())
    }

    fn request_result(&self, id: u8) -> Result<Option<Bytes>> {
        if Handle::try_current().is_ok() {
            return Err(BridgeError::Other(
                "blocking sync request issued from inside an async runtime".to_string(),
            ));
        }
        self.runtime
            .block_on(self.service.get_result(i64::from(id)))
    }

    fn post_result(&self, record: Bytes) -> Result<()> {
        if !self.service.set_result(record) {
            return Err(BridgeError::malformed(
                "Res",
                "result record does not carry an assignable source id",
            ));
        }
        Ok(())
    }
}

/// Transport to a responder served over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSyncTransport {
    client: reqwest::blocking::Client,
    endpoint: Url,
}

impl HttpSyncTransport {
    /// Connect to the responder at `base_url`.
    ///
    /// The request timeout covers the responder's own result ceiling plus a
    /// few seconds of slack.
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, SyncConfig::RESULT_TIMEOUT + Duration::from_secs(5))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(base_url)?.join(SyncConfig::ENDPOINT_PATH)?;
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BridgeError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                cause: None,
            })?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn action_url(&self, action: &str, id: Option<u8>) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("action", action);
            if let Some(id) = id {
                query.append_pair("id", &id.to_string());
            }
        }
        url
    }

    fn check_status(response: &reqwest::blocking::Response, action: &str) -> Result<()> {
        if !response.status().is_success() {
            return Err(BridgeError::Network {
                message: format!("{} failed with HTTP {}", action, response.status()),
                cause: None,
            });
        }
        Ok(())
    }
}

impl BlockingTransport for HttpSyncTransport {
    fn request_id(&self) -> Result<SourceIdReply> {
        let url = self.action_url(SyncConfig::ACTION_GET_ID, None);
        debug!("GET {}", url);
        let response = self.client.get(url).send()?;
        Self::check_status(&response, SyncConfig::ACTION_GET_ID)?;
        SourceIdReply::parse(&response.text()?)
    }

    fn request_result(&self, id: u8) -> Result<Option<Bytes>> {
        let url = self.action_url(SyncConfig::ACTION_GET_RESULT, Some(id));
        debug!("GET {}", url);
        let response = self.client.get(url).send()?;
        Self::check_status(&response, SyncConfig::ACTION_GET_RESULT)?;
        let body = response.bytes()?;
        Ok((!body.is_empty()).then_some(body))
    }

    fn post_result(&self, record: Bytes) -> Result<()> {
        let url = self.action_url(SyncConfig::ACTION_SET_RESULT, None);
        debug!("POST {} ({} bytes)", url, record.len());
        let response = self.client.post(url).body(record).send()?;
        Self::check_status(&response, SyncConfig::ACTION_SET_RESULT)
    }
}
