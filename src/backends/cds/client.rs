//! HTTP transport for the climate data store API.
//!
//! The API is request-based: a retrieval is submitted, polled until the
//! backend has produced the output file, and then downloaded from the
//! location the completed task reports.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Deserialize;

use crate::backends::cds::error::CdsError;
use crate::backends::cds::request::CdsPayload;
use crate::backends::spool_response_to;
use crate::error::ConfigError;

/// Default API root used when `CDSAPI_URL` is not set.
pub const DEFAULT_CDS_URL: &str = "https://cds.climate.copernicus.eu/api";

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Handle to a produced output file, ready to be downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub location: String,
    pub content_length: Option<u64>,
}

/// Opaque submit/poll/download service for one retrieval.
///
/// The production implementation is [`CdsHttpClient`]; tests substitute
/// fakes that serve canned files.
#[async_trait]
pub trait CdsTransport: Send + Sync {
    /// Submits the request and waits until the backend reports it complete.
    async fn retrieve(&self, dataset: &str, payload: &CdsPayload)
        -> Result<RemoteFile, CdsError>;

    /// Streams the produced file into `dest`, returning the byte count.
    async fn download(&self, remote: &RemoteFile, dest: &Path) -> Result<u64, CdsError>;
}

#[derive(Debug, Deserialize)]
struct TaskReply {
    state: String,
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    content_length: Option<u64>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Talks to the real API with key authentication.
///
/// Credential *management* is out of scope here: the key is handed in
/// explicitly (or read once from `CDSAPI_URL`/`CDSAPI_KEY`), never loaded
/// from an rc file.
pub struct CdsHttpClient {
    base_url: String,
    key: String,
    http: reqwest::Client,
    poll_interval: Duration,
}

impl CdsHttpClient {
    pub fn new(base_url: impl Into<String>, key: impl Into<String>) -> Self {
        CdsHttpClient {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key: key.into(),
            http: reqwest::Client::new(),
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Builds a client from `CDSAPI_URL` (optional) and `CDSAPI_KEY`
    /// (required).
    pub fn from_env() -> Result<Self, ConfigError> {
        let url =
            std::env::var("CDSAPI_URL").unwrap_or_else(|_| DEFAULT_CDS_URL.to_string());
        let key = std::env::var("CDSAPI_KEY")
            .map_err(|_| ConfigError::MissingCredentials("CDSAPI_KEY"))?;
        Ok(CdsHttpClient::new(url, key))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        // Legacy keys look like "uid:secret"; newer personal access tokens
        // are a single opaque string.
        match self.key.split_once(':') {
            Some((uid, secret)) => request.basic_auth(uid, Some(secret)),
            None => request.header("PRIVATE-TOKEN", &self.key),
        }
    }

    async fn send_checked(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<reqwest::Response, CdsError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| CdsError::Network(url.to_string(), e))?;
        match response.error_for_status() {
            Ok(response) => Ok(response),
            Err(e) => {
                warn!("HTTP error for {url}: {e:?}");
                Err(if let Some(status) = e.status() {
                    CdsError::HttpStatus {
                        url: url.to_string(),
                        status,
                        source: e,
                    }
                } else {
                    CdsError::Network(url.to_string(), e)
                })
            }
        }
    }

    async fn task_reply(&self, response: reqwest::Response) -> Result<TaskReply, CdsError> {
        response
            .json::<TaskReply>()
            .await
            .map_err(|e| CdsError::InvalidReply(e.to_string()))
    }
}

#[async_trait]
impl CdsTransport for CdsHttpClient {
    async fn retrieve(
        &self,
        dataset: &str,
        payload: &CdsPayload,
    ) -> Result<RemoteFile, CdsError> {
        let submit_url = format!("{}/resources/{}", self.base_url, dataset);
        info!("submitting retrieval for '{}' to {submit_url}", payload.variable);

        let response = self
            .send_checked(self.http.post(&submit_url).json(payload), &submit_url)
            .await?;
        let mut reply = self.task_reply(response).await?;

        // No deadline on purpose: the queue can hold a request for a long
        // time, and the caller's batch semantics already document that a
        // stalled task stalls the batch.
        loop {
            if reply.state == "completed" {
                let location = reply.location.take().ok_or(CdsError::MissingLocation)?;
                return Ok(RemoteFile {
                    location,
                    content_length: reply.content_length,
                });
            }
            if reply.state == "failed" {
                let message = reply
                    .error
                    .take()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no error details".to_string());
                return Err(CdsError::TaskFailed(message));
            }

            debug!(
                "task for '{}' is {}; polling again",
                payload.variable, reply.state
            );
            let request_id = reply.request_id.take().ok_or_else(|| {
                CdsError::InvalidReply(format!(
                    "state '{}' reply carries no request id",
                    reply.state
                ))
            })?;
            tokio::time::sleep(self.poll_interval).await;
            let poll_url = format!("{}/tasks/{}", self.base_url, request_id);
            let response = self.send_checked(self.http.get(&poll_url), &poll_url).await?;
            reply = self.task_reply(response).await?;
            if reply.request_id.is_none() {
                reply.request_id = Some(request_id);
            }
        }
    }

    async fn download(&self, remote: &RemoteFile, dest: &Path) -> Result<u64, CdsError> {
        let url = if remote.location.starts_with("http") {
            remote.location.clone()
        } else {
            format!("{}/{}", self.base_url, remote.location.trim_start_matches('/'))
        };
        let response = self.send_checked(self.http.get(&url), &url).await?;
        let copied = spool_response_to(response, dest)
            .await
            .map_err(|e| CdsError::Spool(url.clone(), e))?;
        if let Some(expected) = remote.content_length {
            if copied != expected {
                warn!("downloaded {copied} bytes from {url}, expected {expected}");
            }
        }
        Ok(copied)
    }
}
