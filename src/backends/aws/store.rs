//! Byte access to the ERA5 open-data object store.

use std::path::Path;

use async_trait::async_trait;
use log::warn;

use crate::backends::aws::error::AwsError;
use crate::backends::spool_response_to;

/// Public endpoint of the `era5-pds` bucket.
pub const ERA5_PDS_ENDPOINT: &str = "https://era5-pds.s3.amazonaws.com";

/// Opaque "fetch bytes for a named key" service.
///
/// The production implementation is [`HttpObjectReader`]; tests substitute
/// in-memory fakes.
#[async_trait]
pub trait ObjectReader: Send + Sync {
    /// Streams the object at `key` into `dest`, returning the byte count.
    async fn fetch_to(&self, key: &str, dest: &Path) -> Result<u64, AwsError>;
}

/// Reads bucket objects over plain HTTPS; the bucket is public, so no
/// credentials are involved.
pub struct HttpObjectReader {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpObjectReader {
    pub fn new(endpoint: impl Into<String>) -> Self {
        HttpObjectReader {
            endpoint: endpoint.into(),
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpObjectReader {
    fn default() -> Self {
        HttpObjectReader::new(ERA5_PDS_ENDPOINT)
    }
}

#[async_trait]
impl ObjectReader for HttpObjectReader {
    async fn fetch_to(&self, key: &str, dest: &Path) -> Result<u64, AwsError> {
        let url = format!("{}/{}", self.endpoint, key);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AwsError::Network(key.to_string(), e))?;

        let response = match response.error_for_status() {
            Ok(response) => response,
            Err(e) => {
                warn!("HTTP error for {url}: {e:?}");
                return Err(if let Some(status) = e.status() {
                    AwsError::HttpStatus {
                        key: key.to_string(),
                        status,
                        source: e,
                    }
                } else {
                    AwsError::Network(key.to_string(), e)
                });
            }
        };

        spool_response_to(response, dest)
            .await
            .map_err(|e| AwsError::Spool(key.to_string(), e))
    }
}
