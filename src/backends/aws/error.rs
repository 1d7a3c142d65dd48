use thiserror::Error;

use crate::decode::DecodeError;

/// Failure of one sub-request against the open-data store.
///
/// These never abort a batch; the executor records them and reassembly
/// degrades the affected variable.
#[derive(Debug, Error)]
pub enum AwsError {
    #[error("request failed for object '{0}'")]
    Network(String, #[source] reqwest::Error),

    #[error("object '{key}' returned HTTP {status}")]
    HttpStatus {
        key: String,
        status: reqwest::StatusCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("I/O error while spooling object '{0}'")]
    Spool(String, #[source] std::io::Error),

    #[error("failed to decode object '{0}'")]
    Decode(String, #[source] DecodeError),

    #[error("background decode task failed")]
    TaskJoin(#[from] tokio::task::JoinError),
}
