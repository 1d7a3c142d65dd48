use thiserror::Error;

use crate::decode::DecodeError;

/// Failure of one sub-request against the climate data store API.
///
/// Absorbed at the executor boundary like [`crate::AwsError`]; a failed
/// station/variable pair degrades the result instead of aborting the batch.
#[derive(Debug, Error)]
pub enum CdsError {
    #[error("request failed for {0}")]
    Network(String, #[source] reqwest::Error),

    #[error("request for {url} returned HTTP {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("could not parse the API reply: {0}")]
    InvalidReply(String),

    #[error("the API reported the retrieval task as failed: {0}")]
    TaskFailed(String),

    #[error("the completed task reply carries no download location")]
    MissingLocation,

    #[error("I/O error while spooling the result for {0}")]
    Spool(String, #[source] std::io::Error),

    #[error("failed to decode the result for {0}")]
    Decode(String, #[source] DecodeError),

    #[error("background decode task failed")]
    TaskJoin(#[from] tokio::task::JoinError),
}
