use thiserror::Error;

use crate::decode::FileFormat;

/// Top-level error returned by [`crate::Era5`] retrieval calls.
#[derive(Debug, Error)]
pub enum Era5Error {
    #[error("no registered backend serves dataset '{0}'")]
    UnknownDataset(String),

    #[error("no backend named '{0}' is registered")]
    UnknownBackend(String),

    #[error("variable '{variable}' is not available in dataset '{dataset}'")]
    UnsupportedVariable { dataset: String, variable: String },

    #[error(transparent)]
    InvalidConfiguration(#[from] ConfigError),

    #[error(
        "no data returned: all {requested} sub-requests for dataset '{dataset}' \
         failed or came back empty"
    )]
    NoDataReturned { dataset: String, requested: usize },
}

/// Problems with the request itself, detected before any network activity.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("hours step must be one of {allowed:?}, got {step}")]
    InvalidHoursStep { step: u32, allowed: &'static [u32] },

    #[error("no usable hours: supply a valid step or a non-empty list of hours below 24")]
    EmptyHours,

    #[error("station retrieval needs an hour selection (a step or explicit hours)")]
    MissingHours,

    #[error(
        "invalid bounding box: west {west} must be below east {east} and \
         south {south} below north {north}"
    )]
    InvalidBoundingBox {
        west: f64,
        east: f64,
        south: f64,
        north: f64,
    },

    #[error("invalid time range: start {start} is after end {end}")]
    InvalidTimeRange {
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    },

    #[error("at least one variable must be requested")]
    NoVariables,

    #[error("station retrieval requires at least one station coordinate")]
    NoStations,

    #[error("this build cannot decode {format} files (available: {available:?})")]
    FormatUnavailable {
        format: FileFormat,
        available: &'static [FileFormat],
    },

    #[error("missing credentials: set the {0} environment variable")]
    MissingCredentials(&'static str),
}
