//! The per-call retrieval request and its immutable configuration.

use chrono::{DateTime, Utc};
use log::warn;
use serde_json::Value;

use crate::decode::FileFormat;
use crate::error::ConfigError;
use crate::time_select::HourSelection;
use crate::types::bounding_box::BoundingBox;

/// A named point of interest for station retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct StationPoint {
    pub id: String,
    pub longitude: f64,
    pub latitude: f64,
}

impl StationPoint {
    pub fn new(id: impl Into<String>, longitude: f64, latitude: f64) -> Self {
        StationPoint {
            id: id.into(),
            longitude,
            latitude,
        }
    }
}

/// Immutable per-call configuration.
///
/// Constructed fresh for every retrieval so that concurrent calls on the
/// same client can never interfere with each other.
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    /// Run sub-request fetches concurrently; `false` forces one at a time.
    pub parallel: bool,
    /// Upper bound on in-flight fetches; defaults to the host CPU count.
    pub worker_limit: Option<usize>,
    /// Hour selection for station retrieval; the bulk store is
    /// hourly-complete and ignores it.
    pub hours: Option<HourSelection>,
    /// Stations for point retrieval.
    pub stations: Vec<StationPoint>,
    /// Download format for backends that offer a choice.
    pub file_format: FileFormat,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        RetrievalOptions {
            parallel: true,
            worker_limit: None,
            hours: None,
            stations: Vec::new(),
            file_format: FileFormat::NetCdf,
        }
    }
}

impl RetrievalOptions {
    /// Applies a loosely-typed options map.
    ///
    /// Recognized keys are `use_parallelism` (boolean) and `worker_limit`
    /// (positive integer). Unrecognized or mistyped keys log a warning and
    /// leave the defaults in place rather than failing the call.
    pub fn apply_map(&mut self, map: &serde_json::Map<String, Value>) {
        for (key, value) in map {
            match key.as_str() {
                "use_parallelism" => match value.as_bool() {
                    Some(parallel) => self.parallel = parallel,
                    None => warn!("option use_parallelism must be a boolean; keeping default"),
                },
                "worker_limit" => match value.as_u64() {
                    Some(limit) if limit >= 1 => self.worker_limit = Some(limit as usize),
                    _ => warn!("option worker_limit must be a positive integer; keeping default"),
                },
                other => warn!("ignoring unrecognized option '{other}'"),
            }
        }
    }

    /// The worker-pool bound for this call.
    pub fn effective_worker_limit(&self) -> usize {
        if !self.parallel {
            return 1;
        }
        self.worker_limit.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

/// One retrieval request, handed to the backend responsible for the dataset.
#[derive(Debug, Clone)]
pub struct DataRequest {
    pub dataset: String,
    pub variables: Vec<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub bbox: BoundingBox,
    pub options: RetrievalOptions,
}

impl DataRequest {
    /// Checks the request invariants that hold for every backend.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.variables.is_empty() {
            return Err(ConfigError::NoVariables);
        }
        if self.start > self.end {
            return Err(ConfigError::InvalidTimeRange {
                start: self.start,
                end: self.end,
            });
        }
        self.bbox.validate()
    }
}
