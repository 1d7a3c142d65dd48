//! Main entry point for retrieving ERA5 data.
//!
//! An [`Era5`] client owns a read-only registry of backends and turns one
//! `get_data` call into backend-specific sub-requests, runs them
//! concurrently, and hands back a single normalized dataset.

use std::sync::Arc;

use bon::bon;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::backends::aws::accessor::AwsAccessor;
use crate::backends::cds::accessor::CdsAccessor;
use crate::decode::FileFormat;
use crate::error::Era5Error;
use crate::registry::{AccessorRegistry, DataAccessor};
use crate::time_select::HourSelection;
use crate::types::bounding_box::BoundingBox;
use crate::types::dataset::Era5Dataset;
use crate::types::request::{DataRequest, RetrievalOptions, StationPoint};

/// Client for fetching ERA5 reanalysis data from the registered backends.
///
/// The registry is fixed at construction time; every retrieval call gets
/// its own immutable configuration, so one client can serve concurrent
/// calls without interference.
///
/// # Examples
///
/// ```no_run
/// # async fn run() -> Result<(), era5_accessor::Era5Error> {
/// let client = era5_accessor::Era5::from_env()?;
/// println!("datasets: {:?}", client.supported_datasets());
/// # Ok(())
/// # }
/// ```
pub struct Era5 {
    registry: AccessorRegistry,
}

#[bon]
impl Era5 {
    /// Creates a client with the two production backends.
    ///
    /// The open-data store backend needs no credentials and is registered
    /// first, so it wins dataset-only lookups. The CDS backend reads
    /// `CDSAPI_URL`/`CDSAPI_KEY` once, here.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConfigError::MissingCredentials`] (wrapped) when
    /// `CDSAPI_KEY` is not set.
    pub fn from_env() -> Result<Self, Era5Error> {
        let aws = AwsAccessor::from_defaults();
        let cds = CdsAccessor::from_env()?;
        Ok(Era5::with_accessors(vec![Arc::new(aws), Arc::new(cds)]))
    }

    /// Creates a client over an explicit backend list.
    ///
    /// Registration order decides which backend wins when several serve
    /// the same dataset name.
    pub fn with_accessors(accessors: Vec<Arc<dyn DataAccessor>>) -> Self {
        Era5 {
            registry: AccessorRegistry::new(accessors),
        }
    }

    /// Names of the registered backends.
    pub fn backends(&self) -> Vec<&'static str> {
        self.registry.backend_names()
    }

    /// All dataset names served by any registered backend.
    pub fn supported_datasets(&self) -> Vec<&'static str> {
        self.registry.supported_datasets()
    }

    /// Variables available for a dataset, from the backend that would
    /// serve it.
    ///
    /// # Errors
    ///
    /// [`Era5Error::UnknownDataset`] when no backend serves the dataset.
    pub fn dataset_variables(
        &self,
        dataset: &str,
    ) -> Result<&'static [&'static str], Era5Error> {
        let accessor = self.registry.for_dataset(dataset)?;
        accessor
            .dataset_variables(dataset)
            .ok_or_else(|| Era5Error::UnknownDataset(dataset.to_string()))
    }

    /// Retrieves and normalizes data for a time range, variable list and
    /// bounding box.
    ///
    /// This method uses a builder pattern.
    ///
    /// # Arguments
    ///
    /// * `.dataset(&str)`: **Required.** Dataset name, e.g. `"reanalysis-era5-single-levels"`.
    /// * `.variables(Vec<String>)`: **Required.** Variables in the order they should appear in the result.
    /// * `.start(DateTime<Utc>)` / `.end(DateTime<Utc>)`: **Required.** Inclusive time window.
    /// * `.bbox(BoundingBox)`: **Required.** Spatial window.
    /// * `.backend(&str)`: Optional. Pins a specific backend instead of resolving by dataset name.
    /// * `.options(serde_json::Map)`: Optional. Loosely-typed options; recognized keys are
    ///   `use_parallelism` (bool) and `worker_limit` (int). Unrecognized or mistyped keys
    ///   warn and fall back to defaults.
    /// * `.hours(HourSelection)`: Optional. Hour coverage for station retrieval.
    /// * `.stations(Vec<StationPoint>)`: Optional. Stations for point retrieval.
    /// * `.file_format(FileFormat)`: Optional. Download format where the backend offers a choice.
    ///
    /// # Errors
    ///
    /// Capability and configuration errors ([`Era5Error::UnknownDataset`],
    /// [`Era5Error::UnknownBackend`], [`Era5Error::UnsupportedVariable`],
    /// [`Era5Error::InvalidConfiguration`]) are raised before any network
    /// activity. Individual sub-request failures degrade the result; only
    /// a fully empty result raises [`Era5Error::NoDataReturned`].
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use chrono::{TimeZone, Utc};
    /// use era5_accessor::{BoundingBox, Era5};
    ///
    /// # async fn run() -> Result<(), era5_accessor::Era5Error> {
    /// let client = Era5::from_env()?;
    /// let data = client
    ///     .get_data()
    ///     .dataset("reanalysis-era5-single-levels")
    ///     .variables(vec!["2m_temperature".to_string()])
    ///     .start(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap())
    ///     .end(Utc.with_ymd_and_hms(2020, 1, 31, 23, 0, 0).unwrap())
    ///     .bbox(BoundingBox::new(-1.0, 1.0, -1.0, 1.0)?)
    ///     .call()
    ///     .await?;
    /// println!("{} timesteps, variables {:?}", data.time_len(), data.variable_names());
    /// data.close();
    /// # Ok(())
    /// # }
    /// ```
    #[builder]
    pub async fn get_data(
        &self,
        dataset: &str,
        variables: Vec<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        bbox: BoundingBox,
        backend: Option<&str>,
        options: Option<serde_json::Map<String, Value>>,
        hours: Option<HourSelection>,
        stations: Option<Vec<StationPoint>>,
        file_format: Option<FileFormat>,
    ) -> Result<Era5Dataset, Era5Error> {
        let accessor = match backend {
            Some(name) => {
                let accessor = self.registry.by_name(name)?;
                if !accessor.supported_datasets().contains(&dataset) {
                    return Err(Era5Error::UnknownDataset(dataset.to_string()));
                }
                accessor
            }
            None => self.registry.for_dataset(dataset)?,
        };

        // Capability validation happens here, before any sub-request is
        // built or any byte is fetched.
        for variable in &variables {
            if !accessor.supports_variable(dataset, variable) {
                return Err(Era5Error::UnsupportedVariable {
                    dataset: dataset.to_string(),
                    variable: variable.clone(),
                });
            }
        }

        let mut retrieval_options = RetrievalOptions::default();
        if let Some(map) = &options {
            retrieval_options.apply_map(map);
        }
        retrieval_options.hours = hours;
        if let Some(stations) = stations {
            retrieval_options.stations = stations;
        }
        if let Some(format) = file_format {
            retrieval_options.file_format = format;
        }

        let request = DataRequest {
            dataset: dataset.to_string(),
            variables,
            start,
            end,
            bbox,
            options: retrieval_options,
        };
        request.validate()?;

        accessor.get_data(&request).await
    }
}
