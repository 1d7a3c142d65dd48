//! Station/point retrieval through the climate data store API.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use ndarray::Array2;

use crate::backends::cds::client::{CdsHttpClient, CdsTransport};
use crate::backends::cds::error::CdsError;
use crate::backends::cds::request::{station_sub_requests, CdsSubRequest};
use crate::decode::{decode_scratch, default_decoder, DatasetDecoder, FileFormat};
use crate::error::{ConfigError, Era5Error};
use crate::executor::fetch_all;
use crate::registry::DataAccessor;
use crate::scratch::scratch_file;
use crate::types::dataset::{
    DatasetAttrs, Era5Dataset, GridDataset, StationDataset, StationField, EPSG_WGS84,
};
use crate::types::request::DataRequest;

const INSTITUTION: &str = "ECMWF via Copernicus CDS";

pub(crate) const CDS_DATASETS: &[&str] = &["reanalysis-era5-single-levels"];

pub(crate) const CDS_VARIABLES: &[&str] = &[
    "10m_u_component_of_wind",
    "10m_v_component_of_wind",
    "100m_u_component_of_wind",
    "100m_v_component_of_wind",
    "2m_dewpoint_temperature",
    "2m_temperature",
    "maximum_2m_temperature_since_previous_post_processing",
    "minimum_2m_temperature_since_previous_post_processing",
    "mean_sea_level_pressure",
    "mean_wave_period",
    "mean_wave_direction",
    "significant_height_of_total_swell",
    "snow_density",
    "snow_depth",
    "surface_pressure",
    "surface_solar_radiation_downwards",
    "total_precipitation",
];

/// ERA5 through the request-based climate data store API.
///
/// One API call per station and variable; each result is a small area
/// window around the station, reduced to the nearest-grid-point series
/// during assembly.
pub struct CdsAccessor {
    transport: Arc<dyn CdsTransport>,
    decoder: Arc<dyn DatasetDecoder>,
}

impl CdsAccessor {
    pub fn new(transport: Arc<dyn CdsTransport>, decoder: Arc<dyn DatasetDecoder>) -> Self {
        CdsAccessor { transport, decoder }
    }

    /// Production wiring from `CDSAPI_URL`/`CDSAPI_KEY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(CdsAccessor::new(
            Arc::new(CdsHttpClient::from_env()?),
            default_decoder(),
        ))
    }

    async fn fetch_one(
        &self,
        dataset: &str,
        sub: &CdsSubRequest,
        format: FileFormat,
    ) -> Result<GridDataset, CdsError> {
        let label = sub.to_string();
        let remote = self.transport.retrieve(dataset, &sub.payload).await?;
        let scratch = scratch_file(format.extension())
            .map_err(|e| CdsError::Spool(label.clone(), e))?;
        self.transport.download(&remote, scratch.path()).await?;

        let decoded = decode_scratch(Arc::clone(&self.decoder), scratch).await?;
        decoded.map_err(|e| CdsError::Decode(label, e))
    }
}

#[async_trait]
impl DataAccessor for CdsAccessor {
    fn name(&self) -> &'static str {
        "era5-cds"
    }

    fn supported_datasets(&self) -> &'static [&'static str] {
        CDS_DATASETS
    }

    fn dataset_variables(&self, dataset: &str) -> Option<&'static [&'static str]> {
        CDS_DATASETS.contains(&dataset).then_some(CDS_VARIABLES)
    }

    async fn get_data(&self, request: &DataRequest) -> Result<Era5Dataset, Era5Error> {
        request.validate()?;
        let format = request.options.file_format;
        if !self.decoder.supports(format) {
            return Err(ConfigError::FormatUnavailable {
                format,
                available: self.decoder.formats(),
            }
            .into());
        }

        let subs = station_sub_requests(request, format)?;
        let requested = subs.len();
        info!("submitting {requested} retrievals for {} stations", request.options.stations.len());

        let outcomes = fetch_all(
            subs,
            request.options.effective_worker_limit(),
            |sub: CdsSubRequest| async move {
                let result = self.fetch_one(&request.dataset, &sub, format).await;
                (sub, result)
            },
        )
        .await;

        let mut results: HashMap<(String, String), GridDataset> = HashMap::new();
        let mut temp_files = Vec::new();
        for outcome in outcomes {
            if let Ok(mut dataset) = outcome.result {
                dataset.crop_time(request.start, request.end);
                temp_files.append(&mut dataset.temp_files);
                if dataset.times.is_empty() || dataset.fields.is_empty() {
                    warn!("empty result for {}; ignoring", outcome.key);
                    continue;
                }
                results.insert(
                    (outcome.key.station.id.clone(), outcome.key.variable.clone()),
                    dataset,
                );
            }
        }

        let stations = &request.options.stations;

        // The time axis comes from the first surviving piece in request
        // order; every hour-enumerated result covers the same instants.
        let mut times = None;
        'outer: for station in stations {
            for variable in &request.variables {
                if let Some(piece) = results.get(&(station.id.clone(), variable.clone())) {
                    times = Some(piece.times.clone());
                    break 'outer;
                }
            }
        }
        let Some(times) = times else {
            return Err(Era5Error::NoDataReturned {
                dataset: request.dataset.clone(),
                requested,
            });
        };

        let mut fields = Vec::new();
        for variable in &request.variables {
            let mut values = Array2::from_elem((times.len(), stations.len()), f64::NAN);
            let mut units = None;
            let mut any_data = false;
            for (column, station) in stations.iter().enumerate() {
                let Some(piece) = results.get(&(station.id.clone(), variable.clone())) else {
                    warn!("no data for station '{}' variable '{variable}'", station.id);
                    continue;
                };
                if piece.times != times {
                    warn!(
                        "time axis mismatch for station '{}' variable '{variable}'; \
                         leaving the column empty",
                        station.id
                    );
                    continue;
                }
                let series = piece.point_series(0, station.longitude, station.latitude);
                for (row, value) in series.into_iter().enumerate() {
                    values[[row, column]] = value;
                }
                if units.is_none() {
                    units = piece.fields[0].units.clone();
                }
                any_data = true;
            }
            if !any_data {
                warn!("could not get data for variable '{variable}'");
                continue;
            }
            fields.push(StationField {
                name: variable.clone(),
                units,
                values,
            });
        }

        if fields.is_empty() {
            return Err(Era5Error::NoDataReturned {
                dataset: request.dataset.clone(),
                requested,
            });
        }

        let mut attrs = DatasetAttrs::new(&request.dataset, INSTITUTION);
        // CRS goes on last, after the dataset is fully assembled.
        attrs.epsg = Some(EPSG_WGS84);
        Ok(Era5Dataset::Stations(StationDataset {
            times,
            stations: stations.clone(),
            fields,
            attrs,
            temp_files,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::cds::client::RemoteFile;
    use crate::backends::cds::request::CdsPayload;
    use crate::decode::DecodeError;
    use crate::time_select::HourSelection;
    use crate::types::bounding_box::BoundingBox;
    use crate::types::dataset::GridField;
    use crate::types::request::{RetrievalOptions, StationPoint};
    use chrono::{DateTime, NaiveDate, TimeZone, Timelike, Utc};
    use ndarray::Array3;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves the submitted payload back as the "downloaded" file, so the
    /// fake decoder can reconstruct exactly what was asked for.
    struct FakeTransport {
        submissions: AtomicUsize,
        fail_variable: Option<String>,
        fail_window_west: Option<f64>,
    }

    impl FakeTransport {
        fn new() -> Self {
            FakeTransport {
                submissions: AtomicUsize::new(0),
                fail_variable: None,
                fail_window_west: None,
            }
        }
    }

    #[async_trait]
    impl CdsTransport for FakeTransport {
        async fn retrieve(
            &self,
            _dataset: &str,
            payload: &CdsPayload,
        ) -> Result<RemoteFile, CdsError> {
            self.submissions.fetch_add(1, Ordering::SeqCst);
            if self.fail_variable.as_deref() == Some(payload.variable.as_str()) {
                return Err(CdsError::TaskFailed("synthetic failure".to_string()));
            }
            if self.fail_window_west == Some(payload.area[1]) {
                return Err(CdsError::TaskFailed("synthetic outage".to_string()));
            }
            Ok(RemoteFile {
                location: serde_json::to_string(payload).unwrap(),
                content_length: None,
            })
        }

        async fn download(&self, remote: &RemoteFile, dest: &Path) -> Result<u64, CdsError> {
            tokio::fs::write(dest, remote.location.as_bytes())
                .await
                .map_err(|e| CdsError::Spool(remote.location.clone(), e))?;
            Ok(remote.location.len() as u64)
        }
    }

    /// Rebuilds the hour/day/month/year enumeration from the payload and
    /// produces a 1-degree window of data; values encode the hour of day.
    struct FakeDecoder;

    impl DatasetDecoder for FakeDecoder {
        fn formats(&self) -> &'static [FileFormat] {
            &[FileFormat::NetCdf]
        }

        fn decode(&self, path: &Path) -> Result<GridDataset, DecodeError> {
            let raw = std::fs::read_to_string(path).map_err(|e| DecodeError::Read {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            let payload: serde_json::Value = serde_json::from_str(&raw).unwrap();

            let hours: Vec<u32> = payload["time"]
                .as_array()
                .unwrap()
                .iter()
                .map(|t| t.as_str().unwrap()[..2].parse().unwrap())
                .collect();
            let numbers = |key: &str| -> Vec<u32> {
                payload[key]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|v| v.as_str().unwrap().parse().unwrap())
                    .collect()
            };

            let mut times: Vec<DateTime<Utc>> = Vec::new();
            for year in numbers("year") {
                for month in numbers("month") {
                    for day in numbers("day") {
                        let Some(date) = NaiveDate::from_ymd_opt(year as i32, month, day)
                        else {
                            continue;
                        };
                        for &hour in &hours {
                            let naive = date.and_hms_opt(hour, 0, 0).unwrap();
                            times.push(Utc.from_utc_datetime(&naive));
                        }
                    }
                }
            }

            let area: Vec<f64> = payload["area"]
                .as_array()
                .unwrap()
                .iter()
                .map(|v| v.as_f64().unwrap())
                .collect();
            let &[north, west, south, east] = &area[..] else { unreachable!() };
            let latitudes = vec![south, north];
            let longitudes = vec![west, east];

            let n = times.len();
            let values = Array3::from_shape_fn((n, 2, 2), |(t, _, _)| {
                f64::from(times[t].hour())
            });

            Ok(GridDataset::new(
                times,
                latitudes,
                longitudes,
                vec![GridField {
                    name: payload["variable"].as_str().unwrap().to_string(),
                    units: Some("K".to_string()),
                    values,
                }],
            ))
        }
    }

    fn accessor(transport: FakeTransport) -> (Arc<FakeTransport>, CdsAccessor) {
        let transport = Arc::new(transport);
        let accessor = CdsAccessor::new(Arc::clone(&transport) as _, Arc::new(FakeDecoder));
        (transport, accessor)
    }

    fn request(
        variables: &[&str],
        stations: Vec<StationPoint>,
        hours: Option<HourSelection>,
    ) -> DataRequest {
        DataRequest {
            dataset: "reanalysis-era5-single-levels".to_string(),
            variables: variables.iter().map(|v| v.to_string()).collect(),
            start: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2020, 1, 31, 23, 0, 0).unwrap(),
            bbox: BoundingBox::new(-10.0, 20.0, 40.0, 60.0).unwrap(),
            options: RetrievalOptions {
                hours,
                stations,
                ..RetrievalOptions::default()
            },
        }
    }

    #[tokio::test]
    async fn one_station_one_variable_hourly_point_series() {
        let (_, accessor) = accessor(FakeTransport::new());
        let dataset = accessor
            .get_data(&request(
                &["2m_temperature"],
                vec![StationPoint::new("gauge-a", 13.4, 52.5)],
                Some(HourSelection::Step(6)),
            ))
            .await
            .unwrap();

        let stations = dataset.as_stations().unwrap();
        // 31 days x 4 hours per day.
        assert_eq!(stations.times.len(), 124);
        assert_eq!(stations.fields.len(), 1);
        assert_eq!(stations.fields[0].name, "2m_temperature");
        assert_eq!(stations.fields[0].values.dim(), (124, 1));
        // Values encode hour of day: 0, 6, 12, 18, 0, ...
        assert_eq!(stations.fields[0].values[[0, 0]], 0.0);
        assert_eq!(stations.fields[0].values[[1, 0]], 6.0);
        assert_eq!(stations.fields[0].values[[3, 0]], 18.0);
        assert_eq!(stations.attrs.institution, "ECMWF via Copernicus CDS");
        assert_eq!(stations.attrs.epsg, Some(EPSG_WGS84));
    }

    #[tokio::test]
    async fn failed_station_leaves_nan_column() {
        let failing_west = BoundingBox::around(2.35, 48.85).west;
        let transport = FakeTransport {
            fail_window_west: Some(failing_west),
            ..FakeTransport::new()
        };
        let (_, accessor) = accessor(transport);
        let dataset = accessor
            .get_data(&request(
                &["2m_temperature"],
                vec![
                    StationPoint::new("gauge-a", 13.4, 52.5),
                    StationPoint::new("gauge-b", 2.35, 48.85),
                ],
                Some(HourSelection::Step(12)),
            ))
            .await
            .unwrap();

        let stations = dataset.as_stations().unwrap();
        assert_eq!(stations.fields[0].values.dim(), (62, 2));
        assert!(!stations.fields[0].values[[0, 0]].is_nan());
        assert!(stations.fields[0].values[[0, 1]].is_nan());
    }

    #[tokio::test]
    async fn failed_variable_is_dropped_with_others_kept() {
        let transport = FakeTransport {
            fail_variable: Some("total_precipitation".to_string()),
            ..FakeTransport::new()
        };
        let (_, accessor) = accessor(transport);
        let dataset = accessor
            .get_data(&request(
                &["2m_temperature", "total_precipitation"],
                vec![StationPoint::new("gauge-a", 13.4, 52.5)],
                Some(HourSelection::Step(6)),
            ))
            .await
            .unwrap();

        let stations = dataset.as_stations().unwrap();
        assert_eq!(stations.fields.len(), 1);
        assert_eq!(stations.fields[0].name, "2m_temperature");
    }

    #[tokio::test]
    async fn total_failure_raises_no_data_returned() {
        let transport = FakeTransport {
            fail_variable: Some("2m_temperature".to_string()),
            ..FakeTransport::new()
        };
        let (_, accessor) = accessor(transport);
        let result = accessor
            .get_data(&request(
                &["2m_temperature"],
                vec![StationPoint::new("gauge-a", 13.4, 52.5)],
                Some(HourSelection::Step(6)),
            ))
            .await;
        assert!(matches!(result, Err(Era5Error::NoDataReturned { .. })));
    }

    #[tokio::test]
    async fn unsupported_file_format_fails_before_any_submission() {
        let (transport, accessor) = accessor(FakeTransport::new());
        let mut grib_request = request(
            &["2m_temperature"],
            vec![StationPoint::new("gauge-a", 13.4, 52.5)],
            Some(HourSelection::Step(6)),
        );
        grib_request.options.file_format = FileFormat::Grib;

        let result = accessor.get_data(&grib_request).await;
        assert!(matches!(
            result,
            Err(Era5Error::InvalidConfiguration(
                ConfigError::FormatUnavailable { .. }
            ))
        ));
        assert_eq!(transport.submissions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_hours_fails_before_any_submission() {
        let (transport, accessor) = accessor(FakeTransport::new());
        let result = accessor
            .get_data(&request(
                &["2m_temperature"],
                vec![StationPoint::new("gauge-a", 13.4, 52.5)],
                None,
            ))
            .await;
        assert!(matches!(
            result,
            Err(Era5Error::InvalidConfiguration(ConfigError::MissingHours))
        ));
        assert_eq!(transport.submissions.load(Ordering::SeqCst), 0);
    }
}
