//! Gridded/bulk retrieval from the ERA5 open-data store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};

use crate::assemble::{merge_variables, reassemble_variable};
use crate::backends::aws::error::AwsError;
use crate::backends::aws::request::{monthly_sub_requests, AwsSubRequest};
use crate::backends::aws::store::{HttpObjectReader, ObjectReader};
use crate::decode::{decode_scratch, default_decoder, DatasetDecoder, FileFormat};
use crate::error::{ConfigError, Era5Error};
use crate::executor::fetch_all;
use crate::registry::DataAccessor;
use crate::scratch::scratch_file;
use crate::types::dataset::{DatasetAttrs, Era5Dataset, GridDataset, EPSG_WGS84};
use crate::types::request::DataRequest;
use crate::types::variable::{to_canonical, to_store_field};

const INSTITUTION: &str = "ECMWF via Planet OS";

pub(crate) const AWS_DATASETS: &[&str] = &["reanalysis-era5-single-levels"];

/// Field names as they appear in the store's files.
pub(crate) const AWS_VARIABLES: &[&str] = &[
    "eastward_wind_at_10_metres",
    "northward_wind_at_10_metres",
    "eastward_wind_at_100_metres",
    "northward_wind_at_100_metres",
    "dew_point_temperature_at_2_metres",
    "air_temperature_at_2_metres",
    "air_temperature_at_2_metres_1hour_Maximum",
    "air_temperature_at_2_metres_1hour_Minimum",
    "air_pressure_at_mean_sea_level",
    "sea_surface_wave_mean_period",
    "sea_surface_wave_from_direction",
    "significant_height_of_wind_and_swell_waves",
    "snow_density",
    "lwe_thickness_of_surface_snow_amount",
    "surface_air_pressure",
    "integral_wrt_time_of_surface_direct_downwelling_shortwave_flux_in_air_1hour_Accumulation",
    "precipitation_amount_1hour_Accumulation",
];

/// ERA5 from the AWS Open Data Registry (`era5-pds`).
///
/// Monthly NetCDF objects per variable; no credentials required. Accepts
/// both CDS and store spellings of a variable name and reports results
/// under the canonical (CDS) name.
pub struct AwsAccessor {
    store: Arc<dyn ObjectReader>,
    decoder: Arc<dyn DatasetDecoder>,
}

impl AwsAccessor {
    pub fn new(store: Arc<dyn ObjectReader>, decoder: Arc<dyn DatasetDecoder>) -> Self {
        AwsAccessor { store, decoder }
    }

    /// Production wiring: the public bucket endpoint and the decoder
    /// compiled into this build.
    pub fn from_defaults() -> Self {
        AwsAccessor::new(Arc::new(HttpObjectReader::default()), default_decoder())
    }

    async fn fetch_one(&self, sub: &AwsSubRequest) -> Result<GridDataset, AwsError> {
        let scratch = scratch_file(FileFormat::NetCdf.extension())
            .map_err(|e| AwsError::Spool(sub.key.clone(), e))?;
        info!("accessing object: {} (field {})", sub.key, sub.store_field);
        self.store.fetch_to(&sub.key, scratch.path()).await?;

        let decoded = decode_scratch(Arc::clone(&self.decoder), scratch).await?;
        let mut dataset = decoded.map_err(|e| AwsError::Decode(sub.key.clone(), e))?;

        // The store serves longitudes as 0..360; shift onto -180..180
        // before cropping.
        dataset.shift_longitudes(-180.0);
        dataset.crop_to(&sub.bbox);
        Ok(dataset)
    }
}

#[async_trait]
impl DataAccessor for AwsAccessor {
    fn name(&self) -> &'static str {
        "era5-aws"
    }

    fn supported_datasets(&self) -> &'static [&'static str] {
        AWS_DATASETS
    }

    fn dataset_variables(&self, dataset: &str) -> Option<&'static [&'static str]> {
        AWS_DATASETS.contains(&dataset).then_some(AWS_VARIABLES)
    }

    fn supports_variable(&self, dataset: &str, variable: &str) -> bool {
        AWS_DATASETS.contains(&dataset)
            && to_store_field(variable).is_some_and(|field| AWS_VARIABLES.contains(&field))
    }

    async fn get_data(&self, request: &DataRequest) -> Result<Era5Dataset, Era5Error> {
        request.validate()?;
        if !self.decoder.supports(FileFormat::NetCdf) {
            return Err(ConfigError::FormatUnavailable {
                format: FileFormat::NetCdf,
                available: self.decoder.formats(),
            }
            .into());
        }

        if request.options.hours.is_some() {
            debug!("hour selection is ignored for the bulk store; data is hourly-complete");
        }

        let subs = monthly_sub_requests(
            &request.variables,
            request.start,
            request.end,
            request.bbox,
        );
        let requested = subs.len();
        info!("reading {requested} data months from the era5-pds store");

        let outcomes = fetch_all(
            subs,
            request.options.effective_worker_limit(),
            |sub: AwsSubRequest| async move {
                let result = self.fetch_one(&sub).await;
                (sub, result)
            },
        )
        .await;

        let mut by_variable: HashMap<String, Vec<(usize, GridDataset)>> = HashMap::new();
        for outcome in outcomes {
            if let Ok(dataset) = outcome.result {
                by_variable
                    .entry(outcome.key.variable)
                    .or_default()
                    .push((outcome.key.index, dataset));
            }
        }

        // Reassemble in request order so the output variable order is
        // deterministic.
        let mut per_variable = Vec::new();
        for variable in &request.variables {
            let canonical = to_store_field(variable)
                .map(to_canonical)
                .unwrap_or(variable.as_str());
            let pieces = by_variable.remove(canonical).unwrap_or_default();
            if let Some(dataset) =
                reassemble_variable(canonical, pieces, request.start, request.end)
            {
                per_variable.push(dataset);
            }
        }

        let attrs = DatasetAttrs::new(&request.dataset, INSTITUTION);
        merge_variables(per_variable, attrs, EPSG_WGS84)
            .map(Era5Dataset::Grid)
            .ok_or_else(|| Era5Error::NoDataReturned {
                dataset: request.dataset.clone(),
                requested,
            })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::decode::DecodeError;
    use crate::types::bounding_box::BoundingBox;
    use crate::types::dataset::GridField;
    use crate::types::request::RetrievalOptions;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use ndarray::Array3;
    use std::path::Path;

    /// Pretends to be the bucket: writes the key itself into the scratch
    /// file so the fake decoder can tell which month it is looking at.
    pub(crate) struct FakeStore {
        pub fail_keys: Vec<String>,
    }

    #[async_trait]
    impl ObjectReader for FakeStore {
        async fn fetch_to(&self, key: &str, dest: &Path) -> Result<u64, AwsError> {
            if self.fail_keys.iter().any(|k| k == key) {
                return Err(AwsError::Spool(
                    key.to_string(),
                    std::io::Error::other("synthetic outage"),
                ));
            }
            tokio::fs::write(dest, key.as_bytes())
                .await
                .map_err(|e| AwsError::Spool(key.to_string(), e))?;
            Ok(key.len() as u64)
        }
    }

    /// Builds one month of hourly data from the spooled key, using the
    /// store's native field name and 0..360 longitudes.
    pub(crate) struct FakeDecoder;

    fn days_in_month(year: i32, month: u32) -> i64 {
        let next = if month == 12 {
            Utc.with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0).unwrap()
        } else {
            Utc.with_ymd_and_hms(year, month + 1, 1, 0, 0, 0).unwrap()
        };
        (next - Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap()).num_days()
    }

    impl DatasetDecoder for FakeDecoder {
        fn formats(&self) -> &'static [FileFormat] {
            &[FileFormat::NetCdf]
        }

        fn decode(&self, path: &Path) -> Result<GridDataset, DecodeError> {
            let key = std::fs::read_to_string(path).map_err(|e| DecodeError::Read {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            // key layout: {year}/{month:02}/data/{field}.nc
            let mut parts = key.split('/');
            let year: i32 = parts.next().unwrap().parse().unwrap();
            let month: u32 = parts.next().unwrap().parse().unwrap();
            let field = parts.nth(1).unwrap().trim_end_matches(".nc").to_string();

            let base = Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap();
            let times: Vec<DateTime<Utc>> = (0..days_in_month(year, month) * 24)
                .map(|h| base + Duration::hours(h))
                .collect();
            let latitudes: Vec<f64> = (0..9).map(|i| -1.0 + 0.25 * f64::from(i)).collect();
            let longitudes: Vec<f64> = (0..9).map(|i| 179.0 + 0.25 * f64::from(i)).collect();
            let n = times.len();
            let values = Array3::from_elem((n, 9, 9), f64::from(month));

            Ok(GridDataset::new(
                times,
                latitudes,
                longitudes,
                vec![GridField {
                    name: field,
                    units: Some("K".to_string()),
                    values,
                }],
            ))
        }
    }

    struct NoFormats;

    impl DatasetDecoder for NoFormats {
        fn formats(&self) -> &'static [FileFormat] {
            &[]
        }

        fn decode(&self, _path: &Path) -> Result<GridDataset, DecodeError> {
            Err(DecodeError::FormatUnavailable(FileFormat::NetCdf))
        }
    }

    fn accessor(fail_keys: Vec<String>) -> AwsAccessor {
        AwsAccessor::new(Arc::new(FakeStore { fail_keys }), Arc::new(FakeDecoder))
    }

    fn request(variables: &[&str], start: DateTime<Utc>, end: DateTime<Utc>) -> DataRequest {
        DataRequest {
            dataset: "reanalysis-era5-single-levels".to_string(),
            variables: variables.iter().map(|v| v.to_string()).collect(),
            start,
            end,
            bbox: BoundingBox::new(-1.0, 1.0, -1.0, 1.0).unwrap(),
            options: RetrievalOptions::default(),
        }
    }

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn bulk_request_concatenates_and_crops_months() {
        let accessor = accessor(vec![]);
        let start = utc(2020, 1, 15);
        let end = utc(2020, 3, 15);
        let dataset = accessor
            .get_data(&request(&["2m_temperature"], start, end))
            .await
            .unwrap();

        let grid = dataset.as_grid().unwrap();
        assert_eq!(grid.times.first().unwrap(), &start);
        assert_eq!(grid.times.last().unwrap(), &end);
        // Jan 15 .. Mar 15, hourly, inclusive on both ends.
        let expected = (17 + 29 + 14) * 24 + 1;
        assert_eq!(grid.times.len(), expected);

        // Renamed to the canonical name, January values first.
        assert_eq!(grid.fields.len(), 1);
        assert_eq!(grid.fields[0].name, "2m_temperature");
        assert_eq!(grid.fields[0].values[[0, 0, 0]], 1.0);

        // Longitudes shifted out of the store convention before cropping.
        assert!(grid.longitudes.iter().all(|lon| (-1.0..=1.0).contains(lon)));
        assert_eq!(grid.attrs.institution, "ECMWF via Planet OS");
        assert_eq!(grid.attrs.epsg, Some(EPSG_WGS84));
        assert_eq!(grid.attrs.time_step, "hourly");
    }

    #[tokio::test]
    async fn partial_outage_degrades_to_remaining_variables() {
        let accessor = accessor(vec![
            "2020/01/data/precipitation_amount_1hour_Accumulation.nc".to_string(),
        ]);
        let dataset = accessor
            .get_data(&request(
                &["2m_temperature", "total_precipitation"],
                utc(2020, 1, 1),
                utc(2020, 1, 31),
            ))
            .await
            .unwrap();

        let grid = dataset.as_grid().unwrap();
        assert_eq!(grid.fields.len(), 1);
        assert_eq!(grid.fields[0].name, "2m_temperature");
    }

    #[tokio::test]
    async fn total_outage_raises_no_data_returned() {
        let accessor = accessor(vec![
            "2020/01/data/air_temperature_at_2_metres.nc".to_string(),
        ]);
        let result = accessor
            .get_data(&request(&["2m_temperature"], utc(2020, 1, 1), utc(2020, 1, 31)))
            .await;
        assert!(matches!(
            result,
            Err(Era5Error::NoDataReturned { requested: 1, .. })
        ));
    }

    #[tokio::test]
    async fn serial_mode_produces_the_same_dataset() {
        let parallel = accessor(vec![])
            .get_data(&request(&["2m_temperature"], utc(2020, 1, 15), utc(2020, 3, 15)))
            .await
            .unwrap();

        let mut serial_request =
            request(&["2m_temperature"], utc(2020, 1, 15), utc(2020, 3, 15));
        serial_request.options.parallel = false;
        let serial = accessor(vec![])
            .get_data(&serial_request)
            .await
            .unwrap();

        let (parallel, serial) = (parallel.as_grid().unwrap(), serial.as_grid().unwrap());
        assert_eq!(parallel.times, serial.times);
        assert_eq!(parallel.fields[0].values, serial.fields[0].values);
    }

    #[tokio::test]
    async fn missing_decoder_support_fails_before_any_fetch() {
        let accessor = AwsAccessor::new(
            Arc::new(FakeStore { fail_keys: vec![] }),
            Arc::new(NoFormats),
        );
        let result = accessor
            .get_data(&request(&["2m_temperature"], utc(2020, 1, 1), utc(2020, 1, 2)))
            .await;
        assert!(matches!(
            result,
            Err(Era5Error::InvalidConfiguration(
                ConfigError::FormatUnavailable { .. }
            ))
        ));
    }

    #[test]
    fn accepts_both_variable_spellings() {
        let accessor = accessor(vec![]);
        let dataset = "reanalysis-era5-single-levels";
        assert!(accessor.supports_variable(dataset, "2m_temperature"));
        assert!(accessor.supports_variable(dataset, "air_temperature_at_2_metres"));
        assert!(!accessor.supports_variable(dataset, "relative_vorticity"));
        assert!(!accessor.supports_variable("other-dataset", "2m_temperature"));
    }
}
