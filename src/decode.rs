//! Turning downloaded resource bytes into [`GridDataset`] values.
//!
//! The set of decodable formats is fixed at compile time; requesting a
//! format that was not built in is a configuration error raised before any
//! network activity, never a runtime probe.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use log::warn;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::task::{self, JoinError};

use crate::types::dataset::GridDataset;

/// On-disk format of a downloaded resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    NetCdf,
    Grib,
}

impl FileFormat {
    /// File extension used for scratch files of this format.
    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::NetCdf => ".nc",
            FileFormat::Grib => ".grib",
        }
    }

    /// The format identifier the CDS request grammar expects.
    pub(crate) fn api_name(&self) -> &'static str {
        match self {
            FileFormat::NetCdf => "netcdf",
            FileFormat::Grib => "grib",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.api_name())
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("no decoder for {0} files was built into this binary")]
    FormatUnavailable(FileFormat),

    #[error("failed to read dataset file '{path}': {message}")]
    Read { path: PathBuf, message: String },

    #[error("dataset file '{path}' has no usable {axis} axis")]
    MissingAxis { path: PathBuf, axis: &'static str },

    #[error("dataset file '{path}' contains no gridded data fields")]
    NoFields { path: PathBuf },

    #[error("unsupported time axis units '{0}'")]
    TimeUnits(String),
}

/// Decodes a downloaded file into an in-memory dataset with canonical
/// axis names.
///
/// Implementations resolve backend-native axis spellings (`lat`/`lon`,
/// `time0`, ...) while reading, so every decoded dataset comes out keyed
/// by time, latitude and longitude.
pub trait DatasetDecoder: Send + Sync {
    /// Formats this build can decode; fixed at compile time.
    fn formats(&self) -> &'static [FileFormat];

    fn decode(&self, path: &Path) -> Result<GridDataset, DecodeError>;

    fn supports(&self, format: FileFormat) -> bool {
        self.formats().contains(&format)
    }
}

/// The decoder compiled into this build.
///
/// With the `netcdf` feature enabled this reads NetCDF4 files; without it
/// the returned decoder supports no formats and retrieval calls fail their
/// configuration check before touching the network.
pub fn default_decoder() -> Arc<dyn DatasetDecoder> {
    #[cfg(feature = "netcdf")]
    {
        Arc::new(netcdf_impl::NetcdfDecoder)
    }
    #[cfg(not(feature = "netcdf"))]
    {
        Arc::new(NullDecoder)
    }
}

/// Placeholder decoder for builds without any format support.
#[cfg(not(feature = "netcdf"))]
struct NullDecoder;

#[cfg(not(feature = "netcdf"))]
impl DatasetDecoder for NullDecoder {
    fn formats(&self) -> &'static [FileFormat] {
        &[]
    }

    fn decode(&self, _path: &Path) -> Result<GridDataset, DecodeError> {
        Err(DecodeError::FormatUnavailable(FileFormat::NetCdf))
    }
}

/// Runs a blocking decode off the async runtime and removes the scratch
/// file afterwards. A scratch file that cannot be removed is recorded on
/// the dataset so the caller's explicit close can retry.
pub(crate) async fn decode_scratch(
    decoder: Arc<dyn DatasetDecoder>,
    scratch: NamedTempFile,
) -> Result<Result<GridDataset, DecodeError>, JoinError> {
    let temp_path = scratch.into_temp_path();
    task::spawn_blocking(move || {
        let mut result = decoder.decode(&temp_path);
        let kept = temp_path.to_path_buf();
        if let Err(err) = temp_path.close() {
            warn!("could not delete scratch file '{}': {err}", kept.display());
            if let Ok(dataset) = &mut result {
                dataset.temp_files.push(kept);
            }
        }
        result
    })
    .await
}

/// Converts a CF-style `"<unit> since <epoch>"` time axis to UTC datetimes.
///
/// Exposed for custom [`DatasetDecoder`] implementations.
pub fn decode_time_axis(
    units: &str,
    values: &[f64],
) -> Result<Vec<DateTime<Utc>>, DecodeError> {
    let mut parts = units.splitn(3, ' ');
    let unit = parts.next().unwrap_or_default();
    let since = parts.next().unwrap_or_default();
    let epoch_str = parts.next().unwrap_or_default().trim();
    if since != "since" || epoch_str.is_empty() {
        return Err(DecodeError::TimeUnits(units.to_string()));
    }

    let epoch = parse_epoch(epoch_str).ok_or_else(|| DecodeError::TimeUnits(units.to_string()))?;
    let seconds_per = match unit {
        "seconds" | "second" => 1.0,
        "minutes" | "minute" => 60.0,
        "hours" | "hour" => 3600.0,
        "days" | "day" => 86_400.0,
        _ => return Err(DecodeError::TimeUnits(units.to_string())),
    };

    Ok(values
        .iter()
        .map(|value| {
            DateTime::<Utc>::from_naive_utc_and_offset(
                epoch + Duration::seconds((value * seconds_per).round() as i64),
                Utc,
            )
        })
        .collect())
}

fn parse_epoch(epoch: &str) -> Option<NaiveDateTime> {
    for format in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(epoch, format) {
            return Some(parsed);
        }
    }
    NaiveDate::parse_from_str(epoch, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

#[cfg(feature = "netcdf")]
mod netcdf_impl {
    use std::path::Path;

    use log::warn;
    use ndarray::Array3;

    use super::{decode_time_axis, DatasetDecoder, DecodeError, FileFormat};
    use crate::types::dataset::{GridDataset, GridField};

    const LATITUDE_ALIASES: [&str; 2] = ["latitude", "lat"];
    const LONGITUDE_ALIASES: [&str; 2] = ["longitude", "lon"];

    /// Reads NetCDF4 files through libnetcdf.
    pub(super) struct NetcdfDecoder;

    impl NetcdfDecoder {
        fn read_axis(
            file: &netcdf::File,
            aliases: &[&str],
            axis: &'static str,
            path: &Path,
        ) -> Result<Vec<f64>, DecodeError> {
            for &alias in aliases {
                if let Some(variable) = file.variable(alias) {
                    return variable.get_values::<f64, _>(..).map_err(|e| {
                        DecodeError::Read {
                            path: path.to_path_buf(),
                            message: e.to_string(),
                        }
                    });
                }
            }
            Err(DecodeError::MissingAxis {
                path: path.to_path_buf(),
                axis,
            })
        }

        fn string_attribute(variable: &netcdf::Variable<'_>, name: &str) -> Option<String> {
            match variable.attribute(name)?.value() {
                Ok(netcdf::AttributeValue::Str(value)) => Some(value),
                _ => None,
            }
        }
    }

    impl DatasetDecoder for NetcdfDecoder {
        fn formats(&self) -> &'static [FileFormat] {
            &[FileFormat::NetCdf]
        }

        fn decode(&self, path: &Path) -> Result<GridDataset, DecodeError> {
            let read_err = |e: netcdf::Error| DecodeError::Read {
                path: path.to_path_buf(),
                message: e.to_string(),
            };
            let file = netcdf::open(path).map_err(read_err)?;

            let latitudes = Self::read_axis(&file, &LATITUDE_ALIASES, "latitude", path)?;
            let longitudes = Self::read_axis(&file, &LONGITUDE_ALIASES, "longitude", path)?;

            // The store occasionally carries more than one time-like axis
            // (e.g. a bounds axis); take the first and say so.
            let time_names: Vec<String> = file
                .variables()
                .filter(|v| v.dimensions().len() == 1 && v.name().contains("time"))
                .map(|v| v.name().to_string())
                .collect();
            if time_names.len() > 1 {
                warn!(
                    "multiple time axes found ({time_names:?}); using '{}'",
                    time_names[0]
                );
            }
            let time_name = time_names.first().ok_or_else(|| DecodeError::MissingAxis {
                path: path.to_path_buf(),
                axis: "time",
            })?;
            let time_var = file
                .variable(time_name)
                .ok_or_else(|| DecodeError::MissingAxis {
                    path: path.to_path_buf(),
                    axis: "time",
                })?;
            let raw_times = time_var.get_values::<f64, _>(..).map_err(read_err)?;
            let units = Self::string_attribute(&time_var, "units")
                .ok_or_else(|| DecodeError::TimeUnits(String::new()))?;
            let times = decode_time_axis(&units, &raw_times)?;

            let mut fields = Vec::new();
            for variable in file.variables() {
                if variable.dimensions().len() != 3 {
                    continue;
                }
                let values = variable.get_values::<f64, _>(..).map_err(read_err)?;
                let shape = (times.len(), latitudes.len(), longitudes.len());
                let Ok(values) = Array3::from_shape_vec(shape, values) else {
                    warn!(
                        "skipping field '{}' with unexpected shape",
                        variable.name()
                    );
                    continue;
                };
                fields.push(GridField {
                    name: variable.name().to_string(),
                    units: Self::string_attribute(&variable, "units"),
                    values,
                });
            }
            if fields.is_empty() {
                return Err(DecodeError::NoFields {
                    path: path.to_path_buf(),
                });
            }

            Ok(GridDataset::new(times, latitudes, longitudes, fields))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn hours_since_epoch_axis() {
        let times = decode_time_axis("hours since 1900-01-01 00:00:00.0", &[0.0, 6.0]).unwrap();
        assert_eq!(times[0], Utc.with_ymd_and_hms(1900, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(times[1], Utc.with_ymd_and_hms(1900, 1, 1, 6, 0, 0).unwrap());
    }

    #[test]
    fn seconds_and_days_units() {
        let seconds = decode_time_axis("seconds since 1970-01-01", &[86_400.0]).unwrap();
        assert_eq!(seconds[0], Utc.with_ymd_and_hms(1970, 1, 2, 0, 0, 0).unwrap());

        let days = decode_time_axis("days since 2020-01-01", &[31.0]).unwrap();
        assert_eq!(days[0], Utc.with_ymd_and_hms(2020, 2, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn malformed_units_are_rejected() {
        assert!(matches!(
            decode_time_axis("fortnights since 2020-01-01", &[1.0]),
            Err(DecodeError::TimeUnits(_))
        ));
        assert!(matches!(
            decode_time_axis("hours after 2020-01-01", &[1.0]),
            Err(DecodeError::TimeUnits(_))
        ));
        assert!(matches!(
            decode_time_axis("hours since someday", &[1.0]),
            Err(DecodeError::TimeUnits(_))
        ));
    }
}
