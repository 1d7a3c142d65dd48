//! In-memory dataset representation shared by every backend.
//!
//! A [`GridDataset`] is the unit the fetch adapters produce (one field on a
//! time × latitude × longitude grid); reassembly turns those into the
//! terminal [`Era5Dataset`] handed back to the caller.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use log::warn;
use ndarray::{s, Array2, Array3};

use crate::types::bounding_box::BoundingBox;
use crate::types::request::StationPoint;

/// EPSG code written onto every normalized dataset.
pub const EPSG_WGS84: u32 = 4326;

/// Uniform attributes attached to a normalized dataset so that every
/// backend produces an interchangeable result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetAttrs {
    pub dataset_name: String,
    pub institution: String,
    pub x_dim: &'static str,
    pub y_dim: &'static str,
    /// Coordinate reference system code; written last, after merging.
    pub epsg: Option<u32>,
    pub time_step: &'static str,
}

impl DatasetAttrs {
    pub fn new(dataset_name: &str, institution: &str) -> Self {
        DatasetAttrs {
            dataset_name: dataset_name.to_string(),
            institution: institution.to_string(),
            ..DatasetAttrs::default()
        }
    }
}

impl Default for DatasetAttrs {
    fn default() -> Self {
        DatasetAttrs {
            dataset_name: String::new(),
            institution: String::new(),
            x_dim: "longitude",
            y_dim: "latitude",
            epsg: None,
            time_step: "hourly",
        }
    }
}

/// One named data field on a gridded dataset, shaped (time, lat, lon).
#[derive(Debug, Clone)]
pub struct GridField {
    pub name: String,
    pub units: Option<String>,
    pub values: Array3<f64>,
}

/// A gridded dataset keyed by (time, latitude, longitude).
#[derive(Debug, Clone, Default)]
pub struct GridDataset {
    pub times: Vec<DateTime<Utc>>,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    pub fields: Vec<GridField>,
    pub attrs: DatasetAttrs,
    /// Scratch files that could not be removed after decoding; deleted by
    /// [`Era5Dataset::close`].
    pub temp_files: Vec<PathBuf>,
}

impl GridDataset {
    pub fn new(
        times: Vec<DateTime<Utc>>,
        latitudes: Vec<f64>,
        longitudes: Vec<f64>,
        fields: Vec<GridField>,
    ) -> Self {
        GridDataset {
            times,
            latitudes,
            longitudes,
            fields,
            attrs: DatasetAttrs::default(),
            temp_files: Vec::new(),
        }
    }

    pub fn time_len(&self) -> usize {
        self.times.len()
    }

    /// Shifts the longitude axis by `offset` degrees. Used to move the
    /// store's 0..360 convention onto −180..180 before cropping.
    pub(crate) fn shift_longitudes(&mut self, offset: f64) {
        for longitude in &mut self.longitudes {
            *longitude += offset;
        }
    }

    /// Crops to the nearest grid indices bracketing `bbox`, inclusive on
    /// both ends of each axis.
    pub(crate) fn crop_to(&mut self, bbox: &BoundingBox) {
        if self.latitudes.is_empty() || self.longitudes.is_empty() {
            return;
        }
        let west_idx = nearest_index(&self.longitudes, bbox.west);
        let east_idx = nearest_index(&self.longitudes, bbox.east);
        let south_idx = nearest_index(&self.latitudes, bbox.south);
        let north_idx = nearest_index(&self.latitudes, bbox.north);
        let (x0, x1) = (west_idx.min(east_idx), west_idx.max(east_idx));
        let (y0, y1) = (south_idx.min(north_idx), south_idx.max(north_idx));

        self.longitudes = self.longitudes[x0..=x1].to_vec();
        self.latitudes = self.latitudes[y0..=y1].to_vec();
        for field in &mut self.fields {
            field.values = field.values.slice(s![.., y0..=y1, x0..=x1]).to_owned();
        }
    }

    /// Restricts the time axis to `[start, end]` inclusive. An empty
    /// intersection leaves a zero-length time axis.
    pub(crate) fn crop_time(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) {
        let first = self.times.iter().position(|t| *t >= start);
        let last = self.times.iter().rposition(|t| *t <= end);
        match (first, last) {
            (Some(first), Some(last)) if first <= last => {
                self.times = self.times[first..=last].to_vec();
                for field in &mut self.fields {
                    field.values = field.values.slice(s![first..=last, .., ..]).to_owned();
                }
            }
            _ => {
                self.times.clear();
                for field in &mut self.fields {
                    let (_, ny, nx) = field.values.dim();
                    field.values = Array3::zeros((0, ny, nx));
                }
            }
        }
    }

    /// The time series of one field at the grid point nearest to the given
    /// coordinate.
    pub fn point_series(&self, field: usize, longitude: f64, latitude: f64) -> Vec<f64> {
        let xi = nearest_index(&self.longitudes, longitude);
        let yi = nearest_index(&self.latitudes, latitude);
        self.fields[field].values.slice(s![.., yi, xi]).to_vec()
    }
}

/// Index of the axis value closest to `target`.
pub(crate) fn nearest_index(values: &[f64], target: f64) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (index, value) in values.iter().enumerate() {
        let distance = (value - target).abs();
        if distance < best_distance {
            best_distance = distance;
            best = index;
        }
    }
    best
}

/// One named data field on a station dataset, shaped (time, station).
#[derive(Debug, Clone)]
pub struct StationField {
    pub name: String,
    pub units: Option<String>,
    pub values: Array2<f64>,
}

/// A point dataset keyed by (time, station).
#[derive(Debug, Clone)]
pub struct StationDataset {
    pub times: Vec<DateTime<Utc>>,
    pub stations: Vec<StationPoint>,
    pub fields: Vec<StationField>,
    pub attrs: DatasetAttrs,
    pub temp_files: Vec<PathBuf>,
}

/// The normalized dataset returned by a retrieval call.
///
/// Gridded/bulk retrievals produce the [`Era5Dataset::Grid`] form; station
/// retrievals the [`Era5Dataset::Stations`] form. Both carry the same
/// attribute contract, so downstream converters can treat them uniformly.
#[derive(Debug, Clone)]
pub enum Era5Dataset {
    Grid(GridDataset),
    Stations(StationDataset),
}

impl Era5Dataset {
    pub fn attrs(&self) -> &DatasetAttrs {
        match self {
            Era5Dataset::Grid(dataset) => &dataset.attrs,
            Era5Dataset::Stations(dataset) => &dataset.attrs,
        }
    }

    pub fn time_len(&self) -> usize {
        match self {
            Era5Dataset::Grid(dataset) => dataset.times.len(),
            Era5Dataset::Stations(dataset) => dataset.times.len(),
        }
    }

    pub fn variable_names(&self) -> Vec<&str> {
        match self {
            Era5Dataset::Grid(dataset) => {
                dataset.fields.iter().map(|f| f.name.as_str()).collect()
            }
            Era5Dataset::Stations(dataset) => {
                dataset.fields.iter().map(|f| f.name.as_str()).collect()
            }
        }
    }

    pub fn as_grid(&self) -> Option<&GridDataset> {
        match self {
            Era5Dataset::Grid(dataset) => Some(dataset),
            Era5Dataset::Stations(_) => None,
        }
    }

    pub fn as_stations(&self) -> Option<&StationDataset> {
        match self {
            Era5Dataset::Stations(dataset) => Some(dataset),
            Era5Dataset::Grid(_) => None,
        }
    }

    /// Releases the dataset, deleting any scratch files still backing it.
    pub fn close(self) {
        let temp_files = match self {
            Era5Dataset::Grid(dataset) => dataset.temp_files,
            Era5Dataset::Stations(dataset) => dataset.temp_files,
        };
        for path in temp_files {
            if let Err(err) = std::fs::remove_file(&path) {
                warn!("could not delete scratch file '{}': {err}", path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hourly_times(n: usize) -> Vec<DateTime<Utc>> {
        let base = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| base + chrono::Duration::hours(i as i64))
            .collect()
    }

    fn sample_grid() -> GridDataset {
        // 4 timesteps over a 3x4 grid, values encode (t, y, x).
        let values = Array3::from_shape_fn((4, 3, 4), |(t, y, x)| {
            t as f64 * 100.0 + y as f64 * 10.0 + x as f64
        });
        GridDataset::new(
            hourly_times(4),
            vec![50.0, 50.25, 50.5],
            vec![10.0, 10.25, 10.5, 10.75],
            vec![GridField {
                name: "air_temperature_at_2_metres".to_string(),
                units: Some("K".to_string()),
                values,
            }],
        )
    }

    #[test]
    fn nearest_index_picks_minimum_distance() {
        let axis = [0.0, 0.25, 0.5, 0.75];
        assert_eq!(nearest_index(&axis, 0.0), 0);
        assert_eq!(nearest_index(&axis, 0.3), 1);
        assert_eq!(nearest_index(&axis, 0.9), 3);
        assert_eq!(nearest_index(&axis, -5.0), 0);
    }

    #[test]
    fn crop_to_keeps_inclusive_index_range() {
        let mut dataset = sample_grid();
        let bbox = BoundingBox::new(10.2, 10.6, 50.2, 50.4).unwrap();
        dataset.crop_to(&bbox);
        assert_eq!(dataset.longitudes, vec![10.25, 10.5]);
        assert_eq!(dataset.latitudes, vec![50.25, 50.5]);
        assert_eq!(dataset.fields[0].values.dim(), (4, 2, 2));
        // top-left of the crop should be (t=0, y=1, x=1) => 11.0
        assert_eq!(dataset.fields[0].values[[0, 0, 0]], 11.0);
    }

    #[test]
    fn crop_to_handles_descending_latitude_axis() {
        let mut dataset = sample_grid();
        dataset.latitudes = vec![50.5, 50.25, 50.0];
        let bbox = BoundingBox::new(10.0, 10.75, 50.2, 50.4).unwrap();
        dataset.crop_to(&bbox);
        assert_eq!(dataset.latitudes, vec![50.5, 50.25]);
    }

    #[test]
    fn shift_longitudes_moves_store_convention() {
        let mut dataset = sample_grid();
        dataset.longitudes = vec![180.0, 180.25, 180.5, 180.75];
        dataset.shift_longitudes(-180.0);
        assert_eq!(dataset.longitudes, vec![0.0, 0.25, 0.5, 0.75]);
    }

    #[test]
    fn crop_time_is_inclusive() {
        let mut dataset = sample_grid();
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 1, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2020, 1, 1, 2, 0, 0).unwrap();
        dataset.crop_time(start, end);
        assert_eq!(dataset.times.len(), 2);
        assert_eq!(dataset.fields[0].values.dim(), (2, 3, 4));
        assert_eq!(dataset.fields[0].values[[0, 0, 0]], 100.0);
    }

    #[test]
    fn crop_time_outside_range_empties_the_axis() {
        let mut dataset = sample_grid();
        let start = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2021, 1, 2, 0, 0, 0).unwrap();
        dataset.crop_time(start, end);
        assert!(dataset.times.is_empty());
        assert_eq!(dataset.fields[0].values.dim().0, 0);
    }

    #[test]
    fn point_series_reads_nearest_grid_point() {
        let dataset = sample_grid();
        let series = dataset.point_series(0, 10.3, 50.2);
        // nearest: x=1 (10.25), y=1 (50.25) => t*100 + 11
        assert_eq!(series, vec![11.0, 111.0, 211.0, 311.0]);
    }
}
