//! Tabular export of a normalized dataset.
//!
//! The first of the downstream consumers: a long-format point-series table
//! suitable for CSV export. The hydrology file writers live outside this
//! crate and consume the same dataset contract.

use polars::prelude::*;

use crate::types::dataset::Era5Dataset;

fn column_name(field_name: &str, units: Option<&str>) -> String {
    match units {
        Some(units) => format!("{field_name}_{units}"),
        None => field_name.to_string(),
    }
}

/// Converts a normalized dataset to a long-format `DataFrame`.
///
/// Station datasets produce one row per (station, timestep) with columns
/// `station_id`, `datetime` and one column per variable. Grid datasets
/// produce one row per (timestep, latitude, longitude).
///
/// Missing values stay `NaN`, mirroring how the dataset records them.
pub fn to_dataframe(dataset: &Era5Dataset) -> PolarsResult<DataFrame> {
    match dataset {
        Era5Dataset::Stations(dataset) => {
            let n_times = dataset.times.len();
            let n_rows = n_times * dataset.stations.len();

            let mut station_ids = Vec::with_capacity(n_rows);
            let mut datetimes = Vec::with_capacity(n_rows);
            for station in &dataset.stations {
                for time in &dataset.times {
                    station_ids.push(station.id.clone());
                    datetimes.push(time.naive_utc());
                }
            }

            let mut columns = vec![
                Column::new("station_id".into(), station_ids),
                Column::new("datetime".into(), datetimes),
            ];
            for field in &dataset.fields {
                let mut values = Vec::with_capacity(n_rows);
                for column in 0..dataset.stations.len() {
                    for row in 0..n_times {
                        values.push(field.values[[row, column]]);
                    }
                }
                columns.push(Column::new(
                    column_name(&field.name, field.units.as_deref()).into(),
                    values,
                ));
            }
            DataFrame::new(columns)
        }
        Era5Dataset::Grid(dataset) => {
            let n_rows = dataset.times.len() * dataset.latitudes.len() * dataset.longitudes.len();

            let mut datetimes = Vec::with_capacity(n_rows);
            let mut latitudes = Vec::with_capacity(n_rows);
            let mut longitudes = Vec::with_capacity(n_rows);
            for time in &dataset.times {
                for latitude in &dataset.latitudes {
                    for longitude in &dataset.longitudes {
                        datetimes.push(time.naive_utc());
                        latitudes.push(*latitude);
                        longitudes.push(*longitude);
                    }
                }
            }

            let mut columns = vec![
                Column::new("datetime".into(), datetimes),
                Column::new("latitude".into(), latitudes),
                Column::new("longitude".into(), longitudes),
            ];
            for field in &dataset.fields {
                let values: Vec<f64> = field.values.iter().copied().collect();
                columns.push(Column::new(
                    column_name(&field.name, field.units.as_deref()).into(),
                    values,
                ));
            }
            DataFrame::new(columns)
        }
    }
}
