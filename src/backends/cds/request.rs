//! Expansion of a point request into per-station, per-variable API calls.

use std::fmt;

use serde::Serialize;

use crate::decode::FileFormat;
use crate::error::ConfigError;
use crate::time_select::{days_list, months_list, years_list};
use crate::types::bounding_box::BoundingBox;
use crate::types::request::{DataRequest, StationPoint};

/// Grid resolution requested from the API, in degrees.
const GRID_RESOLUTION_DEG: f64 = 1.0;

/// One retrieval payload in the API's JSON grammar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CdsPayload {
    pub product_type: String,
    pub variable: String,
    pub format: String,
    pub grid: [f64; 2],
    /// `[north, west, south, east]`.
    pub area: [f64; 4],
    /// `HH:00` strings.
    pub time: Vec<String>,
    pub day: Vec<String>,
    pub month: Vec<String>,
    pub year: Vec<String>,
}

/// One API call: a single variable for a single station window.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CdsSubRequest {
    pub station: StationPoint,
    pub variable: String,
    pub payload: CdsPayload,
}

impl fmt::Display for CdsSubRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "station '{}' variable '{}'", self.station.id, self.variable)
    }
}

/// Builds the ordered sub-request list: stations in input order, variables
/// in input order within each station.
pub(crate) fn station_sub_requests(
    request: &DataRequest,
    format: FileFormat,
) -> Result<Vec<CdsSubRequest>, ConfigError> {
    let hours = request
        .options
        .hours
        .as_ref()
        .ok_or(ConfigError::MissingHours)?;
    let time = hours.hours_list()?;
    if request.options.stations.is_empty() {
        return Err(ConfigError::NoStations);
    }

    let day = days_list(request.start, request.end);
    let month = months_list(request.start, request.end);
    let year = years_list(request.start, request.end);

    let mut out = Vec::new();
    for station in &request.options.stations {
        for variable in &request.variables {
            let window = BoundingBox::around(station.longitude, station.latitude);
            out.push(CdsSubRequest {
                station: station.clone(),
                variable: variable.clone(),
                payload: CdsPayload {
                    product_type: "reanalysis".to_string(),
                    variable: variable.clone(),
                    format: format.api_name().to_string(),
                    grid: [GRID_RESOLUTION_DEG, GRID_RESOLUTION_DEG],
                    area: window.cds_area(),
                    time: time.clone(),
                    day: day.clone(),
                    month: month.clone(),
                    year: year.clone(),
                },
            });
        }
    }
    Ok(out)
}
