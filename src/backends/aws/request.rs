//! Expansion of a bulk request into per-variable, per-month object fetches.

use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use log::warn;

use crate::types::bounding_box::BoundingBox;
use crate::types::variable::{to_canonical, to_store_field};

/// One object fetch: a single variable for a single calendar month.
///
/// `index` increases monotonically per variable so pieces can be reordered
/// after out-of-order completion.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AwsSubRequest {
    /// Canonical variable name used in the normalized output.
    pub variable: String,
    /// Field name the store files use for this variable.
    pub store_field: String,
    /// Object key below the store endpoint.
    pub key: String,
    pub index: usize,
    pub bbox: BoundingBox,
}

impl fmt::Display for AwsSubRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object '{}' ({}[{}])", self.key, self.variable, self.index)
    }
}

/// Builds the ordered sub-request list covering every requested variable
/// and every month between `start` and `end` inclusive, with no gaps and
/// no overlaps.
pub(crate) fn monthly_sub_requests(
    variables: &[String],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    bbox: BoundingBox,
) -> Vec<AwsSubRequest> {
    let mut out = Vec::new();
    for variable in variables {
        let Some(store_field) = to_store_field(variable) else {
            // Callers validate against the registry first; this is only
            // reachable through a stale variable listing.
            warn!("variable '{variable}' cannot be found for the store; skipping");
            continue;
        };
        let canonical = to_canonical(store_field).to_string();

        let mut index = 0;
        for year in start.year()..=end.year() {
            let first_month = if year == start.year() { start.month() } else { 1 };
            let last_month = if year == end.year() { end.month() } else { 12 };
            for month in first_month..=last_month {
                out.push(AwsSubRequest {
                    variable: canonical.clone(),
                    store_field: store_field.to_string(),
                    key: format!("{year}/{month:02}/data/{store_field}.nc"),
                    index,
                    bbox,
                });
                index += 1;
            }
        }
    }
    out
}
