//! Reassembly of concurrent partial results into one normalized dataset.
//!
//! Sub-requests complete in arbitrary order; everything here keys off the
//! sequence indices assigned at request-build time, so the final dataset is
//! deterministic regardless of completion order.

use chrono::{DateTime, Utc};
use log::warn;
use ndarray::Axis;

use crate::types::dataset::{DatasetAttrs, GridDataset, GridField};

/// Rebuilds one variable from its partial results.
///
/// Pieces are reordered by sequence index and concatenated along time, then
/// cropped to `[start, end]` inclusive (monthly pieces overshoot at the
/// range edges). The surviving field is renamed to `canonical`. Returns
/// `None` when nothing usable remains, which drops the variable.
pub(crate) fn reassemble_variable(
    canonical: &str,
    mut pieces: Vec<(usize, GridDataset)>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Option<GridDataset> {
    if pieces.is_empty() {
        warn!("no data returned for variable '{canonical}'");
        return None;
    }
    pieces.sort_by_key(|(index, _)| *index);

    let mut iter = pieces.into_iter();
    let (_, mut first) = iter.next()?;
    if first.fields.is_empty() {
        warn!("variable '{canonical}' came back without data fields");
        return None;
    }
    let head = first.fields.swap_remove(0);
    let units = head.units;
    let mut times = first.times;
    let mut temp_files = first.temp_files;
    let mut arrays = vec![head.values];

    for (_, mut piece) in iter {
        if piece.latitudes != first.latitudes || piece.longitudes != first.longitudes {
            warn!("grid mismatch between pieces of '{canonical}'; dropping the variable");
            return None;
        }
        if piece.fields.is_empty() {
            warn!("a piece of '{canonical}' came back without data fields");
            return None;
        }
        times.extend(piece.times);
        temp_files.append(&mut piece.temp_files);
        arrays.push(piece.fields.swap_remove(0).values);
    }

    let values = if arrays.len() == 1 {
        arrays.pop()?
    } else {
        let views: Vec<_> = arrays.iter().map(|a| a.view()).collect();
        match ndarray::concatenate(Axis(0), &views) {
            Ok(values) => values,
            Err(err) => {
                warn!("could not concatenate pieces of '{canonical}': {err}");
                return None;
            }
        }
    };

    let mut dataset = GridDataset::new(
        times,
        first.latitudes,
        first.longitudes,
        vec![GridField {
            name: canonical.to_string(),
            units,
            values,
        }],
    );
    dataset.temp_files = temp_files;
    dataset.crop_time(start, end);
    if dataset.times.is_empty() {
        warn!("variable '{canonical}' has no timesteps inside the requested window");
        return None;
    }
    Some(dataset)
}

/// Merges single-variable datasets into one and attaches the uniform
/// attributes. Variables whose axes disagree with the first are dropped
/// with a warning rather than failing the whole call.
pub(crate) fn merge_variables(
    per_variable: Vec<GridDataset>,
    attrs: DatasetAttrs,
    epsg: u32,
) -> Option<GridDataset> {
    let mut iter = per_variable.into_iter();
    let mut merged = iter.next()?;
    for mut dataset in iter {
        if dataset.times != merged.times
            || dataset.latitudes != merged.latitudes
            || dataset.longitudes != merged.longitudes
        {
            let dropped: Vec<&str> = dataset.fields.iter().map(|f| f.name.as_str()).collect();
            warn!("axes mismatch while merging; dropping {dropped:?}");
            continue;
        }
        merged.fields.append(&mut dataset.fields);
        merged.temp_files.append(&mut dataset.temp_files);
    }

    merged.attrs = attrs;
    // The merge rebuilds attributes, so the CRS goes on last.
    write_crs(&mut merged, epsg);
    Some(merged)
}

/// Writes the coordinate reference system code onto the dataset.
pub(crate) fn write_crs(dataset: &mut GridDataset, epsg: u32) {
    dataset.attrs.epsg = Some(epsg);
}
