//! Expansion of a datetime range into the explicit hour/day/month/year
//! enumerations the CDS request grammar expects.

use chrono::{DateTime, Datelike, Utc};
use log::warn;

use crate::error::ConfigError;

/// Hour steps the CDS API accepts for evenly spaced retrievals.
pub const VALID_HOUR_STEPS: [u32; 5] = [1, 3, 6, 9, 12];

/// Which hours of the day a point retrieval should cover.
///
/// Either an evenly spaced step from [`VALID_HOUR_STEPS`] or an explicit
/// list of hours below 24.
///
/// # Examples
///
/// ```
/// use era5_accessor::HourSelection;
///
/// let every_six = HourSelection::Step(6);
/// assert_eq!(
///     every_six.hours_list().unwrap(),
///     ["00:00", "06:00", "12:00", "18:00"]
/// );
///
/// let mornings = HourSelection::Hours(vec![6, 7, 8]);
/// assert_eq!(mornings.hours_list().unwrap().len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HourSelection {
    /// Every `n` hours starting at midnight; `n` must be in [`VALID_HOUR_STEPS`].
    Step(u32),
    /// Explicit hours of day; entries must be below 24.
    Hours(Vec<u32>),
}

impl HourSelection {
    /// The selected hours of day, validated.
    ///
    /// Out-of-range entries in an explicit list are dropped with a warning,
    /// matching what the upstream service would reject anyway.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidHoursStep`] for a step outside the allowed set,
    /// [`ConfigError::EmptyHours`] when nothing usable remains.
    pub fn hours(&self) -> Result<Vec<u32>, ConfigError> {
        match self {
            HourSelection::Step(step) => {
                if !VALID_HOUR_STEPS.contains(step) {
                    return Err(ConfigError::InvalidHoursStep {
                        step: *step,
                        allowed: &VALID_HOUR_STEPS,
                    });
                }
                Ok((0..24).step_by(*step as usize).collect())
            }
            HourSelection::Hours(list) => {
                let kept: Vec<u32> = list.iter().copied().filter(|hour| *hour < 24).collect();
                if kept.len() < list.len() {
                    warn!(
                        "dropping {} hour entries outside 0..24",
                        list.len() - kept.len()
                    );
                }
                if kept.is_empty() {
                    return Err(ConfigError::EmptyHours);
                }
                Ok(kept)
            }
        }
    }

    /// The selected hours rendered as `HH:00` strings for the request payload.
    pub fn hours_list(&self) -> Result<Vec<String>, ConfigError> {
        Ok(self
            .hours()?
            .into_iter()
            .map(|hour| format!("{hour:02}:00"))
            .collect())
    }
}

/// Days of month covered by the range, as zero-padded strings.
///
/// The enumeration is the coarse calendar superset the CDS grammar expects;
/// the exact window is restored by the time crop after reassembly.
pub(crate) fn days_list(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<String> {
    let (first, last) = if start.year() == end.year() && start.month() == end.month() {
        (start.day(), end.day())
    } else {
        (1, 31)
    };
    (first..=last).map(|day| format!("{day:02}")).collect()
}

/// Months covered by the range, as zero-padded strings.
pub(crate) fn months_list(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<String> {
    let (first, last) = if start.year() == end.year() {
        (start.month(), end.month())
    } else {
        (1, 12)
    };
    (first..=last).map(|month| format!("{month:02}")).collect()
}

/// Years covered by the range.
pub(crate) fn years_list(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<String> {
    (start.year()..=end.year()).map(|year| year.to_string()).collect()
}
