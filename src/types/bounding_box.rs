//! Rectangular geographic extents and their backend request forms.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Half-degree window applied on each side of a station coordinate when
/// building a point retrieval.
pub const STATION_MARGIN_DEG: f64 = 0.5;

/// A rectangular geographic extent in decimal degrees (EPSG:4326).
///
/// Longitudes use the −180..180 convention; `west < east` and
/// `south < north` are required for a box to be usable in a request.
///
/// # Examples
///
/// ```
/// use era5_accessor::BoundingBox;
///
/// let rhine_basin = BoundingBox::new(5.0, 12.0, 46.0, 52.0).unwrap();
/// assert_eq!(rhine_basin.west, 5.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub east: f64,
    pub south: f64,
    pub north: f64,
}

impl BoundingBox {
    /// Creates a validated bounding box.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBoundingBox`] when `west >= east`,
    /// `south >= north`, or any bound is not finite.
    pub fn new(west: f64, east: f64, south: f64, north: f64) -> Result<Self, ConfigError> {
        let bbox = BoundingBox {
            west,
            east,
            south,
            north,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    /// The fixed window around a station coordinate used for point retrievals.
    pub fn around(longitude: f64, latitude: f64) -> Self {
        BoundingBox {
            west: longitude - STATION_MARGIN_DEG,
            east: longitude + STATION_MARGIN_DEG,
            south: latitude - STATION_MARGIN_DEG,
            north: latitude + STATION_MARGIN_DEG,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let finite = [self.west, self.east, self.south, self.north]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.west >= self.east || self.south >= self.north {
            return Err(ConfigError::InvalidBoundingBox {
                west: self.west,
                east: self.east,
                south: self.south,
                north: self.north,
            });
        }
        Ok(())
    }

    /// The CDS `area` parameter, which expects `[north, west, south, east]`.
    pub(crate) fn cds_area(&self) -> [f64; 4] {
        [self.north, self.west, self.south, self.east]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_flipped_bounds() {
        assert!(BoundingBox::new(10.0, 5.0, 0.0, 1.0).is_err());
        assert!(BoundingBox::new(0.0, 1.0, 10.0, 5.0).is_err());
        assert!(BoundingBox::new(0.0, 0.0, 0.0, 1.0).is_err());
        assert!(BoundingBox::new(f64::NAN, 1.0, 0.0, 1.0).is_err());
    }

    #[test]
    fn station_window_is_half_degree_each_side() {
        let window = BoundingBox::around(13.4, 52.5);
        assert_eq!(window.west, 12.9);
        assert_eq!(window.east, 13.9);
        assert_eq!(window.south, 52.0);
        assert_eq!(window.north, 53.0);
        assert!(window.validate().is_ok());
    }

    #[test]
    fn cds_area_order_is_north_west_south_east() {
        let bbox = BoundingBox::new(-1.0, 1.0, -2.0, 2.0).unwrap();
        assert_eq!(bbox.cds_area(), [2.0, -1.0, -2.0, 1.0]);
    }
}
