//! Geographic types and location capture for FixMyArea reports.
//!
//! This crate provides:
//! - [`Coordinate`] with range validation
//! - [`GeoPoint`], the location attached to a report (accuracy + degraded flag)
//! - [`LocationCapturer`], a bounded-wait wrapper around a platform location
//!   provider with a last-known-fix fallback
//!
//! # Example
//!
//! ```
//! use fixmyarea_geo::{Coordinate, GeoPoint};
//!
//! let dhaka = Coordinate::new(23.8103, 90.4125);
//! assert!(dhaka.is_valid());
//!
//! let point = GeoPoint::exact(dhaka);
//! assert!(!point.degraded);
//! ```

#![warn(missing_docs)]

mod capture;

pub use capture::{
    CaptureOutcome, CapturePolicy, LocationCapturer, LocationFix, LocationProvider,
    StaticLocationProvider,
};

use serde::{Deserialize, Serialize};

/// A geographic coordinate with latitude and longitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees (-90 to 90)
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180)
    pub longitude: f64,
}

impl Coordinate {
    /// Creates a new coordinate.
    #[inline]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Returns true if both components are finite and in range.
    #[inline]
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self::new(lat, lng)
    }
}

/// Location attached to a report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Where the issue is
    #[serde(flatten)]
    pub coordinate: Coordinate,
    /// Horizontal accuracy radius in meters, when the source reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_m: Option<f64>,
    /// Set when the fix is stale or less accurate than the capture policy wants
    #[serde(default)]
    pub degraded: bool,
}

impl GeoPoint {
    /// A point entered or picked by the user; no accuracy estimate.
    pub fn exact(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            accuracy_m: None,
            degraded: false,
        }
    }

    /// A point with an accuracy estimate.
    pub fn with_accuracy(coordinate: Coordinate, accuracy_m: f64) -> Self {
        Self {
            coordinate,
            accuracy_m: Some(accuracy_m),
            degraded: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_validation() {
        assert!(Coordinate::new(0.0, 0.0).is_valid());
        assert!(Coordinate::new(90.0, 180.0).is_valid());
        assert!(Coordinate::new(-90.0, -180.0).is_valid());
        assert!(!Coordinate::new(91.0, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, 181.0).is_valid());
        assert!(!Coordinate::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_geo_point_serializes_flat() {
        let point = GeoPoint::with_accuracy(Coordinate::new(23.81, 90.41), 12.5);
        let json = serde_json::to_value(point).unwrap();

        assert_eq!(json["latitude"], 23.81);
        assert_eq!(json["longitude"], 90.41);
        assert_eq!(json["accuracy_m"], 12.5);
        assert_eq!(json["degraded"], false);

        let back: GeoPoint = serde_json::from_value(json).unwrap();
        assert_eq!(back, point);
    }
}
