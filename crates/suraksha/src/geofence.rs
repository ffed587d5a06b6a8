//! Geofence evaluation.
//!
//! Pure point-in-circle checks over risk zones using great-circle distance.
//! Nothing here touches storage or shared state, so every function is safe
//! to call concurrently.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::zone::RiskZone;

/// Mean Earth radius used for haversine distances, in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A validated geographic coordinate in signed decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawCoordinate {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = Error;

    fn try_from(raw: RawCoordinate) -> Result<Self> {
        Self::new(raw.latitude, raw.longitude)
    }
}

impl Coordinate {
    /// Create a coordinate, rejecting values outside the valid ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the latitude is outside −90..=90, the
    /// longitude is outside −180..=180, or either value is not finite.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::validation(format!(
                "latitude {latitude} is outside -90..90"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::validation(format!(
                "longitude {longitude} is outside -180..180"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Latitude in degrees.
    #[must_use]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in degrees.
    #[must_use]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Great-circle distance to another coordinate in kilometers.
    #[must_use]
    pub fn distance_km(&self, other: &Self) -> f64 {
        haversine_km(self, other)
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.latitude, self.longitude)
    }
}

/// Great-circle distance between two coordinates using the haversine formula.
#[must_use]
pub fn haversine_km(a: &Coordinate, b: &Coordinate) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos()
            * b.latitude.to_radians().cos()
            * (d_lon / 2.0).sin().powi(2);
    // Rounding can push h just past 1 near the antipode.
    let h = h.clamp(0.0, 1.0);

    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Check whether a point lies within a zone's radius.
///
/// The zone's lifecycle state is not consulted here; see [`find_containing`].
#[must_use]
pub fn contains(point: &Coordinate, zone: &RiskZone) -> bool {
    haversine_km(point, &zone.center) <= zone.radius_km
}

/// Find the first active zone containing the point.
///
/// Zones are scanned in the order given, which callers keep as creation
/// order. The first hit wins; a closer zone later in the slice is not
/// preferred.
#[must_use]
pub fn find_containing<'a>(point: &Coordinate, zones: &'a [RiskZone]) -> Option<&'a RiskZone> {
    zones
        .iter()
        .filter(|zone| zone.is_active())
        .find(|zone| contains(point, zone))
}
