use std::fmt;

use serde::{Deserialize, Serialize};

/// IUGG mean Earth radius, in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// A point on the globe, **longitude first**.
///
/// Every producer in the crate (the geocoder, the cache, the seed files) hands
/// coordinates around in `(lon, lat)` order. Anything that needs `(lat, lon)`
/// converts at its own boundary, see [`distance_km`].
#[derive(
    Debug, Clone, Copy, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Coordinates {
    pub lon: f64,
    pub lat: f64,
}

impl Coordinates {
    pub const fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Finite, with lon in [-180, 180] and lat in [-90, 90].
    pub fn is_valid(&self) -> bool {
        self.lon.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lon)
            && (-90.0..=90.0).contains(&self.lat)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.lon, self.lat)
    }
}

/// Great-circle distance in kilometers between two points.
///
/// Spherical haversine on a sphere of radius [`EARTH_RADIUS_KM`]. Inputs are
/// [`Coordinates`] (lon, lat); the formula works on (lat, lon) in radians, so
/// both points are unpacked explicitly here and nowhere else.
pub fn distance_km(a: Coordinates, b: Coordinates) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lon.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lon.to_radians());

    let d_lat = lat2 - lat1;
    let d_lon = lon2 - lon1;

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    // clamp guards asin against rounding just above 1.0 for antipodal points
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}
