// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};

/// Mean radius of Earth, in kilometers.
/// Source: https://en.wikipedia.org/wiki/Earth_radius#Arithmetic_mean_radius
const EARTH_RADIUS: f64 = 6371.0088;

/// Mean diameter of Earth, in kilometers.
/// Source: https://en.wikipedia.org/wiki/Earth_radius#Arithmetic_mean_radius
const EARTH_DIAMETER: f64 = EARTH_RADIUS + EARTH_RADIUS;

/// Error conditions raised by the geometry helpers.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum GeoError {
    #[error("vectors must have exactly 2 dimensions")]
    InvalidVector,

    #[error("{0} is not a valid latitude (must be between -90 and 90)")]
    InvalidLatitude(f64),

    #[error("{0} is not a valid longitude (must be between -180 and 180)")]
    InvalidLongitude(f64),
}

/// A WGS84 position. Altitude is carried through but never interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub alt: f64,
}

impl GeoCoordinate {
    /// Creates a position after checking the WGS84 value ranges.
    pub fn new(lat: f64, lng: f64) -> Result<Self, GeoError> {
        if !(-90.0..=90.0).contains(&lat) {
            Err(GeoError::InvalidLatitude(lat))
        } else if !(-180.0..=180.0).contains(&lng) {
            Err(GeoError::InvalidLongitude(lng))
        } else {
            Ok(Self { lat, lng, alt: 0.0 })
        }
    }
}

/// Calculates the great-circle distance between two positions
/// on Earth using the [haversine formula](https://en.wikipedia.org/wiki/Haversine_formula).
/// Returns the result in kilometers.
pub fn earth_distance(a: GeoCoordinate, b: GeoCoordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lon1 = a.lng.to_radians();
    let lat2 = b.lat.to_radians();
    let lon2 = b.lng.to_radians();

    let sin_dlat_half = ((lat2 - lat1) * 0.5).sin();
    let sin_dlon_half = ((lon2 - lon1) * 0.5).sin();

    let h = sin_dlat_half * sin_dlat_half + lat1.cos() * lat2.cos() * sin_dlon_half * sin_dlon_half;

    EARTH_DIAMETER * h.sqrt().asin()
}

/// Characterization of the turn between two displacement vectors,
/// named after the restriction tag value it maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn {
    NoLeftTurn,
    NoRightTurn,
    NoUTurn,
}

impl Turn {
    /// The `restriction` tag value for this turn.
    pub fn as_tag_value(self) -> &'static str {
        match self {
            Self::NoLeftTurn => "no_left_turn",
            Self::NoRightTurn => "no_right_turn",
            Self::NoUTurn => "no_u_turn",
        }
    }
}

impl std::fmt::Display for Turn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_tag_value())
    }
}

/// The (Δlng, Δlat) displacement between the first and last position of a chain.
pub fn create_vector(chain: &[GeoCoordinate]) -> [f64; 2] {
    debug_assert!(!chain.is_empty());
    let first = chain[0];
    let last = chain[chain.len() - 1];
    [last.lng - first.lng, last.lat - first.lat]
}

/// Classifies the turn from the incoming vector `v1` onto the outgoing vector `v2`
/// by the sign of the determinant of the matrix with `v1` and `v2` as columns.
///
/// Both vectors must be exactly 2-dimensional, otherwise
/// [GeoError::InvalidVector] is returned.
pub fn classify_turn(v1: &[f64], v2: &[f64]) -> Result<Turn, GeoError> {
    if v1.len() != 2 || v2.len() != 2 {
        return Err(GeoError::InvalidVector);
    }

    let det = v1[0] * v2[1] - v2[0] * v1[1];
    if det > 0.0 {
        Ok(Turn::NoLeftTurn)
    } else if det < 0.0 {
        Ok(Turn::NoRightTurn)
    } else {
        Ok(Turn::NoUTurn)
    }
}
