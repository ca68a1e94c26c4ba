//! Geographic helpers: haversine distance, heading classification and a flat
//! metre-based frame centred on the intersection.

use crate::models::signal::Direction;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mean Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS-84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.7}, {:.7})", self.lat, self.lng)
    }
}

/// Great-circle distance between two points in metres.
pub fn distance_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lng - a.lng).to_radians();

    let h = (d_phi * 0.5).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda * 0.5).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// Brings any heading into [0, 360).
pub fn normalize_heading(heading: f64) -> f64 {
    let h = heading.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if h >= 360.0 {
        0.0
    } else {
        h
    }
}

/// Classifies a heading into one of four 90° sectors centred on the cardinal
/// headings: NORTH = [315, 360) ∪ [0, 45), EAST = [45, 135), SOUTH = [135, 225),
/// WEST = [225, 315).
///
/// Both the motion model and preemption target selection go through here.
pub fn direction_of_heading(heading: f64) -> Direction {
    let h = normalize_heading(heading);
    if h >= 315.0 || h < 45.0 {
        Direction::North
    } else if h < 135.0 {
        Direction::East
    } else if h < 225.0 {
        Direction::South
    } else {
        Direction::West
    }
}

/// A point in the local tangent plane: `x` metres east, `y` metres north of
/// the frame origin.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LocalPoint {
    pub x: f64,
    pub y: f64,
}

impl LocalPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn norm(&self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn dot(&self, other: LocalPoint) -> f64 {
        self.x * other.x + self.y * other.y
    }

    pub fn scaled(&self, k: f64) -> LocalPoint {
        LocalPoint::new(self.x * k, self.y * k)
    }

    pub fn plus(&self, other: LocalPoint) -> LocalPoint {
        LocalPoint::new(self.x + other.x, self.y + other.y)
    }
}

/// Equirectangular projection around a fixed origin. Accurate to well under a
/// metre over the few hundred metres the simulation covers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalFrame {
    origin: GeoPoint,
    cos_lat: f64,
}

impl LocalFrame {
    pub fn new(origin: GeoPoint) -> Self {
        Self {
            origin,
            cos_lat: origin.lat.to_radians().cos(),
        }
    }

    pub fn origin(&self) -> GeoPoint {
        self.origin
    }

    pub fn to_local(&self, point: GeoPoint) -> LocalPoint {
        let x = (point.lng - self.origin.lng).to_radians() * EARTH_RADIUS_M * self.cos_lat;
        let y = (point.lat - self.origin.lat).to_radians() * EARTH_RADIUS_M;
        LocalPoint::new(x, y)
    }

    pub fn to_geo(&self, point: LocalPoint) -> GeoPoint {
        let lat = self.origin.lat + (point.y / EARTH_RADIUS_M).to_degrees();
        let lng = self.origin.lng + (point.x / (EARTH_RADIUS_M * self.cos_lat)).to_degrees();
        GeoPoint::new(lat, lng)
    }
}

/// Unit vector pointing along `heading` in the local frame.
pub fn heading_unit(heading: f64) -> LocalPoint {
    let rad = heading.to_radians();
    LocalPoint::new(rad.sin(), rad.cos())
}
