use crate::geospatial::{direction_of_heading, GeoPoint};
use crate::models::signal::Direction;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type VehicleId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VehicleKind {
    Ordinary,
    Emergency,
}

impl fmt::Display for VehicleKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VehicleKind::Ordinary => write!(f, "Ordinary"),
            VehicleKind::Emergency => write!(f, "Emergency"),
        }
    }
}

/// Who moves the vehicle. Externally driven vehicles only change position
/// when a report arrives; the local motion model leaves them alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleSource {
    Simulated,
    External,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vehicle {
    pub id: VehicleId,
    pub kind: VehicleKind,
    pub source: VehicleSource,
    pub position: GeoPoint,
    /// Degrees, 0 = N, 90 = E, 180 = S, 270 = W.
    pub heading: f64,
    /// Metres per second.
    pub speed: f64,
    pub waiting: bool,
    /// Siren on. Only meaningful for emergency vehicles.
    pub emergency_active: bool,
    /// Set once an approach has produced its emergency event.
    pub trigger_sent: bool,
    /// Distance to the intersection centre at the previous detector pass.
    pub last_distance_m: Option<f64>,
}

impl Vehicle {
    pub fn new(
        id: VehicleId,
        kind: VehicleKind,
        source: VehicleSource,
        position: GeoPoint,
        heading: f64,
        speed: f64,
    ) -> Self {
        Self {
            id,
            kind,
            source,
            position,
            heading,
            speed,
            waiting: false,
            emergency_active: false,
            trigger_sent: false,
            last_distance_m: None,
        }
    }

    /// Emergency vehicle with its siren on: has right of way at red lights and
    /// is watched by the trigger detector.
    pub fn has_right_of_way(&self) -> bool {
        self.kind == VehicleKind::Emergency && self.emergency_active
    }

    pub fn direction(&self) -> Direction {
        direction_of_heading(self.heading)
    }

    pub fn is_simulated(&self) -> bool {
        self.source == VehicleSource::Simulated
    }
}
