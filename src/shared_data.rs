// src/shared_data.rs

use crate::control_system::signal_phase_engine::{EmergencyPreemption, Phase};
use crate::geospatial::GeoPoint;
use crate::models::signal::{Direction, Signal, SignalState};
use crate::models::vehicle::{Vehicle, VehicleId, VehicleKind};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, with sub-second precision.
pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    pub id: u8,
    pub direction: Direction,
    pub state: SignalState,
    pub countdown: f64,
}

impl From<&Signal> for SignalSnapshot {
    fn from(signal: &Signal) -> Self {
        Self {
            id: signal.id,
            direction: signal.direction,
            state: signal.state,
            countdown: signal.countdown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    pub id: VehicleId,
    pub kind: VehicleKind,
    pub position: GeoPoint,
    pub heading: f64,
    pub speed: f64,
    pub waiting: bool,
}

impl From<&Vehicle> for VehicleSnapshot {
    fn from(vehicle: &Vehicle) -> Self {
        Self {
            id: vehicle.id,
            kind: vehicle.kind,
            position: vehicle.position,
            heading: vehicle.heading,
            speed: vehicle.speed,
            waiting: vehicle.waiting,
        }
    }
}

/// Read-only copy of the intersection state, published after every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: f64,
    pub phase: Phase,
    pub signals: Vec<SignalSnapshot>,
    pub vehicles: Vec<VehicleSnapshot>,
    pub emergency_mode: bool,
    pub preemption: Option<EmergencyPreemption>,
}

impl Snapshot {
    pub fn signal(&self, direction: Direction) -> Option<&SignalSnapshot> {
        self.signals.iter().find(|s| s.direction == direction)
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<&VehicleSnapshot> {
        self.vehicles.iter().find(|v| v.id == id)
    }

    pub fn green_directions(&self) -> Vec<Direction> {
        self.signals
            .iter()
            .filter(|s| s.state == SignalState::Green)
            .map(|s| s.direction)
            .collect()
    }
}
