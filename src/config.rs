use crate::error::{Result, SimError};
use crate::geospatial::GeoPoint;
use crate::global_variables::AMQP_URL;
use crate::models::signal::Direction;
use crate::models::vehicle::VehicleKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Shortest tick or report period accepted. Anything smaller rounds to a
/// zero `Duration`, which tokio intervals reject.
pub const MIN_TICK_PERIOD_SECS: f64 = 0.001;

/// Geometry of the lane carrying traffic in one travel direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneConfig {
    pub direction: Direction,
    /// Distance from the centre to either end of the lane, in metres.
    pub length_m: f64,
    /// Lateral offset to the right of the centre line, in metres.
    pub offset_m: f64,
}

/// A vehicle the simulator drives itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetEntry {
    pub kind: VehicleKind,
    pub direction: Direction,
    pub speed_mps: f64,
    #[serde(default)]
    pub emergency_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub amqp_url: String,
    pub center: GeoPoint,
    /// Radius of the conflict area reported with the intersection.
    pub intersection_radius_m: f64,
    pub cycle_length_secs: f64,
    pub approach_radius_m: f64,
    pub entry_radius_m: f64,
    pub preempt_duration_secs: f64,
    pub tick_period_secs: f64,
    pub stop_zone_outer_m: f64,
    pub stop_zone_inner_m: f64,
    pub lanes: Vec<LaneConfig>,
    pub fleet: Vec<FleetEntry>,
    /// Fractional random variation applied to fleet speeds, 0 disables it.
    pub speed_jitter: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let lane = |direction, length_m| LaneConfig {
            direction,
            length_m,
            offset_m: 5.0,
        };
        Self {
            amqp_url: AMQP_URL.to_string(),
            center: GeoPoint::new(40.6329, -8.6585),
            intersection_radius_m: 15.0,
            cycle_length_secs: 30.0,
            approach_radius_m: 80.0,
            entry_radius_m: 30.0,
            preempt_duration_secs: 10.0,
            tick_period_secs: 0.1,
            stop_zone_outer_m: 40.0,
            stop_zone_inner_m: 15.0,
            lanes: vec![
                lane(Direction::North, 300.0),
                lane(Direction::South, 300.0),
                lane(Direction::East, 500.0),
                lane(Direction::West, 500.0),
            ],
            fleet: vec![
                FleetEntry {
                    kind: VehicleKind::Emergency,
                    direction: Direction::South,
                    speed_mps: 24.0,
                    emergency_active: true,
                },
                FleetEntry {
                    kind: VehicleKind::Ordinary,
                    direction: Direction::South,
                    speed_mps: 12.0,
                    emergency_active: false,
                },
                FleetEntry {
                    kind: VehicleKind::Ordinary,
                    direction: Direction::West,
                    speed_mps: 12.0,
                    emergency_active: false,
                },
            ],
            speed_jitter: 0.0,
        }
    }
}

impl SimulationConfig {
    /// Reads a JSON config file; missing fields take their defaults. The
    /// `AMQP_URL` environment variable overrides the broker address.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                serde_json::from_str::<SimulationConfig>(&raw)?
            }
            None => SimulationConfig::default(),
        };
        if let Ok(url) = std::env::var("AMQP_URL") {
            config.amqp_url = url;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("intersection_radius_m", self.intersection_radius_m),
            ("cycle_length_secs", self.cycle_length_secs),
            ("approach_radius_m", self.approach_radius_m),
            ("entry_radius_m", self.entry_radius_m),
            ("preempt_duration_secs", self.preempt_duration_secs),
            ("tick_period_secs", self.tick_period_secs),
            ("stop_zone_outer_m", self.stop_zone_outer_m),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(SimError::InvalidConfig(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if self.tick_period_secs < MIN_TICK_PERIOD_SECS {
            return Err(SimError::InvalidConfig(format!(
                "tick_period_secs must be at least {}, got {}",
                MIN_TICK_PERIOD_SECS, self.tick_period_secs
            )));
        }
        if !self.center.is_valid() {
            return Err(SimError::InvalidConfig(format!(
                "center {} is not a valid coordinate",
                self.center
            )));
        }
        if self.entry_radius_m >= self.approach_radius_m {
            return Err(SimError::InvalidConfig(format!(
                "entry radius {} must be narrower than approach radius {}",
                self.entry_radius_m, self.approach_radius_m
            )));
        }
        if !(0.0..self.stop_zone_outer_m).contains(&self.stop_zone_inner_m) {
            return Err(SimError::InvalidConfig(format!(
                "stop zone [{}, {}] is empty",
                self.stop_zone_inner_m, self.stop_zone_outer_m
            )));
        }
        if !(0.0..1.0).contains(&self.speed_jitter) {
            return Err(SimError::InvalidConfig(format!(
                "speed_jitter must be in [0, 1), got {}",
                self.speed_jitter
            )));
        }

        let mut seen = HashSet::new();
        for lane in &self.lanes {
            if !seen.insert(lane.direction) {
                return Err(SimError::InvalidConfig(format!(
                    "duplicate lane for direction {}",
                    lane.direction
                )));
            }
            if !(lane.length_m > self.stop_zone_outer_m && lane.length_m.is_finite()) {
                return Err(SimError::InvalidConfig(format!(
                    "lane {} length {} must extend past the stop zone",
                    lane.direction, lane.length_m
                )));
            }
            if !(lane.offset_m.is_finite() && lane.offset_m >= 0.0) {
                return Err(SimError::InvalidConfig(format!(
                    "lane {} offset {} must be non-negative",
                    lane.direction, lane.offset_m
                )));
            }
        }
        for entry in &self.fleet {
            if !seen.contains(&entry.direction) {
                return Err(SimError::InvalidConfig(format!(
                    "fleet vehicle on unconfigured lane {}",
                    entry.direction
                )));
            }
            if !(entry.speed_mps.is_finite() && entry.speed_mps >= 0.0) {
                return Err(SimError::InvalidConfig(format!(
                    "fleet speed {} must be non-negative",
                    entry.speed_mps
                )));
            }
        }
        Ok(())
    }

    pub fn lane_directions(&self) -> Vec<Direction> {
        self.lanes.iter().map(|lane| lane.direction).collect()
    }
}
