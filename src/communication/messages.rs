use crate::error::{Result, SimError};
use crate::geospatial::{normalize_heading, GeoPoint};
use crate::models::signal::{Direction, SignalState, SignalView};
use crate::models::vehicle::{VehicleId, VehicleKind};
use crate::shared_data::Snapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Periodic position report from a vehicle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionReport {
    pub vehicle_id: VehicleId,
    pub kind: VehicleKind,
    pub latitude: f64,
    pub longitude: f64,
    pub heading: f64,
    pub speed: f64,
}

impl PositionReport {
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Emergency notification: the named vehicle has its siren on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmergencyReport {
    pub vehicle_id: VehicleId,
    pub latitude: f64,
    pub longitude: f64,
    pub heading: f64,
}

impl EmergencyReport {
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Direct request to preempt the signals for one direction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreemptionRequest {
    pub target_direction: Direction,
    pub duration_secs: f64,
}

/// Signal states as broadcast to vehicles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalStateBroadcast {
    pub timestamp: f64,
    pub states: BTreeMap<Direction, SignalState>,
}

impl From<&Snapshot> for SignalStateBroadcast {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            timestamp: snapshot.timestamp,
            states: snapshot
                .signals
                .iter()
                .map(|s| (s.direction, s.state))
                .collect(),
        }
    }
}

// Wire shapes. Every field is optional so a missing one is reported as a
// malformed record instead of a generic parse failure.

#[derive(Debug, Deserialize)]
struct RawPositionReport {
    vehicle_id: Option<VehicleId>,
    kind: Option<VehicleKind>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    heading: Option<f64>,
    speed: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawEmergencyReport {
    vehicle_id: Option<VehicleId>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    heading: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawPreemptionRequest {
    target_direction: Option<String>,
    duration_secs: Option<f64>,
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| SimError::MalformedRecord(format!("missing field '{}'", field)))
}

fn checked_position(latitude: Option<f64>, longitude: Option<f64>) -> Result<GeoPoint> {
    let point = GeoPoint::new(required(latitude, "latitude")?, required(longitude, "longitude")?);
    if !point.is_valid() {
        return Err(SimError::MalformedRecord(format!(
            "position {} out of range",
            point
        )));
    }
    Ok(point)
}

fn checked_heading(heading: Option<f64>) -> Result<f64> {
    let heading = required(heading, "heading")?;
    if !heading.is_finite() {
        return Err(SimError::MalformedRecord("heading is not finite".to_string()));
    }
    Ok(normalize_heading(heading))
}

impl TryFrom<RawPositionReport> for PositionReport {
    type Error = SimError;

    fn try_from(raw: RawPositionReport) -> Result<Self> {
        let vehicle_id = required(raw.vehicle_id, "vehicle_id")?;
        let position = checked_position(raw.latitude, raw.longitude)?;
        let heading = checked_heading(raw.heading)?;
        let speed = raw.speed.unwrap_or(0.0);
        if !(speed.is_finite() && speed >= 0.0) {
            return Err(SimError::MalformedRecord(format!("invalid speed {}", speed)));
        }
        Ok(PositionReport {
            vehicle_id,
            kind: raw.kind.unwrap_or(VehicleKind::Ordinary),
            latitude: position.lat,
            longitude: position.lng,
            heading,
            speed,
        })
    }
}

impl TryFrom<RawEmergencyReport> for EmergencyReport {
    type Error = SimError;

    fn try_from(raw: RawEmergencyReport) -> Result<Self> {
        let vehicle_id = required(raw.vehicle_id, "vehicle_id")?;
        let position = checked_position(raw.latitude, raw.longitude)?;
        Ok(EmergencyReport {
            vehicle_id,
            latitude: position.lat,
            longitude: position.lng,
            heading: checked_heading(raw.heading)?,
        })
    }
}

impl TryFrom<RawPreemptionRequest> for PreemptionRequest {
    type Error = SimError;

    fn try_from(raw: RawPreemptionRequest) -> Result<Self> {
        let name = required(raw.target_direction, "target_direction")?;
        let target_direction = name.parse::<Direction>().map_err(SimError::MalformedRecord)?;
        let duration_secs = required(raw.duration_secs, "duration_secs")?;
        if !(duration_secs.is_finite() && duration_secs > 0.0) {
            return Err(SimError::MalformedRecord(format!(
                "invalid preemption duration {}",
                duration_secs
            )));
        }
        Ok(PreemptionRequest {
            target_direction,
            duration_secs,
        })
    }
}

pub fn decode_position_report(body: &[u8]) -> Result<PositionReport> {
    serde_json::from_slice::<RawPositionReport>(body)?.try_into()
}

pub fn decode_emergency_report(body: &[u8]) -> Result<EmergencyReport> {
    serde_json::from_slice::<RawEmergencyReport>(body)?.try_into()
}

pub fn decode_preemption_request(body: &[u8]) -> Result<PreemptionRequest> {
    serde_json::from_slice::<RawPreemptionRequest>(body)?.try_into()
}

pub fn decode_signal_broadcast(body: &[u8]) -> Result<SignalStateBroadcast> {
    Ok(serde_json::from_slice(body)?)
}

/// Signal states as last heard by a vehicle that follows the broadcasts
/// instead of the authoritative phase engine.
#[derive(Debug, Clone, Default)]
pub struct SignalStateTable {
    states: BTreeMap<Direction, SignalState>,
    last_update: Option<f64>,
}

impl SignalStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a broadcast. Older broadcasts than the last applied are ignored.
    pub fn apply(&mut self, broadcast: &SignalStateBroadcast) {
        if let Some(last) = self.last_update {
            if broadcast.timestamp < last {
                return;
            }
        }
        for (&direction, &state) in &broadcast.states {
            let previous = self.states.insert(direction, state);
            if previous != Some(state) {
                log::info!("Traffic light for {} changed to {}", direction, state);
            }
        }
        self.last_update = Some(broadcast.timestamp);
    }
}

impl SignalView for SignalStateTable {
    /// Directions never heard about are assumed RED.
    fn state_for(&self, direction: Direction) -> Option<SignalState> {
        Some(
            self.states
                .get(&direction)
                .copied()
                .unwrap_or(SignalState::Red),
        )
    }
}
