use crate::geospatial::{direction_of_heading, distance_meters, GeoPoint};
use crate::models::signal::Direction;
use crate::models::vehicle::Vehicle;
use serde::{Deserialize, Serialize};

/// Request to preempt the signal program for `target_direction` until
/// `expiry` (seconds since the epoch).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmergencyEvent {
    pub target_direction: Direction,
    pub expiry: f64,
}

/// What the detector wants done for one vehicle on one tick. The coordinator
/// applies it; the detector itself never mutates state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerDecision {
    /// New value for the vehicle's `trigger_sent` flag.
    pub trigger_sent: bool,
    /// One-shot event produced by this approach, if any.
    pub event: Option<EmergencyEvent>,
    /// Vehicle is inside the entry radius.
    pub inside_entry: bool,
    pub distance_m: f64,
}

/// Two-radius geofence around the intersection centre: crossing the approach
/// radius fires one emergency event per approach, being inside the entry
/// radius only marks the intersection as in emergency mode.
#[derive(Debug, Clone, Copy)]
pub struct EmergencyTriggerDetector {
    center: GeoPoint,
    approach_radius_m: f64,
    entry_radius_m: f64,
    preempt_duration_secs: f64,
}

impl EmergencyTriggerDetector {
    pub fn new(
        center: GeoPoint,
        approach_radius_m: f64,
        entry_radius_m: f64,
        preempt_duration_secs: f64,
    ) -> Self {
        Self {
            center,
            approach_radius_m,
            entry_radius_m,
            preempt_duration_secs,
        }
    }

    pub fn distance_m(&self, vehicle: &Vehicle) -> f64 {
        distance_meters(vehicle.position, self.center)
    }

    /// Evaluates one vehicle. Returns `None` for vehicles the detector does
    /// not watch (anything but an emergency vehicle with its siren on).
    ///
    /// An event only fires while the vehicle is not moving away from the
    /// centre: `vehicle.last_distance_m` must be unknown or no closer than the
    /// current distance. Callers record the distance after every pass.
    pub fn evaluate(&self, vehicle: &Vehicle, now: f64) -> Option<TriggerDecision> {
        if !vehicle.has_right_of_way() {
            return None;
        }
        let distance_m = self.distance_m(vehicle);
        let inside_approach = distance_m < self.approach_radius_m;
        let approaching = vehicle
            .last_distance_m
            .map_or(true, |last| distance_m <= last);

        let (trigger_sent, event) = if inside_approach && approaching && !vehicle.trigger_sent {
            let event = EmergencyEvent {
                target_direction: direction_of_heading(vehicle.heading),
                expiry: now + self.preempt_duration_secs,
            };
            log::info!(
                "Emergency vehicle {} entered approach radius at {:.1} m, requesting {} preemption",
                vehicle.id,
                distance_m,
                event.target_direction
            );
            (true, Some(event))
        } else if !inside_approach && vehicle.trigger_sent {
            log::info!(
                "Emergency vehicle {} left approach radius ({:.1} m), trigger re-armed",
                vehicle.id,
                distance_m
            );
            (false, None)
        } else {
            (vehicle.trigger_sent, None)
        };

        Some(TriggerDecision {
            trigger_sent,
            event,
            inside_entry: distance_m < self.entry_radius_m,
            distance_m,
        })
    }
}
