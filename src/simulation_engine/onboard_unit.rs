use crate::communication::messages::{EmergencyReport, PositionReport, SignalStateTable};
use crate::config::SimulationConfig;
use crate::control_system::emergency_detector::EmergencyTriggerDetector;
use crate::geospatial::distance_meters;
use crate::shared_data::current_timestamp;
use crate::models::signal::{Direction, SignalView};
use crate::models::vehicle::{Vehicle, VehicleId, VehicleKind};
use crate::simulation_engine::lanes::{create_lanes, lane_for, LaneGeometry};
use crate::simulation_engine::movement::MotionModel;
use crate::simulation_engine::vehicles::spawn_vehicle;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Records a vehicle sends after one step.
#[derive(Debug, Clone, PartialEq)]
pub struct OnboardOutput {
    pub position: PositionReport,
    pub emergency: Option<EmergencyReport>,
    pub distance_m: f64,
}

/// A single vehicle that drives itself and reports over the bus, following
/// the broadcast signal states rather than the authoritative phase engine.
#[derive(Debug, Clone)]
pub struct OnboardUnit {
    vehicle: Vehicle,
    lane: LaneGeometry,
    motion: MotionModel,
    detector: EmergencyTriggerDetector,
}

impl OnboardUnit {
    /// Places the vehicle at the start of the lane for `direction`. Returns
    /// `None` if the configuration has no such lane.
    pub fn new(
        config: &SimulationConfig,
        id: VehicleId,
        kind: VehicleKind,
        direction: Direction,
        speed: f64,
    ) -> Option<Self> {
        let lanes = create_lanes(&config.lanes);
        let lane = *lane_for(&lanes, direction)?;
        let motion = MotionModel::new(
            config.center,
            config.stop_zone_inner_m,
            config.stop_zone_outer_m,
        );
        let vehicle = spawn_vehicle(id, kind, &lane, speed, true, &motion);
        // the unit raises its own emergency report with the same geofence rule
        let detector = EmergencyTriggerDetector::new(
            config.center,
            config.approach_radius_m,
            config.entry_radius_m,
            config.preempt_duration_secs,
        );
        Some(Self {
            vehicle,
            lane,
            motion,
            detector,
        })
    }

    pub fn vehicle(&self) -> &Vehicle {
        &self.vehicle
    }

    /// Moves the vehicle for `dt` seconds under `signals` and builds the
    /// records to publish.
    pub fn step(&mut self, signals: &impl SignalView, dt: f64, now: f64) -> OnboardOutput {
        let update = self.motion.advance(
            &self.vehicle,
            &self.lane,
            signals.state_for(self.lane.direction),
            dt,
        );
        self.vehicle.position = update.position;
        self.vehicle.waiting = update.waiting;

        let emergency = match self.detector.evaluate(&self.vehicle, now) {
            Some(decision) => {
                self.vehicle.trigger_sent = decision.trigger_sent;
                decision.event.map(|_| EmergencyReport {
                    vehicle_id: self.vehicle.id,
                    latitude: self.vehicle.position.lat,
                    longitude: self.vehicle.position.lng,
                    heading: self.vehicle.heading,
                })
            }
            None => None,
        };
        self.vehicle.last_distance_m = Some(self.detector.distance_m(&self.vehicle));

        OnboardOutput {
            position: PositionReport {
                vehicle_id: self.vehicle.id,
                kind: self.vehicle.kind,
                latitude: self.vehicle.position.lat,
                longitude: self.vehicle.position.lng,
                heading: self.vehicle.heading,
                speed: if self.vehicle.waiting { 0.0 } else { self.vehicle.speed },
            },
            emergency,
            distance_m: distance_meters(self.vehicle.position, self.motion.frame().origin()),
        }
    }

    /// Steps the vehicle every `period` against the latest broadcast states
    /// and sends each output to `tx`. Returns when the receiver is gone.
    pub async fn run(
        mut self,
        signals: Arc<Mutex<SignalStateTable>>,
        period: Duration,
        tx: mpsc::Sender<OnboardOutput>,
    ) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let dt = period.as_secs_f64();
        loop {
            ticker.tick().await;
            let output = {
                let table = signals.lock().unwrap_or_else(PoisonError::into_inner);
                self.step(&*table, dt, current_timestamp())
            };
            log::debug!(
                "Vehicle {} at {} ({:.1} m from centre){}",
                self.vehicle.id,
                self.vehicle.position,
                output.distance_m,
                if self.vehicle.waiting { ", waiting" } else { "" }
            );
            if tx.send(output).await.is_err() {
                log::info!("Report publisher closed, vehicle {} stops", self.vehicle.id);
                return;
            }
        }
    }
}
