use crate::communication::messages::{EmergencyReport, PositionReport, PreemptionRequest};
use crate::config::SimulationConfig;
use crate::control_system::emergency_detector::{EmergencyEvent, EmergencyTriggerDetector};
use crate::control_system::signal_phase_engine::{Phase, SignalPhaseEngine};
use crate::error::Result;
use crate::models::intersection::Intersection;
use crate::models::signal::SignalView;
use crate::models::vehicle::{Vehicle, VehicleId, VehicleKind, VehicleSource};
use crate::shared_data::{SignalSnapshot, Snapshot, VehicleSnapshot};
use crate::simulation_engine::lanes::{create_lanes, lane_for, LaneGeometry};
use crate::simulation_engine::movement::MotionModel;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

/// Longest time step the motion model is allowed to integrate in one tick.
const MAX_TICK_GAP_SECS: f64 = 1.0;

/// Everything that changes while the simulation runs.
#[derive(Debug)]
struct WorldState {
    intersection: Intersection,
    vehicles: BTreeMap<VehicleId, Vehicle>,
    engine: SignalPhaseEngine,
    emergency_mode: bool,
    last_tick: Option<f64>,
    last_update: f64,
}

/// Summary of one applied tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub phase: Phase,
    /// Emergency events raised by the detector on this tick, in arm order.
    pub triggered: Vec<(VehicleId, EmergencyEvent)>,
    /// Seconds of motion integrated on this tick.
    pub dt: f64,
}

/// Sole owner of the intersection state. Every mutation takes the single
/// state lock for its whole duration, so a tick is never observed half-applied.
#[derive(Debug)]
pub struct IntersectionCoordinator {
    state: Mutex<WorldState>,
    lanes: Vec<LaneGeometry>,
    detector: EmergencyTriggerDetector,
    motion: MotionModel,
    tick_period: f64,
}

impl IntersectionCoordinator {
    /// Builds the intersection from `config` with signals already set for `now`.
    pub fn new(config: &SimulationConfig, now: f64) -> Self {
        let mut intersection = Intersection::new(
            config.center,
            config.intersection_radius_m,
            &config.lane_directions(),
        );
        let mut engine = SignalPhaseEngine::new(config.cycle_length_secs);
        engine.update(now, &mut intersection.signals);

        Self {
            state: Mutex::new(WorldState {
                intersection,
                vehicles: BTreeMap::new(),
                engine,
                emergency_mode: false,
                last_tick: None,
                last_update: now,
            }),
            lanes: create_lanes(&config.lanes),
            detector: EmergencyTriggerDetector::new(
                config.center,
                config.approach_radius_m,
                config.entry_radius_m,
                config.preempt_duration_secs,
            ),
            motion: MotionModel::new(
                config.center,
                config.stop_zone_inner_m,
                config.stop_zone_outer_m,
            ),
            tick_period: config.tick_period_secs,
        }
    }

    pub fn lanes(&self) -> &[LaneGeometry] {
        &self.lanes
    }

    pub fn motion_model(&self) -> &MotionModel {
        &self.motion
    }

    fn lock(&self) -> MutexGuard<'_, WorldState> {
        // state stays consistent across a panic: every write is a whole field
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds locally simulated vehicles, replacing any with the same id.
    pub fn add_simulated_vehicles(&self, vehicles: impl IntoIterator<Item = Vehicle>) {
        let mut state = self.lock();
        for mut vehicle in vehicles {
            vehicle.source = VehicleSource::Simulated;
            state.vehicles.insert(vehicle.id, vehicle);
        }
    }

    /// Runs one tick: detector, then phase engine, then motion.
    pub fn apply_tick(&self, now: f64) -> TickOutcome {
        let mut state = self.lock();
        self.tick_locked(&mut state, now)
    }

    /// Like `apply_tick`, but drops the tick (returns `None`) if the state
    /// lock is currently held.
    pub fn try_apply_tick(&self, now: f64) -> Option<TickOutcome> {
        let mut state = match self.state.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return None,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        Some(self.tick_locked(&mut state, now))
    }

    fn tick_locked(&self, state: &mut WorldState, now: f64) -> TickOutcome {
        let dt = match state.last_tick {
            Some(previous) => (now - previous).clamp(0.0, MAX_TICK_GAP_SECS),
            None => self.tick_period,
        };
        state.last_tick = Some(now);

        let WorldState {
            intersection,
            vehicles,
            engine,
            emergency_mode,
            ..
        } = &mut *state;

        // 1. geofence
        let mut triggered = Vec::new();
        let mut inside_entry = false;
        for vehicle in vehicles.values_mut() {
            if let Some(decision) = self.detector.evaluate(vehicle, now) {
                vehicle.trigger_sent = decision.trigger_sent;
                inside_entry |= decision.inside_entry;
                if let Some(event) = decision.event {
                    triggered.push((vehicle.id, event));
                }
            }
            vehicle.last_distance_m = Some(self.detector.distance_m(vehicle));
        }
        if inside_entry != *emergency_mode {
            log::info!(
                "Emergency mode {}",
                if inside_entry { "ON: emergency vehicle at the intersection" } else { "OFF" }
            );
        }
        *emergency_mode = inside_entry;
        for (vehicle_id, event) in &triggered {
            if let Err(e) = engine.arm(event, intersection) {
                log::warn!("Ignoring emergency event from vehicle {}: {}", vehicle_id, e);
            }
        }

        // 2. signals
        let phase = engine.update(now, &mut intersection.signals);

        // 3. motion
        for vehicle in vehicles.values_mut().filter(|v| v.is_simulated()) {
            let Some(lane) = lane_for(&self.lanes, vehicle.direction()) else {
                continue;
            };
            let update = self
                .motion
                .advance(vehicle, lane, intersection.state_for(lane.direction), dt);
            vehicle.position = update.position;
            vehicle.waiting = update.waiting;
        }

        state.last_update = now;
        log::debug!(
            "Tick at {:.2}: phase {}, dt {:.3}s, {} vehicle(s)",
            now,
            phase,
            dt,
            state.vehicles.len()
        );
        TickOutcome {
            phase,
            triggered,
            dt,
        }
    }

    /// Upserts a vehicle from a position report. The vehicle becomes
    /// externally driven; the detector sees it on the next tick.
    pub fn apply_external_position_report(&self, report: &PositionReport) {
        let mut state = self.lock();
        match state.vehicles.entry(report.vehicle_id) {
            Entry::Occupied(mut entry) => {
                let vehicle = entry.get_mut();
                if vehicle.is_simulated() {
                    log::info!("Vehicle {} is now driven by external reports", vehicle.id);
                }
                vehicle.source = VehicleSource::External;
                vehicle.kind = report.kind;
                if report.kind == VehicleKind::Ordinary {
                    vehicle.emergency_active = false;
                }
                vehicle.position = report.position();
                vehicle.heading = report.heading;
                vehicle.speed = report.speed;
                vehicle.waiting = report.speed <= 0.0;
            }
            Entry::Vacant(entry) => {
                log::info!(
                    "New {} vehicle {} at {}",
                    report.kind,
                    report.vehicle_id,
                    report.position()
                );
                let mut vehicle = Vehicle::new(
                    report.vehicle_id,
                    report.kind,
                    VehicleSource::External,
                    report.position(),
                    report.heading,
                    report.speed,
                );
                vehicle.waiting = report.speed <= 0.0;
                entry.insert(vehicle);
            }
        }
    }

    /// Marks (or creates) the named vehicle as an emergency vehicle with its
    /// siren on.
    pub fn apply_external_emergency_report(&self, report: &EmergencyReport) {
        let mut state = self.lock();
        let vehicle = state.vehicles.entry(report.vehicle_id).or_insert_with(|| {
            Vehicle::new(
                report.vehicle_id,
                VehicleKind::Emergency,
                VehicleSource::External,
                report.position(),
                report.heading,
                0.0,
            )
        });
        if !vehicle.has_right_of_way() {
            log::info!(
                "Vehicle {} reported an emergency at {}, heading {:.0}",
                report.vehicle_id,
                report.position(),
                report.heading
            );
        }
        vehicle.kind = VehicleKind::Emergency;
        vehicle.emergency_active = true;
        vehicle.position = report.position();
        vehicle.heading = report.heading;
    }

    /// Arms a preemption requested directly (not through the geofence) and
    /// applies it to the signals right away.
    pub fn apply_preemption_request(&self, request: &PreemptionRequest, now: f64) -> Result<()> {
        let mut state = self.lock();
        let event = EmergencyEvent {
            target_direction: request.target_direction,
            expiry: now + request.duration_secs,
        };
        let WorldState {
            intersection,
            engine,
            ..
        } = &mut *state;
        engine.arm(&event, intersection)?;
        engine.update(now, &mut intersection.signals);
        state.last_update = now;
        Ok(())
    }

    /// Immutable copy of signals and vehicles.
    pub fn snapshot(&self) -> Snapshot {
        let state = self.lock();
        Snapshot {
            timestamp: state.last_update,
            phase: state.engine.phase(),
            signals: state
                .intersection
                .signals
                .iter()
                .map(SignalSnapshot::from)
                .collect(),
            vehicles: state.vehicles.values().map(VehicleSnapshot::from).collect(),
            emergency_mode: state.emergency_mode,
            preemption: state.engine.preemption(),
        }
    }

    pub fn vehicle_count(&self) -> usize {
        self.lock().vehicles.len()
    }
}
