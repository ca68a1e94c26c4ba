// simulation.rs
use crate::config::SimulationConfig;
use crate::error::{Result, SimError};
use crate::shared_data::{current_timestamp, Snapshot};
use crate::simulation_engine::coordinator::IntersectionCoordinator;
use crate::simulation_engine::vehicles::build_fleet;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Seed for the fleet speed jitter, so repeated runs see the same fleet.
const FLEET_SEED: u64 = 1;

/// Builds the coordinator for `config` and adds the configured fleet.
pub fn build_coordinator(config: &SimulationConfig, now: f64) -> IntersectionCoordinator {
    let coordinator = IntersectionCoordinator::new(config, now);
    let mut rng = SmallRng::seed_from_u64(FLEET_SEED);
    let fleet = build_fleet(
        &config.fleet,
        coordinator.lanes(),
        coordinator.motion_model(),
        config.speed_jitter,
        1,
        &mut rng,
    );
    log::info!(
        "Intersection at {} ready with {} simulated vehicle(s)",
        config.center,
        fleet.len()
    );
    coordinator.add_simulated_vehicles(fleet);
    coordinator
}

/// Ticks the coordinator on a steady period until the task is cancelled.
/// A tick that finds the state lock busy is dropped. After every applied tick
/// the snapshot is handed to `publisher`, if any, without waiting.
pub async fn run_tick_loop(
    coordinator: Arc<IntersectionCoordinator>,
    period: Duration,
    publisher: Option<mpsc::Sender<Snapshot>>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let now = current_timestamp();
        let Some(outcome) = coordinator.try_apply_tick(now) else {
            log::debug!("Tick at {:.2} dropped: state busy", now);
            continue;
        };
        for (vehicle_id, event) in &outcome.triggered {
            log::info!(
                "Vehicle {} preempted {} until {:.1}",
                vehicle_id,
                event.target_direction,
                event.expiry
            );
        }
        if let Some(tx) = &publisher {
            if let Err(e) = tx.try_send(coordinator.snapshot()) {
                log::warn!("Snapshot not published: {}", e);
            }
        }
    }
}

/// Runs `ticks` ticks on a simulated clock starting at `start`, without any
/// transport. Returns the final snapshot.
pub fn run_for_ticks(
    coordinator: &IntersectionCoordinator,
    start: f64,
    period: f64,
    ticks: u64,
) -> Result<Snapshot> {
    if !(period.is_finite() && period > 0.0) {
        return Err(SimError::InvalidConfig(format!(
            "tick period must be positive, got {}",
            period
        )));
    }
    let per_second = (1.0 / period).round().max(1.0) as u64;
    for i in 1..=ticks {
        let now = start + i as f64 * period;
        coordinator.apply_tick(now);
        if i % per_second == 0 {
            log_summary(&coordinator.snapshot());
        }
    }
    Ok(coordinator.snapshot())
}

/// Like `run_for_ticks`, but waits for each period in real time.
pub async fn run_realtime(
    coordinator: &IntersectionCoordinator,
    period: Duration,
    ticks: u64,
) -> Snapshot {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let per_second = (1.0 / period.as_secs_f64()).round().max(1.0) as u64;
    for i in 1..=ticks {
        ticker.tick().await;
        coordinator.apply_tick(current_timestamp());
        if i % per_second == 0 {
            log_summary(&coordinator.snapshot());
        }
    }
    coordinator.snapshot()
}

pub fn log_summary(snapshot: &Snapshot) {
    let lights: Vec<String> = snapshot
        .signals
        .iter()
        .map(|s| format!("{}={}({:.0}s)", s.direction, s.state, s.countdown))
        .collect();
    let waiting = snapshot.vehicles.iter().filter(|v| v.waiting).count();
    log::info!(
        "[{:.1}] {} | {} | vehicles {} waiting {}{}",
        snapshot.timestamp,
        snapshot.phase,
        lights.join(" "),
        snapshot.vehicles.len(),
        waiting,
        if snapshot.emergency_mode { " | EMERGENCY" } else { "" }
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_system::signal_phase_engine::Phase;

    #[test]
    fn default_fleet_is_added() {
        let coordinator = build_coordinator(&SimulationConfig::default(), 0.0);
        assert_eq!(coordinator.vehicle_count(), 3);
    }

    #[test]
    fn headless_run_advances_the_clock() {
        let coordinator = build_coordinator(&SimulationConfig::default(), 0.0);
        let snapshot = run_for_ticks(&coordinator, 0.0, 0.1, 50).unwrap();
        assert!((snapshot.timestamp - 5.0).abs() < 1e-6);
        // the ambulance starts 300 m out and has not reached the geofence yet
        assert_eq!(snapshot.phase, Phase::NormalPhaseA);
    }

    #[test]
    fn zero_period_is_rejected() {
        let coordinator = build_coordinator(&SimulationConfig::default(), 0.0);
        assert!(matches!(
            run_for_ticks(&coordinator, 0.0, 0.0, 10),
            Err(SimError::InvalidConfig(_))
        ));
    }
}
