use intersection_preemption::communication::messages::{
    EmergencyReport, PositionReport, PreemptionRequest,
};
use intersection_preemption::config::{FleetEntry, SimulationConfig};
use intersection_preemption::control_system::signal_phase_engine::{Phase, SignalPhaseEngine};
use intersection_preemption::geospatial::{distance_meters, LocalFrame, LocalPoint};
use intersection_preemption::models::signal::{Direction, SignalState};
use intersection_preemption::models::vehicle::{VehicleId, VehicleKind};
use intersection_preemption::shared_data::Snapshot;
use intersection_preemption::simulation_engine::coordinator::IntersectionCoordinator;
use intersection_preemption::simulation_engine::simulation::build_coordinator;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

const TICK: f64 = 0.1;

fn empty_config() -> SimulationConfig {
    SimulationConfig {
        fleet: Vec::new(),
        ..SimulationConfig::default()
    }
}

fn state(snapshot: &Snapshot, direction: Direction) -> SignalState {
    snapshot.signal(direction).unwrap().state
}

fn signal_states(snapshot: &Snapshot) -> Vec<(Direction, SignalState)> {
    snapshot.signals.iter().map(|s| (s.direction, s.state)).collect()
}

fn report(id: VehicleId, kind: VehicleKind, east_m: f64, north_m: f64, heading: f64) -> PositionReport {
    let p = LocalFrame::new(empty_config().center).to_geo(LocalPoint::new(east_m, north_m));
    PositionReport {
        vehicle_id: id,
        kind,
        latitude: p.lat,
        longitude: p.lng,
        heading,
        speed: 0.0,
    }
}

fn siren(report: &PositionReport) -> EmergencyReport {
    EmergencyReport {
        vehicle_id: report.vehicle_id,
        latitude: report.latitude,
        longitude: report.longitude,
        heading: report.heading,
    }
}

#[test]
fn exactly_one_green_while_preempted() {
    let coordinator = IntersectionCoordinator::new(&empty_config(), 0.0);
    let mut rng = SmallRng::seed_from_u64(7);
    let mut preempted_ticks = 0;

    for i in 1..=3000 {
        let now = i as f64 * TICK;
        if rng.random_bool(0.01) {
            let request = PreemptionRequest {
                target_direction: Direction::ALL[rng.random_range(0..4)],
                duration_secs: rng.random_range(1.0..15.0),
            };
            coordinator.apply_preemption_request(&request, now).unwrap();
        }
        coordinator.apply_tick(now);
        let snapshot = coordinator.snapshot();
        if snapshot.phase == Phase::EmergencyPreempt {
            preempted_ticks += 1;
            let greens = snapshot.green_directions();
            assert_eq!(greens.len(), 1, "at {:.1}: {:?}", now, greens);
            assert_eq!(greens[0], snapshot.preemption.unwrap().target_direction);
        }
    }
    assert!(preempted_ticks > 0);
}

#[test]
fn opposing_pairs_share_state_in_normal_phases() {
    let coordinator = build_coordinator(&SimulationConfig::default(), 0.0);
    for i in 1..=2000 {
        let now = i as f64 * TICK;
        coordinator.apply_tick(now);
        let snapshot = coordinator.snapshot();
        if !snapshot.phase.is_normal() {
            continue;
        }
        assert_eq!(state(&snapshot, Direction::North), state(&snapshot, Direction::South));
        assert_eq!(state(&snapshot, Direction::East), state(&snapshot, Direction::West));
        assert_ne!(state(&snapshot, Direction::North), state(&snapshot, Direction::East));
    }
}

#[test]
fn trigger_fires_once_per_approach() {
    let coordinator = IntersectionCoordinator::new(&empty_config(), 0.0);
    let inside = report(1, VehicleKind::Emergency, -5.0, 60.0, 180.0);
    coordinator.apply_external_position_report(&inside);
    coordinator.apply_external_emergency_report(&siren(&inside));

    let mut events = 0;
    for i in 1..=100 {
        events += coordinator.apply_tick(i as f64 * TICK).triggered.len();
    }
    assert_eq!(events, 1);

    // leave the approach radius, then come back
    coordinator.apply_external_position_report(&report(1, VehicleKind::Emergency, -5.0, 200.0, 180.0));
    assert!(coordinator.apply_tick(10.1).triggered.is_empty());
    coordinator.apply_external_position_report(&inside);
    assert_eq!(coordinator.apply_tick(10.2).triggered.len(), 1);
    assert!(coordinator.apply_tick(10.3).triggered.is_empty());
}

#[test]
fn entry_radius_toggles_emergency_mode_without_touching_signals() {
    let coordinator = IntersectionCoordinator::new(&empty_config(), 0.0);
    let approaching = report(3, VehicleKind::Emergency, 0.0, 60.0, 180.0);
    coordinator.apply_external_position_report(&approaching);
    coordinator.apply_external_emergency_report(&siren(&approaching));

    assert_eq!(coordinator.apply_tick(1.0).triggered.len(), 1);
    let snapshot = coordinator.snapshot();
    assert!(!snapshot.emergency_mode);
    assert_eq!(snapshot.green_directions(), vec![Direction::South]);
    let preempted = signal_states(&snapshot);

    // inside the entry radius
    coordinator.apply_external_position_report(&report(3, VehicleKind::Emergency, 0.0, 20.0, 180.0));
    assert!(coordinator.apply_tick(2.0).triggered.is_empty());
    let snapshot = coordinator.snapshot();
    assert!(snapshot.emergency_mode);
    assert_eq!(signal_states(&snapshot), preempted);

    // through the intersection and out past the approach radius
    coordinator.apply_external_position_report(&report(3, VehicleKind::Emergency, 0.0, -100.0, 180.0));
    assert!(coordinator.apply_tick(3.0).triggered.is_empty());
    let snapshot = coordinator.snapshot();
    assert!(!snapshot.emergency_mode);
    assert_eq!(snapshot.phase, Phase::EmergencyPreempt);
    assert_eq!(signal_states(&snapshot), preempted);
}

#[test]
fn siren_switched_on_past_the_centre_does_not_preempt() {
    let coordinator = IntersectionCoordinator::new(&empty_config(), 0.0);
    coordinator.apply_external_position_report(&report(4, VehicleKind::Emergency, 0.0, -10.0, 180.0));
    coordinator.apply_tick(1.0);

    let leaving = report(4, VehicleKind::Emergency, 0.0, -40.0, 180.0);
    coordinator.apply_external_position_report(&leaving);
    coordinator.apply_external_emergency_report(&siren(&leaving));
    assert!(coordinator.apply_tick(2.0).triggered.is_empty());
    let snapshot = coordinator.snapshot();
    assert!(snapshot.phase.is_normal());
    assert!(snapshot.preemption.is_none());
}

#[test]
fn expiry_resumes_wall_clock_phase() {
    let coordinator = IntersectionCoordinator::new(&empty_config(), 0.0);
    coordinator.apply_tick(25.0);
    assert_eq!(coordinator.snapshot().phase, Phase::NormalPhaseA);

    let request = PreemptionRequest {
        target_direction: Direction::North,
        duration_secs: 10.0,
    };
    coordinator.apply_preemption_request(&request, 25.0).unwrap();
    coordinator.apply_tick(34.9);
    assert_eq!(coordinator.snapshot().phase, Phase::EmergencyPreempt);

    // the program was in phase A when preempted; the clock says B now
    let outcome = coordinator.apply_tick(35.1);
    assert_eq!(outcome.phase, Phase::NormalPhaseB);
    assert_eq!(outcome.phase, SignalPhaseEngine::new(30.0).normal_phase_at(35.1));
    let snapshot = coordinator.snapshot();
    assert!(snapshot.preemption.is_none());
    assert!((snapshot.signals[0].countdown - 24.9).abs() < 1e-9);
}

#[test]
fn ordinary_vehicle_in_stop_zone_holds_at_red() {
    let config = SimulationConfig {
        fleet: vec![FleetEntry {
            kind: VehicleKind::Ordinary,
            direction: Direction::South,
            speed_mps: 12.0,
            emergency_active: false,
        }],
        ..SimulationConfig::default()
    };
    let coordinator = build_coordinator(&config, 0.0);

    // drive until the car reaches the stop zone; southbound is red in phase A
    let mut now = 0.0;
    let mut i = 0;
    while !coordinator.snapshot().vehicle(1).unwrap().waiting {
        i += 1;
        now = i as f64 * TICK;
        assert!(now < 30.0, "car never stopped");
        coordinator.apply_tick(now);
    }
    let held = coordinator.snapshot().vehicle(1).unwrap().position;
    while now + TICK < 30.0 {
        i += 1;
        now = i as f64 * TICK;
        coordinator.apply_tick(now);
        let car = coordinator.snapshot().vehicle(1).unwrap().clone();
        assert_eq!(state(&coordinator.snapshot(), Direction::South), SignalState::Red);
        assert!(car.waiting);
        assert_eq!(car.position, held);
    }

    // phase B turns southbound green and the car moves off
    coordinator.apply_tick(30.5);
    let car = coordinator.snapshot().vehicle(1).unwrap().clone();
    assert!(!car.waiting);
    assert_ne!(car.position, held);
}

#[test]
fn emergency_vehicle_ignores_red_in_stop_zone() {
    // a narrow geofence, so the vehicle crosses part of the stop zone before
    // its own preemption request fires
    let config = SimulationConfig {
        approach_radius_m: 35.0,
        entry_radius_m: 20.0,
        fleet: vec![FleetEntry {
            kind: VehicleKind::Emergency,
            direction: Direction::East,
            speed_mps: 12.0,
            emergency_active: true,
        }],
        ..SimulationConfig::default()
    };
    let coordinator = build_coordinator(&config, 0.0);
    let request = PreemptionRequest {
        target_direction: Direction::North,
        duration_secs: 60.0,
    };
    coordinator.apply_preemption_request(&request, 0.0).unwrap();

    let mut moved_through_red = 0;
    let mut previous = coordinator.snapshot().vehicle(1).unwrap().position;
    for i in 1..=500 {
        coordinator.apply_tick(i as f64 * TICK);
        let snapshot = coordinator.snapshot();
        let ambulance = snapshot.vehicle(1).unwrap();
        assert!(!ambulance.waiting);
        let d = distance_meters(ambulance.position, config.center);
        if (36.0..=40.0).contains(&d) && state(&snapshot, Direction::East) == SignalState::Red {
            assert_ne!(ambulance.position, previous);
            moved_through_red += 1;
        }
        previous = ambulance.position;
    }
    assert!(moved_through_red > 0);
}
