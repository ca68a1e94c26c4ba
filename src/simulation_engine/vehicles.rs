use crate::config::FleetEntry;
use crate::models::vehicle::{Vehicle, VehicleId, VehicleKind, VehicleSource};
use crate::simulation_engine::lanes::{lane_for, LaneGeometry};
use crate::simulation_engine::movement::MotionModel;
use rand::Rng;

/// Creates a simulated vehicle at the upstream end of its lane, heading along it.
pub fn spawn_vehicle(
    id: VehicleId,
    kind: VehicleKind,
    lane: &LaneGeometry,
    speed: f64,
    emergency_active: bool,
    motion: &MotionModel,
) -> Vehicle {
    let mut vehicle = Vehicle::new(
        id,
        kind,
        VehicleSource::Simulated,
        motion.lane_start(lane),
        lane.heading(),
        speed,
    );
    vehicle.emergency_active = kind == VehicleKind::Emergency && emergency_active;
    vehicle
}

/// Builds the simulated fleet, ids starting at `first_id`. With a non-zero
/// `speed_jitter` each speed is scaled by a random factor in
/// `[1 - jitter, 1 + jitter)`. Entries on an unknown lane are skipped.
pub fn build_fleet<R: Rng>(
    entries: &[FleetEntry],
    lanes: &[LaneGeometry],
    motion: &MotionModel,
    speed_jitter: f64,
    first_id: VehicleId,
    rng: &mut R,
) -> Vec<Vehicle> {
    let mut next_id = first_id;
    let mut fleet = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(lane) = lane_for(lanes, entry.direction) else {
            log::warn!("No lane for fleet vehicle heading {}, skipped", entry.direction);
            continue;
        };
        let speed = if speed_jitter > 0.0 {
            entry.speed_mps * rng.random_range((1.0 - speed_jitter)..(1.0 + speed_jitter))
        } else {
            entry.speed_mps
        };
        let vehicle = spawn_vehicle(
            next_id,
            entry.kind,
            lane,
            speed,
            entry.emergency_active,
            motion,
        );
        log::info!(
            "Spawned {} vehicle {} on lane {} at {} ({:.1} m/s)",
            vehicle.kind,
            vehicle.id,
            lane.direction,
            vehicle.position,
            vehicle.speed
        );
        fleet.push(vehicle);
        next_id += 1;
    }
    fleet
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::geospatial::distance_meters;
    use crate::models::signal::Direction;
    use crate::simulation_engine::lanes::create_lanes;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn default_fleet_starts_at_lane_ends() {
        let config = SimulationConfig::default();
        let lanes = create_lanes(&config.lanes);
        let motion = MotionModel::new(config.center, 15.0, 40.0);
        let mut rng = SmallRng::seed_from_u64(1);
        let fleet = build_fleet(&config.fleet, &lanes, &motion, 0.0, 1, &mut rng);

        assert_eq!(fleet.len(), 3);
        let ambulance = &fleet[0];
        assert_eq!(ambulance.id, 1);
        assert!(ambulance.has_right_of_way());
        assert_eq!(ambulance.direction(), Direction::South);
        assert_eq!(ambulance.speed, 24.0);
        let d = distance_meters(ambulance.position, config.center);
        assert!((d - 300.0).abs() < 1.0, "got {}", d);
        assert_eq!(fleet[2].heading, 270.0);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let config = SimulationConfig::default();
        let lanes = create_lanes(&config.lanes);
        let motion = MotionModel::new(config.center, 15.0, 40.0);
        let mut rng = SmallRng::seed_from_u64(42);
        let fleet = build_fleet(&config.fleet, &lanes, &motion, 0.2, 10, &mut rng);
        for (vehicle, entry) in fleet.iter().zip(&config.fleet) {
            assert!(vehicle.speed >= entry.speed_mps * 0.8);
            assert!(vehicle.speed < entry.speed_mps * 1.2);
        }
        assert_eq!(fleet[0].id, 10);
    }
}
