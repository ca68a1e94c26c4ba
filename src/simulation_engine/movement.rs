use crate::geospatial::{distance_meters, GeoPoint, LocalFrame};
use crate::models::signal::SignalState;
use crate::models::vehicle::Vehicle;
use crate::simulation_engine::lanes::LaneGeometry;

/// Result of one motion step for one vehicle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionUpdate {
    pub position: GeoPoint,
    pub waiting: bool,
}

/// Kinematic stub: constant speed along the lane, stop in the stop zone on
/// red, wrap around at the end of the lane.
#[derive(Debug, Clone, Copy)]
pub struct MotionModel {
    frame: LocalFrame,
    stop_zone_inner_m: f64,
    stop_zone_outer_m: f64,
}

impl MotionModel {
    pub fn new(center: GeoPoint, stop_zone_inner_m: f64, stop_zone_outer_m: f64) -> Self {
        Self {
            frame: LocalFrame::new(center),
            stop_zone_inner_m,
            stop_zone_outer_m,
        }
    }

    pub fn frame(&self) -> &LocalFrame {
        &self.frame
    }

    pub fn in_stop_zone(&self, distance_m: f64) -> bool {
        distance_m >= self.stop_zone_inner_m && distance_m <= self.stop_zone_outer_m
    }

    /// Advances `vehicle` along `lane` for `dt` seconds.
    ///
    /// * `signal` - state of the signal governing the lane, `None` if the
    ///   direction is uncontrolled.
    ///
    /// A vehicle inside the stop zone facing red holds its position unless it
    /// is an emergency vehicle with its siren on.
    pub fn advance(
        &self,
        vehicle: &Vehicle,
        lane: &LaneGeometry,
        signal: Option<SignalState>,
        dt: f64,
    ) -> MotionUpdate {
        let distance_m = distance_meters(vehicle.position, self.frame.origin());
        let must_stop = signal == Some(SignalState::Red)
            && self.in_stop_zone(distance_m)
            && !vehicle.has_right_of_way();
        if must_stop {
            if !vehicle.waiting {
                log::debug!(
                    "Vehicle {} stopping at RED {} light, {:.1} m from centre",
                    vehicle.id,
                    lane.direction,
                    distance_m
                );
            }
            return MotionUpdate {
                position: vehicle.position,
                waiting: true,
            };
        }

        let station = lane.station_of(self.frame.to_local(vehicle.position));
        let step = vehicle.speed.max(0.0) * dt.max(0.0);
        let next = lane.advance_station(station, step);
        if next < station {
            log::debug!("Vehicle {} wrapped to the start of lane {}", vehicle.id, lane.direction);
        }
        MotionUpdate {
            position: self.frame.to_geo(lane.point_at(next)),
            waiting: false,
        }
    }

    /// Position at the upstream end of `lane`.
    pub fn lane_start(&self, lane: &LaneGeometry) -> GeoPoint {
        self.frame.to_geo(lane.start())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::signal::Direction;
    use crate::models::vehicle::{VehicleKind, VehicleSource};

    fn model() -> MotionModel {
        MotionModel::new(GeoPoint::new(40.6329, -8.6585), 15.0, 40.0)
    }

    fn southbound() -> LaneGeometry {
        LaneGeometry::new(Direction::South, 300.0, 5.0)
    }

    fn car_at_station(model: &MotionModel, station: f64, kind: VehicleKind) -> Vehicle {
        let position = model.frame().to_geo(southbound().point_at(station));
        Vehicle::new(1, kind, VehicleSource::Simulated, position, 180.0, 10.0)
    }

    #[test]
    fn moves_forward_on_green() {
        let m = model();
        let car = car_at_station(&m, -100.0, VehicleKind::Ordinary);
        let update = m.advance(&car, &southbound(), Some(SignalState::Green), 1.0);
        assert!(!update.waiting);
        let station = southbound().station_of(m.frame().to_local(update.position));
        assert!((station + 90.0).abs() < 1e-6);
    }

    #[test]
    fn waits_in_stop_zone_on_red() {
        let m = model();
        let car = car_at_station(&m, -30.0, VehicleKind::Ordinary);
        let update = m.advance(&car, &southbound(), Some(SignalState::Red), 1.0);
        assert!(update.waiting);
        assert_eq!(update.position, car.position);
    }

    #[test]
    fn red_outside_stop_zone_does_not_stop() {
        let m = model();
        let car = car_at_station(&m, -100.0, VehicleKind::Ordinary);
        let update = m.advance(&car, &southbound(), Some(SignalState::Red), 1.0);
        assert!(!update.waiting);
        assert_ne!(update.position, car.position);
    }

    #[test]
    fn active_ambulance_runs_the_red() {
        let m = model();
        let mut ambulance = car_at_station(&m, -30.0, VehicleKind::Emergency);
        ambulance.emergency_active = true;
        let update = m.advance(&ambulance, &southbound(), Some(SignalState::Red), 1.0);
        assert!(!update.waiting);

        ambulance.emergency_active = false;
        let update = m.advance(&ambulance, &southbound(), Some(SignalState::Red), 1.0);
        assert!(update.waiting);
    }

    #[test]
    fn uncontrolled_direction_never_stops() {
        let m = model();
        let car = car_at_station(&m, -30.0, VehicleKind::Ordinary);
        assert!(!m.advance(&car, &southbound(), None, 1.0).waiting);
    }

    #[test]
    fn wraps_at_end_of_lane() {
        let m = model();
        let car = car_at_station(&m, 295.0, VehicleKind::Ordinary);
        let update = m.advance(&car, &southbound(), Some(SignalState::Green), 1.0);
        let station = southbound().station_of(m.frame().to_local(update.position));
        assert!((station + 295.0).abs() < 1e-6, "got {}", station);
    }
}
