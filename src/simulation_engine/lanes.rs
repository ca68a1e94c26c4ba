use crate::config::LaneConfig;
use crate::geospatial::{heading_unit, LocalPoint};
use crate::models::signal::Direction;

/// A straight one-way lane through the intersection centre, shifted to the
/// right of its centre line (right-hand traffic). Positions along the lane are
/// measured as a station `s` in metres: negative before the centre, positive
/// after it, running from `-length_m` to `+length_m`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneGeometry {
    /// Travel direction of the lane.
    pub direction: Direction,
    /// Distance from the centre to either end of the lane.
    pub length_m: f64,
    /// Offset to the right of the centre line.
    pub offset_m: f64,
}

impl LaneGeometry {
    pub fn new(direction: Direction, length_m: f64, offset_m: f64) -> Self {
        Self {
            direction,
            length_m,
            offset_m,
        }
    }

    pub fn heading(&self) -> f64 {
        self.direction.heading()
    }

    /// Unit vector of travel.
    pub fn unit(&self) -> LocalPoint {
        heading_unit(self.heading())
    }

    /// Unit vector pointing to the right of travel.
    pub fn right(&self) -> LocalPoint {
        let u = self.unit();
        LocalPoint::new(u.y, -u.x)
    }

    pub fn point_at(&self, station: f64) -> LocalPoint {
        self.unit()
            .scaled(station)
            .plus(self.right().scaled(self.offset_m))
    }

    /// Station of the closest point on the lane to `point`.
    pub fn station_of(&self, point: LocalPoint) -> f64 {
        point.dot(self.unit())
    }

    /// Upstream end of the lane, where wrapped vehicles re-enter.
    pub fn start(&self) -> LocalPoint {
        self.point_at(-self.length_m)
    }

    /// Moves `station` forward by `step`, wrapping past the downstream end
    /// back to the upstream end so traffic runs in a closed loop.
    pub fn advance_station(&self, station: f64, step: f64) -> f64 {
        let span = 2.0 * self.length_m;
        let mut next = station + step;
        if next > self.length_m {
            next = -self.length_m + (next - self.length_m).rem_euclid(span);
        }
        next
    }
}

impl From<&LaneConfig> for LaneGeometry {
    fn from(config: &LaneConfig) -> Self {
        LaneGeometry::new(config.direction, config.length_m, config.offset_m)
    }
}

/// Lane geometries for every configured direction.
pub fn create_lanes(configs: &[LaneConfig]) -> Vec<LaneGeometry> {
    configs.iter().map(LaneGeometry::from).collect()
}

pub fn lane_for(lanes: &[LaneGeometry], direction: Direction) -> Option<&LaneGeometry> {
    lanes.iter().find(|lane| lane.direction == direction)
}
