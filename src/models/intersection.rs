use crate::geospatial::GeoPoint;
use crate::models::signal::{Direction, Signal, SignalState, SignalView};

/// Signal group number used on the wire for each governed direction.
pub fn signal_group(direction: Direction) -> u8 {
    match direction {
        Direction::North => 1,
        Direction::East => 3,
        Direction::South => 5,
        Direction::West => 7,
    }
}

/// The controlled intersection. Geometry is fixed at startup; only the signal
/// states change, and only through the phase engine.
#[derive(Debug, Clone)]
pub struct Intersection {
    pub center: GeoPoint,
    /// Radius of the conflict area in metres.
    pub radius: f64,
    pub signals: Vec<Signal>,
}

impl Intersection {
    /// One signal per direction in `directions`, all starting RED.
    pub fn new(center: GeoPoint, radius: f64, directions: &[Direction]) -> Self {
        let mut signals: Vec<Signal> = directions
            .iter()
            .map(|&d| Signal::new(signal_group(d), d))
            .collect();
        signals.sort_by_key(|s| s.direction);
        signals.dedup_by_key(|s| s.direction);
        Self {
            center,
            radius,
            signals,
        }
    }

    pub fn has_signal(&self, direction: Direction) -> bool {
        self.signals.iter().any(|s| s.direction == direction)
    }

    pub fn signal(&self, direction: Direction) -> Option<&Signal> {
        self.signals.iter().find(|s| s.direction == direction)
    }

    pub fn green_directions(&self) -> Vec<Direction> {
        self.signals
            .iter()
            .filter(|s| s.state == SignalState::Green)
            .map(|s| s.direction)
            .collect()
    }
}

impl SignalView for Intersection {
    fn state_for(&self, direction: Direction) -> Option<SignalState> {
        self.signals.state_for(direction)
    }
}
