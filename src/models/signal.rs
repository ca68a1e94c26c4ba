use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Cardinal direction. For a signal this is the travel direction it governs,
/// e.g. the `South` signal controls southbound traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    /// Canonical heading in degrees (0 = N, 90 = E, 180 = S, 270 = W).
    pub fn heading(self) -> f64 {
        match self {
            Direction::North => 0.0,
            Direction::East => 90.0,
            Direction::South => 180.0,
            Direction::West => 270.0,
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
        }
    }

    /// North/south pair vs. east/west pair.
    pub fn is_north_south(self) -> bool {
        matches!(self, Direction::North | Direction::South)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Direction::North => "NORTH",
            Direction::East => "EAST",
            Direction::South => "SOUTH",
            Direction::West => "WEST",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NORTH" | "N" => Ok(Direction::North),
            "EAST" | "E" => Ok(Direction::East),
            "SOUTH" | "S" => Ok(Direction::South),
            "WEST" | "W" => Ok(Direction::West),
            other => Err(format!("unknown direction '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalState {
    Red,
    Green,
}

impl fmt::Display for SignalState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SignalState::Red => write!(f, "RED"),
            SignalState::Green => write!(f, "GREEN"),
        }
    }
}

/// One traffic light of the intersection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: u8,
    pub direction: Direction,
    pub state: SignalState,
    /// Seconds remaining in the current state.
    pub countdown: f64,
}

impl Signal {
    pub fn new(id: u8, direction: Direction) -> Self {
        Self {
            id,
            direction,
            state: SignalState::Red,
            countdown: 0.0,
        }
    }

    /// The side of the intersection the governed traffic arrives from.
    pub fn approach(&self) -> Direction {
        self.direction.opposite()
    }

    pub fn is_green(&self) -> bool {
        self.state == SignalState::Green
    }
}

/// Read access to signal states, used by the motion model to decide stop/go.
pub trait SignalView {
    /// `None` means the direction is not controlled by any signal.
    fn state_for(&self, direction: Direction) -> Option<SignalState>;
}

impl SignalView for [Signal] {
    fn state_for(&self, direction: Direction) -> Option<SignalState> {
        self.iter()
            .find(|signal| signal.direction == direction)
            .map(|signal| signal.state)
    }
}

impl SignalView for Vec<Signal> {
    fn state_for(&self, direction: Direction) -> Option<SignalState> {
        self.as_slice().state_for(direction)
    }
}
