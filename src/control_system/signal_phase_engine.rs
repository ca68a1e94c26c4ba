use crate::control_system::emergency_detector::EmergencyEvent;
use crate::error::{Result, SimError};
use crate::models::intersection::Intersection;
use crate::models::signal::{Direction, Signal, SignalState};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Intersection-wide phase. All signals change together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// North/south red, east/west green.
    NormalPhaseA,
    /// North/south green, east/west red.
    NormalPhaseB,
    /// One direction green, everything else red.
    EmergencyPreempt,
}

impl Phase {
    pub fn is_normal(self) -> bool {
        self != Phase::EmergencyPreempt
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Phase::NormalPhaseA => write!(f, "NORMAL_PHASE_A"),
            Phase::NormalPhaseB => write!(f, "NORMAL_PHASE_B"),
            Phase::EmergencyPreempt => write!(f, "EMERGENCY_PREEMPT"),
        }
    }
}

/// An armed preemption. Present only while active.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmergencyPreemption {
    pub target_direction: Direction,
    /// Absolute time (seconds since the epoch) the preemption ends.
    pub expiry: f64,
}

/// Cyclic two-phase program with an emergency override.
///
/// The normal phase is always derived from wall-clock time, never from
/// where the program was before a preemption, so missed ticks and long
/// preemptions cannot desynchronise the cycle.
#[derive(Debug, Clone)]
pub struct SignalPhaseEngine {
    cycle_length: f64,
    phase: Phase,
    preemption: Option<EmergencyPreemption>,
}

impl SignalPhaseEngine {
    pub fn new(cycle_length: f64) -> Self {
        Self {
            cycle_length,
            phase: Phase::NormalPhaseA,
            preemption: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn preemption(&self) -> Option<EmergencyPreemption> {
        self.preemption
    }

    pub fn cycle_length(&self) -> f64 {
        self.cycle_length
    }

    /// Normal phase at wall-clock time `now`; phases alternate every cycle.
    pub fn normal_phase_at(&self, now: f64) -> Phase {
        let cycle_index = (now / self.cycle_length).floor() as i64;
        if cycle_index.rem_euclid(2) == 0 {
            Phase::NormalPhaseA
        } else {
            Phase::NormalPhaseB
        }
    }

    /// Seconds left in the normal phase active at `now`.
    pub fn normal_countdown_at(&self, now: f64) -> f64 {
        self.cycle_length - now.rem_euclid(self.cycle_length)
    }

    /// Arms (or re-arms) a preemption. The last event wins; competing
    /// emergency vehicles are not queued. Signals change on the next
    /// `update`.
    pub fn arm(&mut self, event: &EmergencyEvent, intersection: &Intersection) -> Result<()> {
        if !intersection.has_signal(event.target_direction) {
            return Err(SimError::UnknownDirection(event.target_direction));
        }
        match self.preemption {
            Some(previous) => log::info!(
                "Re-arming preemption: {} -> {}, expiry {:.1} -> {:.1}",
                previous.target_direction,
                event.target_direction,
                previous.expiry,
                event.expiry
            ),
            None => log::info!(
                "Arming preemption for {} until {:.1}",
                event.target_direction,
                event.expiry
            ),
        }
        self.preemption = Some(EmergencyPreemption {
            target_direction: event.target_direction,
            expiry: event.expiry,
        });
        Ok(())
    }

    /// Recomputes every signal for time `now` and returns the resulting phase.
    /// An expired preemption is cleared here.
    pub fn update(&mut self, now: f64, signals: &mut [Signal]) -> Phase {
        if let Some(preemption) = self.preemption {
            if now < preemption.expiry {
                let remaining = preemption.expiry - now;
                // all red first, then the one green
                for signal in signals.iter_mut() {
                    signal.state = SignalState::Red;
                    signal.countdown = remaining;
                }
                for signal in signals
                    .iter_mut()
                    .filter(|s| s.direction == preemption.target_direction)
                {
                    signal.state = SignalState::Green;
                }
                if self.phase != Phase::EmergencyPreempt {
                    log::info!(
                        "EMERGENCY OVERRIDE: green for {} only, {:.1}s remaining",
                        preemption.target_direction,
                        remaining
                    );
                }
                self.phase = Phase::EmergencyPreempt;
                return self.phase;
            }
            log::info!(
                "Preemption for {} expired, resuming normal cycle",
                preemption.target_direction
            );
            self.preemption = None;
        }

        let phase = self.normal_phase_at(now);
        let countdown = self.normal_countdown_at(now);
        for signal in signals.iter_mut() {
            signal.state = normal_state(phase, signal.direction);
            signal.countdown = countdown;
        }
        if phase != self.phase {
            log::info!("Switching to {} ({:.1}s left in cycle)", phase, countdown);
        }
        self.phase = phase;
        phase
    }
}

fn normal_state(phase: Phase, direction: Direction) -> SignalState {
    let north_south_green = phase == Phase::NormalPhaseB;
    if direction.is_north_south() == north_south_green {
        SignalState::Green
    } else {
        SignalState::Red
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geospatial::GeoPoint;

    fn intersection() -> Intersection {
        Intersection::new(GeoPoint::new(40.6329, -8.6585), 15.0, &Direction::ALL)
    }

    fn state(signals: &[Signal], d: Direction) -> SignalState {
        signals.iter().find(|s| s.direction == d).unwrap().state
    }

    #[test]
    fn normal_cycle_alternates_with_wall_clock() {
        let mut engine = SignalPhaseEngine::new(30.0);
        let mut i = intersection();

        assert_eq!(engine.update(0.0, &mut i.signals), Phase::NormalPhaseA);
        assert_eq!(state(&i.signals, Direction::North), SignalState::Red);
        assert_eq!(state(&i.signals, Direction::East), SignalState::Green);
        assert_eq!(i.signals[0].countdown, 30.0);

        assert_eq!(engine.update(29.5, &mut i.signals), Phase::NormalPhaseA);
        assert!((i.signals[0].countdown - 0.5).abs() < 1e-9);

        assert_eq!(engine.update(30.0, &mut i.signals), Phase::NormalPhaseB);
        assert_eq!(state(&i.signals, Direction::South), SignalState::Green);
        assert_eq!(state(&i.signals, Direction::West), SignalState::Red);

        assert_eq!(engine.update(61.0, &mut i.signals), Phase::NormalPhaseA);
    }

    #[test]
    fn preemption_forces_single_green_then_expires() {
        let mut engine = SignalPhaseEngine::new(30.0);
        let mut i = intersection();
        let event = EmergencyEvent {
            target_direction: Direction::South,
            expiry: 50.0,
        };
        engine.arm(&event, &i).unwrap();

        assert_eq!(engine.update(40.0, &mut i.signals), Phase::EmergencyPreempt);
        assert_eq!(i.green_directions(), vec![Direction::South]);
        assert!((i.signals[0].countdown - 10.0).abs() < 1e-9);

        // expiry restores the phase for the wall clock, not the one interrupted
        assert_eq!(engine.update(95.0, &mut i.signals), Phase::NormalPhaseB);
        assert!(engine.preemption().is_none());
        assert_eq!(state(&i.signals, Direction::North), SignalState::Green);
    }

    #[test]
    fn rearm_replaces_target_and_expiry() {
        let mut engine = SignalPhaseEngine::new(30.0);
        let mut i = intersection();
        let first = EmergencyEvent {
            target_direction: Direction::North,
            expiry: 10.0,
        };
        let second = EmergencyEvent {
            target_direction: Direction::East,
            expiry: 15.0,
        };
        engine.arm(&first, &i).unwrap();
        engine.update(1.0, &mut i.signals);
        engine.arm(&second, &i).unwrap();
        engine.update(2.0, &mut i.signals);
        assert_eq!(i.green_directions(), vec![Direction::East]);
        assert_eq!(engine.preemption().unwrap().expiry, 15.0);

        engine.update(12.0, &mut i.signals);
        assert_eq!(engine.phase(), Phase::EmergencyPreempt);
        engine.update(15.0, &mut i.signals);
        assert!(engine.phase().is_normal());
    }

    #[test]
    fn unknown_direction_is_rejected_without_state_change() {
        let mut engine = SignalPhaseEngine::new(30.0);
        let i = Intersection::new(
            GeoPoint::new(40.6329, -8.6585),
            15.0,
            &[Direction::North, Direction::South],
        );
        let event = EmergencyEvent {
            target_direction: Direction::West,
            expiry: 100.0,
        };
        let err = engine.arm(&event, &i).unwrap_err();
        assert!(matches!(err, SimError::UnknownDirection(Direction::West)));
        assert!(engine.preemption().is_none());
    }
}
