//! Gimbal executor
//!
//! [`GimbalDriver`] is the contract shared by the serial implementation and
//! the simulated fallback. Every public call issues at most one transport
//! round-trip; none of them call each other through the link lock.

mod cache;
mod limits;
mod link;
mod refresher;
mod serial;
mod simulated;

pub use cache::{AngleCache, AngleState, Angles, DEFAULT_MEASURE_COOLDOWN};
pub use limits::AxisLimits;
pub use link::GimbalLink;
pub use refresher::Refresher;
pub use serial::SerialGimbal;
pub use simulated::SimulatedGimbal;

use crate::error::{CommandError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Indicator LEDs on the gimbal head
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Led {
    /// Lit while tracking is armed
    Arm,
    /// Lit while the daemon is up
    Status,
}

/// Manual nudge direction
///
/// `up`/`down` move tilt, `left`/`right` move pan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Tilt +
    Up,
    /// Tilt -
    Down,
    /// Pan -
    Left,
    /// Pan +
    Right,
}

impl Direction {
    /// Target reached by moving `step` degrees from `from`
    pub fn apply(self, from: Angles, step: f32) -> Angles {
        let mut to = from;
        match self {
            Direction::Up => to.tilt += step,
            Direction::Down => to.tilt -= step,
            Direction::Left => to.pan -= step,
            Direction::Right => to.pan += step,
        }
        to
    }
}

impl FromStr for Direction {
    type Err = CommandError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            _ => Err(CommandError::InvalidDirection(s.to_string())),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        };
        f.write_str(name)
    }
}

/// Reject zero, negative and non-finite steps
pub fn validate_step(step: f32) -> std::result::Result<f32, CommandError> {
    if step.is_finite() && step > 0.0 {
        Ok(step)
    } else {
        Err(CommandError::InvalidStep(step))
    }
}

/// Reject non-finite targets
pub fn validate_target(tilt: f32, pan: f32) -> std::result::Result<(), CommandError> {
    if tilt.is_finite() && pan.is_finite() {
        Ok(())
    } else {
        Err(CommandError::InvalidAngle { tilt, pan })
    }
}

/// Gimbal executor contract
pub trait GimbalDriver: Send + Sync {
    /// Move to absolute angles, clamped to the axis limits
    ///
    /// Returns the angles actually commanded.
    fn move_to(&self, tilt: f32, pan: f32) -> Result<Angles>;

    /// Move `step` degrees in `direction` from the cached position
    fn nudge(&self, direction: Direction, step: f32) -> Result<Angles> {
        let step = validate_step(step)?;
        let target = direction.apply(self.angles(), step);
        self.move_to(target.tilt, target.pan)
    }

    /// Blocking hardware read of the current angles; updates the cache
    fn measure(&self) -> Result<Angles>;

    /// Switch an indicator LED
    fn set_led(&self, led: Led, on: bool) -> Result<()>;

    /// Cached angles with their observation time, never blocks on I/O
    fn angle_state(&self) -> AngleState;

    /// Cached angles, never blocks on I/O
    fn angles(&self) -> Angles {
        self.angle_state().angles
    }

    /// Request a debounced background measurement
    fn refresh(&self);

    /// Clamp bounds in effect
    fn limits(&self) -> AxisLimits;
}

/// Seed the cache at startup
///
/// Reads the real position; if the gimbal does not answer, homes it to (0, 0).
pub fn seed_position(driver: &dyn GimbalDriver) -> Result<Angles> {
    match driver.measure() {
        Ok(angles) => {
            log::info!(
                "Gimbal at pan={:.2} tilt={:.2}",
                angles.pan,
                angles.tilt
            );
            Ok(angles)
        }
        Err(e) => {
            log::warn!("Initial measure failed ({}), homing to (0, 0)", e);
            driver.move_to(0.0, 0.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_parse() {
        assert_eq!("up".parse::<Direction>().unwrap(), Direction::Up);
        assert_eq!("LEFT".parse::<Direction>().unwrap(), Direction::Left);
        assert_eq!(
            "forward".parse::<Direction>(),
            Err(CommandError::InvalidDirection("forward".to_string()))
        );
    }

    #[test]
    fn test_direction_axes() {
        let from = Angles { pan: 0.0, tilt: 10.0 };
        assert_eq!(Direction::Up.apply(from, 2.0), Angles { pan: 0.0, tilt: 12.0 });
        assert_eq!(Direction::Down.apply(from, 2.0), Angles { pan: 0.0, tilt: 8.0 });
        assert_eq!(Direction::Left.apply(from, 2.0), Angles { pan: -2.0, tilt: 10.0 });
        assert_eq!(Direction::Right.apply(from, 2.0), Angles { pan: 2.0, tilt: 10.0 });
    }

    #[test]
    fn test_validate_step() {
        assert!(validate_step(1.5).is_ok());
        assert!(validate_step(0.0).is_err());
        assert!(validate_step(-1.0).is_err());
        assert!(validate_step(f32::NAN).is_err());
    }

    #[test]
    fn test_seed_homes_when_measure_fails() {
        let sim = SimulatedGimbal::new(AxisLimits::default());
        sim.set_position(Angles { pan: 12.0, tilt: 30.0 });
        sim.fail_measurements(true);

        let seeded = seed_position(&sim).unwrap();
        assert_eq!(seeded, Angles::default());
        assert_eq!(sim.move_count(), 1);
    }

    #[test]
    fn test_seed_uses_measurement() {
        let sim = SimulatedGimbal::new(AxisLimits::default());
        sim.set_position(Angles { pan: 12.0, tilt: 30.0 });

        let seeded = seed_position(&sim).unwrap();
        assert_eq!(seeded, Angles { pan: 12.0, tilt: 30.0 });
        assert_eq!(sim.move_count(), 0);
    }
}
