//! Simulated gimbal for hardware-free operation
//!
//! Used when the serial port cannot be opened and as a test double. Moves are
//! instantaneous: the commanded (clamped) angles become the measured angles.
//! Call counters let tests assert how many hardware operations were issued.

use super::cache::{AngleState, Angles};
use super::limits::AxisLimits;
use super::{GimbalDriver, Led, validate_target};
use crate::error::{ProtocolError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug)]
struct SimState {
    position: AngleState,
    arm_led: bool,
    status_led: bool,
}

/// In-memory gimbal
pub struct SimulatedGimbal {
    state: Mutex<SimState>,
    limits: AxisLimits,
    fail_measure: AtomicBool,
    moves: AtomicU64,
    measures: AtomicU64,
    last_move: Mutex<Option<Angles>>,
}

impl SimulatedGimbal {
    /// Create a simulated gimbal at (0, 0)
    pub fn new(limits: AxisLimits) -> Self {
        log::info!("Gimbal: using simulated executor");
        Self {
            state: Mutex::new(SimState {
                position: AngleState::now(Angles::default()),
                arm_led: false,
                status_led: false,
            }),
            limits,
            fail_measure: AtomicBool::new(false),
            moves: AtomicU64::new(0),
            measures: AtomicU64::new(0),
            last_move: Mutex::new(None),
        }
    }

    /// Teleport without counting a move
    pub fn set_position(&self, angles: Angles) {
        self.state.lock().position = AngleState::now(angles);
    }

    /// Make `measure` time out until cleared
    pub fn fail_measurements(&self, fail: bool) {
        self.fail_measure.store(fail, Ordering::Relaxed);
    }

    /// Number of `move_to` calls that reached the "hardware"
    pub fn move_count(&self) -> u64 {
        self.moves.load(Ordering::Relaxed)
    }

    /// Number of `measure` calls
    pub fn measure_count(&self) -> u64 {
        self.measures.load(Ordering::Relaxed)
    }

    /// Most recent commanded angles
    pub fn last_move(&self) -> Option<Angles> {
        *self.last_move.lock()
    }

    /// Current LED state
    pub fn led(&self, led: Led) -> bool {
        let state = self.state.lock();
        match led {
            Led::Arm => state.arm_led,
            Led::Status => state.status_led,
        }
    }
}

impl GimbalDriver for SimulatedGimbal {
    fn move_to(&self, tilt: f32, pan: f32) -> Result<Angles> {
        validate_target(tilt, pan)?;
        let (tilt, pan) = self.limits.clamp(tilt, pan);
        let angles = Angles::from_wire(tilt, pan);

        self.state.lock().position = AngleState::now(angles);
        *self.last_move.lock() = Some(angles);
        self.moves.fetch_add(1, Ordering::Relaxed);
        log::debug!("Sim gimbal: moved to tilt={:.2} pan={:.2}", tilt, pan);
        Ok(angles)
    }

    fn measure(&self) -> Result<Angles> {
        self.measures.fetch_add(1, Ordering::Relaxed);
        if self.fail_measure.load(Ordering::Relaxed) {
            return Err(ProtocolError::Timeout { expected: 9 }.into());
        }
        let mut state = self.state.lock();
        state.position = AngleState::now(state.position.angles);
        Ok(state.position.angles)
    }

    fn set_led(&self, led: Led, on: bool) -> Result<()> {
        let mut state = self.state.lock();
        match led {
            Led::Arm => state.arm_led = on,
            Led::Status => state.status_led = on,
        }
        Ok(())
    }

    fn angle_state(&self) -> AngleState {
        self.state.lock().position
    }

    fn refresh(&self) {
        log::trace!("Sim gimbal: refresh is a no-op");
    }

    fn limits(&self) -> AxisLimits {
        self.limits
    }
}
