//! Operator intent queue and controller loop
//!
//! A single consumer thread drains a bounded FIFO mailbox, so at most one
//! operator command touches the gimbal at a time. Per-intent failures are
//! recorded as `last_error` and the loop keeps going.

use crate::error::{CommandError, Error, Result};
use crate::gimbal::{self, Direction, GimbalDriver, Led};
use crate::state::{Mode, SharedState};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How often the loop re-checks the running flag while idle
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Operator intent
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Intent {
    SetMode(Mode),
    Move { direction: Direction, step: f32 },
    MoveTo { tilt: f32, pan: f32 },
    Arm,
    Disarm,
}

impl Intent {
    /// Parse and validate a mode change
    pub fn set_mode(mode: &str) -> std::result::Result<Self, CommandError> {
        Ok(Intent::SetMode(mode.parse()?))
    }

    /// Parse and validate a relative move
    pub fn nudge(direction: &str, step: f32) -> std::result::Result<Self, CommandError> {
        Ok(Intent::Move {
            direction: direction.parse()?,
            step: gimbal::validate_step(step)?,
        })
    }

    /// Validate an absolute move
    pub fn move_to(tilt: f32, pan: f32) -> std::result::Result<Self, CommandError> {
        gimbal::validate_target(tilt, pan)?;
        Ok(Intent::MoveTo { tilt, pan })
    }
}

/// Execute one intent against the gimbal
pub fn process(driver: &dyn GimbalDriver, state: &SharedState, intent: Intent) -> Result<()> {
    match intent {
        Intent::SetMode(mode) => state.set_mode(mode),
        Intent::Move { direction, step } => {
            require_manual(state)?;
            driver.nudge(direction, step)?;
        }
        Intent::MoveTo { tilt, pan } => {
            require_manual(state)?;
            driver.move_to(tilt, pan)?;
        }
        // State flips even if the LED write fails
        Intent::Arm => {
            state.set_armed(true);
            state.set_mode(Mode::Auto);
            driver.set_led(Led::Arm, true)?;
        }
        Intent::Disarm => {
            state.set_armed(false);
            state.set_mode(Mode::Manual);
            driver.set_led(Led::Arm, false)?;
        }
    }
    Ok(())
}

fn require_manual(state: &SharedState) -> Result<()> {
    if state.mode() == Mode::Manual {
        Ok(())
    } else {
        Err(CommandError::NotManual.into())
    }
}

/// Execute one intent and record the outcome in `state`
pub fn apply(driver: &dyn GimbalDriver, state: &SharedState, intent: Intent) {
    log::debug!("Processing intent: {:?}", intent);
    match process(driver, state, intent) {
        Ok(()) => state.clear_error(),
        Err(e) => {
            log::warn!("Intent {:?} failed: {}", intent, e);
            state.record_error(&e);
        }
    }
}

/// Producer side of the intent mailbox
#[derive(Clone)]
pub struct IntentQueue {
    tx: Sender<Intent>,
}

impl IntentQueue {
    /// Enqueue without blocking
    pub fn enqueue(&self, intent: Intent) -> Result<()> {
        self.tx.try_send(intent).map_err(|e| match e {
            TrySendError::Full(_) => Error::QueueUnavailable("intent mailbox full"),
            TrySendError::Disconnected(_) => Error::QueueUnavailable("controller stopped"),
        })
    }

    /// Intents waiting to be processed
    pub fn pending(&self) -> usize {
        self.tx.len()
    }
}

/// Controller loop thread
pub struct Controller {
    queue: IntentQueue,
    handle: Option<JoinHandle<()>>,
}

impl Controller {
    /// Spawn the controller loop
    pub fn spawn(
        driver: Arc<dyn GimbalDriver>,
        state: Arc<SharedState>,
        capacity: usize,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let (tx, rx) = bounded(capacity.max(1));

        let handle = thread::Builder::new()
            .name("controller".to_string())
            .spawn(move || run(rx, driver.as_ref(), &state, &running))
            .map_err(|e| Error::Other(format!("Failed to spawn controller: {}", e)))?;

        Ok(Self {
            queue: IntentQueue { tx },
            handle: Some(handle),
        })
    }

    /// Clonable producer handle
    pub fn queue(&self) -> IntentQueue {
        self.queue.clone()
    }

    /// Wait for the loop to exit (after the running flag is cleared)
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log::error!("Controller thread panicked");
        }
    }
}

fn run(rx: Receiver<Intent>, driver: &dyn GimbalDriver, state: &SharedState, running: &AtomicBool) {
    log::info!("Controller loop started");
    while running.load(Ordering::Relaxed) {
        match rx.recv_timeout(IDLE_POLL) {
            Ok(intent) => apply(driver, state, intent),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    log::info!("Controller loop stopped");
}
