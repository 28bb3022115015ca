//! Shared system state and status snapshots

use crate::error::CommandError;
use crate::gimbal::{AngleState, Angles};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Control mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Operator drives the gimbal
    #[default]
    Manual,
    /// Tracker drives the gimbal (when armed)
    Auto,
}

impl FromStr for Mode {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(Mode::Manual),
            "auto" => Ok(Mode::Auto),
            _ => Err(CommandError::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Manual => f.write_str("MANUAL"),
            Mode::Auto => f.write_str("AUTO"),
        }
    }
}

/// Status snapshot returned to API callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub mode: Mode,
    pub armed: bool,
    pub angle: Angles,
    /// Milliseconds since `angle` was measured or commanded
    #[serde(default)]
    pub angle_age_ms: u64,
    #[serde(default)]
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct StateInner {
    mode: Mode,
    armed: bool,
    last_error: Option<String>,
}

/// Mode, arm flag and last error, shared by the controller, tracker and API
#[derive(Debug, Default)]
pub struct SharedState {
    inner: RwLock<StateInner>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> Mode {
        self.inner.read().mode
    }

    pub fn set_mode(&self, mode: Mode) {
        let mut inner = self.inner.write();
        if inner.mode != mode {
            log::info!("Mode: {} -> {}", inner.mode, mode);
        }
        inner.mode = mode;
    }

    pub fn armed(&self) -> bool {
        self.inner.read().armed
    }

    pub fn set_armed(&self, armed: bool) {
        let mut inner = self.inner.write();
        if inner.armed != armed {
            log::info!("{}", if armed { "Armed" } else { "Disarmed" });
        }
        inner.armed = armed;
    }

    /// Tracker may move the gimbal
    pub fn is_tracking(&self) -> bool {
        let inner = self.inner.read();
        inner.armed && inner.mode == Mode::Auto
    }

    pub fn record_error(&self, error: impl fmt::Display) {
        self.inner.write().last_error = Some(error.to_string());
    }

    pub fn clear_error(&self) {
        self.inner.write().last_error = None;
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.read().last_error.clone()
    }

    /// Snapshot with the given cached angles
    pub fn status(&self, position: AngleState) -> Status {
        let inner = self.inner.read();
        Status {
            mode: inner.mode,
            armed: inner.armed,
            angle: position.angles,
            angle_age_ms: u64::try_from(position.age().as_millis()).unwrap_or(u64::MAX),
            last_error: inner.last_error.clone(),
        }
    }
}
