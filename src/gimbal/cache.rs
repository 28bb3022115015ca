//! Last-known gimbal angles with debounced refresh bookkeeping

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Default minimum spacing between hardware measurements
pub const DEFAULT_MEASURE_COOLDOWN: Duration = Duration::from_millis(80);

/// Pan/tilt pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Angles {
    /// Azimuth
    pub pan: f32,
    /// Elevation
    pub tilt: f32,
}

impl Angles {
    /// Build from wire order (tilt, pan)
    #[inline]
    pub fn from_wire(tilt: f32, pan: f32) -> Self {
        Self { pan, tilt }
    }
}

/// Cached angles and when they were observed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleState {
    /// Last known angles
    pub angles: Angles,
    /// When the angles were measured or commanded
    pub observed_at: Instant,
}

impl AngleState {
    pub fn now(angles: Angles) -> Self {
        Self {
            angles,
            observed_at: Instant::now(),
        }
    }

    /// Time since the angles were observed
    pub fn age(&self) -> Duration {
        self.observed_at.elapsed()
    }
}

/// Angle cache shared between the executor, the refresher and status readers
///
/// Reads never touch the link. Writes happen while the writer holds the link
/// lock, so the cache always reflects the latest completed round-trip.
pub struct AngleCache {
    state: RwLock<AngleState>,
    in_flight: AtomicBool,
    last_measured: Mutex<Option<Instant>>,
    cooldown: Duration,
}

impl AngleCache {
    /// Create a cache seeded with `initial`
    pub fn new(initial: Angles, cooldown: Duration) -> Self {
        Self {
            state: RwLock::new(AngleState::now(initial)),
            in_flight: AtomicBool::new(false),
            last_measured: Mutex::new(None),
            cooldown,
        }
    }

    /// Cached angles
    #[inline]
    pub fn angles(&self) -> Angles {
        self.state.read().angles
    }

    /// Cached angles with observation time
    pub fn state(&self) -> AngleState {
        *self.state.read()
    }

    /// Store a commanded (not measured) position
    pub fn store(&self, angles: Angles) {
        *self.state.write() = AngleState::now(angles);
    }

    /// Store a position read back from the hardware
    pub fn store_measured(&self, angles: Angles) {
        let state = AngleState::now(angles);
        *self.state.write() = state;
        *self.last_measured.lock() = Some(state.observed_at);
    }

    /// Claim the single in-flight refresh slot
    ///
    /// Returns false if a refresh is already running or the last measurement
    /// finished less than `cooldown` ago.
    pub fn try_begin_refresh(&self) -> bool {
        if let Some(last) = *self.last_measured.lock()
            && last.elapsed() < self.cooldown
        {
            return false;
        }
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Release the refresh slot after an attempt, successful or not
    pub fn finish_refresh(&self) {
        *self.last_measured.lock() = Some(Instant::now());
        self.in_flight.store(false, Ordering::Release);
    }

    /// Release the refresh slot without counting an attempt
    pub fn abandon_refresh(&self) {
        self.in_flight.store(false, Ordering::Release);
    }

    /// True while a background refresh is running
    pub fn refresh_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}
