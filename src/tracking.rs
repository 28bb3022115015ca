//! Closed-loop visual tracking
//!
//! Detections arrive through a depth-1, latest-wins slot: a detection that is
//! not consumed before the next one lands is dropped. The worker measures the
//! gimbal, applies a proportional correction toward the frame centre and
//! issues one absolute move.

use crate::config::TrackingConfig;
use crate::detection::BoundingBox;
use crate::error::{Error, Result};
use crate::gimbal::{Angles, AxisLimits, GimbalDriver};
use crate::state::SharedState;
use crossbeam_queue::ArrayQueue;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle, Thread};
use std::time::Duration;

/// Park timeout so the worker notices shutdown while idle
const IDLE_PARK: Duration = Duration::from_millis(100);

/// Single-slot mailbox that keeps only the newest value
pub struct LatestSlot<T> {
    slot: ArrayQueue<T>,
}

impl<T> LatestSlot<T> {
    pub fn new() -> Self {
        Self {
            slot: ArrayQueue::new(1),
        }
    }

    /// Store `value`, returning the unconsumed value it replaced
    pub fn put(&self, value: T) -> Option<T> {
        self.slot.force_push(value)
    }

    /// Take the pending value, if any
    pub fn take(&self) -> Option<T> {
        self.slot.pop()
    }
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Proportional correction for a target at pixel `center`
///
/// Returns the clamped absolute target as (tilt, pan). Image y grows downward,
/// so a target above centre raises tilt.
pub fn correction(
    center: (f32, f32),
    current: Angles,
    config: &TrackingConfig,
    limits: &AxisLimits,
) -> (f32, f32) {
    let error_x = center.0 - config.frame_width / 2.0;
    let error_y = center.1 - config.frame_height / 2.0;

    let delta_pan = error_x * config.kp;
    let delta_tilt = -error_y * config.kp;

    limits.clamp(current.tilt + delta_tilt, current.pan + delta_pan)
}

/// Executes tracking corrections
pub struct TrackingWorker {
    driver: Arc<dyn GimbalDriver>,
    state: Arc<SharedState>,
    config: TrackingConfig,
}

impl TrackingWorker {
    pub fn new(driver: Arc<dyn GimbalDriver>, state: Arc<SharedState>, config: TrackingConfig) -> Self {
        Self {
            driver,
            state,
            config,
        }
    }

    /// Handle one consumed detection; failures are logged and recorded
    pub fn handle(&self, detection: Option<BoundingBox>) {
        let Some(bbox) = detection else {
            return;
        };
        if !self.state.is_tracking() {
            log::trace!("Tracking: not armed/auto, ignoring detection at {}", bbox.pts_s);
            return;
        }

        let (cx, cy) = bbox.center();
        let center = (cx * self.config.frame_width, cy * self.config.frame_height);
        if let Err(e) = self.step(center) {
            log::error!("Tracking step failed: {}", e);
            self.state.record_error(&e);
        }
    }

    /// Measure, correct toward `center` (pixels) and move
    pub fn step(&self, center: (f32, f32)) -> Result<Angles> {
        let current = self.driver.measure()?;
        let (tilt, pan) = correction(center, current, &self.config, &self.driver.limits());
        log::debug!(
            "Tracking: center=({:.0}, {:.0}) tilt {:.2}->{:.2} pan {:.2}->{:.2}",
            center.0,
            center.1,
            current.tilt,
            tilt,
            current.pan,
            pan
        );
        self.driver.move_to(tilt, pan)
    }
}

/// Producer side of the tracker inbox
#[derive(Clone)]
pub struct TrackerHandle {
    inbox: Arc<LatestSlot<Option<BoundingBox>>>,
    dropped: Arc<AtomicU64>,
    thread: Thread,
}

impl TrackerHandle {
    /// Offer the newest detection, replacing any unconsumed one
    pub fn submit(&self, detection: Option<BoundingBox>) {
        if self.inbox.put(detection).is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.thread.unpark();
    }

    /// Detections replaced before the worker got to them
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Tracking worker thread
pub struct Tracker {
    handle: TrackerHandle,
    join_handle: Option<JoinHandle<()>>,
}

impl Tracker {
    /// Spawn the tracking loop
    pub fn spawn(worker: TrackingWorker, running: Arc<AtomicBool>) -> Result<Self> {
        let inbox = Arc::new(LatestSlot::new());
        let worker_inbox = Arc::clone(&inbox);

        let join_handle = thread::Builder::new()
            .name("tracker".to_string())
            .spawn(move || {
                log::info!("Tracking loop started (kp={})", worker.config.kp);
                while running.load(Ordering::Relaxed) {
                    match worker_inbox.take() {
                        Some(detection) => worker.handle(detection),
                        None => thread::park_timeout(IDLE_PARK),
                    }
                }
                log::info!("Tracking loop stopped");
            })
            .map_err(|e| Error::Other(format!("Failed to spawn tracker: {}", e)))?;

        Ok(Self {
            handle: TrackerHandle {
                inbox,
                dropped: Arc::new(AtomicU64::new(0)),
                thread: join_handle.thread().clone(),
            },
            join_handle: Some(join_handle),
        })
    }

    /// Clonable submit handle
    pub fn handle(&self) -> TrackerHandle {
        self.handle.clone()
    }

    /// Wait for the loop to exit (after the running flag is cleared)
    pub fn join(&mut self) {
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.thread().unpark();
            if join_handle.join().is_err() {
                log::error!("Tracker thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gimbal::SimulatedGimbal;
    use crate::state::Mode;
    use approx::assert_relative_eq;

    fn bbox(pts_s: f64, cx: f32, cy: f32) -> BoundingBox {
        BoundingBox {
            pts_s,
            conf: 0.9,
            left: cx - 0.05,
            top: cy - 0.05,
            width: 0.1,
            height: 0.1,
        }
    }

    #[test]
    fn test_latest_wins() {
        let slot = LatestSlot::new();
        assert_eq!(slot.put("d1"), None);
        assert_eq!(slot.put("d2"), Some("d1"));
        assert_eq!(slot.take(), Some("d2"));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn test_correction_law() {
        let config = TrackingConfig {
            kp: 0.003,
            frame_width: 1280.0,
            frame_height: 720.0,
        };
        let current = Angles { pan: 0.0, tilt: 10.0 };
        let (tilt, pan) = correction((700.0, 300.0), current, &config, &AxisLimits::default());
        assert_relative_eq!(tilt, 10.18, epsilon = 1e-4);
        assert_relative_eq!(pan, 0.18, epsilon = 1e-4);
    }

    #[test]
    fn test_correction_is_clamped() {
        let config = TrackingConfig {
            kp: 1.0,
            frame_width: 1280.0,
            frame_height: 720.0,
        };
        let (tilt, pan) = correction(
            (1280.0, 0.0),
            Angles::default(),
            &config,
            &AxisLimits::default(),
        );
        assert_eq!((tilt, pan), (90.0, 45.0));
    }

    #[test]
    fn test_step_measures_then_moves() {
        let sim = Arc::new(SimulatedGimbal::new(AxisLimits::default()));
        sim.set_position(Angles { pan: 0.0, tilt: 10.0 });
        let worker = TrackingWorker::new(
            sim.clone(),
            Arc::new(SharedState::new()),
            TrackingConfig {
                kp: 0.003,
                frame_width: 1280.0,
                frame_height: 720.0,
            },
        );

        let target = worker.step((700.0, 300.0)).unwrap();
        assert_eq!(sim.measure_count(), 1);
        assert_eq!(sim.move_count(), 1);
        assert_relative_eq!(target.tilt, 10.18, epsilon = 1e-4);
        assert_relative_eq!(target.pan, 0.18, epsilon = 1e-4);
    }

    #[test]
    fn test_handle_requires_tracking() {
        let sim = Arc::new(SimulatedGimbal::new(AxisLimits::default()));
        let state = Arc::new(SharedState::new());
        let worker = TrackingWorker::new(sim.clone(), Arc::clone(&state), TrackingConfig::default());

        worker.handle(Some(bbox(0.0, 0.9, 0.5)));
        assert_eq!(sim.move_count(), 0);

        state.set_armed(true);
        state.set_mode(Mode::Auto);
        worker.handle(None);
        assert_eq!(sim.move_count(), 0);

        worker.handle(Some(bbox(0.1, 0.9, 0.5)));
        assert_eq!(sim.move_count(), 1);
    }

    #[test]
    fn test_measure_failure_is_recorded() {
        let sim = Arc::new(SimulatedGimbal::new(AxisLimits::default()));
        sim.fail_measurements(true);
        let state = Arc::new(SharedState::new());
        state.set_armed(true);
        state.set_mode(Mode::Auto);
        let worker = TrackingWorker::new(sim.clone(), Arc::clone(&state), TrackingConfig::default());

        worker.handle(Some(bbox(0.0, 0.9, 0.5)));
        assert_eq!(sim.move_count(), 0);
        assert!(state.last_error().is_some());
    }

    #[test]
    fn test_tracker_thread_consumes_detection() {
        let sim = Arc::new(SimulatedGimbal::new(AxisLimits::default()));
        let state = Arc::new(SharedState::new());
        state.set_armed(true);
        state.set_mode(Mode::Auto);
        let running = Arc::new(AtomicBool::new(true));
        let worker = TrackingWorker::new(sim.clone(), state, TrackingConfig::default());
        let mut tracker = Tracker::spawn(worker, Arc::clone(&running)).unwrap();

        tracker.handle().submit(Some(bbox(0.0, 0.75, 0.25)));

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while sim.move_count() == 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(sim.move_count(), 1);

        running.store(false, Ordering::Relaxed);
        tracker.join();
    }
}
