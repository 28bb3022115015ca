//! Bounded detection history
//!
//! Holds the last [`HISTORY_CAPACITY`] detections in arrival order so a
//! delayed video preview can ask which detection was live when its frame was
//! captured. Record and lookup share one lock.

use super::BoundingBox;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Entries kept before the oldest is evicted
pub const HISTORY_CAPACITY: usize = 10;

/// A detection is considered live for one frame at 30 fps
pub const FRESHNESS_WINDOW: Duration = Duration::from_nanos(1_000_000_000 / 30);

/// Default preview lag: three frames at 60 fps
pub const DEFAULT_PREVIEW_DELAY: Duration = Duration::from_nanos(3 * 1_000_000_000 / 60);

/// Detection with its arrival time
#[derive(Debug, Clone, Copy)]
pub struct DetectionEntry {
    pub bbox: BoundingBox,
    pub received_at: Instant,
}

/// Timestamp-indexed detection ring
pub struct DetectionHistory {
    entries: Mutex<VecDeque<DetectionEntry>>,
    preview_delay: Duration,
}

impl DetectionHistory {
    pub fn new(preview_delay: Duration) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(HISTORY_CAPACITY + 1)),
            preview_delay,
        }
    }

    /// Record a detection received now
    pub fn record(&self, bbox: BoundingBox) {
        self.record_at(bbox, Instant::now());
    }

    /// Record a detection received at `received_at`
    ///
    /// A box with the same `pts_s` as the newest entry replaces it only if
    /// it is more confident.
    pub fn record_at(&self, bbox: BoundingBox, received_at: Instant) {
        let mut entries = self.entries.lock();

        if let Some(newest) = entries.back_mut()
            && newest.bbox.pts_s == bbox.pts_s
        {
            if bbox.conf > newest.bbox.conf {
                newest.bbox = bbox;
            }
            return;
        }

        entries.push_back(DetectionEntry { bbox, received_at });
        while entries.len() > HISTORY_CAPACITY {
            entries.pop_front();
        }
    }

    /// Detection live at `query_time`, or the newest one when `None`
    pub fn lookup(&self, query_time: Option<Instant>) -> Option<BoundingBox> {
        let entries = self.entries.lock();
        let Some(query_time) = query_time else {
            return entries.back().map(|e| e.bbox);
        };

        entries
            .iter()
            .rev()
            .find(|e| e.received_at <= query_time)
            .filter(|e| query_time.duration_since(e.received_at) < FRESHNESS_WINDOW)
            .map(|e| e.bbox)
    }

    /// Detection to overlay on a preview frame shown at `frame_time`
    pub fn detection_for_preview(&self, frame_time: Instant) -> Option<BoundingBox> {
        let query_time = frame_time.checked_sub(self.preview_delay)?;
        self.lookup(Some(query_time))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for DetectionHistory {
    fn default() -> Self {
        Self::new(DEFAULT_PREVIEW_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(pts_s: f64, conf: f32) -> BoundingBox {
        BoundingBox {
            pts_s,
            conf,
            left: 0.4,
            top: 0.4,
            width: 0.2,
            height: 0.2,
        }
    }

    #[test]
    fn test_same_pts_keeps_higher_confidence() {
        let history = DetectionHistory::default();
        history.record(bbox(1.0, 0.3));
        history.record(bbox(1.0, 0.7));
        assert_eq!(history.len(), 1);
        assert_eq!(history.lookup(None).unwrap().conf, 0.7);

        history.record(bbox(1.0, 0.5));
        assert_eq!(history.len(), 1);
        assert_eq!(history.lookup(None).unwrap().conf, 0.7);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let history = DetectionHistory::default();
        for i in 0..15 {
            history.record(bbox(i as f64, 0.5));
        }
        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert_eq!(history.lookup(None).unwrap().pts_s, 14.0);
    }

    #[test]
    fn test_freshness_window() {
        let history = DetectionHistory::default();
        let t0 = Instant::now();
        history.record_at(bbox(1.0, 0.5), t0);

        let inside = t0 + FRESHNESS_WINDOW - Duration::from_micros(1);
        assert_eq!(history.lookup(Some(inside)).unwrap().pts_s, 1.0);

        assert_eq!(history.lookup(Some(t0 + FRESHNESS_WINDOW)), None);
        assert_eq!(history.lookup(Some(t0 + Duration::from_millis(50))), None);
    }

    #[test]
    fn test_lookup_never_returns_future_detection() {
        let history = DetectionHistory::default();
        let t0 = Instant::now();
        history.record_at(bbox(1.0, 0.5), t0 + Duration::from_millis(10));
        assert_eq!(history.lookup(Some(t0)), None);
    }

    #[test]
    fn test_lookup_picks_latest_at_or_before_query() {
        let history = DetectionHistory::default();
        let t0 = Instant::now();
        history.record_at(bbox(1.0, 0.5), t0);
        history.record_at(bbox(2.0, 0.5), t0 + Duration::from_millis(20));
        history.record_at(bbox(3.0, 0.5), t0 + Duration::from_millis(40));

        let found = history.lookup(Some(t0 + Duration::from_millis(25))).unwrap();
        assert_eq!(found.pts_s, 2.0);
    }

    #[test]
    fn test_preview_applies_delay() {
        let history = DetectionHistory::new(Duration::from_millis(50));
        let t0 = Instant::now();
        history.record_at(bbox(1.0, 0.5), t0);

        let frame_time = t0 + Duration::from_millis(60);
        assert_eq!(history.detection_for_preview(frame_time).unwrap().pts_s, 1.0);
        assert_eq!(history.lookup(Some(frame_time)), None);
    }

    #[test]
    fn test_empty_history() {
        let history = DetectionHistory::default();
        assert!(history.is_empty());
        assert_eq!(history.lookup(None), None);
        assert_eq!(history.lookup(Some(Instant::now())), None);
    }
}
