//! Background angle refresher
//!
//! One dedicated thread performs debounced measurements. Triggers go through
//! a depth-1 channel; a trigger that finds a refresh already queued or running
//! is dropped, so callers never block.

use super::cache::{AngleCache, Angles};
use crate::error::{Error, ProtocolError, Result};
use crossbeam_channel::{Sender, TrySendError, bounded};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Handle to the refresher thread
pub struct Refresher {
    cache: Arc<AngleCache>,
    trigger: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Refresher {
    /// Spawn the refresher thread
    ///
    /// `measure` performs one hardware measurement and stores the result in
    /// the cache itself (under the link lock).
    pub fn spawn<F>(cache: Arc<AngleCache>, mut measure: F) -> Result<Self>
    where
        F: FnMut() -> std::result::Result<Angles, ProtocolError> + Send + 'static,
    {
        let (trigger, rx) = bounded::<()>(1);
        let worker_cache = Arc::clone(&cache);

        let handle = thread::Builder::new()
            .name("angle-refresh".to_string())
            .spawn(move || {
                log::debug!("Angle refresher started");
                for () in rx.iter() {
                    match measure() {
                        Ok(angles) => log::trace!(
                            "Background measure: pan={:.2} tilt={:.2}",
                            angles.pan,
                            angles.tilt
                        ),
                        Err(e) => log::warn!("Background measure failed: {}", e),
                    }
                    worker_cache.finish_refresh();
                }
                log::debug!("Angle refresher stopped");
            })
            .map_err(|e| Error::Other(format!("Failed to spawn angle refresher: {}", e)))?;

        Ok(Self {
            cache,
            trigger: Some(trigger),
            handle: Some(handle),
        })
    }

    /// Request a refresh if the cooldown allows it
    ///
    /// Returns true if a measurement was dispatched.
    pub fn request(&self) -> bool {
        let Some(trigger) = self.trigger.as_ref() else {
            return false;
        };
        if !self.cache.try_begin_refresh() {
            return false;
        }
        match trigger.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) | Err(TrySendError::Disconnected(())) => {
                self.cache.abandon_refresh();
                false
            }
        }
    }
}

impl Drop for Refresher {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop
        self.trigger.take();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log::error!("Angle refresher thread panicked");
        }
    }
}
