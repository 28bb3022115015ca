//! Detection producer process supervisor
//!
//! Launches the external producer, polls it for exit and relaunches it after
//! `respawn_delay_ms`, whether it exited cleanly or crashed. A producer exit
//! is never fatal to the daemon. On shutdown the child is killed and reaped.

use crate::config::ProducerConfig;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Exit poll interval
const WAIT_POLL: Duration = Duration::from_millis(100);

/// Producer supervisor thread
pub struct Supervisor {
    launches: Arc<AtomicU64>,
    child_pid: Arc<Mutex<Option<u32>>>,
    stopping: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Supervisor {
    /// Start supervising `config.program`
    pub fn spawn(config: ProducerConfig, running: Arc<AtomicBool>) -> Result<Self> {
        let launches = Arc::new(AtomicU64::new(0));
        let child_pid = Arc::new(Mutex::new(None));
        let stopping = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            config,
            running,
            stopping: Arc::clone(&stopping),
            launches: Arc::clone(&launches),
            child_pid: Arc::clone(&child_pid),
        };
        let handle = thread::Builder::new()
            .name("supervisor".to_string())
            .spawn(move || worker.run())
            .map_err(|e| Error::Other(format!("Failed to spawn supervisor: {}", e)))?;

        Ok(Self {
            launches,
            child_pid,
            stopping,
            handle: Some(handle),
        })
    }

    /// Successful launches so far (first start included)
    pub fn launches(&self) -> u64 {
        self.launches.load(Ordering::Relaxed)
    }

    /// Relaunches after an exit
    pub fn restarts(&self) -> u64 {
        self.launches().saturating_sub(1)
    }

    /// PID of the running producer, if any
    pub fn child_id(&self) -> Option<u32> {
        *self.child_pid.lock()
    }

    /// Kill the producer and wait for the supervisor thread to exit
    pub fn stop(&mut self) {
        self.stopping.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log::error!("Supervisor thread panicked");
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    config: ProducerConfig,
    running: Arc<AtomicBool>,
    stopping: Arc<AtomicBool>,
    launches: Arc<AtomicU64>,
    child_pid: Arc<Mutex<Option<u32>>>,
}

impl Worker {
    fn active(&self) -> bool {
        self.running.load(Ordering::Relaxed) && !self.stopping.load(Ordering::Relaxed)
    }

    fn run(self) {
        log::info!("Supervising producer: {} {:?}", self.config.program, self.config.args);
        let delay = Duration::from_millis(self.config.respawn_delay_ms);

        while self.active() {
            match self.launch() {
                Ok(mut child) => {
                    let launch = self.launches.fetch_add(1, Ordering::Relaxed) + 1;
                    *self.child_pid.lock() = Some(child.id());
                    log::info!("Producer started (pid {}, launch #{})", child.id(), launch);

                    let exited = self.wait(&mut child);
                    *self.child_pid.lock() = None;
                    if !exited {
                        break;
                    }
                }
                Err(e) => log::error!("Failed to launch producer {}: {}", self.config.program, e),
            }
            self.sleep_while_running(delay);
        }
        log::info!("Supervisor stopped");
    }

    fn launch(&self) -> std::io::Result<Child> {
        Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::null())
            .spawn()
    }

    /// Poll until the child exits (true) or shutdown kills it (false)
    fn wait(&self, child: &mut Child) -> bool {
        while self.active() {
            match child.try_wait() {
                Ok(Some(status)) => {
                    if status.success() {
                        log::warn!("Producer exited cleanly, respawning");
                    } else {
                        log::error!("Producer crashed ({}), respawning", status);
                    }
                    return true;
                }
                Ok(None) => thread::sleep(WAIT_POLL),
                Err(e) => {
                    log::error!("Failed to poll producer: {}", e);
                    thread::sleep(WAIT_POLL);
                }
            }
        }

        log::info!("Stopping producer (pid {})", child.id());
        if let Err(e) = child.kill() {
            log::debug!("Producer kill: {}", e);
        }
        if let Err(e) = child.wait() {
            log::warn!("Failed to reap producer: {}", e);
        }
        false
    }

    fn sleep_while_running(&self, total: Duration) {
        let deadline = Instant::now() + total;
        while self.active() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(WAIT_POLL));
        }
    }
}
