//! Configuration for RoCam IO
//!
//! Loaded once at startup from TOML. Every section has defaults, so a partial
//! file (or none at all) is valid.

use crate::detection::WireFormat;
use crate::error::Result;
use crate::gimbal::AxisLimits;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub gimbal: GimbalConfig,
    pub tracking: TrackingConfig,
    pub controller: ControllerConfig,
    pub detection: DetectionConfig,
    pub control: ControlConfig,
    pub logging: LoggingConfig,
}

/// Gimbal serial link and executor policy
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GimbalConfig {
    /// Serial port path
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Response timeout per request (ms)
    pub timeout_ms: u64,
    /// Raise move NACKs/timeouts as errors instead of assuming the move landed
    pub strict_ack: bool,
    /// Minimum spacing between background measurements (ms)
    pub measure_cooldown_ms: u64,
    /// Periodic refresh interval (ms); disabled when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_interval_ms: Option<u64>,
    /// Use the simulated gimbal if the port cannot be opened
    pub fallback_to_simulated: bool,
    /// Clamp bounds
    pub limits: AxisLimits,
}

impl Default for GimbalConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            timeout_ms: 100,
            strict_ack: false,
            measure_cooldown_ms: 80,
            sample_interval_ms: None,
            fallback_to_simulated: true,
            limits: AxisLimits::default(),
        }
    }
}

/// Closed-loop tracking parameters
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Proportional gain (degrees per pixel)
    pub kp: f32,
    /// Detector frame width (pixels)
    pub frame_width: f32,
    /// Detector frame height (pixels)
    pub frame_height: f32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            kp: 0.005,
            frame_width: 1280.0,
            frame_height: 720.0,
        }
    }
}

/// Intent queue
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Mailbox capacity
    pub queue_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
        }
    }
}

/// Detection channel and producer process
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Local listen address for the producer connection
    pub bind_address: String,
    /// Frame payload encoding
    pub wire_format: WireFormat,
    /// How far a preview frame lags behind detection (ms)
    pub preview_delay_ms: f64,
    /// Producer process; none means it is started externally
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producer: Option<ProducerConfig>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:5561".to_string(),
            wire_format: WireFormat::Json,
            preview_delay_ms: 1000.0 * 3.0 / 60.0,
            producer: None,
        }
    }
}

/// External detection producer
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProducerConfig {
    /// Executable
    pub program: String,
    /// Arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Wait before relaunching after an exit (ms)
    #[serde(default = "default_respawn_delay_ms")]
    pub respawn_delay_ms: u64,
}

fn default_respawn_delay_ms() -> u64 {
    1000
}

/// Control socket
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlConfig {
    /// TCP bind address
    pub bind_address: String,
    /// Frame payload encoding
    pub wire_format: WireFormat,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:5560".to_string(),
            wire_format: WireFormat::Json,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use rocam_io::config::AppConfig;
    ///
    /// let config = AppConfig::from_file("rocam.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults if the file does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            log::warn!("Config {} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}
