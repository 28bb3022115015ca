//! Gimbal executor over the serial link

use super::cache::{AngleCache, AngleState, Angles};
use super::limits::AxisLimits;
use super::link::GimbalLink;
use super::refresher::Refresher;
use super::{GimbalDriver, Led, validate_target};
use crate::config::GimbalConfig;
use crate::error::{Error, ProtocolError, Result};
use crate::protocol::Request;
use crate::transport::{SerialTransport, Transport};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Serial gimbal executor
pub struct SerialGimbal {
    link: Arc<Mutex<GimbalLink>>,
    cache: Arc<AngleCache>,
    refresher: Refresher,
    limits: AxisLimits,
    strict_ack: bool,
}

impl SerialGimbal {
    /// Open the configured serial port
    ///
    /// Fails with [`Error::HardwareUnavailable`] if the port cannot be opened.
    pub fn open(config: &GimbalConfig) -> Result<Self> {
        let transport = SerialTransport::open(&config.port, config.baud_rate)
            .map_err(|e| Error::HardwareUnavailable(format!("{}: {}", config.port, e)))?;
        Self::new(Box::new(transport), config)
    }

    /// Build an executor over any transport
    pub fn new(transport: Box<dyn Transport>, config: &GimbalConfig) -> Result<Self> {
        if !config.limits.is_valid() {
            return Err(Error::Other(format!(
                "invalid axis limits: {:?}",
                config.limits
            )));
        }

        let link = Arc::new(Mutex::new(GimbalLink::new(
            transport,
            Duration::from_millis(config.timeout_ms),
        )));
        let cache = Arc::new(AngleCache::new(
            Angles::default(),
            Duration::from_millis(config.measure_cooldown_ms),
        ));

        let refresh_link = Arc::clone(&link);
        let refresh_cache = Arc::clone(&cache);
        let refresher = Refresher::spawn(Arc::clone(&cache), move || {
            measure_locked(&refresh_link, &refresh_cache)
        })?;

        log::info!(
            "Gimbal: serial executor ready (timeout {}ms, strict_ack={}, cooldown {}ms)",
            config.timeout_ms,
            config.strict_ack,
            config.measure_cooldown_ms
        );

        Ok(Self {
            link,
            cache,
            refresher,
            limits: config.limits,
            strict_ack: config.strict_ack,
        })
    }
}

/// Measure while holding the link, storing the result before releasing it
fn measure_locked(
    link: &Mutex<GimbalLink>,
    cache: &AngleCache,
) -> std::result::Result<Angles, ProtocolError> {
    let mut link = link.lock();
    let (tilt, pan) = link.measure()?;
    let angles = Angles::from_wire(tilt, pan);
    cache.store_measured(angles);
    Ok(angles)
}

impl GimbalDriver for SerialGimbal {
    fn move_to(&self, tilt: f32, pan: f32) -> Result<Angles> {
        validate_target(tilt, pan)?;
        let (tilt, pan) = self.limits.clamp(tilt, pan);
        let commanded = Angles::from_wire(tilt, pan);

        {
            let mut link = self.link.lock();
            match link.command(&Request::MoveDeg { tilt, pan }) {
                Ok(()) => self.cache.store(commanded),
                Err(e @ (ProtocolError::Nack(_) | ProtocolError::Timeout { .. }))
                    if !self.strict_ack =>
                {
                    log::warn!(
                        "Gimbal: move to tilt={:.2} pan={:.2} not acknowledged ({}), assuming reached",
                        tilt,
                        pan,
                        e
                    );
                    self.cache.store(commanded);
                }
                Err(e) => return Err(e.into()),
            }
        }

        log::debug!("Gimbal: moved to tilt={:.2} pan={:.2}", tilt, pan);
        self.refresh();
        Ok(commanded)
    }

    fn measure(&self) -> Result<Angles> {
        Ok(measure_locked(&self.link, &self.cache)?)
    }

    fn set_led(&self, led: Led, on: bool) -> Result<()> {
        let request = match led {
            Led::Arm => Request::ArmLed(on),
            Led::Status => Request::StatusLed(on),
        };
        self.link.lock().command(&request)?;
        log::debug!("Gimbal: {:?} LED {}", led, if on { "on" } else { "off" });
        Ok(())
    }

    fn angle_state(&self) -> AngleState {
        self.cache.state()
    }

    fn refresh(&self) {
        self.refresher.request();
    }

    fn limits(&self) -> AxisLimits {
        self.limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gimbal::Direction;
    use crate::protocol::{self, encode_measure_response};
    use crate::transport::MockTransport;
    use approx::assert_relative_eq;
    use std::thread;
    use std::time::Instant;

    /// Firmware emulation: ACKs everything and reports the last commanded angles.
    /// With `nack_moves` it rejects moves and never answers measurements.
    fn firmware(nack_moves: bool) -> MockTransport {
        let mut position = (0.0f32, 0.0f32);
        MockTransport::with_responder(move |packet| match Request::decode(packet) {
            Ok(Request::MoveDeg { tilt, pan }) => {
                if nack_moves {
                    vec![0x01]
                } else {
                    position = (tilt, pan);
                    vec![protocol::ACK]
                }
            }
            Ok(Request::MeasureDeg) if nack_moves => Vec::new(),
            Ok(Request::MeasureDeg) => encode_measure_response(position.0, position.1).to_vec(),
            Ok(_) => vec![protocol::ACK],
            Err(_) => Vec::new(),
        })
    }

    fn config(strict_ack: bool) -> GimbalConfig {
        GimbalConfig {
            timeout_ms: 20,
            strict_ack,
            measure_cooldown_ms: 10_000,
            ..GimbalConfig::default()
        }
    }

    fn move_packets(mock: &MockTransport) -> Vec<Vec<u8>> {
        mock.written_packets()
            .into_iter()
            .filter(|p| p.get(1) == Some(&0x02))
            .collect()
    }

    #[test]
    fn test_move_is_clamped() {
        let mock = firmware(false);
        let gimbal = SerialGimbal::new(Box::new(mock.clone()), &config(true)).unwrap();

        let commanded = gimbal.move_to(200.0, -80.0).unwrap();
        assert_eq!(commanded, Angles::from_wire(90.0, -45.0));
        assert_eq!(gimbal.angles(), commanded);

        let packets = move_packets(&mock);
        assert_eq!(packets.len(), 1);
        assert_eq!(
            Request::decode(&packets[0]).unwrap(),
            Request::MoveDeg {
                tilt: 90.0,
                pan: -45.0
            }
        );
    }

    #[test]
    fn test_strict_ack_raises_nack() {
        let mock = firmware(true);
        let gimbal = SerialGimbal::new(Box::new(mock), &config(true)).unwrap();

        let err = gimbal.move_to(10.0, 10.0).unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::Nack(0x01))));
        assert_eq!(gimbal.angles(), Angles::default());
    }

    #[test]
    fn test_lenient_ack_sets_cache_optimistically() {
        let mock = firmware(true);
        let gimbal = SerialGimbal::new(Box::new(mock), &config(false)).unwrap();

        let commanded = gimbal.move_to(10.0, 10.0).unwrap();
        assert_eq!(gimbal.angles(), commanded);
    }

    #[test]
    fn test_lenient_ack_still_fails_on_closed_port() {
        let mock = firmware(false);
        let gimbal = SerialGimbal::new(Box::new(mock.clone()), &config(false)).unwrap();
        mock.close();

        let err = gimbal.move_to(10.0, 10.0).unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::PortClosed)));
    }

    #[test]
    fn test_nudge_uses_cache_and_one_move() {
        let mock = firmware(false);
        let gimbal = SerialGimbal::new(Box::new(mock.clone()), &config(true)).unwrap();
        gimbal.move_to(20.0, 5.0).unwrap();
        mock.clear_written();

        let target = gimbal.nudge(Direction::Up, 2.5).unwrap();
        assert_relative_eq!(target.tilt, 22.5);
        assert_relative_eq!(target.pan, 5.0);
        assert_eq!(move_packets(&mock).len(), 1);
    }

    #[test]
    fn test_measure_updates_cache() {
        let mock = MockTransport::new();
        mock.inject_read(&encode_measure_response(33.0, -7.0));
        let gimbal = SerialGimbal::new(Box::new(mock), &config(true)).unwrap();

        let angles = gimbal.measure().unwrap();
        assert_eq!(angles, Angles::from_wire(33.0, -7.0));
        assert_eq!(gimbal.angles(), angles);
    }

    #[test]
    fn test_failed_measure_keeps_cache() {
        let mock = MockTransport::new();
        let mut response = encode_measure_response(33.0, -7.0);
        response[8] ^= 0xFF;
        mock.inject_read(&response);
        let gimbal = SerialGimbal::new(Box::new(mock), &config(true)).unwrap();

        assert!(gimbal.measure().is_err());
        assert_eq!(gimbal.angles(), Angles::default());
    }

    #[test]
    fn test_set_led() {
        let mock = firmware(false);
        let gimbal = SerialGimbal::new(Box::new(mock.clone()), &config(true)).unwrap();

        gimbal.set_led(Led::Arm, true).unwrap();
        assert_eq!(mock.written_packets(), vec![Request::ArmLed(true).encode()]);
    }

    #[test]
    fn test_move_triggers_background_refresh() {
        let mock = firmware(false);
        let cfg = GimbalConfig {
            measure_cooldown_ms: 0,
            ..config(true)
        };
        let gimbal = SerialGimbal::new(Box::new(mock.clone()), &cfg).unwrap();
        gimbal.move_to(15.0, 3.0).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        let measured = loop {
            let measures = mock
                .written_packets()
                .iter()
                .filter(|p| p.as_slice() == [0x09, 0x03])
                .count();
            if measures > 0 || Instant::now() > deadline {
                break measures;
            }
            thread::sleep(Duration::from_millis(2));
        };
        assert_eq!(measured, 1);
        assert_eq!(gimbal.angles(), Angles::from_wire(15.0, 3.0));
    }
}
