//! Gimbal serial protocol implementation
//!
//! Packet format: [CRC8] [REQUEST_ID] [PAYLOAD...]
//!
//! Checksum: CRC-8/SMBUS over [REQUEST_ID..end]
//! - width=8 poly=0x07 init=0x00 refin=false refout=false xorout=0x00
//! - check value ("123456789") = 0xF4
//!
//! All floats are IEEE-754 little-endian. Angles travel in (tilt, pan) order.
//!
//! | ID   | Request     | Payload          | Response                      |
//! |------|-------------|------------------|-------------------------------|
//! | 0x00 | arm_led     | u8 bool          | 1 byte, 0x00 = ACK            |
//! | 0x01 | status_led  | u8 bool          | 1 byte, 0x00 = ACK            |
//! | 0x02 | move_deg    | f32 tilt, f32 pan| 1 byte, 0x00 = ACK            |
//! | 0x03 | measure_deg | (none)           | f32 tilt, f32 pan, CRC8 [0..8)|
//!
//! Everything in this module is pure: no I/O, no state.

use crate::error::ProtocolError;

/// Acknowledge byte for set-type requests
pub const ACK: u8 = 0x00;

/// Length of the acknowledge response
pub const ACK_RESPONSE_LEN: usize = 1;

/// Length of the measure_deg response (two f32 + CRC)
pub const MEASURE_RESPONSE_LEN: usize = 9;

/// Compute CRC-8/SMBUS over `data`
#[inline]
pub fn crc8_smbus(data: &[u8]) -> u8 {
    let mut crc: u8 = 0x00;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            if crc & 0x80 != 0 {
                crc = (crc << 1) ^ 0x07;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Gimbal request IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestId {
    /// Arm indicator LED
    ArmLed = 0x00,
    /// Status indicator LED
    StatusLed = 0x01,
    /// Move to absolute (tilt, pan) in degrees
    MoveDeg = 0x02,
    /// Read current (tilt, pan) in degrees
    MeasureDeg = 0x03,
}

impl TryFrom<u8> for RequestId {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(RequestId::ArmLed),
            0x01 => Ok(RequestId::StatusLed),
            0x02 => Ok(RequestId::MoveDeg),
            0x03 => Ok(RequestId::MeasureDeg),
            _ => Err(ProtocolError::Malformed("unknown request id")),
        }
    }
}

/// Gimbal requests
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Request {
    /// Set arm LED on/off
    ArmLed(bool),
    /// Set status LED on/off
    StatusLed(bool),
    /// Move to absolute angles (degrees)
    MoveDeg {
        /// Tilt (elevation) in degrees
        tilt: f32,
        /// Pan (azimuth) in degrees
        pan: f32,
    },
    /// Measure current angles
    MeasureDeg,
}

impl Request {
    /// Get request ID
    pub fn request_id(&self) -> RequestId {
        match self {
            Request::ArmLed(_) => RequestId::ArmLed,
            Request::StatusLed(_) => RequestId::StatusLed,
            Request::MoveDeg { .. } => RequestId::MoveDeg,
            Request::MeasureDeg => RequestId::MeasureDeg,
        }
    }

    /// Build payload bytes
    fn build_payload(&self) -> Vec<u8> {
        match self {
            Request::ArmLed(on) | Request::StatusLed(on) => vec![u8::from(*on)],
            Request::MoveDeg { tilt, pan } => {
                let mut payload = Vec::with_capacity(8);
                payload.extend_from_slice(&tilt.to_le_bytes());
                payload.extend_from_slice(&pan.to_le_bytes());
                payload
            }
            Request::MeasureDeg => Vec::new(),
        }
    }

    /// Encode to a complete packet with CRC
    pub fn encode(&self) -> Vec<u8> {
        encode(self.request_id() as u8, &self.build_payload())
    }

    /// Number of bytes the device sends back for this request
    pub fn response_len(&self) -> usize {
        match self {
            Request::MeasureDeg => MEASURE_RESPONSE_LEN,
            _ => ACK_RESPONSE_LEN,
        }
    }

    /// Decode a packet produced by [`Request::encode`]
    ///
    /// Used by the simulated device side and by tests; the host never
    /// receives requests.
    pub fn decode(packet: &[u8]) -> Result<Self, ProtocolError> {
        if packet.len() < 2 {
            return Err(ProtocolError::Malformed("packet too short"));
        }

        let expected = crc8_smbus(&packet[1..]);
        if packet[0] != expected {
            return Err(ProtocolError::CrcMismatch {
                expected,
                actual: packet[0],
            });
        }

        let payload = &packet[2..];
        match RequestId::try_from(packet[1])? {
            RequestId::ArmLed => Ok(Request::ArmLed(decode_bool(payload)?)),
            RequestId::StatusLed => Ok(Request::StatusLed(decode_bool(payload)?)),
            RequestId::MoveDeg => {
                if payload.len() != 8 {
                    return Err(ProtocolError::Malformed("move_deg payload must be 8 bytes"));
                }
                let (tilt, pan) = decode_angle_pair(payload);
                Ok(Request::MoveDeg { tilt, pan })
            }
            RequestId::MeasureDeg => {
                if !payload.is_empty() {
                    return Err(ProtocolError::Malformed("measure_deg takes no payload"));
                }
                Ok(Request::MeasureDeg)
            }
        }
    }
}

/// Build a packet: placeholder CRC, request id, payload, then CRC over [1..]
pub fn encode(request_id: u8, payload: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(2 + payload.len());
    packet.push(0x00); // placeholder until CRC calculated
    packet.push(request_id);
    packet.extend_from_slice(payload);
    packet[0] = crc8_smbus(&packet[1..]);
    packet
}

/// Interpret a 1-byte set-type response
#[inline]
pub fn check_ack(response: u8) -> Result<(), ProtocolError> {
    if response == ACK {
        Ok(())
    } else {
        Err(ProtocolError::Nack(response))
    }
}

/// Decode a measure_deg response into (tilt, pan)
pub fn decode_measure_response(
    response: &[u8; MEASURE_RESPONSE_LEN],
) -> Result<(f32, f32), ProtocolError> {
    let expected = crc8_smbus(&response[..8]);
    let actual = response[8];
    if expected != actual {
        return Err(ProtocolError::CrcMismatch { expected, actual });
    }
    Ok(decode_angle_pair(&response[..8]))
}

/// Build a measure_deg response (device side)
pub fn encode_measure_response(tilt: f32, pan: f32) -> [u8; MEASURE_RESPONSE_LEN] {
    let mut response = [0u8; MEASURE_RESPONSE_LEN];
    response[0..4].copy_from_slice(&tilt.to_le_bytes());
    response[4..8].copy_from_slice(&pan.to_le_bytes());
    response[8] = crc8_smbus(&response[..8]);
    response
}

fn decode_bool(payload: &[u8]) -> Result<bool, ProtocolError> {
    match payload {
        [state] => Ok(*state != 0),
        _ => Err(ProtocolError::Malformed("LED payload must be 1 byte")),
    }
}

fn decode_angle_pair(bytes: &[u8]) -> (f32, f32) {
    let tilt = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let pan = f32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    (tilt, pan)
}
