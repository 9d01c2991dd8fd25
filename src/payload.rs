//! TPMS manufacturer data decoding.
//!
//! The sensor broadcasts seven bytes:
//!
//! | Offset | Size | Field                                   |
//! |--------|------|-----------------------------------------|
//! | 0      | 1    | alarm bitmask                           |
//! | 1      | 1    | battery, 0.1 V                          |
//! | 2      | 1    | temperature, °C                         |
//! | 3-4    | 2    | absolute pressure, 0.1 psi, big-endian  |
//! | 5-6    | 2    | checksum, big-endian                    |
//!
//! Anything after the seventh byte is ignored.

use crate::reading::SensorReading;
use log::debug;
use thiserror::Error;

/// Number of manufacturer data bytes a payload occupies.
pub const PAYLOAD_LEN: usize = 7;

/// Offset between the absolute pressure on the wire and the reported gauge
/// pressure, in 0.1 psi.
pub const PRESSURE_OFFSET: u16 = 145;

/// Error types for decoding TPMS advertisements.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Manufacturer data shorter than a full payload
    #[error("Payload too short: expected at least {expected} bytes, got {len}", expected = PAYLOAD_LEN)]
    TooShort { len: usize },
    /// Advertisement carried no manufacturer data at all
    #[error("No manufacturer data")]
    MissingManufacturerData,
    /// Invalid data reported by a scanner backend
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// The wire fields of a payload before unit handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPayload {
    pub alarms: u8,
    pub battery: u8,
    pub temperature: u8,
    pub raw_pressure: u16,
    /// Parsed but never verified.
    pub checksum: u16,
}

impl RawPayload {
    /// Split the first [`PAYLOAD_LEN`] bytes of `data` into fields.
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        let Some(bytes) = data.first_chunk::<PAYLOAD_LEN>() else {
            return Err(DecodeError::TooShort { len: data.len() });
        };

        Ok(Self {
            alarms: bytes[0],
            battery: bytes[1],
            temperature: bytes[2],
            raw_pressure: u16::from_be_bytes([bytes[3], bytes[4]]),
            checksum: u16::from_be_bytes([bytes[5], bytes[6]]),
        })
    }

    /// Gauge pressure in 0.1 psi.
    ///
    /// Readings below the offset saturate to zero instead of wrapping around.
    pub fn pressure(&self) -> u16 {
        self.raw_pressure.saturating_sub(PRESSURE_OFFSET)
    }
}

/// Decides whether a parsed payload is trustworthy.
pub trait ValidityPolicy: Send + Sync {
    fn is_valid(&self, payload: &RawPayload) -> bool;
}

/// Accepts every payload. The checksum algorithm is unknown, so nothing is
/// checked yet.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysValid;

impl ValidityPolicy for AlwaysValid {
    fn is_valid(&self, _payload: &RawPayload) -> bool {
        true
    }
}

impl<F> ValidityPolicy for F
where
    F: Fn(&RawPayload) -> bool + Send + Sync,
{
    fn is_valid(&self, payload: &RawPayload) -> bool {
        self(payload)
    }
}

/// Turns manufacturer data into [`SensorReading`]s under a validity policy.
#[derive(Debug, Default, Clone)]
pub struct PayloadDecoder<P = AlwaysValid> {
    policy: P,
}

impl PayloadDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<P: ValidityPolicy> PayloadDecoder<P> {
    pub fn with_policy(policy: P) -> Self {
        Self { policy }
    }

    pub fn decode(&self, data: &[u8]) -> Result<SensorReading, DecodeError> {
        let raw = RawPayload::parse(data)?;

        if raw.raw_pressure < PRESSURE_OFFSET {
            debug!(
                "raw pressure {} below offset {PRESSURE_OFFSET}, clamping to 0",
                raw.raw_pressure
            );
        }

        Ok(SensorReading::new(
            raw.pressure(),
            raw.temperature,
            raw.battery,
            raw.alarms,
            self.policy.is_valid(&raw),
        ))
    }
}

/// Decode manufacturer data with the default policy.
pub fn decode(data: &[u8]) -> Result<SensorReading, DecodeError> {
    PayloadDecoder::new().decode(data)
}
