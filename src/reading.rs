//! Decoded tire sensor reading.

use crate::alarm::AlarmFlags;
use std::fmt;

/// One decoded TPMS payload.
///
/// Fields are stored in the sensor's own units and cannot be changed after
/// construction:
/// - Pressure in 0.1 psi, already offset by the sensor's 14.5 psi bias
/// - Temperature in whole degrees Celsius
/// - Battery voltage in 0.1 V
/// - Alarms as the raw bitmask (see [`AlarmFlags`])
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SensorReading {
    pressure: u16,
    temperature: u8,
    battery: u8,
    alarms: u8,
    valid: bool,
}

impl SensorReading {
    pub fn new(pressure: u16, temperature: u8, battery: u8, alarms: u8, valid: bool) -> Self {
        Self {
            pressure,
            temperature,
            battery,
            alarms,
            valid,
        }
    }

    /// Pressure in tenths of a psi.
    pub fn pressure(&self) -> u16 {
        self.pressure
    }

    /// Temperature in degrees Celsius.
    pub fn temperature(&self) -> u8 {
        self.temperature
    }

    /// Battery voltage in tenths of a volt.
    pub fn battery(&self) -> u8 {
        self.battery
    }

    pub fn alarms(&self) -> u8 {
        self.alarms
    }

    pub fn alarm_flags(&self) -> AlarmFlags {
        AlarmFlags::from_bits(self.alarms)
    }

    /// Outcome of the validity policy the reading was decoded with.
    pub fn validity(&self) -> bool {
        self.valid
    }

    #[inline]
    pub fn pressure_psi(&self) -> f64 {
        f64::from(self.pressure) / 10.0
    }

    #[inline]
    pub fn battery_volts(&self) -> f64 {
        f64::from(self.battery) / 10.0
    }
}

impl fmt::Display for SensorReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let alarms = self.alarm_flags();
        writeln!(f, "Pressure:    {:.1} psi", self.pressure_psi())?;
        writeln!(f, "Temperature: {} °C", self.temperature)?;
        writeln!(f, "Battery:     {:.1} V", self.battery_volts())?;
        write!(f, "Alarm:       {}", alarms.to_binary_string())?;
        if !alarms.is_empty() {
            write!(f, " {alarms}")?;
        }
        Ok(())
    }
}
