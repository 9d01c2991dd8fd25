//! Alarm byte interpretation.
//!
//! The first payload byte is a bitmask of sensor conditions. Eight conditions
//! own one bit each. Low battery is signalled differently: the sensor sets the
//! whole byte to `0xFF`, so it is a sentinel on the mask rather than a flag.

use std::fmt;

/// A single-bit sensor condition, in display priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Alarm {
    ZeroPressure,
    Rotating,
    StandingIdleFor15mins,
    BeginRotating,
    DecreasingPressureBelow207Psi,
    RisingPressure,
    DecreasingPressureAbove207Psi,
    Unspecified,
}

impl Alarm {
    /// All single-bit conditions in the order they are reported.
    pub const ALL: [Alarm; 8] = [
        Alarm::ZeroPressure,
        Alarm::Rotating,
        Alarm::StandingIdleFor15mins,
        Alarm::BeginRotating,
        Alarm::DecreasingPressureBelow207Psi,
        Alarm::RisingPressure,
        Alarm::DecreasingPressureAbove207Psi,
        Alarm::Unspecified,
    ];

    /// The bit this condition occupies in the alarm byte.
    pub const fn bit(self) -> u8 {
        match self {
            Alarm::ZeroPressure => 1 << 7,
            Alarm::Rotating => 1 << 6,
            Alarm::StandingIdleFor15mins => 1 << 5,
            Alarm::BeginRotating => 1 << 4,
            Alarm::DecreasingPressureBelow207Psi => 1 << 3,
            Alarm::RisingPressure => 1 << 2,
            Alarm::DecreasingPressureAbove207Psi => 1 << 1,
            Alarm::Unspecified => 1,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Alarm::ZeroPressure => "ZeroPressure",
            Alarm::Rotating => "Rotating",
            Alarm::StandingIdleFor15mins => "StandingIdleFor15mins",
            Alarm::BeginRotating => "BeginRotating",
            Alarm::DecreasingPressureBelow207Psi => "DecreasingPressureBelow207Psi",
            Alarm::RisingPressure => "RisingPressure",
            Alarm::DecreasingPressureAbove207Psi => "DecreasingPressureAbove207Psi",
            Alarm::Unspecified => "Unspecified",
        }
    }
}

impl fmt::Display for Alarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mask value the sensor uses to report a low battery.
pub const LOW_BATTERY_MASK: u8 = 0xFF;

/// Display name of the low battery sentinel.
pub const LOW_BATTERY: &str = "LowBattery";

/// The raw alarm byte of a reading.
///
/// `Display` renders the active names as `(A,B,...)`, or nothing at all when no
/// condition is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AlarmFlags(u8);

impl AlarmFlags {
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, alarm: Alarm) -> bool {
        self.0 & alarm.bit() == alarm.bit()
    }

    /// True only when the mask is exactly [`LOW_BATTERY_MASK`].
    pub const fn is_low_battery(self) -> bool {
        self.0 == LOW_BATTERY_MASK
    }

    /// Active single-bit conditions in priority order.
    pub fn iter(self) -> impl Iterator<Item = Alarm> {
        Alarm::ALL.into_iter().filter(move |alarm| self.contains(*alarm))
    }

    /// Names of every active condition, low battery last.
    pub fn names(self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.iter().map(Alarm::name).collect();
        if self.is_low_battery() {
            names.push(LOW_BATTERY);
        }
        names
    }

    /// The mask as eight binary digits, most significant bit first.
    pub fn to_binary_string(self) -> String {
        format!("{:08b}", self.0)
    }
}

impl From<u8> for AlarmFlags {
    fn from(bits: u8) -> Self {
        Self(bits)
    }
}

impl fmt::Display for AlarmFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.names();
        if names.is_empty() {
            return Ok(());
        }
        write!(f, "({})", names.join(","))
    }
}
