//! `tpms-listener` library.
//!
//! Decodes the 7-byte manufacturer data broadcast by BLE tire pressure
//! sensors and binds each reading to the advertising device.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing and process exit codes.
//! The scan/format loop lives in [`crate::app`] where it can be tested
//! deterministically with injected scanner + injected output streams.

pub mod advertisement;
pub mod alarm;
pub mod alias;
pub mod app;
pub mod mac_address;
pub mod output;
pub mod payload;
pub mod reading;
pub mod scanner;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use advertisement::{Advertisement, AdvertisementData, TpmsAdvertisement};
pub use alarm::{Alarm, AlarmFlags};
pub use alias::{Alias, AliasMap, parse_alias, resolve_name, to_map};
pub use mac_address::MacAddress;
pub use output::diagnostic::DiagnosticFormatter;
pub use output::influxdb::InfluxDbFormatter;
pub use output::{Format, OutputFormatter};
pub use payload::{AlwaysValid, DecodeError, PayloadDecoder, RawPayload, ValidityPolicy, decode};
pub use reading::SensorReading;
pub use scanner::{Backend, BindingResult, ScanError, ScanFilter, process_advertisement};
