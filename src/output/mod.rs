//! Output formatters for decoded TPMS advertisements.
//!
//! Every formatter turns one [`TpmsAdvertisement`] into one printable record.
//! The diagnostic format is meant for people, the InfluxDB line protocol for
//! Telegraf and similar collectors.

pub mod diagnostic;
pub mod influxdb;

use crate::advertisement::TpmsAdvertisement;
use diagnostic::DiagnosticFormatter;
use influxdb::InfluxDbFormatter;

/// Trait for formatting advertisements into output strings.
pub trait OutputFormatter: Send + Sync {
    /// Format an advertisement.
    ///
    /// # Arguments
    /// * `advertisement` - The decoded advertisement to format
    /// * `name` - Resolved label for the device (alias or address)
    fn format(&self, advertisement: &TpmsAdvertisement, name: &str) -> String;
}

/// Available output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Format {
    /// Multi-line human-readable dump
    #[default]
    Debug,
    /// InfluxDB line protocol
    Influxdb,
}

/// Build the formatter for `format`.
///
/// `measurement_name` is only used by the line protocol output.
pub fn formatter(format: Format, measurement_name: String) -> Box<dyn OutputFormatter> {
    match format {
        Format::Debug => Box::new(DiagnosticFormatter),
        Format::Influxdb => Box::new(InfluxDbFormatter::new(measurement_name)),
    }
}
