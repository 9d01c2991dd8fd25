//! Core application runner (business logic) for `tpms-listener`.
//!
//! This module is intentionally decoupled from CLI parsing and process exit codes
//! so it can be tested deterministically.

use crate::advertisement::TpmsAdvertisement;
use crate::alias::{Alias, AliasMap};
use crate::mac_address::MacAddress;
use crate::output::{Format, OutputFormatter};
use crate::scanner::{Backend, BindingResult, ScanError, ScanFilter};
use clap::Parser;
use log::{debug, info};
use std::future::Future;
use std::io;
use std::io::Write;
use std::pin::Pin;
use thiserror::Error;
use tokio::sync::mpsc;

/// Configuration for the core run loop.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Output format.
    #[arg(long, default_value_t, value_enum)]
    pub format: Format,

    /// The name of the measurement in InfluxDB line protocol.
    #[arg(long, default_value = "tpms_measurement")]
    pub influxdb_measurement: String,

    /// Specify human-readable alias for a sensor address.
    /// Format: --alias 4A:00:00:11:22:33=FrontLeft
    #[arg(long = "alias", value_parser = crate::alias::parse_alias, value_name = "ALIAS")]
    pub aliases: Vec<Alias>,

    /// Only decode advertisements with this advertised name.
    /// At least one of --name or --address is required.
    #[arg(long)]
    pub name: Option<String>,

    /// Only decode advertisements from this address. May be repeated.
    /// At least one of --name or --address is required.
    #[arg(long = "address", value_name = "MAC")]
    pub addresses: Vec<MacAddress>,

    /// Verbose output, print errors for advertisements that fail to decode
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Bluetooth scanner backend to use
    #[arg(long, default_value_t, value_enum)]
    pub backend: Backend,
}

impl Options {
    pub fn scan_filter(&self) -> ScanFilter {
        ScanFilter {
            name: self.name.clone(),
            addresses: self.addresses.clone(),
        }
    }
}

/// Errors returned by the core run loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Sensors carry no company identifier, so an unfiltered scan would
    /// decode every nearby device as a tire reading.
    #[error("no sensor filter: pass --name or --address")]
    MissingFilter,
}

/// Scanner abstraction to enable deterministic unit tests without Bluetooth hardware.
pub trait Scanner: Send + Sync {
    fn start_scan(
        &self,
        backend: Backend,
        filter: ScanFilter,
        verbose: bool,
    ) -> Pin<Box<dyn Future<Output = Result<mpsc::Receiver<BindingResult>, ScanError>> + Send + '_>>;
}

/// Real scanner implementation that delegates to the compiled-in backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealScanner;

impl Scanner for RealScanner {
    fn start_scan(
        &self,
        backend: Backend,
        filter: ScanFilter,
        verbose: bool,
    ) -> Pin<Box<dyn Future<Output = Result<mpsc::Receiver<BindingResult>, ScanError>> + Send + '_>>
    {
        Box::pin(async move { crate::scanner::start_scan(backend, filter, verbose).await })
    }
}

fn write_binding(
    formatter: &dyn OutputFormatter,
    advertisement: &TpmsAdvertisement,
    name: &str,
    out: &mut dyn Write,
) -> io::Result<()> {
    let record = formatter.format(advertisement, name);
    writeln!(out, "{record}")
}

/// Run the core processing loop, writing formatted output to `out` and verbose errors to `err`.
///
/// - On successful bindings, it resolves the device label and writes one formatted record to `out`.
/// - On decode errors, it writes the error to `err` only when `options.verbose` is true.
///
/// Refuses to scan with [`RunError::MissingFilter`] when neither a name nor an
/// address filter is configured.
pub async fn run_with_io(
    options: Options,
    scanner: &dyn Scanner,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<(), RunError> {
    let filter = options.scan_filter();
    if filter.is_empty() {
        return Err(RunError::MissingFilter);
    }

    let aliases: AliasMap = crate::alias::to_map(&options.aliases);
    let formatter = crate::output::formatter(options.format, options.influxdb_measurement.clone());

    info!("starting {} scanner with {:?}", options.backend, filter);
    let mut bindings = scanner
        .start_scan(options.backend, filter, options.verbose)
        .await?;

    while let Some(result) = bindings.recv().await {
        match result {
            Ok(advertisement) => {
                let name = crate::alias::resolve_name(&advertisement.address(), &aliases);
                write_binding(formatter.as_ref(), &advertisement, &name, out)?;
            }
            Err(decode_err) => {
                debug!("dropping advertisement: {decode_err}");
                if options.verbose {
                    writeln!(err, "{decode_err}")?;
                }
            }
        }
    }

    info!("scanner stopped");
    Ok(())
}
