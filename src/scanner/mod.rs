//! BLE scanner abstraction for TPMS sensors.
//!
//! Backends capture advertisements, turn them into owned
//! [`AdvertisementData`] snapshots and hand them to
//! [`process_advertisement`], which applies the [`ScanFilter`] and binds the
//! decoded reading to the device identity.

#[cfg(feature = "bluer")]
pub mod bluer;

#[cfg(feature = "hci")]
pub mod hci;

use crate::advertisement::{Advertisement, AdvertisementData, TpmsAdvertisement};
use crate::mac_address::MacAddress;
use crate::payload::DecodeError;
use log::debug;
use thiserror::Error;
use tokio::sync::mpsc;

/// Convenience alias for decoded advertisements or decode errors.
pub type BindingResult = Result<TpmsAdvertisement, DecodeError>;

/// Error type for scanner operations.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
    /// Data decoding error
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Channel buffer size for scan results.
pub const BINDING_CHANNEL_BUFFER_SIZE: usize = 100;

/// Available scanner backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// BlueZ D-Bus backend (requires bluetoothd daemon)
    #[cfg(feature = "bluer")]
    Bluer,
    /// Raw HCI socket backend (direct kernel access, no daemon required)
    #[cfg(feature = "hci")]
    Hci,
}

impl Default for Backend {
    fn default() -> Self {
        #[cfg(feature = "bluer")]
        return Backend::Bluer;
        #[cfg(all(feature = "hci", not(feature = "bluer")))]
        return Backend::Hci;
        #[cfg(not(any(feature = "bluer", feature = "hci")))]
        compile_error!("At least one backend feature must be enabled");
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "bluer")]
            Backend::Bluer => write!(f, "bluer"),
            #[cfg(feature = "hci")]
            Backend::Hci => write!(f, "hci"),
            #[cfg(not(any(feature = "bluer", feature = "hci")))]
            _ => unreachable!("Backend enum has no variants when no backend features are enabled"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            #[cfg(feature = "bluer")]
            "bluer" | "bluez" => Ok(Backend::Bluer),
            #[cfg(feature = "hci")]
            "hci" | "raw" => Ok(Backend::Hci),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

/// Restricts which advertisements are decoded.
///
/// An empty filter accepts every advertisement. When both fields are set an
/// advertisement has to match both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanFilter {
    /// Exact advertised local name, e.g. `BR`
    pub name: Option<String>,
    /// Accepted device addresses; empty means any
    pub addresses: Vec<MacAddress>,
}

impl ScanFilter {
    /// True when neither a name nor an address restricts the scan.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.addresses.is_empty()
    }

    pub fn matches<A: Advertisement + ?Sized>(&self, advertisement: &A) -> bool {
        let name_ok = self
            .name
            .as_deref()
            .is_none_or(|wanted| advertisement.name() == Some(wanted));
        let address_ok =
            self.addresses.is_empty() || self.addresses.contains(&advertisement.address());
        name_ok && address_ok
    }
}

/// Filter and decode one advertisement.
///
/// Returns `None` when the advertisement is filtered out, carries no
/// manufacturer data, or fails to decode while `verbose` is off.
pub fn process_advertisement(
    advertisement: &AdvertisementData,
    filter: &ScanFilter,
    verbose: bool,
) -> Option<BindingResult> {
    if !filter.matches(advertisement) {
        return None;
    }

    if advertisement.manufacturer_data.is_empty() {
        debug!("{}: no manufacturer data", advertisement.address);
        return verbose.then_some(Err(DecodeError::MissingManufacturerData));
    }

    match TpmsAdvertisement::from_advertisement(advertisement) {
        Ok(binding) => Some(Ok(binding)),
        Err(e) => {
            debug!("{}: {e}", advertisement.address);
            verbose.then_some(Err(e))
        }
    }
}

/// Send one result to the run loop. Returns false once the receiver is gone,
/// which tells the backend task to stop.
pub(crate) async fn forward(tx: &mpsc::Sender<BindingResult>, result: BindingResult) -> bool {
    if tx.send(result).await.is_err() {
        debug!("receiver dropped, stopping scan");
        return false;
    }
    true
}

/// Start scanning for TPMS advertisements using the specified backend.
///
/// # Arguments
/// * `backend` - The scanner backend to use
/// * `filter` - Which advertisements to decode
/// * `verbose` - If true, decode errors are sent as Err values; otherwise they're silently dropped.
///
/// # Returns
/// A receiver for bindings (or decode errors if verbose).
pub async fn start_scan(
    backend: Backend,
    filter: ScanFilter,
    verbose: bool,
) -> Result<mpsc::Receiver<BindingResult>, ScanError> {
    match backend {
        #[cfg(feature = "bluer")]
        Backend::Bluer => bluer::start_scan(filter, verbose).await,
        #[cfg(feature = "hci")]
        Backend::Hci => hci::start_scan(filter, verbose).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{SAMPLE_PAYLOAD, TEST_MAC, advertisement};
    use std::str::FromStr;

    #[test]
    fn test_empty_filter_accepts_everything() {
        assert!(ScanFilter::default().matches(&advertisement(&SAMPLE_PAYLOAD)));
    }

    #[test]
    fn test_filter_is_empty() {
        assert!(ScanFilter::default().is_empty());
        let by_name = ScanFilter {
            name: Some("BR".to_string()),
            ..Default::default()
        };
        assert!(!by_name.is_empty());
        let by_address = ScanFilter {
            addresses: vec![TEST_MAC],
            ..Default::default()
        };
        assert!(!by_address.is_empty());
    }

    #[test]
    fn test_filter_by_name() {
        let filter = ScanFilter {
            name: Some("BR".to_string()),
            ..Default::default()
        };
        let mut adv = advertisement(&SAMPLE_PAYLOAD);
        assert!(!filter.matches(&adv));

        adv.name = Some("BR".to_string());
        assert!(filter.matches(&adv));

        adv.name = Some("BRX".to_string());
        assert!(!filter.matches(&adv));
    }

    #[test]
    fn test_filter_by_address() {
        let other = MacAddress([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
        let adv = advertisement(&SAMPLE_PAYLOAD);

        let filter = ScanFilter {
            addresses: vec![other],
            ..Default::default()
        };
        assert!(!filter.matches(&adv));

        let filter = ScanFilter {
            addresses: vec![other, TEST_MAC],
            ..Default::default()
        };
        assert!(filter.matches(&adv));
    }

    #[test]
    fn test_process_advertisement_decodes() {
        let result = process_advertisement(
            &advertisement(&SAMPLE_PAYLOAD),
            &ScanFilter::default(),
            false,
        );
        let binding = result.unwrap().unwrap();
        assert_eq!(binding.address(), TEST_MAC);
        assert_eq!(binding.reading().pressure(), 305);
    }

    #[test]
    fn test_process_advertisement_errors_only_when_verbose() {
        let short = advertisement(&[0x00, 0x01]);
        assert!(process_advertisement(&short, &ScanFilter::default(), false).is_none());
        assert_eq!(
            process_advertisement(&short, &ScanFilter::default(), true),
            Some(Err(DecodeError::TooShort { len: 2 }))
        );

        let empty = advertisement(&[]);
        assert!(process_advertisement(&empty, &ScanFilter::default(), false).is_none());
        assert_eq!(
            process_advertisement(&empty, &ScanFilter::default(), true),
            Some(Err(DecodeError::MissingManufacturerData))
        );
    }

    #[test]
    fn test_process_advertisement_filtered_out_even_when_verbose() {
        let filter = ScanFilter {
            name: Some("BR".to_string()),
            ..Default::default()
        };
        let short = advertisement(&[0x00]);
        assert!(process_advertisement(&short, &filter, true).is_none());
    }

    #[tokio::test]
    async fn test_forward_stops_after_receiver_dropped() {
        let (tx, mut rx) = mpsc::channel(1);
        assert!(forward(&tx, Err(DecodeError::MissingManufacturerData)).await);
        assert_eq!(rx.recv().await, Some(Err(DecodeError::MissingManufacturerData)));

        drop(rx);
        assert!(!forward(&tx, Err(DecodeError::TooShort { len: 2 })).await);
    }

    #[test]
    fn test_scan_error_display() {
        let err = ScanError::Decode(DecodeError::TooShort { len: 5 });
        assert_eq!(
            err.to_string(),
            "Decode error: Payload too short: expected at least 7 bytes, got 5"
        );
        let err = ScanError::Bluetooth("adapter not found".to_string());
        assert_eq!(err.to_string(), "Bluetooth error: adapter not found");
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!(Backend::from_str("bluer").unwrap(), Backend::Bluer);
        assert_eq!(Backend::from_str("BlueZ").unwrap(), Backend::Bluer);
        assert_eq!(Backend::from_str("hci").unwrap(), Backend::Hci);
        assert_eq!(Backend::from_str("raw").unwrap(), Backend::Hci);
        assert!(Backend::from_str("invalid").is_err());
    }

    #[test]
    fn test_backend_display() {
        assert_eq!(Backend::Bluer.to_string(), "bluer");
        assert_eq!(Backend::Hci.to_string(), "hci");
    }
}
