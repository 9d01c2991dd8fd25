//! BlueZ D-Bus backend for TPMS scanning.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.
//!
//! TPMS sensors do not advertise a registered company identifier, so there is
//! no manufacturer pattern to monitor for. Instead the backend runs LE
//! discovery with duplicate reporting and looks at every device BlueZ reports
//! as added or changed.

use super::{
    BINDING_CHANNEL_BUFFER_SIZE, BindingResult, ScanError, ScanFilter, forward,
    process_advertisement,
};
use crate::advertisement::AdvertisementData;
use crate::payload::DecodeError;
use bluer::{Adapter, AdapterEvent, Address, DiscoveryFilter, DiscoveryTransport, Session};
use futures::StreamExt;
use log::{info, warn};
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Rebuild the raw manufacturer data BlueZ split into company identifier and
/// payload. The identifier goes back in front, little-endian as on the air.
pub fn raw_manufacturer_data(company_id: u16, data: &[u8]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(2 + data.len());
    raw.extend_from_slice(&company_id.to_le_bytes());
    raw.extend_from_slice(data);
    raw
}

/// Pick one manufacturer data entry. Devices normally carry just one; if
/// there are several, the lowest company identifier wins.
fn select_manufacturer_data(entries: HashMap<u16, Vec<u8>>) -> Vec<u8> {
    entries
        .into_iter()
        .min_by_key(|(id, _)| *id)
        .map(|(id, data)| raw_manufacturer_data(id, &data))
        .unwrap_or_default()
}

/// Start scanning for TPMS advertisements using the BlueZ D-Bus backend.
///
/// Discovered bindings are sent through the returned channel. Runs
/// indefinitely until interrupted.
///
/// # Arguments
/// * `filter` - Which advertisements to decode
/// * `verbose` - If true, decode errors are sent as Err values; otherwise they're silently dropped.
pub async fn start_scan(
    filter: ScanFilter,
    verbose: bool,
) -> Result<mpsc::Receiver<BindingResult>, ScanError> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;

    adapter
        .set_discovery_filter(DiscoveryFilter {
            transport: DiscoveryTransport::Le,
            duplicate_data: true,
            ..Default::default()
        })
        .await?;

    let (tx, rx) = mpsc::channel(BINDING_CHANNEL_BUFFER_SIZE);
    let (started_tx, started_rx) = oneshot::channel();

    // Spawn a task that owns all Bluetooth state and runs the event loop.
    // Discovery starts inside the task, next to the adapter it belongs to;
    // whether it started is reported back through `started_tx`.
    tokio::spawn(async move {
        // Keep the D-Bus session alive for as long as the discovery runs
        let _session = session;

        let events = match adapter.discover_devices_with_changes().await {
            Ok(events) => {
                let _ = started_tx.send(Ok(()));
                events
            }
            Err(e) => {
                let _ = started_tx.send(Err(ScanError::from(e)));
                return;
            }
        };
        info!("scanning on {} via BlueZ", adapter.name());
        let mut events = std::pin::pin!(events);

        while let Some(event) = events.next().await {
            let AdapterEvent::DeviceAdded(address) = event else {
                continue;
            };

            match snapshot_device(&adapter, address).await {
                Ok(advertisement) => {
                    if let Some(result) = process_advertisement(&advertisement, &filter, verbose)
                        && !forward(&tx, result).await
                    {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{address}: {e}");
                    if verbose && !forward(&tx, Err(into_decode_error(e))).await {
                        break;
                    }
                }
            }
        }
    });

    started_rx
        .await
        .map_err(|_| ScanError::Bluetooth("discovery task exited before starting".into()))??;

    Ok(rx)
}

/// Report a failed device lookup through the decode error channel.
fn into_decode_error(err: ScanError) -> DecodeError {
    match err {
        ScanError::Bluetooth(e) => DecodeError::InvalidData(format!("Bluetooth error: {e}")),
        ScanError::Decode(e) => e,
    }
}

/// Read the identity and manufacturer data BlueZ currently holds for a device.
async fn snapshot_device(
    adapter: &Adapter,
    address: Address,
) -> Result<AdvertisementData, ScanError> {
    let device = adapter.device(address)?;

    Ok(AdvertisementData {
        address: address.into(),
        name: device.name().await?,
        rssi: device.rssi().await?,
        tx_power: device.tx_power().await?,
        manufacturer_data: device
            .manufacturer_data()
            .await?
            .map(select_manufacturer_data)
            .unwrap_or_default(),
    })
}
