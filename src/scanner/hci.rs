//! Raw HCI socket backend for TPMS scanning.
//!
//! This backend uses raw Linux HCI sockets to scan for BLE advertisements
//! without requiring the BlueZ daemon. It requires CAP_NET_RAW and
//! CAP_NET_ADMIN capabilities or root privileges.
//!
//! Advertising reports carry the whole AD payload, so manufacturer data is
//! handed to the decoder exactly as the sensor sent it.

use super::{
    BINDING_CHANNEL_BUFFER_SIZE, BindingResult, ScanError, ScanFilter, forward,
    process_advertisement,
};
use crate::advertisement::AdvertisementData;
use crate::mac_address::MacAddress;
use crate::payload::DecodeError;
use libc::{AF_BLUETOOTH, SOCK_CLOEXEC, SOCK_RAW, c_int, c_void, sockaddr, socklen_t};
use log::{debug, info, warn};
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;

// HCI protocol constants
const BTPROTO_HCI: c_int = 1;
const HCI_FILTER: c_int = 2;

// HCI packet types
const HCI_EVENT_PKT: u8 = 0x04;

// HCI events
const EVT_LE_META_EVENT: u8 = 0x3E;

// LE Meta event sub-events
const EVT_LE_ADVERTISING_REPORT: u8 = 0x02;

// HCI commands
const OGF_LE_CTL: u16 = 0x08;
const OCF_LE_SET_SCAN_PARAMETERS: u16 = 0x000B;
const OCF_LE_SET_SCAN_ENABLE: u16 = 0x000C;

// Scan types
const LE_SCAN_PASSIVE: u8 = 0x00;

// Own address type
const LE_PUBLIC_ADDRESS: u8 = 0x00;

// Filter policy
const FILTER_POLICY_ACCEPT_ALL: u8 = 0x00;

// AD types
const AD_TYPE_SHORT_LOCAL_NAME: u8 = 0x08;
const AD_TYPE_COMPLETE_LOCAL_NAME: u8 = 0x09;
const AD_TYPE_TX_POWER_LEVEL: u8 = 0x0A;
const AD_TYPE_MANUFACTURER_DATA: u8 = 0xFF;

// RSSI value reported when the controller has no measurement
const RSSI_UNAVAILABLE: i8 = 127;

/// HCI socket address structure
#[repr(C)]
struct SockaddrHci {
    hci_family: u16,
    hci_dev: u16,
    hci_channel: u16,
}

/// HCI filter structure for raw sockets
#[repr(C)]
#[derive(Default)]
struct HciFilter {
    type_mask: u32,
    event_mask: [u32; 2],
    opcode: u16,
}

impl HciFilter {
    fn set_ptype(&mut self, ptype: u8) {
        self.type_mask |= 1 << (ptype as u32);
    }

    fn set_event(&mut self, event: u8) {
        let bit = event as usize;
        self.event_mask[bit / 32] |= 1 << (bit % 32);
    }
}

/// Scan interval and window, in 0.625 ms units (60 ms each)
const SCAN_INTERVAL: u16 = 0x0060;
const SCAN_WINDOW: u16 = 0x0060;

/// Parameters of LE Set Scan Parameters, little-endian as the controller expects
fn scan_parameters() -> [u8; 7] {
    let [interval_lo, interval_hi] = SCAN_INTERVAL.to_le_bytes();
    let [window_lo, window_hi] = SCAN_WINDOW.to_le_bytes();
    [
        LE_SCAN_PASSIVE,
        interval_lo,
        interval_hi,
        window_lo,
        window_hi,
        LE_PUBLIC_ADDRESS,
        FILTER_POLICY_ACCEPT_ALL,
    ]
}

/// Create an HCI command packet
fn hci_command_packet(ogf: u16, ocf: u16, params: &[u8]) -> Vec<u8> {
    let opcode = (ogf << 10) | ocf;
    let mut packet = Vec::with_capacity(4 + params.len());
    packet.push(0x01); // HCI command packet type
    packet.extend_from_slice(&opcode.to_le_bytes());
    packet.push(params.len() as u8);
    packet.extend_from_slice(params);
    packet
}

/// Map a negative libc return value to a scanner error.
fn check(ret: isize, action: &str) -> Result<(), ScanError> {
    if ret < 0 {
        return Err(ScanError::Bluetooth(format!(
            "Failed to {action}: {}",
            io::Error::last_os_error()
        )));
    }
    Ok(())
}

/// A raw HCI socket bound to one controller.
struct HciSocket(OwnedFd);

impl HciSocket {
    /// Open a non-blocking raw socket and bind it to `hciN`.
    fn open(dev_id: u16) -> Result<Self, ScanError> {
        // SOCK_NONBLOCK is required for AsyncFd to work properly
        let fd = unsafe {
            libc::socket(
                AF_BLUETOOTH,
                SOCK_RAW | SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
                BTPROTO_HCI,
            )
        };
        check(fd as isize, "create HCI socket")?;
        let socket = Self(unsafe { OwnedFd::from_raw_fd(fd) });

        let addr = SockaddrHci {
            hci_family: AF_BLUETOOTH as u16,
            hci_dev: dev_id,
            hci_channel: 0, // HCI_CHANNEL_RAW
        };
        let ret = unsafe {
            libc::bind(
                socket.0.as_raw_fd(),
                &addr as *const SockaddrHci as *const sockaddr,
                mem::size_of::<SockaddrHci>() as socklen_t,
            )
        };
        check(ret as isize, "bind HCI socket")?;

        Ok(socket)
    }

    /// Only let LE meta events through.
    fn filter_le_meta_events(&self) -> Result<(), ScanError> {
        let mut filter = HciFilter::default();
        filter.set_ptype(HCI_EVENT_PKT);
        filter.set_event(EVT_LE_META_EVENT);

        let ret = unsafe {
            libc::setsockopt(
                self.0.as_raw_fd(),
                0, // SOL_HCI
                HCI_FILTER,
                &filter as *const HciFilter as *const c_void,
                mem::size_of::<HciFilter>() as socklen_t,
            )
        };
        check(ret as isize, "set HCI filter")
    }

    fn send_command(&self, ocf: u16, params: &[u8]) -> Result<(), ScanError> {
        let packet = hci_command_packet(OGF_LE_CTL, ocf, params);
        let ret = unsafe {
            libc::write(
                self.0.as_raw_fd(),
                packet.as_ptr() as *const c_void,
                packet.len(),
            )
        };
        check(ret, "send HCI command")
    }

    /// Start a passive scan that reports duplicates.
    fn enable_le_scan(&self) -> Result<(), ScanError> {
        self.send_command(OCF_LE_SET_SCAN_PARAMETERS, &scan_parameters())?;
        // enable, don't filter duplicates
        self.send_command(OCF_LE_SET_SCAN_ENABLE, &[0x01, 0x00])
    }
}

/// Read one packet from `fd`. An empty read means the socket is gone.
fn read_packet(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    let ret = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut c_void, buf.len()) };
    match ret {
        n if n < 0 => Err(io::Error::last_os_error()),
        0 => Err(io::ErrorKind::UnexpectedEof.into()),
        n => Ok(n as usize),
    }
}

/// Error for an advertising report that cannot be parsed.
fn malformed(what: &str) -> DecodeError {
    DecodeError::InvalidData(format!("Malformed advertising report: {what}"))
}

/// Parse the first report of an LE advertising report event.
///
/// `data` is the complete HCI event packet, starting with the packet type.
fn parse_advertising_report(data: &[u8]) -> Result<Option<AdvertisementData>, DecodeError> {
    // Skip HCI header (1 byte packet type + 1 byte event code + 1 byte param len + 1 byte subevent)
    let report = data.get(4..).ok_or_else(|| malformed("missing header"))?;

    // Number of reports
    match report.first() {
        None | Some(0) => return Ok(None),
        Some(_) => {}
    }

    // Parse first report (we process one at a time)
    // Layout: num_reports(1) event_type(1) addr_type(1) addr(6) data_len(1) data(n) rssi(1)
    let addr: [u8; 6] = report
        .get(3..9)
        .and_then(|a| a.try_into().ok())
        .ok_or_else(|| malformed("truncated address"))?;
    let data_len = *report.get(9).ok_or_else(|| malformed("missing data length"))? as usize;
    let ad_data = report
        .get(10..10 + data_len)
        .ok_or_else(|| malformed("truncated advertising data"))?;

    let rssi = report
        .get(10 + data_len)
        .map(|b| *b as i8)
        .filter(|rssi| *rssi != RSSI_UNAVAILABLE)
        .map(i16::from);

    let mut advertisement = AdvertisementData {
        address: MacAddress::from_le_bytes(addr),
        rssi,
        ..Default::default()
    };

    // Parse AD structures: len(1) type(1) value(len - 1)
    let mut offset = 0;
    while offset + 2 <= ad_data.len() {
        let len = ad_data[offset] as usize;
        if len == 0 || offset + 1 + len > ad_data.len() {
            break;
        }

        let ad_type = ad_data[offset + 1];
        let value = &ad_data[offset + 2..offset + 1 + len];

        match ad_type {
            AD_TYPE_COMPLETE_LOCAL_NAME => {
                advertisement.name = Some(String::from_utf8_lossy(value).into_owned());
            }
            AD_TYPE_SHORT_LOCAL_NAME if advertisement.name.is_none() => {
                advertisement.name = Some(String::from_utf8_lossy(value).into_owned());
            }
            AD_TYPE_TX_POWER_LEVEL => {
                advertisement.tx_power = value.first().map(|p| i16::from(*p as i8));
            }
            AD_TYPE_MANUFACTURER_DATA => {
                advertisement.manufacturer_data = value.to_vec();
            }
            _ => {}
        }

        offset += 1 + len;
    }

    Ok(Some(advertisement))
}

/// Turn one HCI event packet into a scan result, if it is worth reporting.
fn handle_event(packet: &[u8], filter: &ScanFilter, verbose: bool) -> Option<BindingResult> {
    // Check if this is an LE advertising report
    if packet.len() < 4
        || packet[0] != HCI_EVENT_PKT
        || packet[1] != EVT_LE_META_EVENT
        || packet[3] != EVT_LE_ADVERTISING_REPORT
    {
        return None;
    }

    match parse_advertising_report(packet) {
        Ok(Some(advertisement)) => process_advertisement(&advertisement, filter, verbose),
        Ok(None) => None,
        Err(e) => {
            debug!("{e}");
            verbose.then_some(Err(e))
        }
    }
}

/// Start scanning for TPMS advertisements using raw HCI sockets.
///
/// This function opens a raw HCI socket, configures LE scanning, and
/// processes advertising reports. Discovered bindings are sent through the
/// returned channel. Runs indefinitely until interrupted.
///
/// # Arguments
/// * `filter` - Which advertisements to decode
/// * `verbose` - If true, decode errors are sent as Err values; otherwise they're silently dropped.
///
/// # Requirements
/// - CAP_NET_RAW and CAP_NET_ADMIN capabilities or root privileges
/// - An available HCI device (typically hci0)
pub async fn start_scan(
    filter: ScanFilter,
    verbose: bool,
) -> Result<mpsc::Receiver<BindingResult>, ScanError> {
    // One socket receives advertising events, a second one sends commands
    let events = HciSocket::open(0)?;
    events.filter_le_meta_events()?;

    let commands = HciSocket::open(0)?;
    commands.enable_le_scan()?;
    info!("scanning on hci0 via raw HCI socket");

    let (tx, rx) = mpsc::channel(BINDING_CHANNEL_BUFFER_SIZE);

    // Wrap in AsyncFd for async I/O
    let async_fd = AsyncFd::new(events.0)
        .map_err(|e| ScanError::Bluetooth(format!("Failed to create async fd: {}", e)))?;

    // Spawn a task to read and process HCI events
    tokio::spawn(async move {
        let _commands = commands; // Keep command socket alive
        let mut buf = [0u8; 258]; // Max HCI event size

        loop {
            // Wait for the socket to be readable
            let mut guard = match async_fd.readable().await {
                Ok(guard) => guard,
                Err(_) => break,
            };

            // Drain all available packets before waiting again
            loop {
                let n = match guard.try_io(|inner| read_packet(inner.as_raw_fd(), &mut buf)) {
                    Ok(Ok(n)) => n,
                    Ok(Err(e)) => {
                        warn!("HCI socket read failed, stopping scan: {e}");
                        return;
                    }
                    Err(_would_block) => break,
                };

                if let Some(result) = handle_event(&buf[..n], &filter, verbose)
                    && !forward(&tx, result).await
                {
                    return;
                }
            }
        }
    });

    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hci_filter_setup() {
        let mut filter = HciFilter::default();
        filter.set_ptype(HCI_EVENT_PKT);
        filter.set_event(EVT_LE_META_EVENT);

        // Verify filter is set correctly
        // HCI_EVENT_PKT (0x04) sets bit 4 in type_mask
        assert_eq!(filter.type_mask, 1 << HCI_EVENT_PKT);
        // EVT_LE_META_EVENT (0x3E = 62) sets bit 30 in event_mask[1]
        assert_eq!(filter.event_mask[1], 1 << (EVT_LE_META_EVENT % 32));
    }

    #[test]
    fn test_hci_command_packet() {
        let packet = hci_command_packet(OGF_LE_CTL, OCF_LE_SET_SCAN_ENABLE, &[0x01, 0x00]);

        assert_eq!(packet[0], 0x01); // Command packet type
        assert_eq!(&packet[1..3], &[0x0C, 0x20]); // opcode 0x200C, little-endian
        assert_eq!(packet[3], 2);
        assert_eq!(packet.len(), 6); // Header + 2 params
    }

    #[test]
    fn test_scan_parameters_layout() {
        assert_eq!(
            scan_parameters(),
            [LE_SCAN_PASSIVE, 0x60, 0x00, 0x60, 0x00, LE_PUBLIC_ADDRESS, FILTER_POLICY_ACCEPT_ALL]
        );
    }

    #[test]
    fn test_read_packet() {
        use std::io::Write;
        use std::os::unix::net::UnixStream;

        let (mut sender, receiver) = UnixStream::pair().unwrap();
        receiver.set_nonblocking(true).unwrap();
        let mut buf = [0u8; 16];

        let err = read_packet(receiver.as_raw_fd(), &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);

        sender.write_all(&[HCI_EVENT_PKT, EVT_LE_META_EVENT, 0x00]).unwrap();
        assert_eq!(read_packet(receiver.as_raw_fd(), &mut buf).unwrap(), 3);

        drop(sender);
        let err = read_packet(receiver.as_raw_fd(), &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        assert!(read_packet(-1, &mut buf).is_err());
    }

    /// Build an LE advertising report event around `ad_data`.
    fn report_packet(ad_data: &[u8], rssi: u8) -> Vec<u8> {
        let mut report = vec![
            0x01, // num reports
            0x00, // ADV_IND
            0x00, // public address
            0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA, // address, little-endian
            ad_data.len() as u8,
        ];
        report.extend_from_slice(ad_data);
        report.push(rssi);

        let mut packet = vec![
            HCI_EVENT_PKT,
            EVT_LE_META_EVENT,
            (report.len() + 1) as u8,
            EVT_LE_ADVERTISING_REPORT,
        ];
        packet.extend_from_slice(&report);
        packet
    }

    fn tpms_ad_data() -> Vec<u8> {
        let mut ad = vec![0x02, 0x01, 0x06]; // flags
        ad.extend_from_slice(&[0x03, AD_TYPE_COMPLETE_LOCAL_NAME, b'B', b'R']);
        ad.extend_from_slice(&[0x02, AD_TYPE_TX_POWER_LEVEL, 0xFC]); // -4 dBm
        ad.extend_from_slice(&[0x08, AD_TYPE_MANUFACTURER_DATA]);
        ad.extend_from_slice(&[0x00, 0x1F, 0x16, 0x01, 0xC2, 0x00, 0x00]);
        ad
    }

    #[test]
    fn test_parse_advertising_report() {
        let packet = report_packet(&tpms_ad_data(), 0xBD); // -67 dBm
        let adv = parse_advertising_report(&packet).unwrap().unwrap();

        assert_eq!(adv.address.to_string(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(adv.name.as_deref(), Some("BR"));
        assert_eq!(adv.tx_power, Some(-4));
        assert_eq!(adv.rssi, Some(-67));
        assert_eq!(
            adv.manufacturer_data,
            vec![0x00, 0x1F, 0x16, 0x01, 0xC2, 0x00, 0x00]
        );
    }

    #[test]
    fn test_parse_report_without_optional_fields() {
        let ad = [0x02, 0x01, 0x06];
        let adv = parse_advertising_report(&report_packet(&ad, RSSI_UNAVAILABLE as u8))
            .unwrap()
            .unwrap();
        assert_eq!(adv.name, None);
        assert_eq!(adv.tx_power, None);
        assert_eq!(adv.rssi, None);
        assert!(adv.manufacturer_data.is_empty());
    }

    #[test]
    fn test_short_name_does_not_override_complete_name() {
        let mut ad = vec![0x03, AD_TYPE_COMPLETE_LOCAL_NAME, b'B', b'R'];
        ad.extend_from_slice(&[0x02, AD_TYPE_SHORT_LOCAL_NAME, b'X']);
        let adv = parse_advertising_report(&report_packet(&ad, 0xC0))
            .unwrap()
            .unwrap();
        assert_eq!(adv.name.as_deref(), Some("BR"));
    }

    #[test]
    fn test_parse_truncated_report() {
        let mut packet = report_packet(&tpms_ad_data(), 0xBD);
        packet.truncate(12);
        assert!(matches!(
            parse_advertising_report(&packet),
            Err(DecodeError::InvalidData(_))
        ));
    }

    #[test]
    fn test_handle_event_binds_reading() {
        let packet = report_packet(&tpms_ad_data(), 0xBD);
        let filter = ScanFilter {
            name: Some("BR".to_string()),
            ..Default::default()
        };

        let binding = handle_event(&packet, &filter, false).unwrap().unwrap();
        assert_eq!(binding.name(), Some("BR"));
        assert_eq!(binding.rssi(), Some(-67));
        assert_eq!(binding.reading().pressure(), 305);
    }

    #[test]
    fn test_handle_event_ignores_other_events() {
        let mut packet = report_packet(&tpms_ad_data(), 0xBD);
        packet[3] = 0x01; // connection complete sub-event
        assert!(handle_event(&packet, &ScanFilter::default(), true).is_none());
    }

    #[test]
    fn test_handle_event_short_manufacturer_data() {
        let ad = [0x04, AD_TYPE_MANUFACTURER_DATA, 0x00, 0x1F, 0x16];
        let packet = report_packet(&ad, 0xBD);
        assert!(handle_event(&packet, &ScanFilter::default(), false).is_none());
        assert_eq!(
            handle_event(&packet, &ScanFilter::default(), true),
            Some(Err(DecodeError::TooShort { len: 3 }))
        );
    }
}
