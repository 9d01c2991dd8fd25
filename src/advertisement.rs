//! Binding of decoded readings to the advertising device.
//!
//! Scanner backends describe what they received through the [`Advertisement`]
//! trait. [`TpmsAdvertisement::from_advertisement`] copies the identity fields
//! out of it and decodes the manufacturer data, so the result owns everything
//! it needs and can outlive the backend's device handle.

use crate::mac_address::MacAddress;
use crate::payload::{DecodeError, PayloadDecoder, ValidityPolicy};
use crate::reading::SensorReading;
use std::fmt;
use std::time::SystemTime;

/// What a scanner backend knows about one received advertisement.
pub trait Advertisement {
    fn address(&self) -> MacAddress;
    fn name(&self) -> Option<&str>;
    /// Signal strength in dBm.
    fn rssi(&self) -> Option<i16>;
    /// Advertised transmit power in dBm.
    fn tx_power(&self) -> Option<i16>;
    /// Manufacturer specific data, company identifier bytes included.
    fn manufacturer_data(&self) -> &[u8];
}

/// An owned advertisement snapshot, as produced by the scanner backends.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdvertisementData {
    pub address: MacAddress,
    pub name: Option<String>,
    pub rssi: Option<i16>,
    pub tx_power: Option<i16>,
    pub manufacturer_data: Vec<u8>,
}

impl Advertisement for AdvertisementData {
    fn address(&self) -> MacAddress {
        self.address
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn rssi(&self) -> Option<i16> {
        self.rssi
    }

    fn tx_power(&self) -> Option<i16> {
        self.tx_power
    }

    fn manufacturer_data(&self) -> &[u8] {
        &self.manufacturer_data
    }
}

/// A sensor reading together with the identity of the device that sent it.
#[derive(Debug, Clone, PartialEq)]
pub struct TpmsAdvertisement {
    reading: SensorReading,
    address: MacAddress,
    name: Option<String>,
    rssi: Option<i16>,
    tx_power: Option<i16>,
    timestamp: SystemTime,
}

impl TpmsAdvertisement {
    /// Snapshot the device identity and decode its manufacturer data.
    pub fn from_advertisement<A>(device: &A) -> Result<Self, DecodeError>
    where
        A: Advertisement + ?Sized,
    {
        Self::from_advertisement_with(device, &PayloadDecoder::new())
    }

    /// Like [`Self::from_advertisement`], with an explicit decoder.
    pub fn from_advertisement_with<A, P>(
        device: &A,
        decoder: &PayloadDecoder<P>,
    ) -> Result<Self, DecodeError>
    where
        A: Advertisement + ?Sized,
        P: ValidityPolicy,
    {
        let reading = decoder.decode(device.manufacturer_data())?;

        Ok(Self {
            reading,
            address: device.address(),
            name: device.name().map(str::to_owned),
            rssi: device.rssi(),
            tx_power: device.tx_power(),
            timestamp: SystemTime::now(),
        })
    }

    pub fn reading(&self) -> &SensorReading {
        &self.reading
    }

    pub fn address(&self) -> MacAddress {
        self.address
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn rssi(&self) -> Option<i16> {
        self.rssi
    }

    pub fn tx_power(&self) -> Option<i16> {
        self.tx_power
    }

    /// When the binding was created.
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }
}

struct OrNa<T>(Option<T>);

impl<T: fmt::Display> fmt::Display for OrNa<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(value) => fmt::Display::fmt(value, f),
            None => f.write_str("N/A"),
        }
    }
}

impl fmt::Display for TpmsAdvertisement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Device:      address={}, name={}, rssi={}, txpower={}",
            self.address,
            OrNa(self.name()),
            OrNa(self.rssi),
            OrNa(self.tx_power),
        )?;
        fmt::Display::fmt(&self.reading, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::RawPayload;
    use crate::test_utils::{SAMPLE_PAYLOAD, TEST_MAC, advertisement};

    #[test]
    fn test_binding_snapshots_identity() {
        let mut adv = advertisement(&SAMPLE_PAYLOAD);
        adv.name = Some("BR".to_string());
        adv.rssi = Some(-67);
        adv.tx_power = Some(4);

        let binding = TpmsAdvertisement::from_advertisement(&adv).unwrap();

        // mutating the source afterwards does not reach the binding
        adv.name = Some("changed".to_string());
        adv.rssi = None;
        assert_ne!(binding.name(), adv.name.as_deref());
        assert_ne!(binding.rssi(), adv.rssi);

        assert_eq!(binding.address(), TEST_MAC);
        assert_eq!(binding.name(), Some("BR"));
        assert_eq!(binding.rssi(), Some(-67));
        assert_eq!(binding.tx_power(), Some(4));
        assert_eq!(binding.reading().pressure(), 305);
    }

    #[test]
    fn test_binding_without_name() {
        let adv = advertisement(&SAMPLE_PAYLOAD);
        let binding = TpmsAdvertisement::from_advertisement(&adv).unwrap();
        assert_eq!(binding.name(), None);
        assert_eq!(binding.rssi(), None);
        assert_eq!(binding.tx_power(), None);
    }

    #[test]
    fn test_binding_rejects_short_manufacturer_data() {
        let adv = advertisement(&[0x00, 0x1F, 0x16]);
        assert_eq!(
            TpmsAdvertisement::from_advertisement(&adv),
            Err(DecodeError::TooShort { len: 3 })
        );
    }

    #[test]
    fn test_binding_with_custom_decoder() {
        let decoder = PayloadDecoder::with_policy(|raw: &RawPayload| raw.temperature < 100);
        let mut data = SAMPLE_PAYLOAD;
        data[2] = 120;

        let binding =
            TpmsAdvertisement::from_advertisement_with(&advertisement(&data), &decoder).unwrap();
        assert!(!binding.reading().validity());
    }

    #[test]
    fn test_binding_through_trait_object() {
        let adv = advertisement(&SAMPLE_PAYLOAD);
        let device: &dyn Advertisement = &adv;
        let binding = TpmsAdvertisement::from_advertisement(device).unwrap();
        assert_eq!(binding.reading(), &crate::payload::decode(&SAMPLE_PAYLOAD).unwrap());
    }

    #[test]
    fn test_diagnostic_rendering_with_missing_identity() {
        let binding = TpmsAdvertisement::from_advertisement(&advertisement(&SAMPLE_PAYLOAD)).unwrap();
        let text = binding.to_string();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("Device:      address=AA:BB:CC:DD:EE:FF, name=N/A, rssi=N/A, txpower=N/A")
        );
        assert_eq!(lines.next(), Some("Pressure:    30.5 psi"));
        assert_eq!(lines.next(), Some("Temperature: 22 °C"));
        assert_eq!(lines.next(), Some("Battery:     3.1 V"));
        assert_eq!(lines.next(), Some("Alarm:       00000000"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_diagnostic_rendering_with_identity() {
        let mut adv = advertisement(&[0x80, 0x1F, 0x16, 0x00, 0x91, 0x00, 0x00]);
        adv.name = Some("BR".to_string());
        adv.rssi = Some(-80);
        adv.tx_power = Some(0);

        let binding = TpmsAdvertisement::from_advertisement(&adv).unwrap();
        let text = binding.to_string();
        assert!(text.starts_with(
            "Device:      address=AA:BB:CC:DD:EE:FF, name=BR, rssi=-80, txpower=0\n"
        ));
        assert!(text.contains("Pressure:    0.0 psi"));
        assert!(text.ends_with("Alarm:       10000000 (ZeroPressure)"));
    }

    #[test]
    fn test_binding_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TpmsAdvertisement>();
    }
}
