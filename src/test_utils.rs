use crate::advertisement::{AdvertisementData, TpmsAdvertisement};
use crate::mac_address::MacAddress;

/// A stable address for unit tests.
pub const TEST_MAC: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

/// No alarms, 3.1 V, 22 °C, 30.5 psi, zero checksum.
pub const SAMPLE_PAYLOAD: [u8; 7] = [0x00, 0x1F, 0x16, 0x01, 0xC2, 0x00, 0x00];

/// Build an advertisement from `TEST_MAC` with every optional field unset.
pub fn advertisement(manufacturer_data: &[u8]) -> AdvertisementData {
    AdvertisementData {
        address: TEST_MAC,
        manufacturer_data: manufacturer_data.to_vec(),
        ..Default::default()
    }
}

/// Decode `manufacturer_data` into a binding from `TEST_MAC`.
pub fn binding(manufacturer_data: &[u8]) -> TpmsAdvertisement {
    TpmsAdvertisement::from_advertisement(&advertisement(manufacturer_data))
        .expect("test payload must decode")
}
