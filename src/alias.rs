//! Human-readable labels for sensor addresses.
//!
//! Tire sensors are easier to tell apart by wheel position than by address,
//! so `--alias 4A:00:00:11:22:33=FrontLeft` attaches a label to a sensor.

use crate::mac_address::MacAddress;
use std::collections::HashMap;

/// Address-to-label mappings.
pub type AliasMap = HashMap<MacAddress, String>;

/// A parsed alias mapping an address to a label.
#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    pub address: MacAddress,
    pub name: String,
}

/// Parse an alias from a string in the format "MAC=NAME".
///
/// # Example
/// ```
/// use tpms_listener::alias::parse_alias;
///
/// let alias = parse_alias("4A:00:00:11:22:33=FrontLeft").unwrap();
/// assert_eq!(alias.address.to_string(), "4A:00:00:11:22:33");
/// assert_eq!(alias.name, "FrontLeft");
/// ```
pub fn parse_alias(src: &str) -> Result<Alias, String> {
    let (address, name) = src
        .split_once('=')
        .ok_or_else(|| "invalid alias: expected format MAC=NAME".to_string())?;

    if name.is_empty() {
        return Err("invalid alias: empty name".into());
    }

    let address = address
        .parse::<MacAddress>()
        .map_err(|e| format!("invalid alias: {e}"))?;

    Ok(Alias {
        address,
        name: name.into(),
    })
}

/// Collect aliases into a lookup map. Later entries win.
pub fn to_map(aliases: &[Alias]) -> AliasMap {
    aliases
        .iter()
        .map(|a| (a.address, a.name.clone()))
        .collect()
}

/// The label for `address`, or the address itself when no alias exists.
pub fn resolve_name(address: &MacAddress, aliases: &AliasMap) -> String {
    aliases
        .get(address)
        .cloned()
        .unwrap_or_else(|| address.to_string())
}
