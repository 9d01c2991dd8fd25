//! InfluxDB line protocol output formatter.

use crate::advertisement::TpmsAdvertisement;
use crate::output::OutputFormatter;
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

/// Field values for InfluxDB line protocol
#[derive(Debug, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Boolean(bool),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::Float(num) => write!(f, "{num}"),
            FieldValue::Integer(num) => write!(f, "{num}i"),
            FieldValue::Boolean(b) => write!(f, "{b}"),
        }
    }
}

/// Data point in InfluxDB line protocol
#[derive(Debug)]
pub struct DataPoint {
    pub measurement: String,
    pub tag_set: BTreeMap<String, String>,
    pub field_set: BTreeMap<String, FieldValue>,
    pub timestamp: Option<SystemTime>,
}

/// Escape commas, equals signs and spaces in tag keys and values.
fn escape_tag(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, ',' | '=' | ' ') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn fmt_tags(data_point: &DataPoint, fmt: &mut fmt::Formatter) -> fmt::Result {
    for (key, value) in data_point.tag_set.iter() {
        write!(fmt, ",{}={}", escape_tag(key), escape_tag(value))?;
    }
    Ok(())
}

fn fmt_fields(data_point: &DataPoint, fmt: &mut fmt::Formatter) -> fmt::Result {
    let mut first = true;
    for (key, value) in data_point.field_set.iter() {
        if first {
            first = false;
        } else {
            write!(fmt, ",")?;
        }
        write!(fmt, "{}={}", key, value)?;
    }
    Ok(())
}

fn fmt_timestamp(data_point: &DataPoint, fmt: &mut fmt::Formatter) -> fmt::Result {
    // Clocks set before the epoch get no timestamp; the server assigns one.
    if let Some(nanos) = data_point
        .timestamp
        .and_then(|time| time.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|elapsed| elapsed.as_nanos())
    {
        write!(fmt, " {}", nanos)?;
    }
    Ok(())
}

impl fmt::Display for DataPoint {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.measurement)?;
        fmt_tags(self, fmt)?;
        write!(fmt, " ")?;
        fmt_fields(self, fmt)?;
        fmt_timestamp(self, fmt)
    }
}

/// InfluxDB line protocol formatter.
///
/// Pressure is written in psi and battery in volts. The alarm byte is kept as
/// an integer so it can be masked in queries; low battery and validity get
/// their own boolean fields.
pub struct InfluxDbFormatter {
    /// The measurement name in InfluxDB
    measurement_name: String,
}

impl InfluxDbFormatter {
    /// Create a new InfluxDB formatter.
    ///
    /// # Arguments
    /// * `measurement_name` - The measurement name to use in the line protocol
    pub fn new(measurement_name: String) -> Self {
        Self { measurement_name }
    }

    /// Tags are the device address and its resolved name.
    fn tag_set(&self, advertisement: &TpmsAdvertisement, name: &str) -> BTreeMap<String, String> {
        let mut tags = BTreeMap::new();
        tags.insert("mac".to_string(), advertisement.address().to_string());
        tags.insert("name".to_string(), name.to_string());
        tags
    }

    /// Build the field set. Identity values the device did not report are omitted.
    fn field_set(&self, advertisement: &TpmsAdvertisement) -> BTreeMap<String, FieldValue> {
        let reading = advertisement.reading();
        let alarms = reading.alarm_flags();
        let mut fields = BTreeMap::new();

        fields.insert(
            "pressure".into(),
            FieldValue::Float(reading.pressure_psi()),
        );
        fields.insert(
            "temperature".into(),
            FieldValue::Integer(i64::from(reading.temperature())),
        );
        fields.insert(
            "battery_potential".into(),
            FieldValue::Float(reading.battery_volts()),
        );
        fields.insert(
            "alarms".into(),
            FieldValue::Integer(i64::from(alarms.bits())),
        );
        fields.insert(
            "low_battery".into(),
            FieldValue::Boolean(alarms.is_low_battery()),
        );
        fields.insert("valid".into(), FieldValue::Boolean(reading.validity()));

        macro_rules! add {
            ($name:literal, $val:expr) => {
                if let Some(v) = $val {
                    fields.insert($name.into(), FieldValue::Integer(i64::from(v)));
                }
            };
        }

        add!("rssi", advertisement.rssi());
        add!("tx_power", advertisement.tx_power());

        fields
    }

    fn to_data_point(&self, advertisement: &TpmsAdvertisement, name: &str) -> DataPoint {
        DataPoint {
            measurement: self.measurement_name.clone(),
            tag_set: self.tag_set(advertisement, name),
            field_set: self.field_set(advertisement),
            timestamp: Some(advertisement.timestamp()),
        }
    }
}

impl OutputFormatter for InfluxDbFormatter {
    fn format(&self, advertisement: &TpmsAdvertisement, name: &str) -> String {
        self.to_data_point(advertisement, name).to_string()
    }
}
