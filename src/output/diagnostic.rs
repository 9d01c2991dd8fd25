//! Human-readable multi-line output.

use crate::advertisement::TpmsAdvertisement;
use crate::output::OutputFormatter;

/// Renders the advertisement's diagnostic dump, with a label line when the
/// device has an alias.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiagnosticFormatter;

impl OutputFormatter for DiagnosticFormatter {
    fn format(&self, advertisement: &TpmsAdvertisement, name: &str) -> String {
        if name == advertisement.address().to_string() {
            advertisement.to_string()
        } else {
            format!("Label:       {name}\n{advertisement}")
        }
    }
}
