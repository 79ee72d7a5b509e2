//
// vendors.rs
// Dicom-Harmonize
//
// Built-in vendor adapters (Siemens, GE, Philips, United Imaging), the generic fallback, and a configurable custom adapter.
//
// Thales Matheus Mendonça Santos - November 2025

use crate::adapter::{manufacturer_matches, VendorAdapter};
use crate::dataset::Dataset;
use crate::error::Result;
use crate::models::PixelBuffer;
use crate::normalize::PixelNormalization;
use crate::protocol::{ProtocolDescriptor, ProtocolParameter, ValidRange};

// Private tags, keyed the way the parser names unknown tags.
pub const GE_PULSE_SEQUENCE_NAME: &str = "(0019,109C)";
pub const GE_EFFECTIVE_ECHO_SPACING: &str = "(0043,102C)";
pub const PHILIPS_SCALE_INTERCEPT: &str = "(2005,100D)";
pub const PHILIPS_SCALE_SLOPE: &str = "(2005,100E)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vendor {
    Siemens,
    Ge,
    Philips,
    UnitedImaging,
}

impl Vendor {
    /// Registration order of the built-in registry.
    pub const ALL: [Vendor; 4] = [
        Vendor::Siemens,
        Vendor::Ge,
        Vendor::Philips,
        Vendor::UnitedImaging,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            Vendor::Siemens => "Siemens",
            Vendor::Ge => "GE",
            Vendor::Philips => "Philips",
            Vendor::UnitedImaging => "United Imaging",
        }
    }

    /// Substrings looked for in the Manufacturer tag.
    pub fn identifiers(self) -> &'static [&'static str] {
        match self {
            Vendor::Siemens => &["SIEMENS"],
            Vendor::Ge => &["GE MEDICAL SYSTEMS", "GE HEALTHCARE"],
            Vendor::Philips => &["PHILIPS"],
            Vendor::UnitedImaging => &["UNITED IMAGING", "UIH"],
        }
    }
}

/// Adapter for one of the built-in vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinAdapter {
    vendor: Vendor,
}

impl BuiltinAdapter {
    pub fn new(vendor: Vendor) -> Self {
        Self { vendor }
    }

    pub fn vendor(&self) -> Vendor {
        self.vendor
    }
}

impl VendorAdapter for BuiltinAdapter {
    fn name(&self) -> &str {
        self.vendor.display_name()
    }

    fn is_compatible(&self, dataset: &Dataset) -> bool {
        manufacturer_matches(dataset, self.vendor.identifiers())
    }

    fn extract_protocol(&self, dataset: &Dataset) -> ProtocolDescriptor {
        let mut protocol = shared_scan_parameters(dataset);
        protocol.insert("Vendor", ProtocolParameter::text(self.vendor.display_name()));

        match self.vendor {
            Vendor::Siemens => {
                insert_text(&mut protocol, "SequenceName", dataset, "SequenceName");
                insert_number(
                    &mut protocol,
                    "MagneticFieldStrength",
                    dataset,
                    "MagneticFieldStrength",
                    Some("T"),
                    Some((0.0, 11.7)),
                );
            }
            Vendor::Ge => {
                insert_text(&mut protocol, "ProtocolName", dataset, "ProtocolName");
                insert_text(
                    &mut protocol,
                    "PulseSequenceName",
                    dataset,
                    GE_PULSE_SEQUENCE_NAME,
                );
                insert_number(
                    &mut protocol,
                    "EffectiveEchoSpacing",
                    dataset,
                    GE_EFFECTIVE_ECHO_SPACING,
                    Some("us"),
                    None,
                );
            }
            Vendor::Philips => {
                insert_text(&mut protocol, "ProtocolName", dataset, "ProtocolName");
                insert_number(&mut protocol, "ScaleSlope", dataset, PHILIPS_SCALE_SLOPE, None, None);
                insert_number(
                    &mut protocol,
                    "ScaleIntercept",
                    dataset,
                    PHILIPS_SCALE_INTERCEPT,
                    None,
                    None,
                );
            }
            Vendor::UnitedImaging => {
                insert_text(&mut protocol, "ProtocolName", dataset, "ProtocolName");
            }
        }

        protocol
    }

    fn get_pixel_data(&self, dataset: &Dataset) -> Result<PixelBuffer> {
        let mut normalization = PixelNormalization::from_dataset(dataset);
        match self.vendor {
            Vendor::Ge => {
                normalization.padding_value = dataset.number("PixelPaddingValue");
            }
            Vendor::Philips => {
                // Real-world value = (stored * RS + RI) / (RS * SS).
                normalization.scale_divisor = dataset
                    .number(PHILIPS_SCALE_SLOPE)
                    .filter(|ss| ss.is_finite() && *ss != 0.0)
                    .map(|ss| ss * normalization.slope);
            }
            Vendor::Siemens | Vendor::UnitedImaging => {}
        }
        Ok(normalization.apply(dataset.pixels()))
    }
}

/// Always-compatible adapter. Register it last.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenericAdapter;

impl VendorAdapter for GenericAdapter {
    fn name(&self) -> &str {
        "Generic"
    }

    fn is_compatible(&self, _dataset: &Dataset) -> bool {
        true
    }

    fn extract_protocol(&self, dataset: &Dataset) -> ProtocolDescriptor {
        let mut protocol = shared_scan_parameters(dataset);
        if let Some(manufacturer) = dataset.manufacturer() {
            protocol.insert("Vendor", ProtocolParameter::text(manufacturer));
        }
        insert_text(&mut protocol, "ProtocolName", dataset, "ProtocolName");
        protocol
    }

    fn get_pixel_data(&self, dataset: &Dataset) -> Result<PixelBuffer> {
        Ok(PixelNormalization::from_dataset(dataset).apply(dataset.pixels()))
    }
}

/// Extra tag read by a [`CustomAdapter`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterRule {
    pub key: String,
    pub attribute: String,
    pub unit: Option<String>,
    pub valid_range: Option<ValidRange>,
}

/// Adapter for a manufacturer not covered by the built-ins.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomAdapter {
    identifier: String,
    display_name: String,
    rules: Vec<ParameterRule>,
}

impl CustomAdapter {
    pub fn new(identifier: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            display_name: display_name.into(),
            rules: Vec::new(),
        }
    }

    /// Read `attribute` into parameter `key`; numeric values stay numeric.
    pub fn with_parameter(
        mut self,
        key: impl Into<String>,
        attribute: impl Into<String>,
        unit: Option<&str>,
        valid_range: Option<ValidRange>,
    ) -> Self {
        self.rules.push(ParameterRule {
            key: key.into(),
            attribute: attribute.into(),
            unit: unit.map(str::to_string),
            valid_range,
        });
        self
    }

    pub fn rules(&self) -> &[ParameterRule] {
        &self.rules
    }
}

impl VendorAdapter for CustomAdapter {
    fn name(&self) -> &str {
        &self.display_name
    }

    fn is_compatible(&self, dataset: &Dataset) -> bool {
        manufacturer_matches(dataset, &[self.identifier.as_str()])
    }

    fn extract_protocol(&self, dataset: &Dataset) -> ProtocolDescriptor {
        let mut protocol = shared_scan_parameters(dataset);
        protocol.insert("Vendor", ProtocolParameter::text(self.display_name.clone()));

        for rule in &self.rules {
            let parameter = match dataset.number(&rule.attribute) {
                Some(v) => ProtocolParameter::number(v),
                None => match dataset.text(&rule.attribute) {
                    Some(text) => ProtocolParameter::text(text),
                    None => continue,
                },
            };
            protocol.insert(
                rule.key.clone(),
                ProtocolParameter {
                    unit: rule.unit.clone(),
                    valid_range: rule.valid_range.clone(),
                    ..parameter
                },
            );
        }
        protocol
    }

    fn get_pixel_data(&self, dataset: &Dataset) -> Result<PixelBuffer> {
        Ok(PixelNormalization::from_dataset(dataset).apply(dataset.pixels()))
    }
}

/// Scan parameters every adapter reports when present.
pub fn shared_scan_parameters(dataset: &Dataset) -> ProtocolDescriptor {
    let mut protocol = ProtocolDescriptor::new();
    insert_text(&mut protocol, "SeriesDescription", dataset, "SeriesDescription");
    insert_number(
        &mut protocol,
        "SliceThickness",
        dataset,
        "SliceThickness",
        Some("mm"),
        Some((0.1, 10.0)),
    );
    insert_number(
        &mut protocol,
        "EchoTime",
        dataset,
        "EchoTime",
        Some("ms"),
        Some((0.0, 500.0)),
    );
    insert_number(
        &mut protocol,
        "RepetitionTime",
        dataset,
        "RepetitionTime",
        Some("ms"),
        Some((0.0, 5000.0)),
    );
    insert_number(
        &mut protocol,
        "FlipAngle",
        dataset,
        "FlipAngle",
        Some("deg"),
        Some((0.0, 180.0)),
    );
    protocol
}

fn insert_text(protocol: &mut ProtocolDescriptor, key: &str, dataset: &Dataset, attribute: &str) {
    if let Some(text) = dataset.text(attribute) {
        protocol.insert(key, ProtocolParameter::text(text));
    }
}

fn insert_number(
    protocol: &mut ProtocolDescriptor,
    key: &str,
    dataset: &Dataset,
    attribute: &str,
    unit: Option<&str>,
    range: Option<(f64, f64)>,
) {
    let Some(value) = dataset.number(attribute) else {
        return;
    };
    let mut parameter = ProtocolParameter::number(value);
    if let Some(unit) = unit {
        parameter = parameter.with_unit(unit);
    }
    if let Some((min, max)) = range {
        parameter = parameter.with_range(ValidRange::Interval(min, max));
    }
    protocol.insert(key, parameter);
}
