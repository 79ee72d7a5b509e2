//
// protocol.rs
// Dicom-Harmonize
//
// Normalized protocol descriptor, the vendor-agnostic field extraction, and the export format switch.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::adapter::VendorAdapter;
use crate::dataset::Dataset;
use crate::error::{ProcessingError, Result};
use crate::{json, xml};

/// Modality codes accepted as the enumerated range of the `Modality` parameter.
pub const KNOWN_MODALITIES: &[&str] = &[
    "CR", "CT", "DX", "MG", "MR", "NM", "OT", "PT", "RF", "US", "XA",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Number(v) => write!(f, "{v}"),
            ParameterValue::Text(s) => f.write_str(s),
        }
    }
}

/// Either an inclusive `[min, max]` interval or an enumerated set of accepted values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValidRange {
    Interval(f64, f64),
    Options(Vec<String>),
}

impl ValidRange {
    pub fn options<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ValidRange::Options(values.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolParameter {
    pub value: ParameterValue,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub valid_range: Option<ValidRange>,
}

impl ProtocolParameter {
    pub fn number(value: f64) -> Self {
        Self {
            value: ParameterValue::Number(value),
            unit: None,
            valid_range: None,
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self {
            value: ParameterValue::Text(value.into()),
            unit: None,
            valid_range: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_range(mut self, range: ValidRange) -> Self {
        self.valid_range = Some(range);
        self
    }

    /// True when the value is known to fall outside its declared range.
    pub fn out_of_range(&self) -> bool {
        match (&self.value, &self.valid_range) {
            (ParameterValue::Number(v), Some(ValidRange::Interval(min, max))) => {
                v < min || v > max
            }
            (ParameterValue::Text(v), Some(ValidRange::Options(options))) => {
                !options.iter().any(|o| o == v)
            }
            _ => false,
        }
    }
}

/// Parameter name → record. Names are unique; ordering carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtocolDescriptor {
    parameters: BTreeMap<String, ProtocolParameter>,
}

impl ProtocolDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a parameter, returning the previous record.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        parameter: ProtocolParameter,
    ) -> Option<ProtocolParameter> {
        self.parameters.insert(name.into(), parameter)
    }

    pub fn get(&self, name: &str) -> Option<&ProtocolParameter> {
        self.parameters.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ProtocolParameter)> {
        self.parameters.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parameters.keys().map(String::as_str)
    }

    /// Overlay `other` onto `self`; entries of `other` win. Returns the colliding names.
    pub fn overlay(&mut self, other: ProtocolDescriptor) -> Vec<String> {
        let mut collisions = Vec::new();
        for (name, parameter) in other.parameters {
            if self.parameters.insert(name.clone(), parameter).is_some() {
                collisions.push(name);
            }
        }
        collisions
    }
}

/// Builds the final descriptor from dataset tags plus the adapter's contribution.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProtocolExtractor;

impl ProtocolExtractor {
    pub fn extract(dataset: &Dataset, adapter: &dyn VendorAdapter) -> ProtocolDescriptor {
        let mut descriptor = vendor_agnostic_fields(dataset);
        let collisions = descriptor.overlay(adapter.extract_protocol(dataset));
        if !collisions.is_empty() {
            debug!(
                adapter = adapter.name(),
                ?collisions,
                "vendor parameters replaced vendor-agnostic fields"
            );
        }
        descriptor
    }
}

/// Fields read the same way for every vendor. Missing tags are left out.
pub fn vendor_agnostic_fields(dataset: &Dataset) -> ProtocolDescriptor {
    let mut descriptor = ProtocolDescriptor::new();

    if let Some(id) = dataset.text("PatientID") {
        descriptor.insert("PatientID", ProtocolParameter::text(id));
    }
    if let Some(date) = dataset.text("StudyDate") {
        descriptor.insert("StudyDate", ProtocolParameter::text(normalize_study_date(&date)));
    }
    if let Some(modality) = dataset.text("Modality") {
        descriptor.insert(
            "Modality",
            ProtocolParameter::text(modality)
                .with_range(ValidRange::options(KNOWN_MODALITIES.iter().copied())),
        );
    }
    if let Some(manufacturer) = dataset.manufacturer() {
        descriptor.insert("Manufacturer", ProtocolParameter::text(manufacturer));
    }
    if let Some(spacing) = dataset.numbers("PixelSpacing") {
        // PixelSpacing is (row spacing, column spacing).
        if let Some(&row) = spacing.first() {
            descriptor.insert(
                "PixelSpacingRow",
                ProtocolParameter::number(row).with_unit("mm"),
            );
        }
        if let Some(&column) = spacing.get(1) {
            descriptor.insert(
                "PixelSpacingColumn",
                ProtocolParameter::number(column).with_unit("mm"),
            );
        }
    }

    let geometry = dataset.geometry();
    descriptor.insert("Rows", ProtocolParameter::number(geometry.rows as f64));
    descriptor.insert("Columns", ProtocolParameter::number(geometry.columns as f64));
    descriptor.insert(
        "NumberOfFrames",
        ProtocolParameter::number(geometry.frames as f64),
    );

    descriptor
}

/// `YYYYMMDD` → `YYYY-MM-DD`; anything else is kept verbatim.
fn normalize_study_date(raw: &str) -> String {
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

/// Serialization format for protocol export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Xml,
}

impl FromStr for ExportFormat {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "xml" => Ok(ExportFormat::Xml),
            _ => Err(ProcessingError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Json => f.write_str("json"),
            ExportFormat::Xml => f.write_str("xml"),
        }
    }
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Xml => "xml",
        }
    }
}

pub fn serialize(descriptor: &ProtocolDescriptor, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => json::to_json_string(descriptor),
        ExportFormat::Xml => xml::to_xml_string(descriptor),
    }
}

pub fn deserialize(document: &str, format: ExportFormat) -> Result<ProtocolDescriptor> {
    match format {
        ExportFormat::Json => json::from_json_str(document),
        ExportFormat::Xml => xml::from_xml_str(document),
    }
}
