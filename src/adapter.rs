//
// adapter.rs
// Dicom-Harmonize
//
// Capability interface implemented by every vendor adapter.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fmt;

use crate::dataset::Dataset;
use crate::error::Result;
use crate::models::PixelBuffer;
use crate::protocol::ProtocolDescriptor;

/// Vendor-specific detection and extraction.
///
/// Adapters hold no mutable state; once registered they are shared read-only
/// between sessions, hence the `Send + Sync` bound.
pub trait VendorAdapter: Send + Sync + fmt::Debug {
    /// Short display name used in logs and CLI output.
    fn name(&self) -> &str;

    fn is_compatible(&self, dataset: &Dataset) -> bool;

    /// Vendor-specific parameters only; missing tags are omitted.
    fn extract_protocol(&self, dataset: &Dataset) -> ProtocolDescriptor;

    /// Pixels normalized to the common convention: calibrated, linear, higher is brighter.
    fn get_pixel_data(&self, dataset: &Dataset) -> Result<PixelBuffer>;
}

/// Case-insensitive substring match of the `Manufacturer` tag against any identifier.
pub fn manufacturer_matches(dataset: &Dataset, identifiers: &[&str]) -> bool {
    let Some(manufacturer) = dataset.manufacturer() else {
        return false;
    };
    let manufacturer = manufacturer.to_uppercase();
    identifiers
        .iter()
        .any(|id| manufacturer.contains(&id.to_uppercase()))
}
