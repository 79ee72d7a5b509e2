//
// config.rs
// Dicom-Harmonize
//
// Session configuration: display range, default window, segmentation knobs and the fallback adapter switch.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::registry::AdapterRegistry;
use crate::segment::SegmentationOptions;
use crate::window::{DisplayRange, WindowSettings};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub display_range: DisplayRange,
    /// Window used before segmentation; the dataset's own window is used when unset.
    pub default_window: Option<WindowSettings>,
    pub segmentation: SegmentationOptions,
    /// Append the generic adapter so that unknown manufacturers still load.
    pub fallback_adapter: bool,
}

impl SessionConfig {
    pub fn from_json_str(document: &str) -> Result<Self> {
        Ok(serde_json::from_str(document)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Built-in vendor registry, plus the fallback when enabled.
    pub fn registry(&self) -> AdapterRegistry {
        let registry = AdapterRegistry::with_builtin_vendors();
        if self.fallback_adapter {
            registry.with_fallback()
        } else {
            registry
        }
    }
}
