//
// dataset.rs
// Dicom-Harmonize
//
// In-memory view of a parsed DICOM instance: named attributes plus the raw stored pixel array.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::BTreeMap;

use ndarray::{Array2, ArrayD};
use serde::{Deserialize, Serialize};

use crate::error::{ProcessingError, Result};

/// Attribute value as handed over by the parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Text(String),
    Numbers(Vec<f64>),
    Bytes(Vec<u8>),
}

impl AttributeValue {
    /// Textual form; byte values are decoded when they hold UTF-8 (private tags read as UN).
    pub fn as_text(&self) -> Option<String> {
        let text = match self {
            AttributeValue::Text(s) => s.clone(),
            AttributeValue::Numbers(values) => values
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join("\\"),
            AttributeValue::Bytes(bytes) => std::str::from_utf8(bytes).ok()?.to_string(),
        };
        let trimmed = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// All numeric components, parsing backslash-separated text when needed.
    pub fn as_numbers(&self) -> Option<Vec<f64>> {
        match self {
            AttributeValue::Numbers(values) if !values.is_empty() => Some(values.clone()),
            AttributeValue::Numbers(_) => None,
            _ => {
                let text = self.as_text()?;
                text.split('\\')
                    .map(|part| part.trim().parse::<f64>().ok())
                    .collect()
            }
        }
    }
}

/// Pixel geometry: `frames` is 1 for single-frame images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageGeometry {
    pub frames: usize,
    pub rows: usize,
    pub columns: usize,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    attributes: BTreeMap<String, AttributeValue>,
    pixels: ArrayD<f32>,
    geometry: ImageGeometry,
}

impl Dataset {
    /// Wrap stored pixel values shaped `(rows, columns)` or `(frames, rows, columns)`.
    pub fn new(pixels: ArrayD<f32>) -> Result<Self> {
        Self::from_parts(BTreeMap::new(), pixels)
    }

    pub fn from_slice(pixels: Array2<f32>) -> Self {
        let (rows, columns) = pixels.dim();
        Self {
            attributes: BTreeMap::new(),
            pixels: pixels.into_dyn(),
            geometry: ImageGeometry {
                frames: 1,
                rows,
                columns,
            },
        }
    }

    pub fn from_parts(
        attributes: BTreeMap<String, AttributeValue>,
        pixels: ArrayD<f32>,
    ) -> Result<Self> {
        let geometry = match *pixels.shape() {
            [rows, columns] => ImageGeometry {
                frames: 1,
                rows,
                columns,
            },
            [frames, rows, columns] => ImageGeometry {
                frames,
                rows,
                columns,
            },
            _ => {
                return Err(ProcessingError::UnsupportedDimensions {
                    ndim: pixels.ndim(),
                })
            }
        };
        Ok(Self {
            attributes,
            pixels,
            geometry,
        })
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn with_text(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_attribute(name, AttributeValue::Text(value.into()))
    }

    pub fn with_number(self, name: impl Into<String>, value: f64) -> Self {
        self.with_attribute(name, AttributeValue::Numbers(vec![value]))
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: AttributeValue) {
        self.attributes.insert(name.into(), value);
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn text(&self, name: &str) -> Option<String> {
        self.attribute(name).and_then(AttributeValue::as_text)
    }

    /// First numeric component of an attribute.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.numbers(name).and_then(|values| values.first().copied())
    }

    pub fn numbers(&self, name: &str) -> Option<Vec<f64>> {
        self.attribute(name).and_then(AttributeValue::as_numbers)
    }

    pub fn manufacturer(&self) -> Option<String> {
        self.text("Manufacturer")
    }

    pub fn pixels(&self) -> &ArrayD<f32> {
        &self.pixels
    }

    pub fn geometry(&self) -> ImageGeometry {
        self.geometry
    }
}
