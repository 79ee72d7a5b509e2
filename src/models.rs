//
// models.rs
// Dicom-Harmonize
//
// Defines the pixel buffer shared by every transform plus serializable statistics and histogram summaries.
//
// Thales Matheus Mendonça Santos - November 2025

use std::borrow::Cow;

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

/// Numeric pixel array with a fixed shape.
///
/// `Float` carries calibrated intensities (adapter output) or normalized display
/// values; `UInt8` carries 8-bit display values produced by windowing.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelBuffer {
    Float(ArrayD<f32>),
    UInt8(ArrayD<u8>),
}

impl PixelBuffer {
    pub fn shape(&self) -> &[usize] {
        match self {
            PixelBuffer::Float(arr) => arr.shape(),
            PixelBuffer::UInt8(arr) => arr.shape(),
        }
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn len(&self) -> usize {
        match self {
            PixelBuffer::Float(arr) => arr.len(),
            PixelBuffer::UInt8(arr) => arr.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_float(&self) -> Option<&ArrayD<f32>> {
        match self {
            PixelBuffer::Float(arr) => Some(arr),
            PixelBuffer::UInt8(_) => None,
        }
    }

    pub fn as_u8(&self) -> Option<&ArrayD<u8>> {
        match self {
            PixelBuffer::UInt8(arr) => Some(arr),
            PixelBuffer::Float(_) => None,
        }
    }

    /// Float view of the samples; borrows when the buffer already holds `f32`.
    pub fn to_f32(&self) -> Cow<'_, ArrayD<f32>> {
        match self {
            PixelBuffer::Float(arr) => Cow::Borrowed(arr),
            PixelBuffer::UInt8(arr) => Cow::Owned(arr.mapv(f32::from)),
        }
    }

    /// Smallest and largest finite sample, or `None` when there is none.
    pub fn finite_range(&self) -> Option<(f32, f32)> {
        let values = self.to_f32();
        values
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

impl From<ArrayD<f32>> for PixelBuffer {
    fn from(value: ArrayD<f32>) -> Self {
        PixelBuffer::Float(value)
    }
}

impl From<ArrayD<u8>> for PixelBuffer {
    fn from(value: ArrayD<u8>) -> Self {
        PixelBuffer::UInt8(value)
    }
}

/// Aggregate statistics over pixel values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PixelStatistics {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub median: Option<f32>,
    pub std_dev: f32,
    pub total_pixels: usize,
    pub shape: Vec<usize>,
}

/// Histogram buckets alongside the observed range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PixelHistogram {
    pub bins: Vec<u64>,
    pub min: f32,
    pub max: f32,
}

impl PixelHistogram {
    /// Bucket a value falls into, using the same rule that built the histogram.
    pub fn bin_of(&self, value: f32) -> Option<usize> {
        if !value.is_finite() || self.bins.is_empty() {
            return None;
        }
        let n = self.bins.len();
        let span = f64::from(self.max) - f64::from(self.min);
        if span <= 0.0 {
            return Some(0);
        }
        let offset = (f64::from(value) - f64::from(self.min)) / span;
        let idx = (offset * n as f64).floor();
        Some((idx.max(0.0) as usize).min(n - 1))
    }

    pub fn occupied_bins(&self) -> usize {
        self.bins.iter().filter(|&&count| count > 0).count()
    }
}
