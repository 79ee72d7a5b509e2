//
// window.rs
// Dicom-Harmonize
//
// Window/level transform from calibrated intensities to a display range.
//
// Thales Matheus Mendonça Santos - November 2025

use serde::{Deserialize, Serialize};

use crate::error::{ProcessingError, Result};
use crate::models::PixelBuffer;

/// Output type of the window transform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayRange {
    /// `[0, 255]` as `u8`.
    #[default]
    Uint8,
    /// `[0.0, 1.0]` as `f32`.
    NormalizedFloat,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowSettings {
    pub width: f64,
    pub level: f64,
}

impl WindowSettings {
    pub fn new(width: f64, level: f64) -> Self {
        Self { width, level }
    }

    /// Fails for non-positive or non-finite width, and for a non-finite level.
    pub fn validate(&self) -> Result<()> {
        if self.width > 0.0 && self.width.is_finite() && self.level.is_finite() {
            Ok(())
        } else {
            Err(ProcessingError::InvalidWindow {
                width: self.width,
                level: self.level,
            })
        }
    }

    pub fn bounds(&self) -> (f64, f64) {
        let half = self.width / 2.0;
        (self.level - half, self.level + half)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowLevelTransform {
    display: DisplayRange,
}

impl WindowLevelTransform {
    pub fn new(display: DisplayRange) -> Self {
        Self { display }
    }

    pub fn display(&self) -> DisplayRange {
        self.display
    }

    /// Clip to `[level - width/2, level + width/2]` and rescale linearly to the
    /// display range. NaN samples map to the bottom of the range.
    pub fn apply(&self, pixels: &PixelBuffer, width: f64, level: f64) -> Result<PixelBuffer> {
        let window = WindowSettings::new(width, level);
        window.validate()?;
        let (low, high) = window.bounds();

        let fraction = move |v: f32| -> f64 {
            let v = f64::from(v);
            if v.is_nan() {
                return 0.0;
            }
            (v.clamp(low, high) - low) / width
        };

        let values = pixels.to_f32();
        let output = match self.display {
            DisplayRange::Uint8 => {
                PixelBuffer::UInt8(values.mapv(|v| (fraction(v) * 255.0).round().min(255.0) as u8))
            }
            DisplayRange::NormalizedFloat => {
                PixelBuffer::Float(values.mapv(|v| fraction(v).min(1.0) as f32))
            }
        };
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    fn ct_slice() -> PixelBuffer {
        PixelBuffer::from(arr2(&[[-1000.0_f32, -160.0, 40.0], [240.0, 1000.0, 0.0]]).into_dyn())
    }

    #[test]
    fn brain_window_clips_and_rescales() {
        let out = WindowLevelTransform::default()
            .apply(&ct_slice(), 400.0, 40.0)
            .unwrap();
        let values: Vec<u8> = out.as_u8().unwrap().iter().copied().collect();
        // low = -160, high = 240
        assert_eq!(values, vec![0, 0, 128, 255, 255, 102]);
        assert_eq!(out.shape(), &[2, 3]);
    }

    #[test]
    fn normalized_float_output_spans_unit_interval() {
        let out = WindowLevelTransform::new(DisplayRange::NormalizedFloat)
            .apply(&ct_slice(), 400.0, 40.0)
            .unwrap();
        let values = out.as_float().unwrap();
        assert_eq!(values[[0, 0]], 0.0);
        assert_eq!(values[[1, 1]], 1.0);
        assert!((values[[0, 2]] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn non_positive_width_is_rejected() {
        let transform = WindowLevelTransform::default();
        for width in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                transform.apply(&ct_slice(), width, 40.0),
                Err(ProcessingError::InvalidWindow { .. })
            ));
        }
    }

    #[test]
    fn u8_input_is_windowed_too() {
        let input = PixelBuffer::from(arr2(&[[0_u8, 128, 255]]).into_dyn());
        let out = WindowLevelTransform::default().apply(&input, 128.0, 128.0).unwrap();
        let values: Vec<u8> = out.as_u8().unwrap().iter().copied().collect();
        assert_eq!(values, vec![0, 128, 255]);
    }

    #[test]
    fn display_range_uses_snake_case_names() {
        let parsed: DisplayRange = serde_json::from_str("\"normalized_float\"").unwrap();
        assert_eq!(parsed, DisplayRange::NormalizedFloat);
    }
}
