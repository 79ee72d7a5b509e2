//
// normalize.rs
// Dicom-Harmonize
//
// Stored-value → common intensity convention: bit depth, rescale, vendor scale, photometric inversion, padding.
//
// Thales Matheus Mendonça Santos - November 2025

use ndarray::{ArrayD, Zip};

use crate::dataset::Dataset;
use crate::models::PixelBuffer;

/// Parameters of the pixel normalization. Adapters start from
/// [`PixelNormalization::from_dataset`] and switch on the vendor-specific steps.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelNormalization {
    pub bits_stored: Option<u32>,
    pub signed: bool,
    pub slope: f64,
    pub intercept: f64,
    /// Extra divisor applied after rescale (Philips private scale slope).
    pub scale_divisor: Option<f64>,
    pub invert: bool,
    /// Stored value marking pixels outside the acquired field of view.
    pub padding_value: Option<f64>,
}

impl Default for PixelNormalization {
    fn default() -> Self {
        Self {
            bits_stored: None,
            signed: false,
            slope: 1.0,
            intercept: 0.0,
            scale_divisor: None,
            invert: false,
            padding_value: None,
        }
    }
}

impl PixelNormalization {
    /// Standard tags only: BitsStored, PixelRepresentation, rescale, photometric interpretation.
    pub fn from_dataset(dataset: &Dataset) -> Self {
        let slope = dataset
            .number("RescaleSlope")
            .filter(|s| s.is_finite() && *s != 0.0)
            .unwrap_or(1.0);
        let intercept = dataset
            .number("RescaleIntercept")
            .filter(|i| i.is_finite())
            .unwrap_or(0.0);
        let invert = dataset
            .text("PhotometricInterpretation")
            .map_or(false, |p| p.eq_ignore_ascii_case("MONOCHROME1"));

        Self {
            bits_stored: dataset
                .number("BitsStored")
                .filter(|b| (1.0..32.0).contains(b))
                .map(|b| b as u32),
            signed: dataset.number("PixelRepresentation") == Some(1.0),
            slope,
            intercept,
            scale_divisor: None,
            invert,
            padding_value: None,
        }
    }

    pub fn apply(&self, stored: &ArrayD<f32>) -> PixelBuffer {
        let padding = self.padding_mask(stored);

        let mut values = stored.mapv(|v| {
            let v = self.fit_bit_depth(f64::from(v));
            let mut out = v * self.slope + self.intercept;
            if let Some(divisor) = self.scale_divisor {
                out /= divisor;
            }
            out
        });

        let kept_range = |values: &ArrayD<f64>| {
            let mut range: Option<(f64, f64)> = None;
            Zip::from(values).and(&padding).for_each(|&v, &padded| {
                if !padded && v.is_finite() {
                    range = Some(match range {
                        None => (v, v),
                        Some((lo, hi)) => (lo.min(v), hi.max(v)),
                    });
                }
            });
            range
        };

        if self.invert {
            if let Some((lo, hi)) = kept_range(&values) {
                values.mapv_inplace(|v| lo + hi - v);
            }
        }

        if self.padding_value.is_some() {
            if let Some((lo, _)) = kept_range(&values) {
                Zip::from(&mut values).and(&padding).for_each(|v, &padded| {
                    if padded {
                        *v = lo;
                    }
                });
            }
        }

        PixelBuffer::Float(values.mapv(|v| v as f32))
    }

    fn padding_mask(&self, stored: &ArrayD<f32>) -> ArrayD<bool> {
        match self.padding_value {
            Some(pad) => stored.mapv(|v| self.fit_bit_depth(f64::from(v)) == pad),
            None => ArrayD::from_elem(stored.raw_dim(), false),
        }
    }

    /// Mask to BitsStored, or sign-extend from it for signed data. Non-integral
    /// samples are passed through untouched.
    fn fit_bit_depth(&self, v: f64) -> f64 {
        let Some(bits) = self.bits_stored else {
            return v;
        };
        if v.fract() != 0.0 || !v.is_finite() {
            return v;
        }
        let raw = v as i64;
        let mask = (1_i64 << bits) - 1;
        let masked = raw & mask;
        if self.signed && masked & (1_i64 << (bits - 1)) != 0 {
            (masked - (1_i64 << bits)) as f64
        } else {
            masked as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    fn floats(buffer: PixelBuffer) -> Vec<f32> {
        buffer.as_float().unwrap().iter().copied().collect()
    }

    #[test]
    fn rescale_is_applied_from_standard_tags() {
        let ds = Dataset::from_slice(arr2(&[[0.0_f32, 64.0], [128.0, 255.0]]))
            .with_text("RescaleSlope", "2")
            .with_text("RescaleIntercept", "-1024");
        let norm = PixelNormalization::from_dataset(&ds);
        assert_eq!(
            floats(norm.apply(ds.pixels())),
            vec![-1024.0, -896.0, -768.0, -514.0]
        );
    }

    #[test]
    fn missing_or_zero_slope_is_identity() {
        let ds = Dataset::from_slice(arr2(&[[3.0_f32]])).with_number("RescaleSlope", 0.0);
        let norm = PixelNormalization::from_dataset(&ds);
        assert_eq!(norm.slope, 1.0);
        assert_eq!(floats(norm.apply(ds.pixels())), vec![3.0]);
    }

    #[test]
    fn monochrome1_is_inverted_within_its_range() {
        let ds = Dataset::from_slice(arr2(&[[0.0_f32, 10.0, 40.0]]))
            .with_text("PhotometricInterpretation", "MONOCHROME1");
        let norm = PixelNormalization::from_dataset(&ds);
        assert_eq!(floats(norm.apply(ds.pixels())), vec![40.0, 30.0, 0.0]);
    }

    #[test]
    fn signed_values_are_sign_extended_from_bits_stored() {
        let ds = Dataset::from_slice(arr2(&[[4095.0_f32, 2048.0, 5.0]]))
            .with_number("BitsStored", 12.0)
            .with_number("PixelRepresentation", 1.0);
        let norm = PixelNormalization::from_dataset(&ds);
        assert_eq!(floats(norm.apply(ds.pixels())), vec![-1.0, -2048.0, 5.0]);
    }

    #[test]
    fn unsigned_values_are_masked_to_bits_stored() {
        let ds = Dataset::from_slice(arr2(&[[4096.0_f32 + 7.0, 7.0]])).with_number("BitsStored", 12.0);
        let norm = PixelNormalization::from_dataset(&ds);
        assert_eq!(floats(norm.apply(ds.pixels())), vec![7.0, 7.0]);
    }

    #[test]
    fn padding_pixels_take_the_minimum_of_the_rest() {
        let ds = Dataset::from_slice(arr2(&[[-2000.0_f32, 10.0, 30.0]]));
        let norm = PixelNormalization {
            padding_value: Some(-2000.0),
            ..PixelNormalization::default()
        };
        assert_eq!(floats(norm.apply(ds.pixels())), vec![10.0, 10.0, 30.0]);
    }

    #[test]
    fn scale_divisor_follows_rescale() {
        let ds = Dataset::from_slice(arr2(&[[100.0_f32]]));
        let norm = PixelNormalization {
            slope: 2.0,
            scale_divisor: Some(4.0),
            ..PixelNormalization::default()
        };
        assert_eq!(floats(norm.apply(ds.pixels())), vec![50.0]);
    }
}
