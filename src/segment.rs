//
// segment.rs
// Dicom-Harmonize
//
// Experimental gray/white matter split of a windowed brain slice: smoothing, three-class Otsu, closing.
//
// Thales Matheus Mendonça Santos - November 2025

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::distance_transform::Norm;
use imageproc::{filter, morphology};
use ndarray::{Array2, Array3, ArrayD, ArrayView2, Axis, Ix3};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ProcessingError, Result};
use crate::models::PixelBuffer;
use crate::stats;

type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationOptions {
    /// Gaussian smoothing sigma in pixels; `0` disables smoothing.
    pub sigma: f32,
    /// Histogram resolution used by the threshold search.
    pub bins: usize,
    /// 3×3 morphological closing of each mask.
    pub closing: bool,
}

impl Default for SegmentationOptions {
    fn default() -> Self {
        Self {
            sigma: 1.0,
            bins: 256,
            closing: true,
        }
    }
}

/// Boolean masks with the input's shape. Never true at the same pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationMasks {
    pub gray_matter: ArrayD<bool>,
    pub white_matter: ArrayD<bool>,
}

impl SegmentationMasks {
    pub fn gray_count(&self) -> usize {
        self.gray_matter.iter().filter(|&&v| v).count()
    }

    pub fn white_count(&self) -> usize {
        self.white_matter.iter().filter(|&&v| v).count()
    }

    pub fn overlap_count(&self) -> usize {
        self.gray_matter
            .iter()
            .zip(self.white_matter.iter())
            .filter(|&(&g, &w)| g && w)
            .count()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TissueSegmenter {
    options: SegmentationOptions,
}

impl TissueSegmenter {
    pub fn new(options: SegmentationOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> SegmentationOptions {
        self.options
    }

    /// Segment a 2D slice, or each slice of a `(slices, rows, columns)` stack.
    pub fn segment(&self, image: &PixelBuffer) -> Result<SegmentationMasks> {
        let values = image.to_f32();
        let ndim = values.ndim();
        let volume = match ndim {
            2 => values.view().insert_axis(Axis(0)).into_dimensionality::<Ix3>()?,
            3 => values.view().into_dimensionality::<Ix3>()?,
            _ => return Err(ProcessingError::UnsupportedDimensions { ndim }),
        };

        let mut gray = Array3::from_elem(volume.raw_dim(), false);
        let mut white = Array3::from_elem(volume.raw_dim(), false);
        for (idx, slice) in volume.axis_iter(Axis(0)).enumerate() {
            let (gm, wm) = self.segment_slice(slice);
            gray.index_axis_mut(Axis(0), idx).assign(&gm);
            white.index_axis_mut(Axis(0), idx).assign(&wm);
        }

        let (gray_matter, white_matter) = if ndim == 2 {
            (
                gray.index_axis_move(Axis(0), 0).into_dyn(),
                white.index_axis_move(Axis(0), 0).into_dyn(),
            )
        } else {
            (gray.into_dyn(), white.into_dyn())
        };
        Ok(SegmentationMasks {
            gray_matter,
            white_matter,
        })
    }

    fn segment_slice(&self, slice: ArrayView2<'_, f32>) -> (Array2<bool>, Array2<bool>) {
        let smoothed = gaussian_blur(slice, self.options.sigma);
        let histogram = stats::histogram(smoothed.view().into_dyn(), self.options.bins);

        let Some((background_max, gray_max)) = multi_otsu(&histogram.bins) else {
            warn!(
                occupied_bins = histogram.occupied_bins(),
                "intensity histogram too flat to segment; returning empty masks"
            );
            let empty = Array2::from_elem(smoothed.raw_dim(), false);
            return (empty.clone(), empty);
        };

        let bins = smoothed.mapv(|v| histogram.bin_of(v));
        let gray = bins.mapv(|b| b.map_or(false, |b| b > background_max && b <= gray_max));
        let white = bins.mapv(|b| b.map_or(false, |b| b > gray_max));

        if !self.options.closing {
            return (gray, white);
        }

        let mut gray = close(&gray);
        let mut white = close(&white);
        // Closing can grow both masks into the same pixel; hand it back by intensity.
        ndarray::Zip::from(&mut gray)
            .and(&mut white)
            .and(&bins)
            .for_each(|g, w, b| {
                if *g && *w {
                    let upper = b.map_or(false, |b| b > gray_max);
                    *g = !upper;
                    *w = upper;
                }
            });
        (gray, white)
    }
}

/// Three-class Otsu over histogram bins. Returns the last bin index of the
/// lower and middle classes, or `None` when fewer than two bins are occupied.
fn multi_otsu(bins: &[u64]) -> Option<(usize, usize)> {
    let occupied = bins.iter().filter(|&&c| c > 0).count();
    if occupied < 2 || bins.len() < 3 {
        return None;
    }

    // Prefix sums of counts and first moments.
    let mut weight = Vec::with_capacity(bins.len() + 1);
    let mut moment = Vec::with_capacity(bins.len() + 1);
    weight.push(0.0_f64);
    moment.push(0.0_f64);
    for (i, &count) in bins.iter().enumerate() {
        let c = count as f64;
        weight.push(weight[i] + c);
        moment.push(moment[i] + c * i as f64);
    }

    // Between-class variance up to a constant: sum of S_k^2 / W_k.
    let class_score = |from: usize, to: usize| {
        let w = weight[to] - weight[from];
        if w > 0.0 {
            let s = moment[to] - moment[from];
            s * s / w
        } else {
            0.0
        }
    };

    let n = bins.len();
    let mut best: Option<(f64, usize, usize)> = None;
    for i in 0..n - 2 {
        for j in i + 1..n - 1 {
            let score =
                class_score(0, i + 1) + class_score(i + 1, j + 1) + class_score(j + 1, n);
            if best.map_or(true, |(s, _, _)| score > s) {
                best = Some((score, i, j));
            }
        }
    }
    best.map(|(_, i, j)| (i, j))
}

/// Separable Gaussian with clamped borders.
fn gaussian_blur(slice: ArrayView2<'_, f32>, sigma: f32) -> Array2<f32> {
    // gaussian_blur_f32 panics on a non-positive sigma.
    if sigma <= 0.0 || !sigma.is_finite() {
        return slice.to_owned();
    }

    let (rows, cols) = slice.dim();
    let image: FloatImage =
        ImageBuffer::from_fn(cols as u32, rows as u32, |x, y| Luma([slice[[y as usize, x as usize]]]));
    let blurred = filter::gaussian_blur_f32(&image, sigma);
    Array2::from_shape_fn((rows, cols), |(r, c)| blurred.get_pixel(c as u32, r as u32)[0])
}

/// 3×3 closing (dilation then erosion); out-of-image neighbours are ignored.
fn close(mask: &Array2<bool>) -> Array2<bool> {
    let (rows, cols) = mask.dim();
    let image = GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
        Luma([if mask[[y as usize, x as usize]] { 255 } else { 0 }])
    });
    let closed = morphology::close(&image, Norm::LInf, 1);
    Array2::from_shape_fn((rows, cols), |(r, c)| closed.get_pixel(c as u32, r as u32)[0] > 0)
}
