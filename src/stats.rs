//
// stats.rs
// Dicom-Harmonize
//
// Summary statistics and fixed-bin histograms over normalized pixel buffers.
//
// Thales Matheus Mendonça Santos - November 2025

use ndarray::ArrayViewD;

use crate::models::{PixelBuffer, PixelHistogram, PixelStatistics};

/// Min/max/mean/median/std-dev over the finite samples of a buffer.
pub fn pixel_statistics(buffer: &PixelBuffer) -> PixelStatistics {
    let values = buffer.to_f32();
    let mut finite: Vec<f32> = values.iter().copied().filter(|v| v.is_finite()).collect();

    if finite.is_empty() {
        return PixelStatistics {
            min: 0.0,
            max: 0.0,
            mean: 0.0,
            median: None,
            std_dev: 0.0,
            total_pixels: values.len(),
            shape: values.shape().to_vec(),
        };
    }

    let min = finite.iter().fold(f32::INFINITY, |a, &b| a.min(b));
    let max = finite.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let count = finite.len() as f64;
    let mean = finite.iter().map(|&v| f64::from(v)).sum::<f64>() / count;

    let variance = finite
        .iter()
        .map(|&x| {
            let diff = mean - f64::from(x);
            diff * diff
        })
        .sum::<f64>()
        / count;

    finite.sort_by(|a, b| a.total_cmp(b));
    let mid = finite.len() / 2;
    let median = if finite.len() % 2 == 0 {
        (finite[mid - 1] + finite[mid]) / 2.0
    } else {
        finite[mid]
    };

    PixelStatistics {
        min,
        max,
        mean: mean as f32,
        median: Some(median),
        std_dev: variance.sqrt() as f32,
        total_pixels: values.len(),
        shape: values.shape().to_vec(),
    }
}

/// Count finite samples into `bins` equal-width buckets spanning the observed range.
pub fn histogram(values: ArrayViewD<'_, f32>, bins: usize) -> PixelHistogram {
    let bins = bins.max(1);
    let (min, max) = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f32, f32)>, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
        .unwrap_or((0.0, 0.0));

    let mut histogram = PixelHistogram {
        bins: vec![0; bins],
        min,
        max,
    };
    for &value in values.iter() {
        if let Some(idx) = histogram.bin_of(value) {
            histogram.bins[idx] += 1;
        }
    }
    histogram
}

pub fn histogram_for_buffer(buffer: &PixelBuffer, bins: usize) -> PixelHistogram {
    let values = buffer.to_f32();
    histogram(values.view(), bins)
}
