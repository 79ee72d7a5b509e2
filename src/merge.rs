//
// merge.rs
// Dicom-Harmonize
//
// Channel merger: stack same-shape buffers along a new channel axis, or fuse them by weighted sum.
//
// Thales Matheus Mendonça Santos - November 2025

use std::borrow::Borrow;

use ndarray::{ArrayD, ArrayViewD, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{ProcessingError, Result};
use crate::models::PixelBuffer;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// One trailing channel axis, channel `i` = input `i`.
    #[default]
    Stack,
    /// Single-channel weighted sum; weights are normalized by their sum.
    Weighted,
}

/// Fuse `buffers` according to `mode`. `weights` only applies to [`MergeMode::Weighted`]
/// and defaults to equal weights.
pub fn merge<B: Borrow<PixelBuffer>>(
    buffers: &[B],
    mode: MergeMode,
    weights: Option<&[f32]>,
) -> Result<PixelBuffer> {
    let first = buffers.first().ok_or(ProcessingError::NoChannels)?.borrow();
    check_shapes(first.shape(), buffers)?;

    let all_u8 = buffers
        .iter()
        .all(|b| matches!(b.borrow(), PixelBuffer::UInt8(_)));

    match mode {
        MergeMode::Stack => stack(buffers, all_u8),
        MergeMode::Weighted => {
            let weights = normalized_weights(buffers.len(), weights)?;
            Ok(weighted_sum(buffers, &weights, all_u8))
        }
    }
}

fn check_shapes<B: Borrow<PixelBuffer>>(expected: &[usize], buffers: &[B]) -> Result<()> {
    for (index, buffer) in buffers.iter().enumerate() {
        let found = buffer.borrow().shape();
        if found != expected {
            return Err(ProcessingError::ShapeMismatch {
                index,
                expected: expected.to_vec(),
                found: found.to_vec(),
            });
        }
    }
    Ok(())
}

fn stack<B: Borrow<PixelBuffer>>(buffers: &[B], all_u8: bool) -> Result<PixelBuffer> {
    let axis = Axis(buffers[0].borrow().ndim());

    if all_u8 {
        let views: Vec<ArrayViewD<'_, u8>> = buffers
            .iter()
            .filter_map(|b| b.borrow().as_u8().map(|a| a.view()))
            .collect();
        return Ok(PixelBuffer::UInt8(ndarray::stack(axis, &views)?));
    }

    let owned: Vec<_> = buffers.iter().map(|b| b.borrow().to_f32()).collect();
    let views: Vec<ArrayViewD<'_, f32>> = owned.iter().map(|a| a.view()).collect();
    Ok(PixelBuffer::Float(ndarray::stack(axis, &views)?))
}

fn normalized_weights(count: usize, weights: Option<&[f32]>) -> Result<Vec<f64>> {
    let Some(weights) = weights else {
        return Ok(vec![1.0 / count as f64; count]);
    };
    if weights.len() != count {
        return Err(ProcessingError::WeightCountMismatch {
            expected: count,
            found: weights.len(),
        });
    }
    let total: f64 = weights.iter().map(|&w| f64::from(w)).sum();
    if !total.is_finite() || total == 0.0 || weights.iter().any(|w| !w.is_finite()) {
        return Err(ProcessingError::InvalidWeights);
    }
    Ok(weights.iter().map(|&w| f64::from(w) / total).collect())
}

fn weighted_sum<B: Borrow<PixelBuffer>>(buffers: &[B], weights: &[f64], all_u8: bool) -> PixelBuffer {
    let shape = buffers[0].borrow().shape().to_vec();
    let mut acc = ArrayD::<f64>::zeros(shape);
    for (buffer, &weight) in buffers.iter().zip(weights) {
        let values = buffer.borrow().to_f32();
        acc.zip_mut_with(&*values, |a, &v| *a += weight * f64::from(v));
    }

    if all_u8 {
        PixelBuffer::UInt8(acc.mapv(|v| v.round().clamp(0.0, 255.0) as u8))
    } else {
        PixelBuffer::Float(acc.mapv(|v| v as f32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array2};

    fn float(rows: usize, cols: usize, fill: f32) -> PixelBuffer {
        PixelBuffer::from(Array2::from_elem((rows, cols), fill).into_dyn())
    }

    #[test]
    fn stack_adds_trailing_channel_axis_in_input_order() {
        let a = PixelBuffer::from(arr2(&[[1.0_f32, 2.0], [3.0, 4.0]]).into_dyn());
        let b = float(2, 2, 9.0);
        let merged = merge(&[&a, &b], MergeMode::Stack, None).unwrap();

        assert_eq!(merged.shape(), &[2, 2, 2]);
        let values = merged.as_float().unwrap();
        assert_eq!(values[[1, 0, 0]], 3.0);
        assert_eq!(values[[1, 0, 1]], 9.0);
    }

    #[test]
    fn stack_of_u8_stays_u8() {
        let a = PixelBuffer::from(arr2(&[[1_u8, 2]]).into_dyn());
        let b = PixelBuffer::from(arr2(&[[3_u8, 4]]).into_dyn());
        let merged = merge(&[a, b], MergeMode::Stack, None).unwrap();
        assert_eq!(merged.as_u8().unwrap().shape(), &[1, 2, 2]);
    }

    #[test]
    fn mismatched_shapes_report_offending_index() {
        let buffers = [float(2, 2, 0.0), float(2, 2, 0.0), float(2, 3, 0.0)];
        match merge(&buffers, MergeMode::Stack, None) {
            Err(ProcessingError::ShapeMismatch {
                index,
                expected,
                found,
            }) => {
                assert_eq!(index, 2);
                assert_eq!(expected, vec![2, 2]);
                assert_eq!(found, vec![2, 3]);
            }
            other => panic!("expected ShapeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn empty_input_is_rejected() {
        let empty: [PixelBuffer; 0] = [];
        assert!(matches!(
            merge(&empty, MergeMode::Stack, None),
            Err(ProcessingError::NoChannels)
        ));
    }

    #[test]
    fn weighted_defaults_to_equal_weights() {
        let merged = merge(
            &[float(1, 2, 10.0), float(1, 2, 20.0)],
            MergeMode::Weighted,
            None,
        )
        .unwrap();
        assert_eq!(merged.shape(), &[1, 2]);
        assert!(merged.as_float().unwrap().iter().all(|&v| v == 15.0));
    }

    #[test]
    fn weights_are_normalized_by_their_sum() {
        let merged = merge(
            &[float(1, 1, 0.0), float(1, 1, 100.0)],
            MergeMode::Weighted,
            Some(&[1.0, 3.0]),
        )
        .unwrap();
        assert_eq!(merged.as_float().unwrap()[[0, 0]], 75.0);
    }

    #[test]
    fn weight_validation() {
        let buffers = [float(1, 1, 0.0), float(1, 1, 1.0)];
        assert!(matches!(
            merge(&buffers, MergeMode::Weighted, Some(&[1.0])),
            Err(ProcessingError::WeightCountMismatch {
                expected: 2,
                found: 1
            })
        ));
        assert!(matches!(
            merge(&buffers, MergeMode::Weighted, Some(&[1.0, -1.0])),
            Err(ProcessingError::InvalidWeights)
        ));
        assert!(matches!(
            merge(&buffers, MergeMode::Weighted, Some(&[f32::NAN, 1.0])),
            Err(ProcessingError::InvalidWeights)
        ));
    }

    #[test]
    fn weighted_u8_is_rounded_back_to_u8() {
        let a = PixelBuffer::from(arr2(&[[0_u8, 255]]).into_dyn());
        let b = PixelBuffer::from(arr2(&[[1_u8, 255]]).into_dyn());
        let merged = merge(&[a, b], MergeMode::Weighted, None).unwrap();
        assert_eq!(merged.as_u8().unwrap().iter().copied().collect::<Vec<_>>(), vec![1, 255]);
    }
}
