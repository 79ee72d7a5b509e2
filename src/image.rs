//
// image.rs
// Dicom-Harmonize
//
// Renders pixel buffers and segmentation masks to PNG and implements the default result visualizer.
//
// Thales Matheus Mendonça Santos - November 2025

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use ndarray::{ArrayView2, ArrayViewD, Axis, Ix2};
use tracing::info;

use crate::error::{ProcessingError, Result};
use crate::models::PixelBuffer;
use crate::segment::SegmentationMasks;
use crate::session::Artifact;

const GRAY_MATTER_TINT: [u8; 3] = [230, 60, 60];
const WHITE_MATTER_TINT: [u8; 3] = [60, 120, 230];

/// Plotting collaborator handed the cached pixels and the latest artifact.
pub trait ResultVisualizer {
    fn present(&self, original: &PixelBuffer, artifact: Option<&Artifact>) -> Result<()>;
}

/// Writes `<stem>_original.png` plus one PNG per artifact into `output_dir`.
#[derive(Debug, Clone)]
pub struct PngVisualizer {
    output_dir: PathBuf,
    stem: String,
}

impl PngVisualizer {
    pub fn new(output_dir: impl Into<PathBuf>, stem: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            stem: stem.into(),
        }
    }

    /// Render everything and return the written paths.
    pub fn render(&self, original: &PixelBuffer, artifact: Option<&Artifact>) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.output_dir)?;
        let base = to_gray_image(original)?;
        let mut written = vec![self.write("original", DynamicImage::ImageLuma8(base.clone()))?];

        match artifact {
            None => {}
            Some(Artifact::Windowed(windowed)) => {
                written.push(self.write("windowed", DynamicImage::ImageLuma8(to_gray_image(windowed)?))?);
            }
            Some(Artifact::Merged(merged)) if merged.ndim() > original.ndim() => {
                // Stacked channels: one image per channel.
                for (channel, buffer) in split_channels(merged).into_iter().enumerate() {
                    let image = to_gray_image(&buffer)?;
                    written.push(self.write(&format!("merged_c{channel}"), DynamicImage::ImageLuma8(image))?);
                }
            }
            Some(Artifact::Merged(merged)) => {
                written.push(self.write("merged", DynamicImage::ImageLuma8(to_gray_image(merged)?))?);
            }
            Some(Artifact::Segmentation(masks)) => {
                let overlay = segmentation_overlay(&base, masks)?;
                written.push(self.write("segmentation", DynamicImage::ImageRgb8(overlay))?);
            }
        }
        Ok(written)
    }

    fn write(&self, suffix: &str, image: DynamicImage) -> Result<PathBuf> {
        let path = self.output_dir.join(format!("{}_{}.png", self.stem, suffix));
        save_png(&image, &path)?;
        info!(path = %path.display(), "image written");
        Ok(path)
    }
}

impl ResultVisualizer for PngVisualizer {
    fn present(&self, original: &PixelBuffer, artifact: Option<&Artifact>) -> Result<()> {
        self.render(original, artifact).map(|_| ())
    }
}

/// 8-bit grayscale of a 2D buffer, or of the first slice of a 3D one.
/// `u8` samples are used as-is; floats are stretched over their finite range.
pub fn to_gray_image(buffer: &PixelBuffer) -> Result<GrayImage> {
    match buffer {
        PixelBuffer::UInt8(values) => {
            let slice = first_slice(values.view())?;
            Ok(gray_from(slice, |v| v))
        }
        PixelBuffer::Float(values) => {
            let slice = first_slice(values.view())?;
            let (lo, hi) = slice
                .iter()
                .copied()
                .filter(|v| v.is_finite())
                .fold(None, |acc: Option<(f32, f32)>, v| match acc {
                    None => Some((v, v)),
                    Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
                })
                .unwrap_or((0.0, 0.0));
            let span = hi - lo;
            Ok(gray_from(slice, |v| {
                if !v.is_finite() || span <= 0.0 {
                    0
                } else {
                    (((v - lo) / span) * 255.0).round().clamp(0.0, 255.0) as u8
                }
            }))
        }
    }
}

/// Tint gray matter red and white matter blue on top of `base`.
pub fn segmentation_overlay(base: &GrayImage, masks: &SegmentationMasks) -> Result<RgbImage> {
    let gray = first_slice(masks.gray_matter.view())?;
    let white = first_slice(masks.white_matter.view())?;
    let expected = (base.height() as usize, base.width() as usize);
    if gray.dim() != expected {
        return Err(ProcessingError::ShapeMismatch {
            index: 1,
            expected: vec![expected.0, expected.1],
            found: gray.shape().to_vec(),
        });
    }

    Ok(RgbImage::from_fn(base.width(), base.height(), |x, y| {
        let Luma([v]) = *base.get_pixel(x, y);
        let idx = [y as usize, x as usize];
        if gray[idx] {
            blend(v, GRAY_MATTER_TINT)
        } else if white[idx] {
            blend(v, WHITE_MATTER_TINT)
        } else {
            Rgb([v, v, v])
        }
    }))
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    image.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
    Ok(buffer)
}

pub fn save_png(image: &DynamicImage, path: &Path) -> Result<()> {
    std::fs::write(path, encode_png(image)?)?;
    Ok(())
}

fn blend(v: u8, tint: [u8; 3]) -> Rgb<u8> {
    Rgb(tint.map(|t| ((u16::from(v) + u16::from(t)) / 2) as u8))
}

fn gray_from<T: Copy>(slice: ArrayView2<'_, T>, to_u8: impl Fn(T) -> u8) -> GrayImage {
    let (rows, cols) = slice.dim();
    GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
        Luma([to_u8(slice[[y as usize, x as usize]])])
    })
}

fn first_slice<T>(values: ArrayViewD<'_, T>) -> Result<ArrayView2<'_, T>> {
    match values.ndim() {
        2 => Ok(values.into_dimensionality::<Ix2>()?),
        3 => Ok(values.index_axis_move(Axis(0), 0).into_dimensionality::<Ix2>()?),
        ndim => Err(ProcessingError::UnsupportedDimensions { ndim }),
    }
}

fn split_channels(merged: &PixelBuffer) -> Vec<PixelBuffer> {
    let last = Axis(merged.ndim().saturating_sub(1));
    match merged {
        PixelBuffer::Float(values) => values
            .axis_iter(last)
            .map(|c| PixelBuffer::Float(c.to_owned()))
            .collect(),
        PixelBuffer::UInt8(values) => values
            .axis_iter(last)
            .map(|c| PixelBuffer::UInt8(c.to_owned()))
            .collect(),
    }
}
