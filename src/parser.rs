//
// parser.rs
// Dicom-Harmonize
//
// Boundary to the DICOM byte-stream parser: turns a file into a named-attribute dataset with raw stored pixels.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::Path;

use dicom::object::open_file;
use dicom::pixeldata::PixelDecoder;
use dicom_pixeldata::{ConvertOptions, ModalityLutOption, VoiLutOption};
use ndarray::{ArrayD, IxDyn};

use crate::dataset::Dataset;
use crate::dicom_access::collect_attributes;
use crate::error::{ProcessingError, Result};

/// Anything able to produce a [`Dataset`] from a path.
pub trait DatasetParser: Send + Sync {
    fn parse(&self, path: &Path) -> Result<Dataset>;
}

/// Parser backed by `dicom-object` and `dicom-pixeldata`.
///
/// Pixels are decoded without modality or VOI LUTs so that vendor adapters see
/// the stored values and apply their own normalization.
#[derive(Debug, Default, Clone, Copy)]
pub struct DicomFileParser;

impl DatasetParser for DicomFileParser {
    fn parse(&self, path: &Path) -> Result<Dataset> {
        let label = path.display().to_string();
        let obj = open_file(path).map_err(|e| ProcessingError::invalid_dicom(&label, e))?;

        let decoded = obj
            .decode_pixel_data()
            .map_err(|e| ProcessingError::invalid_dicom(&label, e))?;

        let samples = decoded.samples_per_pixel();
        if samples != 1 {
            return Err(ProcessingError::invalid_dicom(
                &label,
                format!("{samples} samples per pixel; only single-sample images are supported"),
            ));
        }

        let frames = decoded.number_of_frames() as usize;
        let rows = decoded.rows() as usize;
        let columns = decoded.columns() as usize;

        // Stored values only: rescale and windowing belong to the adapters and transforms.
        let convert_options = ConvertOptions::new()
            .with_modality_lut(ModalityLutOption::None)
            .with_voi_lut(VoiLutOption::Identity);
        let values = decoded
            .to_vec_with_options::<f32>(&convert_options)
            .map_err(|e| ProcessingError::invalid_dicom(&label, e))?;

        let shape = if frames > 1 {
            vec![frames, rows, columns]
        } else {
            vec![rows, columns]
        };
        let pixels = ArrayD::from_shape_vec(IxDyn(&shape), values)
            .map_err(|e| ProcessingError::invalid_dicom(&label, e))?;

        Dataset::from_parts(collect_attributes(&obj), pixels)
    }
}
