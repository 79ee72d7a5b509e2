//
// error.rs
// Dicom-Harmonize
//
// Typed failures reported by the adapter registry, the pixel transforms, and the processing session.
//
// Thales Matheus Mendonça Santos - November 2025

use thiserror::Error;

/// Every failure the engine can report. None of these are downgraded to defaults.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("no registered adapter supports manufacturer {}", .manufacturer.as_deref().unwrap_or("<missing>"))]
    UnsupportedVendor { manufacturer: Option<String> },

    #[error("invalid DICOM input {source_label}: {reason}")]
    InvalidDicom {
        source_label: String,
        reason: String,
    },

    #[error("no dataset loaded; call load() first")]
    NotLoaded,

    #[error("buffer {index} has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        index: usize,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("invalid window (width {width}, level {level}): width must be a positive finite number")]
    InvalidWindow { width: f64, level: f64 },

    #[error("channel merge needs at least one buffer")]
    NoChannels,

    #[error("got {found} weight(s) for {expected} buffer(s)")]
    WeightCountMismatch { expected: usize, found: usize },

    #[error("weights must be finite and sum to a non-zero value")]
    InvalidWeights,

    #[error("expected a 2D image or a stack of 2D slices, got {ndim} dimension(s)")]
    UnsupportedDimensions { ndim: usize },

    #[error("pixel array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("unsupported export format {0:?}; use \"json\" or \"xml\"")]
    UnsupportedFormat(String),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML serialization failed: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("malformed protocol document: {0}")]
    MalformedProtocol(String),

    #[error("failed to render image: {0}")]
    Render(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessingError {
    pub(crate) fn invalid_dicom(source_label: impl Into<String>, reason: impl ToString) -> Self {
        ProcessingError::InvalidDicom {
            source_label: source_label.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProcessingError>;
