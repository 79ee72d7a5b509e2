//
// lib.rs
// Dicom-Harmonize
//
// Exposes the engine modules and re-exports the session API and the CLI entry point.
//
// Thales Matheus Mendonça Santos - November 2025

// Engine: adapters, registry, protocol normalization and pixel transforms.
pub mod adapter;
pub mod config;
pub mod dataset;
pub mod error;
pub mod merge;
pub mod normalize;
pub mod protocol;
pub mod registry;
pub mod segment;
pub mod session;
pub mod vendors;
pub mod window;

// Collaborators and front ends.
pub mod batch;
pub mod cli;
pub mod dicom_access;
pub mod image;
pub mod json;
pub mod models;
pub mod parser;
pub mod stats;
pub mod xml;

pub use adapter::VendorAdapter;
pub use cli::{run as run_cli, Cli, Commands};
pub use config::SessionConfig;
pub use dataset::{AttributeValue, Dataset};
pub use error::{ProcessingError, Result};
pub use merge::MergeMode;
pub use models::PixelBuffer;
pub use protocol::{ExportFormat, ProtocolDescriptor, ProtocolParameter};
pub use registry::AdapterRegistry;
pub use segment::{SegmentationMasks, SegmentationOptions};
pub use session::{Artifact, ProcessingSession};
pub use vendors::{BuiltinAdapter, CustomAdapter, GenericAdapter, Vendor};
pub use window::{DisplayRange, WindowSettings};
