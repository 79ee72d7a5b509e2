//
// session.rs
// Dicom-Harmonize
//
// Processing session: owns the loaded dataset, its resolved adapter and the cached pixels, and sequences the transforms.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::adapter::VendorAdapter;
use crate::config::SessionConfig;
use crate::dataset::Dataset;
use crate::error::{ProcessingError, Result};
use crate::image::ResultVisualizer;
use crate::merge::{self, MergeMode};
use crate::models::PixelBuffer;
use crate::parser::{DatasetParser, DicomFileParser};
use crate::protocol::{self, ExportFormat, ProtocolDescriptor, ProtocolExtractor};
use crate::registry::AdapterRegistry;
use crate::segment::{SegmentationMasks, TissueSegmenter};
use crate::window::{WindowLevelTransform, WindowSettings};

/// Everything derived from one successful load. Replaced as a whole.
#[derive(Debug, Clone)]
pub struct LoadedState {
    pub dataset: Dataset,
    pub adapter: Arc<dyn VendorAdapter>,
    pub pixels: PixelBuffer,
    pub protocol: ProtocolDescriptor,
    pub source: String,
}

/// Most recent derived result, kept only for visualization.
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    Windowed(PixelBuffer),
    Merged(PixelBuffer),
    Segmentation(SegmentationMasks),
}

pub struct ProcessingSession {
    registry: AdapterRegistry,
    parser: Arc<dyn DatasetParser>,
    config: SessionConfig,
    state: Option<LoadedState>,
    last_artifact: Option<Artifact>,
}

impl Default for ProcessingSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl ProcessingSession {
    /// Built-in vendor adapters (plus the fallback if configured) and the DICOM file parser.
    pub fn new(config: SessionConfig) -> Self {
        let registry = config.registry();
        Self::with_registry(registry, config)
    }

    pub fn with_registry(registry: AdapterRegistry, config: SessionConfig) -> Self {
        Self {
            registry,
            parser: Arc::new(DicomFileParser),
            config,
            state: None,
            last_artifact: None,
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn DatasetParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Parse `path` and make it the active dataset. On failure the previous
    /// dataset, if any, stays loaded.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let dataset = self.parser.parse(path)?;
        self.load_dataset(dataset, path.display().to_string())
    }

    /// Same as [`load`](Self::load) for a dataset parsed elsewhere.
    pub fn load_dataset(&mut self, dataset: Dataset, source: impl Into<String>) -> Result<()> {
        let source = source.into();
        let adapter = self.registry.resolve(&dataset)?;
        let pixels = adapter.get_pixel_data(&dataset)?;
        let protocol = ProtocolExtractor::extract(&dataset, adapter.as_ref());

        info!(
            source = %source,
            adapter = adapter.name(),
            shape = ?pixels.shape(),
            parameters = protocol.len(),
            "dataset loaded"
        );

        self.state = Some(LoadedState {
            dataset,
            adapter,
            pixels,
            protocol,
            source,
        });
        self.last_artifact = None;
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.state.is_some()
    }

    pub fn state(&self) -> Option<&LoadedState> {
        self.state.as_ref()
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.state.as_ref().map(|s| &s.dataset)
    }

    pub fn adapter_name(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.adapter.name())
    }

    pub fn protocol(&self) -> Option<&ProtocolDescriptor> {
        self.state.as_ref().map(|s| &s.protocol)
    }

    pub fn pixel_data(&self) -> Option<&PixelBuffer> {
        self.state.as_ref().map(|s| &s.pixels)
    }

    pub fn source(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.source.as_str())
    }

    pub fn last_artifact(&self) -> Option<&Artifact> {
        self.last_artifact.as_ref()
    }

    /// Serialized protocol of the loaded dataset.
    pub fn get_protocol_info(&self, format: ExportFormat) -> Result<String> {
        let state = self.loaded()?;
        protocol::serialize(&state.protocol, format)
    }

    /// Window the cached pixels. The cache itself is never modified.
    pub fn adjust_window(&mut self, width: f64, level: f64) -> Result<PixelBuffer> {
        let state = self.loaded()?;
        let windowed =
            WindowLevelTransform::new(self.config.display_range).apply(&state.pixels, width, level)?;
        self.last_artifact = Some(Artifact::Windowed(windowed.clone()));
        Ok(windowed)
    }

    /// Merge the cached pixels (channel 0) with `others`.
    pub fn merge_channels(
        &mut self,
        others: &[PixelBuffer],
        mode: MergeMode,
        weights: Option<&[f32]>,
    ) -> Result<PixelBuffer> {
        let merged = {
            let state = self.loaded()?;
            let channels: Vec<&PixelBuffer> =
                std::iter::once(&state.pixels).chain(others).collect();
            merge::merge(&channels, mode, weights)?
        };
        self.last_artifact = Some(Artifact::Merged(merged.clone()));
        Ok(merged)
    }

    /// Window the cached pixels for brain tissue, then split gray and white matter.
    pub fn segment_gray_white_matter(&mut self) -> Result<SegmentationMasks> {
        let state = self.loaded()?;
        let windowed = match self.segmentation_window(state) {
            Some(window) => WindowLevelTransform::new(self.config.display_range).apply(
                &state.pixels,
                window.width,
                window.level,
            )?,
            None => state.pixels.clone(),
        };
        let masks = TissueSegmenter::new(self.config.segmentation).segment(&windowed)?;
        debug!(
            gray = masks.gray_count(),
            white = masks.white_count(),
            "segmentation finished"
        );
        self.last_artifact = Some(Artifact::Segmentation(masks.clone()));
        Ok(masks)
    }

    /// Configured window, else the dataset's own, else the full pixel range.
    fn segmentation_window(&self, state: &LoadedState) -> Option<WindowSettings> {
        if let Some(window) = self.config.default_window {
            return Some(window);
        }

        let dataset_window = state
            .dataset
            .number("WindowWidth")
            .zip(state.dataset.number("WindowCenter"))
            .map(|(width, level)| WindowSettings::new(width, level))
            .filter(|w| w.validate().is_ok());
        if dataset_window.is_some() {
            return dataset_window;
        }

        let (lo, hi) = state.pixels.finite_range()?;
        let (lo, hi) = (f64::from(lo), f64::from(hi));
        (hi > lo).then(|| WindowSettings::new(hi - lo, (lo + hi) / 2.0))
    }

    /// Adds an adapter for later loads; the current dataset keeps its adapter.
    pub fn register_adapter(&mut self, adapter: Arc<dyn VendorAdapter>) {
        self.registry.register_shared(adapter);
    }

    pub fn visualize_results(&self, visualizer: &dyn ResultVisualizer) -> Result<()> {
        let state = self.loaded()?;
        visualizer.present(&state.pixels, self.last_artifact.as_ref())
    }

    fn loaded(&self) -> Result<&LoadedState> {
        self.state.as_ref().ok_or(ProcessingError::NotLoaded)
    }
}
