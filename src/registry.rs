//
// registry.rs
// Dicom-Harmonize
//
// Ordered adapter registry: first compatible adapter in registration order wins.
//
// Thales Matheus Mendonça Santos - November 2025

use std::sync::Arc;

use tracing::debug;

use crate::adapter::VendorAdapter;
use crate::dataset::Dataset;
use crate::error::{ProcessingError, Result};
use crate::vendors::{BuiltinAdapter, GenericAdapter, Vendor};

#[derive(Debug, Clone, Default)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn VendorAdapter>>,
}

impl AdapterRegistry {
    /// Empty registry; nothing resolves until adapters are registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Siemens, GE, Philips and United Imaging, in that order. No fallback.
    pub fn with_builtin_vendors() -> Self {
        let mut registry = Self::new();
        for vendor in Vendor::ALL {
            registry.register(BuiltinAdapter::new(vendor));
        }
        registry
    }

    /// Append the always-compatible generic adapter.
    pub fn with_fallback(mut self) -> Self {
        self.register(GenericAdapter);
        self
    }

    pub fn register<A: VendorAdapter + 'static>(&mut self, adapter: A) {
        self.register_shared(Arc::new(adapter));
    }

    /// Append an adapter that may already be shared with other registries.
    /// Duplicates are kept; earlier entries keep precedence.
    pub fn register_shared(&mut self, adapter: Arc<dyn VendorAdapter>) {
        debug!(adapter = adapter.name(), position = self.adapters.len(), "registered adapter");
        self.adapters.push(adapter);
    }

    pub fn resolve(&self, dataset: &Dataset) -> Result<Arc<dyn VendorAdapter>> {
        let found = self
            .adapters
            .iter()
            .find(|adapter| adapter.is_compatible(dataset))
            .cloned();

        match found {
            Some(adapter) => {
                debug!(adapter = adapter.name(), "resolved adapter");
                Ok(adapter)
            }
            None => Err(ProcessingError::UnsupportedVendor {
                manufacturer: dataset.manufacturer(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.name().to_string()).collect()
    }
}
