//! Normalization engine: detection, extraction and fallback in one call.
//!
//! The engine owns an immutable [`EngineState`] (bundle, detector and
//! prepared extractor) behind an `Arc`. `normalize` clones the `Arc` and
//! releases the lock before doing any work, so swapping in a new bundle
//! never blocks on, or tears, an in-flight call.
//!
//! # Example
//!
//! ```ignore
//! use nomspan::{BundleLoader, NormalizationEngine, NormalizerConfig};
//!
//! let loader = BundleLoader::new(NormalizerConfig::production("build/bundle"));
//! let engine = NormalizationEngine::from_loader(&loader)?;
//! let record = engine.normalize(&attributes);
//! ```

use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use std::sync::Arc;

use crate::error::{EngineError, UnresolvedTransformError};
use crate::record::{Attributes, NormalizedRecord, UNKNOWN_PROVIDER};
use crate::runtime::bundle::ProviderBundle;
use crate::runtime::detector::{DetectionMatch, Detector};
use crate::runtime::extractor::Extractor;
use crate::runtime::fallback::fallback_extract;
use crate::runtime::loader::BundleLoader;
use crate::transform_registry::TransformRegistry;

/// Everything derived from one bundle.
#[derive(Debug)]
pub struct EngineState {
    pub bundle: Arc<ProviderBundle>,
    pub detector: Detector,
    pub extractor: Extractor,
}

impl EngineState {
    pub fn build(
        bundle: Arc<ProviderBundle>,
        registry: &TransformRegistry,
    ) -> Result<Self, UnresolvedTransformError> {
        let extractor = Extractor::build(&bundle, registry)?;
        let detector = Detector::new(&bundle);
        Ok(Self {
            bundle,
            detector,
            extractor,
        })
    }

    pub fn normalize(&self, attributes: &Attributes) -> NormalizedRecord {
        let provider = self.detector.detect(attributes);
        if provider == UNKNOWN_PROVIDER {
            return fallback_extract(attributes);
        }

        self.extractor
            .extract(provider, attributes)
            .unwrap_or_else(|| fallback_extract(attributes))
    }
}

pub struct NormalizationEngine {
    registry: TransformRegistry,
    state: RwLock<Arc<EngineState>>,
}

impl NormalizationEngine {
    /// Build an engine, resolving every transform of `bundle` in `registry`.
    pub fn new(
        bundle: Arc<ProviderBundle>,
        registry: TransformRegistry,
    ) -> Result<Self, UnresolvedTransformError> {
        let state = EngineState::build(bundle, &registry)?;
        tracing::info!(
            providers = state.bundle.providers.len(),
            signatures = state.detector.signature_count(),
            "Normalization engine ready"
        );
        Ok(Self {
            registry,
            state: RwLock::new(Arc::new(state)),
        })
    }

    /// Load through `loader` and build with the built-in registry.
    pub fn from_loader(loader: &BundleLoader) -> Result<Self, EngineError> {
        Self::from_loader_with_registry(loader, TransformRegistry::builtin())
    }

    pub fn from_loader_with_registry(
        loader: &BundleLoader,
        registry: TransformRegistry,
    ) -> Result<Self, EngineError> {
        let bundle = loader.load()?;
        Ok(Self::new(bundle, registry)?)
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> Arc<EngineState> {
        Arc::clone(&*self.state.read())
    }

    pub fn bundle(&self) -> Arc<ProviderBundle> {
        Arc::clone(&self.state().bundle)
    }

    /// Normalize one attribute map. Never fails.
    pub fn normalize(&self, attributes: &Attributes) -> NormalizedRecord {
        self.state().normalize(attributes)
    }

    /// Normalize a JSON object of attributes. Anything other than an object
    /// is treated as an empty map.
    pub fn normalize_value(&self, value: &JsonValue) -> NormalizedRecord {
        let attributes: Attributes = match value {
            JsonValue::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            _ => Attributes::new(),
        };
        self.normalize(&attributes)
    }

    /// Detected provider identifier, or `"unknown"`.
    pub fn detect(&self, attributes: &Attributes) -> String {
        self.state().detector.detect(attributes).to_string()
    }

    pub fn detect_match(&self, attributes: &Attributes) -> Option<DetectionMatch> {
        self.state().detector.detect_match(attributes)
    }

    /// Replace the bundle. The new state is built completely before the
    /// swap; on error the current bundle stays active.
    pub fn swap_bundle(&self, bundle: Arc<ProviderBundle>) -> Result<(), UnresolvedTransformError> {
        let state = Arc::new(EngineState::build(bundle, &self.registry)?);
        *self.state.write() = state;
        tracing::info!("Swapped provider bundle");
        Ok(())
    }

    /// Reload through `loader` and swap in the result.
    pub fn reload(&self, loader: &BundleLoader) -> Result<(), EngineError> {
        let bundle = loader.reload()?;
        self.swap_bundle(bundle)?;
        Ok(())
    }
}
