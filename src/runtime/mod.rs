//! Runtime for compiled provider bundles.
//!
//! This module loads bundles, detects the provider behind an attribute map
//! and extracts the normalized record.

pub mod bundle;
pub mod config;
pub mod detector;
pub mod engine;
pub mod extractor;
pub mod fallback;
pub mod loader;

// Re-export key types
pub use bundle::{BundleMetadata, ProviderBundle, BUNDLE_FILE, BUNDLE_FORMAT_VERSION, META_FILE};
pub use config::NormalizerConfig;
pub use detector::{DetectionMatch, Detector};
pub use engine::{EngineState, NormalizationEngine};
pub use extractor::Extractor;
pub use fallback::{bucket_for_key, fallback_extract};
pub use loader::BundleLoader;
