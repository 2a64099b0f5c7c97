//! # Nomspan: Provider Detection and Schema Normalization for LLM Spans
//!
//! LLM instrumentation libraries emit flat attribute maps with very
//! different key vocabularies. Nomspan recognizes which vocabulary produced
//! a map and rewrites it into one fixed four-section record
//! (`inputs`, `outputs`, `config`, `metadata`).
//!
//! ## Features
//!
//! - **YAML pattern stores**: describe each provider with signatures, navigation rules, field mappings and transforms
//! - **Compiler**: validates a pattern store and emits a deterministic JSON bundle plus metadata
//! - **Closed transform registry**: transforms are parameterizations of a fixed set of operations, never code
//! - **Bundle loader**: explicit production and development modes with an atomically swapped cache
//! - **Fallback bucketing**: unrecognized maps are still normalized, never dropped
//!
//! ## Example: Structure Patterns
//!
//! ```yaml
//! version: 1
//! provider: openinference
//! signatures:
//!   - name: chat
//!     required: [llm.input_messages, llm.output_messages, llm.model_name]
//!     optional: [llm.invocation_parameters]
//!     confidence: 0.95
//! ```
//!
//! ## Example: Navigation Rules and Field Mappings
//!
//! ```yaml
//! version: 1
//! provider: openinference
//! rules:
//!   chat_history:
//!     source: llm.input_messages
//!     validate: array_of_objects
//!     fallback: []
//!   model:
//!     source: [llm.model_name, embedding.model_name]
//!     mode: first_non_null
//!     validate: non_empty_string
//! ```
//!
//! ```yaml
//! version: 1
//! provider: openinference
//! inputs:
//!   chat_history: {rule: chat_history, required: true}
//!   system_prompt: {transform: system_prompt}
//! config:
//!   model: {rule: model}
//! ```
//!
//! ## Example: Transforms
//!
//! ```yaml
//! version: 1
//! provider: openinference
//! transforms:
//!   system_prompt:
//!     implementation: join_messages_by_role
//!     params:
//!       source: llm.input_messages
//!       role: system
//! ```

// Core modules
pub mod error;
pub mod extraction;
pub mod navigation;
pub mod record;
pub mod transform_registry;

// Build-time pattern store compiler
pub mod compiler;

// Bundle loading, detection and extraction
pub mod runtime;

// Re-export key types
pub use error::{
    BundleLoadError, CompileError, CompileErrorKind, ConfigError, EngineError, TransformError,
    UnresolvedTransformError,
};
pub use extraction::{FieldPath, PathSegment};
pub use navigation::{ExtractionMode, NavigationRule, Validation};
pub use record::{Attributes, NormalizedRecord, SectionKind, UNKNOWN_PROVIDER};
pub use transform_registry::{TransformKind, TransformRegistry};

pub use compiler::{compile, compile_at, compile_dir, CompileOptions, CompiledOutput, PatternStore};

// Re-export runtime types
pub use runtime::{
    BundleLoader, BundleMetadata, DetectionMatch, Detector, Extractor, NormalizationEngine,
    NormalizerConfig, ProviderBundle,
};
