//! Error taxonomy for the compiler, the bundle loader and the extractor.
//!
//! Field-level extraction anomalies and detection misses are deliberately
//! absent: they resolve to fallbacks and never surface as errors.

use std::path::PathBuf;
use thiserror::Error;

/// Scope used in [`CompileError`] for problems that belong to the store as a
/// whole rather than to one provider.
pub const STORE_SCOPE: &str = "*";

/// Build-time failure, always attributed to a provider and a file.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{provider}/{file}: {kind}")]
pub struct CompileError {
    pub provider: String,
    pub file: String,
    pub kind: CompileErrorKind,
}

impl CompileError {
    pub fn new(provider: impl Into<String>, file: impl Into<String>, kind: CompileErrorKind) -> Self {
        Self {
            provider: provider.into(),
            file: file.into(),
            kind,
        }
    }

    pub fn store(file: impl Into<String>, kind: CompileErrorKind) -> Self {
        Self::new(STORE_SCOPE, file, kind)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompileErrorKind {
    #[error("required file is missing")]
    MissingFile,

    #[error("cannot read: {0}")]
    Io(String),

    #[error("malformed document: {0}")]
    Malformed(String),

    #[error("document declares provider '{declared}' but lives under '{expected}'")]
    ProviderMismatch { declared: String, expected: String },

    #[error("invalid provider identifier '{0}'")]
    InvalidProviderId(String),

    #[error("provider '{0}' is declared more than once")]
    DuplicateProvider(String),

    #[error("provider '{0}' is listed in the manifest but has no directory")]
    UndeclaredDirectory(String),

    #[error("provider directory '{0}' is not listed in the manifest")]
    UnlistedDirectory(String),

    #[error("provider declares no signatures")]
    NoSignatures,

    #[error("signature {index} requires {actual} keys, minimum is {minimum}")]
    SignatureTooSmall {
        index: usize,
        actual: usize,
        minimum: usize,
    },

    #[error("signature {index} repeats required key '{key}'")]
    RepeatedKey { index: usize, key: String },

    #[error("signature {index} has the same required keys as signature {duplicate_of}")]
    DuplicateSignature { index: usize, duplicate_of: usize },

    #[error("signature {index} confidence {confidence} is outside [0, 1]")]
    ConfidenceOutOfRange { index: usize, confidence: f64 },

    #[error("navigation rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("navigation rule '{rule}' fallback {fallback} fails validation '{predicate}'")]
    FallbackFailsValidation {
        rule: String,
        fallback: String,
        predicate: String,
    },

    #[error("field '{section}.{field}' references unknown navigation rule '{rule}'")]
    UnknownRule {
        section: String,
        field: String,
        rule: String,
    },

    #[error("field '{section}.{field}' references unknown transform '{transform}'")]
    UnknownTransform {
        section: String,
        field: String,
        transform: String,
    },

    #[error("field '{section}.{field}' must name exactly one of rule, transform or value")]
    AmbiguousMapping { section: String, field: String },

    #[error("transform '{transform}' uses unknown implementation '{implementation}'")]
    UnresolvedImplementation {
        transform: String,
        implementation: String,
    },

    #[error("transform '{transform}': {reason}")]
    InvalidTransformParams { transform: String, reason: String },

    #[error("cannot write artifact: {0}")]
    Write(String),
}

/// Errors raised while executing or preparing a transform.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransformError {
    #[error("transform implementation not found: {0}")]
    NotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
}

/// A bundle references a transform the running registry cannot provide.
///
/// This is a build/deploy consistency bug and is fatal.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("provider '{provider}' transform '{transform}' cannot be resolved: {source}")]
pub struct UnresolvedTransformError {
    pub provider: String,
    pub transform: String,
    #[source]
    pub source: TransformError,
}

/// Failure to obtain a usable bundle at engine startup or reload.
#[derive(Debug, Error)]
pub enum BundleLoadError {
    #[error("bundle not found at {0}")]
    Missing(PathBuf),

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bundle at {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("bundle format version {found} is not supported (expected {expected})")]
    Incompatible { found: u32, expected: u32 },

    #[error("recompiling pattern store failed: {0}")]
    Compile(#[from] CompileError),
}

/// Failure to read a `nomspan.yaml` configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Engine startup or reload failure.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Load(#[from] BundleLoadError),

    #[error(transparent)]
    Transform(#[from] UnresolvedTransformError),
}

pub type CompileResult<T> = std::result::Result<T, CompileError>;
