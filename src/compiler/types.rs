//! Type definitions for pattern store documents.
//!
//! These types represent the human-authored YAML files and are only used
//! by the compiler. The runtime works exclusively on the compiled bundle.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::navigation::{ExtractionMode, Validation};
use crate::transform_registry::TransformParams;

pub const MANIFEST: &str = "manifest";
pub const STRUCTURE_PATTERNS: &str = "structure_patterns";
pub const NAVIGATION_RULES: &str = "navigation_rules";
pub const FIELD_MAPPINGS: &str = "field_mappings";
pub const TRANSFORMS: &str = "transforms";

/// The four documents every provider directory must supply.
pub const PROVIDER_DOCUMENTS: [&str; 4] =
    [STRUCTURE_PATTERNS, NAVIGATION_RULES, FIELD_MAPPINGS, TRANSFORMS];

pub const DEFAULT_MIN_REQUIRED_KEYS: usize = 2;

fn default_min_required_keys() -> usize {
    DEFAULT_MIN_REQUIRED_KEYS
}

fn default_confidence() -> f64 {
    1.0
}

/// Canonical file name of a document, used in error reports.
pub fn document_file(doc: &str) -> String {
    format!("{}.yaml", doc)
}

/// Optional store-level manifest (`manifest.yaml`)
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub version: JsonValue,
    #[serde(default = "default_min_required_keys")]
    pub min_required_keys: usize,
    /// Provider declaration order
    #[serde(default)]
    pub providers: Vec<String>,
}

/// `structure_patterns.yaml`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StructurePatterns {
    pub version: JsonValue,
    pub provider: String,
    #[serde(default)]
    pub signatures: Vec<SignatureDef>,
}

/// One attribute-key shape that identifies a provider
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SignatureDef {
    #[serde(default)]
    pub name: Option<String>,
    pub required: Vec<String>,
    #[serde(default)]
    pub optional: Vec<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub description: String,
}

/// `navigation_rules.yaml`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NavigationRules {
    pub version: JsonValue,
    pub provider: String,
    #[serde(default)]
    pub rules: IndexMap<String, NavigationRuleDef>,
}

/// A single key or an ordered list of candidate keys
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum KeySource {
    One(String),
    Many(Vec<String>),
}

impl KeySource {
    pub fn keys(&self) -> Vec<String> {
        match self {
            KeySource::One(key) => vec![key.clone()],
            KeySource::Many(keys) => keys.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NavigationRuleDef {
    pub source: KeySource,
    #[serde(default)]
    pub mode: ExtractionMode,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub separator: Option<String>,
    #[serde(default)]
    pub fallback: Option<JsonValue>,
    #[serde(default)]
    pub validate: Option<Validation>,
}

/// `field_mappings.yaml`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FieldMappings {
    pub version: JsonValue,
    pub provider: String,
    #[serde(default)]
    pub inputs: IndexMap<String, FieldMappingDef>,
    #[serde(default)]
    pub outputs: IndexMap<String, FieldMappingDef>,
    #[serde(default)]
    pub config: IndexMap<String, FieldMappingDef>,
    #[serde(default)]
    pub metadata: IndexMap<String, FieldMappingDef>,
}

/// Destination field sourced from a rule, a transform, or a literal value
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FieldMappingDef {
    #[serde(default)]
    pub rule: Option<String>,
    #[serde(default)]
    pub transform: Option<String>,
    #[serde(default)]
    pub value: Option<JsonValue>,
    #[serde(default)]
    pub required: bool,
}

/// `transforms.yaml`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Transforms {
    pub version: JsonValue,
    pub provider: String,
    #[serde(default)]
    pub transforms: IndexMap<String, TransformDef>,
}

/// Named parameterization of a registry transform
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TransformDef {
    pub implementation: String,
    #[serde(default)]
    pub params: TransformParams,
    #[serde(default)]
    pub fallback: Option<JsonValue>,
    #[serde(default)]
    pub doc: Option<String>,
}

/// All four documents of one provider
#[derive(Debug, Clone)]
pub struct ProviderPatterns {
    pub id: String,
    pub structure: StructurePatterns,
    pub navigation: NavigationRules,
    pub mappings: FieldMappings,
    pub transforms: Transforms,
    /// File each document was read from, keyed by document name.
    /// Documents built in memory fall back to the `.yaml` name.
    pub files: BTreeMap<String, String>,
}

impl ProviderPatterns {
    /// File name to report for `doc` in errors.
    pub fn file_name(&self, doc: &str) -> String {
        self.files
            .get(doc)
            .cloned()
            .unwrap_or_else(|| document_file(doc))
    }
}

/// A loaded pattern store, providers in declaration order
#[derive(Debug, Clone)]
pub struct PatternStore {
    pub root: Option<PathBuf>,
    pub min_required_keys: usize,
    pub providers: Vec<ProviderPatterns>,
}

impl PatternStore {
    pub fn new(providers: Vec<ProviderPatterns>) -> Self {
        Self {
            root: None,
            min_required_keys: DEFAULT_MIN_REQUIRED_KEYS,
            providers,
        }
    }

    pub fn provider_ids(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.id.as_str()).collect()
    }
}
