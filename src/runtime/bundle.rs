//! The compiled provider bundle and its metadata document.
//!
//! A bundle is self-contained: every navigation rule is inlined into the
//! mapping that uses it and every transform carries its parameters, so the
//! runtime never looks back at the pattern store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::navigation::NavigationRule;
use crate::record::SectionKind;
use crate::transform_registry::TransformParams;

/// Bundle layout version understood by this runtime.
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

/// File name of the serialized bundle inside a bundle directory.
pub const BUNDLE_FILE: &str = "bundle.json";

/// File name of the metadata document inside a bundle directory.
pub const META_FILE: &str = "bundle.meta.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderBundle {
    pub format_version: u32,
    pub min_required_keys: usize,
    /// Providers in declaration order
    pub providers: Vec<CompiledProvider>,
    /// Cross-provider signature overlaps found at compile time
    #[serde(default)]
    pub overlaps: Vec<SignatureOverlap>,
}

impl ProviderBundle {
    pub fn provider_ids(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.id.as_str()).collect()
    }

    pub fn signature_count(&self) -> usize {
        self.providers.iter().map(|p| p.signatures.len()).sum()
    }

    /// Canonical serialized form. Identical bundles produce identical bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledProvider {
    pub id: String,
    pub signatures: Vec<CompiledSignature>,
    pub mappings: SectionMappings,
    #[serde(default)]
    pub transforms: BTreeMap<String, CompiledTransform>,
}

impl CompiledProvider {
    pub fn mapping_count(&self) -> usize {
        SectionKind::ALL
            .iter()
            .map(|kind| self.mappings.section(*kind).len())
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledSignature {
    pub name: String,
    /// Sorted, de-duplicated
    pub required: Vec<String>,
    /// Sorted, de-duplicated
    #[serde(default)]
    pub optional: Vec<String>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Field mappings grouped by output section, each in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionMappings {
    #[serde(default)]
    pub inputs: Vec<CompiledMapping>,
    #[serde(default)]
    pub outputs: Vec<CompiledMapping>,
    #[serde(default)]
    pub config: Vec<CompiledMapping>,
    #[serde(default)]
    pub metadata: Vec<CompiledMapping>,
}

impl SectionMappings {
    pub fn section(&self, kind: SectionKind) -> &[CompiledMapping] {
        match kind {
            SectionKind::Inputs => &self.inputs,
            SectionKind::Outputs => &self.outputs,
            SectionKind::Config => &self.config,
            SectionKind::Metadata => &self.metadata,
        }
    }

    pub fn section_mut(&mut self, kind: SectionKind) -> &mut Vec<CompiledMapping> {
        match kind {
            SectionKind::Inputs => &mut self.inputs,
            SectionKind::Outputs => &mut self.outputs,
            SectionKind::Config => &mut self.config,
            SectionKind::Metadata => &mut self.metadata,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledMapping {
    pub field: String,
    pub required: bool,
    pub source: MappingSource,
}

/// Where a destination field gets its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MappingSource {
    /// Inlined navigation rule; `name` is kept for diagnostics
    Rule {
        name: String,
        rule: NavigationRule,
    },
    /// Reference into the provider's `transforms` table
    Transform { name: String },
    Literal { value: JsonValue },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledTransform {
    pub implementation: String,
    #[serde(default)]
    pub params: TransformParams,
    /// Value used when the transform produces nothing
    #[serde(default)]
    pub fallback: JsonValue,
}

/// Two providers whose signatures can match the same input. The earlier
/// declared provider always wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureOverlap {
    pub winner: String,
    pub winner_signature: String,
    pub shadowed: String,
    pub shadowed_signature: String,
}

/// Sibling metadata document used for cache invalidation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub format_version: u32,
    pub build_timestamp: DateTime<Utc>,
    /// SHA-256 hex digest of the bundle bytes
    pub content_hash: String,
    pub providers: Vec<ProviderCounts>,
    #[serde(default)]
    pub overlap_warnings: usize,
}

impl BundleMetadata {
    pub fn for_bundle(bundle: &ProviderBundle, bytes: &[u8], build_timestamp: DateTime<Utc>) -> Self {
        Self {
            format_version: bundle.format_version,
            build_timestamp,
            content_hash: content_hash(bytes),
            providers: bundle.providers.iter().map(ProviderCounts::of).collect(),
            overlap_warnings: bundle.overlaps.len(),
        }
    }

    /// Does `bytes` hash to the recorded content hash?
    pub fn matches(&self, bytes: &[u8]) -> bool {
        self.content_hash == content_hash(bytes)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCounts {
    pub provider: String,
    pub signatures: usize,
    pub mappings: usize,
    pub transforms: usize,
}

impl ProviderCounts {
    fn of(provider: &CompiledProvider) -> Self {
        Self {
            provider: provider.id.clone(),
            signatures: provider.signatures.len(),
            mappings: provider.mapping_count(),
            transforms: provider.transforms.len(),
        }
    }
}

/// SHA-256 hex digest.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
