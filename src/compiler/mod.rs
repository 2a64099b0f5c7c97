//! Build-time compiler: pattern store in, provider bundle out.
//!
//! The compiler loads the human-authored YAML documents, validates them,
//! lowers each provider into its compiled form and serializes the result
//! together with a metadata document used for cache invalidation.
//!
//! Compilation is deterministic: the same pattern store always yields
//! byte-identical bundle bytes. Only the metadata timestamp differs between
//! runs.

pub mod fs_utils;
pub mod loader;
pub mod types;
pub mod validate;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::{CompileError, CompileErrorKind, CompileResult};
use crate::navigation::NavigationRule;
use crate::record::{SectionKind, PROVIDER_FIELD};
use crate::runtime::bundle::{
    BundleMetadata, CompiledMapping, CompiledProvider, CompiledSignature, CompiledTransform,
    MappingSource, ProviderBundle, SectionMappings, SignatureOverlap, BUNDLE_FILE,
    BUNDLE_FORMAT_VERSION, META_FILE,
};
use crate::transform_registry::TransformRegistry;

pub use loader::{load_pattern_store, newest_modification};
pub use types::PatternStore;
pub use validate::{find_overlaps, is_valid_provider_id, validate_provider};

/// Settings that influence compilation.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Registry transform implementations are checked against
    pub registry: TransformRegistry,
}

/// The two compiled artifacts, in memory.
#[derive(Debug, Clone)]
pub struct CompiledOutput {
    pub bundle: ProviderBundle,
    pub bundle_bytes: Vec<u8>,
    pub metadata: BundleMetadata,
}

impl CompiledOutput {
    /// Overlap warnings recorded during compilation.
    pub fn warnings(&self) -> &[SignatureOverlap] {
        &self.bundle.overlaps
    }

    /// Write `bundle.json` and `bundle.meta.json` into `dir`, creating it.
    ///
    /// The bundle is written before its metadata so a reader that sees new
    /// metadata also sees the bundle it describes.
    pub fn write_to<P: AsRef<Path>>(&self, dir: P) -> CompileResult<()> {
        let dir = dir.as_ref();
        let meta_bytes = self
            .metadata
            .to_bytes()
            .map_err(|e| CompileError::store(META_FILE, CompileErrorKind::Write(e.to_string())))?;

        fs_utils::write_file_atomic(dir.join(BUNDLE_FILE), &self.bundle_bytes)
            .map_err(|e| CompileError::store(BUNDLE_FILE, CompileErrorKind::Write(e.to_string())))?;
        fs_utils::write_file_atomic(dir.join(META_FILE), &meta_bytes)
            .map_err(|e| CompileError::store(META_FILE, CompileErrorKind::Write(e.to_string())))?;

        tracing::info!(dir = %dir.display(), "Wrote compiled bundle");
        Ok(())
    }
}

/// Load and compile the pattern store at `root`.
///
/// The build timestamp is taken before any file is read, so an edit made
/// while compiling is newer than the bundle it missed.
pub fn compile_dir<P: AsRef<Path>>(root: P, options: &CompileOptions) -> CompileResult<CompiledOutput> {
    let started = Utc::now();
    let store = load_pattern_store(root)?;
    compile_at(&store, options, started)
}

/// Validate a pattern store and produce the compiled bundle plus metadata.
pub fn compile(store: &PatternStore, options: &CompileOptions) -> CompileResult<CompiledOutput> {
    compile_at(store, options, Utc::now())
}

/// [`compile`] with an explicit build timestamp for the metadata.
pub fn compile_at(
    store: &PatternStore,
    options: &CompileOptions,
    build_timestamp: DateTime<Utc>,
) -> CompileResult<CompiledOutput> {
    let mut seen = BTreeSet::new();
    let mut providers = Vec::with_capacity(store.providers.len());

    for patterns in &store.providers {
        if !seen.insert(patterns.id.as_str()) {
            return Err(CompileError::store(
                &patterns.id,
                CompileErrorKind::DuplicateProvider(patterns.id.clone()),
            ));
        }
        validate_provider(patterns, store.min_required_keys, &options.registry)?;
        providers.push(lower_provider(patterns));
    }

    let overlaps = find_overlaps(&providers);
    for overlap in &overlaps {
        tracing::warn!(
            winner = %overlap.winner,
            winner_signature = %overlap.winner_signature,
            shadowed = %overlap.shadowed,
            shadowed_signature = %overlap.shadowed_signature,
            "Ambiguous signatures across providers; declaration order decides"
        );
    }

    let bundle = ProviderBundle {
        format_version: BUNDLE_FORMAT_VERSION,
        min_required_keys: store.min_required_keys,
        providers,
        overlaps,
    };

    let bundle_bytes = bundle
        .to_bytes()
        .map_err(|e| CompileError::store(BUNDLE_FILE, CompileErrorKind::Write(e.to_string())))?;
    let metadata = BundleMetadata::for_bundle(&bundle, &bundle_bytes, build_timestamp);

    tracing::info!(
        providers = bundle.providers.len(),
        signatures = bundle.signature_count(),
        overlaps = bundle.overlaps.len(),
        "Compiled pattern store"
    );

    Ok(CompiledOutput {
        bundle,
        bundle_bytes,
        metadata,
    })
}

/// Lower a validated provider into its self-contained compiled form.
fn lower_provider(patterns: &types::ProviderPatterns) -> CompiledProvider {
    let signatures = patterns
        .structure
        .signatures
        .iter()
        .enumerate()
        .map(|(index, def)| CompiledSignature {
            name: def
                .name
                .clone()
                .unwrap_or_else(|| format!("{}#{}", patterns.id, index)),
            required: sorted_unique(&def.required),
            optional: sorted_unique(&def.optional),
            confidence: def.confidence,
            description: def.description.trim().to_string(),
        })
        .collect();

    let mut mappings = SectionMappings::default();
    for section in SectionKind::ALL {
        let lowered = mappings.section_mut(section);
        for (field, def) in validate::section_defs(patterns, section) {
            let Some(source) = lower_source(patterns, def) else {
                continue;
            };
            let pinned = section == SectionKind::Metadata && field == PROVIDER_FIELD;
            lowered.push(CompiledMapping {
                field: field.clone(),
                required: def.required || pinned,
                source,
            });
        }
    }

    let has_provider = mappings
        .metadata
        .iter()
        .any(|m| m.field == PROVIDER_FIELD);
    if !has_provider {
        mappings.metadata.insert(
            0,
            CompiledMapping {
                field: PROVIDER_FIELD.to_string(),
                required: true,
                source: MappingSource::Literal {
                    value: JsonValue::String(patterns.id.clone()),
                },
            },
        );
    }

    let transforms: BTreeMap<String, CompiledTransform> = patterns
        .transforms
        .transforms
        .iter()
        .map(|(name, def)| {
            (
                name.clone(),
                CompiledTransform {
                    implementation: def.implementation.clone(),
                    params: def.params.clone(),
                    fallback: def.fallback.clone().unwrap_or(JsonValue::Null),
                },
            )
        })
        .collect();

    CompiledProvider {
        id: patterns.id.clone(),
        signatures,
        mappings,
        transforms,
    }
}

fn lower_source(patterns: &types::ProviderPatterns, def: &types::FieldMappingDef) -> Option<MappingSource> {
    if let Some(name) = &def.rule {
        let rule = patterns.navigation.rules.get(name)?;
        return Some(MappingSource::Rule {
            name: name.clone(),
            rule: NavigationRule {
                sources: rule.source.keys(),
                mode: rule.mode,
                path: rule.path.clone(),
                separator: rule.separator.clone(),
                fallback: rule.fallback.clone().unwrap_or(JsonValue::Null),
                validate: rule.validate,
            },
        });
    }
    if let Some(name) = &def.transform {
        return Some(MappingSource::Transform { name: name.clone() });
    }
    def.value
        .clone()
        .map(|value| MappingSource::Literal { value })
}

fn sorted_unique(keys: &[String]) -> Vec<String> {
    keys.iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
