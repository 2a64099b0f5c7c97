//! Pattern store validation.
//!
//! Per-provider checks run before a provider is lowered into the bundle.
//! Cross-provider overlap detection runs on the lowered signatures and only
//! produces warnings.

use regex::Regex;
use serde_json::Value as JsonValue;
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

use crate::compiler::types::{
    FieldMappingDef, ProviderPatterns, FIELD_MAPPINGS, NAVIGATION_RULES,
    STRUCTURE_PATTERNS, TRANSFORMS,
};
use crate::error::{CompileError, CompileErrorKind, CompileResult, TransformError};
use crate::navigation::ExtractionMode;
use crate::record::{SectionKind, UNKNOWN_PROVIDER};
use crate::runtime::bundle::{CompiledProvider, SignatureOverlap};
use crate::transform_registry::TransformRegistry;

static PROVIDER_ID: OnceLock<Regex> = OnceLock::new();

pub fn is_valid_provider_id(id: &str) -> bool {
    let re = PROVIDER_ID.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9_-]*$").expect("Invalid regex"));
    id != UNKNOWN_PROVIDER && re.is_match(id)
}

/// Validate one provider's four documents.
pub fn validate_provider(
    provider: &ProviderPatterns,
    min_required_keys: usize,
    registry: &TransformRegistry,
) -> CompileResult<()> {
    let id = provider.id.as_str();

    if !is_valid_provider_id(id) {
        return Err(CompileError::store(
            id,
            CompileErrorKind::InvalidProviderId(id.to_string()),
        ));
    }

    check_header(provider, STRUCTURE_PATTERNS, &provider.structure.version, &provider.structure.provider)?;
    check_header(provider, NAVIGATION_RULES, &provider.navigation.version, &provider.navigation.provider)?;
    check_header(provider, FIELD_MAPPINGS, &provider.mappings.version, &provider.mappings.provider)?;
    check_header(provider, TRANSFORMS, &provider.transforms.version, &provider.transforms.provider)?;

    validate_signatures(provider, min_required_keys)?;
    validate_rules(provider)?;
    validate_transforms(provider, registry)?;
    validate_mappings(provider)?;

    Ok(())
}

fn check_header(
    provider: &ProviderPatterns,
    doc: &str,
    version: &JsonValue,
    declared: &str,
) -> CompileResult<()> {
    let id = provider.id.as_str();
    if version.is_null() {
        return Err(CompileError::new(
            id,
            provider.file_name(doc),
            CompileErrorKind::Malformed("missing 'version'".to_string()),
        ));
    }
    if declared != id {
        return Err(CompileError::new(
            id,
            provider.file_name(doc),
            CompileErrorKind::ProviderMismatch {
                declared: declared.to_string(),
                expected: id.to_string(),
            },
        ));
    }
    Ok(())
}

fn validate_signatures(provider: &ProviderPatterns, min_required_keys: usize) -> CompileResult<()> {
    let error = |kind| CompileError::new(&provider.id, provider.file_name(STRUCTURE_PATTERNS), kind);
    let signatures = &provider.structure.signatures;

    if signatures.is_empty() {
        return Err(error(CompileErrorKind::NoSignatures));
    }

    // An empty required set would match every input.
    let minimum = min_required_keys.max(1);
    let mut seen: HashMap<Vec<&str>, usize> = HashMap::new();

    for (index, signature) in signatures.iter().enumerate() {
        let mut keys = BTreeSet::new();
        for key in &signature.required {
            if key.is_empty() {
                return Err(error(CompileErrorKind::Malformed(format!(
                    "signature {} has an empty required key",
                    index
                ))));
            }
            if !keys.insert(key.as_str()) {
                return Err(error(CompileErrorKind::RepeatedKey {
                    index,
                    key: key.clone(),
                }));
            }
        }

        if keys.len() < minimum {
            return Err(error(CompileErrorKind::SignatureTooSmall {
                index,
                actual: keys.len(),
                minimum,
            }));
        }

        if !(0.0..=1.0).contains(&signature.confidence) {
            return Err(error(CompileErrorKind::ConfidenceOutOfRange {
                index,
                confidence: signature.confidence,
            }));
        }

        let sorted: Vec<&str> = keys.into_iter().collect();
        if let Some(&duplicate_of) = seen.get(&sorted) {
            return Err(error(CompileErrorKind::DuplicateSignature {
                index,
                duplicate_of,
            }));
        }
        seen.insert(sorted, index);
    }

    Ok(())
}

fn validate_rules(provider: &ProviderPatterns) -> CompileResult<()> {
    let error = |kind| CompileError::new(&provider.id, provider.file_name(NAVIGATION_RULES), kind);

    for (name, rule) in &provider.navigation.rules {
        let invalid = |reason: &str| {
            error(CompileErrorKind::InvalidRule {
                rule: name.clone(),
                reason: reason.to_string(),
            })
        };

        let sources = rule.source.keys();
        if sources.is_empty() {
            return Err(invalid("no source keys"));
        }
        if sources.iter().any(String::is_empty) {
            return Err(invalid("empty source key"));
        }
        if rule.mode == ExtractionMode::Direct && sources.len() > 1 {
            return Err(invalid("mode 'direct' takes exactly one source key"));
        }
        if rule.separator.is_some() && rule.mode != ExtractionMode::FlattenJoin {
            return Err(invalid("'separator' only applies to mode 'flatten_join'"));
        }

        if let (Some(fallback), Some(predicate)) = (&rule.fallback, rule.validate) {
            if !fallback.is_null() && !predicate.check(fallback) {
                return Err(error(CompileErrorKind::FallbackFailsValidation {
                    rule: name.clone(),
                    fallback: fallback.to_string(),
                    predicate: predicate.to_string(),
                }));
            }
        }
    }

    Ok(())
}

fn validate_transforms(provider: &ProviderPatterns, registry: &TransformRegistry) -> CompileResult<()> {
    for (name, def) in &provider.transforms.transforms {
        if let Err(e) = registry.prepare(&def.implementation, &def.params) {
            let kind = match e {
                TransformError::NotFound(implementation) => {
                    CompileErrorKind::UnresolvedImplementation {
                        transform: name.clone(),
                        implementation,
                    }
                }
                TransformError::InvalidArgs(reason) => CompileErrorKind::InvalidTransformParams {
                    transform: name.clone(),
                    reason,
                },
            };
            return Err(CompileError::new(&provider.id, provider.file_name(TRANSFORMS), kind));
        }
    }

    Ok(())
}

fn validate_mappings(provider: &ProviderPatterns) -> CompileResult<()> {
    let error = |kind| CompileError::new(&provider.id, provider.file_name(FIELD_MAPPINGS), kind);

    for section in SectionKind::ALL {
        for (field, mapping) in section_defs(provider, section) {
            let section_name = section.as_str().to_string();

            let sources = [
                mapping.rule.is_some(),
                mapping.transform.is_some(),
                mapping.value.is_some(),
            ];
            if sources.iter().filter(|s| **s).count() != 1 {
                return Err(error(CompileErrorKind::AmbiguousMapping {
                    section: section_name,
                    field: field.clone(),
                }));
            }

            if let Some(rule) = &mapping.rule {
                if !provider.navigation.rules.contains_key(rule) {
                    return Err(error(CompileErrorKind::UnknownRule {
                        section: section_name,
                        field: field.clone(),
                        rule: rule.clone(),
                    }));
                }
            }

            if let Some(transform) = &mapping.transform {
                if !provider.transforms.transforms.contains_key(transform) {
                    return Err(error(CompileErrorKind::UnknownTransform {
                        section: section_name,
                        field: field.clone(),
                        transform: transform.clone(),
                    }));
                }
            }
        }
    }

    Ok(())
}

pub(crate) fn section_defs(
    provider: &ProviderPatterns,
    section: SectionKind,
) -> &indexmap::IndexMap<String, FieldMappingDef> {
    match section {
        SectionKind::Inputs => &provider.mappings.inputs,
        SectionKind::Outputs => &provider.mappings.outputs,
        SectionKind::Config => &provider.mappings.config,
        SectionKind::Metadata => &provider.mappings.metadata,
    }
}

/// Every cross-provider signature pair where one required set contains the
/// other. The earlier declared provider is the winner.
pub fn find_overlaps(providers: &[CompiledProvider]) -> Vec<SignatureOverlap> {
    let mut overlaps = Vec::new();

    for (i, earlier) in providers.iter().enumerate() {
        for later in &providers[i + 1..] {
            for a in &earlier.signatures {
                let a_keys: BTreeSet<&str> = a.required.iter().map(String::as_str).collect();
                for b in &later.signatures {
                    let b_keys: BTreeSet<&str> = b.required.iter().map(String::as_str).collect();
                    if a_keys.is_subset(&b_keys) || b_keys.is_subset(&a_keys) {
                        overlaps.push(SignatureOverlap {
                            winner: earlier.id.clone(),
                            winner_signature: a.name.clone(),
                            shadowed: later.id.clone(),
                            shadowed_signature: b.name.clone(),
                        });
                    }
                }
            }
        }
    }

    overlaps
}
