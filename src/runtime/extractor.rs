//! Per-provider extraction into the four-section record.
//!
//! Building an [`Extractor`] resolves every transform named by the bundle
//! against the registry and parses its parameters. Extraction itself then
//! has no failure path: anomalies resolve to declared fallbacks.

use serde_json::Value as JsonValue;
use std::collections::HashMap;

use crate::error::{TransformError, UnresolvedTransformError};
use crate::extraction::FieldPath;
use crate::navigation::{FallbackReason, NavigationRule};
use crate::record::{Attributes, NormalizedRecord, SectionKind};
use crate::runtime::bundle::{CompiledProvider, MappingSource, ProviderBundle};
use crate::transform_registry::{TransformOp, TransformRegistry};

#[derive(Debug, Clone)]
enum FieldSource {
    Rule {
        rule: NavigationRule,
        path: Option<FieldPath>,
    },
    Transform {
        name: String,
        op: TransformOp,
        fallback: JsonValue,
    },
    Literal(JsonValue),
}

#[derive(Debug, Clone)]
struct FieldPlan {
    section: SectionKind,
    field: String,
    required: bool,
    source: FieldSource,
}

#[derive(Debug, Clone)]
struct ProviderPlan {
    fields: Vec<FieldPlan>,
}

/// Extraction plans for every provider of one bundle.
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    plans: HashMap<String, ProviderPlan>,
}

impl Extractor {
    /// Prepare plans for `bundle`, resolving transforms against `registry`.
    pub fn build(
        bundle: &ProviderBundle,
        registry: &TransformRegistry,
    ) -> Result<Self, UnresolvedTransformError> {
        let mut plans = HashMap::with_capacity(bundle.providers.len());
        for provider in &bundle.providers {
            plans.insert(provider.id.clone(), build_plan(provider, registry)?);
        }
        Ok(Self { plans })
    }

    /// Extract a record for `provider`. `None` if the bundle does not know it.
    pub fn extract(&self, provider: &str, attributes: &Attributes) -> Option<NormalizedRecord> {
        let plan = self.plans.get(provider)?;
        let mut record = NormalizedRecord::for_provider(provider);

        for field in &plan.fields {
            let value = resolve_field(provider, field, attributes);
            if field.required || !value.is_null() {
                record
                    .section_mut(field.section)
                    .insert(field.field.clone(), value);
            }
        }

        record.ensure_provider(provider);
        Some(record)
    }
}

fn build_plan(
    provider: &CompiledProvider,
    registry: &TransformRegistry,
) -> Result<ProviderPlan, UnresolvedTransformError> {
    let unresolved = |transform: &str, source: TransformError| UnresolvedTransformError {
        provider: provider.id.clone(),
        transform: transform.to_string(),
        source,
    };

    let mut ops = HashMap::with_capacity(provider.transforms.len());
    for (name, transform) in &provider.transforms {
        let op = registry
            .prepare(&transform.implementation, &transform.params)
            .map_err(|e| unresolved(name, e))?;
        ops.insert(name.as_str(), (op, &transform.fallback));
    }

    let mut fields = Vec::new();
    for section in SectionKind::ALL {
        for mapping in provider.mappings.section(section) {
            let source = match &mapping.source {
                MappingSource::Rule { rule, .. } => FieldSource::Rule {
                    path: rule.field_path(),
                    rule: rule.clone(),
                },
                MappingSource::Transform { name } => {
                    let (op, fallback) = ops
                        .get(name.as_str())
                        .ok_or_else(|| unresolved(name, TransformError::NotFound(name.clone())))?;
                    FieldSource::Transform {
                        name: name.clone(),
                        op: op.clone(),
                        fallback: (*fallback).clone(),
                    }
                }
                MappingSource::Literal { value } => FieldSource::Literal(value.clone()),
            };

            fields.push(FieldPlan {
                section,
                field: mapping.field.clone(),
                required: mapping.required,
                source,
            });
        }
    }

    Ok(ProviderPlan { fields })
}

fn resolve_field(provider: &str, field: &FieldPlan, attributes: &Attributes) -> JsonValue {
    match &field.source {
        FieldSource::Rule { rule, path } => {
            let resolved = rule.resolve(path.as_ref(), attributes);
            if let Some(reason) = resolved.fallback {
                let reason = match reason {
                    FallbackReason::Missing => "missing".to_string(),
                    FallbackReason::Invalid(predicate) => format!("failed {}", predicate),
                };
                tracing::debug!(
                    provider,
                    section = %field.section,
                    field = %field.field,
                    reason = %reason,
                    "Field fell back"
                );
            }
            resolved.value
        }
        FieldSource::Transform { name, op, fallback } => {
            let value = op.apply(attributes);
            if value.is_null() {
                tracing::debug!(
                    provider,
                    section = %field.section,
                    field = %field.field,
                    transform = %name,
                    "Transform produced no value"
                );
                fallback.clone()
            } else {
                value
            }
        }
        FieldSource::Literal(value) => value.clone(),
    }
}
