//! Navigation rules: pulling one value out of an attribute map.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

use crate::extraction::{as_number, decode_structured, FieldPath};
use crate::record::Attributes;

/// How the values found under a rule's source keys are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Copy the value of the single source key
    #[default]
    Direct,
    /// Flatten arrays and join the text of every value
    FlattenJoin,
    /// Sum numeric values across source keys
    NumericSum,
    /// First source key holding a non-null value
    FirstNonNull,
    /// Merge objects found under the source keys; later keys win
    ObjectMerge,
}

/// Predicate an extracted value must satisfy to be kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Validation {
    NonEmptyString,
    PositiveNumber,
    NonNegativeNumber,
    Number,
    Boolean,
    Object,
    NonEmptyArray,
    ArrayOfObjects,
}

impl Validation {
    pub fn check(&self, value: &JsonValue) -> bool {
        match self {
            Validation::NonEmptyString => value.as_str().is_some_and(|s| !s.trim().is_empty()),
            Validation::PositiveNumber => value.as_f64().is_some_and(|n| n > 0.0),
            Validation::NonNegativeNumber => value.as_f64().is_some_and(|n| n >= 0.0),
            Validation::Number => value.is_number(),
            Validation::Boolean => value.is_boolean(),
            Validation::Object => value.is_object(),
            Validation::NonEmptyArray => value.as_array().is_some_and(|a| !a.is_empty()),
            Validation::ArrayOfObjects => value
                .as_array()
                .is_some_and(|a| a.iter().all(JsonValue::is_object)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Validation::NonEmptyString => "non_empty_string",
            Validation::PositiveNumber => "positive_number",
            Validation::NonNegativeNumber => "non_negative_number",
            Validation::Number => "number",
            Validation::Boolean => "boolean",
            Validation::Object => "object",
            Validation::NonEmptyArray => "non_empty_array",
            Validation::ArrayOfObjects => "array_of_objects",
        }
    }
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A compiled navigation rule as stored in a bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationRule {
    /// Candidate source keys, in priority order
    pub sources: Vec<String>,
    pub mode: ExtractionMode,
    /// Optional path applied to each source value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,
    /// Value used when the source is absent or fails validation
    #[serde(default)]
    pub fallback: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validate: Option<Validation>,
}

/// Why a rule produced its fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    Missing,
    Invalid(Validation),
}

/// Outcome of resolving a rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub value: JsonValue,
    pub fallback: Option<FallbackReason>,
}

impl NavigationRule {
    pub fn field_path(&self) -> Option<FieldPath> {
        self.path
            .as_deref()
            .map(FieldPath::from_dotted)
            .filter(|p| !p.is_empty())
    }

    /// Extract, validate and fall back.
    ///
    /// `path` is the pre-parsed form of `self.path`; callers resolving the same
    /// rule many times parse it once.
    pub fn resolve(&self, path: Option<&FieldPath>, attributes: &Attributes) -> Resolved {
        let Some(value) = self.extract(path, attributes) else {
            return Resolved {
                value: self.fallback.clone(),
                fallback: Some(FallbackReason::Missing),
            };
        };

        match self.validate {
            Some(predicate) if !predicate.check(&value) => Resolved {
                value: self.fallback.clone(),
                fallback: Some(FallbackReason::Invalid(predicate)),
            },
            _ => Resolved {
                value,
                fallback: None,
            },
        }
    }

    /// Apply the extraction mode without validation. `None` means no value.
    pub fn extract(&self, path: Option<&FieldPath>, attributes: &Attributes) -> Option<JsonValue> {
        let fetch = |key: &String| -> Option<JsonValue> {
            let raw = attributes.get(key).filter(|v| !v.is_null())?;
            match path {
                Some(path) => path.resolve(raw).filter(|v| !v.is_null()),
                None => Some(raw.clone()),
            }
        };

        match self.mode {
            ExtractionMode::Direct => self
                .sources
                .first()
                .and_then(fetch)
                .map(|v| decode_structured(&v).into_owned()),
            ExtractionMode::FirstNonNull => self
                .sources
                .iter()
                .find_map(fetch)
                .map(|v| decode_structured(&v).into_owned()),
            ExtractionMode::FlattenJoin => {
                let mut parts = Vec::new();
                for value in self.sources.iter().filter_map(fetch) {
                    flatten_text(&value, &mut parts);
                }
                if parts.is_empty() {
                    None
                } else {
                    let separator = self.separator.as_deref().unwrap_or("\n");
                    Some(JsonValue::String(parts.join(separator)))
                }
            }
            ExtractionMode::NumericSum => {
                let mut numbers = Vec::new();
                for value in self.sources.iter().filter_map(fetch) {
                    collect_numbers(&value, &mut numbers);
                }
                sum_numbers(&numbers)
            }
            ExtractionMode::ObjectMerge => {
                let mut merged = Map::new();
                let mut found = false;
                for value in self.sources.iter().filter_map(fetch) {
                    if let JsonValue::Object(map) = decode_structured(&value).into_owned() {
                        found = true;
                        merged.extend(map);
                    }
                }
                found.then_some(JsonValue::Object(merged))
            }
        }
    }
}

fn flatten_text(value: &JsonValue, out: &mut Vec<String>) {
    match decode_structured(value).as_ref() {
        JsonValue::String(s) if !s.is_empty() => out.push(s.clone()),
        JsonValue::Number(n) => out.push(n.to_string()),
        JsonValue::Bool(b) => out.push(b.to_string()),
        JsonValue::Array(items) => {
            for item in items {
                flatten_text(item, out);
            }
        }
        JsonValue::Object(map) => {
            if let Some(content) = map.get("content") {
                flatten_text(content, out);
            }
        }
        _ => {}
    }
}

fn collect_numbers(value: &JsonValue, out: &mut Vec<serde_json::Number>) {
    match value {
        JsonValue::Array(items) => {
            for item in items {
                collect_numbers(item, out);
            }
        }
        other => {
            if let Some(n) = as_number(other) {
                out.push(n);
            }
        }
    }
}

fn sum_numbers(numbers: &[serde_json::Number]) -> Option<JsonValue> {
    if numbers.is_empty() {
        return None;
    }

    let integers: Option<Vec<i64>> = numbers.iter().map(|n| n.as_i64()).collect();
    if let Some(integers) = integers {
        let total = integers
            .iter()
            .try_fold(0i64, |acc, n| acc.checked_add(*n));
        if let Some(total) = total {
            return Some(JsonValue::from(total));
        }
    }

    let total: f64 = numbers.iter().filter_map(|n| n.as_f64()).sum();
    serde_json::Number::from_f64(total).map(JsonValue::Number)
}
