//! Path-based navigation into attribute values.
//!
//! Attribute values are frequently JSON documents encoded as strings
//! (`llm.invocation_parameters`, `ai.prompt.messages`). Navigation decodes
//! such strings on demand so paths can descend into them.

use serde_json::Value as JsonValue;
use std::borrow::Cow;
use std::fmt;

/// Represents a path into a structured attribute value
///
/// # Examples
///
/// - `temperature` - a key of an object (or JSON-encoded object)
/// - `messages.[0].content` - content of the first message
/// - `choices.*.message` - `message` of every element of `choices`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    /// The raw path string
    pub raw: String,
    /// Parsed path segments
    pub segments: Vec<PathSegment>,
}

/// A segment in a field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// A named field; numeric names also index arrays
    Field(String),
    /// An explicit array index (e.g., [0], [5])
    Index(usize),
    /// Every element of an array
    Wildcard,
}

impl FieldPath {
    /// Parse a field path with a given delimiter
    ///
    /// # Example
    ///
    /// ```
    /// use nomspan::FieldPath;
    ///
    /// let path = FieldPath::parse("user.address.city", ".");
    /// assert_eq!(path.segments.len(), 3);
    /// ```
    pub fn parse(path: &str, delimiter: &str) -> Self {
        let segments = path
            .split(delimiter)
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s.starts_with('[') && s.ends_with(']') {
                    if let Ok(index) = s[1..s.len() - 1].parse::<usize>() {
                        return PathSegment::Index(index);
                    }
                }

                if s == "*" {
                    return PathSegment::Wildcard;
                }

                PathSegment::Field(s.to_string())
            })
            .collect();

        Self {
            raw: path.to_string(),
            segments,
        }
    }

    /// Create a field path from a dotted string (common format)
    pub fn from_dotted(path: &str) -> Self {
        Self::parse(path, ".")
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Resolve this path against a value.
    ///
    /// Returns `None` when any segment is missing. Wildcards produce an array
    /// of the resolved elements, skipping elements where the rest of the path
    /// is missing.
    pub fn resolve(&self, value: &JsonValue) -> Option<JsonValue> {
        resolve_segments(&self.segments, value)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

fn resolve_segments(segments: &[PathSegment], value: &JsonValue) -> Option<JsonValue> {
    let Some((head, rest)) = segments.split_first() else {
        return Some(value.clone());
    };

    let current = decode_structured(value);

    match head {
        PathSegment::Field(name) => match current.as_ref() {
            JsonValue::Object(map) => map.get(name).and_then(|v| resolve_segments(rest, v)),
            JsonValue::Array(items) => {
                let index = name.parse::<usize>().ok()?;
                items.get(index).and_then(|v| resolve_segments(rest, v))
            }
            _ => None,
        },
        PathSegment::Index(index) => match current.as_ref() {
            JsonValue::Array(items) => items.get(*index).and_then(|v| resolve_segments(rest, v)),
            _ => None,
        },
        PathSegment::Wildcard => match current.as_ref() {
            JsonValue::Array(items) => Some(JsonValue::Array(
                items
                    .iter()
                    .filter_map(|v| resolve_segments(rest, v))
                    .collect(),
            )),
            _ => None,
        },
    }
}

/// Decode a JSON-encoded object or array held in a string value.
///
/// Any other value, including strings that are not JSON documents, is
/// returned unchanged.
pub fn decode_structured(value: &JsonValue) -> Cow<'_, JsonValue> {
    if let JsonValue::String(s) = value {
        let trimmed = s.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(parsed) = serde_json::from_str::<JsonValue>(s) {
                if parsed.is_object() || parsed.is_array() {
                    return Cow::Owned(parsed);
                }
            }
        }
    }
    Cow::Borrowed(value)
}

/// Interpret a value as a number, accepting numeric strings.
pub fn as_number(value: &JsonValue) -> Option<serde_json::Number> {
    match value {
        JsonValue::Number(n) => Some(n.clone()),
        JsonValue::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Some(i.into());
            }
            s.parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
        }
        _ => None,
    }
}
