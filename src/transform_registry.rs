//! Closed registry of transform operations.
//!
//! Pattern stores reference transforms by implementation name. Every name
//! resolves to a [`TransformKind`]; there is no way to register arbitrary
//! code. Adding a provider only adds new parameterizations of these kinds.
//!
//! Parameters are parsed into a typed [`TransformOp`] once, when a bundle is
//! compiled (for validation) and again when an extractor is built, so the
//! per-call path never re-reads parameter maps.

use std::collections::BTreeMap;

use serde_json::{Map, Value as JsonValue};

use crate::error::TransformError;
use crate::extraction::decode_structured;
use crate::record::Attributes;

/// Parameter map of a transform definition.
pub type TransformParams = Map<String, JsonValue>;

/// The finite set of transform kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransformKind {
    JoinMessagesByRole,
    FilterMessagesByRole,
    LastMessageContent,
    UnflattenIndexed,
    CollectPrefixed,
    ParseJson,
    MapValue,
    SplitList,
}

impl TransformKind {
    pub const ALL: [TransformKind; 8] = [
        TransformKind::JoinMessagesByRole,
        TransformKind::FilterMessagesByRole,
        TransformKind::LastMessageContent,
        TransformKind::UnflattenIndexed,
        TransformKind::CollectPrefixed,
        TransformKind::ParseJson,
        TransformKind::MapValue,
        TransformKind::SplitList,
    ];

    /// Implementation name used in pattern stores.
    pub fn name(&self) -> &'static str {
        match self {
            TransformKind::JoinMessagesByRole => "join_messages_by_role",
            TransformKind::FilterMessagesByRole => "filter_messages_by_role",
            TransformKind::LastMessageContent => "last_message_content",
            TransformKind::UnflattenIndexed => "unflatten_indexed",
            TransformKind::CollectPrefixed => "collect_prefixed",
            TransformKind::ParseJson => "parse_json",
            TransformKind::MapValue => "map_value",
            TransformKind::SplitList => "split_list",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Parse parameters into a typed operation of this kind.
    pub fn prepare(&self, params: &TransformParams) -> Result<TransformOp, TransformError> {
        let op = match self {
            TransformKind::JoinMessagesByRole => TransformOp::JoinMessagesByRole {
                messages: MessageSource::from_params(params)?,
                roles: roles_param(params, true)?,
                separator: opt_string(params, "separator")?.unwrap_or_else(|| "\n".to_string()),
            },
            TransformKind::FilterMessagesByRole => TransformOp::FilterMessagesByRole {
                messages: MessageSource::from_params(params)?,
                roles: roles_param(params, true)?,
                exclude: opt_bool(params, "exclude")?.unwrap_or(false),
            },
            TransformKind::LastMessageContent => TransformOp::LastMessageContent {
                messages: MessageSource::from_params(params)?,
                roles: roles_param(params, false)?,
            },
            TransformKind::UnflattenIndexed => TransformOp::UnflattenIndexed {
                prefix: required_string(params, "prefix")?,
            },
            TransformKind::CollectPrefixed => TransformOp::CollectPrefixed {
                prefix: required_string(params, "prefix")?,
                strip_prefix: opt_bool(params, "strip_prefix")?.unwrap_or(true),
            },
            TransformKind::ParseJson => TransformOp::ParseJson {
                sources: sources_param(params)?,
            },
            TransformKind::MapValue => {
                let table = match params.get("values") {
                    Some(JsonValue::Object(map)) => map.clone(),
                    Some(_) => {
                        return Err(TransformError::InvalidArgs(
                            "'values' must be a mapping".to_string(),
                        ))
                    }
                    None => {
                        return Err(TransformError::InvalidArgs(
                            "missing 'values'".to_string(),
                        ))
                    }
                };
                TransformOp::MapValue {
                    sources: sources_param(params)?,
                    table,
                    default: params.get("default").cloned(),
                }
            }
            TransformKind::SplitList => TransformOp::SplitList {
                sources: sources_param(params)?,
                separator: opt_string(params, "separator")?.unwrap_or_else(|| ",".to_string()),
            },
        };
        Ok(op)
    }
}

/// Where a transform finds its list of chat messages.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageSource {
    /// Candidate attribute keys holding an array (or JSON-encoded array)
    pub keys: Vec<String>,
    /// Prefix of indexed flattened keys (`prefix.N.role`) tried when no key is present
    pub indexed_prefix: Option<String>,
    pub role_field: String,
    pub content_field: String,
}

impl MessageSource {
    fn from_params(params: &TransformParams) -> Result<Self, TransformError> {
        let keys = match params.get("source") {
            Some(_) => sources_param(params)?,
            None => Vec::new(),
        };
        let indexed_prefix = opt_string(params, "indexed_prefix")?;

        if keys.is_empty() && indexed_prefix.is_none() {
            return Err(TransformError::InvalidArgs(
                "requires 'source' or 'indexed_prefix'".to_string(),
            ));
        }

        Ok(Self {
            keys,
            indexed_prefix,
            role_field: opt_string(params, "role_field")?.unwrap_or_else(|| "role".to_string()),
            content_field: opt_string(params, "content_field")?
                .unwrap_or_else(|| "content".to_string()),
        })
    }

    fn load(&self, attributes: &Attributes) -> Option<Vec<JsonValue>> {
        for key in &self.keys {
            if let Some(value) = attributes.get(key) {
                if let JsonValue::Array(items) = decode_structured(value).into_owned() {
                    return Some(items);
                }
            }
        }

        match self.indexed_prefix.as_deref().map(|p| unflatten_indexed(attributes, p)) {
            Some(JsonValue::Array(items)) => Some(items),
            _ => None,
        }
    }

    fn role_matches(&self, message: &JsonValue, roles: &[String]) -> bool {
        let Some(role) = message.get(&self.role_field).and_then(|v| v.as_str()) else {
            return false;
        };
        roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }

    fn text(&self, message: &JsonValue) -> Option<String> {
        message.get(&self.content_field).and_then(content_text)
    }
}

/// A transform with its parameters already parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOp {
    JoinMessagesByRole {
        messages: MessageSource,
        roles: Vec<String>,
        separator: String,
    },
    FilterMessagesByRole {
        messages: MessageSource,
        roles: Vec<String>,
        exclude: bool,
    },
    LastMessageContent {
        messages: MessageSource,
        roles: Vec<String>,
    },
    UnflattenIndexed {
        prefix: String,
    },
    CollectPrefixed {
        prefix: String,
        strip_prefix: bool,
    },
    ParseJson {
        sources: Vec<String>,
    },
    MapValue {
        sources: Vec<String>,
        table: Map<String, JsonValue>,
        default: Option<JsonValue>,
    },
    SplitList {
        sources: Vec<String>,
        separator: String,
    },
}

impl TransformOp {
    /// Run the operation. `Null` means the transform produced no value.
    pub fn apply(&self, attributes: &Attributes) -> JsonValue {
        match self {
            TransformOp::JoinMessagesByRole {
                messages,
                roles,
                separator,
            } => {
                let Some(items) = messages.load(attributes) else {
                    return JsonValue::Null;
                };
                let parts: Vec<String> = items
                    .iter()
                    .filter(|m| messages.role_matches(m, roles))
                    .filter_map(|m| messages.text(m))
                    .collect();
                if parts.is_empty() {
                    JsonValue::Null
                } else {
                    JsonValue::String(parts.join(separator))
                }
            }
            TransformOp::FilterMessagesByRole {
                messages,
                roles,
                exclude,
            } => {
                let Some(items) = messages.load(attributes) else {
                    return JsonValue::Null;
                };
                let kept: Vec<JsonValue> = items
                    .into_iter()
                    .filter(|m| messages.role_matches(m, roles) != *exclude)
                    .collect();
                if kept.is_empty() {
                    JsonValue::Null
                } else {
                    JsonValue::Array(kept)
                }
            }
            TransformOp::LastMessageContent { messages, roles } => messages
                .load(attributes)
                .and_then(|items| {
                    items
                        .iter()
                        .rev()
                        .filter(|m| roles.is_empty() || messages.role_matches(m, roles))
                        .find_map(|m| messages.text(m))
                })
                .map(JsonValue::String)
                .unwrap_or(JsonValue::Null),
            TransformOp::UnflattenIndexed { prefix } => unflatten_indexed(attributes, prefix),
            TransformOp::CollectPrefixed {
                prefix,
                strip_prefix,
            } => collect_prefixed(attributes, prefix, *strip_prefix),
            TransformOp::ParseJson { sources } => first_present(attributes, sources)
                .map(|v| match v {
                    JsonValue::String(s) => {
                        serde_json::from_str(s).unwrap_or_else(|_| JsonValue::String(s.clone()))
                    }
                    other => other.clone(),
                })
                .unwrap_or(JsonValue::Null),
            TransformOp::MapValue {
                sources,
                table,
                default,
            } => {
                let Some(value) = first_present(attributes, sources) else {
                    return JsonValue::Null;
                };
                let key = match value {
                    JsonValue::String(s) => s.clone(),
                    other => other.to_string(),
                };
                table
                    .get(&key)
                    .cloned()
                    .or_else(|| default.clone())
                    .unwrap_or_else(|| value.clone())
            }
            TransformOp::SplitList { sources, separator } => first_present(attributes, sources)
                .map(|v| split_list(v, separator))
                .unwrap_or(JsonValue::Null),
        }
    }
}

/// Registry of enabled transform kinds, keyed by implementation name.
#[derive(Debug, Clone)]
pub struct TransformRegistry {
    kinds: BTreeMap<&'static str, TransformKind>,
}

impl TransformRegistry {
    /// Create a new empty transform registry
    pub fn new() -> Self {
        Self {
            kinds: BTreeMap::new(),
        }
    }

    /// Registry with every built-in kind enabled.
    pub fn builtin() -> Self {
        Self::with_kinds(TransformKind::ALL)
    }

    /// Registry with only the given kinds enabled.
    pub fn with_kinds(kinds: impl IntoIterator<Item = TransformKind>) -> Self {
        let mut registry = Self::new();
        for kind in kinds {
            registry.register(kind);
        }
        registry
    }

    pub fn register(&mut self, kind: TransformKind) {
        self.kinds.insert(kind.name(), kind);
    }

    /// Get list of all registered transform names
    pub fn list_transforms(&self) -> Vec<&'static str> {
        self.kinds.keys().copied().collect()
    }

    pub fn resolve(&self, name: &str) -> Result<TransformKind, TransformError> {
        self.kinds
            .get(name)
            .copied()
            .ok_or_else(|| TransformError::NotFound(name.to_string()))
    }

    /// Resolve `name` and parse `params` into an operation.
    pub fn prepare(
        &self,
        name: &str,
        params: &TransformParams,
    ) -> Result<TransformOp, TransformError> {
        self.resolve(name)?.prepare(params)
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

// Parameter helpers

fn required_string(params: &TransformParams, name: &str) -> Result<String, TransformError> {
    opt_string(params, name)?.ok_or_else(|| TransformError::InvalidArgs(format!("missing '{}'", name)))
}

fn opt_string(params: &TransformParams, name: &str) -> Result<Option<String>, TransformError> {
    match params.get(name) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(TransformError::InvalidArgs(format!("'{}' must be a string", name))),
    }
}

fn opt_bool(params: &TransformParams, name: &str) -> Result<Option<bool>, TransformError> {
    match params.get(name) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(TransformError::InvalidArgs(format!("'{}' must be a boolean", name))),
    }
}

fn string_list(value: &JsonValue, name: &str) -> Result<Vec<String>, TransformError> {
    match value {
        JsonValue::String(s) => Ok(vec![s.clone()]),
        JsonValue::Array(items) => items
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    TransformError::InvalidArgs(format!("'{}' must contain only strings", name))
                })
            })
            .collect(),
        _ => Err(TransformError::InvalidArgs(format!(
            "'{}' must be a string or a list of strings",
            name
        ))),
    }
}

fn sources_param(params: &TransformParams) -> Result<Vec<String>, TransformError> {
    let sources = params
        .get("source")
        .ok_or_else(|| TransformError::InvalidArgs("missing 'source'".to_string()))
        .and_then(|v| string_list(v, "source"))?;
    if sources.is_empty() {
        return Err(TransformError::InvalidArgs("'source' is empty".to_string()));
    }
    Ok(sources)
}

fn roles_param(params: &TransformParams, required: bool) -> Result<Vec<String>, TransformError> {
    match params.get("role") {
        Some(value) => {
            let roles = string_list(value, "role")?;
            if roles.is_empty() {
                return Err(TransformError::InvalidArgs("'role' is empty".to_string()));
            }
            Ok(roles)
        }
        None if required => Err(TransformError::InvalidArgs("missing 'role'".to_string())),
        None => Ok(Vec::new()),
    }
}

// Operation helpers

fn first_present<'a>(attributes: &'a Attributes, sources: &[String]) -> Option<&'a JsonValue> {
    sources
        .iter()
        .filter_map(|k| attributes.get(k))
        .find(|v| !v.is_null())
}

/// Text of a message `content` value: plain strings, or the `text` (or
/// `content`) of each part of a multi-part content array.
fn content_text(content: &JsonValue) -> Option<String> {
    let text = match content {
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Array(parts) => parts
            .iter()
            .filter_map(|part| match part {
                JsonValue::String(s) => Some(s.as_str()),
                JsonValue::Object(obj) => obj
                    .get("text")
                    .or_else(|| obj.get("content"))
                    .and_then(|t| t.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(""),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Key holding a scalar that shares its path with nested fields, as in
/// `prefix.0.tool_calls` next to `prefix.0.tool_calls.name`.
const NESTED_SCALAR_KEY: &str = "_value";

/// Collect `prefix.N.field...` keys into an array of objects ordered by `N`.
fn unflatten_indexed(attributes: &Attributes, prefix: &str) -> JsonValue {
    let lead = format!("{}.", prefix);
    let mut matching: Vec<(usize, &str, &JsonValue)> = attributes
        .iter()
        .filter_map(|(key, value)| {
            let rest = key.strip_prefix(&lead)?;
            let (index, field) = rest.split_once('.')?;
            let index = index.parse::<usize>().ok()?;
            Some((index, field, value))
        })
        .collect();
    matching.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

    let mut by_index: BTreeMap<usize, Map<String, JsonValue>> = BTreeMap::new();
    for (index, field, value) in matching {
        let entry = by_index.entry(index).or_default();
        insert_nested(entry, field, value.clone());
    }

    if by_index.is_empty() {
        JsonValue::Null
    } else {
        JsonValue::Array(by_index.into_values().map(JsonValue::Object).collect())
    }
}

/// Set a value at a dotted path, creating intermediate objects as needed.
/// A scalar and an object at the same path are merged, the scalar moving
/// under [`NESTED_SCALAR_KEY`].
fn insert_nested(root: &mut Map<String, JsonValue>, path: &str, value: JsonValue) {
    match path.split_once('.') {
        None => match root.get_mut(path) {
            Some(JsonValue::Object(existing)) => {
                existing.insert(NESTED_SCALAR_KEY.to_string(), value);
            }
            _ => {
                root.insert(path.to_string(), value);
            }
        },
        Some((head, rest)) => {
            let entry = root
                .entry(head.to_string())
                .or_insert_with(|| JsonValue::Object(Map::new()));
            if !entry.is_object() {
                let scalar = entry.take();
                let mut wrapped = Map::new();
                wrapped.insert(NESTED_SCALAR_KEY.to_string(), scalar);
                *entry = JsonValue::Object(wrapped);
            }
            if let JsonValue::Object(child) = entry {
                insert_nested(child, rest, value);
            }
        }
    }
}

fn collect_prefixed(attributes: &Attributes, prefix: &str, strip_prefix: bool) -> JsonValue {
    let lead = format!("{}.", prefix);
    let collected: Map<String, JsonValue> = attributes
        .iter()
        .filter_map(|(key, value)| {
            let rest = key.strip_prefix(&lead)?;
            let name = if strip_prefix { rest } else { key.as_str() };
            Some((name.to_string(), value.clone()))
        })
        .collect();

    if collected.is_empty() {
        JsonValue::Null
    } else {
        JsonValue::Object(collected)
    }
}

fn split_list(value: &JsonValue, separator: &str) -> JsonValue {
    let items: Vec<JsonValue> = match decode_structured(value).as_ref() {
        JsonValue::Array(items) => items
            .iter()
            .map(|v| match v {
                JsonValue::String(s) => JsonValue::String(s.clone()),
                other => JsonValue::String(other.to_string()),
            })
            .collect(),
        JsonValue::String(s) => s
            .split(separator)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| JsonValue::String(s.to_string()))
            .collect(),
        JsonValue::Null => return JsonValue::Null,
        other => vec![JsonValue::String(other.to_string())],
    };
    JsonValue::Array(items)
}
