//! The fixed four-section output schema every provider is mapped into.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Raw observability attributes as supplied by instrumentation.
pub type Attributes = HashMap<String, JsonValue>;

/// Provider identifier reported when no signature matches.
pub const UNKNOWN_PROVIDER: &str = "unknown";

/// Key under `metadata` that always carries the provider identifier.
pub const PROVIDER_FIELD: &str = "provider";

/// One of the four output sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Inputs,
    Outputs,
    Config,
    Metadata,
}

impl SectionKind {
    pub const ALL: [SectionKind; 4] = [
        SectionKind::Inputs,
        SectionKind::Outputs,
        SectionKind::Config,
        SectionKind::Metadata,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Inputs => "inputs",
            SectionKind::Outputs => "outputs",
            SectionKind::Config => "config",
            SectionKind::Metadata => "metadata",
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inputs" => Ok(SectionKind::Inputs),
            "outputs" => Ok(SectionKind::Outputs),
            "config" => Ok(SectionKind::Config),
            "metadata" => Ok(SectionKind::Metadata),
            other => Err(format!("unknown section '{}'", other)),
        }
    }
}

/// Normalized record produced for every attribute map.
///
/// All four sections are always present when serialized, and
/// `metadata.provider` is always a non-empty string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    #[serde(default)]
    pub inputs: Map<String, JsonValue>,
    #[serde(default)]
    pub outputs: Map<String, JsonValue>,
    #[serde(default)]
    pub config: Map<String, JsonValue>,
    #[serde(default)]
    pub metadata: Map<String, JsonValue>,
}

impl NormalizedRecord {
    /// Create an empty record attributed to `provider`.
    pub fn for_provider(provider: &str) -> Self {
        let provider = if provider.is_empty() {
            UNKNOWN_PROVIDER
        } else {
            provider
        };

        let mut metadata = Map::new();
        metadata.insert(
            PROVIDER_FIELD.to_string(),
            JsonValue::String(provider.to_string()),
        );

        Self {
            inputs: Map::new(),
            outputs: Map::new(),
            config: Map::new(),
            metadata,
        }
    }

    pub fn unknown() -> Self {
        Self::for_provider(UNKNOWN_PROVIDER)
    }

    pub fn section(&self, kind: SectionKind) -> &Map<String, JsonValue> {
        match kind {
            SectionKind::Inputs => &self.inputs,
            SectionKind::Outputs => &self.outputs,
            SectionKind::Config => &self.config,
            SectionKind::Metadata => &self.metadata,
        }
    }

    pub fn section_mut(&mut self, kind: SectionKind) -> &mut Map<String, JsonValue> {
        match kind {
            SectionKind::Inputs => &mut self.inputs,
            SectionKind::Outputs => &mut self.outputs,
            SectionKind::Config => &mut self.config,
            SectionKind::Metadata => &mut self.metadata,
        }
    }

    /// The provider this record is attributed to.
    pub fn provider(&self) -> &str {
        self.metadata
            .get(PROVIDER_FIELD)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_PROVIDER)
    }

    /// Restore `metadata.provider` if a mapping overwrote it with something
    /// that is not a non-empty string.
    pub(crate) fn ensure_provider(&mut self, provider: &str) {
        let valid = matches!(
            self.metadata.get(PROVIDER_FIELD),
            Some(JsonValue::String(s)) if !s.is_empty()
        );
        if !valid {
            self.metadata.insert(
                PROVIDER_FIELD.to_string(),
                JsonValue::String(provider.to_string()),
            );
        }
    }

    pub fn to_json(&self) -> Result<JsonValue, serde_json::Error> {
        serde_json::to_value(self)
    }
}

impl Default for NormalizedRecord {
    fn default() -> Self {
        Self::unknown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_serializes_all_sections() {
        let record = NormalizedRecord::unknown();
        let value = record.to_json().unwrap();

        for section in SectionKind::ALL {
            assert!(value.get(section.as_str()).is_some(), "missing {}", section);
        }
        assert_eq!(value["metadata"]["provider"], json!("unknown"));
    }

    #[test]
    fn test_empty_provider_becomes_unknown() {
        let record = NormalizedRecord::for_provider("");
        assert_eq!(record.provider(), "unknown");
    }

    #[test]
    fn test_ensure_provider_repairs_null() {
        let mut record = NormalizedRecord::for_provider("openinference");
        record.metadata.insert("provider".to_string(), JsonValue::Null);

        record.ensure_provider("openinference");

        assert_eq!(record.provider(), "openinference");
    }

    #[test]
    fn test_section_kind_parse() {
        assert_eq!("config".parse::<SectionKind>(), Ok(SectionKind::Config));
        assert!("settings".parse::<SectionKind>().is_err());
    }
}
