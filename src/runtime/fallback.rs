//! Heuristic bucketing for attribute maps no signature recognizes.
//!
//! Every attribute lands somewhere; nothing is dropped. Keys are visited in
//! sorted order so the result does not depend on map iteration order.

use crate::record::{Attributes, NormalizedRecord, SectionKind};

const INPUT_MARKERS: [&str; 2] = ["input", "prompt"];
const OUTPUT_MARKERS: [&str; 2] = ["output", "completion"];
const CONFIG_MARKERS: [&str; 2] = ["model", "temperature"];

/// Section an unrecognized attribute key belongs to.
pub fn bucket_for_key(key: &str) -> SectionKind {
    let key = key.to_ascii_lowercase();
    let has_any = |markers: &[&str]| markers.iter().any(|m| key.contains(m));

    if has_any(&INPUT_MARKERS) {
        SectionKind::Inputs
    } else if has_any(&OUTPUT_MARKERS) {
        SectionKind::Outputs
    } else if has_any(&CONFIG_MARKERS) {
        SectionKind::Config
    } else {
        SectionKind::Metadata
    }
}

/// Build a record for an unrecognized attribute map.
///
/// The destination name is the last dot-separated segment of the key. If
/// that name is taken in its section (including `metadata.provider`), the
/// full key is used, then the full key with a `#N` suffix.
pub fn fallback_extract(attributes: &Attributes) -> NormalizedRecord {
    let mut record = NormalizedRecord::unknown();

    let mut keys: Vec<&String> = attributes.keys().collect();
    keys.sort();

    for key in keys {
        let section = record.section_mut(bucket_for_key(key));
        let short = key.rsplit('.').next().unwrap_or(key.as_str());

        let name = if !section.contains_key(short) {
            short.to_string()
        } else if !section.contains_key(key.as_str()) {
            key.clone()
        } else {
            (2..)
                .map(|n| format!("{}#{}", key, n))
                .find(|candidate| !section.contains_key(candidate))
                .unwrap_or_else(|| key.clone())
        };

        section.insert(name, attributes[key].clone());
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value as JsonValue};

    fn attrs(value: JsonValue) -> Attributes {
        value.as_object().unwrap().clone().into_iter().collect()
    }

    #[test]
    fn test_bucket_priority() {
        assert_eq!(bucket_for_key("llm.prompt_template"), SectionKind::Inputs);
        assert_eq!(bucket_for_key("gen_ai.completion"), SectionKind::Outputs);
        assert_eq!(bucket_for_key("Request.MODEL"), SectionKind::Config);
        assert_eq!(bucket_for_key("custom.foo"), SectionKind::Metadata);
        // input is checked before model
        assert_eq!(bucket_for_key("model.input"), SectionKind::Inputs);
    }

    #[test]
    fn test_unknown_record_shape() {
        let record = fallback_extract(&attrs(json!({"custom.foo": "bar"})));

        assert_eq!(record.provider(), "unknown");
        assert_eq!(record.metadata["foo"], json!("bar"));
        assert!(record.inputs.is_empty());
    }

    #[test]
    fn test_collisions_keep_full_key() {
        let record = fallback_extract(&attrs(json!({
            "a.model": "m1",
            "b.model": "m2",
            "vendor.provider": "acme"
        })));

        assert_eq!(record.config["model"], json!("m1"));
        assert_eq!(record.config["b.model"], json!("m2"));
        assert_eq!(record.metadata["provider"], json!("unknown"));
        assert_eq!(record.metadata["vendor.provider"], json!("acme"));
    }

    #[test]
    fn test_bare_provider_key_is_kept() {
        let record = fallback_extract(&attrs(json!({"provider": "acme"})));

        assert_eq!(record.provider(), "unknown");
        assert_eq!(record.metadata["provider#2"], json!("acme"));
    }

    #[test]
    fn test_empty_map() {
        let record = fallback_extract(&Attributes::new());
        assert_eq!(record, NormalizedRecord::unknown());
    }
}
