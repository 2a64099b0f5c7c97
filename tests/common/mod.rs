//! Shared helpers for integration tests: on-disk pattern stores in temp dirs.

#![allow(dead_code)]

use nomspan::Attributes;
use serde_json::Value as JsonValue;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// The pattern store shipped with the crate.
pub fn shipped_patterns() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("patterns")
}

pub fn attrs(value: JsonValue) -> Attributes {
    match value {
        JsonValue::Object(map) => map.into_iter().collect(),
        other => panic!("attributes must be a JSON object, got {}", other),
    }
}

/// Builds a pattern store in a temporary directory.
pub struct StoreBuilder {
    dir: TempDir,
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Add a provider with the given signatures and a `config.model` mapping
    /// read from `<id>.model`.
    pub fn provider(self, id: &str, signatures: &[&[&str]]) -> Self {
        let mut structure = format!("version: 1\nprovider: {}\nsignatures:\n", id);
        for keys in signatures {
            structure.push_str(&format!("  - required: [{}]\n", keys.join(", ")));
        }

        self.file(id, "structure_patterns.yaml", &structure)
            .file(
                id,
                "navigation_rules.yaml",
                &format!(
                    "version: 1\nprovider: {id}\nrules:\n  model:\n    source: {id}.model\n    validate: non_empty_string\n"
                ),
            )
            .file(
                id,
                "field_mappings.yaml",
                &format!("version: 1\nprovider: {id}\nconfig:\n  model: {{rule: model}}\n"),
            )
            .file(
                id,
                "transforms.yaml",
                &format!("version: 1\nprovider: {id}\ntransforms: {{}}\n"),
            )
    }

    /// Write (or overwrite) one document of a provider.
    pub fn file(self, id: &str, name: &str, contents: &str) -> Self {
        let dir = self.dir.path().join(id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), contents).unwrap();
        self
    }

    pub fn remove(self, id: &str, name: &str) -> Self {
        fs::remove_file(self.dir.path().join(id).join(name)).unwrap();
        self
    }

    pub fn manifest(self, providers: &[&str], min_required_keys: usize) -> Self {
        fs::write(
            self.dir.path().join("manifest.yaml"),
            format!(
                "version: 1\nmin_required_keys: {}\nproviders: [{}]\n",
                min_required_keys,
                providers.join(", ")
            ),
        )
        .unwrap();
        self
    }
}
