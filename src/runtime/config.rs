//! Engine configuration.
//!
//! Exactly two settings: where the compiled bundle lives and, optionally,
//! where the pattern store lives. Supplying a pattern store switches the
//! bundle loader into development mode. Nothing is inferred from the
//! environment.
//!
//! ```yaml
//! # nomspan.yaml
//! bundle_path: build/bundle
//! pattern_store: patterns   # omit in production
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NormalizerConfig {
    /// Directory holding `bundle.json` and `bundle.meta.json`
    pub bundle_path: PathBuf,
    /// Pattern store root; presence enables development mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_store: Option<PathBuf>,
}

impl NormalizerConfig {
    /// Load precompiled bundles only.
    pub fn production(bundle_path: impl Into<PathBuf>) -> Self {
        Self {
            bundle_path: bundle_path.into(),
            pattern_store: None,
        }
    }

    /// Recompile from `pattern_store` whenever it is newer than the bundle.
    pub fn development(bundle_path: impl Into<PathBuf>, pattern_store: impl Into<PathBuf>) -> Self {
        Self {
            bundle_path: bundle_path.into(),
            pattern_store: Some(pattern_store.into()),
        }
    }

    /// Read a YAML config file. Relative paths inside it are resolved
    /// against the directory containing the file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config: NormalizerConfig =
            serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        if let Some(base) = path.parent() {
            config.bundle_path = base.join(&config.bundle_path);
            config.pattern_store = config.pattern_store.map(|p| base.join(p));
        }

        Ok(config)
    }

    pub fn is_development(&self) -> bool {
        self.pattern_store.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_constructors() {
        assert!(!NormalizerConfig::production("bundle").is_development());
        assert!(NormalizerConfig::development("bundle", "patterns").is_development());
    }

    #[test]
    fn test_from_file_resolves_relative_paths() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nomspan.yaml");
        fs::write(&path, "bundle_path: build\npattern_store: patterns\n").unwrap();

        let config = NormalizerConfig::from_file(&path).unwrap();

        assert_eq!(config.bundle_path, temp_dir.path().join("build"));
        assert_eq!(config.pattern_store, Some(temp_dir.path().join("patterns")));
    }

    #[test]
    fn test_from_file_keeps_absolute_paths() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nomspan.yaml");
        fs::write(&path, "bundle_path: /srv/bundle\n").unwrap();

        let config = NormalizerConfig::from_file(&path).unwrap();

        assert_eq!(config.bundle_path, PathBuf::from("/srv/bundle"));
        assert!(!config.is_development());
    }

    #[test]
    fn test_unknown_setting_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nomspan.yaml");
        fs::write(&path, "bundle_path: build\nmode: production\n").unwrap();

        let err = NormalizerConfig::from_file(&path).unwrap_err();

        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
