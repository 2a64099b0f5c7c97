//! Bundle loader with an explicit production/development switch.
//!
//! Production mode reads the precompiled bundle and refuses to start on a
//! missing, corrupt or incompatible artifact. Development mode (a pattern
//! store is configured) recompiles synchronously whenever the store is newer
//! than the bundle's build timestamp.
//!
//! The loaded bundle is cached behind a lock holding an `Arc`. A reload
//! builds the new bundle completely before swapping the reference, so a
//! concurrent reader sees either the old bundle or the new one.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::compiler::{compile_dir, newest_modification, CompileOptions};
use crate::error::BundleLoadError;
use crate::runtime::bundle::{
    BundleMetadata, ProviderBundle, BUNDLE_FILE, BUNDLE_FORMAT_VERSION, META_FILE,
};
use crate::runtime::config::NormalizerConfig;

pub struct BundleLoader {
    config: NormalizerConfig,
    options: CompileOptions,
    cache: RwLock<Option<Arc<ProviderBundle>>>,
}

impl BundleLoader {
    pub fn new(config: NormalizerConfig) -> Self {
        Self::with_options(config, CompileOptions::default())
    }

    /// Loader whose development-mode recompiles use `options`.
    pub fn with_options(config: NormalizerConfig, options: CompileOptions) -> Self {
        Self {
            config,
            options,
            cache: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    pub fn is_development(&self) -> bool {
        self.config.is_development()
    }

    /// Return the cached bundle, loading (or compiling) it on first use.
    pub fn load(&self) -> Result<Arc<ProviderBundle>, BundleLoadError> {
        if let Some(bundle) = self.cache.read().as_ref() {
            return Ok(Arc::clone(bundle));
        }

        let mut cache = self.cache.write();
        // Another caller may have loaded it while we waited for the lock.
        if let Some(bundle) = cache.as_ref() {
            return Ok(Arc::clone(bundle));
        }

        let bundle = Arc::new(self.fetch()?);
        *cache = Some(Arc::clone(&bundle));
        Ok(bundle)
    }

    /// Drop the cached bundle; the next `load` reads storage again.
    pub fn invalidate(&self) {
        *self.cache.write() = None;
        tracing::debug!("Bundle cache invalidated");
    }

    /// Load from storage now and replace the cached bundle.
    ///
    /// On failure the previously cached bundle stays in place.
    pub fn reload(&self) -> Result<Arc<ProviderBundle>, BundleLoadError> {
        let bundle = Arc::new(self.fetch()?);
        *self.cache.write() = Some(Arc::clone(&bundle));
        Ok(bundle)
    }

    fn fetch(&self) -> Result<ProviderBundle, BundleLoadError> {
        match &self.config.pattern_store {
            None => read_bundle(&self.config.bundle_path),
            Some(store) => self.fetch_development(store),
        }
    }

    fn fetch_development(&self, store: &Path) -> Result<ProviderBundle, BundleLoadError> {
        let bundle_dir = &self.config.bundle_path;

        match staleness(bundle_dir, store) {
            None => read_bundle(bundle_dir),
            Some(reason) => {
                tracing::warn!(
                    store = %store.display(),
                    bundle = %bundle_dir.display(),
                    reason,
                    "Recompiling pattern store"
                );
                let output = compile_dir(store, &self.options)?;
                output.write_to(bundle_dir)?;
                Ok(output.bundle)
            }
        }
    }
}

/// Why the bundle in `bundle_dir` must be rebuilt from `store`, if it must.
fn staleness(bundle_dir: &Path, store: &Path) -> Option<&'static str> {
    let Ok(bundle_bytes) = fs::read(bundle_dir.join(BUNDLE_FILE)) else {
        return Some("bundle missing");
    };
    let Some(metadata) = read_metadata(bundle_dir).ok().flatten() else {
        return Some("metadata missing or unreadable");
    };
    if metadata.format_version != BUNDLE_FORMAT_VERSION {
        return Some("bundle format changed");
    }
    if !metadata.matches(&bundle_bytes) {
        return Some("content hash mismatch");
    }

    match newest_modification(store) {
        Ok(Some(modified)) if DateTime::<Utc>::from(modified) > metadata.build_timestamp => {
            Some("pattern store is newer than bundle")
        }
        Ok(_) => None,
        Err(_) => Some("pattern store unreadable"),
    }
}

/// Read and verify the bundle stored in `dir`.
pub fn read_bundle(dir: &Path) -> Result<ProviderBundle, BundleLoadError> {
    let path = dir.join(BUNDLE_FILE);
    let bytes = fs::read(&path).map_err(|e| io_error(&path, e))?;

    match read_metadata(dir) {
        Ok(Some(metadata)) => {
            if !metadata.matches(&bytes) {
                return Err(BundleLoadError::Corrupt {
                    path,
                    reason: "content hash does not match metadata".to_string(),
                });
            }
        }
        Ok(None) => {
            tracing::warn!(dir = %dir.display(), "Bundle metadata missing; hash not verified");
        }
        Err(e) => return Err(e),
    }

    let raw: JsonValue = serde_json::from_slice(&bytes).map_err(|e| BundleLoadError::Corrupt {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    let found = raw
        .get("format_version")
        .and_then(JsonValue::as_u64)
        .ok_or_else(|| BundleLoadError::Corrupt {
            path: path.clone(),
            reason: "missing format_version".to_string(),
        })?;
    if found != u64::from(BUNDLE_FORMAT_VERSION) {
        return Err(BundleLoadError::Incompatible {
            found: u32::try_from(found).unwrap_or(u32::MAX),
            expected: BUNDLE_FORMAT_VERSION,
        });
    }

    let bundle: ProviderBundle = serde_json::from_value(raw).map_err(|e| BundleLoadError::Corrupt {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    tracing::info!(
        path = %path.display(),
        providers = bundle.providers.len(),
        "Loaded provider bundle"
    );
    Ok(bundle)
}

/// Read `bundle.meta.json`; `Ok(None)` when it does not exist.
pub fn read_metadata(dir: &Path) -> Result<Option<BundleMetadata>, BundleLoadError> {
    let path = dir.join(META_FILE);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error(&path, e)),
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| BundleLoadError::Corrupt {
            path,
            reason: e.to_string(),
        })
}

fn io_error(path: &Path, source: io::Error) -> BundleLoadError {
    if source.kind() == io::ErrorKind::NotFound {
        BundleLoadError::Missing(PathBuf::from(path))
    } else {
        BundleLoadError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_production_missing_bundle_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let loader = BundleLoader::new(NormalizerConfig::production(temp_dir.path()));

        let err = loader.load().unwrap_err();

        assert!(matches!(err, BundleLoadError::Missing(_)));
        assert!(!loader.is_development());
    }

    #[test]
    fn test_unparsable_bundle_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(BUNDLE_FILE), "{not json").unwrap();

        let err = read_bundle(temp_dir.path()).unwrap_err();

        assert!(matches!(err, BundleLoadError::Corrupt { .. }));
    }

    #[test]
    fn test_future_format_is_incompatible() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(BUNDLE_FILE),
            r#"{"format_version": 99, "providers": []}"#,
        )
        .unwrap();

        let err = read_bundle(temp_dir.path()).unwrap_err();

        assert!(matches!(
            err,
            BundleLoadError::Incompatible {
                found: 99,
                expected: BUNDLE_FORMAT_VERSION
            }
        ));
    }

    #[test]
    fn test_staleness_without_bundle() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(
            staleness(temp_dir.path(), temp_dir.path()),
            Some("bundle missing")
        );
    }
}
