//! Pattern store loader.
//!
//! A pattern store is a directory with one sub-directory per provider and an
//! optional `manifest.yaml` giving the provider declaration order:
//!
//! ```text
//! patterns/
//!   manifest.yaml
//!   openinference/
//!     structure_patterns.yaml
//!     navigation_rules.yaml
//!     field_mappings.yaml
//!     transforms.yaml
//! ```

use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::compiler::types::{
    document_file, Manifest, PatternStore, ProviderPatterns, DEFAULT_MIN_REQUIRED_KEYS,
    FIELD_MAPPINGS, MANIFEST, NAVIGATION_RULES, STRUCTURE_PATTERNS, TRANSFORMS,
};
use crate::error::{CompileError, CompileErrorKind, CompileResult};

const EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// Load a pattern store directory.
///
/// # Example
///
/// ```ignore
/// use nomspan::compiler::load_pattern_store;
///
/// let store = load_pattern_store("patterns")?;
/// println!("{} providers", store.providers.len());
/// ```
pub fn load_pattern_store<P: AsRef<Path>>(root: P) -> CompileResult<PatternStore> {
    let root = root.as_ref();
    let manifest_file = document_file(MANIFEST);

    if !root.is_dir() {
        return Err(CompileError::store(
            root.display().to_string(),
            CompileErrorKind::Io("pattern store is not a directory".to_string()),
        ));
    }

    let manifest = match find_document(root, MANIFEST) {
        Some(path) => Some(parse_file::<Manifest>(&path, "*", &manifest_file)?),
        None => None,
    };

    let directories = provider_directories(root)?;
    let order = declaration_order(manifest.as_ref(), &directories)?;

    let mut providers = Vec::with_capacity(order.len());
    for id in order {
        providers.push(load_provider(&root.join(&id), &id)?);
    }

    tracing::debug!(
        root = %root.display(),
        providers = providers.len(),
        "Loaded pattern store"
    );

    Ok(PatternStore {
        root: Some(root.to_path_buf()),
        min_required_keys: manifest
            .as_ref()
            .map(|m| m.min_required_keys)
            .unwrap_or(DEFAULT_MIN_REQUIRED_KEYS),
        providers,
    })
}

/// Load the four documents of a single provider directory.
pub fn load_provider(dir: &Path, id: &str) -> CompileResult<ProviderPatterns> {
    let mut files = BTreeMap::new();
    let mut load = |doc: &str| -> CompileResult<(PathBuf, String)> {
        let (path, file) = locate_document(dir, id, doc)?;
        files.insert(doc.to_string(), file.clone());
        Ok((path, file))
    };
    let structure = load(STRUCTURE_PATTERNS)?;
    let navigation = load(NAVIGATION_RULES)?;
    let mappings = load(FIELD_MAPPINGS)?;
    let transforms = load(TRANSFORMS)?;

    Ok(ProviderPatterns {
        id: id.to_string(),
        structure: parse_file(&structure.0, id, &structure.1)?,
        navigation: parse_file(&navigation.0, id, &navigation.1)?,
        mappings: parse_file(&mappings.0, id, &mappings.1)?,
        transforms: parse_file(&transforms.0, id, &transforms.1)?,
        files,
    })
}

/// Newest modification time among the store's YAML files and directories.
///
/// Directories count so that adding, renaming or removing a provider
/// directory is seen even though no YAML file changed.
pub fn newest_modification<P: AsRef<Path>>(root: P) -> std::io::Result<Option<SystemTime>> {
    let root = root.as_ref();
    let mut newest = Some(fs::metadata(root)?.modified()?);
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let meta = entry.metadata()?;

            let modified = if meta.is_dir() {
                pending.push(path);
                meta.modified()?
            } else if has_yaml_extension(&path) {
                meta.modified()?
            } else {
                continue;
            };
            newest = newest.max(Some(modified));
        }
    }

    Ok(newest)
}

fn declaration_order(
    manifest: Option<&Manifest>,
    directories: &BTreeSet<String>,
) -> CompileResult<Vec<String>> {
    let manifest_file = document_file(MANIFEST);

    let Some(manifest) = manifest.filter(|m| !m.providers.is_empty()) else {
        return Ok(directories.iter().cloned().collect());
    };

    let mut seen = BTreeSet::new();
    for id in &manifest.providers {
        if !seen.insert(id.as_str()) {
            return Err(CompileError::store(
                &manifest_file,
                CompileErrorKind::DuplicateProvider(id.clone()),
            ));
        }
        if !directories.contains(id) {
            return Err(CompileError::store(
                &manifest_file,
                CompileErrorKind::UndeclaredDirectory(id.clone()),
            ));
        }
    }

    if let Some(unlisted) = directories.iter().find(|d| !seen.contains(d.as_str())) {
        return Err(CompileError::store(
            &manifest_file,
            CompileErrorKind::UnlistedDirectory(unlisted.clone()),
        ));
    }

    Ok(manifest.providers.clone())
}

fn provider_directories(root: &Path) -> CompileResult<BTreeSet<String>> {
    let io_error = |e: std::io::Error| {
        CompileError::store(root.display().to_string(), CompileErrorKind::Io(e.to_string()))
    };

    let mut directories = BTreeSet::new();
    for entry in fs::read_dir(root).map_err(io_error)? {
        let entry = entry.map_err(io_error)?;
        if !entry.file_type().map_err(io_error)?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        directories.insert(name);
    }
    Ok(directories)
}

fn find_document(dir: &Path, doc: &str) -> Option<PathBuf> {
    EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", doc, ext)))
        .find(|path| path.is_file())
}

/// Path of `doc` inside `dir` and the file name to report it under.
fn locate_document(dir: &Path, provider: &str, doc: &str) -> CompileResult<(PathBuf, String)> {
    let path = find_document(dir, doc).ok_or_else(|| {
        CompileError::new(provider, document_file(doc), CompileErrorKind::MissingFile)
    })?;
    let file = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| document_file(doc));
    Ok((path, file))
}

fn parse_file<T: DeserializeOwned>(path: &Path, provider: &str, file: &str) -> CompileResult<T> {
    let contents = fs::read_to_string(path)
        .map_err(|e| CompileError::new(provider, file, CompileErrorKind::Io(e.to_string())))?;

    serde_yaml::from_str(&contents)
        .map_err(|e| CompileError::new(provider, file, CompileErrorKind::Malformed(e.to_string())))
}

fn has_yaml_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| EXTENSIONS.contains(&ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_provider(root: &Path, id: &str) {
        let dir = root.join(id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("structure_patterns.yaml"),
            format!(
                "version: 1\nprovider: {id}\nsignatures:\n  - required: [{id}.a, {id}.b]\n"
            ),
        )
        .unwrap();
        fs::write(
            dir.join("navigation_rules.yaml"),
            format!("version: 1\nprovider: {id}\nrules: {{}}\n"),
        )
        .unwrap();
        fs::write(
            dir.join("field_mappings.yml"),
            format!("version: 1\nprovider: {id}\n"),
        )
        .unwrap();
        fs::write(
            dir.join("transforms.yaml"),
            format!("version: 1\nprovider: {id}\n"),
        )
        .unwrap();
    }

    #[test]
    fn test_load_without_manifest_sorts_directories() {
        let temp_dir = TempDir::new().unwrap();
        write_provider(temp_dir.path(), "zeta");
        write_provider(temp_dir.path(), "alpha");

        let store = load_pattern_store(temp_dir.path()).unwrap();

        assert_eq!(store.provider_ids(), vec!["alpha", "zeta"]);
        assert_eq!(store.min_required_keys, DEFAULT_MIN_REQUIRED_KEYS);
    }

    #[test]
    fn test_manifest_sets_order_and_minimum() {
        let temp_dir = TempDir::new().unwrap();
        write_provider(temp_dir.path(), "zeta");
        write_provider(temp_dir.path(), "alpha");
        fs::write(
            temp_dir.path().join("manifest.yaml"),
            "version: 1\nmin_required_keys: 1\nproviders: [zeta, alpha]\n",
        )
        .unwrap();

        let store = load_pattern_store(temp_dir.path()).unwrap();

        assert_eq!(store.provider_ids(), vec!["zeta", "alpha"]);
        assert_eq!(store.min_required_keys, 1);
    }

    #[test]
    fn test_manifest_must_list_every_directory() {
        let temp_dir = TempDir::new().unwrap();
        write_provider(temp_dir.path(), "zeta");
        write_provider(temp_dir.path(), "alpha");
        fs::write(temp_dir.path().join("manifest.yaml"), "providers: [zeta]\n").unwrap();

        let err = load_pattern_store(temp_dir.path()).unwrap_err();

        assert_eq!(err.kind, CompileErrorKind::UnlistedDirectory("alpha".to_string()));
    }

    #[test]
    fn test_missing_document_names_provider_and_file() {
        let temp_dir = TempDir::new().unwrap();
        write_provider(temp_dir.path(), "alpha");
        fs::remove_file(temp_dir.path().join("alpha/transforms.yaml")).unwrap();

        let err = load_pattern_store(temp_dir.path()).unwrap_err();

        assert_eq!(err.provider, "alpha");
        assert_eq!(err.file, "transforms.yaml");
        assert_eq!(err.kind, CompileErrorKind::MissingFile);
    }

    #[test]
    fn test_malformed_document() {
        let temp_dir = TempDir::new().unwrap();
        write_provider(temp_dir.path(), "alpha");
        fs::write(
            temp_dir.path().join("alpha/navigation_rules.yaml"),
            "version: 1\nprovider: alpha\nrules: [not, a, map]\n",
        )
        .unwrap();

        let err = load_pattern_store(temp_dir.path()).unwrap_err();

        assert_eq!(err.file, "navigation_rules.yaml");
        assert!(matches!(err.kind, CompileErrorKind::Malformed(_)));
    }

    #[test]
    fn test_newest_modification_sees_nested_files() {
        let temp_dir = TempDir::new().unwrap();
        write_provider(temp_dir.path(), "alpha");

        let newest = newest_modification(temp_dir.path()).unwrap();

        assert!(newest.is_some());
    }

    #[test]
    fn test_newest_modification_sees_removed_provider_directory() {
        let temp_dir = TempDir::new().unwrap();
        write_provider(temp_dir.path(), "alpha");
        write_provider(temp_dir.path(), "beta");
        let old = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        for path in [
            temp_dir.path().to_path_buf(),
            temp_dir.path().join("alpha"),
            temp_dir.path().join("beta"),
        ] {
            set_mtime(&path, old);
        }
        for id in ["alpha", "beta"] {
            for entry in fs::read_dir(temp_dir.path().join(id)).unwrap() {
                set_mtime(&entry.unwrap().path(), old);
            }
        }
        assert_eq!(newest_modification(temp_dir.path()).unwrap(), Some(old));

        fs::remove_dir_all(temp_dir.path().join("beta")).unwrap();

        let newest = newest_modification(temp_dir.path()).unwrap().unwrap();
        assert!(newest > old);
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        fs::File::open(path).unwrap().set_modified(time).unwrap();
    }
}
