//! Integration tests for bundle loading in production and development mode

mod common;

use chrono::{Datelike, TimeZone, Utc};
use common::{attrs, StoreBuilder};
use nomspan::runtime::loader::read_metadata;
use nomspan::runtime::{BUNDLE_FILE, META_FILE};
use nomspan::{
    compile_dir, BundleLoadError, BundleLoader, BundleMetadata, CompileOptions, EngineError,
    NormalizationEngine, NormalizerConfig,
};
use serde_json::json;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn compiled_store() -> (StoreBuilder, TempDir) {
    let store = StoreBuilder::new().provider("alpha", &[&["a.one", "a.two"]]);
    let out = TempDir::new().unwrap();
    compile_dir(store.path(), &CompileOptions::default())
        .unwrap()
        .write_to(out.path())
        .unwrap();
    (store, out)
}

fn rewrite_timestamp(bundle_dir: &std::path::Path, year: i32) {
    let path = bundle_dir.join(META_FILE);
    let mut meta: BundleMetadata = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    meta.build_timestamp = Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap();
    fs::write(&path, meta.to_bytes().unwrap()).unwrap();
}

#[test]
fn test_production_missing_bundle() {
    let out = TempDir::new().unwrap();
    let loader = BundleLoader::new(NormalizerConfig::production(out.path().join("absent")));

    let err = loader.load().unwrap_err();

    assert!(matches!(err, BundleLoadError::Missing(_)));
}

#[test]
fn test_production_loads_compiled_bundle() {
    let (_store, out) = compiled_store();
    let loader = BundleLoader::new(NormalizerConfig::production(out.path()));

    let bundle = loader.load().unwrap();

    assert_eq!(bundle.provider_ids(), vec!["alpha"]);
}

#[test]
fn test_production_rejects_tampered_bundle() {
    let (_store, out) = compiled_store();
    let path = out.path().join(BUNDLE_FILE);
    let mut bytes = fs::read(&path).unwrap();
    bytes.extend_from_slice(b" ");
    fs::write(&path, bytes).unwrap();

    let loader = BundleLoader::new(NormalizerConfig::production(out.path()));
    let err = loader.load().unwrap_err();

    assert!(matches!(err, BundleLoadError::Corrupt { .. }));
}

#[test]
fn test_cache_returns_same_bundle_until_invalidated() {
    let (_store, out) = compiled_store();
    let loader = BundleLoader::new(NormalizerConfig::production(out.path()));

    let first = loader.load().unwrap();
    let second = loader.load().unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    loader.invalidate();
    let third = loader.load().unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(*first, *third);
}

#[test]
fn test_failed_reload_keeps_cached_bundle() {
    let (_store, out) = compiled_store();
    let loader = BundleLoader::new(NormalizerConfig::production(out.path()));
    let cached = loader.load().unwrap();

    fs::remove_file(out.path().join(BUNDLE_FILE)).unwrap();

    assert!(loader.reload().is_err());
    assert!(Arc::ptr_eq(&cached, &loader.load().unwrap()));
}

#[test]
fn test_development_compiles_missing_bundle() {
    let store = StoreBuilder::new().provider("alpha", &[&["a.one", "a.two"]]);
    let out = TempDir::new().unwrap();
    let bundle_dir = out.path().join("bundle");
    let loader = BundleLoader::new(NormalizerConfig::development(&bundle_dir, store.path()));

    let bundle = loader.load().unwrap();

    assert!(loader.is_development());
    assert_eq!(bundle.provider_ids(), vec!["alpha"]);
    assert!(bundle_dir.join(BUNDLE_FILE).is_file());
    assert!(bundle_dir.join(META_FILE).is_file());
}

#[test]
fn test_development_recompiles_when_store_is_newer() {
    let (store, out) = compiled_store();
    rewrite_timestamp(out.path(), 2000);

    let loader = BundleLoader::new(NormalizerConfig::development(out.path(), store.path()));
    loader.load().unwrap();

    let meta = read_metadata(out.path()).unwrap().unwrap();
    assert!(meta.build_timestamp.year() > 2000);
}

#[test]
fn test_development_reuses_fresh_bundle() {
    let (store, out) = compiled_store();
    rewrite_timestamp(out.path(), 2999);

    let loader = BundleLoader::new(NormalizerConfig::development(out.path(), store.path()));
    loader.load().unwrap();

    let meta = read_metadata(out.path()).unwrap().unwrap();
    assert_eq!(meta.build_timestamp.year(), 2999);
}

#[test]
fn test_development_surfaces_compile_error() {
    let store = StoreBuilder::new()
        .provider("alpha", &[&["a.one", "a.two"]])
        .remove("alpha", "navigation_rules.yaml");
    let out = TempDir::new().unwrap();
    let loader = BundleLoader::new(NormalizerConfig::development(out.path(), store.path()));

    let err = loader.load().unwrap_err();

    match err {
        BundleLoadError::Compile(e) => {
            assert_eq!(e.provider, "alpha");
            assert_eq!(e.file, "navigation_rules.yaml");
        }
        other => panic!("expected compile error, got {}", other),
    }
}

#[test]
fn test_engine_reload_picks_up_store_changes() {
    let store = StoreBuilder::new().provider("alpha", &[&["a.one", "a.two"]]);
    let out = TempDir::new().unwrap();
    let loader = BundleLoader::new(NormalizerConfig::development(out.path(), store.path()));
    let engine = NormalizationEngine::from_loader(&loader).unwrap();

    let input = attrs(json!({"b.one": 1, "b.two": 2}));
    assert_eq!(engine.detect(&input), "unknown");

    let store = store.provider("beta", &[&["b.one", "b.two"]]);
    rewrite_timestamp(out.path(), 2000);
    engine.reload(&loader).unwrap();

    assert_eq!(engine.detect(&input), "beta");
    drop(store);
}

#[test]
fn test_engine_from_loader_reports_load_error() {
    let out = TempDir::new().unwrap();
    let loader = BundleLoader::new(NormalizerConfig::production(out.path()));

    let err = NormalizationEngine::from_loader(&loader).err().unwrap();

    assert!(matches!(err, EngineError::Load(BundleLoadError::Missing(_))));
}
