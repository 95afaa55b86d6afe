use std::path::Path;

use mint_avatar_core::descriptor::ModelDescriptor;
use mint_avatar_core::sanitizer::SANITIZED_DESCRIPTOR;
use mint_avatar_core::AssetSanitizer;
use mint_avatar_test_fixtures::models;

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

fn assert_all_refs_resolve(out: &Path) {
    let desc = ModelDescriptor::load(out).expect("sanitized descriptor parses");
    let base = out.parent().unwrap();
    let refs = &desc.file_references;
    let mut files: Vec<String> = refs.moc.iter().cloned().collect();
    files.extend(refs.textures.iter().cloned());
    files.extend(refs.physics.iter().cloned());
    files.extend(refs.expressions.iter().map(|e| e.file.clone()));
    for group in desc.motion_groups() {
        files.extend(desc.motions(&group).into_iter().map(|m| m.file));
    }
    assert!(!files.is_empty());
    for f in files {
        assert!(f.is_ascii(), "non-ASCII reference {f}");
        assert!(base.join(&f).is_file(), "missing {f}");
    }
}

/// it should produce an ASCII-only descriptor whose references all resolve
#[test]
fn non_ascii_model_is_rewritten_into_cache() {
    init_tracing();
    let model = models::materialize("mint", "mint").unwrap();
    let mut sanitizer = AssetSanitizer::new(&model.cache);

    let out = sanitizer.sanitize(&model.descriptor);
    assert_ne!(out, model.descriptor);
    assert_eq!(out.file_name().unwrap(), SANITIZED_DESCRIPTOR);
    assert!(out.starts_with(model.cache.canonicalize().unwrap()));
    assert!(out.to_string_lossy().is_ascii());
    assert_all_refs_resolve(&out);

    let raw = std::fs::read_to_string(&out).unwrap();
    assert!(raw.is_ascii(), "descriptor text must be ASCII");
}

/// it should keep ASCII motion group names and the expression numbering
#[test]
fn groups_and_expression_ids_survive() {
    let model = models::materialize("mint", "mint").unwrap();
    let mut sanitizer = AssetSanitizer::new(&model.cache);
    let out = sanitizer.sanitize(&model.descriptor);
    let desc = ModelDescriptor::load(&out).unwrap();

    let groups = desc.motion_groups();
    assert!(groups.iter().any(|g| g == "Idle"));
    assert!(groups.iter().any(|g| g == "TapBody"));
    assert_eq!(groups.len(), 3);
    assert!(groups.iter().all(|g| g.is_ascii()));
    assert_eq!(desc.motions("TapBody").len(), 2);

    let names: Vec<&str> = desc
        .expressions()
        .iter()
        .filter_map(|e| e.name.as_deref())
        .collect();
    // listed entries keep their slot, unlisted files follow in name order
    assert_eq!(names, ["expr_01", "expr_02", "expr_03", "wink", "expr_05", "expr_06"]);
}

/// it should answer repeat calls without reading or copying anything
#[test]
fn repeat_calls_are_free() {
    let model = models::materialize("mint", "mint").unwrap();
    let mut sanitizer = AssetSanitizer::new(&model.cache);

    let first = sanitizer.sanitize(&model.descriptor);
    let after_first = sanitizer.stats();
    assert_eq!(after_first.passes, 1);
    assert_eq!(after_first.descriptors_written, 1);
    assert!(after_first.files_copied > 0);

    let second = sanitizer.sanitize(&model.descriptor);
    let after_second = sanitizer.stats();
    assert_eq!(first, second);
    assert_eq!(after_second.passes, 1);
    assert_eq!(after_second.descriptor_reads, after_first.descriptor_reads);
    assert_eq!(after_second.files_copied, after_first.files_copied);
    assert_eq!(after_second.snapshot_hits, 1);
}

/// it should reuse a warm on-disk cache from a fresh sanitizer
#[test]
fn warm_disk_cache_skips_copies() {
    let model = models::materialize("mint", "mint").unwrap();
    let first = AssetSanitizer::new(&model.cache).sanitize(&model.descriptor);

    let mut cold = AssetSanitizer::new(&model.cache);
    let again = cold.sanitize(&model.descriptor);
    assert_eq!(first, again);
    let stats = cold.stats();
    assert_eq!(stats.passes, 1);
    assert_eq!(stats.files_copied, 0);
    assert_eq!(stats.descriptors_written, 0);
}

/// it should redo exactly one pass after a referenced file changes
#[test]
fn touched_source_triggers_single_repass() {
    let model = models::materialize("mint", "mint").unwrap();
    let mut sanitizer = AssetSanitizer::new(&model.cache);
    sanitizer.sanitize(&model.descriptor);
    let before = sanitizer.stats();

    model.touch("哭哭.exp3.json").unwrap();
    sanitizer.sanitize(&model.descriptor);
    let after = sanitizer.stats();
    assert_eq!(after.passes, before.passes + 1);
    assert_eq!(after.files_copied, before.files_copied + 1);
    assert_eq!(after.descriptors_written, before.descriptors_written + 1);

    sanitizer.sanitize(&model.descriptor);
    let settled = sanitizer.stats();
    assert_eq!(settled.passes, after.passes);
    assert_eq!(settled.snapshot_hits, after.snapshot_hits + 1);
}

/// it should copy core files into the cache when the model folder is non-ASCII
#[test]
fn non_ascii_folder_copies_core_assets() {
    let model = models::materialize("mint", "薄荷 模型").unwrap();
    let mut sanitizer = AssetSanitizer::new(&model.cache);
    let out = sanitizer.sanitize(&model.descriptor);
    assert_ne!(out, model.descriptor);
    assert_all_refs_resolve(&out);

    let desc = ModelDescriptor::load(&out).unwrap();
    let moc = desc.file_references.moc.unwrap();
    assert!(!moc.contains(".."), "core reference escapes the cache: {moc}");
    for tex in &desc.file_references.textures {
        assert!(!tex.contains(".."));
    }
}

/// it should hand back an ASCII model untouched
#[test]
fn ascii_model_passes_through() {
    let model = models::materialize("plain", "plain").unwrap();
    let mut sanitizer = AssetSanitizer::new(&model.cache);
    assert_eq!(sanitizer.sanitize(&model.descriptor), model.descriptor);
    assert_eq!(sanitizer.stats().files_copied, 0);
    assert_eq!(sanitizer.stats().descriptors_written, 0);
    assert!(!model.cache.exists());

    sanitizer.sanitize(&model.descriptor);
    assert_eq!(sanitizer.stats().passes, 1);
}

/// it should fall back to the given path when the descriptor is missing
#[test]
fn missing_descriptor_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("gone.model3.json");
    let mut sanitizer = AssetSanitizer::new(dir.path().join("cache"));
    assert_eq!(sanitizer.sanitize(&missing), missing);
}
