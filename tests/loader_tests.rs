//! Integration tests for the extension build pipeline.
//!
//! These drive the loader end-to-end on temp-dir fixtures:
//! - manifest patching deltas with and without hooks
//! - idempotent rebuilds into deterministic working directories
//! - packed (zip/CRX) source extraction
//! - launch argument computation and merging
//! - watch-triggered rebuilds and session teardown

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use serde_json::{Value, json};
use tempfile::TempDir;

use webext_rig::config::Config;
use webext_rig::loader::{
    BrowserDescriptor, ExtensionSpec, HOOK_FILES_DIR, LOAD_EXTENSION_FLAG, LoaderError, Session,
    build_extension, compute_args,
};
use webext_rig::loader::definition::ExtensionDefinition;

// ============================================================================
// Fixtures
// ============================================================================

fn write_unpacked_fixture(dir: &Path) {
    std::fs::create_dir_all(dir.join("scripts")).unwrap();
    std::fs::write(
        dir.join("manifest.json"),
        serde_json::to_string_pretty(&json!({
            "manifest_version": 2,
            "name": "fixture",
            "version": "1.0.0",
            "background": { "scripts": ["scripts/bg.js"] },
            "content_scripts": [
                { "js": ["scripts/cs.js"], "matches": ["https://example.com/*"] }
            ]
        }))
        .unwrap(),
    )
    .unwrap();
    std::fs::write(dir.join("scripts/bg.js"), "// bg").unwrap();
    std::fs::write(dir.join("scripts/cs.js"), "// cs").unwrap();
}

fn config_with_work_dir(work: &TempDir) -> Config {
    Config {
        work_dir: Some(work.path().to_path_buf()),
        ..Config::default()
    }
}

fn read_manifest(dir: &Path) -> Value {
    let content = std::fs::read_to_string(dir.join("manifest.json")).unwrap();
    serde_json::from_str(&content).unwrap()
}

fn background_count(manifest: &Value) -> usize {
    manifest["background"]["scripts"].as_array().map_or(0, Vec::len)
}

fn content_script_count(manifest: &Value) -> usize {
    manifest["content_scripts"].as_array().map_or(0, Vec::len)
}

fn resolve(spec: ExtensionSpec, config: &Config) -> ExtensionDefinition {
    ExtensionDefinition::resolve(spec, config)
}

// ============================================================================
// Build pipeline
// ============================================================================

mod build_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_build_copies_source_and_injects_hooks() {
        let source = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        write_unpacked_fixture(source.path());
        let config = config_with_work_dir(&work);

        let def = resolve(
            ExtensionSpec::new(source.path()).alias("unpacked1").watch(false),
            &config,
        );
        build_extension(&def).await.unwrap();

        // Source files copied
        assert!(def.dest_dir.join("scripts/bg.js").exists());
        assert!(def.dest_dir.join("scripts/cs.js").exists());

        // Hook files written with the alias substituted
        let hook_dir = def.dest_dir.join(HOOK_FILES_DIR);
        let bg_hook = std::fs::read_to_string(hook_dir.join("background.js")).unwrap();
        let cs_hook = std::fs::read_to_string(hook_dir.join("contentscript.js")).unwrap();
        assert!(bg_hook.contains("'unpacked1'"));
        assert!(cs_hook.contains("'unpacked1'"));
        assert!(!bg_hook.contains("{{alias}}"));

        // Manifest gained exactly one background and one content-script entry
        let patched = read_manifest(&def.dest_dir);
        assert_eq!(background_count(&patched), 2);
        assert_eq!(content_script_count(&patched), 2);

        // Existing entries rewritten for cross-frame execution
        let first = &patched["content_scripts"][0];
        assert_eq!(first["all_frames"], json!(true));
        assert_eq!(first["exclude_matches"], json!(["*://*/*/integration/*"]));

        // Injected entry references the hook dir and stays out of subframes
        let injected = &patched["content_scripts"][1];
        assert_eq!(injected["js"], json!(["webext-rig-hooks/contentscript.js"]));
        assert_eq!(injected["matches"], json!(["<all_urls>"]));
        assert_eq!(injected["all_frames"], json!(false));
    }

    #[tokio::test]
    async fn test_skip_hooks_leaves_manifest_counts_unchanged() {
        let source = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        write_unpacked_fixture(source.path());
        let config = config_with_work_dir(&work);

        let def = resolve(
            ExtensionSpec::new(source.path())
                .alias("hookless")
                .skip_hooks()
                .watch(false),
            &config,
        );
        build_extension(&def).await.unwrap();

        let patched = read_manifest(&def.dest_dir);
        assert_eq!(background_count(&patched), 1);
        assert_eq!(content_script_count(&patched), 1);
        assert!(!def.dest_dir.join(HOOK_FILES_DIR).exists());

        // Existing entries are still rewritten
        assert_eq!(patched["content_scripts"][0]["all_frames"], json!(true));
    }

    #[tokio::test]
    async fn test_rebuild_replaces_stale_files() {
        let source = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        write_unpacked_fixture(source.path());
        let config = config_with_work_dir(&work);

        let def = resolve(
            ExtensionSpec::new(source.path()).alias("rebuilt").watch(false),
            &config,
        );
        build_extension(&def).await.unwrap();

        // A file that disappears from the source must not survive a rebuild
        std::fs::write(def.dest_dir.join("stale.js"), "// stale").unwrap();
        std::fs::remove_file(source.path().join("scripts/cs.js")).unwrap();

        build_extension(&def).await.unwrap();
        assert!(!def.dest_dir.join("stale.js").exists());
        assert!(!def.dest_dir.join("scripts/cs.js").exists());
        assert!(def.dest_dir.join("scripts/bg.js").exists());
    }

    #[tokio::test]
    async fn test_missing_source_is_source_not_found() {
        let work = TempDir::new().unwrap();
        let config = config_with_work_dir(&work);
        let def = resolve(
            ExtensionSpec::new("/no/such/extension").watch(false),
            &config,
        );

        let err = build_extension(&def).await.unwrap_err();
        assert!(matches!(err, LoaderError::SourceNotFound(_)));
        assert!(err.to_string().contains("/no/such/extension"));
    }

    #[tokio::test]
    async fn test_packed_zip_source_is_extracted() {
        let work = TempDir::new().unwrap();
        let archive_dir = TempDir::new().unwrap();
        let archive_path = archive_dir.path().join("packed.zip");

        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("manifest.json", options).unwrap();
            writer
                .write_all(
                    serde_json::to_string(&json!({
                        "manifest_version": 2,
                        "name": "packed",
                        "version": "2.0.0"
                    }))
                    .unwrap()
                    .as_bytes(),
                )
                .unwrap();
            writer.start_file("popup.js", options).unwrap();
            writer.write_all(b"// popup").unwrap();
            writer.finish().unwrap();
        }
        std::fs::write(&archive_path, cursor.into_inner()).unwrap();

        let config = config_with_work_dir(&work);
        let def = resolve(
            ExtensionSpec::new(&archive_path).alias("crxpacked").watch(false),
            &config,
        );
        build_extension(&def).await.unwrap();

        assert!(def.dest_dir.join("popup.js").exists());
        let patched = read_manifest(&def.dest_dir);
        // No content scripts in the source; hooks still add exactly one
        assert_eq!(content_script_count(&patched), 1);
        assert_eq!(background_count(&patched), 1);
    }
}

// ============================================================================
// Launch arguments
// ============================================================================

mod launch_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_merge_into_existing_flag_never_duplicates() {
        let work = TempDir::new().unwrap();
        let config = config_with_work_dir(&work);
        let defs = vec![
            resolve(ExtensionSpec::new("/a").alias("one").watch(false), &config),
            resolve(ExtensionSpec::new("/b").alias("two").watch(false), &config),
        ];

        let args = compute_args(
            &defs,
            &BrowserDescriptor::new("chrome"),
            vec!["--load-extension=/pre/existing".to_string()],
        );

        assert_eq!(args.len(), 1);
        let flag_count = args
            .iter()
            .filter(|a| a.starts_with(LOAD_EXTENSION_FLAG))
            .count();
        assert_eq!(flag_count, 1);

        let value = args[0].strip_prefix(LOAD_EXTENSION_FLAG).unwrap();
        let dirs: Vec<&str> = value.split(',').collect();
        assert_eq!(dirs.len(), 3);
        assert_eq!(dirs[0], "/pre/existing");
    }

    #[test]
    fn test_browser_filter_applies_per_definition() {
        let work = TempDir::new().unwrap();
        let config = config_with_work_dir(&work);
        let defs = vec![
            resolve(
                ExtensionSpec::new("/a")
                    .alias("chrome-only")
                    .watch(false),
                &config,
            ),
            resolve(
                ExtensionSpec::new("/b")
                    .alias("everywhere")
                    .valid_browsers(vec![])
                    .watch(false),
                &config,
            ),
        ];

        let args = compute_args(&defs, &BrowserDescriptor::new("electron"), vec![]);
        assert_eq!(args.len(), 1);
        assert!(args[0].contains("everywhere"));
        assert!(!args[0].contains("chrome-only"));
    }
}

// ============================================================================
// Sessions
// ============================================================================

mod session_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_before_launch_waits_for_builds_and_merges_args() {
        let source = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        write_unpacked_fixture(source.path());
        let config = config_with_work_dir(&work);

        let mut session = Session::start_with_config(
            vec![
                ExtensionSpec::new(source.path()).alias("first").watch(false),
                ExtensionSpec::new(source.path()).alias("second").watch(false),
            ],
            &config,
        )
        .unwrap();

        let args = session
            .before_launch(&BrowserDescriptor::new("chrome"), vec![])
            .await
            .unwrap();

        assert_eq!(args.len(), 1);
        let value = args[0].strip_prefix(LOAD_EXTENSION_FLAG).unwrap();
        for dir in value.split(',') {
            // The barrier ran: every listed directory is fully populated
            assert!(Path::new(dir).join("manifest.json").exists());
            assert!(Path::new(dir).join(HOOK_FILES_DIR).exists());
        }
    }

    #[tokio::test]
    async fn test_one_failing_build_does_not_abort_siblings() {
        let source = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        write_unpacked_fixture(source.path());
        let config = config_with_work_dir(&work);

        let mut session = Session::start_with_config(
            vec![
                ExtensionSpec::new("/missing/source").alias("broken").watch(false),
                ExtensionSpec::new(source.path()).alias("healthy").watch(false),
            ],
            &config,
        )
        .unwrap();

        let err = session.wait_for_builds().await.unwrap_err();
        assert!(matches!(err, LoaderError::SourceNotFound(_)));

        // The healthy sibling still built to completion
        let healthy = session.definition("healthy").unwrap();
        assert!(healthy.dest_dir.join("manifest.json").exists());
    }

    #[tokio::test]
    async fn test_watch_triggers_rebuild_into_same_dest_dir() {
        let source = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        write_unpacked_fixture(source.path());
        let config = config_with_work_dir(&work);

        let mut session = Session::start_with_config(
            vec![ExtensionSpec::new(source.path()).alias("watched")],
            &config,
        )
        .unwrap();
        session.wait_for_builds().await.unwrap();
        assert_eq!(session.watcher_count(), 1);

        let dest_dir = session.definition("watched").unwrap().dest_dir.clone();
        assert!(!dest_dir.join("added.js").exists());

        // Touch the source and wait for the rebuild to land
        std::fs::write(source.path().join("added.js"), "// added").unwrap();
        let mut rebuilt = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if dest_dir.join("added.js").exists() {
                rebuilt = true;
                break;
            }
        }
        assert!(rebuilt, "watcher did not rebuild within 10s");

        session.close();
        assert_eq!(session.watcher_count(), 0);
    }
}

// ============================================================================
// Properties
// ============================================================================

mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_dest_dir_depends_only_on_alias(
            alias in "[a-zA-Z0-9_-]{1,24}",
            source_a in "[a-z]{1,12}",
            source_b in "[a-z]{1,12}",
        ) {
            let config = Config::default();
            let first = ExtensionDefinition::resolve(
                ExtensionSpec::new(format!("/{}", source_a)).alias(&alias),
                &config,
            );
            let second = ExtensionDefinition::resolve(
                ExtensionSpec::new(format!("/{}", source_b)).alias(&alias),
                &config,
            );
            prop_assert_eq!(first.dest_dir, second.dest_dir);
        }

        #[test]
        fn prop_arg_merge_produces_at_most_one_flag(
            aliases in proptest::collection::vec("[a-z]{1,8}", 0..4),
            preexisting in proptest::option::of("[a-z/]{1,16}"),
        ) {
            let config = Config::default();
            let defs: Vec<ExtensionDefinition> = aliases
                .iter()
                .enumerate()
                .map(|(i, alias)| ExtensionDefinition::resolve(
                    ExtensionSpec::new("/src").alias(format!("{}{}", alias, i)).watch(false),
                    &config,
                ))
                .collect();

            let mut args = vec!["--headless".to_string()];
            if let Some(dir) = preexisting {
                args.push(format!("--load-extension={}", dir));
            }

            let merged = compute_args(&defs, &BrowserDescriptor::new("chrome"), args);
            let flag_count = merged
                .iter()
                .filter(|a| a.starts_with(LOAD_EXTENSION_FLAG))
                .count();
            prop_assert!(flag_count <= 1);
        }
    }
}
