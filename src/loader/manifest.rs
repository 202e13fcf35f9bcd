//! WebExtension manifest patching.
//!
//! Reads `manifest.json`, rewrites content-script matching rules, and
//! injects the hook script entries. Unknown manifest keys pass through
//! untouched.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::fs;

use super::{HOOK_FILES_DIR, LoaderError};

/// Background hook file name inside [`HOOK_FILES_DIR`].
pub const BACKGROUND_HOOK_FILE: &str = "background.js";

/// Content-script hook file name inside [`HOOK_FILES_DIR`].
pub const CONTENT_HOOK_FILE: &str = "contentscript.js";

/// The parts of a manifest this module rewrites; everything else is carried
/// in `rest`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Background scripts block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<Background>,
    /// Content script entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_scripts: Option<Vec<ContentScript>>,
    /// Untouched manifest keys.
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// Background scripts block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Background {
    /// Background script paths.
    #[serde(default)]
    pub scripts: Vec<String>,
    /// Untouched background keys.
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// One content-script entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentScript {
    /// Script paths.
    #[serde(default)]
    pub js: Vec<String>,
    /// URL match patterns.
    #[serde(default)]
    pub matches: Vec<String>,
    /// Whether the scripts run in every frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_frames: Option<bool>,
    /// URL patterns the scripts are excluded from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_matches: Option<Vec<String>>,
    /// Untouched entry keys.
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// Options for one patch run.
#[derive(Debug, Clone)]
pub struct PatchOptions {
    /// Extension alias (only used for logging here; the hook files carry it).
    pub alias: String,
    /// Skip hook entry injection.
    pub skip_hooks: bool,
    /// URL patterns for the test runner's own frames.
    pub runner_matches: Vec<String>,
}

impl Manifest {
    /// Loads a manifest from `<dir>/manifest.json`.
    pub async fn load(dir: &Path) -> Result<Self, LoaderError> {
        let path = dir.join("manifest.json");
        let content = fs::read_to_string(&path).await.map_err(|e| {
            LoaderError::Manifest(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let manifest: Self = serde_json::from_str(&content)
            .map_err(|e| LoaderError::Manifest(format!("Failed to parse manifest: {}", e)))?;
        Ok(manifest)
    }

    /// Writes the manifest to `<dir>/manifest.json`.
    pub async fn write(&self, dir: &Path) -> Result<(), LoaderError> {
        let path = dir.join("manifest.json");
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content).await?;
        Ok(())
    }

    /// Counts background script entries.
    #[must_use]
    pub fn background_script_count(&self) -> usize {
        self.background.as_ref().map_or(0, |b| b.scripts.len())
    }

    /// Counts content-script entries.
    #[must_use]
    pub fn content_script_count(&self) -> usize {
        self.content_scripts.as_ref().map_or(0, |cs| cs.len())
    }
}

/// Produces the patched manifest for a build.
///
/// Every existing content-script entry is rewritten to run in all frames and
/// to exclude the runner's own pages. When hooks are enabled, one background
/// script and one content-script entry are appended, both pointing into
/// [`HOOK_FILES_DIR`].
#[must_use]
pub fn patch(manifest: &Manifest, opts: &PatchOptions) -> Manifest {
    let mut patched = manifest.clone();

    if let Some(scripts) = patched.content_scripts.as_mut() {
        for entry in scripts.iter_mut() {
            entry.all_frames = Some(true);
            entry.exclude_matches = Some(opts.runner_matches.clone());
        }
    }

    if !opts.skip_hooks {
        tracing::debug!("Injecting hook entries into manifest for {}", opts.alias);

        let background = patched.background.get_or_insert_with(Background::default);
        background
            .scripts
            .push(format!("{}/{}", HOOK_FILES_DIR, BACKGROUND_HOOK_FILE));

        patched
            .content_scripts
            .get_or_insert_with(Vec::new)
            .push(ContentScript {
                js: vec![format!("{}/{}", HOOK_FILES_DIR, CONTENT_HOOK_FILE)],
                matches: vec!["<all_urls>".to_string()],
                all_frames: Some(false),
                exclude_matches: None,
                rest: Map::new(),
            });
    }

    patched
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_manifest() -> Manifest {
        serde_json::from_value(serde_json::json!({
            "manifest_version": 2,
            "name": "sample",
            "version": "1.0.0",
            "content_scripts": [
                { "js": ["main.js"], "matches": ["https://example.com/*"] }
            ],
            "background": { "scripts": ["bg.js"], "persistent": true }
        }))
        .expect("manifest")
    }

    fn opts(skip_hooks: bool) -> PatchOptions {
        PatchOptions {
            alias: "sample".to_string(),
            skip_hooks,
            runner_matches: vec!["*://*/*/integration/*".to_string()],
        }
    }

    #[test]
    fn test_patch_rewrites_existing_content_scripts() {
        let patched = patch(&sample_manifest(), &opts(false));
        let scripts = patched.content_scripts.unwrap();

        assert_eq!(scripts[0].all_frames, Some(true));
        assert_eq!(
            scripts[0].exclude_matches.as_deref(),
            Some(&["*://*/*/integration/*".to_string()][..])
        );
        // Original fields survive
        assert_eq!(scripts[0].js, vec!["main.js".to_string()]);
    }

    #[test]
    fn test_patch_appends_exactly_one_of_each_hook_entry() {
        let original = sample_manifest();
        let patched = patch(&original, &opts(false));

        assert_eq!(
            patched.background_script_count(),
            original.background_script_count() + 1
        );
        assert_eq!(
            patched.content_script_count(),
            original.content_script_count() + 1
        );

        let hook_entry = patched.content_scripts.unwrap().pop().unwrap();
        assert_eq!(hook_entry.js, vec!["webext-rig-hooks/contentscript.js"]);
        assert_eq!(hook_entry.matches, vec!["<all_urls>"]);
        assert_eq!(hook_entry.all_frames, Some(false));
    }

    #[test]
    fn test_patch_with_skip_hooks_adds_nothing() {
        let original = sample_manifest();
        let patched = patch(&original, &opts(true));

        assert_eq!(
            patched.background_script_count(),
            original.background_script_count()
        );
        assert_eq!(
            patched.content_script_count(),
            original.content_script_count()
        );
    }

    #[test]
    fn test_patch_tolerates_missing_content_scripts() {
        let manifest: Manifest = serde_json::from_value(serde_json::json!({
            "manifest_version": 2,
            "name": "bare",
            "version": "0.1.0"
        }))
        .expect("manifest");

        let patched = patch(&manifest, &opts(false));
        assert_eq!(patched.content_script_count(), 1);
        assert_eq!(patched.background_script_count(), 1);
    }

    #[test]
    fn test_unknown_keys_round_trip() {
        let manifest = sample_manifest();
        let patched = patch(&manifest, &opts(false));

        let value = serde_json::to_value(&patched).unwrap();
        assert_eq!(value["manifest_version"], 2);
        assert_eq!(value["name"], "sample");
        assert_eq!(value["background"]["persistent"], true);
    }

    #[test]
    fn test_patch_does_not_mutate_input() {
        let manifest = sample_manifest();
        let _ = patch(&manifest, &opts(false));
        assert_eq!(manifest.content_script_count(), 1);
        assert_eq!(manifest.background_script_count(), 1);
    }
}
