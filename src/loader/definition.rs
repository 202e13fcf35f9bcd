//! Extension definitions.
//!
//! An [`ExtensionSpec`] is what the host runner hands us; an
//! [`ExtensionDefinition`] is the fully-defaulted record a session keeps per
//! alias.

use std::path::{Path, PathBuf};

use crate::config::Config;

/// Default URL patterns identifying the test runner's own control frames.
/// Content scripts are excluded from these so hook injection never
/// contaminates the runner's pages.
pub const DEFAULT_RUNNER_MATCHES: &[&str] = &["*://*/*/integration/*"];

/// Default browsers an extension loads under.
pub const DEFAULT_VALID_BROWSERS: &[&str] = &["chrome"];

/// User-supplied options for one extension to load.
#[derive(Debug, Clone, Default)]
pub struct ExtensionSpec {
    /// Path to an unpacked extension directory or a packed archive.
    pub source: PathBuf,
    /// Identifier distinguishing this extension from others in the session.
    pub alias: Option<String>,
    /// Browser names this extension loads under. `None` keeps the default
    /// (`chrome`); an explicit empty list matches every browser.
    pub valid_browsers: Option<Vec<String>>,
    /// Skip hook injection entirely.
    pub skip_hooks: bool,
    /// Rebuild when the source changes.
    pub watch: Option<bool>,
    /// Override for the runner-frame exclusion patterns.
    pub runner_matches: Option<Vec<String>>,
    /// Override for the background hook template.
    pub background_hook_template: Option<String>,
    /// Override for the content-script hook template.
    pub content_hook_template: Option<String>,
}

impl ExtensionSpec {
    /// Creates a spec for a source path with all defaults.
    #[must_use]
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    /// Sets the alias.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Sets the valid browsers. An empty list matches every browser.
    #[must_use]
    pub fn valid_browsers(mut self, browsers: Vec<String>) -> Self {
        self.valid_browsers = Some(browsers);
        self
    }

    /// Skips hook injection.
    #[must_use]
    pub fn skip_hooks(mut self) -> Self {
        self.skip_hooks = true;
        self
    }

    /// Enables or disables source watching (default: enabled).
    #[must_use]
    pub fn watch(mut self, watch: bool) -> Self {
        self.watch = Some(watch);
        self
    }
}

/// Fully-resolved record for one extension, kept per alias for the lifetime
/// of a session.
#[derive(Debug, Clone)]
pub struct ExtensionDefinition {
    /// Unique identifier within the session.
    pub alias: String,
    /// Path to the extension source (directory or packed archive).
    pub source: PathBuf,
    /// Working directory the build materializes into. Pure function of the
    /// alias, so rebuilds are idempotent and aliases cannot collide.
    pub dest_dir: PathBuf,
    /// Browser names this extension loads under; empty matches all.
    pub valid_browsers: Vec<String>,
    /// Whether hook injection is skipped.
    pub skip_hooks: bool,
    /// Whether the source is watched for changes.
    pub watch: bool,
    /// URL patterns excluded from the extension's own content scripts.
    pub runner_matches: Vec<String>,
    /// Background hook template (`{{alias}}` placeholder).
    pub background_hook_template: String,
    /// Content-script hook template (`{{alias}}` placeholder).
    pub content_hook_template: String,
}

impl ExtensionDefinition {
    /// Resolves a spec against the harness configuration.
    #[must_use]
    pub fn resolve(spec: ExtensionSpec, config: &Config) -> Self {
        let alias = spec
            .alias
            .unwrap_or_else(|| config.default_alias.clone());
        let dest_dir = dest_dir_for(&config.work_dir(), &alias);

        Self {
            alias,
            source: spec.source,
            dest_dir,
            valid_browsers: spec.valid_browsers.unwrap_or_else(|| {
                DEFAULT_VALID_BROWSERS.iter().map(|b| (*b).to_string()).collect()
            }),
            skip_hooks: spec.skip_hooks,
            watch: spec.watch.unwrap_or(true),
            runner_matches: spec.runner_matches.unwrap_or_else(|| {
                DEFAULT_RUNNER_MATCHES.iter().map(|m| (*m).to_string()).collect()
            }),
            background_hook_template: spec
                .background_hook_template
                .unwrap_or_else(|| crate::loader::hooks::BACKGROUND_TEMPLATE.to_string()),
            content_hook_template: spec
                .content_hook_template
                .unwrap_or_else(|| crate::loader::hooks::CONTENT_TEMPLATE.to_string()),
        }
    }

    /// Whether this extension loads under the named browser.
    #[must_use]
    pub fn loads_under(&self, browser: &str) -> bool {
        self.valid_browsers.is_empty() || self.valid_browsers.iter().any(|b| b == browser)
    }
}

/// Derives the working directory for an alias.
#[must_use]
pub fn dest_dir_for(work_dir: &Path, alias: &str) -> PathBuf {
    work_dir.join(alias)
}
