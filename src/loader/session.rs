//! Registration sessions.
//!
//! A [`Session`] owns everything one registration call creates: the resolved
//! definitions, the in-flight build tasks, and the source watchers. Starting
//! a new session for the next run simply replaces the old one; dropping it
//! closes all watchers, so repeated browser relaunches never accumulate
//! stale handles.

use std::collections::HashSet;

use tokio::task::JoinHandle;
use tracing::warn;

use crate::config::Config;

use super::build::build_extension;
use super::definition::{ExtensionDefinition, ExtensionSpec};
use super::launch::{BrowserDescriptor, compute_args};
use super::watcher::WatcherSet;
use super::LoaderError;

/// One registration session of extensions to load.
pub struct Session {
    definitions: Vec<ExtensionDefinition>,
    builds: Vec<JoinHandle<Result<(), LoaderError>>>,
    watchers: WatcherSet,
}

impl Session {
    /// Resolves the specs, kicks off one build task per definition, and
    /// starts the requested watchers. Builds run concurrently; await
    /// [`Session::wait_for_builds`] before launching a browser.
    pub async fn start(specs: Vec<ExtensionSpec>) -> Result<Self, LoaderError> {
        Self::start_with_config(specs, &Config::load())
    }

    /// Like [`Session::start`] with an explicit configuration.
    pub fn start_with_config(
        specs: Vec<ExtensionSpec>,
        config: &Config,
    ) -> Result<Self, LoaderError> {
        let definitions: Vec<ExtensionDefinition> = specs
            .into_iter()
            .map(|spec| ExtensionDefinition::resolve(spec, config))
            .collect();

        let mut seen = HashSet::new();
        for def in &definitions {
            if !seen.insert(def.alias.clone()) {
                return Err(LoaderError::DuplicateAlias(def.alias.clone()));
            }
        }

        let mut session = Self {
            definitions,
            builds: Vec::new(),
            watchers: WatcherSet::new(),
        };

        for def in &session.definitions {
            let build_def = def.clone();
            session
                .builds
                .push(tokio::spawn(async move { build_extension(&build_def).await }));
        }

        // Watch after the builds are in flight; a watcher failure should not
        // cancel sibling builds, so it is reported but not fatal
        for def in &session.definitions {
            if let Err(e) = session.watchers.watch(def) {
                warn!("Could not watch {}: {}", def.alias, e);
            }
        }

        Ok(session)
    }

    /// Join barrier: waits for every build started by this session.
    ///
    /// All builds are driven to completion even when one fails; the first
    /// failure is returned afterwards, so one broken extension never aborts
    /// its siblings mid-copy.
    pub async fn wait_for_builds(&mut self) -> Result<(), LoaderError> {
        let mut first_error = None;

        for handle in self.builds.drain(..) {
            let result = handle
                .await
                .unwrap_or_else(|e| Err(LoaderError::BuildTask(e.to_string())));
            if let Err(e) = result {
                warn!("Extension build failed: {}", e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Host lifecycle adapter for a "before browser launch" hook: waits for
    /// the builds, then merges the load flag into the launch arguments.
    pub async fn before_launch(
        &mut self,
        browser: &BrowserDescriptor,
        args: Vec<String>,
    ) -> Result<Vec<String>, LoaderError> {
        self.wait_for_builds().await?;
        Ok(compute_args(&self.definitions, browser, args))
    }

    /// The resolved definitions of this session.
    #[must_use]
    pub fn definitions(&self) -> &[ExtensionDefinition] {
        &self.definitions
    }

    /// Looks up a definition by alias.
    #[must_use]
    pub fn definition(&self, alias: &str) -> Option<&ExtensionDefinition> {
        self.definitions.iter().find(|def| def.alias == alias)
    }

    /// Number of active source watchers.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    /// Closes all watchers. Also happens on drop.
    pub fn close(&mut self) {
        self.watchers.close_all();
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_alias_is_rejected() {
        let config = Config::default();
        let result = Session::start_with_config(
            vec![
                ExtensionSpec::new("/a").alias("same").watch(false),
                ExtensionSpec::new("/b").alias("same").watch(false),
            ],
            &config,
        );

        assert!(matches!(result, Err(LoaderError::DuplicateAlias(alias)) if alias == "same"));
    }

    #[tokio::test]
    async fn test_missing_source_fails_the_aggregate() {
        let config = Config::default();
        let mut session = Session::start_with_config(
            vec![ExtensionSpec::new("/definitely/missing").watch(false)],
            &config,
        )
        .expect("session");

        let result = session.wait_for_builds().await;
        assert!(matches!(result, Err(LoaderError::SourceNotFound(_))));
    }

    #[tokio::test]
    async fn test_close_stops_watchers() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        std::fs::write(
            dir.path().join("manifest.json"),
            r#"{"manifest_version": 2, "name": "w", "version": "1.0"}"#,
        )
        .expect("manifest");

        let config = Config::default();
        let mut session = Session::start_with_config(
            vec![ExtensionSpec::new(dir.path()).alias("watched-session")],
            &config,
        )
        .expect("session");

        assert_eq!(session.watcher_count(), 1);
        session.close();
        assert_eq!(session.watcher_count(), 0);
    }
}
