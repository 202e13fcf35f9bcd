//! Source watching.
//!
//! Watches each extension source and re-runs the full build on any
//! filesystem event. Events are deliberately not coalesced: a burst of
//! changes triggers a burst of rebuilds, and overlapping rebuilds of the
//! same alias are safe because every rebuild is a full clear-and-recreate
//! into the same deterministic directory.

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::LoaderError;
use super::build::build_extension;
use super::definition::ExtensionDefinition;

/// The set of active watchers for one session. Closable as a group so a new
/// registration session never leaks watchers from the previous one.
#[derive(Default)]
pub struct WatcherSet {
    watchers: Vec<RecommendedWatcher>,
}

impl WatcherSet {
    /// Creates an empty watcher set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts watching a definition's source. No-op when the definition
    /// disables watching.
    pub fn watch(&mut self, def: &ExtensionDefinition) -> Result<(), LoaderError> {
        if !def.watch {
            return Ok(());
        }

        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(
            move |result: Result<notify::Event, notify::Error>| {
                // Runs on the notify thread; hand the event to the async side
                let _ = tx.send(result);
            },
        )
        .map_err(|e| LoaderError::Watch(format!("Failed to create watcher: {}", e)))?;

        watcher
            .watch(&def.source, RecursiveMode::Recursive)
            .map_err(|e| {
                LoaderError::Watch(format!(
                    "Failed to watch {}: {}",
                    def.source.display(),
                    e
                ))
            })?;

        let def = def.clone();
        tokio::spawn(async move {
            while let Some(result) = rx.recv().await {
                match result {
                    Ok(event) => {
                        info!(
                            "Watch event {:?} on {}, rebuilding",
                            event.kind, def.alias
                        );
                        // A failed rebuild only affects this alias
                        if let Err(e) = build_extension(&def).await {
                            warn!("Rebuild of {} failed: {}", def.alias, e);
                        }
                    }
                    Err(e) => warn!("Watcher error on {}: {}", def.alias, e),
                }
            }
            debug!("Watcher task for {} finished", def.alias);
        });

        self.watchers.push(watcher);
        Ok(())
    }

    /// Closes every active watcher. The rebuild tasks drain and exit once
    /// their event senders are gone.
    pub fn close_all(&mut self) {
        if !self.watchers.is_empty() {
            info!("Closing {} extension watcher(s)", self.watchers.len());
        }
        self.watchers.clear();
    }

    /// Number of active watchers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    /// Whether no watchers are active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }
}

impl Drop for WatcherSet {
    fn drop(&mut self) {
        self.close_all();
    }
}
