//! Extension build-and-load pipeline.
//!
//! Prepares browser extensions for a test run:
//! - copies or unpacks each source into a per-alias working directory
//! - patches the manifest and injects the test-control hook scripts
//! - optionally watches the source and rebuilds on change
//! - computes the browser launch flag that loads the prepared directories
//!
//! All of it hangs off a [`Session`], which owns the definitions, the
//! in-flight builds, and the watcher handles; dropping the session releases
//! everything.

pub mod build;
pub mod definition;
pub mod hooks;
pub mod launch;
pub mod manifest;
pub mod session;
pub mod watcher;

use std::path::PathBuf;

use thiserror::Error;

pub use build::build_extension;
pub use definition::{ExtensionDefinition, ExtensionSpec};
pub use launch::{BrowserDescriptor, LOAD_EXTENSION_FLAG, compute_args};
pub use manifest::{Manifest, PatchOptions};
pub use session::Session;
pub use watcher::WatcherSet;

/// Name of the subdirectory holding the injected hook files inside a built
/// extension. Fixed so hook paths never collide with the extension's own
/// files.
pub const HOOK_FILES_DIR: &str = "webext-rig-hooks";

/// Loader error types.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The extension source path does not exist.
    #[error("No file found at extension source {}", .0.display())]
    SourceNotFound(PathBuf),

    /// Two definitions in one session share an alias.
    #[error("Duplicate extension alias: {0}")]
    DuplicateAlias(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest reading/parsing/writing error.
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// Packed-extension extraction error.
    #[error("Archive error: {0}")]
    Archive(String),

    /// Source watcher error.
    #[error("Watch error: {0}")]
    Watch(String),

    /// A build task was cancelled or panicked before completing.
    #[error("Build task failed: {0}")]
    BuildTask(String),
}

impl From<serde_json::Error> for LoaderError {
    fn from(e: serde_json::Error) -> Self {
        LoaderError::Manifest(e.to_string())
    }
}
