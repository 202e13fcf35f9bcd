//! webext-rig
//!
//! Loads, patches, and remote-controls browser extensions from an
//! end-to-end test runner.
//!
//! # Architecture
//!
//! - **Loader Module**: per-alias extension builds (copy/unpack, manifest
//!   patching, hook injection), source watching, and browser launch flags
//! - **Bridge Module**: the correlation-id command/response protocol
//!   spanning page, content-script, and privileged background contexts
//! - **Commands Module**: the facade a host test runner registers its
//!   extension commands against
//!
//! # Usage
//!
//! ```no_run
//! use webext_rig::loader::{ExtensionSpec, Session};
//!
//! # async fn run() -> Result<(), webext_rig::loader::LoaderError> {
//! let mut session = Session::start(vec![ExtensionSpec::new("fixtures/unpacked")]).await?;
//! session.wait_for_builds().await?;
//! # Ok(())
//! # }
//! ```

// Clippy configuration - allow common patterns
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

pub mod bridge;
pub mod commands;
pub mod config;
pub mod loader;
pub mod logging;

// Re-export main types
pub use bridge::{BridgeError, CallOptions, CallStyle, Harness, RigClient};
pub use commands::CommandSet;
pub use config::Config;
pub use loader::{BrowserDescriptor, ExtensionDefinition, ExtensionSpec, LoaderError, Session};
