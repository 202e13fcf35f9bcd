//! Cross-context command/response bridge.
//!
//! Implements the protocol that lets test code in the page context invoke
//! privileged extension APIs:
//!
//! - **client**: issues correlated commands and awaits response-or-timeout
//! - **transport**: the addressed page-side bus joining clients and relays
//! - **relay**: per-alias forwarder standing in for the content-script hook
//! - **executor**: privileged-context dispatcher over a declared capability
//!   surface, standing in for the background hook
//!
//! Each context is a cooperative task; the whole pipeline runs in-process,
//! mirroring what the injected JS hooks do inside a real browser.

pub mod capabilities;
pub mod client;
pub mod executor;
pub mod harness;
pub mod protocol;
pub mod relay;
pub mod transport;

use std::time::Duration;

use thiserror::Error;

pub use capabilities::{ApiSurface, CallContext, CallReturn, Capability, StorageArea};
pub use client::{CallOptions, ClientContext, RigClient};
pub use harness::Harness;
pub use protocol::{CallStyle, Envelope, RemoteError};
pub use transport::{EventSink, ListenerHandle, PageBus};

/// Bridge error types.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Bad call arguments, detected before anything is sent.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No response arrived within the effective timeout.
    #[error("Timeout after {elapsed_ms}ms waiting for response to command {property}.{method}")]
    Timeout {
        /// Target property path.
        property: String,
        /// Target method (empty for property reads).
        method: String,
        /// Elapsed wait in milliseconds.
        elapsed_ms: u64,
    },

    /// The privileged executor reported a failure.
    #[error("Remote execution error: {0}")]
    Remote(RemoteError),

    /// The transport was torn down while a call was pending.
    #[error("Transport channel closed")]
    ChannelClosed,

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BridgeError {
    /// Builds the timeout error for a settled-by-timer call.
    #[must_use]
    pub fn timeout(property: &str, method: Option<&str>, elapsed: Duration) -> Self {
        Self::Timeout {
            property: property.to_string(),
            method: method.unwrap_or_default().to_string(),
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_error_names_target() {
        let err = BridgeError::timeout("storage.local", Some("get"), Duration::from_millis(300));
        let text = err.to_string();
        assert!(text.contains("storage.local.get"));
        assert!(text.contains("300ms"));
    }

    #[test]
    fn test_remote_error_preserves_kind_and_message() {
        let err = BridgeError::Remote(RemoteError::new("QuotaExceeded", "storage full"));
        let text = err.to_string();
        assert!(text.contains("QuotaExceeded"));
        assert!(text.contains("storage full"));
    }
}
