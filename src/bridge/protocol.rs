//! Bridge message schema.
//!
//! Every message crossing a context boundary is an [`Envelope`], tagged by
//! kind. The same shapes are produced by the JS hooks inside a real browser,
//! so the wire format is plain JSON-compatible data throughout.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// How the target method reports its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStyle {
    /// Immediate return value.
    Sync,
    /// Continuation-style return (`.then`-shaped).
    Promise,
    /// Trailing callback argument plus a last-error side channel.
    #[default]
    Callback,
}

/// A structurally-serializable error carried inside a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteError {
    /// Error kind, e.g. the thrown error's name.
    pub kind: String,
    /// Human-readable message.
    pub message: String,
}

// Hook scripts in a real browser may serialize errors loosely; reconstruct
// an error-like value from whatever arrives rather than failing the whole
// response
impl<'de> Deserialize<'de> for RemoteError {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match &value {
            Value::Object(map) => Self {
                kind: map
                    .get("kind")
                    .and_then(Value::as_str)
                    .unwrap_or("Error")
                    .to_string(),
                message: map
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            Value::String(message) => Self::new("Error", message.clone()),
            other => Self::new("Error", other.to_string()),
        })
    }
}

impl RemoteError {
    /// Creates a remote error.
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Creates the error for a set last-error slot.
    #[must_use]
    pub fn last_error(message: impl Into<String>) -> Self {
        Self::new("LastError", message)
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}) {}", self.kind, self.message)
    }
}

impl std::error::Error for RemoteError {}

/// One message on the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Envelope {
    /// A command issued by the page context.
    Command {
        /// Correlates the eventual response.
        correlation_id: Uuid,
        /// Addressed extension.
        alias: String,
        /// Best-effort debug logging along the way.
        #[serde(default)]
        debug: bool,
        /// Calling convention of the target method.
        #[serde(default)]
        style: CallStyle,
        /// Dotted property path; empty addresses the API root.
        property: String,
        /// Method to invoke; absent for a property read.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        method: Option<String>,
        /// Serializable positional arguments.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<Value>,
    },
    /// The settled outcome of a command. Exactly one of `result`/`error` is
    /// present.
    Response {
        /// Correlation id of the originating command.
        correlation_id: Uuid,
        /// Success value.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        /// Failure payload.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<RemoteError>,
    },
    /// Registers interest in a privileged event source.
    Subscription {
        /// Doubles as the listener id for delivered events.
        correlation_id: Uuid,
        /// Addressed extension.
        alias: String,
        /// Best-effort debug logging along the way.
        #[serde(default)]
        debug: bool,
        /// Dotted event source path.
        property: String,
    },
    /// Tears a subscription down.
    Unsubscription {
        /// Listener id from the original subscription.
        correlation_id: Uuid,
        /// Addressed extension.
        alias: String,
        /// Dotted event source path.
        property: String,
    },
    /// One delivered event for an active subscription.
    Event {
        /// Listener id the event belongs to.
        correlation_id: Uuid,
        /// Event payload.
        payload: Value,
    },
}

impl Envelope {
    /// Creates a success response.
    #[must_use]
    pub fn response_ok(correlation_id: Uuid, result: Value) -> Self {
        Self::Response {
            correlation_id,
            result: Some(result),
            error: None,
        }
    }

    /// Creates an error response.
    #[must_use]
    pub fn response_err(correlation_id: Uuid, error: RemoteError) -> Self {
        Self::Response {
            correlation_id,
            result: None,
            error: Some(error),
        }
    }

    /// The extension alias a message is addressed to, when it carries one.
    #[must_use]
    pub fn alias(&self) -> Option<&str> {
        match self {
            Self::Command { alias, .. }
            | Self::Subscription { alias, .. }
            | Self::Unsubscription { alias, .. } => Some(alias),
            Self::Response { .. } | Self::Event { .. } => None,
        }
    }

    /// The message's correlation (or listener) id.
    #[must_use]
    pub fn correlation_id(&self) -> Uuid {
        match self {
            Self::Command { correlation_id, .. }
            | Self::Response { correlation_id, .. }
            | Self::Subscription { correlation_id, .. }
            | Self::Unsubscription { correlation_id, .. }
            | Self::Event { correlation_id, .. } => *correlation_id,
        }
    }
}
