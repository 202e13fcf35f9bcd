//! Privileged command executor.
//!
//! The background-context half of the bridge: receives forwarded commands,
//! resolves their property path against the capability surface, dispatches
//! by calling convention, and reports the outcome back through the relay's
//! reply channel. Every failure is caught and reported as the call's error
//! outcome; nothing escapes the task.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use super::capabilities::{ApiSurface, CallContext, CallReturn};
use super::protocol::{CallStyle, Envelope, RemoteError};
use super::transport::EventSink;

/// Work forwarded from a relay into the privileged context.
pub enum ExecutorRequest {
    /// Execute a command and reply with its outcome.
    Command {
        /// The command envelope, forwarded uninterpreted.
        envelope: Envelope,
        /// Callback-style reply channel.
        reply: oneshot::Sender<Result<Value, RemoteError>>,
    },
    /// Register an event listener.
    Subscribe {
        /// Listener id.
        id: Uuid,
        /// Dotted event source path.
        property: String,
        /// Where delivered events go.
        sink: EventSink,
    },
    /// Remove an event listener.
    Unsubscribe {
        /// Listener id.
        id: Uuid,
        /// Dotted event source path.
        property: String,
    },
}

/// Spawns the executor task for one extension's capability surface.
pub fn spawn(
    surface: Arc<ApiSurface>,
    mut requests: mpsc::UnboundedReceiver<ExecutorRequest>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(request) = requests.recv().await {
            match request {
                ExecutorRequest::Command { envelope, reply } => {
                    // Commands run on their own task so a deferred result
                    // never blocks the next command
                    let surface = Arc::clone(&surface);
                    tokio::spawn(async move {
                        let outcome = execute(&surface, &envelope).await;
                        let _ = reply.send(outcome);
                    });
                }
                ExecutorRequest::Subscribe { id, property, sink } => {
                    if let Err(e) = surface.subscribe(&property, id, sink) {
                        warn!("Subscription to {} failed: {}", property, e);
                    }
                }
                ExecutorRequest::Unsubscribe { id, property } => {
                    surface.unsubscribe(&property, id);
                }
            }
        }
        debug!("Executor task finished");
    })
}

/// Executes one command against a surface.
pub async fn execute(surface: &ApiSurface, envelope: &Envelope) -> Result<Value, RemoteError> {
    let Envelope::Command {
        debug: debug_flag,
        style,
        property,
        method,
        args,
        ..
    } = envelope
    else {
        return Err(RemoteError::new("Protocol", "Not a command envelope"));
    };

    if *debug_flag {
        debug!(
            "Executing {}.{}()",
            property,
            method.as_deref().unwrap_or("")
        );
    }

    // Property access only, always sync
    if method.is_none() {
        if property.trim().is_empty() {
            return Ok(surface.describe_root());
        }
        return surface.describe_path(property).ok_or_else(|| {
            RemoteError::new("NoSuchProperty", format!("No capability at {}", property))
        });
    }

    let capability = surface.resolve(property)?;
    let method = method.as_deref().unwrap_or_default();
    let args: Vec<Value> = args
        .as_ref()
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    match style {
        CallStyle::Callback => {
            let mut cx = CallContext::default();
            capability.call(method, &args, &mut cx)?;
            match cx.take_last_error() {
                Some(message) => Err(RemoteError::last_error(message)),
                None => Ok(cx.take_completed().unwrap_or(Value::Null)),
            }
        }
        CallStyle::Sync | CallStyle::Promise => {
            let mut cx = CallContext::default();
            match capability.call(method, &args, &mut cx)? {
                CallReturn::Ready(value) => Ok(value),
                CallReturn::Deferred(receiver) => receiver
                    .await
                    .map_err(|_| RemoteError::new("Dropped", "Deferred result was dropped"))?,
            }
        }
    }
}
