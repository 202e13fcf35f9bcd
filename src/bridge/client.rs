//! Page-context bridge client.
//!
//! Issues uniquely-correlated commands toward an extension's relay and
//! suspends the caller until the matching response arrives or the effective
//! timeout expires — whichever comes first, exactly once.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::config::{Config, DEFAULT_TIMEOUT_MS};

use super::BridgeError;
use super::protocol::{CallStyle, Envelope};
use super::transport::{ListenerHandle, PageBus};

/// Per-client defaults, applied when a call does not override them.
#[derive(Debug, Clone)]
pub struct ClientContext {
    /// Extension alias calls are addressed to.
    pub alias: String,
    /// Debug logging along the pipeline.
    pub debug: bool,
    /// Timeout applied when a call sets none.
    pub timeout: Option<Duration>,
    /// Calling convention applied when a call sets none.
    pub style: CallStyle,
}

impl ClientContext {
    /// Context for an alias with the stock defaults.
    #[must_use]
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            debug: false,
            timeout: None,
            style: CallStyle::default(),
        }
    }
}

/// Per-call overrides. Everything unset falls back to the client context,
/// then to the global defaults.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Target a different extension than the context's.
    pub alias: Option<String>,
    /// Call-level timeout.
    pub timeout: Option<Duration>,
    /// Call-level debug flag.
    pub debug: Option<bool>,
    /// Call-level calling convention.
    pub style: Option<CallStyle>,
}

impl CallOptions {
    /// Overrides the target alias.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Overrides the timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Overrides the calling convention.
    #[must_use]
    pub fn style(mut self, style: CallStyle) -> Self {
        self.style = Some(style);
        self
    }
}

/// The page-context helper test code calls into.
#[derive(Clone)]
pub struct RigClient {
    bus: PageBus,
    ctx: ClientContext,
    default_timeout: Duration,
}

impl RigClient {
    /// Creates a client over a bus with the given context.
    #[must_use]
    pub fn new(bus: PageBus, ctx: ClientContext) -> Self {
        Self {
            bus,
            ctx,
            default_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    /// Creates a client whose global default timeout comes from the harness
    /// configuration.
    #[must_use]
    pub fn with_config(bus: PageBus, ctx: ClientContext, config: &Config) -> Self {
        Self {
            bus,
            ctx,
            default_timeout: Duration::from_millis(config.default_timeout_ms),
        }
    }

    /// The client's default alias.
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.ctx.alias
    }

    /// Issues a command and awaits its settlement.
    ///
    /// The generic argument list, when present, must be a JSON array;
    /// anything else fails before a message is sent.
    pub async fn call(
        &self,
        property: &str,
        method: Option<&str>,
        args: Option<Value>,
        opts: &CallOptions,
    ) -> Result<Value, BridgeError> {
        if let Some(args) = &args {
            if !args.is_array() {
                return Err(BridgeError::Validation(format!(
                    "Command args must be a list, got: {}",
                    args
                )));
            }
        }

        let alias = opts.alias.clone().unwrap_or_else(|| self.ctx.alias.clone());
        let debug_flag = opts.debug.unwrap_or(self.ctx.debug);
        let style = opts.style.unwrap_or(self.ctx.style);
        let timeout = opts
            .timeout
            .or(self.ctx.timeout)
            .unwrap_or(self.default_timeout);

        let correlation_id = Uuid::new_v4();
        // Listener first, so a reply can never race the registration
        let response_rx = self.bus.register_listener(correlation_id);

        let envelope = Envelope::Command {
            correlation_id,
            alias,
            debug: debug_flag,
            style,
            property: property.to_string(),
            method: method.map(str::to_string),
            args,
        };
        if debug_flag {
            debug!(
                "Sending {}.{}() command {}",
                property,
                method.unwrap_or(""),
                correlation_id
            );
        }
        self.bus.post(envelope);

        let started = Instant::now();
        match tokio::time::timeout(timeout, response_rx).await {
            Ok(Ok(Envelope::Response { result, error, .. })) => match error {
                Some(error) => {
                    if debug_flag {
                        debug!("Command {} failed remotely: {}", correlation_id, error);
                    }
                    Err(BridgeError::Remote(error))
                }
                None => Ok(result.unwrap_or(Value::Null)),
            },
            Ok(Ok(_)) | Ok(Err(_)) => {
                self.bus.remove_listener(correlation_id);
                Err(BridgeError::ChannelClosed)
            }
            Err(_) => {
                self.bus.remove_listener(correlation_id);
                Err(BridgeError::timeout(property, method, started.elapsed()))
            }
        }
    }

    /// Clears a storage area.
    pub async fn clear_storage(
        &self,
        area: &str,
        opts: &CallOptions,
    ) -> Result<Value, BridgeError> {
        self.call(&storage_property(area)?, Some("clear"), None, opts)
            .await
    }

    /// Merges an object of key/value pairs into a storage area.
    pub async fn set_storage(
        &self,
        area: &str,
        items: Value,
        opts: &CallOptions,
    ) -> Result<Value, BridgeError> {
        self.call(
            &storage_property(area)?,
            Some("set"),
            Some(json!([items])),
            opts,
        )
        .await
    }

    /// Reads keys from a storage area.
    pub async fn get_storage(
        &self,
        area: &str,
        keys: Value,
        opts: &CallOptions,
    ) -> Result<Value, BridgeError> {
        self.call(
            &storage_property(area)?,
            Some("get"),
            Some(json!([keys])),
            opts,
        )
        .await
    }

    /// Invokes an arbitrary declared method.
    pub async fn exec_command(
        &self,
        property: &str,
        method: &str,
        args: Option<Value>,
        opts: &CallOptions,
    ) -> Result<Value, BridgeError> {
        self.call(property, Some(method), args, opts).await
    }

    /// Subscribes a callback to a privileged event source, e.g.
    /// `storage.local.onChanged`. The returned handle removes it again.
    pub fn add_listener(
        &self,
        property: &str,
        callback: impl Fn(Value) + Send + Sync + 'static,
        opts: &CallOptions,
    ) -> ListenerHandle {
        let alias = opts.alias.clone().unwrap_or_else(|| self.ctx.alias.clone());
        let debug_flag = opts.debug.unwrap_or(self.ctx.debug);

        let handle = self
            .bus
            .add_subscription(&alias, property, Arc::new(callback));
        if debug_flag {
            debug!("Adding {} listener {}", property, handle.id);
        }

        self.bus.post(Envelope::Subscription {
            correlation_id: handle.id,
            alias,
            debug: debug_flag,
            property: property.to_string(),
        });
        handle
    }

    /// Removes a previously-added listener.
    pub fn remove_listener(&self, handle: &ListenerHandle) {
        if self.bus.remove_subscription(handle) {
            self.bus.post(Envelope::Unsubscription {
                correlation_id: handle.id,
                alias: handle.alias.clone(),
                property: handle.property.clone(),
            });
        }
    }
}

/// Builds the dotted path for a storage area, rejecting an empty area name
/// before anything is sent.
fn storage_property(area: &str) -> Result<String, BridgeError> {
    if area.trim().is_empty() {
        return Err(BridgeError::Validation(
            "Storage area must be a non-empty string".to_string(),
        ));
    }
    Ok(format!("storage.{}", area))
}
