//! Registration facade.
//!
//! The named command surface a host test runner wires into its own command
//! layer: clear/set/get extension storage and generic execute, each a
//! callable with positional arguments ending in an optional options value,
//! delegating to the bridge client. Logging here is best-effort trace
//! output; it never affects the call's outcome.

use serde_json::Value;
use tracing::debug;

use crate::bridge::{BridgeError, CallOptions, RigClient};

/// The extension command set for one client.
pub struct CommandSet {
    client: RigClient,
}

impl CommandSet {
    /// Wraps a bridge client.
    #[must_use]
    pub fn new(client: RigClient) -> Self {
        Self { client }
    }

    /// The underlying client.
    #[must_use]
    pub fn client(&self) -> &RigClient {
        &self.client
    }

    /// Clears an extension storage area.
    pub async fn clear_extension_storage(
        &self,
        area: &str,
        opts: Option<CallOptions>,
    ) -> Result<Value, BridgeError> {
        let opts = opts.unwrap_or_default();
        self.log("clear extension storage", &opts, format_args!("{}", area));
        self.client.clear_storage(area, &opts).await
    }

    /// Writes key/value pairs into an extension storage area.
    pub async fn set_extension_storage(
        &self,
        area: &str,
        items: Value,
        opts: Option<CallOptions>,
    ) -> Result<Value, BridgeError> {
        let opts = opts.unwrap_or_default();
        self.log(
            "set extension storage",
            &opts,
            format_args!("{} {}", area, items),
        );
        self.client.set_storage(area, items, &opts).await
    }

    /// Reads keys from an extension storage area.
    pub async fn get_extension_storage(
        &self,
        area: &str,
        keys: Value,
        opts: Option<CallOptions>,
    ) -> Result<Value, BridgeError> {
        let opts = opts.unwrap_or_default();
        self.log(
            "get extension storage",
            &opts,
            format_args!("{} {}", area, keys),
        );
        self.client.get_storage(area, keys, &opts).await
    }

    /// Executes an arbitrary declared extension command.
    pub async fn exec_extension_command(
        &self,
        property: &str,
        method: &str,
        args: Option<Value>,
        opts: Option<CallOptions>,
    ) -> Result<Value, BridgeError> {
        let opts = opts.unwrap_or_default();
        self.log(
            "exec extension command",
            &opts,
            format_args!("{}.{}", property, method),
        );
        self.client.exec_command(property, method, args, &opts).await
    }

    // Prefix the log line with the alias only when it differs from the
    // client's default, matching how a runner UI would label the command
    fn log(&self, name: &str, opts: &CallOptions, detail: std::fmt::Arguments<'_>) {
        match opts.alias.as_deref().filter(|a| *a != self.client.alias()) {
            Some(alias) => debug!("{} [{}]: {}", name, alias, detail),
            None => debug!("{}: {}", name, detail),
        }
    }
}
