//! In-process context wiring.
//!
//! A [`Harness`] stands up the full bridge pipeline without a browser: one
//! relay task and one executor task per attached alias, all joined by a
//! shared page bus. Inside a real browser the injected hook scripts play the
//! relay/executor roles; the protocol either way is identical, which is what
//! makes the pipeline testable in-process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::Config;
use crate::loader::ExtensionDefinition;

use super::capabilities::ApiSurface;
use super::client::{ClientContext, RigClient};
use super::transport::PageBus;
use super::{executor, relay};

struct Attached {
    surface: Arc<ApiSurface>,
    relay: JoinHandle<()>,
    executor: JoinHandle<()>,
}

/// Owns the page bus and every attached extension pipeline.
pub struct Harness {
    bus: PageBus,
    config: Config,
    attached: Mutex<HashMap<String, Attached>>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    /// Creates a harness with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a harness with an explicit configuration.
    #[must_use]
    pub fn with_config(config: Config) -> Self {
        Self {
            bus: PageBus::new(),
            config,
            attached: Mutex::new(HashMap::new()),
        }
    }

    /// Attaches an alias with the default capability surface. Returns the
    /// surface so tests can seed it or register extra capabilities.
    pub fn attach(&self, alias: &str) -> Arc<ApiSurface> {
        let surface = Arc::new(ApiSurface::with_defaults(alias));
        self.attach_with_surface(alias, Arc::clone(&surface));
        surface
    }

    /// Attaches an alias backed by a caller-provided surface.
    pub fn attach_with_surface(&self, alias: &str, surface: Arc<ApiSurface>) {
        let (background_tx, background_rx) = mpsc::unbounded_channel();
        let executor = executor::spawn(Arc::clone(&surface), background_rx);

        let (inbox, page_tx) = self.bus.connect_relay(alias);
        let relay = relay::spawn(alias.to_string(), inbox, page_tx, background_tx);

        let previous = self.attached_map().insert(
            alias.to_string(),
            Attached {
                surface,
                relay,
                executor,
            },
        );
        if previous.is_some() {
            debug!("Replaced pipeline for alias {}", alias);
        }
    }

    /// Attaches a built definition. A hookless definition gets no pipeline —
    /// exactly like a real extension without injected hooks, its commands
    /// go unanswered and time out.
    pub fn attach_definition(&self, def: &ExtensionDefinition) -> Option<Arc<ApiSurface>> {
        if def.skip_hooks {
            debug!("Not attaching {}: hooks skipped", def.alias);
            return None;
        }
        Some(self.attach(&def.alias))
    }

    /// Detaches an alias; its relay inbox closes and both tasks drain out.
    pub fn detach(&self, alias: &str) {
        self.bus.disconnect_relay(alias);
        self.attached_map().remove(alias);
    }

    /// The capability surface attached under an alias.
    #[must_use]
    pub fn surface(&self, alias: &str) -> Option<Arc<ApiSurface>> {
        self.attached_map()
            .get(alias)
            .map(|a| Arc::clone(&a.surface))
    }

    /// Client with the stock context for an alias.
    #[must_use]
    pub fn client(&self, alias: &str) -> RigClient {
        self.client_with(ClientContext::new(alias))
    }

    /// Client with an explicit context.
    #[must_use]
    pub fn client_with(&self, ctx: ClientContext) -> RigClient {
        RigClient::with_config(self.bus.clone(), ctx, &self.config)
    }

    fn attached_map(&self) -> std::sync::MutexGuard<'_, HashMap<String, Attached>> {
        self.attached
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        // Relay tasks end when their inbox senders go; nothing to abort
        // forcefully, but avoid leaving detached tasks unobserved
        for (_, attached) in self.attached_map().drain() {
            attached.relay.abort();
            attached.executor.abort();
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_attach_and_round_trip() {
        let harness = Harness::new();
        harness.attach("acme");

        let client = harness.client("acme");
        client
            .set_storage("local", json!({"k": "v"}), &Default::default())
            .await
            .expect("set");
        let got = client
            .get_storage("local", json!("k"), &Default::default())
            .await
            .expect("get");
        assert_eq!(got, json!({"k": "v"}));
    }

    #[tokio::test]
    async fn test_hookless_definition_gets_no_pipeline() {
        use crate::loader::{ExtensionDefinition, ExtensionSpec};

        let harness = Harness::new();
        let config = Config::default();

        let hookless = ExtensionDefinition::resolve(
            ExtensionSpec::new("/src").alias("hookless").skip_hooks().watch(false),
            &config,
        );
        assert!(harness.attach_definition(&hookless).is_none());
        assert!(harness.surface("hookless").is_none());

        let hooked = ExtensionDefinition::resolve(
            ExtensionSpec::new("/src").alias("hooked").watch(false),
            &config,
        );
        assert!(harness.attach_definition(&hooked).is_some());
        assert!(harness.surface("hooked").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_alias_times_out() {
        let harness = Harness::new();
        harness.attach("acme");
        harness.detach("acme");

        let client = harness.client("acme");
        let result = client
            .get_storage("local", json!("k"), &Default::default())
            .await;
        assert!(matches!(
            result,
            Err(crate::bridge::BridgeError::Timeout { .. })
        ));
    }
}
