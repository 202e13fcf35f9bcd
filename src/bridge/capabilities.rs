//! Declared capability surface.
//!
//! The privileged executor never reflects over an ambient API object; it
//! resolves dotted property paths against an [`ApiSurface`], a registry of
//! declared [`Capability`] handles. The default surface mirrors the slice of
//! the browser API the harness exercises in tests: `storage.local`,
//! `storage.sync`, and `runtime`. Custom capabilities can be registered per
//! surface.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Map, Value, json};
use tokio::sync::oneshot;
use uuid::Uuid;

use super::protocol::RemoteError;
use super::transport::EventSink;

/// Side-channel state for one callback-convention invocation: the
/// synthesized completion slot and the last-error slot the executor checks
/// afterwards.
#[derive(Debug, Default)]
pub struct CallContext {
    last_error: Option<String>,
    completed: Option<Value>,
}

impl CallContext {
    /// The synthesized callback: records the invocation's result value.
    pub fn complete(&mut self, value: Value) {
        self.completed = Some(value);
    }

    /// Sets the last-error slot; a set slot makes the call reject.
    pub fn set_last_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    /// Takes the last-error slot.
    #[must_use]
    pub fn take_last_error(&mut self) -> Option<String> {
        self.last_error.take()
    }

    /// Takes the completion value.
    #[must_use]
    pub fn take_completed(&mut self) -> Option<Value> {
        self.completed.take()
    }
}

/// What a non-callback invocation hands back.
#[derive(Debug)]
pub enum CallReturn {
    /// Immediate result.
    Ready(Value),
    /// Continuation-style result, settled later.
    Deferred(oneshot::Receiver<Result<Value, RemoteError>>),
}

/// One declared privileged API handle.
pub trait Capability: Send + Sync {
    /// The value of a property read (no method).
    fn describe(&self) -> Value;

    /// Invokes a method. Callback-convention methods report through `cx`;
    /// the others through the returned [`CallReturn`].
    fn call(
        &self,
        method: &str,
        args: &[Value],
        cx: &mut CallContext,
    ) -> Result<CallReturn, RemoteError>;

    /// Registers an event listener on this capability.
    fn subscribe(&self, event: &str, _id: Uuid, _sink: EventSink) -> Result<(), RemoteError> {
        Err(RemoteError::new(
            "NoSuchEvent",
            format!("No event source {}", event),
        ))
    }

    /// Removes an event listener.
    fn unsubscribe(&self, _id: Uuid) {}
}

/// Registry of declared capabilities, keyed by dotted path.
#[derive(Default)]
pub struct ApiSurface {
    capabilities: Mutex<BTreeMap<String, Arc<dyn Capability>>>,
}

impl ApiSurface {
    /// Creates an empty surface.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the default surface for an extension alias.
    #[must_use]
    pub fn with_defaults(alias: &str) -> Self {
        let surface = Self::new();
        surface.register("storage.local", Arc::new(StorageArea::new("local")));
        surface.register("storage.sync", Arc::new(StorageArea::new("sync")));
        surface.register("runtime", Arc::new(RuntimeInfo::new(alias)));
        surface
    }

    /// Registers a capability under a dotted path.
    pub fn register(&self, path: &str, capability: Arc<dyn Capability>) {
        self.lock().insert(path.to_string(), capability);
    }

    /// Resolves a path to the capability registered exactly there.
    pub fn resolve(&self, path: &str) -> Result<Arc<dyn Capability>, RemoteError> {
        self.lock().get(path).cloned().ok_or_else(|| {
            RemoteError::new("NoSuchProperty", format!("No capability at {}", path))
        })
    }

    /// The value of a property read: a capability's own descriptor, or for a
    /// path prefix, the descriptor of everything beneath it.
    #[must_use]
    pub fn describe_path(&self, path: &str) -> Option<Value> {
        let capabilities = self.lock();
        if let Some(capability) = capabilities.get(path) {
            return Some(capability.describe());
        }

        let prefix = format!("{}.", path);
        let children: Vec<&str> = capabilities
            .keys()
            .filter(|key| key.starts_with(&prefix))
            .map(String::as_str)
            .collect();
        if children.is_empty() {
            None
        } else {
            Some(json!({ "capabilities": children }))
        }
    }

    /// The root descriptor: every declared path.
    #[must_use]
    pub fn describe_root(&self) -> Value {
        let paths: Vec<String> = self.lock().keys().cloned().collect();
        json!({ "capabilities": paths })
    }

    /// Subscribes a listener to an event source path. The longest registered
    /// prefix of the path selects the capability; the remainder names the
    /// event, e.g. `storage.local.onChanged` → `storage.local` / `onChanged`.
    pub fn subscribe(
        &self,
        property: &str,
        id: Uuid,
        sink: EventSink,
    ) -> Result<(), RemoteError> {
        let (capability, event) = self.resolve_event(property)?;
        capability.subscribe(&event, id, sink)
    }

    /// Removes a listener from an event source path.
    pub fn unsubscribe(&self, property: &str, id: Uuid) {
        if let Ok((capability, _)) = self.resolve_event(property) {
            capability.unsubscribe(id);
        }
    }

    fn resolve_event(&self, property: &str) -> Result<(Arc<dyn Capability>, String), RemoteError> {
        let capabilities = self.lock();
        let mut best: Option<(&String, &Arc<dyn Capability>)> = None;
        for (path, capability) in capabilities.iter() {
            let is_prefix = property
                .strip_prefix(path.as_str())
                .is_some_and(|rest| rest.starts_with('.'));
            if is_prefix && best.is_none_or(|(b, _)| path.len() > b.len()) {
                best = Some((path, capability));
            }
        }

        match best {
            Some((path, capability)) => {
                let event = property[path.len() + 1..].to_string();
                Ok((Arc::clone(capability), event))
            }
            None => Err(RemoteError::new(
                "NoSuchProperty",
                format!("No event source at {}", property),
            )),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Arc<dyn Capability>>> {
        self.capabilities
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

// ============================================================================
// Storage areas
// ============================================================================

/// In-memory rendition of one `chrome.storage` area. Methods use the
/// callback convention; mutations feed the `onChanged` event source.
pub struct StorageArea {
    area: String,
    items: Mutex<Map<String, Value>>,
    listeners: Mutex<HashMap<Uuid, EventSink>>,
}

impl StorageArea {
    /// Creates an empty storage area.
    #[must_use]
    pub fn new(area: impl Into<String>) -> Self {
        Self {
            area: area.into(),
            items: Mutex::new(Map::new()),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    fn items(&self) -> MutexGuard<'_, Map<String, Value>> {
        self.items
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn listeners(&self) -> MutexGuard<'_, HashMap<Uuid, EventSink>> {
        self.listeners
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn emit_changes(&self, changes: Map<String, Value>) {
        if changes.is_empty() {
            return;
        }
        let payload = json!({ "area": self.area, "changes": changes });
        for sink in self.listeners().values() {
            sink.emit(payload.clone());
        }
    }

    fn change_record(old: Option<&Value>, new: Option<&Value>) -> Value {
        let mut record = Map::new();
        if let Some(old) = old {
            record.insert("oldValue".to_string(), old.clone());
        }
        if let Some(new) = new {
            record.insert("newValue".to_string(), new.clone());
        }
        Value::Object(record)
    }

    fn get(&self, keys: Option<&Value>, cx: &mut CallContext) {
        let items = self.items();
        let selected = match keys {
            None | Some(Value::Null) => items.clone(),
            Some(Value::String(key)) => {
                let mut out = Map::new();
                if let Some(value) = items.get(key) {
                    out.insert(key.clone(), value.clone());
                }
                out
            }
            Some(Value::Array(keys)) => {
                let mut out = Map::new();
                for key in keys {
                    if let Some(key) = key.as_str() {
                        if let Some(value) = items.get(key) {
                            out.insert(key.to_string(), value.clone());
                        }
                    }
                }
                out
            }
            Some(Value::Object(defaults)) => {
                let mut out = Map::new();
                for (key, default) in defaults {
                    out.insert(
                        key.clone(),
                        items.get(key).cloned().unwrap_or_else(|| default.clone()),
                    );
                }
                out
            }
            Some(_) => {
                cx.set_last_error("storage.get: keys must be a string, list, object or null");
                return;
            }
        };
        cx.complete(Value::Object(selected));
    }

    fn set(&self, arg: Option<&Value>, cx: &mut CallContext) {
        let Some(Value::Object(entries)) = arg else {
            cx.set_last_error("storage.set: expected an object of key/value pairs");
            return;
        };

        let mut changes = Map::new();
        {
            let mut items = self.items();
            for (key, value) in entries {
                let old = items.insert(key.clone(), value.clone());
                changes.insert(
                    key.clone(),
                    Self::change_record(old.as_ref(), Some(value)),
                );
            }
        }
        self.emit_changes(changes);
        cx.complete(Value::Null);
    }

    fn remove(&self, arg: Option<&Value>, cx: &mut CallContext) {
        let keys: Vec<String> = match arg {
            Some(Value::String(key)) => vec![key.clone()],
            Some(Value::Array(keys)) => keys
                .iter()
                .filter_map(|key| key.as_str().map(str::to_string))
                .collect(),
            _ => {
                cx.set_last_error("storage.remove: expected a key or list of keys");
                return;
            }
        };

        let mut changes = Map::new();
        {
            let mut items = self.items();
            for key in keys {
                if let Some(old) = items.remove(&key) {
                    changes.insert(key, Self::change_record(Some(&old), None));
                }
            }
        }
        self.emit_changes(changes);
        cx.complete(Value::Null);
    }

    fn clear(&self, cx: &mut CallContext) {
        let mut changes = Map::new();
        {
            let mut items = self.items();
            for (key, old) in std::mem::take(&mut *items) {
                changes.insert(key, Self::change_record(Some(&old), None));
            }
        }
        self.emit_changes(changes);
        cx.complete(Value::Null);
    }
}

impl Capability for StorageArea {
    fn describe(&self) -> Value {
        json!({ "kind": "storage", "area": self.area, "size": self.items().len() })
    }

    fn call(
        &self,
        method: &str,
        args: &[Value],
        cx: &mut CallContext,
    ) -> Result<CallReturn, RemoteError> {
        match method {
            "get" => self.get(args.first(), cx),
            "set" => self.set(args.first(), cx),
            "remove" => self.remove(args.first(), cx),
            "clear" => self.clear(cx),
            other => {
                return Err(RemoteError::new(
                    "NoSuchMethod",
                    format!("storage.{} has no method {}", self.area, other),
                ));
            }
        }
        Ok(CallReturn::Ready(Value::Null))
    }

    fn subscribe(&self, event: &str, id: Uuid, sink: EventSink) -> Result<(), RemoteError> {
        if event != "onChanged" {
            return Err(RemoteError::new(
                "NoSuchEvent",
                format!("storage.{} has no event {}", self.area, event),
            ));
        }
        self.listeners().insert(id, sink);
        Ok(())
    }

    fn unsubscribe(&self, id: Uuid) {
        self.listeners().remove(&id);
    }
}

// ============================================================================
// Runtime info
// ============================================================================

/// Minimal `runtime` capability; its methods return synchronously.
pub struct RuntimeInfo {
    alias: String,
}

impl RuntimeInfo {
    /// Creates the runtime capability for an alias.
    #[must_use]
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
        }
    }
}

impl Capability for RuntimeInfo {
    fn describe(&self) -> Value {
        json!({ "id": self.alias })
    }

    fn call(
        &self,
        method: &str,
        _args: &[Value],
        _cx: &mut CallContext,
    ) -> Result<CallReturn, RemoteError> {
        match method {
            "getPlatformInfo" => Ok(CallReturn::Ready(json!({
                "os": std::env::consts::OS,
                "arch": std::env::consts::ARCH,
            }))),
            other => Err(RemoteError::new(
                "NoSuchMethod",
                format!("runtime has no method {}", other),
            )),
        }
    }
}
