//! Hook registration and the plugin-facing API surface.
//!
//! Handlers are plain closures stored behind `Rc`, called with a
//! [`PluginApi`] that mediates every touch of engine state through the
//! owning plugin's declared capabilities. Two hook categories exist:
//!
//! - **Observer** hooks: all handlers run, return values ignored, panics
//!   are not caught but `Err` results are logged and skipped.
//! - **Transform** hooks: a left fold; each handler sees the previous
//!   output, `Ok(None)` means "no change", `Err` falls back to the
//!   previous value.
//!
//! Ordering is (priority ascending, registration order); the default
//! priority is 50.

use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use whisker_base::Diagnostic;
use whisker_story::Value;

use crate::error::RuntimeError;
use crate::state::GameState;

/// The closed capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Capability {
    StateRead,
    StateWrite,
    StateWatch,
    PersistenceRead,
    PersistenceWrite,
    UiInject,
    UiStyle,
    UiTheme,
}

impl Capability {
    pub fn parse(text: &str) -> Option<Self> {
        Some(match text {
            "state:read" => Capability::StateRead,
            "state:write" => Capability::StateWrite,
            "state:watch" => Capability::StateWatch,
            "persistence:read" => Capability::PersistenceRead,
            "persistence:write" => Capability::PersistenceWrite,
            "ui:inject" => Capability::UiInject,
            "ui:style" => Capability::UiStyle,
            "ui:theme" => Capability::UiTheme,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::StateRead => "state:read",
            Capability::StateWrite => "state:write",
            Capability::StateWatch => "state:watch",
            Capability::PersistenceRead => "persistence:read",
            Capability::PersistenceWrite => "persistence:write",
            Capability::UiInject => "ui:inject",
            Capability::UiStyle => "ui:style",
            Capability::UiTheme => "ui:theme",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A handler's verdict: `Ok(Some(v))` replaces the folded value (transform
/// hooks), `Ok(None)` leaves it unchanged, `Err` is caught and logged.
pub type HookResult = Result<Option<Value>, String>;

/// A hook or event handler.
pub type HookFn = Rc<dyn Fn(&mut PluginApi<'_>, &Value) -> HookResult>;

/// Default handler priority; lower runs earlier.
pub const DEFAULT_PRIORITY: i32 = 50;

/// Identifies a dynamic registration for [`HookRegistry::unregister`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookHandle(u64);

#[derive(Clone)]
pub struct HookEntry {
    pub plugin: String,
    pub priority: i32,
    seq: u64,
    pub func: HookFn,
}

/// All registered hook handlers, keyed by hook name.
#[derive(Default)]
pub struct HookRegistry {
    hooks: FxHashMap<String, Vec<HookEntry>>,
    handles: FxHashMap<HookHandle, (String, u64)>,
    next_seq: u64,
}

impl HookRegistry {
    pub fn register(
        &mut self,
        event: &str,
        plugin: &str,
        priority: i32,
        func: HookFn,
    ) -> HookHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.hooks.entry(event.to_string()).or_default().push(HookEntry {
            plugin: plugin.to_string(),
            priority,
            seq,
            func,
        });
        let handle = HookHandle(seq);
        self.handles.insert(handle, (event.to_string(), seq));
        handle
    }

    pub fn unregister(&mut self, handle: HookHandle) -> bool {
        let Some((event, seq)) = self.handles.remove(&handle) else {
            return false;
        };
        if let Some(entries) = self.hooks.get_mut(&event) {
            let before = entries.len();
            entries.retain(|e| e.seq != seq);
            return entries.len() != before;
        }
        false
    }

    /// Removes every handler a plugin registered.
    pub fn remove_plugin(&mut self, plugin: &str) {
        for entries in self.hooks.values_mut() {
            entries.retain(|e| e.plugin != plugin);
        }
    }

    /// Handlers for `event` in dispatch order: priority ascending, ties in
    /// registration order.
    pub fn entries(&self, event: &str) -> Vec<HookEntry> {
        let mut entries = self.hooks.get(event).cloned().unwrap_or_default();
        entries.sort_by_key(|e| (e.priority, e.seq));
        entries
    }

    pub fn has_handlers(&self, event: &str) -> bool {
        self.hooks.get(event).is_some_and(|e| !e.is_empty())
    }
}

/// The capability-gated context a handler receives.
///
/// Plugins never see the engine; this borrow-scoped view is all they get.
/// Every state access checks the owning plugin's declared capabilities, and
/// denials are logged as security events.
pub struct PluginApi<'a> {
    pub plugin: &'a str,
    pub(crate) caps: &'a BTreeSet<Capability>,
    pub(crate) trusted: bool,
    pub(crate) state: &'a mut GameState,
    pub(crate) storage: &'a mut FxHashMap<String, Value>,
    pub(crate) diagnostics: &'a mut Vec<Diagnostic>,
    /// Events queued during this call, delivered after dispatch completes.
    pub(crate) queued_events: &'a mut Vec<(String, Value)>,
}

impl<'a> PluginApi<'a> {
    pub fn has_capability(&self, cap: Capability) -> bool {
        self.trusted || self.caps.contains(&cap)
    }

    fn require(&mut self, cap: Capability) -> Result<(), RuntimeError> {
        if self.has_capability(cap) {
            return Ok(());
        }
        let err = RuntimeError::CapabilityDenied {
            plugin: self.plugin.to_string(),
            capability: cap.as_str().to_string(),
        };
        log::warn!(
            "security: plugin '{}' attempted '{}' without declaring it",
            self.plugin,
            cap.as_str()
        );
        self.diagnostics.push(err.to_diagnostic());
        Err(err)
    }

    /// Reads a story variable (requires `state:read`).
    pub fn get_var(&mut self, name: &str) -> Result<Value, RuntimeError> {
        self.require(Capability::StateRead)?;
        Ok(self.state.get(name))
    }

    /// Writes a story variable (requires `state:write`).
    pub fn set_var(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
        self.require(Capability::StateWrite)?;
        self.state.set(name, value);
        Ok(())
    }

    /// This plugin's private storage. Prefix scoping is structural: each
    /// plugin gets its own map, so cross-plugin reads are impossible.
    pub fn storage_get(&self, key: &str) -> Option<Value> {
        self.storage.get(key).cloned()
    }

    pub fn storage_set(&mut self, key: &str, value: Value) {
        self.storage.insert(key.to_string(), value);
    }

    pub fn storage_remove(&mut self, key: &str) -> Option<Value> {
        self.storage.remove(key)
    }

    /// Emits a named event onto the engine's bus; delivery happens after
    /// the current dispatch completes.
    pub fn emit(&mut self, event: &str, payload: Value) {
        self.queued_events.push((event.to_string(), payload));
    }

    pub fn log(&self, message: &str) {
        log::info!("[plugin:{}] {}", self.plugin, message);
    }
}
