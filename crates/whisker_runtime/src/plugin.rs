//! The plugin kernel: manifests, lifecycle, dispatch, and the event bus.
//!
//! Plugins are loaded in topological dependency order and destroyed in
//! reverse. A plugin that errors during load is marked [`PluginStatus::Errored`]
//! and skipped by every later dispatch. Trusted (first-party) plugins hold
//! every capability implicitly; community plugins get exactly what their
//! manifest declares.
//!
//! Each kernel belongs to one engine. There is no process-wide plugin
//! state, so concurrent engines cannot observe each other's plugins.

use std::collections::BTreeSet;
use std::rc::Rc;

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use semver::{Version, VersionReq};

use whisker_base::{DiagCode, Diagnostic};
use whisker_story::Value;

use crate::error::RuntimeError;
use crate::hooks::{Capability, HookFn, HookHandle, HookRegistry, PluginApi, DEFAULT_PRIORITY};
use crate::state::GameState;

/// A lifecycle callback (`on_init`, `on_enable`, …).
pub type LifecycleFn = Rc<dyn Fn(&mut PluginApi<'_>) -> Result<(), String>>;

/// Everything a plugin declares about itself.
#[derive(Clone)]
pub struct PluginManifest {
    pub name: String,
    pub version: Version,
    pub author: Option<String>,
    pub description: Option<String>,
    pub license: Option<String>,
    /// Plugin name → required version range.
    pub dependencies: IndexMap<String, VersionReq>,
    pub capabilities: BTreeSet<Capability>,
    /// Trusted plugins implicitly hold every capability.
    pub trusted: bool,
    /// Include this plugin's storage in undo snapshots.
    pub undo_opt_in: bool,
    /// Statically declared hooks: (hook name, priority, handler).
    pub hooks: Vec<(String, i32, HookFn)>,
    pub on_init: Option<LifecycleFn>,
    pub on_enable: Option<LifecycleFn>,
    pub on_disable: Option<LifecycleFn>,
    pub on_destroy: Option<LifecycleFn>,
}

impl PluginManifest {
    pub fn new(name: impl Into<String>, version: &str) -> Self {
        Self {
            name: name.into(),
            version: Version::parse(version).unwrap_or_else(|_| Version::new(0, 0, 0)),
            author: None,
            description: None,
            license: None,
            dependencies: IndexMap::new(),
            capabilities: BTreeSet::new(),
            trusted: false,
            undo_opt_in: false,
            hooks: Vec::new(),
            on_init: None,
            on_enable: None,
            on_disable: None,
            on_destroy: None,
        }
    }

    pub fn trusted(mut self) -> Self {
        self.trusted = true;
        self
    }

    pub fn with_capability(mut self, cap: Capability) -> Self {
        self.capabilities.insert(cap);
        self
    }

    pub fn with_dependency(mut self, name: impl Into<String>, req: &str) -> Self {
        if let Ok(req) = VersionReq::parse(req) {
            self.dependencies.insert(name.into(), req);
        }
        self
    }

    pub fn with_hook(
        mut self,
        event: impl Into<String>,
        priority: i32,
        func: impl Fn(&mut PluginApi<'_>, &Value) -> Result<Option<Value>, String> + 'static,
    ) -> Self {
        self.hooks.push((event.into(), priority, Rc::new(func)));
        self
    }

    pub fn with_default_hook(
        self,
        event: impl Into<String>,
        func: impl Fn(&mut PluginApi<'_>, &Value) -> Result<Option<Value>, String> + 'static,
    ) -> Self {
        self.with_hook(event, DEFAULT_PRIORITY, func)
    }

    pub fn on_init(
        mut self,
        func: impl Fn(&mut PluginApi<'_>) -> Result<(), String> + 'static,
    ) -> Self {
        self.on_init = Some(Rc::new(func));
        self
    }

    pub fn undo_opt_in(mut self) -> Self {
        self.undo_opt_in = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginStatus {
    Registered,
    Enabled,
    Disabled,
    Errored,
}

struct PluginSlot {
    manifest: PluginManifest,
    status: PluginStatus,
    storage: FxHashMap<String, Value>,
}

/// An engine-scoped plugin kernel.
#[derive(Default)]
pub struct PluginKernel {
    plugins: IndexMap<String, PluginSlot>,
    hooks: HookRegistry,
    /// Event-bus subscribers in registration order.
    subscribers: Vec<(String, String, HookFn)>,
    queued_events: Vec<(String, Value)>,
}

impl PluginKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a manifest. Loading happens separately so dependencies can
    /// be registered in any order.
    pub fn register(&mut self, manifest: PluginManifest) -> Result<(), RuntimeError> {
        if manifest.name.trim().is_empty() {
            return Err(RuntimeError::PluginLoad {
                plugin: manifest.name,
                reason: "plugin name may not be empty".into(),
            });
        }
        if self.plugins.contains_key(&manifest.name) {
            return Err(RuntimeError::PluginLoad {
                plugin: manifest.name.clone(),
                reason: "a plugin with this name is already registered".into(),
            });
        }
        self.plugins.insert(
            manifest.name.clone(),
            PluginSlot {
                manifest,
                status: PluginStatus::Registered,
                storage: FxHashMap::default(),
            },
        );
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        if self.plugins.shift_remove(name).is_some() {
            self.hooks.remove_plugin(name);
            self.subscribers.retain(|(_, plugin, _)| plugin != name);
            true
        } else {
            false
        }
    }

    pub fn status(&self, name: &str) -> Option<PluginStatus> {
        self.plugins.get(name).map(|slot| slot.status)
    }

    /// Loads every registered plugin: dependency and version checks,
    /// topological order, `on_init` then `on_enable`, static hook
    /// registration. Problems mark the plugin `Errored` and are reported;
    /// loading continues with the rest.
    pub fn load_all(&mut self, state: &mut GameState, diagnostics: &mut Vec<Diagnostic>) {
        let order = match self.topo_order() {
            Ok(order) => order,
            Err(cycle) => {
                for name in &cycle {
                    if let Some(slot) = self.plugins.get_mut(name) {
                        slot.status = PluginStatus::Errored;
                    }
                }
                diagnostics.push(Diagnostic::error(
                    DiagCode::PluginLoadError,
                    format!("circular plugin dependencies: {}", cycle.join(" -> ")),
                ));
                return;
            }
        };

        for name in order {
            if let Err(reason) = self.load_one(&name, state, diagnostics) {
                log::warn!("plugin '{}' failed to load: {}", name, reason);
                if let Some(slot) = self.plugins.get_mut(&name) {
                    slot.status = PluginStatus::Errored;
                }
                diagnostics.push(Diagnostic::warning(
                    DiagCode::PluginLoadError,
                    format!("plugin '{}' failed to load: {}", name, reason),
                ));
            }
        }

        self.deliver_events(state, diagnostics);
    }

    fn load_one(
        &mut self,
        name: &str,
        state: &mut GameState,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<(), String> {
        let deps: Vec<(String, VersionReq)> = {
            let slot = self.plugins.get(name).ok_or("unknown plugin")?;
            slot.manifest
                .dependencies
                .iter()
                .map(|(dep, req)| (dep.clone(), req.clone()))
                .collect()
        };

        for (dep, req) in deps {
            let dep_slot = self
                .plugins
                .get(&dep)
                .ok_or_else(|| format!("missing dependency '{}'", dep))?;
            if dep_slot.status != PluginStatus::Enabled {
                return Err(format!("dependency '{}' is not enabled", dep));
            }
            if !req.matches(&dep_slot.manifest.version) {
                return Err(format!(
                    "dependency '{}' version {} does not satisfy '{}'",
                    dep, dep_slot.manifest.version, req
                ));
            }
        }

        let (init, enable, hooks) = {
            let slot = self.plugins.get(name).ok_or("unknown plugin")?;
            (
                slot.manifest.on_init.clone(),
                slot.manifest.on_enable.clone(),
                slot.manifest.hooks.clone(),
            )
        };

        if let Some(init) = init {
            self.with_api(name, state, diagnostics, |api| init(api))??;
        }
        if let Some(enable) = enable {
            self.with_api(name, state, diagnostics, |api| enable(api))??;
        }

        for (event, priority, func) in hooks {
            self.hooks.register(&event, name, priority, func);
        }

        if let Some(slot) = self.plugins.get_mut(name) {
            slot.status = PluginStatus::Enabled;
        }
        Ok(())
    }

    /// Destroys plugins in reverse load (registration) order.
    pub fn destroy_all(&mut self, state: &mut GameState, diagnostics: &mut Vec<Diagnostic>) {
        let names: Vec<String> = self.plugins.keys().rev().cloned().collect();
        for name in names {
            let callbacks = {
                let Some(slot) = self.plugins.get(&name) else {
                    continue;
                };
                if slot.status != PluginStatus::Enabled {
                    continue;
                }
                (
                    slot.manifest.on_disable.clone(),
                    slot.manifest.on_destroy.clone(),
                )
            };
            if let Some(disable) = callbacks.0 {
                let _ = self.with_api(&name, state, diagnostics, |api| disable(api));
            }
            if let Some(destroy) = callbacks.1 {
                let _ = self.with_api(&name, state, diagnostics, |api| destroy(api));
            }
            if let Some(slot) = self.plugins.get_mut(&name) {
                slot.status = PluginStatus::Disabled;
            }
        }
    }

    /// Topological order over the dependency edges, keeping registration
    /// order among plugins that are equally ready. `Err` carries the
    /// plugins stuck in a cycle. Dependencies on unregistered plugins are
    /// checked later, in [`PluginKernel::load_one`].
    fn topo_order(&self) -> Result<Vec<String>, Vec<String>> {
        let mut order: Vec<String> = Vec::new();
        let mut done: FxHashSet<&str> = FxHashSet::default();

        loop {
            let mut progressed = false;
            for (name, slot) in &self.plugins {
                if done.contains(name.as_str()) {
                    continue;
                }
                let ready = slot
                    .manifest
                    .dependencies
                    .keys()
                    .filter(|dep| self.plugins.contains_key(*dep))
                    .all(|dep| done.contains(dep.as_str()));
                if ready {
                    done.insert(name.as_str());
                    order.push(name.clone());
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }

        if order.len() == self.plugins.len() {
            Ok(order)
        } else {
            Err(self
                .plugins
                .keys()
                .filter(|name| !done.contains(name.as_str()))
                .cloned()
                .collect())
        }
    }

    /// Runs `f` with a capability-gated API for `plugin`.
    fn with_api<R>(
        &mut self,
        plugin: &str,
        state: &mut GameState,
        diagnostics: &mut Vec<Diagnostic>,
        f: impl FnOnce(&mut PluginApi<'_>) -> R,
    ) -> Result<R, String> {
        let slot = self.plugins.get_mut(plugin).ok_or("unknown plugin")?;
        let mut api = PluginApi {
            plugin,
            caps: &slot.manifest.capabilities,
            trusted: slot.manifest.trusted,
            state,
            storage: &mut slot.storage,
            diagnostics,
            queued_events: &mut self.queued_events,
        };
        Ok(f(&mut api))
    }

    /// Fires an observer hook: every handler runs, failures are contained.
    pub fn dispatch_observer(
        &mut self,
        event: &str,
        payload: &Value,
        state: &mut GameState,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        for entry in self.hooks.entries(event) {
            if !self.plugin_active(&entry.plugin) {
                continue;
            }
            if !self.watch_allowed(event, &entry.plugin) {
                continue;
            }
            let func = entry.func.clone();
            let outcome = self.with_api(&entry.plugin, state, diagnostics, |api| {
                func(api, payload)
            });
            if let Ok(Err(message)) = outcome {
                log::warn!(
                    "hook '{}' handler from '{}' failed: {}",
                    event,
                    entry.plugin,
                    message
                );
                diagnostics.push(Diagnostic::warning(
                    DiagCode::HookHandlerError,
                    format!("'{}' handler from '{}' failed: {}", event, entry.plugin, message),
                ));
            }
        }
        self.deliver_events(state, diagnostics);
    }

    /// Folds a transform hook over `value`. `Ok(None)` means no change;
    /// a failing handler falls back to the previous value.
    pub fn dispatch_transform(
        &mut self,
        event: &str,
        value: Value,
        state: &mut GameState,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Value {
        let mut current = value;
        for entry in self.hooks.entries(event) {
            if !self.plugin_active(&entry.plugin) {
                continue;
            }
            if !self.watch_allowed(event, &entry.plugin) {
                continue;
            }
            let func = entry.func.clone();
            let outcome = self.with_api(&entry.plugin, state, diagnostics, |api| {
                func(api, &current)
            });
            match outcome {
                Ok(Ok(Some(next))) => current = next,
                Ok(Ok(None)) => {}
                Ok(Err(message)) => {
                    log::warn!(
                        "transform '{}' handler from '{}' failed: {}",
                        event,
                        entry.plugin,
                        message
                    );
                    diagnostics.push(Diagnostic::warning(
                        DiagCode::HookHandlerError,
                        format!(
                            "'{}' handler from '{}' failed; previous value kept",
                            event, entry.plugin
                        ),
                    ));
                }
                Err(_) => {}
            }
        }
        self.deliver_events(state, diagnostics);
        current
    }

    /// True when at least one handler is registered for `event`.
    pub fn has_hook(&self, event: &str) -> bool {
        self.hooks.has_handlers(event)
    }

    /// Dynamic hook registration on behalf of a plugin.
    pub fn register_hook(
        &mut self,
        plugin: &str,
        event: &str,
        priority: i32,
        func: HookFn,
    ) -> HookHandle {
        self.hooks.register(event, plugin, priority, func)
    }

    pub fn unregister_hook(&mut self, handle: HookHandle) -> bool {
        self.hooks.unregister(handle)
    }

    /// Subscribes a plugin to a named bus event.
    pub fn subscribe(&mut self, plugin: &str, event: &str, func: HookFn) {
        self.subscribers
            .push((event.to_string(), plugin.to_string(), func));
    }

    /// Emits a bus event from the host side.
    pub fn emit_event(
        &mut self,
        event: &str,
        payload: Value,
        state: &mut GameState,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        self.queued_events.push((event.to_string(), payload));
        self.deliver_events(state, diagnostics);
    }

    /// Delivers queued events synchronously in registration order. Events
    /// emitted during delivery are processed too, with a cap so two
    /// plugins cannot ping-pong forever.
    fn deliver_events(&mut self, state: &mut GameState, diagnostics: &mut Vec<Diagnostic>) {
        let mut delivered = 0;
        while !self.queued_events.is_empty() {
            if delivered > 1000 {
                diagnostics.push(Diagnostic::warning(
                    DiagCode::HookHandlerError,
                    "event delivery cap reached; remaining events dropped",
                ));
                self.queued_events.clear();
                return;
            }
            let batch = std::mem::take(&mut self.queued_events);
            for (event, payload) in batch {
                let subs: Vec<(String, HookFn)> = self
                    .subscribers
                    .iter()
                    .filter(|(name, _, _)| *name == event)
                    .map(|(_, plugin, func)| (plugin.clone(), func.clone()))
                    .collect();
                for (plugin, func) in subs {
                    if !self.plugin_active(&plugin) {
                        continue;
                    }
                    delivered += 1;
                    let outcome =
                        self.with_api(&plugin, state, diagnostics, |api| func(api, &payload));
                    if let Ok(Err(message)) = outcome {
                        diagnostics.push(Diagnostic::warning(
                            DiagCode::HookHandlerError,
                            format!("event '{}' handler from '{}' failed: {}", event, plugin, message),
                        ));
                    }
                }
            }
        }
    }

    fn plugin_active(&self, name: &str) -> bool {
        self.plugins
            .get(name)
            .map(|slot| slot.status == PluginStatus::Enabled)
            .unwrap_or(false)
    }

    /// `on_state_change` is observable only with `state:watch`.
    fn watch_allowed(&self, event: &str, plugin: &str) -> bool {
        if event != "on_state_change" {
            return true;
        }
        self.plugins
            .get(plugin)
            .map(|slot| {
                slot.manifest.trusted
                    || slot.manifest.capabilities.contains(&Capability::StateWatch)
            })
            .unwrap_or(false)
    }

    /// Storage snapshots for plugins that opted into undo.
    pub fn undo_storages(&self) -> Vec<(String, FxHashMap<String, Value>)> {
        self.plugins
            .iter()
            .filter(|(_, slot)| slot.manifest.undo_opt_in)
            .map(|(name, slot)| (name.clone(), slot.storage.clone()))
            .collect()
    }

    pub fn restore_storages(&mut self, storages: &[(String, FxHashMap<String, Value>)]) {
        for (name, storage) in storages {
            if let Some(slot) = self.plugins.get_mut(name) {
                slot.storage = storage.clone();
            }
        }
    }

    /// Per-plugin save payloads (plugins holding `persistence:write`).
    pub fn collect_plugin_data(&self) -> IndexMap<String, serde_json::Value> {
        let mut out = IndexMap::new();
        for (name, slot) in &self.plugins {
            if slot.storage.is_empty() {
                continue;
            }
            if !(slot.manifest.trusted
                || slot
                    .manifest
                    .capabilities
                    .contains(&Capability::PersistenceWrite))
            {
                continue;
            }
            let mut map = serde_json::Map::new();
            let mut keys: Vec<&String> = slot.storage.keys().collect();
            keys.sort();
            for key in keys {
                if let Ok(json) = serde_json::to_value(&slot.storage[key]) {
                    map.insert(key.clone(), json);
                }
            }
            out.insert(name.clone(), serde_json::Value::Object(map));
        }
        out
    }

    pub fn restore_plugin_data(&mut self, data: &IndexMap<String, serde_json::Value>) {
        for (name, payload) in data {
            let Some(slot) = self.plugins.get_mut(name) else {
                continue;
            };
            if !(slot.manifest.trusted
                || slot
                    .manifest
                    .capabilities
                    .contains(&Capability::PersistenceRead))
            {
                continue;
            }
            let Some(map) = payload.as_object() else {
                continue;
            };
            slot.storage.clear();
            for (key, json) in map {
                if let Ok(value) = serde_json::from_value::<Value>(json.clone()) {
                    slot.storage.insert(key.clone(), value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn kernel_with(manifests: Vec<PluginManifest>) -> (PluginKernel, GameState, Vec<Diagnostic>) {
        let mut kernel = PluginKernel::new();
        for manifest in manifests {
            kernel.register(manifest).expect("register");
        }
        let mut state = GameState::new(10);
        let mut diagnostics = Vec::new();
        kernel.load_all(&mut state, &mut diagnostics);
        (kernel, state, diagnostics)
    }

    #[test]
    fn plugins_load_in_dependency_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();

        let base = PluginManifest::new("base", "1.2.0").on_init(move |_| {
            o1.borrow_mut().push("base");
            Ok(())
        });
        let addon = PluginManifest::new("addon", "0.1.0")
            .with_dependency("base", "^1.0")
            .on_init(move |_| {
                o2.borrow_mut().push("addon");
                Ok(())
            });

        // Register in the wrong order on purpose.
        let (kernel, _, diags) = kernel_with(vec![addon, base]);
        assert!(diags.is_empty(), "{:?}", diags);
        assert_eq!(*order.borrow(), vec!["base", "addon"]);
        assert_eq!(kernel.status("addon"), Some(PluginStatus::Enabled));
    }

    #[test]
    fn version_mismatch_errors_the_dependent() {
        let base = PluginManifest::new("base", "0.9.0");
        let addon = PluginManifest::new("addon", "0.1.0").with_dependency("base", "^1.0");
        let (kernel, _, diags) = kernel_with(vec![base, addon]);
        assert_eq!(kernel.status("addon"), Some(PluginStatus::Errored));
        assert!(diags.iter().any(|d| d.code == DiagCode::PluginLoadError));
    }

    #[test]
    fn circular_dependencies_fail_loading() {
        let a = PluginManifest::new("a", "1.0.0").with_dependency("b", "*");
        let b = PluginManifest::new("b", "1.0.0").with_dependency("a", "*");
        let (kernel, _, diags) = kernel_with(vec![a, b]);
        assert_eq!(kernel.status("a"), Some(PluginStatus::Errored));
        assert_eq!(kernel.status("b"), Some(PluginStatus::Errored));
        assert!(diags.iter().any(|d| d.code == DiagCode::PluginLoadError));
    }

    #[test]
    fn capability_denied_for_undeclared_write() {
        let plugin = PluginManifest::new("reader", "1.0.0")
            .with_capability(Capability::StateRead)
            .with_default_hook("on_test", |api, _| {
                // Write without state:write must fail; read must succeed.
                let write = api.set_var("hp", Value::Int(10));
                assert!(matches!(
                    write,
                    Err(RuntimeError::CapabilityDenied { .. })
                ));
                let read = api.get_var("hp").expect("read is declared");
                assert_eq!(read, Value::Int(5));
                Ok(None)
            });

        let (mut kernel, mut state, mut diags) = kernel_with(vec![plugin]);
        state.set("hp", Value::Int(5));
        kernel.dispatch_observer("on_test", &Value::Nil, &mut state, &mut diags);

        // The denied write surfaced as a diagnostic and did not happen.
        assert!(diags.iter().any(|d| d.code == DiagCode::CapabilityDenied));
        assert_eq!(state.get("hp"), Value::Int(5));
    }

    #[test]
    fn trusted_plugins_hold_all_capabilities() {
        let plugin = PluginManifest::new("core", "1.0.0")
            .trusted()
            .with_default_hook("on_test", |api, _| {
                api.set_var("hp", Value::Int(1)).expect("trusted write");
                Ok(None)
            });
        let (mut kernel, mut state, mut diags) = kernel_with(vec![plugin]);
        kernel.dispatch_observer("on_test", &Value::Nil, &mut state, &mut diags);
        assert_eq!(state.get("hp"), Value::Int(1));
    }

    #[test]
    fn observer_handler_errors_do_not_stop_dispatch() {
        let hits = Rc::new(RefCell::new(0));
        let hits2 = hits.clone();
        let bad = PluginManifest::new("bad", "1.0.0")
            .with_hook("on_test", 10, |_, _| Err("boom".into()));
        let good = PluginManifest::new("good", "1.0.0").with_hook("on_test", 20, move |_, _| {
            *hits2.borrow_mut() += 1;
            Ok(None)
        });

        let (mut kernel, mut state, mut diags) = kernel_with(vec![bad, good]);
        kernel.dispatch_observer("on_test", &Value::Nil, &mut state, &mut diags);
        assert_eq!(*hits.borrow(), 1);
        assert!(diags.iter().any(|d| d.code == DiagCode::HookHandlerError));
    }

    #[test]
    fn transform_folds_in_priority_order() {
        let first = PluginManifest::new("first", "1.0.0").with_hook("on_text", 10, |_, v| {
            Ok(Some(Value::Str(format!("{}-a", v.to_display_string()))))
        });
        let second = PluginManifest::new("second", "1.0.0").with_hook("on_text", 20, |_, v| {
            Ok(Some(Value::Str(format!("{}-b", v.to_display_string()))))
        });

        let (mut kernel, mut state, mut diags) = kernel_with(vec![second, first]);
        let result = kernel.dispatch_transform(
            "on_text",
            Value::Str("x".into()),
            &mut state,
            &mut diags,
        );
        assert_eq!(result, Value::Str("x-a-b".into()));
    }

    #[test]
    fn transform_error_falls_back_to_previous_value() {
        let bad = PluginManifest::new("bad", "1.0.0")
            .with_hook("on_text", 10, |_, _| Err("nope".into()));
        let (mut kernel, mut state, mut diags) = kernel_with(vec![bad]);
        let result = kernel.dispatch_transform(
            "on_text",
            Value::Str("orig".into()),
            &mut state,
            &mut diags,
        );
        assert_eq!(result, Value::Str("orig".into()));
    }

    #[test]
    fn transform_nil_means_no_change() {
        let noop = PluginManifest::new("noop", "1.0.0").with_default_hook("on_text", |_, _| Ok(None));
        let (mut kernel, mut state, mut diags) = kernel_with(vec![noop]);
        let result =
            kernel.dispatch_transform("on_text", Value::Int(42), &mut state, &mut diags);
        assert_eq!(result, Value::Int(42));
    }

    #[test]
    fn state_change_requires_watch_capability() {
        let heard = Rc::new(RefCell::new(0));
        let h1 = heard.clone();
        let h2 = heard.clone();

        let deaf = PluginManifest::new("deaf", "1.0.0").with_default_hook(
            "on_state_change",
            move |_, _| {
                *h1.borrow_mut() += 10;
                Ok(None)
            },
        );
        let watcher = PluginManifest::new("watcher", "1.0.0")
            .with_capability(Capability::StateWatch)
            .with_default_hook("on_state_change", move |_, _| {
                *h2.borrow_mut() += 1;
                Ok(None)
            });

        let (mut kernel, mut state, mut diags) = kernel_with(vec![deaf, watcher]);
        kernel.dispatch_observer("on_state_change", &Value::Nil, &mut state, &mut diags);
        assert_eq!(*heard.borrow(), 1);
    }

    #[test]
    fn event_bus_delivers_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l1 = log.clone();
        let l2 = log.clone();

        let (mut kernel, mut state, mut diags) =
            kernel_with(vec![PluginManifest::new("a", "1.0.0"), PluginManifest::new("b", "1.0.0")]);
        kernel.subscribe("a", "ping", Rc::new(move |_, _| {
            l1.borrow_mut().push("a");
            Ok(None)
        }));
        kernel.subscribe("b", "ping", Rc::new(move |_, _| {
            l2.borrow_mut().push("b");
            Ok(None)
        }));

        kernel.emit_event("ping", Value::Nil, &mut state, &mut diags);
        assert_eq!(*log.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn plugin_storage_is_isolated() {
        let a = PluginManifest::new("a", "1.0.0").with_default_hook("on_store", |api, _| {
            api.storage_set("secret", Value::Int(1));
            Ok(None)
        });
        let b = PluginManifest::new("b", "1.0.0").with_hook("on_store", 60, |api, _| {
            // Different plugin, different map; nothing leaks.
            assert!(api.storage_get("secret").is_none());
            Ok(None)
        });
        let (mut kernel, mut state, mut diags) = kernel_with(vec![a, b]);
        kernel.dispatch_observer("on_store", &Value::Nil, &mut state, &mut diags);
        assert!(diags.iter().all(|d| d.code != DiagCode::HookHandlerError));
    }

    #[test]
    fn errored_plugins_are_skipped_in_dispatch() {
        let hits = Rc::new(RefCell::new(0));
        let h = hits.clone();
        let broken = PluginManifest::new("broken", "1.0.0")
            .on_init(|_| Err("bad init".into()))
            .with_default_hook("on_test", move |_, _| {
                *h.borrow_mut() += 1;
                Ok(None)
            });
        let (mut kernel, mut state, mut diags) = kernel_with(vec![broken]);
        assert_eq!(kernel.status("broken"), Some(PluginStatus::Errored));
        kernel.dispatch_observer("on_test", &Value::Nil, &mut state, &mut diags);
        assert_eq!(*hits.borrow(), 0);
    }
}
