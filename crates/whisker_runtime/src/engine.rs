//! The story engine.
//!
//! One engine runs one story for one session. Execution is cooperative and
//! single-threaded: a turn (starting the story, applying a choice, loading
//! a save) runs to completion and returns a rendered passage; between turns
//! the engine just holds state. Hosts wanting many sessions create many
//! engines — nothing here is process-global.
//!
//! # Turn protocol
//!
//! Every turn runs against a fresh [`Budget`] and a pre-turn snapshot.
//! Breaching the instruction or wall-clock limit aborts the turn and
//! restores the snapshot wholesale, so partial writes never become visible.
//! Other runtime problems degrade to `Nil` results plus `on_error` events
//! and the turn continues.
//!
//! # Hook ordering
//!
//! Within a turn: `on_passage_exit` of the outgoing passage precedes
//! `on_passage_enter` of the incoming one; `on_state_change` fires
//! synchronously at each assignment in source order; handlers run in
//! ascending priority with registration order breaking ties.

use std::collections::VecDeque;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use whisker_base::{DiagCode, Diagnostic};
use whisker_story::{Choice, ContentNode, Expr, Story, Value};

use crate::error::RuntimeError;
use crate::hooks::HookFn;
use crate::interpret::{Budget, EvalCaps, Evaluator};
use crate::plugin::{PluginKernel, PluginManifest};
use crate::save::SaveBundle;
use crate::state::{GameState, HistoryEvent, StateSnapshot};

/// When the engine autosaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutosavePolicy {
    #[default]
    Off,
    EveryChoice,
    EveryPassage,
}

/// Engine construction options.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Undo depth; zero disables undo entirely.
    pub max_undo_steps: usize,
    /// Instruction budget per turn.
    pub max_instructions: u64,
    /// Wall-clock budget per turn, in milliseconds.
    pub max_execution_ms: u64,
    /// Navigation history depth.
    pub history_limit: usize,
    /// Present guarded-off choices as disabled instead of hiding them.
    pub show_disabled_choices: bool,
    pub autosave: AutosavePolicy,
    /// Accept save bundles whose IFID does not match the story.
    pub allow_ifid_mismatch: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_undo_steps: 50,
            max_instructions: 1_000_000,
            max_execution_ms: 5_000,
            history_limit: 100,
            show_disabled_choices: false,
            autosave: AutosavePolicy::Off,
            allow_ifid_mismatch: false,
        }
    }
}

/// The engine lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Uninitialized,
    Loaded,
    Running,
    Suspended,
    Ended,
}

impl EngineStatus {
    fn name(self) -> &'static str {
        match self {
            EngineStatus::Uninitialized => "uninitialized",
            EngineStatus::Loaded => "loaded",
            EngineStatus::Running => "running",
            EngineStatus::Suspended => "suspended",
            EngineStatus::Ended => "ended",
        }
    }
}

/// One choice as presented to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedChoice {
    pub text: String,
    pub enabled: bool,
}

/// What the host shows between turns.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPassage {
    pub passage_id: String,
    pub text: String,
    pub choices: Vec<RenderedChoice>,
}

/// An undo step: state snapshot plus the exact presentation to restore.
#[derive(Clone)]
struct UndoSnapshot {
    state: StateSnapshot,
    plugin_storages: Vec<(String, FxHashMap<String, Value>)>,
    rendered: Option<RenderedPassage>,
    pending: Vec<Choice>,
    status: EngineStatus,
}

/// How a passage entry treats the world.
///
/// Normal navigation mutates: visits are counted, `on_enter`/`on_exit`
/// scripts run, assignments apply, enter/exit hooks fire. Re-presenting
/// already-restored state (after `load`) must do none of that — it only
/// evaluates interpolations, guards, and choices against the restored
/// variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryMode {
    Full,
    Present,
}

/// What rendering one passage body produced.
#[derive(Default)]
struct RenderOutcome {
    text: String,
    /// Choices in source order, with their guard verdicts.
    choices: Vec<(Choice, bool)>,
    /// Set when a divert stopped rendering.
    divert: Option<String>,
}

/// A running story session.
pub struct Engine {
    story: Story,
    config: EngineConfig,
    state: GameState,
    status: EngineStatus,
    kernel: PluginKernel,
    plugins_loaded: bool,
    undo_stack: VecDeque<UndoSnapshot>,
    current: Option<RenderedPassage>,
    /// The presented choices, aligned with `current.choices`.
    pending: Vec<Choice>,
    diagnostics: Vec<Diagnostic>,
    epoch: Instant,
    last_autosave: Option<SaveBundle>,
}

impl Engine {
    /// An engine with no story yet.
    pub fn empty(config: EngineConfig) -> Self {
        let history_limit = config.history_limit;
        Self {
            story: Story::default(),
            config,
            state: GameState::new(history_limit),
            status: EngineStatus::Uninitialized,
            kernel: PluginKernel::new(),
            plugins_loaded: false,
            undo_stack: VecDeque::new(),
            current: None,
            pending: Vec::new(),
            diagnostics: Vec::new(),
            epoch: Instant::now(),
            last_autosave: None,
        }
    }

    /// An engine with a story loaded.
    pub fn new(story: Story, config: EngineConfig) -> Self {
        let mut engine = Self::empty(config);
        engine.load_story(story);
        engine
    }

    pub fn load_story(&mut self, story: Story) {
        self.story = story;
        self.status = EngineStatus::Loaded;
        self.state.reset();
        self.undo_stack.clear();
        self.current = None;
        self.pending.clear();
    }

    pub fn status(&self) -> EngineStatus {
        self.status
    }

    pub fn story(&self) -> &Story {
        &self.story
    }

    pub fn current(&self) -> Option<&RenderedPassage> {
        self.current.as_ref()
    }

    pub fn current_passage_id(&self) -> Option<&str> {
        self.state.current_passage_id.as_deref()
    }

    /// Diagnostics accumulated since the last call; draining them is the
    /// host's job.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Host-side variable read, folded through `on_variable_get` so
    /// plugins can present derived values.
    pub fn get_var(&mut self, name: &str) -> Value {
        let raw = self.state.get(name);
        if !self.kernel_has_get_transform() {
            return raw;
        }
        let mut payload = IndexMap::new();
        payload.insert("name".to_string(), Value::Str(name.to_string()));
        payload.insert("value".to_string(), raw.clone());
        match self.kernel.dispatch_transform(
            "on_variable_get",
            Value::Map(payload),
            &mut self.state,
            &mut self.diagnostics,
        ) {
            Value::Map(map) => map.get("value").cloned().unwrap_or(raw),
            _ => raw,
        }
    }

    fn kernel_has_get_transform(&self) -> bool {
        self.kernel.has_hook("on_variable_get")
    }

    /// Host-side variable write; fires the same hooks as a script
    /// assignment.
    pub fn set_var(&mut self, name: &str, value: Value) {
        self.assign_with_hooks(name, value);
    }

    pub fn register_plugin(&mut self, manifest: PluginManifest) -> Result<(), RuntimeError> {
        self.kernel.register(manifest)
    }

    pub fn unregister_plugin(&mut self, name: &str) -> bool {
        self.kernel.unregister(name)
    }

    pub fn kernel_mut(&mut self) -> &mut PluginKernel {
        &mut self.kernel
    }

    /// Subscribes a host-side listener to the event bus.
    pub fn subscribe(&mut self, plugin: &str, event: &str, func: HookFn) {
        self.kernel.subscribe(plugin, event, func);
    }

    /// The most recent autosave bundle, if the policy produced one.
    pub fn take_autosave(&mut self) -> Option<SaveBundle> {
        self.last_autosave.take()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Starts the story from its start passage. Restarting after the story
    /// ends goes through [`Engine::reset`] first.
    pub fn start(&mut self) -> Result<&RenderedPassage, RuntimeError> {
        if self.status != EngineStatus::Loaded {
            return Err(self.invalid_state("start"));
        }

        self.state.reset();
        self.undo_stack.clear();
        for decl in &self.story.variables {
            self.state.set(&decl.name, decl.initial.clone());
        }

        if !self.plugins_loaded {
            self.kernel.load_all(&mut self.state, &mut self.diagnostics);
            self.plugins_loaded = true;
        }

        self.status = EngineStatus::Running;
        self.kernel.dispatch_observer(
            "on_story_start",
            &Value::Str(self.story.metadata.title.clone()),
            &mut self.state,
            &mut self.diagnostics,
        );

        let start_id = self.story.start_passage.clone();
        self.run_turn(move |engine, budget| {
            engine.enter_passage(&start_id, budget, EntryMode::Full)
        })?;
        self.maybe_autosave(AutosavePolicy::EveryPassage);
        self.rendered()
    }

    /// Applies the player's choice by presentation index.
    pub fn choose(&mut self, index: usize) -> Result<&RenderedPassage, RuntimeError> {
        if self.status != EngineStatus::Running {
            return Err(self.invalid_state("choose"));
        }
        if index >= self.pending.len() {
            return Err(RuntimeError::InvalidChoice {
                index,
                available: self.pending.len(),
            });
        }
        if let Some(rendered) = &self.current {
            if !rendered.choices[index].enabled {
                return Err(RuntimeError::InvalidChoice {
                    index,
                    available: self.pending.len(),
                });
            }
        }

        self.push_undo();

        let choice = self.pending[index].clone();
        let result = self.run_turn(move |engine, budget| {
            engine.kernel.dispatch_observer(
                "on_choice_select",
                &choice_payload(&choice, index),
                &mut engine.state,
                &mut engine.diagnostics,
            );

            if let Some(action) = &choice.action {
                engine.eval_expr(action, budget)?;
            }

            if let Some(target) = choice.target.clone() {
                engine.exit_current_passage(budget)?;
                if let Some(event) = engine.state.history.back_mut() {
                    event.via_choice = Some(index);
                }
                engine.enter_passage(&target, budget, EntryMode::Full)
            } else if !choice.body.is_empty() {
                engine.reveal_inline_body(&choice, budget)
            } else {
                // A choice leading nowhere ends the story.
                engine.finish_story();
                Ok(())
            }
        });

        if let Err(err) = result {
            // The turn rolled back; the undo entry for it must not linger.
            self.undo_stack.pop_back();
            return Err(err);
        }

        self.maybe_autosave(AutosavePolicy::EveryChoice);
        self.maybe_autosave(AutosavePolicy::EveryPassage);
        self.rendered()
    }

    /// Restores the state captured before the most recent choice.
    pub fn undo(&mut self) -> Result<&RenderedPassage, RuntimeError> {
        let Some(snapshot) = self.undo_stack.pop_back() else {
            let err = RuntimeError::EmptyUndoStack;
            self.report_error(&err);
            return Err(err);
        };
        self.restore_undo(snapshot);
        self.rendered()
    }

    /// Suspends a running engine (host pause menus and the like).
    pub fn suspend(&mut self) -> Result<(), RuntimeError> {
        if self.status != EngineStatus::Running {
            return Err(self.invalid_state("suspend"));
        }
        self.status = EngineStatus::Suspended;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), RuntimeError> {
        if self.status != EngineStatus::Suspended {
            return Err(self.invalid_state("resume"));
        }
        self.status = EngineStatus::Running;
        Ok(())
    }

    /// Back to `Loaded`, dropping all session state.
    pub fn reset(&mut self) {
        self.state.reset();
        self.undo_stack.clear();
        self.current = None;
        self.pending.clear();
        self.status = EngineStatus::Loaded;
    }

    // ------------------------------------------------------------------
    // Save / load
    // ------------------------------------------------------------------

    /// Captures a save bundle, after the `on_save` transform fold.
    pub fn save(&mut self) -> Result<SaveBundle, RuntimeError> {
        if !matches!(self.status, EngineStatus::Loaded | EngineStatus::Running) {
            return Err(self.invalid_state("save"));
        }
        Ok(self.capture_bundle())
    }

    fn capture_bundle(&mut self) -> SaveBundle {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let bundle = SaveBundle::capture(
            &self.state,
            self.story.metadata.ifid.clone(),
            self.kernel.collect_plugin_data(),
            timestamp,
        );
        self.transform_bundle("on_save", bundle)
    }

    /// Restores a save bundle, after the `on_load` transform fold.
    pub fn load(&mut self, bundle: SaveBundle) -> Result<&RenderedPassage, RuntimeError> {
        if !matches!(self.status, EngineStatus::Loaded | EngineStatus::Running) {
            return Err(self.invalid_state("load"));
        }

        let expected = self.story.metadata.ifid.clone().unwrap_or_default();
        let found = bundle.story_ifid.clone().unwrap_or_default();
        if !self.config.allow_ifid_mismatch && expected != found {
            let err = RuntimeError::SaveMismatch { expected, found };
            self.report_error(&err);
            return Err(err);
        }

        let bundle = self.transform_bundle("on_load", bundle);

        if !self.plugins_loaded {
            self.kernel.load_all(&mut self.state, &mut self.diagnostics);
            self.plugins_loaded = true;
        }

        bundle.apply(&mut self.state);
        self.kernel.restore_plugin_data(&bundle.plugin_data);
        self.undo_stack.clear();
        self.status = EngineStatus::Running;

        let Some(current) = self.state.current_passage_id.clone() else {
            let err = RuntimeError::UnknownPassage {
                id: "<none>".to_string(),
            };
            self.report_error(&err);
            return Err(err);
        };

        // Present the saved passage without re-running entry side effects:
        // no visit count, no on_enter script, no assignment re-execution.
        self.run_turn(move |engine, budget| {
            engine.enter_passage(&current, budget, EntryMode::Present)
        })?;
        self.rendered()
    }

    /// Folds a bundle through a save/load transform hook, tolerating
    /// handlers that return malformed bundles.
    fn transform_bundle(&mut self, hook: &str, bundle: SaveBundle) -> SaveBundle {
        if let Ok(json) = serde_json::to_value(&bundle) {
            if let Ok(value) = serde_json::from_value::<Value>(json) {
                let folded = self.kernel.dispatch_transform(
                    hook,
                    value,
                    &mut self.state,
                    &mut self.diagnostics,
                );
                if let Ok(json) = serde_json::to_value(&folded) {
                    match serde_json::from_value::<SaveBundle>(json) {
                        Ok(next) => return next,
                        Err(_) => {
                            self.diagnostics.push(Diagnostic::warning(
                                DiagCode::HookHandlerError,
                                format!("'{}' transform produced a malformed bundle; original kept", hook),
                            ));
                        }
                    }
                }
            }
        }
        bundle
    }

    fn maybe_autosave(&mut self, trigger: AutosavePolicy) {
        if self.config.autosave != trigger {
            return;
        }
        if self.status != EngineStatus::Running && self.status != EngineStatus::Ended {
            return;
        }
        let bundle = self.capture_bundle();
        match bundle.to_json() {
            Ok(_) => self.last_autosave = Some(bundle),
            Err(err) => {
                // Autosave failure warns and keeps playing.
                log::warn!("autosave failed: {}", err);
                self.diagnostics.push(Diagnostic::warning(
                    DiagCode::AutosaveFailed,
                    format!("autosave failed: {}", err),
                ));
                self.kernel.emit_event(
                    "on_error",
                    Value::Str(format!("autosave failed: {}", err)),
                    &mut self.state,
                    &mut self.diagnostics,
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // Turn machinery
    // ------------------------------------------------------------------

    /// Runs one turn under a fresh budget; breaching the budget (or hitting
    /// an unknown passage) rolls everything back to the pre-turn state.
    fn run_turn(
        &mut self,
        f: impl FnOnce(&mut Self, &mut Budget) -> Result<(), RuntimeError>,
    ) -> Result<(), RuntimeError> {
        let snapshot = self.capture_undo();
        let mut budget = Budget::new(self.config.max_instructions, self.config.max_execution_ms);

        match f(self, &mut budget) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.restore_undo(snapshot);
                self.report_error(&err);
                Err(err)
            }
        }
    }

    fn push_undo(&mut self) {
        if self.config.max_undo_steps == 0 {
            return;
        }
        if self.undo_stack.len() >= self.config.max_undo_steps {
            self.undo_stack.pop_front();
        }
        let snapshot = self.capture_undo();
        self.undo_stack.push_back(snapshot);
    }

    fn capture_undo(&self) -> UndoSnapshot {
        UndoSnapshot {
            state: self.state.snapshot(),
            plugin_storages: self.kernel.undo_storages(),
            rendered: self.current.clone(),
            pending: self.pending.clone(),
            status: self.status,
        }
    }

    fn restore_undo(&mut self, snapshot: UndoSnapshot) {
        self.state.restore(&snapshot.state);
        self.kernel.restore_storages(&snapshot.plugin_storages);
        self.current = snapshot.rendered;
        self.pending = snapshot.pending;
        self.status = snapshot.status;
    }

    /// Enters `id`, following divert chains until a passage presents
    /// choices (or the story ends).
    fn enter_passage(
        &mut self,
        id: &str,
        budget: &mut Budget,
        mode: EntryMode,
    ) -> Result<(), RuntimeError> {
        let mut id = id.to_string();

        loop {
            budget.check_clock()?;
            let passage = self
                .story
                .get_passage(&id)
                .cloned()
                .ok_or_else(|| RuntimeError::UnknownPassage { id: id.clone() })?;

            if mode == EntryMode::Full {
                self.state.record_visit(&id);
                self.state.push_history(HistoryEvent {
                    passage_id: id.clone(),
                    via_choice: None,
                });
            }
            self.state.current_passage_id = Some(id.clone());

            if mode == EntryMode::Full {
                self.kernel.dispatch_observer(
                    "on_passage_enter",
                    &Value::Str(id.clone()),
                    &mut self.state,
                    &mut self.diagnostics,
                );
            }

            self.state.temp_variables.clear();
            if mode == EntryMode::Full {
                if let Some(script) = &passage.on_enter {
                    self.eval_expr(script, budget)?;
                }
            }

            let mut outcome = RenderOutcome::default();
            self.render_nodes(&passage.content, budget, &mut outcome, mode)?;

            if let Some(target) = outcome.divert.take() {
                if mode == EntryMode::Full {
                    self.exit_passage(&passage.id, passage.on_exit.as_ref(), budget)?;
                }
                id = target;
                continue;
            }

            self.present(&id, outcome, budget);
            return Ok(());
        }
    }

    /// Builds the host-facing rendering: transform hooks, choice filtering,
    /// end-of-story detection.
    fn present(&mut self, id: &str, outcome: RenderOutcome, _budget: &mut Budget) {
        let text = match self.kernel.dispatch_transform(
            "on_passage_render",
            Value::Str(outcome.text),
            &mut self.state,
            &mut self.diagnostics,
        ) {
            Value::Str(text) => text,
            other => other.to_display_string(),
        };

        let mut presented: Vec<(Choice, bool)> = Vec::new();
        for (choice, enabled) in outcome.choices {
            if enabled || self.config.show_disabled_choices {
                presented.push((choice, enabled));
            }
        }

        // Choice texts fold through on_choice_present as an array of
        // strings; length-preserving results are applied positionally.
        if !presented.is_empty() {
            let texts = Value::Array(
                presented
                    .iter()
                    .map(|(c, _)| Value::Str(c.text.clone()))
                    .collect(),
            );
            if let Value::Array(folded) = self.kernel.dispatch_transform(
                "on_choice_present",
                texts,
                &mut self.state,
                &mut self.diagnostics,
            ) {
                if folded.len() == presented.len() {
                    for ((choice, _), new_text) in presented.iter_mut().zip(folded) {
                        if let Value::Str(text) = new_text {
                            choice.text = text;
                        }
                    }
                } else {
                    self.diagnostics.push(Diagnostic::warning(
                        DiagCode::HookHandlerError,
                        "on_choice_present changed the choice count; ignored",
                    ));
                }
            }
        }

        let enabled_count = presented.iter().filter(|(_, enabled)| *enabled).count();

        self.pending = presented.iter().map(|(c, _)| c.clone()).collect();
        self.current = Some(RenderedPassage {
            passage_id: id.to_string(),
            text,
            choices: presented
                .into_iter()
                .map(|(choice, enabled)| RenderedChoice {
                    text: choice.text,
                    enabled,
                })
                .collect(),
        });

        if enabled_count == 0 {
            self.finish_story();
        }
    }

    fn finish_story(&mut self) {
        if self.status != EngineStatus::Ended {
            self.status = EngineStatus::Ended;
            self.kernel.dispatch_observer(
                "on_story_end",
                &Value::Nil,
                &mut self.state,
                &mut self.diagnostics,
            );
        }
    }

    /// Runs the current passage's exit protocol.
    fn exit_current_passage(&mut self, budget: &mut Budget) -> Result<(), RuntimeError> {
        let Some(id) = self.state.current_passage_id.clone() else {
            return Ok(());
        };
        let on_exit = self.story.get_passage(&id).and_then(|p| p.on_exit.clone());
        self.exit_passage(&id, on_exit.as_ref(), budget)
    }

    fn exit_passage(
        &mut self,
        id: &str,
        on_exit: Option<&Expr>,
        budget: &mut Budget,
    ) -> Result<(), RuntimeError> {
        if let Some(script) = on_exit {
            self.eval_expr(script, budget)?;
        }
        self.kernel.dispatch_observer(
            "on_passage_exit",
            &Value::Str(id.to_string()),
            &mut self.state,
            &mut self.diagnostics,
        );
        Ok(())
    }

    /// An inline-body choice: its content joins the current rendering and
    /// may contribute new choices or a divert.
    fn reveal_inline_body(
        &mut self,
        choice: &Choice,
        budget: &mut Budget,
    ) -> Result<(), RuntimeError> {
        let mut outcome = RenderOutcome::default();
        self.render_nodes(&choice.body, budget, &mut outcome, EntryMode::Full)?;

        if let Some(target) = outcome.divert.take() {
            self.exit_current_passage(budget)?;
            return self.enter_passage(&target, budget, EntryMode::Full);
        }

        let id = self
            .state
            .current_passage_id
            .clone()
            .unwrap_or_default();

        let mut merged_text = self
            .current
            .as_ref()
            .map(|r| r.text.clone())
            .unwrap_or_default();
        if !merged_text.ends_with('\n') && !merged_text.is_empty() {
            merged_text.push('\n');
        }
        merged_text.push_str(&outcome.text);

        // Keep the existing choices and add any the body revealed.
        let mut choices: Vec<(Choice, bool)> = self
            .pending
            .iter()
            .cloned()
            .zip(
                self.current
                    .as_ref()
                    .map(|r| r.choices.iter().map(|c| c.enabled).collect::<Vec<_>>())
                    .unwrap_or_default(),
            )
            .collect();
        choices.extend(outcome.choices);

        let merged = RenderOutcome {
            text: merged_text,
            choices,
            divert: None,
        };
        self.present(&id, merged, budget);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    fn render_nodes(
        &mut self,
        nodes: &[ContentNode],
        budget: &mut Budget,
        outcome: &mut RenderOutcome,
        mode: EntryMode,
    ) -> Result<(), RuntimeError> {
        for node in nodes {
            if outcome.divert.is_some() {
                return Ok(());
            }
            budget.charge(1)?;

            match node {
                ContentNode::Text { text, .. } => outcome.text.push_str(text),
                ContentNode::Blockquote { body, .. } | ContentNode::ListItem { body, .. } => {
                    self.render_nodes(body, budget, outcome, mode)?;
                    if !outcome.text.ends_with('\n') {
                        outcome.text.push('\n');
                    }
                }
                ContentNode::HorizontalRule => outcome.text.push_str("---\n"),
                ContentNode::Interpolation { expr } | ContentNode::Print { expr } => {
                    let value = self.eval_with(expr, budget)?;
                    outcome.text.push_str(&value.to_display_string());
                }
                ContentNode::Assignment { var, expr } => {
                    // The restored state already reflects this assignment;
                    // re-presenting must not apply it (or fire its hooks)
                    // again.
                    if mode == EntryMode::Full {
                        let value = self.eval_with(expr, budget)?;
                        self.assign_with_hooks(var, value);
                    }
                }
                ContentNode::Conditional {
                    condition,
                    then_body,
                    elsif,
                    else_body,
                } => {
                    if self.eval_with(condition, budget)?.is_truthy() {
                        self.render_nodes(then_body, budget, outcome, mode)?;
                    } else {
                        let mut rendered = false;
                        for (cond, body) in elsif {
                            if self.eval_with(cond, budget)?.is_truthy() {
                                self.render_nodes(body, budget, outcome, mode)?;
                                rendered = true;
                                break;
                            }
                        }
                        if !rendered {
                            if let Some(body) = else_body {
                                self.render_nodes(body, budget, outcome, mode)?;
                            }
                        }
                    }
                }
                ContentNode::ForEach {
                    binder,
                    collection,
                    body,
                } => {
                    let collection = self.eval_with(collection, budget)?;
                    let items: Vec<Value> = match collection {
                        Value::Array(items) => items,
                        Value::Map(entries) => entries.into_iter().map(|(_, v)| v).collect(),
                        other => {
                            self.diagnostics.push(Diagnostic::warning(
                                DiagCode::TypeMismatch,
                                format!("cannot iterate over {}", other.type_name()),
                            ));
                            Vec::new()
                        }
                    };
                    for item in items {
                        budget.charge(1)?;
                        self.state.set_temp(binder, item);
                        self.render_nodes(body, budget, outcome, mode)?;
                        if outcome.divert.is_some() {
                            break;
                        }
                    }
                }
                ContentNode::Choice { choice } => {
                    let enabled = match &choice.condition {
                        Some(cond) => self.eval_with(cond, budget)?.is_truthy(),
                        None => true,
                    };
                    outcome.choices.push((choice.clone(), enabled));
                }
                ContentNode::Divert { target } => {
                    outcome.divert = Some(target.clone());
                    return Ok(());
                }
                ContentNode::NamedHook { visible, body, .. } => {
                    if *visible {
                        self.render_nodes(body, budget, outcome, mode)?;
                    }
                }
                // Opaque host script: never executed by the sandbox.
                ContentNode::ScriptBlock { .. } => {}
                ContentNode::Warning { message } => {
                    self.diagnostics.push(Diagnostic::warning(
                        DiagCode::UnsupportedConstruct,
                        message.clone(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Evaluates an expression for its side effects. Budget breaches
    /// propagate (they abort the turn); the evaluator degrades everything
    /// else to `Nil` internally.
    fn eval_expr(&mut self, expr: &Expr, budget: &mut Budget) -> Result<(), RuntimeError> {
        self.eval_with(expr, budget).map(|_| ())
    }

    fn eval_with(&mut self, expr: &Expr, budget: &mut Budget) -> Result<Value, RuntimeError> {
        let mut evaluator = Evaluator {
            state: &mut self.state,
            caps: EvalCaps::full(),
            budget,
            diagnostics: &mut self.diagnostics,
            epoch: self.epoch,
        };
        evaluator.eval(expr)
    }

    /// Assigns a variable, folding `on_variable_set` and firing
    /// `on_state_change`.
    fn assign_with_hooks(&mut self, name: &str, value: Value) {
        let mut payload = IndexMap::new();
        payload.insert("name".to_string(), Value::Str(name.to_string()));
        payload.insert("value".to_string(), value.clone());

        let folded = self.kernel.dispatch_transform(
            "on_variable_set",
            Value::Map(payload),
            &mut self.state,
            &mut self.diagnostics,
        );
        let final_value = match folded {
            Value::Map(map) => map.get("value").cloned().unwrap_or(value),
            _ => value,
        };

        self.state.set(name, final_value.clone());

        let mut change = IndexMap::new();
        change.insert("name".to_string(), Value::Str(name.to_string()));
        change.insert("value".to_string(), final_value);
        self.kernel.dispatch_observer(
            "on_state_change",
            &Value::Map(change),
            &mut self.state,
            &mut self.diagnostics,
        );
    }

    fn report_error(&mut self, err: &RuntimeError) {
        self.diagnostics.push(err.to_diagnostic());
        self.kernel.dispatch_observer(
            "on_error",
            &Value::Str(err.to_string()),
            &mut self.state,
            &mut self.diagnostics,
        );
    }

    fn invalid_state(&self, operation: &str) -> RuntimeError {
        RuntimeError::InvalidState {
            operation: operation.to_string(),
            state: self.status.name().to_string(),
        }
    }

    fn rendered(&self) -> Result<&RenderedPassage, RuntimeError> {
        self.current.as_ref().ok_or(RuntimeError::UnknownPassage {
            id: "<none>".to_string(),
        })
    }
}

fn choice_payload(choice: &Choice, index: usize) -> Value {
    let mut map = IndexMap::new();
    map.insert("text".to_string(), Value::Str(choice.text.clone()));
    map.insert("index".to_string(), Value::Int(index as i64));
    if let Some(target) = &choice.target {
        map.insert("target".to_string(), Value::Str(target.clone()));
    }
    Value::Map(map)
}
