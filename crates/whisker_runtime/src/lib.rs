//! # whisker-runtime
//!
//! The deterministic, sandboxed runtime for Whisker stories:
//!
//! - [`Engine`] — passage flow, choice filtering, undo, save/load,
//!   autosave, per-turn execution budgets with atomic rollback
//! - [`interpret`] — the capability-gated expression evaluator
//! - [`builtins`] — the closed standard library
//! - [`plugin`] — the plugin kernel: manifests, capabilities, observer and
//!   transform hooks, the synchronous event bus
//!
//! Everything is single-threaded and engine-scoped. Hosts needing many
//! sessions run many engines; no state is shared between them.

pub mod builtins;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod interpret;
pub mod plugin;
pub mod save;
pub mod state;

pub use engine::{
    AutosavePolicy, Engine, EngineConfig, EngineStatus, RenderedChoice, RenderedPassage,
};
pub use error::RuntimeError;
pub use hooks::{Capability, HookFn, HookHandle, PluginApi, DEFAULT_PRIORITY};
pub use interpret::{Budget, EvalCaps, Evaluator};
pub use plugin::{PluginKernel, PluginManifest, PluginStatus};
pub use save::{SaveBundle, SAVE_VERSION};
pub use state::{GameState, HistoryEvent, StateSnapshot};
