//! Mutable game state and snapshots.
//!
//! A [`GameState`] is owned exclusively by its engine. Variables use an
//! insertion-ordered map so snapshots and save bundles serialize
//! deterministically — undo correctness is checked bit-for-bit against
//! serialized snapshots.

use std::collections::VecDeque;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use whisker_story::Value;

/// One navigation event in the bounded history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub passage_id: String,
    /// Index of the choice that led here, if any.
    pub via_choice: Option<usize>,
}

/// The complete mutable state of one story session.
#[derive(Debug, Clone, Default)]
pub struct GameState {
    /// Story variables, insertion-ordered for deterministic serialization.
    pub variables: IndexMap<String, Value>,
    /// Temporaries scoped to the current passage execution.
    pub temp_variables: IndexMap<String, Value>,
    /// Visit count per passage id.
    pub visited: FxHashMap<String, u32>,
    /// Bounded navigation history, oldest first.
    pub history: VecDeque<HistoryEvent>,
    pub current_passage_id: Option<String>,
    /// Host-managed bookkeeping about save slots (names, labels,
    /// timestamps). Not part of undo snapshots.
    pub save_slot_metadata: IndexMap<String, String>,
    history_limit: usize,
}

impl GameState {
    pub fn new(history_limit: usize) -> Self {
        Self {
            history_limit,
            ..GameState::default()
        }
    }

    /// Clears everything; used by `start` and `reset`.
    pub fn reset(&mut self) {
        self.variables.clear();
        self.temp_variables.clear();
        self.visited.clear();
        self.history.clear();
        self.current_passage_id = None;
        self.save_slot_metadata.clear();
    }

    /// Reads a variable, checking the temp scope first. Missing variables
    /// read as `Nil`.
    pub fn get(&self, name: &str) -> Value {
        self.temp_variables
            .get(name)
            .or_else(|| self.variables.get(name))
            .cloned()
            .unwrap_or(Value::Nil)
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.variables.insert(name.to_string(), value);
    }

    pub fn set_temp(&mut self, name: &str, value: Value) {
        self.temp_variables.insert(name.to_string(), value);
    }

    pub fn visit_count(&self, passage_id: &str) -> u32 {
        self.visited.get(passage_id).copied().unwrap_or(0)
    }

    pub fn record_visit(&mut self, passage_id: &str) {
        *self.visited.entry(passage_id.to_string()).or_insert(0) += 1;
    }

    pub fn push_history(&mut self, event: HistoryEvent) {
        if self.history_limit > 0 && self.history.len() >= self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(event);
    }

    /// Captures the restorable portion of the state.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            variables: self.variables.clone(),
            visited: self.visited.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            current_passage_id: self.current_passage_id.clone(),
        }
    }

    /// Restores a snapshot wholesale; never partial.
    pub fn restore(&mut self, snapshot: &StateSnapshot) {
        self.variables = snapshot.variables.clone();
        self.visited = snapshot.visited.iter().map(|(k, v)| (k.clone(), *v)).collect();
        self.current_passage_id = snapshot.current_passage_id.clone();
        self.temp_variables.clear();
    }
}

/// The restorable portion of a [`GameState`], used by undo and by turn
/// rollback. Serializable so tests can compare snapshots bit-for-bit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub variables: IndexMap<String, Value>,
    /// Sorted map so snapshot serialization is order-stable.
    pub visited: std::collections::BTreeMap<String, u32>,
    pub current_passage_id: Option<String>,
}
