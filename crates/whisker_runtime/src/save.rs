//! Save bundles.
//!
//! A save is a stand-alone JSON document with a fixed key set. Bundles
//! serialize canonically (sorted keys, insertion-ordered arrays) so
//! identical states produce identical bytes, which keeps autosave dedup and
//! test fixtures honest.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use whisker_story::{canonical_string, Value};

use crate::state::GameState;

/// The bundle format version this runtime writes.
pub const SAVE_VERSION: u32 = 1;

/// One serialized game state plus per-plugin payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveBundle {
    pub version: u32,
    /// IFID of the story this save belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_ifid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_passage_id: Option<String>,
    pub variables: IndexMap<String, Value>,
    /// Sorted map for byte-stable output.
    pub visited: std::collections::BTreeMap<String, u32>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub plugin_data: IndexMap<String, serde_json::Value>,
    /// Seconds since the Unix epoch at save time.
    pub timestamp: u64,
}

impl SaveBundle {
    /// Captures a bundle from live state.
    pub fn capture(
        state: &GameState,
        story_ifid: Option<String>,
        plugin_data: IndexMap<String, serde_json::Value>,
        timestamp: u64,
    ) -> Self {
        Self {
            version: SAVE_VERSION,
            story_ifid,
            current_passage_id: state.current_passage_id.clone(),
            variables: state.variables.clone(),
            visited: state.visited.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            plugin_data,
            timestamp,
        }
    }

    /// Applies this bundle's state portion onto a game state.
    pub fn apply(&self, state: &mut GameState) {
        state.variables = self.variables.clone();
        state.visited = self.visited.iter().map(|(k, v)| (k.clone(), *v)).collect();
        state.current_passage_id = self.current_passage_id.clone();
        state.temp_variables.clear();
    }

    /// Canonical JSON text for persistence.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        canonical_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
