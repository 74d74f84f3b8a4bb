//! The story container.
//!
//! A [`Story`] owns its passages, keyed by id but iterated in insertion
//! order. Mutations that would break integrity invariants (empty ids,
//! duplicate ids) are rejected at the call site with a structural
//! diagnostic; [`Story::validate`] reports the cross-passage problems
//! (unresolvable start, dangling references).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use whisker_base::{DiagCode, Diagnostic};

use crate::passage::Passage;
use crate::value::Value;

/// Story-level metadata.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StoryMetadata {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Persistent unique identifier for the work (Treaty of Babel).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ifid: Option<String>,
    /// Declared target format, e.g. `harlowe`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_version: Option<String>,
    /// Free-form key-value extras preserved through round-trips.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub extra: IndexMap<String, String>,
}

/// A declared story variable with its initial value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDecl {
    pub name: String,
    #[serde(default)]
    pub initial: Value,
}

/// A complete story: metadata, passages, and global assets.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Story {
    #[serde(default)]
    pub metadata: StoryMetadata,
    /// Passages in insertion order. Serialized as an array; the id key map
    /// is rebuilt on deserialization.
    #[serde(with = "passages_as_list")]
    pub passages: IndexMap<String, Passage>,
    /// Id of the passage where execution starts.
    #[serde(default)]
    pub start_passage: String,
    /// Opaque stylesheet handed to host runtimes.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub global_css: String,
    /// Opaque script handed to host runtimes; never executed by the sandbox.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub global_script: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<VariableDecl>,
}

impl Story {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            metadata: StoryMetadata {
                title: title.into(),
                ..StoryMetadata::default()
            },
            ..Story::default()
        }
    }

    /// Adds a passage, rejecting empty and duplicate ids.
    ///
    /// The first passage added becomes the start passage unless one was
    /// already set.
    pub fn add_passage(&mut self, passage: Passage) -> Result<(), Diagnostic> {
        if passage.id.trim().is_empty() {
            return Err(Diagnostic::error(
                DiagCode::EmptyPassageId,
                "passage id may not be empty",
            ));
        }
        if self.passages.contains_key(&passage.id) {
            return Err(Diagnostic::error(
                DiagCode::DuplicatePassageId,
                format!("duplicate passage id '{}'", passage.id),
            ));
        }
        if self.start_passage.is_empty() {
            self.start_passage = passage.id.clone();
        }
        self.passages.insert(passage.id.clone(), passage);
        Ok(())
    }

    pub fn get_passage(&self, id: &str) -> Option<&Passage> {
        self.passages.get(id)
    }

    /// Passages in insertion order.
    pub fn get_all_passages(&self) -> impl Iterator<Item = &Passage> {
        self.passages.values()
    }

    pub fn passage_count(&self) -> usize {
        self.passages.len()
    }

    pub fn set_metadata(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match key {
            "title" => self.metadata.title = value,
            "author" => self.metadata.author = Some(value),
            "ifid" => self.metadata.ifid = Some(value),
            "format" => self.metadata.format = Some(value),
            "format-version" | "format_version" => self.metadata.format_version = Some(value),
            other => {
                self.metadata.extra.insert(other.to_string(), value);
            }
        }
    }

    /// The declared start passage, if it resolves.
    pub fn start(&self) -> Option<&Passage> {
        self.passages.get(&self.start_passage)
    }

    /// Checks cross-passage integrity: a resolvable start passage and no
    /// dangling choice/divert targets. Dangling targets are warnings — the
    /// IR stays usable — while a missing start is an error.
    pub fn validate(&self) -> Vec<Diagnostic> {
        let mut diags = Vec::new();

        if self.passages.is_empty() {
            diags.push(Diagnostic::error(
                DiagCode::NoPassages,
                "story has no passages",
            ));
            return diags;
        }

        if self.start().is_none() {
            diags.push(Diagnostic::error(
                DiagCode::MissingStart,
                format!("start passage '{}' does not exist", self.start_passage),
            ));
        }

        for passage in self.passages.values() {
            for target in passage.targets() {
                if !self.passages.contains_key(target) {
                    diags.push(Diagnostic::warning(
                        DiagCode::InvalidReference,
                        format!(
                            "passage '{}' references unknown passage '{}'",
                            passage.id, target
                        ),
                    ));
                }
            }
        }

        diags
    }
}

/// Serializes the passage map as a plain array, keeping insertion order.
/// The map keys are redundant with `Passage::id`, so a list round-trips
/// exactly.
mod passages_as_list {
    use super::*;
    use serde::de::Error;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        passages: &IndexMap<String, Passage>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(passages.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<IndexMap<String, Passage>, D::Error> {
        let list = Vec::<Passage>::deserialize(deserializer)?;
        let mut map = IndexMap::with_capacity(list.len());
        for passage in list {
            if map.insert(passage.id.clone(), passage).is_some() {
                return Err(D::Error::custom("duplicate passage id"));
            }
        }
        Ok(map)
    }
}
