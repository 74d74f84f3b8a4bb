//! Passages — the atomic unit of navigation.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::content::{Choice, ContentNode};
use crate::expr::Expr;

/// A named node of narrative content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Stable identifier, unique within a story.
    pub id: String,
    /// Name shown to authors; defaults to the id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Editor canvas position; meaningless to the runtime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<(f64, f64)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ContentNode>,
    /// Script executed on passage entry, before content renders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_enter: Option<Expr>,
    /// Script executed when leaving the passage through a choice or divert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_exit: Option<Expr>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub metadata: IndexMap<String, String>,
}

impl Passage {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            tags: Vec::new(),
            position: None,
            content: Vec::new(),
            on_enter: None,
            on_exit: None,
            metadata: IndexMap::new(),
        }
    }

    /// The name shown to authors: `display_name` if set, else the id.
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// All passage ids this passage links to via choices or diverts.
    pub fn targets(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for node in &self.content {
            node.collect_targets(&mut out);
        }
        out
    }

    /// All choices in this passage body, in source order, including choices
    /// nested inside conditionals.
    pub fn choices(&self) -> Vec<&Choice> {
        let mut out = Vec::new();
        for node in &self.content {
            node.walk(&mut |n| {
                if let ContentNode::Choice { choice } = n {
                    out.push(choice);
                }
            });
        }
        out
    }

    /// Word count of the literal text, used by the length lints.
    pub fn word_count(&self) -> usize {
        let mut count = 0;
        for node in &self.content {
            node.walk(&mut |n| {
                if let ContentNode::Text { text, .. } = n {
                    count += text.split_whitespace().count();
                }
            });
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_falls_back_to_id() {
        let mut passage = Passage::new("intro");
        assert_eq!(passage.name(), "intro");
        passage.display_name = Some("The Beginning".into());
        assert_eq!(passage.name(), "The Beginning");
    }

    #[test]
    fn targets_collects_from_nested_content() {
        let mut passage = Passage::new("p");
        passage.content = vec![
            ContentNode::Choice {
                choice: Choice::to_target("go", "End"),
            },
            ContentNode::Divert {
                target: "Other".into(),
            },
        ];
        assert_eq!(passage.targets(), vec!["End", "Other"]);
    }

    #[test]
    fn word_count_counts_text_nodes_only() {
        let mut passage = Passage::new("p");
        passage.content = vec![
            ContentNode::text("one two three"),
            ContentNode::Divert {
                target: "x".into(),
            },
        ];
        assert_eq!(passage.word_count(), 3);
    }
}
