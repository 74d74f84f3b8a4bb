//! Passage content nodes.
//!
//! A passage body is an ordered sequence of [`ContentNode`]s: literal text
//! with formatting flags, structural markup, interpolations, control flow,
//! choices, and diverts. Choices reference their targets by id string only,
//! never by pointer, so stories can be cloned, compacted, and snapshotted
//! freely.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::expr::Expr;

/// Inline formatting applied to a text run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FormatFlags {
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub strike: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub code: bool,
    /// Set for fenced code blocks; holds the info string (may be empty).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codeblock: Option<String>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl FormatFlags {
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn is_plain(&self) -> bool {
        *self == Self::default()
    }
}

/// An authored option presented to the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    /// Text shown to the player.
    pub text: String,
    /// Destination passage id; `None` for inline-body choices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Content rendered when the choice is selected and it has no target.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub body: Vec<ContentNode>,
    /// Guard condition; the choice is offered only when this is truthy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Expr>,
    /// Script executed when the choice is selected, before navigation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Expr>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub metadata: IndexMap<String, String>,
}

impl Choice {
    pub fn to_target(text: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            target: Some(target.into()),
            body: Vec::new(),
            condition: None,
            action: None,
            metadata: IndexMap::new(),
        }
    }
}

/// One node in a passage body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentNode {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "FormatFlags::is_plain")]
        flags: FormatFlags,
    },
    Blockquote {
        depth: u8,
        body: Vec<ContentNode>,
    },
    ListItem {
        ordered: bool,
        body: Vec<ContentNode>,
    },
    HorizontalRule,
    /// `{ expr }` — evaluated and rendered in place.
    Interpolation {
        expr: Expr,
    },
    Conditional {
        condition: Expr,
        then_body: Vec<ContentNode>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        elsif: Vec<(Expr, Vec<ContentNode>)>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        else_body: Option<Vec<ContentNode>>,
    },
    ForEach {
        binder: String,
        collection: Expr,
        body: Vec<ContentNode>,
    },
    /// `~ $var = expr`
    Assignment {
        var: String,
        expr: Expr,
    },
    Print {
        expr: Expr,
    },
    Choice {
        choice: Choice,
    },
    /// Unconditional transition to another passage.
    Divert {
        target: String,
    },
    /// A labeled region of content addressable by hooks (Harlowe).
    NamedHook {
        name: String,
        visible: bool,
        body: Vec<ContentNode>,
    },
    /// Opaque host-runtime script, preserved through round-trips and never
    /// executed by the sandbox.
    ScriptBlock {
        text: String,
    },
    /// An import-time problem preserved in the content stream so hosts can
    /// show it in context.
    Warning {
        message: String,
    },
}

impl ContentNode {
    pub fn text(text: impl Into<String>) -> Self {
        ContentNode::Text {
            text: text.into(),
            flags: FormatFlags::plain(),
        }
    }

    /// Walks this node and its children, invoking `f` on each node.
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a ContentNode)) {
        f(self);
        match self {
            ContentNode::Blockquote { body, .. }
            | ContentNode::ListItem { body, .. }
            | ContentNode::ForEach { body, .. }
            | ContentNode::NamedHook { body, .. } => {
                for node in body {
                    node.walk(f);
                }
            }
            ContentNode::Conditional {
                then_body,
                elsif,
                else_body,
                ..
            } => {
                for node in then_body {
                    node.walk(f);
                }
                for (_, body) in elsif {
                    for node in body {
                        node.walk(f);
                    }
                }
                if let Some(body) = else_body {
                    for node in body {
                        node.walk(f);
                    }
                }
            }
            ContentNode::Choice { choice } => {
                for node in &choice.body {
                    node.walk(f);
                }
            }
            _ => {}
        }
    }

    /// Collects every passage id this node (transitively) diverts or links to.
    pub fn collect_targets<'a>(&'a self, out: &mut Vec<&'a str>) {
        self.walk(&mut |node| match node {
            ContentNode::Divert { target } => out.push(target.as_str()),
            ContentNode::Choice { choice } => {
                if let Some(target) = &choice.target {
                    out.push(target.as_str());
                }
            }
            _ => {}
        });
    }
}
