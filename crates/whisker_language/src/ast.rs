//! The spanned WhiskerScript AST.
//!
//! The parser produces this tree; the code generator lowers it into the
//! Story IR, recording each node's span in the source map as it goes. The
//! expression shapes reuse [`whisker_story::Expr`] directly — the AST only
//! adds the span wrapper — so semantic analysis and lowering share one
//! expression model.

use whisker_base::SourceSpan;
use whisker_story::{Expr, FormatFlags};

/// A whole parsed source file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    /// `@@ key: value` lines seen before the first passage header.
    pub metadata: Vec<MetadataEntry>,
    /// `@@ var $name = expr` declarations.
    pub variables: Vec<VarDecl>,
    pub passages: Vec<PassageNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: String,
    pub initial: ExprNode,
    pub span: SourceSpan,
}

/// One `:: Name [tags]` block and its body.
#[derive(Debug, Clone, PartialEq)]
pub struct PassageNode {
    pub name: String,
    pub tags: Vec<String>,
    /// Span of the header line.
    pub span: SourceSpan,
    /// `@@ key: value` lines inside the passage.
    pub metadata: Vec<MetadataEntry>,
    pub body: Vec<Node>,
}

/// An expression with the span it was parsed from.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprNode {
    pub expr: Expr,
    pub span: SourceSpan,
}

impl ExprNode {
    pub fn new(expr: Expr, span: SourceSpan) -> Self {
        Self { expr, span }
    }
}

/// A spanned content node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub span: SourceSpan,
}

impl Node {
    pub fn new(kind: NodeKind, span: SourceSpan) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Text {
        text: String,
        flags: FormatFlags,
    },
    Blockquote {
        depth: u8,
        body: Vec<Node>,
    },
    ListItem {
        ordered: bool,
        body: Vec<Node>,
    },
    HorizontalRule,
    Interpolation {
        expr: ExprNode,
    },
    Conditional {
        condition: ExprNode,
        then_body: Vec<Node>,
        elsif: Vec<(ExprNode, Vec<Node>)>,
        else_body: Option<Vec<Node>>,
    },
    ForEach {
        binder: String,
        collection: ExprNode,
        body: Vec<Node>,
    },
    Assignment {
        var: String,
        expr: ExprNode,
    },
    Choice {
        text: String,
        target: Option<String>,
        body: Vec<Node>,
        guard: Option<ExprNode>,
    },
    Divert {
        target: String,
    },
    NamedHook {
        name: String,
        visible: bool,
        body: Vec<Node>,
    },
    ScriptBlock {
        text: String,
    },
}

impl Node {
    /// Walks this node and its children.
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a Node)) {
        f(self);
        match &self.kind {
            NodeKind::Blockquote { body, .. }
            | NodeKind::ListItem { body, .. }
            | NodeKind::ForEach { body, .. }
            | NodeKind::NamedHook { body, .. }
            | NodeKind::Choice { body, .. } => {
                for node in body {
                    node.walk(f);
                }
            }
            NodeKind::Conditional {
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
            _ => {}
        }
    }

    /// Every expression directly attached to this node (not children).
    pub fn exprs(&self) -> Vec<&ExprNode> {
        match &self.kind {
            NodeKind::Interpolation { expr } => vec![expr],
            NodeKind::Assignment { expr, .. } => vec![expr],
            NodeKind::ForEach { collection, .. } => vec![collection],
            NodeKind::Conditional {
                condition, elsif, ..
            } => {
                let mut out = vec![condition];
                out.extend(elsif.iter().map(|(cond, _)| cond));
                out
            }
            NodeKind::Choice { guard, .. } => guard.iter().collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use whisker_story::Value;

    fn span() -> SourceSpan {
        SourceSpan::default()
    }

    #[test]
    fn walk_descends_into_conditionals() {
        let node = Node::new(
            NodeKind::Conditional {
                condition: ExprNode::new(Expr::literal(Value::Bool(true)), span()),
                then_body: vec![Node::new(
                    NodeKind::Text {
                        text: "a".into(),
                        flags: FormatFlags::plain(),
                    },
                    span(),
                )],
                elsif: vec![(
                    ExprNode::new(Expr::literal(Value::Bool(false)), span()),
                    vec![Node::new(NodeKind::HorizontalRule, span())],
                )],
                else_body: None,
            },
            span(),
        );
        let mut n = 0;
        node.walk(&mut |_| n += 1);
        assert_eq!(n, 3);
    }

    #[test]
    fn exprs_exposes_all_conditional_arms() {
        let node = Node::new(
            NodeKind::Conditional {
                condition: ExprNode::new(Expr::variable("a"), span()),
                then_body: vec![],
                elsif: vec![(ExprNode::new(Expr::variable("b"), span()), vec![])],
                else_body: None,
            },
            span(),
        );
        assert_eq!(node.exprs().len(), 2);
    }
}
