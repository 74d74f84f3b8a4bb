//! Lowering from the spanned AST to the Story IR.
//!
//! The generator walks the annotated AST passage by passage, translating
//! each node into its IR counterpart and recording the node's source span
//! in the source map. Passages shadowed by an earlier duplicate are skipped
//! (first definition wins — the analyzer already warned).

use whisker_base::{DiagCode, Diagnostic, SourceLocation};
use whisker_language::analysis::Analysis;
use whisker_language::ast::{Module, Node, NodeKind};
use whisker_story::{
    Choice, ContentNode, Expr, Passage, Story, UnaryOp, Value, VariableDecl,
};

use crate::sourcemap::SourceMapBuilder;

/// Lowers a module to a [`Story`], optionally recording source mappings.
pub fn lower(
    path: &str,
    module: &Module,
    analysis: &Analysis,
    mut map: Option<&mut SourceMapBuilder>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Story {
    let mut story = Story::default();

    for entry in &module.metadata {
        if entry.key == "start" {
            continue; // resolved by the analyzer
        }
        story.set_metadata(&entry.key, entry.value.clone());
    }

    for decl in &module.variables {
        let initial = match const_value(&decl.initial.expr) {
            Some(value) => value,
            None => {
                diagnostics.push(
                    Diagnostic::warning(
                        DiagCode::ExpectedExpression,
                        format!(
                            "initial value of '${}' is not a constant; it starts as nil",
                            decl.name
                        ),
                    )
                    .with_location(SourceLocation::new(path, decl.span)),
                );
                Value::Nil
            }
        };
        story.variables.push(VariableDecl {
            name: decl.name.clone(),
            initial,
        });
    }

    let mut passage_ordinal = 0u32;
    for (idx, passage_node) in module.passages.iter().enumerate() {
        if analysis.duplicates.contains(&idx) {
            continue;
        }

        let mut passage = Passage::new(passage_node.name.clone());
        passage.tags = passage_node.tags.clone();
        for entry in &passage_node.metadata {
            passage
                .metadata
                .insert(entry.key.clone(), entry.value.clone());
        }

        if let Some(map) = map.as_deref_mut() {
            map.add_mapping(
                passage_ordinal,
                0,
                passage_node.span.start.line.saturating_sub(1),
                passage_node.span.start.column.saturating_sub(1),
            );
        }

        let mut node_ordinal = 1u32;
        passage.content = lower_body(
            &passage_node.body,
            passage_ordinal,
            &mut node_ordinal,
            &mut map,
        );

        if let Err(diag) = story.add_passage(passage) {
            diagnostics.push(diag.with_location(SourceLocation::new(path, passage_node.span)));
        }
        passage_ordinal += 1;
    }

    story.start_passage = analysis.start.clone();
    story
}

fn lower_body(
    nodes: &[Node],
    passage_ordinal: u32,
    node_ordinal: &mut u32,
    map: &mut Option<&mut SourceMapBuilder>,
) -> Vec<ContentNode> {
    let mut out = Vec::new();
    for node in nodes {
        if let Some(map) = map.as_deref_mut() {
            map.add_mapping(
                passage_ordinal,
                *node_ordinal,
                node.span.start.line.saturating_sub(1),
                node.span.start.column.saturating_sub(1),
            );
        }
        *node_ordinal += 1;
        out.push(lower_node(node, passage_ordinal, node_ordinal, map));
    }
    out
}

fn lower_node(
    node: &Node,
    passage_ordinal: u32,
    node_ordinal: &mut u32,
    map: &mut Option<&mut SourceMapBuilder>,
) -> ContentNode {
    match &node.kind {
        NodeKind::Text { text, flags } => ContentNode::Text {
            text: text.clone(),
            flags: flags.clone(),
        },
        NodeKind::Blockquote { depth, body } => ContentNode::Blockquote {
            depth: *depth,
            body: lower_body(body, passage_ordinal, node_ordinal, map),
        },
        NodeKind::ListItem { ordered, body } => ContentNode::ListItem {
            ordered: *ordered,
            body: lower_body(body, passage_ordinal, node_ordinal, map),
        },
        NodeKind::HorizontalRule => ContentNode::HorizontalRule,
        NodeKind::Interpolation { expr } => ContentNode::Interpolation {
            expr: expr.expr.clone(),
        },
        NodeKind::Conditional {
            condition,
            then_body,
            elsif,
            else_body,
        } => ContentNode::Conditional {
            condition: condition.expr.clone(),
            then_body: lower_body(then_body, passage_ordinal, node_ordinal, map),
            elsif: elsif
                .iter()
                .map(|(cond, body)| {
                    (
                        cond.expr.clone(),
                        lower_body(body, passage_ordinal, node_ordinal, map),
                    )
                })
                .collect(),
            else_body: else_body
                .as_ref()
                .map(|body| lower_body(body, passage_ordinal, node_ordinal, map)),
        },
        NodeKind::ForEach {
            binder,
            collection,
            body,
        } => ContentNode::ForEach {
            binder: binder.clone(),
            collection: collection.expr.clone(),
            body: lower_body(body, passage_ordinal, node_ordinal, map),
        },
        NodeKind::Assignment { var, expr } => ContentNode::Assignment {
            var: var.clone(),
            expr: expr.expr.clone(),
        },
        NodeKind::Choice {
            text,
            target,
            body,
            guard,
        } => ContentNode::Choice {
            choice: Choice {
                text: text.clone(),
                target: target.clone(),
                body: lower_body(body, passage_ordinal, node_ordinal, map),
                condition: guard.as_ref().map(|g| g.expr.clone()),
                action: None,
                metadata: Default::default(),
            },
        },
        NodeKind::Divert { target } => ContentNode::Divert {
            target: target.clone(),
        },
        NodeKind::NamedHook {
            name,
            visible,
            body,
        } => ContentNode::NamedHook {
            name: name.clone(),
            visible: *visible,
            body: lower_body(body, passage_ordinal, node_ordinal, map),
        },
        NodeKind::ScriptBlock { text } => ContentNode::ScriptBlock { text: text.clone() },
    }
}

/// Evaluates a constant initializer without touching the runtime: literals,
/// negated numbers, and array/map literals of constants.
pub fn const_value(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Literal { value } => Some(value.clone()),
        Expr::Unary {
            op: UnaryOp::Neg,
            operand,
        } => match const_value(operand)? {
            Value::Int(n) => Some(Value::Int(-n)),
            Value::Float(f) => Some(Value::Float(-f)),
            _ => None,
        },
        Expr::ArrayLiteral { items } => {
            let values: Option<Vec<Value>> = items.iter().map(const_value).collect();
            values.map(Value::Array)
        }
        Expr::MapLiteral { pairs } => {
            let mut map = indexmap::IndexMap::new();
            for (key, value) in pairs {
                map.insert(key.clone(), const_value(value)?);
            }
            Some(Value::Map(map))
        }
        _ => None,
    }
}
