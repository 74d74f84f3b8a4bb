//! Chapbook passage-text parsing and serialization.
//!
//! Chapbook passages are line-oriented: an optional vars section
//! (`name: value` lines closed by `--`), then prose with `{expr}`
//! interpolation, `[[...]]` links, and bracketed modifiers (`[if cond]`,
//! `[continue]`, `[after 2s]`, `[align center]`, `[note]`) that apply to the
//! text block that follows them.

use whisker_base::{DiagCode, Diagnostic};
use whisker_story::{Choice, ContentNode, Expr, FormatFlags};

use super::expr::{parse_expr, print_expr};

/// Parses Chapbook passage text into content nodes.
pub fn parse_content(text: &str, diagnostics: &mut Vec<Diagnostic>) -> Vec<ContentNode> {
    let mut nodes = Vec::new();
    let mut lines = text.lines().peekable();

    // Vars section: `name: value` lines terminated by `--`.
    let has_vars_section = text.lines().any(|l| l.trim() == "--");
    if has_vars_section {
        for line in lines.by_ref() {
            let trimmed = line.trim();
            if trimmed == "--" {
                break;
            }
            if trimmed.is_empty() {
                continue;
            }
            let Some((name, value)) = trimmed.split_once(':') else {
                diagnostics.push(Diagnostic::warning(
                    DiagCode::MalformedInput,
                    format!("vars line '{}' has no ':'", trimmed),
                ));
                continue;
            };
            let expr = match parse_expr(value.trim()) {
                Some(expr) => expr,
                None => {
                    diagnostics.push(Diagnostic::warning(
                        DiagCode::RawExpression,
                        format!("vars value '{}' kept as opaque text", value.trim()),
                    ));
                    Expr::Raw {
                        text: value.trim().to_string(),
                    }
                }
            };
            nodes.push(ContentNode::Assignment {
                var: name.trim().to_string(),
                expr,
            });
        }
    }

    // Prose with modifiers. An `[if]` modifier captures following lines
    // until `[continue]`, the next modifier, or end of passage.
    let mut pending_condition: Option<Expr> = None;
    let mut conditional_body: Vec<ContentNode> = Vec::new();

    macro_rules! close_conditional {
        () => {
            if let Some(condition) = pending_condition.take() {
                nodes.push(ContentNode::Conditional {
                    condition,
                    then_body: std::mem::take(&mut conditional_body),
                    elsif: Vec::new(),
                    else_body: None,
                });
            }
        };
    }

    for line in lines {
        let trimmed = line.trim();

        if let Some(modifier) = parse_modifier(trimmed) {
            match modifier {
                Modifier::If(cond_text) => {
                    close_conditional!();
                    let condition = match parse_expr(&cond_text) {
                        Some(expr) => expr,
                        None => {
                            diagnostics.push(Diagnostic::warning(
                                DiagCode::RawExpression,
                                format!("condition '{}' kept as opaque text", cond_text),
                            ));
                            Expr::Raw { text: cond_text }
                        }
                    };
                    pending_condition = Some(condition);
                }
                Modifier::Continue => close_conditional!(),
                Modifier::Other(name) => {
                    close_conditional!();
                    diagnostics.push(Diagnostic::warning(
                        DiagCode::UnsupportedConstruct,
                        format!("Chapbook modifier '[{}]' has no Whisker equivalent", name),
                    ));
                    nodes.push(ContentNode::Warning {
                        message: format!("unsupported Chapbook modifier '[{}]'", name),
                    });
                }
            }
            continue;
        }

        let mut line_nodes = parse_prose_line(line);
        line_nodes.push(ContentNode::Text {
            text: "\n".to_string(),
            flags: FormatFlags::default(),
        });
        if pending_condition.is_some() {
            conditional_body.append(&mut line_nodes);
        } else {
            nodes.append(&mut line_nodes);
        }
    }
    close_conditional!();

    nodes
}

enum Modifier {
    If(String),
    Continue,
    Other(String),
}

/// A modifier is a line that is exactly `[…]` (and not a `[[link]]`).
fn parse_modifier(trimmed: &str) -> Option<Modifier> {
    if !trimmed.starts_with('[') || trimmed.starts_with("[[") || !trimmed.ends_with(']') {
        return None;
    }
    let inner = &trimmed[1..trimmed.len() - 1];
    if let Some(cond) = inner.strip_prefix("if ") {
        return Some(Modifier::If(cond.trim().to_string()));
    }
    if inner.trim() == "continue" || inner.trim() == "cont" {
        return Some(Modifier::Continue);
    }
    Some(Modifier::Other(inner.trim().to_string()))
}

/// Prose: text, `{expr}` interpolations, `[[...]]` links.
fn parse_prose_line(line: &str) -> Vec<ContentNode> {
    let mut nodes = Vec::new();
    let mut buf = String::new();
    let mut i = 0;

    macro_rules! flush {
        () => {
            if !buf.is_empty() {
                nodes.push(ContentNode::Text {
                    text: std::mem::take(&mut buf),
                    flags: FormatFlags::default(),
                });
            }
        };
    }

    while i < line.len() {
        let rest = &line[i..];
        if rest.starts_with("[[") {
            if let Some(rel) = rest.find("]]") {
                flush!();
                let inner = &rest[2..rel];
                let (text, target) = if let Some((t, d)) = inner.split_once("->") {
                    (t.trim(), d.trim())
                } else if let Some((t, d)) = inner.split_once('|') {
                    (t.trim(), d.trim())
                } else {
                    (inner.trim(), inner.trim())
                };
                nodes.push(ContentNode::Choice {
                    choice: Choice::to_target(text, target),
                });
                i += rel + 2;
                continue;
            }
        }
        if rest.starts_with('{') {
            if let Some(rel) = rest.find('}') {
                flush!();
                let inner = rest[1..rel].trim();
                let expr = parse_expr(inner).unwrap_or(Expr::Raw {
                    text: inner.to_string(),
                });
                nodes.push(ContentNode::Interpolation { expr });
                i += rel + 1;
                continue;
            }
        }
        let ch = rest.chars().next().unwrap_or_default();
        buf.push(ch);
        i += ch.len_utf8();
    }
    flush!();
    nodes
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

/// Writes content nodes as Chapbook passage text. Leading assignments go
/// into the vars section.
pub fn write_content(nodes: &[ContentNode], diagnostics: &mut Vec<Diagnostic>) -> String {
    let mut vars = String::new();
    let mut body = String::new();

    // Leading assignments belong in the vars section.
    let mut prose_started = false;
    for node in nodes {
        match node {
            ContentNode::Assignment { var, expr } if !prose_started => {
                vars.push_str(&format!("{}: {}\n", var, print_expr(expr)));
            }
            other => {
                prose_started = true;
                write_node(other, &mut body, diagnostics);
            }
        }
    }

    if vars.is_empty() {
        body
    } else {
        format!("{}--\n{}", vars, body)
    }
}

fn write_node(node: &ContentNode, out: &mut String, diagnostics: &mut Vec<Diagnostic>) {
    match node {
        ContentNode::Text { text, .. } => out.push_str(text),
        ContentNode::Blockquote { body, .. } | ContentNode::ListItem { body, .. } => {
            for child in body {
                write_node(child, out, diagnostics);
            }
            out.push('\n');
        }
        ContentNode::HorizontalRule => out.push_str("***\n"),
        ContentNode::Interpolation { expr } | ContentNode::Print { expr } => {
            out.push_str(&format!("{{{}}}", print_expr(expr)));
        }
        ContentNode::Assignment { var, expr } => {
            // Mid-passage assignment; Chapbook only evaluates vars up top.
            diagnostics.push(Diagnostic::warning(
                DiagCode::LossyExport,
                format!("assignment to '{}' moved into an interpolation", var),
            ));
            out.push_str(&format!("{{{} = {}}}", var, print_expr(expr)));
        }
        ContentNode::Conditional {
            condition,
            then_body,
            elsif,
            else_body,
        } => {
            out.push_str(&format!("[if {}]\n", print_expr(condition)));
            for child in then_body {
                write_node(child, out, diagnostics);
            }
            if !elsif.is_empty() || else_body.is_some() {
                diagnostics.push(Diagnostic::warning(
                    DiagCode::LossyExport,
                    "Chapbook has no else-if chain; extra arms were flattened".to_string(),
                ));
                for (cond, child_body) in elsif {
                    out.push_str(&format!("[if {}]\n", print_expr(cond)));
                    for child in child_body {
                        write_node(child, out, diagnostics);
                    }
                }
                if let Some(child_body) = else_body {
                    out.push_str(&format!("[if not ({})]\n", print_expr(condition)));
                    for child in child_body {
                        write_node(child, out, diagnostics);
                    }
                }
            }
            out.push_str("[continue]\n");
        }
        ContentNode::ForEach { body, .. } => {
            diagnostics.push(Diagnostic::warning(
                DiagCode::LossyExport,
                "Chapbook cannot loop; the loop body was emitted once".to_string(),
            ));
            for child in body {
                write_node(child, out, diagnostics);
            }
        }
        ContentNode::Choice { choice } => {
            if choice.condition.is_some() || !choice.body.is_empty() {
                diagnostics.push(Diagnostic::warning(
                    DiagCode::LossyExport,
                    format!("choice '{}' lost its guard or body", choice.text),
                ));
            }
            match &choice.target {
                Some(target) if *target == choice.text => {
                    out.push_str(&format!("[[{}]]", choice.text));
                }
                Some(target) => {
                    out.push_str(&format!("[[{}->{}]]", choice.text, target));
                }
                None => out.push_str(&format!("[[{}]]", choice.text)),
            }
        }
        ContentNode::Divert { target } => {
            out.push_str(&format!("[[{}]]", target));
        }
        ContentNode::NamedHook { body, .. } => {
            for child in body {
                write_node(child, out, diagnostics);
            }
        }
        ContentNode::ScriptBlock { text } => {
            out.push_str(&format!("[JavaScript]\n{}\n[continue]\n", text));
        }
        ContentNode::Warning { message } => {
            diagnostics.push(Diagnostic::warning(
                DiagCode::LossyExport,
                format!("import warning dropped on export: {}", message),
            ));
        }
    }
}
