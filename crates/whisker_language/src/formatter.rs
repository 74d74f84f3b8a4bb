//! The WhiskerScript pretty-printer.
//!
//! Formatting is parse-then-print: the source is parsed to the AST and
//! printed back in canonical form. Formatting is idempotent —
//! `format(format(s)) == format(s)` — because the printer always produces
//! the same text for the same tree and the canonical form reparses to the
//! same tree.
//!
//! Sources that fail to parse with errors are returned unchanged; the
//! formatter never destroys text it does not understand.

use serde::Deserialize;

use whisker_base::{has_errors, Diagnostic, SourceFile};
use whisker_story::{Expr, LogicalOp, UnaryOp, Value};

use crate::ast::{ExprNode, Module, Node, NodeKind, PassageNode};
use crate::parser::parse;

/// Options read from `.whisker-fmt.json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FmtConfig {
    /// Emit blank lines between passages.
    pub pretty: bool,
    /// Keep `@@` metadata lines in the output.
    pub include_metadata: bool,
}

impl Default for FmtConfig {
    fn default() -> Self {
        Self {
            pretty: true,
            include_metadata: true,
        }
    }
}

/// Parses a `.whisker-fmt.json` config, reporting unknown keys as
/// warnings.
pub fn load_fmt_config(json: &str) -> (FmtConfig, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let known = ["pretty", "include_metadata"];
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(json) {
        if let Some(map) = value.as_object() {
            for key in map.keys() {
                if !known.contains(&key.as_str()) {
                    diagnostics.push(Diagnostic::warning(
                        whisker_base::DiagCode::UnknownConfigKey,
                        format!("unknown config key '{}'", key),
                    ));
                }
            }
        }
    }
    let config = serde_json::from_str::<FmtConfig>(json).unwrap_or_default();
    (config, diagnostics)
}

/// The result of one formatting run.
#[derive(Debug)]
pub struct FormatResult {
    pub text: String,
    /// `false` when the input was already canonical.
    pub changed: bool,
    pub diagnostics: Vec<Diagnostic>,
}

/// Formats WhiskerScript source into canonical form.
pub fn format_source(path: &str, source: &str, config: &FmtConfig) -> FormatResult {
    let file = SourceFile::new(path, source);
    let out = parse(&file);

    if has_errors(&out.diagnostics) {
        return FormatResult {
            text: source.to_string(),
            changed: false,
            diagnostics: out.diagnostics,
        };
    }

    let text = print_module(&out.module, config);
    FormatResult {
        changed: text != source,
        text,
        diagnostics: out.diagnostics,
    }
}

/// Prints a parsed module in canonical form. The compiler's WhiskerScript
/// exporter reuses this, so compile → export → compile is stable.
pub fn print_module(module: &Module, config: &FmtConfig) -> String {
    let mut out = String::new();

    if config.include_metadata {
        for entry in &module.metadata {
            out.push_str(&format!("@@ {}: {}\n", entry.key, entry.value));
        }
        for decl in &module.variables {
            out.push_str(&format!(
                "@@ var ${} = {}\n",
                decl.name,
                print_expr(&decl.initial.expr)
            ));
        }
        if (!module.metadata.is_empty() || !module.variables.is_empty()) && config.pretty {
            out.push('\n');
        }
    }

    for (i, passage) in module.passages.iter().enumerate() {
        if i > 0 && config.pretty {
            out.push('\n');
        }
        print_passage(passage, &mut out);
    }

    out
}

fn print_passage(passage: &PassageNode, out: &mut String) {
    out.push_str("::");
    out.push(' ');
    out.push_str(&passage.name);
    if !passage.tags.is_empty() {
        out.push_str(&format!(" [{}]", passage.tags.join(", ")));
    }
    out.push('\n');

    for entry in &passage.metadata {
        out.push_str(&format!("@@ {}: {}\n", entry.key, entry.value));
    }

    print_body(&passage.body, out);
}

fn print_body(nodes: &[Node], out: &mut String) {
    let mut line = String::new();

    for node in nodes {
        match &node.kind {
            // Inline content accumulates until the end-of-line marker.
            NodeKind::Text { text, flags } if text == "\n" && flags.is_plain() => {
                out.push_str(line.trim_end());
                out.push('\n');
                line.clear();
            }
            NodeKind::Text { flags, .. } if flags.codeblock.is_none() => {
                line.push_str(&print_inline(node));
            }
            NodeKind::Interpolation { .. } | NodeKind::NamedHook { .. } => {
                line.push_str(&print_inline(node));
            }
            NodeKind::Choice { .. } if !line.is_empty() => {
                // A wiki-link choice inside prose.
                line.push_str(&print_inline(node));
            }
            structural => {
                if !line.is_empty() {
                    out.push_str(line.trim_end());
                    out.push('\n');
                    line.clear();
                }
                print_structural(structural, node, out);
            }
        }
    }
    if !line.is_empty() {
        out.push_str(line.trim_end());
        out.push('\n');
    }
}

fn print_structural(kind: &NodeKind, node: &Node, out: &mut String) {
    match kind {
        NodeKind::HorizontalRule => out.push_str("---\n"),
        NodeKind::Blockquote { depth, body } => {
            out.push_str(&">".repeat(*depth as usize));
            out.push(' ');
            out.push_str(print_inline_seq(body).trim_end());
            out.push('\n');
        }
        NodeKind::ListItem { ordered, body } => {
            out.push_str(if *ordered { "1. " } else { "- " });
            out.push_str(print_inline_seq(body).trim_end());
            out.push('\n');
        }
        NodeKind::Assignment { var, expr } => {
            out.push_str(&format!("~ ${} = {}\n", var, print_expr(&expr.expr)));
        }
        NodeKind::Divert { target } => {
            out.push_str(&format!("-> {}\n", target));
        }
        NodeKind::Choice {
            text,
            target,
            body,
            guard,
        } => {
            print_choice(text, target.as_deref(), body, guard.as_ref(), out);
        }
        NodeKind::Conditional {
            condition,
            then_body,
            elsif,
            else_body,
        } => {
            out.push_str(&format!("{{ if {} }}\n", print_expr(&condition.expr)));
            print_body(then_body, out);
            for (cond, body) in elsif {
                out.push_str(&format!("{{ elsif {} }}\n", print_expr(&cond.expr)));
                print_body(body, out);
            }
            if let Some(body) = else_body {
                out.push_str("{ else }\n");
                print_body(body, out);
            }
            out.push_str("{ endif }\n");
        }
        NodeKind::ForEach {
            binder,
            collection,
            body,
        } => {
            out.push_str(&format!(
                "{{ for {} in {} }}\n",
                binder,
                print_expr(&collection.expr)
            ));
            print_body(body, out);
            out.push_str("{ endfor }\n");
        }
        NodeKind::ScriptBlock { text } => {
            out.push_str("```script\n");
            out.push_str(text);
            out.push_str("\n```\n");
        }
        NodeKind::Text { text, flags } if flags.codeblock.is_some() => {
            let lang = flags.codeblock.as_deref().unwrap_or("");
            out.push_str(&format!("```{}\n{}\n```\n", lang, text));
        }
        _ => {
            out.push_str(print_inline(node).trim_end());
            out.push('\n');
        }
    }
}

fn print_choice(
    text: &str,
    target: Option<&str>,
    body: &[Node],
    guard: Option<&ExprNode>,
    out: &mut String,
) {
    out.push_str(&format!("+ [{}]", text));
    match (guard, target) {
        (Some(guard), Some(target)) => {
            out.push_str(&format!(
                " {{ if {} -> {} }}\n",
                print_expr(&guard.expr),
                target
            ));
        }
        (None, Some(target)) => {
            out.push_str(&format!(" -> {}\n", target));
        }
        _ => {
            if body.is_empty() {
                out.push('\n');
            } else if is_single_line(body) {
                out.push_str(&format!(" {{ {} }}\n", print_inline_seq(body).trim()));
            } else {
                out.push_str(" {\n");
                print_body(body, out);
                out.push_str("}\n");
            }
        }
    }
}

/// True when every node is inline content without line breaks.
fn is_single_line(body: &[Node]) -> bool {
    body.iter().all(|node| match &node.kind {
        NodeKind::Text { text, .. } => !text.contains('\n'),
        NodeKind::Interpolation { .. } | NodeKind::NamedHook { .. } => true,
        _ => false,
    })
}

fn print_inline_seq(nodes: &[Node]) -> String {
    nodes.iter().map(print_inline).collect()
}

fn print_inline(node: &Node) -> String {
    match &node.kind {
        NodeKind::Text { text, flags } => {
            if text == "\n" && flags.is_plain() {
                return String::new();
            }
            let mut run = text.clone();
            if flags.code {
                run = format!("`{}`", run);
            }
            if flags.strike {
                run = format!("~~{}~~", run);
            }
            if flags.italic {
                run = format!("*{}*", run);
            }
            if flags.bold {
                run = format!("**{}**", run);
            }
            run
        }
        NodeKind::Interpolation { expr } => format!("{{{}}}", print_expr(&expr.expr)),
        NodeKind::NamedHook {
            name,
            visible,
            body,
        } => {
            let sigil = if *visible { '>' } else { ')' };
            format!("|{}{}[{}]", name, sigil, print_inline_seq(body))
        }
        NodeKind::Choice { text, target, .. } => match target {
            Some(target) if target == text => format!("[[{}]]", text),
            Some(target) => format!("[[{}|{}]]", text, target),
            None => format!("[[{}]]", text),
        },
        _ => String::new(),
    }
}

/// Precedence-aware expression printer; emits parentheses only where
/// reparsing would otherwise change the tree.
pub fn print_expr(expr: &Expr) -> String {
    print_expr_prec(expr, 0)
}

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Logical {
            op: LogicalOp::Or, ..
        } => 1,
        Expr::Logical {
            op: LogicalOp::And,
            ..
        } => 2,
        Expr::Binary { op, .. } => match op.symbol() {
            "==" | "!=" => 3,
            "<" | "<=" | ">" | ">=" => 4,
            "contains" | "in" => 5,
            "+" | "-" => 6,
            _ => 7,
        },
        Expr::Unary { .. } => 8,
        _ => 9,
    }
}

fn print_expr_prec(expr: &Expr, min: u8) -> String {
    let prec = precedence(expr);
    let text = match expr {
        Expr::Literal { value } => print_value(value),
        Expr::Variable { name } => format!("${}", name),
        Expr::Binary { op, left, right } => format!(
            "{} {} {}",
            print_expr_prec(left, prec),
            op.symbol(),
            print_expr_prec(right, prec + 1)
        ),
        Expr::Logical { op, left, right } => {
            let word = match op {
                LogicalOp::And => "and",
                LogicalOp::Or => "or",
            };
            format!(
                "{} {} {}",
                print_expr_prec(left, prec),
                word,
                print_expr_prec(right, prec + 1)
            )
        }
        Expr::Unary { op, operand } => {
            let word = match op {
                UnaryOp::Not => "not ",
                UnaryOp::Neg => "-",
            };
            format!("{}{}", word, print_expr_prec(operand, prec))
        }
        Expr::Call { name, args } => {
            let parts: Vec<String> = args.iter().map(|a| print_expr_prec(a, 0)).collect();
            format!("{}({})", name, parts.join(", "))
        }
        Expr::ArrayLiteral { items } => {
            let parts: Vec<String> = items.iter().map(|i| print_expr_prec(i, 0)).collect();
            format!("[{}]", parts.join(", "))
        }
        Expr::MapLiteral { pairs } => {
            let parts: Vec<String> = pairs
                .iter()
                .map(|(k, v)| format!("{}: {}", k, print_expr_prec(v, 0)))
                .collect();
            format!("{{ {} }}", parts.join(", "))
        }
        Expr::Raw { text } => text.clone(),
    };

    if prec < min && !matches!(expr, Expr::Literal { .. } | Expr::Variable { .. }) {
        format!("({})", text)
    } else {
        text
    }
}

fn print_value(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => {
            let s = format!("{}", f);
            if s.contains('.') {
                s
            } else {
                format!("{}.0", s)
            }
        }
        Value::Str(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(print_value).collect();
            format!("[{}]", parts.join(", "))
        }
        Value::Map(entries) => {
            let parts: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{}: {}", k, print_value(v)))
                .collect();
            format!("{{ {} }}", parts.join(", "))
        }
    }
}
