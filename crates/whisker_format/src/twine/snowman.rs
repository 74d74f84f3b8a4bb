//! Snowman passage-text parsing and serialization.
//!
//! Snowman is JavaScript-flavored: `<% … %>` code blocks, `<%= … %>`
//! interpolations, underscore-template style. Links are either wiki links
//! or anchors with a `data-passage` attribute. Code blocks are opaque host
//! script; interpolations are parsed when they fit the shared expression
//! surface and kept raw otherwise.

use whisker_base::{DiagCode, Diagnostic};
use whisker_story::{Choice, ContentNode, Expr, FormatFlags};

use super::expr::{parse_expr, print_expr};

/// Parses Snowman passage text into content nodes.
pub fn parse_content(text: &str, diagnostics: &mut Vec<Diagnostic>) -> Vec<ContentNode> {
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

    while i < text.len() {
        let rest = &text[i..];

        if rest.starts_with("<%=") {
            if let Some(rel) = rest.find("%>") {
                flush!();
                let inner = rest[3..rel].trim();
                // `s.name` is the conventional state access.
                let normalized = inner
                    .strip_prefix("s.")
                    .or_else(|| inner.strip_prefix("window.story.state."))
                    .unwrap_or(inner);
                let expr = match parse_expr(normalized) {
                    Some(expr) => expr,
                    None => {
                        diagnostics.push(Diagnostic::warning(
                            DiagCode::RawExpression,
                            format!("interpolation '{}' kept as opaque text", inner),
                        ));
                        Expr::Raw {
                            text: inner.to_string(),
                        }
                    }
                };
                nodes.push(ContentNode::Interpolation { expr });
                i += rel + 2;
                continue;
            }
        }
        if rest.starts_with("<%") {
            if let Some(rel) = rest.find("%>") {
                flush!();
                nodes.push(ContentNode::ScriptBlock {
                    text: rest[2..rel].trim().to_string(),
                });
                i += rel + 2;
                continue;
            }
        }
        if rest.starts_with("<a ") {
            if let Some(node) = parse_anchor(rest).map(|(node, consumed)| {
                i += consumed;
                node
            }) {
                flush!();
                nodes.push(node);
                continue;
            }
        }
        if rest.starts_with("[[") {
            if let Some(rel) = rest.find("]]") {
                flush!();
                let inner = &rest[2..rel];
                let (text_part, target) = if let Some((t, d)) = inner.split_once("->") {
                    (t.trim(), d.trim())
                } else if let Some((t, d)) = inner.split_once('|') {
                    (t.trim(), d.trim())
                } else {
                    (inner.trim(), inner.trim())
                };
                nodes.push(ContentNode::Choice {
                    choice: Choice::to_target(text_part, target),
                });
                i += rel + 2;
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

/// `<a data-passage="Target">text</a>`; returns the node and bytes consumed.
fn parse_anchor(rest: &str) -> Option<(ContentNode, usize)> {
    let open_end = rest.find('>')?;
    let attrs = &rest[3..open_end];
    let passage_idx = attrs.find("data-passage")?;
    let after = &attrs[passage_idx + "data-passage".len()..];
    let quote_start = after.find(['"', '\''])?;
    let quote = after.as_bytes()[quote_start] as char;
    let value_rest = &after[quote_start + 1..];
    let quote_end = value_rest.find(quote)?;
    let target = &value_rest[..quote_end];

    let close = rest.find("</a>")?;
    let text = &rest[open_end + 1..close];

    Some((
        ContentNode::Choice {
            choice: Choice::to_target(text.trim(), target),
        },
        close + 4,
    ))
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

/// Writes content nodes as Snowman passage text.
pub fn write_content(nodes: &[ContentNode], diagnostics: &mut Vec<Diagnostic>) -> String {
    let mut out = String::new();
    for node in nodes {
        write_node(node, &mut out, diagnostics);
    }
    out
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
        ContentNode::HorizontalRule => out.push_str("---\n"),
        ContentNode::Interpolation { expr } | ContentNode::Print { expr } => {
            out.push_str(&format!("<%= {} %>", print_js_expr(expr)));
        }
        ContentNode::Assignment { var, expr } => {
            out.push_str(&format!("<% s.{} = {} %>", var, print_js_expr(expr)));
        }
        ContentNode::Conditional {
            condition,
            then_body,
            elsif,
            else_body,
        } => {
            out.push_str(&format!("<% if ({}) {{ %>", print_js_expr(condition)));
            for child in then_body {
                write_node(child, out, diagnostics);
            }
            for (cond, body) in elsif {
                out.push_str(&format!("<% }} else if ({}) {{ %>", print_js_expr(cond)));
                for child in body {
                    write_node(child, out, diagnostics);
                }
            }
            if let Some(body) = else_body {
                out.push_str("<% } else { %>");
                for child in body {
                    write_node(child, out, diagnostics);
                }
            }
            out.push_str("<% } %>");
        }
        ContentNode::ForEach {
            binder,
            collection,
            body,
        } => {
            out.push_str(&format!(
                "<% {}.forEach(function({}) {{ %>",
                print_js_expr(collection),
                binder
            ));
            for child in body {
                write_node(child, out, diagnostics);
            }
            out.push_str("<% }) %>");
        }
        ContentNode::Choice { choice } => {
            if choice.condition.is_some() || choice.action.is_some() {
                diagnostics.push(Diagnostic::warning(
                    DiagCode::LossyExport,
                    format!("choice '{}' lost its guard or action", choice.text),
                ));
            }
            match &choice.target {
                Some(target) => out.push_str(&format!(
                    "<a data-passage=\"{}\">{}</a>",
                    target, choice.text
                )),
                None => out.push_str(&format!("[[{}]]", choice.text)),
            }
        }
        ContentNode::Divert { target } => {
            out.push_str(&format!(
                "<% window.story.show(\"{}\") %>",
                target
            ));
        }
        ContentNode::NamedHook { name, body, .. } => {
            out.push_str(&format!("<span id=\"{}\">", name));
            for child in body {
                write_node(child, out, diagnostics);
            }
            out.push_str("</span>");
        }
        ContentNode::ScriptBlock { text } => {
            out.push_str(&format!("<% {} %>", text));
        }
        ContentNode::Warning { message } => {
            diagnostics.push(Diagnostic::warning(
                DiagCode::LossyExport,
                format!("import warning dropped on export: {}", message),
            ));
        }
    }
}

/// JS-flavored expression printing (`s.` state prefix on variables).
fn print_js_expr(expr: &Expr) -> String {
    match expr {
        Expr::Variable { name } => format!("s.{}", name),
        other => print_expr(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_blocks_are_opaque_scripts() {
        let mut diags = Vec::new();
        let nodes = parse_content("<% s.visited = true %>rest", &mut diags);
        assert!(matches!(
            &nodes[0],
            ContentNode::ScriptBlock { text } if text.contains("s.visited")
        ));
        assert!(matches!(&nodes[1], ContentNode::Text { text, .. } if text == "rest"));
    }

    #[test]
    fn interpolation_parses_state_access() {
        let mut diags = Vec::new();
        let nodes = parse_content("HP: <%= s.hp %>", &mut diags);
        assert!(diags.is_empty(), "{:?}", diags);
        assert!(matches!(
            &nodes[1],
            ContentNode::Interpolation { expr } if *expr == Expr::variable("hp")
        ));
    }

    #[test]
    fn complex_interpolation_stays_raw() {
        let mut diags = Vec::new();
        let nodes = parse_content("<%= s.items.map(i => i.name) %>", &mut diags);
        assert!(matches!(
            &nodes[0],
            ContentNode::Interpolation { expr } if matches!(expr, Expr::Raw { .. })
        ));
        assert!(diags.iter().any(|d| d.code == DiagCode::RawExpression));
    }

    #[test]
    fn anchors_with_data_passage_become_choices() {
        let mut diags = Vec::new();
        let nodes = parse_content("<a data-passage=\"Hall\">the door</a>", &mut diags);
        assert!(matches!(
            &nodes[0],
            ContentNode::Choice { choice }
                if choice.text == "the door" && choice.target.as_deref() == Some("Hall")
        ));
    }

    #[test]
    fn wiki_links_also_work() {
        let mut diags = Vec::new();
        let nodes = parse_content("[[onward|Camp]]", &mut diags);
        assert!(matches!(
            &nodes[0],
            ContentNode::Choice { choice } if choice.target.as_deref() == Some("Camp")
        ));
    }

    #[test]
    fn write_emits_anchor_links() {
        let mut diags = Vec::new();
        let nodes = vec![ContentNode::Choice {
            choice: Choice::to_target("go", "End"),
        }];
        let written = write_content(&nodes, &mut diags);
        assert_eq!(written, "<a data-passage=\"End\">go</a>");
    }

    #[test]
    fn write_then_parse_keeps_interpolations() {
        let mut diags = Vec::new();
        let original = parse_content("Gold: <%= s.gold %> coins", &mut diags);
        let written = write_content(&original, &mut diags);
        let reparsed = parse_content(&written, &mut diags);
        assert_eq!(original, reparsed, "written: {}", written);
    }
}
