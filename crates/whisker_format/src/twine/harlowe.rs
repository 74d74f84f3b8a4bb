//! Harlowe passage-text parsing and serialization.
//!
//! Harlowe is macro-based: `(set: $v to 2)`, `(if: cond)[hook]`, chained
//! `(else-if:)` / `(else:)` arms, link macros, and `|name>[…]` named hooks.
//! The parser walks the passage text once, turning known macros into IR
//! nodes and unknown ones into [`ContentNode::Warning`] entries with their
//! hook content preserved.

use whisker_base::{DiagCode, Diagnostic};
use whisker_story::{Choice, ContentNode, Expr, FormatFlags, UnaryOp};

use super::expr::{parse_expr, print_expr};
use super::{find_balanced, split_top_level, unquote};

/// Parses Harlowe passage text into content nodes.
pub fn parse_content(text: &str, diagnostics: &mut Vec<Diagnostic>) -> Vec<ContentNode> {
    let mut parser = HarloweParser {
        text,
        i: 0,
        diagnostics,
    };
    parser.parse_nodes()
}

struct HarloweParser<'a, 'd> {
    text: &'a str,
    i: usize,
    diagnostics: &'d mut Vec<Diagnostic>,
}

/// A scanned `(name: args)` macro; the cursor advances past its `)`.
struct Macro {
    name: String,
    args: String,
}

impl<'a, 'd> HarloweParser<'a, 'd> {
    fn rest(&self) -> &'a str {
        &self.text[self.i..]
    }

    fn parse_nodes(&mut self) -> Vec<ContentNode> {
        let mut nodes = Vec::new();
        let mut buf = String::new();
        let mut flags = FormatFlags::default();

        macro_rules! flush {
            () => {
                if !buf.is_empty() {
                    nodes.push(ContentNode::Text {
                        text: std::mem::take(&mut buf),
                        flags: flags.clone(),
                    });
                }
            };
        }

        while self.i < self.text.len() {
            let rest = self.rest();

            if rest.starts_with('(') {
                if let Some(mac) = self.scan_macro() {
                    flush!();
                    let node = self.dispatch_macro(mac);
                    nodes.extend(node);
                    continue;
                }
            }
            if rest.starts_with("[[") {
                flush!();
                nodes.push(self.parse_link());
                continue;
            }
            if let Some((name, visible, after)) = scan_hook_open(rest) {
                flush!();
                let body_open = self.i + after - 1;
                if let Some(close) = find_balanced(self.text, '[', ']', body_open) {
                    let body_text = &self.text[body_open + 1..close];
                    let body = parse_content(body_text, self.diagnostics);
                    nodes.push(ContentNode::NamedHook {
                        name,
                        visible,
                        body,
                    });
                    self.i = close + 1;
                    continue;
                }
            }
            if rest.starts_with("<script") {
                flush!();
                if let Some(node) = self.parse_script_element() {
                    nodes.push(node);
                    continue;
                }
            }
            if rest.starts_with("''") {
                flush!();
                flags.bold = !flags.bold;
                self.i += 2;
                continue;
            }
            if rest.starts_with("//") {
                flush!();
                flags.italic = !flags.italic;
                self.i += 2;
                continue;
            }
            if rest.starts_with("~~") {
                flush!();
                flags.strike = !flags.strike;
                self.i += 2;
                continue;
            }
            if rest.starts_with('$') {
                // Inline variable interpolation.
                let name: String = rest[1..]
                    .chars()
                    .take_while(|c| c.is_alphanumeric() || *c == '_')
                    .collect();
                if !name.is_empty() {
                    flush!();
                    self.i += 1 + name.len();
                    nodes.push(ContentNode::Interpolation {
                        expr: Expr::variable(name),
                    });
                    continue;
                }
            }

            let ch = rest.chars().next().unwrap_or_default();
            buf.push(ch);
            self.i += ch.len_utf8();
        }
        flush!();
        nodes
    }

    /// Scans `(name: args)` at the cursor without consuming on failure.
    fn scan_macro(&mut self) -> Option<Macro> {
        let rest = self.rest();
        let name_len = rest[1..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .count();
        if name_len == 0 || !rest[1 + name_len..].starts_with(':') {
            return None;
        }
        let close = find_balanced(self.text, '(', ')', self.i)?;
        let name = rest[1..1 + name_len].to_ascii_lowercase();
        let args = self.text[self.i + 1 + name_len + 1..close].trim().to_string();
        self.i = close + 1;
        Some(Macro { name, args })
    }

    /// Parses the `[hook]` attached to a macro, if present.
    fn attached_hook(&mut self) -> Option<Vec<ContentNode>> {
        if !self.rest().starts_with('[') {
            return None;
        }
        let close = find_balanced(self.text, '[', ']', self.i)?;
        let body_text = &self.text[self.i + 1..close];
        self.i = close + 1;
        Some(parse_content(body_text, self.diagnostics))
    }

    fn dispatch_macro(&mut self, mac: Macro) -> Vec<ContentNode> {
        match mac.name.as_str() {
            "set" => self.parse_set(&mac.args),
            "put" => self.parse_put(&mac.args),
            "if" | "unless" => {
                let negate = mac.name == "unless";
                vec![self.parse_if_chain(&mac.args, negate)]
            }
            "else-if" | "elseif" | "else" => {
                // A chain arm with no preceding (if:).
                self.attached_hook();
                self.warn_unsupported(&mac.name);
                vec![ContentNode::Warning {
                    message: format!("orphaned Harlowe macro '({}: …)'", mac.name),
                }]
            }
            "link" | "link-reveal" | "link-repeat" => {
                let text = unquote(&mac.args);
                let body = self.attached_hook().unwrap_or_default();
                vec![ContentNode::Choice {
                    choice: Choice {
                        text,
                        target: None,
                        body,
                        condition: None,
                        action: None,
                        metadata: Default::default(),
                    },
                }]
            }
            "link-goto" => {
                let parts = split_top_level(&mac.args);
                let text = unquote(parts.first().copied().unwrap_or_default());
                let target = parts.get(1).map(|p| unquote(p)).unwrap_or_else(|| text.clone());
                vec![ContentNode::Choice {
                    choice: Choice::to_target(text, target),
                }]
            }
            "goto" | "go-to" => vec![ContentNode::Divert {
                target: unquote(&mac.args),
            }],
            "print" => vec![ContentNode::Print {
                expr: self.expr_or_raw_reporting(&mac.args),
            }],
            other => {
                let body = self.attached_hook();
                self.warn_unsupported(other);
                let mut nodes = vec![ContentNode::Warning {
                    message: format!("unsupported Harlowe macro '({}: …)'", other),
                }];
                if let Some(body) = body {
                    nodes.extend(body);
                }
                nodes
            }
        }
    }

    /// `(set: $a to 1, $b to 2)`
    fn parse_set(&mut self, args: &str) -> Vec<ContentNode> {
        let mut nodes = Vec::new();
        for clause in split_top_level(args) {
            let Some((var_part, expr_part)) = split_keyword(clause, " to ") else {
                self.warn_malformed("set", clause);
                continue;
            };
            let Some(var) = variable_name(var_part) else {
                self.warn_malformed("set", clause);
                continue;
            };
            nodes.push(ContentNode::Assignment {
                var,
                expr: self.expr_or_raw_reporting(expr_part),
            });
        }
        nodes
    }

    /// `(put: expr into $v)`
    fn parse_put(&mut self, args: &str) -> Vec<ContentNode> {
        let Some((expr_part, var_part)) = split_keyword(args, " into ") else {
            self.warn_malformed("put", args);
            return Vec::new();
        };
        let Some(var) = variable_name(var_part) else {
            self.warn_malformed("put", args);
            return Vec::new();
        };
        vec![ContentNode::Assignment {
            var,
            expr: self.expr_or_raw_reporting(expr_part),
        }]
    }

    /// `(if: c)[…]` with trailing `(else-if: c)[…]` and `(else:)[…]` arms.
    fn parse_if_chain(&mut self, cond_text: &str, negate: bool) -> ContentNode {
        let mut condition = self.expr_or_raw_reporting(cond_text);
        if negate {
            condition = Expr::unary(UnaryOp::Not, condition);
        }
        let then_body = self.attached_hook().unwrap_or_default();

        let mut elsif = Vec::new();
        let mut else_body = None;

        loop {
            let checkpoint = self.i;
            // Arms may be separated by whitespace, including a newline.
            let skipped: usize = self
                .rest()
                .chars()
                .take_while(|c| matches!(c, ' ' | '\t' | '\n' | '\r'))
                .map(char::len_utf8)
                .sum();
            self.i += skipped;

            if !self.rest().starts_with('(') {
                self.i = checkpoint;
                break;
            }
            let Some(mac) = self.scan_macro() else {
                self.i = checkpoint;
                break;
            };
            match mac.name.as_str() {
                "else-if" | "elseif" => {
                    let cond = self.expr_or_raw_reporting(&mac.args);
                    let body = self.attached_hook().unwrap_or_default();
                    elsif.push((cond, body));
                }
                "else" => {
                    else_body = Some(self.attached_hook().unwrap_or_default());
                    break;
                }
                _ => {
                    self.i = checkpoint;
                    break;
                }
            }
        }

        ContentNode::Conditional {
            condition,
            then_body,
            elsif,
            else_body,
        }
    }

    /// `[[text|target]]`, `[[text->target]]`, `[[target<-text]]`, `[[target]]`
    fn parse_link(&mut self) -> ContentNode {
        let close = self.text[self.i..]
            .find("]]")
            .map(|rel| self.i + rel)
            .unwrap_or(self.text.len());
        let inner = &self.text[self.i + 2..close];
        self.i = (close + 2).min(self.text.len());

        let (text, target) = if let Some((t, d)) = inner.split_once("->") {
            (t.trim(), d.trim())
        } else if let Some((d, t)) = inner.split_once("<-") {
            (t.trim(), d.trim())
        } else if let Some((t, d)) = inner.split_once('|') {
            (t.trim(), d.trim())
        } else {
            (inner.trim(), inner.trim())
        };
        ContentNode::Choice {
            choice: Choice::to_target(text, target),
        }
    }

    fn parse_script_element(&mut self) -> Option<ContentNode> {
        let open_end = self.text[self.i..].find('>')? + self.i + 1;
        let close = self.text[open_end..].find("</script>")? + open_end;
        let body = self.text[open_end..close].to_string();
        self.i = close + "</script>".len();
        Some(ContentNode::ScriptBlock { text: body })
    }

    fn expr_or_raw_reporting(&mut self, text: &str) -> Expr {
        match parse_expr(text) {
            Some(expr) => expr,
            None => {
                self.diagnostics.push(Diagnostic::warning(
                    DiagCode::RawExpression,
                    format!("expression '{}' kept as opaque text", text.trim()),
                ));
                Expr::Raw {
                    text: text.trim().to_string(),
                }
            }
        }
    }

    fn warn_unsupported(&mut self, name: &str) {
        self.diagnostics.push(Diagnostic::warning(
            DiagCode::UnsupportedConstruct,
            format!("Harlowe macro '({}: …)' has no Whisker equivalent", name),
        ));
    }

    fn warn_malformed(&mut self, name: &str, clause: &str) {
        self.diagnostics.push(Diagnostic::warning(
            DiagCode::MalformedInput,
            format!("malformed ({}: …) clause '{}'", name, clause.trim()),
        ));
    }
}

/// Splits on a keyword at top level (outside strings and brackets).
fn split_keyword<'t>(text: &'t str, keyword: &str) -> Option<(&'t str, &'t str)> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let bytes = text.as_bytes();
    for (i, ch) in text.char_indices() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '"' | '\'' => quote = Some(ch),
                '(' | '[' => depth += 1,
                ')' | ']' => depth -= 1,
                _ => {
                    if depth == 0
                        && bytes[i..].starts_with(keyword.as_bytes())
                    {
                        return Some((&text[..i], &text[i + keyword.len()..]));
                    }
                }
            },
        }
    }
    None
}

fn variable_name(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let name = trimmed.strip_prefix('$').or_else(|| trimmed.strip_prefix('_'))?;
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    Some(name.to_string())
}

/// Matches `|name>[` / `|name)[`; returns (name, visible, bytes consumed
/// through the `[`).
fn scan_hook_open(rest: &str) -> Option<(String, bool, usize)> {
    let after_pipe = rest.strip_prefix('|')?;
    let name: String = after_pipe
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if name.is_empty() {
        return None;
    }
    let tail = &after_pipe[name.len()..];
    let name_len = name.len();
    if tail.starts_with(">[") {
        Some((name, true, 1 + name_len + 2))
    } else if tail.starts_with(")[") {
        Some((name, false, 1 + name_len + 2))
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

/// Writes content nodes as Harlowe passage text.
pub fn write_content(nodes: &[ContentNode], diagnostics: &mut Vec<Diagnostic>) -> String {
    let mut out = String::new();
    for node in nodes {
        write_node(node, &mut out, diagnostics);
    }
    out
}

fn write_node(node: &ContentNode, out: &mut String, diagnostics: &mut Vec<Diagnostic>) {
    match node {
        ContentNode::Text { text, flags } => {
            let mut run = text.clone();
            if flags.code || flags.codeblock.is_some() {
                run = format!("`{}`", run);
            }
            if flags.strike {
                run = format!("~~{}~~", run);
            }
            if flags.italic {
                run = format!("//{}//", run);
            }
            if flags.bold {
                run = format!("''{}''", run);
            }
            out.push_str(&run);
        }
        ContentNode::Blockquote { body, .. } => {
            out.push_str("> ");
            for child in body {
                write_node(child, out, diagnostics);
            }
        }
        ContentNode::ListItem { ordered, body } => {
            out.push_str(if *ordered { "0. " } else { "* " });
            for child in body {
                write_node(child, out, diagnostics);
            }
        }
        ContentNode::HorizontalRule => out.push_str("---\n"),
        ContentNode::Interpolation { expr } => match expr {
            Expr::Variable { name } => out.push_str(&format!("${}", name)),
            other => out.push_str(&format!("(print: {})", print_expr(other))),
        },
        ContentNode::Print { expr } => {
            out.push_str(&format!("(print: {})", print_expr(expr)));
        }
        ContentNode::Assignment { var, expr } => {
            out.push_str(&format!("(set: ${} to {})", var, print_expr(expr)));
        }
        ContentNode::Conditional {
            condition,
            then_body,
            elsif,
            else_body,
        } => {
            out.push_str(&format!("(if: {})[", print_expr(condition)));
            for child in then_body {
                write_node(child, out, diagnostics);
            }
            out.push(']');
            for (cond, body) in elsif {
                out.push_str(&format!("(else-if: {})[", print_expr(cond)));
                for child in body {
                    write_node(child, out, diagnostics);
                }
                out.push(']');
            }
            if let Some(body) = else_body {
                out.push_str("(else:)[");
                for child in body {
                    write_node(child, out, diagnostics);
                }
                out.push(']');
            }
        }
        ContentNode::ForEach {
            binder,
            collection,
            body,
        } => {
            out.push_str(&format!(
                "(for: each _{}, ...{})[",
                binder,
                print_expr(collection)
            ));
            for child in body {
                write_node(child, out, diagnostics);
            }
            out.push(']');
        }
        ContentNode::Choice { choice } => write_choice(choice, out, diagnostics),
        ContentNode::Divert { target } => {
            out.push_str(&format!("(goto: \"{}\")", target));
        }
        ContentNode::NamedHook {
            name,
            visible,
            body,
        } => {
            out.push_str(&format!("|{}{}[", name, if *visible { '>' } else { ')' }));
            for child in body {
                write_node(child, out, diagnostics);
            }
            out.push(']');
        }
        ContentNode::ScriptBlock { text } => {
            out.push_str(&format!("<script>{}</script>", text));
        }
        ContentNode::Warning { message } => {
            diagnostics.push(Diagnostic::warning(
                DiagCode::LossyExport,
                format!("import warning dropped on export: {}", message),
            ));
        }
    }
}

fn write_choice(choice: &Choice, out: &mut String, diagnostics: &mut Vec<Diagnostic>) {
    if choice.action.is_some() {
        diagnostics.push(Diagnostic::warning(
            DiagCode::LossyExport,
            format!("choice '{}' has an action script Harlowe cannot carry", choice.text),
        ));
    }

    let rendered = match (&choice.target, choice.body.is_empty()) {
        (Some(target), true) => {
            if *target == choice.text {
                format!("[[{}]]", choice.text)
            } else {
                format!("[[{}->{}]]", choice.text, target)
            }
        }
        (Some(target), false) => {
            let mut body = String::new();
            for child in &choice.body {
                write_node(child, &mut body, diagnostics);
            }
            format!("(link: \"{}\")[{}(goto: \"{}\")]", choice.text, body, target)
        }
        (None, _) => {
            let mut body = String::new();
            for child in &choice.body {
                write_node(child, &mut body, diagnostics);
            }
            format!("(link: \"{}\")[{}]", choice.text, body)
        }
    };

    match &choice.condition {
        Some(cond) => {
            out.push_str(&format!("(if: {})[{}]", print_expr(cond), rendered));
        }
        None => out.push_str(&rendered),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use whisker_story::{BinaryOp, Value};

    fn parse_clean(text: &str) -> Vec<ContentNode> {
        let mut diags = Vec::new();
        let nodes = parse_content(text, &mut diags);
        assert!(diags.is_empty(), "unexpected diagnostics: {:?}", diags);
        nodes
    }

    #[test]
    fn parses_set_then_if_like_the_importer_contract() {
        let nodes = parse_clean("(set: $x to 2)\n(if: $x is 2)[Hello]");
        let assignment = nodes
            .iter()
            .find_map(|n| match n {
                ContentNode::Assignment { var, expr } => Some((var.clone(), expr.clone())),
                _ => None,
            })
            .expect("assignment");
        assert_eq!(assignment.0, "x");
        assert_eq!(assignment.1, Expr::literal(Value::Int(2)));

        let conditional = nodes
            .iter()
            .find_map(|n| match n {
                ContentNode::Conditional {
                    condition,
                    then_body,
                    ..
                } => Some((condition.clone(), then_body.clone())),
                _ => None,
            })
            .expect("conditional");
        assert_eq!(
            conditional.0,
            Expr::binary(BinaryOp::Eq, Expr::variable("x"), Expr::literal(Value::Int(2)))
        );
        assert!(matches!(
            &conditional.1[0],
            ContentNode::Text { text, .. } if text == "Hello"
        ));
    }

    #[test]
    fn parses_multi_set() {
        let nodes = parse_clean("(set: $a to 1, $b to \"x\")");
        let vars: Vec<_> = nodes
            .iter()
            .filter_map(|n| match n {
                ContentNode::Assignment { var, .. } => Some(var.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(vars, vec!["a", "b"]);
    }

    #[test]
    fn parses_put_into() {
        let nodes = parse_clean("(put: 3 into $count)");
        assert!(matches!(
            &nodes[0],
            ContentNode::Assignment { var, expr }
                if var == "count" && *expr == Expr::literal(Value::Int(3))
        ));
    }

    #[test]
    fn parses_else_if_chain() {
        let nodes = parse_clean("(if: $a)[one](else-if: $b)[two](else:)[three]");
        let ContentNode::Conditional {
            elsif, else_body, ..
        } = &nodes[0]
        else {
            panic!("expected conditional, got {:?}", nodes[0]);
        };
        assert_eq!(elsif.len(), 1);
        assert!(else_body.is_some());
    }

    #[test]
    fn parses_unless_as_negated_if() {
        let nodes = parse_clean("(unless: $dead)[alive]");
        let ContentNode::Conditional { condition, .. } = &nodes[0] else {
            panic!("expected conditional");
        };
        assert!(matches!(condition, Expr::Unary { .. }));
    }

    #[test]
    fn parses_links_in_all_spellings() {
        let nodes = parse_clean("[[Go->Forest]] [[Hall|Castle]] [[Plain]] [[Cellar<-Down]]");
        let targets: Vec<_> = nodes
            .iter()
            .filter_map(|n| match n {
                ContentNode::Choice { choice } => {
                    Some((choice.text.clone(), choice.target.clone().unwrap()))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            targets,
            vec![
                ("Go".to_string(), "Forest".to_string()),
                ("Hall".to_string(), "Castle".to_string()),
                ("Plain".to_string(), "Plain".to_string()),
                ("Down".to_string(), "Cellar".to_string()),
            ]
        );
    }

    #[test]
    fn parses_link_goto_and_goto() {
        let nodes = parse_clean("(link-goto: \"Onward\", \"Camp\")(goto: \"Void\")");
        assert!(matches!(
            &nodes[0],
            ContentNode::Choice { choice }
                if choice.text == "Onward" && choice.target.as_deref() == Some("Camp")
        ));
        assert!(matches!(
            &nodes[1],
            ContentNode::Divert { target } if target == "Void"
        ));
    }

    #[test]
    fn parses_link_with_body() {
        let nodes = parse_clean("(link: \"Examine\")[It glows.]");
        let ContentNode::Choice { choice } = &nodes[0] else {
            panic!("expected choice");
        };
        assert!(choice.target.is_none());
        assert!(!choice.body.is_empty());
    }

    #[test]
    fn parses_named_hooks() {
        let nodes = parse_clean("|status>[fine] |secret)[hidden]");
        assert!(matches!(
            &nodes[0],
            ContentNode::NamedHook { name, visible: true, .. } if name == "status"
        ));
        assert!(nodes.iter().any(|n| matches!(
            n,
            ContentNode::NamedHook { name, visible: false, .. } if name == "secret"
        )));
    }

    #[test]
    fn unknown_macro_becomes_warning_with_preserved_body() {
        let mut diags = Vec::new();
        let nodes = parse_content("(transition: \"dissolve\")[fancy]", &mut diags);
        assert!(matches!(&nodes[0], ContentNode::Warning { .. }));
        assert!(nodes
            .iter()
            .any(|n| matches!(n, ContentNode::Text { text, .. } if text == "fancy")));
        assert!(diags
            .iter()
            .any(|d| d.code == DiagCode::UnsupportedConstruct));
    }

    #[test]
    fn inline_variable_becomes_interpolation() {
        let nodes = parse_clean("HP: $hp left");
        assert!(matches!(
            &nodes[1],
            ContentNode::Interpolation { expr } if *expr == Expr::variable("hp")
        ));
    }

    #[test]
    fn write_then_parse_preserves_structure() {
        let mut diags = Vec::new();
        let original = parse_content(
            "(set: $x to 2)(if: $x is 2)[Hello [[Go->End]]](else:)[Bye]",
            &mut diags,
        );
        let written = write_content(&original, &mut diags);
        let reparsed = parse_content(&written, &mut diags);
        assert_eq!(original, reparsed, "written form: {}", written);
    }

    #[test]
    fn script_elements_round_trip_opaquely() {
        let mut diags = Vec::new();
        let nodes = parse_content("<script>window.x = 1;</script>", &mut diags);
        assert!(matches!(
            &nodes[0],
            ContentNode::ScriptBlock { text } if text.contains("window.x")
        ));
        let written = write_content(&nodes, &mut diags);
        assert!(written.contains("<script>window.x = 1;</script>"));
    }
}
