//! SugarCube passage-text parsing and serialization.
//!
//! SugarCube macros use `<<name …>>` syntax with explicit closers:
//! `<<if c>> … <<elseif c>> … <<else>> … <</if>>`, `<<for>>`, `<<link>>`.
//! `<<script>>` and `<<widget>>` bodies are opaque host code and pass
//! through as script blocks.

use whisker_base::{DiagCode, Diagnostic};
use whisker_story::{Choice, ContentNode, Expr, FormatFlags};

use super::expr::{parse_expr, print_expr};
use super::{split_top_level, unquote};

/// Parses SugarCube passage text into content nodes.
pub fn parse_content(text: &str, diagnostics: &mut Vec<Diagnostic>) -> Vec<ContentNode> {
    let mut parser = SugarParser {
        text,
        i: 0,
        diagnostics,
    };
    parser.parse_nodes(&[])
}

/// One scanned `<<name args>>` tag, with `end` just past the `>>`.
struct Tag {
    name: String,
    args: String,
    closing: bool,
}

struct SugarParser<'a, 'd> {
    text: &'a str,
    i: usize,
    diagnostics: &'d mut Vec<Diagnostic>,
}

impl<'a, 'd> SugarParser<'a, 'd> {
    fn rest(&self) -> &'a str {
        &self.text[self.i..]
    }

    /// Parses nodes until EOF or one of `stop` closing/chain tags is next
    /// (the stop tag is left unconsumed).
    fn parse_nodes(&mut self, stop: &[&str]) -> Vec<ContentNode> {
        let mut nodes = Vec::new();
        let mut buf = String::new();

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

        while self.i < self.text.len() {
            let rest = self.rest();

            if rest.starts_with("<<") {
                if let Some(tag) = self.peek_tag() {
                    let key: String = if tag.closing {
                        format!("/{}", tag.name)
                    } else {
                        tag.name.clone()
                    };
                    if stop.contains(&key.as_str()) {
                        flush!();
                        return nodes;
                    }
                    self.consume_tag();
                    flush!();
                    nodes.extend(self.dispatch(tag));
                    continue;
                }
            }
            if rest.starts_with("[[") {
                flush!();
                nodes.push(self.parse_link());
                continue;
            }
            if rest.starts_with('$') {
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

    /// Scans the `<<…>>` tag at the cursor without consuming it.
    fn peek_tag(&self) -> Option<Tag> {
        let rest = self.rest();
        if !rest.starts_with("<<") {
            return None;
        }
        let close = rest.find(">>")?;
        let inner = &rest[2..close];
        let (closing, inner) = match inner.strip_prefix('/') {
            Some(stripped) => (true, stripped),
            None => (false, inner),
        };
        let name_len = inner
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '=')
            .count();
        if name_len == 0 {
            return None;
        }
        Some(Tag {
            name: inner[..name_len].to_ascii_lowercase(),
            args: inner[name_len..].trim().to_string(),
            closing,
        })
    }

    fn consume_tag(&mut self) {
        if let Some(close) = self.rest().find(">>") {
            self.i += close + 2;
        } else {
            self.i = self.text.len();
        }
    }

    /// Collects raw text until `<</name>>`, consuming the closer.
    fn raw_until_close(&mut self, name: &str) -> String {
        let closer = format!("<</{}>>", name);
        match self.rest().find(&closer) {
            Some(rel) => {
                let body = self.rest()[..rel].to_string();
                self.i += rel + closer.len();
                body
            }
            None => {
                self.diagnostics.push(Diagnostic::warning(
                    DiagCode::MalformedInput,
                    format!("<<{}>> is never closed", name),
                ));
                let body = self.rest().to_string();
                self.i = self.text.len();
                body
            }
        }
    }

    fn dispatch(&mut self, tag: Tag) -> Vec<ContentNode> {
        if tag.closing {
            self.diagnostics.push(Diagnostic::warning(
                DiagCode::MalformedInput,
                format!("stray <</{}>> without an opener", tag.name),
            ));
            return Vec::new();
        }

        match tag.name.as_str() {
            "set" => self.parse_set(&tag.args),
            "if" => vec![self.parse_if(&tag.args)],
            "for" => vec![self.parse_for(&tag.args)],
            "link" => vec![self.parse_link_macro(&tag.args)],
            "goto" => vec![ContentNode::Divert {
                target: unquote(&tag.args),
            }],
            "print" | "=" => vec![ContentNode::Print {
                expr: self.expr_or_raw(&tag.args),
            }],
            "script" => {
                let body = self.raw_until_close("script");
                vec![ContentNode::ScriptBlock {
                    text: body.trim_matches('\n').to_string(),
                }]
            }
            "widget" => {
                let name = unquote(&tag.args);
                let body = self.raw_until_close("widget");
                // Widgets are SugarCube-specific; keep them opaque so a
                // SugarCube re-export can restore them.
                vec![ContentNode::ScriptBlock {
                    text: format!("<<widget \"{}\">>{}<</widget>>", name, body),
                }]
            }
            other => {
                self.diagnostics.push(Diagnostic::warning(
                    DiagCode::UnsupportedConstruct,
                    format!("SugarCube macro '<<{}>>' has no Whisker equivalent", other),
                ));
                vec![ContentNode::Warning {
                    message: format!("unsupported SugarCube macro '<<{}>>'", other),
                }]
            }
        }
    }

    /// `<<set $v to expr>>` (also accepts `=`).
    fn parse_set(&mut self, args: &str) -> Vec<ContentNode> {
        let clause = args.trim();
        let split = split_assign(clause);
        let Some((var_part, expr_part)) = split else {
            self.diagnostics.push(Diagnostic::warning(
                DiagCode::MalformedInput,
                format!("malformed <<set {}>>", clause),
            ));
            return Vec::new();
        };
        let Some(var) = var_part
            .trim()
            .strip_prefix('$')
            .or_else(|| var_part.trim().strip_prefix('_'))
        else {
            self.diagnostics.push(Diagnostic::warning(
                DiagCode::MalformedInput,
                format!("<<set>> target '{}' is not a variable", var_part.trim()),
            ));
            return Vec::new();
        };
        vec![ContentNode::Assignment {
            var: var.to_string(),
            expr: self.expr_or_raw(expr_part),
        }]
    }

    /// `<<if c>> … <<elseif c>> … <<else>> … <</if>>`
    fn parse_if(&mut self, cond_text: &str) -> ContentNode {
        let condition = self.expr_or_raw(cond_text);
        let then_body = self.parse_nodes(&["elseif", "else", "/if"]);

        let mut elsif = Vec::new();
        let mut else_body = None;

        loop {
            let Some(tag) = self.peek_tag() else {
                break;
            };
            if tag.closing && tag.name == "if" {
                self.consume_tag();
                break;
            }
            match tag.name.as_str() {
                "elseif" => {
                    self.consume_tag();
                    let cond = self.expr_or_raw(&tag.args);
                    let body = self.parse_nodes(&["elseif", "else", "/if"]);
                    elsif.push((cond, body));
                }
                "else" => {
                    self.consume_tag();
                    else_body = Some(self.parse_nodes(&["/if"]));
                }
                _ => break,
            }
        }

        ContentNode::Conditional {
            condition,
            then_body,
            elsif,
            else_body,
        }
    }

    /// `<<for _item range $collection>> … <</for>>`; other loop forms stay
    /// opaque.
    fn parse_for(&mut self, args: &str) -> ContentNode {
        let body_nodes = |parser: &mut Self| parser.parse_nodes(&["/for"]);

        if let Some((binder_part, coll_part)) = args.split_once(" range ") {
            let binder = binder_part
                .trim()
                .trim_start_matches('_')
                .trim_start_matches('$')
                .to_string();
            let collection = self.expr_or_raw(coll_part);
            let body = body_nodes(self);
            self.consume_closer("for");
            return ContentNode::ForEach {
                binder,
                collection,
                body,
            };
        }

        self.diagnostics.push(Diagnostic::warning(
            DiagCode::UnsupportedConstruct,
            format!("<<for {}>> uses a loop form Whisker cannot model", args),
        ));
        let body = body_nodes(self);
        self.consume_closer("for");
        let mut nodes = vec![ContentNode::Warning {
            message: format!("unsupported <<for {}>> loop", args),
        }];
        nodes.extend(body);
        ContentNode::Conditional {
            condition: Expr::literal(whisker_story::Value::Bool(true)),
            then_body: nodes,
            elsif: Vec::new(),
            else_body: None,
        }
    }

    fn consume_closer(&mut self, name: &str) {
        if let Some(tag) = self.peek_tag() {
            if tag.closing && tag.name == name {
                self.consume_tag();
            }
        }
    }

    /// `<<link "text" "target">>body<</link>>`
    fn parse_link_macro(&mut self, args: &str) -> ContentNode {
        let parts = split_top_level(args);
        let text = unquote(parts.first().map(|p| p.trim()).unwrap_or_default());
        let target = parts.get(1).map(|p| unquote(p.trim())).filter(|t| !t.is_empty());

        // Space-separated form: `<<link "t" "d">>`.
        let (text, target) = if target.is_none() && parts.len() == 1 {
            let words = shell_words(parts[0]);
            match words.len() {
                2 => (words[0].clone(), Some(words[1].clone())),
                _ => (text, None),
            }
        } else {
            (text, target)
        };

        let body = self.parse_nodes(&["/link"]);
        self.consume_closer("link");

        ContentNode::Choice {
            choice: Choice {
                text,
                target,
                body,
                condition: None,
                action: None,
                metadata: Default::default(),
            },
        }
    }

    fn parse_link(&mut self) -> ContentNode {
        let close = self.text[self.i..]
            .find("]]")
            .map(|rel| self.i + rel)
            .unwrap_or(self.text.len());
        let inner = &self.text[self.i + 2..close];
        self.i = (close + 2).min(self.text.len());

        let (text, target) = if let Some((t, d)) = inner.split_once("->") {
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

    fn expr_or_raw(&mut self, text: &str) -> Expr {
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
}

/// Splits `$v to expr` / `$v = expr` into target and value.
fn split_assign(clause: &str) -> Option<(&str, &str)> {
    if let Some(idx) = find_word(clause, "to") {
        return Some((&clause[..idx], &clause[idx + 2..]));
    }
    // `=` but not `==`.
    let bytes = clause.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'=' {
            let next_eq = bytes.get(i + 1) == Some(&b'=');
            let prev_op = i > 0 && matches!(bytes[i - 1], b'=' | b'!' | b'<' | b'>');
            if !next_eq && !prev_op {
                return Some((&clause[..i], &clause[i + 1..]));
            }
        }
    }
    None
}

/// Finds a whole-word occurrence at top level.
fn find_word(text: &str, word: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut search = 0;
    while let Some(rel) = text[search..].find(word) {
        let idx = search + rel;
        let before_ok = idx == 0 || bytes[idx - 1].is_ascii_whitespace();
        let after = idx + word.len();
        let after_ok = after >= bytes.len() || bytes[after].is_ascii_whitespace();
        if before_ok && after_ok {
            return Some(idx);
        }
        search = idx + word.len();
    }
    None
}

/// Splits `"a b" "c"` style quoted words.
fn shell_words(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = text.trim().chars().peekable();
    while let Some(&ch) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
        } else if ch == '"' || ch == '\'' {
            chars.next();
            let mut word = String::new();
            for c in chars.by_ref() {
                if c == ch {
                    break;
                }
                word.push(c);
            }
            out.push(word);
        } else {
            let mut word = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                word.push(c);
                chars.next();
            }
            out.push(word);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

/// Writes content nodes as SugarCube passage text.
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
                run = format!("{{{{{{{}}}}}}}", run);
            }
            if flags.strike {
                run = format!("==={}===", run);
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
            out.push('>');
            for child in body {
                write_node(child, out, diagnostics);
            }
        }
        ContentNode::ListItem { ordered, body } => {
            out.push_str(if *ordered { "# " } else { "* " });
            for child in body {
                write_node(child, out, diagnostics);
            }
        }
        ContentNode::HorizontalRule => out.push_str("----\n"),
        ContentNode::Interpolation { expr } => match expr {
            Expr::Variable { name } => out.push_str(&format!("${}", name)),
            other => out.push_str(&format!("<<print {}>>", print_expr(other))),
        },
        ContentNode::Print { expr } => {
            out.push_str(&format!("<<print {}>>", print_expr(expr)));
        }
        ContentNode::Assignment { var, expr } => {
            out.push_str(&format!("<<set ${} to {}>>", var, print_expr(expr)));
        }
        ContentNode::Conditional {
            condition,
            then_body,
            elsif,
            else_body,
        } => {
            out.push_str(&format!("<<if {}>>", print_expr(condition)));
            for child in then_body {
                write_node(child, out, diagnostics);
            }
            for (cond, body) in elsif {
                out.push_str(&format!("<<elseif {}>>", print_expr(cond)));
                for child in body {
                    write_node(child, out, diagnostics);
                }
            }
            if let Some(body) = else_body {
                out.push_str("<<else>>");
                for child in body {
                    write_node(child, out, diagnostics);
                }
            }
            out.push_str("<</if>>");
        }
        ContentNode::ForEach {
            binder,
            collection,
            body,
        } => {
            out.push_str(&format!(
                "<<for _{} range {}>>",
                binder,
                print_expr(collection)
            ));
            for child in body {
                write_node(child, out, diagnostics);
            }
            out.push_str("<</for>>");
        }
        ContentNode::Choice { choice } => write_choice(choice, out, diagnostics),
        ContentNode::Divert { target } => {
            out.push_str(&format!("<<goto \"{}\">>", target));
        }
        ContentNode::NamedHook { name, body, .. } => {
            out.push_str(&format!("<span id=\"{}\">", name));
            for child in body {
                write_node(child, out, diagnostics);
            }
            out.push_str("</span>");
        }
        ContentNode::ScriptBlock { text } => {
            if text.starts_with("<<widget") {
                out.push_str(text);
            } else {
                out.push_str(&format!("<<script>>{}<</script>>", text));
            }
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
    let rendered = match (&choice.target, choice.body.is_empty() && choice.action.is_none()) {
        (Some(target), true) => {
            if *target == choice.text {
                format!("[[{}]]", choice.text)
            } else {
                format!("[[{}->{}]]", choice.text, target)
            }
        }
        (target, _) => {
            let mut body = String::new();
            for child in &choice.body {
                write_node(child, &mut body, diagnostics);
            }
            if let Some(action) = &choice.action {
                body.push_str(&format!("<<print {}>>", print_expr(action)));
                diagnostics.push(Diagnostic::warning(
                    DiagCode::LossyExport,
                    format!(
                        "choice '{}' action exported as a <<print>> side effect",
                        choice.text
                    ),
                ));
            }
            match target {
                Some(target) => format!(
                    "<<link \"{}\" \"{}\">>{}<</link>>",
                    choice.text, target, body
                ),
                None => format!("<<link \"{}\">>{}<</link>>", choice.text, body),
            }
        }
    };

    match &choice.condition {
        Some(cond) => out.push_str(&format!(
            "<<if {}>>{}<</if>>",
            print_expr(cond),
            rendered
        )),
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
    fn parses_set_with_to_and_equals() {
        let nodes = parse_clean("<<set $hp to 10>><<set $mp = 5>>");
        let vars: Vec<_> = nodes
            .iter()
            .filter_map(|n| match n {
                ContentNode::Assignment { var, expr } => Some((var.clone(), expr.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0].0, "hp");
        assert_eq!(vars[0].1, Expr::literal(Value::Int(10)));
        assert_eq!(vars[1].0, "mp");
    }

    #[test]
    fn parses_if_elseif_else_chain() {
        let nodes =
            parse_clean("<<if $x gt 2>>big<<elseif $x gt 0>>small<<else>>none<</if>>");
        let ContentNode::Conditional {
            condition,
            then_body,
            elsif,
            else_body,
        } = &nodes[0]
        else {
            panic!("expected conditional, got {:?}", nodes[0]);
        };
        assert_eq!(
            *condition,
            Expr::binary(BinaryOp::Gt, Expr::variable("x"), Expr::literal(Value::Int(2)))
        );
        assert!(!then_body.is_empty());
        assert_eq!(elsif.len(), 1);
        assert!(else_body.is_some());
    }

    #[test]
    fn parses_for_range_loop() {
        let nodes = parse_clean("<<for _item range $bag>>{x}<</for>>");
        assert!(matches!(
            &nodes[0],
            ContentNode::ForEach { binder, .. } if binder == "item"
        ));
    }

    #[test]
    fn parses_link_with_body_and_target() {
        let nodes = parse_clean("<<link \"Open\" \"Vault\">>It creaks.<</link>>");
        let ContentNode::Choice { choice } = &nodes[0] else {
            panic!("expected choice");
        };
        assert_eq!(choice.text, "Open");
        assert_eq!(choice.target.as_deref(), Some("Vault"));
        assert!(!choice.body.is_empty());
    }

    #[test]
    fn parses_goto_and_print() {
        let nodes = parse_clean("<<goto \"End\">><<print $hp + 1>>");
        assert!(matches!(&nodes[0], ContentNode::Divert { target } if target == "End"));
        assert!(matches!(&nodes[1], ContentNode::Print { .. }));
    }

    #[test]
    fn script_body_is_opaque() {
        let nodes = parse_clean("<<script>>state.x = 1;<</script>>");
        assert!(matches!(
            &nodes[0],
            ContentNode::ScriptBlock { text } if text.contains("state.x")
        ));
    }

    #[test]
    fn widget_round_trips_verbatim() {
        let mut diags = Vec::new();
        let source = "<<widget \"hp-bar\">>HP: $hp<</widget>>";
        let nodes = parse_content(source, &mut diags);
        let written = write_content(&nodes, &mut diags);
        assert_eq!(written, source);
    }

    #[test]
    fn unknown_macro_becomes_warning() {
        let mut diags = Vec::new();
        let nodes = parse_content("<<audio \"boom\" play>>", &mut diags);
        assert!(matches!(&nodes[0], ContentNode::Warning { .. }));
        assert!(diags
            .iter()
            .any(|d| d.code == DiagCode::UnsupportedConstruct));
    }

    #[test]
    fn inline_variable_is_interpolation() {
        let nodes = parse_clean("HP: $hp");
        assert!(matches!(
            &nodes[1],
            ContentNode::Interpolation { expr } if *expr == Expr::variable("hp")
        ));
    }

    #[test]
    fn write_then_parse_preserves_structure() {
        let mut diags = Vec::new();
        let original = parse_content(
            "<<set $x to 1>><<if $x is 1>>yes [[Go->End]]<<else>>no<</if>>",
            &mut diags,
        );
        let written = write_content(&original, &mut diags);
        let reparsed = parse_content(&written, &mut diags);
        assert_eq!(original, reparsed, "written form: {}", written);
    }
}
