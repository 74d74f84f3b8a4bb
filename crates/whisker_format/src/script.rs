//! The native WhiskerScript adapter.
//!
//! Import is the compiler; export pretty-prints the Story IR back to
//! WhiskerScript. Because export feeds the same parser, compile → export →
//! compile is stable, which is what makes WhiskerScript a first-class
//! archive format and not just an input syntax.

use whisker_base::{DiagCode, Diagnostic};
use whisker_compile::{compile, CompileOptions};
use whisker_language::print_expr;
use whisker_story::{Choice, ContentNode, Expr, Story};

use crate::format::{ExportOptions, ExportResult, Format, ImportOptions, ImportResult};

pub struct WhiskerScriptFormat;

impl Format for WhiskerScriptFormat {
    fn name(&self) -> &'static str {
        "whisker"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["ws", "whisker", "twee", "tw"]
    }

    fn can_import(&self, source: &str) -> bool {
        source
            .lines()
            .any(|line| line.trim_start().starts_with("::"))
    }

    fn import(&self, source: &str, _options: &ImportOptions) -> ImportResult {
        let result = compile(source, &CompileOptions::default());
        let story = if result.is_fatal() {
            None
        } else {
            Some(result.story)
        };
        ImportResult {
            story,
            diagnostics: result.diagnostics,
        }
    }

    fn can_export(&self, _story: &Story) -> Result<(), String> {
        Ok(())
    }

    fn export(&self, story: &Story, options: &ExportOptions) -> ExportResult {
        let mut diagnostics = Vec::new();
        let content = print_story(story, options, &mut diagnostics);
        ExportResult {
            content,
            diagnostics,
        }
    }
}

/// Prints a Story IR as WhiskerScript source.
pub fn print_story(
    story: &Story,
    options: &ExportOptions,
    diagnostics: &mut Vec<Diagnostic>,
) -> String {
    let mut out = String::new();

    if options.include_metadata {
        let meta = &story.metadata;
        if !meta.title.is_empty() {
            out.push_str(&format!("@@ title: {}\n", meta.title));
        }
        if let Some(author) = &meta.author {
            out.push_str(&format!("@@ author: {}\n", author));
        }
        if let Some(ifid) = &meta.ifid {
            out.push_str(&format!("@@ ifid: {}\n", ifid));
        }
        if let Some(format) = &meta.format {
            out.push_str(&format!("@@ format: {}\n", format));
        }
        if let Some(version) = &meta.format_version {
            out.push_str(&format!("@@ format-version: {}\n", version));
        }
        for (key, value) in &meta.extra {
            out.push_str(&format!("@@ {}: {}\n", key, value));
        }
        // The first passage is the implicit start; only divergences need
        // recording.
        let first = story.get_all_passages().next().map(|p| p.id.as_str());
        if first.is_some() && first != Some(story.start_passage.as_str()) {
            out.push_str(&format!("@@ start: {}\n", story.start_passage));
        }
        for decl in &story.variables {
            out.push_str(&format!(
                "@@ var ${} = {}\n",
                decl.name,
                print_expr(&Expr::literal(decl.initial.clone()))
            ));
        }
        if !out.is_empty() && options.pretty {
            out.push('\n');
        }
    }

    for (i, passage) in story.get_all_passages().enumerate() {
        if i > 0 && options.pretty {
            out.push('\n');
        }
        out.push_str(&format!(":: {}", passage.id));
        if !passage.tags.is_empty() {
            out.push_str(&format!(" [{}]", passage.tags.join(", ")));
        }
        out.push('\n');
        for (key, value) in &passage.metadata {
            if key == "pid" {
                continue;
            }
            out.push_str(&format!("@@ {}: {}\n", key, value));
        }
        print_body(&passage.content, &mut out, diagnostics);
    }

    out
}

/// Prints a passage body alone, without the `::` header. The Twine
/// exporters use this when macro conversion is disabled, so an archive can
/// carry WhiskerScript syntax verbatim.
pub fn print_passage_content(nodes: &[ContentNode], diagnostics: &mut Vec<Diagnostic>) -> String {
    let mut out = String::new();
    print_body(nodes, &mut out, diagnostics);
    out
}

fn print_body(nodes: &[ContentNode], out: &mut String, diagnostics: &mut Vec<Diagnostic>) {
    let mut line = String::new();

    macro_rules! flush_line {
        () => {
            if !line.is_empty() {
                out.push_str(line.trim_end());
                out.push('\n');
                line.clear();
            }
        };
    }

    for node in nodes {
        match node {
            ContentNode::Text { text, flags } if text == "\n" && flags.is_plain() => {
                flush_line!();
            }
            ContentNode::Text { flags, .. } if flags.codeblock.is_none() => {
                line.push_str(&print_inline(node, diagnostics));
            }
            ContentNode::Interpolation { .. }
            | ContentNode::NamedHook { .. }
            | ContentNode::Print { .. } => {
                line.push_str(&print_inline(node, diagnostics));
            }
            structural => {
                flush_line!();
                print_structural(structural, out, diagnostics);
            }
        }
    }
    flush_line!();
}

fn print_structural(node: &ContentNode, out: &mut String, diagnostics: &mut Vec<Diagnostic>) {
    match node {
        ContentNode::HorizontalRule => out.push_str("---\n"),
        ContentNode::Blockquote { depth, body } => {
            out.push_str(&">".repeat(*depth as usize));
            out.push(' ');
            let text: String = body
                .iter()
                .map(|n| print_inline(n, diagnostics))
                .collect();
            out.push_str(text.trim_end());
            out.push('\n');
        }
        ContentNode::ListItem { ordered, body } => {
            out.push_str(if *ordered { "1. " } else { "- " });
            let text: String = body
                .iter()
                .map(|n| print_inline(n, diagnostics))
                .collect();
            out.push_str(text.trim_end());
            out.push('\n');
        }
        ContentNode::Assignment { var, expr } => {
            out.push_str(&format!("~ ${} = {}\n", var, print_expr(expr)));
        }
        ContentNode::Divert { target } => {
            out.push_str(&format!("-> {}\n", target));
        }
        ContentNode::Choice { choice } => print_choice(choice, out, diagnostics),
        ContentNode::Conditional {
            condition,
            then_body,
            elsif,
            else_body,
        } => {
            out.push_str(&format!("{{ if {} }}\n", print_expr(condition)));
            print_body(then_body, out, diagnostics);
            for (cond, body) in elsif {
                out.push_str(&format!("{{ elsif {} }}\n", print_expr(cond)));
                print_body(body, out, diagnostics);
            }
            if let Some(body) = else_body {
                out.push_str("{ else }\n");
                print_body(body, out, diagnostics);
            }
            out.push_str("{ endif }\n");
        }
        ContentNode::ForEach {
            binder,
            collection,
            body,
        } => {
            out.push_str(&format!(
                "{{ for {} in {} }}\n",
                binder,
                print_expr(collection)
            ));
            print_body(body, out, diagnostics);
            out.push_str("{ endfor }\n");
        }
        ContentNode::ScriptBlock { text } => {
            out.push_str(&format!("```script\n{}\n```\n", text));
        }
        ContentNode::Warning { message } => {
            diagnostics.push(Diagnostic::warning(
                DiagCode::LossyExport,
                format!("import warning dropped on export: {}", message),
            ));
        }
        other => {
            let text = print_inline(other, diagnostics);
            if !text.is_empty() {
                out.push_str(text.trim_end());
                out.push('\n');
            }
        }
    }
}

fn print_choice(choice: &Choice, out: &mut String, diagnostics: &mut Vec<Diagnostic>) {
    out.push_str(&format!("+ [{}]", choice.text));

    // Actions have no single-expression surface form; they export as an
    // inline body so the side effect still runs on selection.
    let mut body = choice.body.clone();
    if let Some(action) = &choice.action {
        diagnostics.push(Diagnostic::warning(
            DiagCode::LossyExport,
            format!(
                "choice '{}' action exported as inline body content",
                choice.text
            ),
        ));
        body.insert(
            0,
            ContentNode::Interpolation {
                expr: action.clone(),
            },
        );
    }

    match (&choice.condition, &choice.target, body.is_empty()) {
        (Some(cond), Some(target), true) => {
            out.push_str(&format!(" {{ if {} -> {} }}\n", print_expr(cond), target));
        }
        (None, Some(target), true) => {
            out.push_str(&format!(" -> {}\n", target));
        }
        (cond, target, _) => {
            if cond.is_some() {
                diagnostics.push(Diagnostic::warning(
                    DiagCode::LossyExport,
                    format!("choice '{}' guard dropped (guards pair with targets)", choice.text),
                ));
            }
            out.push_str(" {\n");
            print_body(&body, out, diagnostics);
            if let Some(target) = target {
                out.push_str(&format!("-> {}\n", target));
            }
            out.push_str("}\n");
        }
    }
}

fn print_inline(node: &ContentNode, diagnostics: &mut Vec<Diagnostic>) -> String {
    match node {
        ContentNode::Text { text, flags } => {
            if text == "\n" && flags.is_plain() {
                return String::new();
            }
            let mut run = text.clone();
            if let Some(lang) = &flags.codeblock {
                return format!("```{}\n{}\n```\n", lang, run);
            }
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
        ContentNode::Interpolation { expr } => format!("{{{}}}", print_expr(expr)),
        ContentNode::Print { expr } => format!("{{{}}}", print_expr(expr)),
        ContentNode::NamedHook {
            name,
            visible,
            body,
        } => {
            let inner: String = body
                .iter()
                .map(|n| print_inline(n, diagnostics))
                .collect();
            format!("|{}{}[{}]", name, if *visible { '>' } else { ')' }, inner)
        }
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ImportOptions;

    const LINEAR: &str = ":: Start\nHello\n+ [Go] -> End\n\n:: End\nBye\n";

    #[test]
    fn import_compiles_whisker_script() {
        let result = WhiskerScriptFormat.import(LINEAR, &ImportOptions::default());
        let story = result.story.expect("story");
        assert_eq!(story.passage_count(), 2);
        assert_eq!(story.start_passage, "Start");
    }

    #[test]
    fn import_of_garbage_is_none() {
        let result = WhiskerScriptFormat.import("no headers here", &ImportOptions::default());
        assert!(result.story.is_none());
    }

    #[test]
    fn export_then_import_is_stable() {
        let first = WhiskerScriptFormat
            .import(LINEAR, &ImportOptions::default())
            .story
            .unwrap();
        let exported = WhiskerScriptFormat.export(&first, &ExportOptions::default());
        let second = WhiskerScriptFormat
            .import(&exported.content, &ImportOptions::default())
            .story
            .unwrap();
        assert_eq!(first, second, "exported: {}", exported.content);
    }

    #[test]
    fn export_records_non_default_start() {
        let mut story = WhiskerScriptFormat
            .import(LINEAR, &ImportOptions::default())
            .story
            .unwrap();
        story.start_passage = "End".into();
        let exported = WhiskerScriptFormat.export(&story, &ExportOptions::default());
        assert!(exported.content.contains("@@ start: End"), "{}", exported.content);
    }

    #[test]
    fn export_renders_control_flow() {
        let source = ":: S\n{ if $a }\nyes\n{ else }\nno\n{ endif }\n~ $a = 1\n";
        let story = WhiskerScriptFormat
            .import(source, &ImportOptions::default())
            .story
            .unwrap();
        let exported = WhiskerScriptFormat.export(&story, &ExportOptions::default());
        assert!(exported.content.contains("{ if $a }"), "{}", exported.content);
        assert!(exported.content.contains("{ else }"), "{}", exported.content);
        assert!(exported.content.contains("~ $a = 1"), "{}", exported.content);
    }

    #[test]
    fn sniffs_passage_headers() {
        assert!(WhiskerScriptFormat.can_import(":: Start\n"));
        assert!(!WhiskerScriptFormat.can_import("# markdown\n"));
    }
}
