//! Diagnostic formatting in the three report modes.
//!
//! Hosts choose how diagnostics are shown: `text` (one line each),
//! `annotated` (source snippet with carets), or `json` (machine readable).
//! All modes order diagnostics by `(file, line, column)`; diagnostics
//! without a location sort first in their original order.

use serde::Serialize;

use crate::diagnostic::Diagnostic;
use crate::source::SourceFile;

/// Output mode for [`format_diagnostics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    Text,
    Annotated,
    Json,
}

/// Formats `diags` in the requested mode.
///
/// `files` supplies source content for annotated snippets, matched by path;
/// diagnostics pointing into unknown files fall back to the text form.
pub fn format_diagnostics(diags: &[Diagnostic], mode: ReportMode, files: &[&SourceFile]) -> String {
    let ordered = sorted(diags);
    match mode {
        ReportMode::Text => ordered
            .iter()
            .map(|d| text_line(d))
            .collect::<Vec<_>>()
            .join("\n"),
        ReportMode::Annotated => ordered
            .iter()
            .map(|d| annotated(d, files))
            .collect::<Vec<_>>()
            .join("\n"),
        ReportMode::Json => json(&ordered),
    }
}

fn sorted(diags: &[Diagnostic]) -> Vec<&Diagnostic> {
    let mut ordered: Vec<&Diagnostic> = diags.iter().collect();
    // Stable sort keeps insertion order for location-free diagnostics.
    ordered.sort_by_key(|d| match &d.primary {
        Some(loc) => (1u8, loc.path.clone(), loc.span.start.line, loc.span.start.column),
        None => (0u8, String::new(), 0, 0),
    });
    ordered
}

fn severity_label(diag: &Diagnostic) -> &'static str {
    match diag.severity {
        crate::diagnostic::Severity::Error => "error",
        crate::diagnostic::Severity::Warning => "warning",
        crate::diagnostic::Severity::Hint => "hint",
    }
}

fn text_line(diag: &Diagnostic) -> String {
    match &diag.primary {
        Some(loc) => format!(
            "{}:{}:{}: {}[{}]: {}",
            loc.path,
            loc.span.start.line,
            loc.span.start.column,
            severity_label(diag),
            diag.code.code(),
            diag.message
        ),
        None => format!("{}[{}]: {}", severity_label(diag), diag.code.code(), diag.message),
    }
}

fn annotated(diag: &Diagnostic, files: &[&SourceFile]) -> String {
    let mut out = format!("{}[{}]: {}\n", severity_label(diag), diag.code.code(), diag.message);

    if let Some(loc) = &diag.primary {
        out.push_str(&format!(
            "  --> {}:{}:{}\n",
            loc.path, loc.span.start.line, loc.span.start.column
        ));
        if let Some(file) = files.iter().find(|f| f.path == loc.path) {
            out.push_str(&file.snippet(loc.span));
        }
        for (sec, label) in &diag.secondary {
            out.push_str(&format!(
                "  note: {} ({}:{}:{})\n",
                label, sec.path, sec.span.start.line, sec.span.start.column
            ));
        }
    }
    if let Some(suggestion) = &diag.suggestion {
        out.push_str(&format!("  help: {}\n", suggestion));
    }

    out
}

#[derive(Serialize)]
struct JsonDiag<'a> {
    code: &'static str,
    severity: &'a crate::diagnostic::Severity,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    column: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestion: Option<&'a str>,
}

fn json(diags: &[&Diagnostic]) -> String {
    let entries: Vec<JsonDiag> = diags
        .iter()
        .map(|d| JsonDiag {
            code: d.code.code(),
            severity: &d.severity,
            message: &d.message,
            file: d.primary.as_ref().map(|l| l.path.as_str()),
            line: d.primary.as_ref().map(|l| l.span.start.line),
            column: d.primary.as_ref().map(|l| l.span.start.column),
            suggestion: d.suggestion.as_deref(),
        })
        .collect();
    // serde_json handles string escaping.
    serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::DiagCode;
    use crate::span::{SourceLocation, SourcePosition, SourceSpan};

    fn diag_at(line: u32, col: u32, offset: usize, msg: &str) -> Diagnostic {
        Diagnostic::error(DiagCode::UnexpectedToken, msg).with_location(SourceLocation::new(
            "story.ws",
            SourceSpan::new(
                SourcePosition::new(line, col, offset),
                SourcePosition::new(line, col + 3, offset + 3),
            ),
        ))
    }

    #[test]
    fn text_mode_orders_by_position() {
        let diags = vec![diag_at(5, 1, 40, "second"), diag_at(2, 3, 10, "first")];
        let out = format_diagnostics(&diags, ReportMode::Text, &[]);
        let first_idx = out.find("first").unwrap();
        let second_idx = out.find("second").unwrap();
        assert!(first_idx < second_idx, "{}", out);
    }

    #[test]
    fn text_mode_includes_code_and_position() {
        let out = format_diagnostics(&[diag_at(2, 3, 10, "bad token")], ReportMode::Text, &[]);
        assert_eq!(out, "story.ws:2:3: error[WSK0101]: bad token");
    }

    #[test]
    fn annotated_mode_renders_snippet() {
        let file = SourceFile::new("story.ws", ":: Start\nabc def\n");
        let diag = diag_at(2, 5, 13, "bad token");
        let out = format_diagnostics(&[diag], ReportMode::Annotated, &[&file]);
        assert!(out.contains("--> story.ws:2:5"), "{}", out);
        assert!(out.contains("abc def"), "{}", out);
        assert!(out.contains("^^^"), "{}", out);
    }

    #[test]
    fn json_mode_escapes_strings() {
        let diag = Diagnostic::error(DiagCode::MalformedInput, "bad \"quote\"");
        let out = format_diagnostics(&[diag], ReportMode::Json, &[]);
        assert!(out.contains("bad \\\"quote\\\""), "{}", out);
        assert!(out.contains("WSK0281"), "{}", out);
    }

    #[test]
    fn locationless_diagnostics_sort_first() {
        let diags = vec![diag_at(1, 1, 0, "located"), Diagnostic::warning(DiagCode::NoPassages, "global")];
        let out = format_diagnostics(&diags, ReportMode::Text, &[]);
        assert!(out.find("global").unwrap() < out.find("located").unwrap());
    }
}
