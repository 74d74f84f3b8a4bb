//! # whisker-format
//!
//! Story format adapters behind one uniform [`Format`] contract:
//!
//! - **WhiskerScript** (`script`) — the native source dialect
//! - **Twine HTML** (`twine`) — Harlowe, SugarCube, Chapbook, and Snowman
//! - **Ink JSON** (`ink`) — runtime schema version 20
//!
//! Adapters are registered in a [`FormatRegistry`] owned by the caller; the
//! [`import`] and [`export`] helpers cover the common one-shot case.

pub mod format;
pub mod ink;
pub mod script;
pub mod twine;

pub use format::{
    DuplicatePolicy, ExportOptions, ExportResult, Format, FormatRegistry, ImportOptions,
    ImportResult, TwineDialect,
};

use whisker_base::{DiagCode, Diagnostic};
use whisker_story::Story;

/// Imports a story, detecting the format from the content (or an explicit
/// hint: a format name or file extension).
pub fn import(source: &str, format_hint: Option<&str>) -> ImportResult {
    let registry = FormatRegistry::with_builtins();
    match registry.detect(source, format_hint) {
        Some(format) => format.import(source, &ImportOptions::default()),
        None => ImportResult {
            story: None,
            diagnostics: vec![Diagnostic::error(
                DiagCode::UnknownDialect,
                match format_hint {
                    Some(hint) => format!("no format adapter matches '{}'", hint),
                    None => "could not detect the source format".to_string(),
                },
            )],
        },
    }
}

/// Exports a story in the named format.
pub fn export(story: &Story, format_name: &str, options: &ExportOptions) -> ExportResult {
    let registry = FormatRegistry::with_builtins();
    let Some(format) = registry.by_name(format_name) else {
        return ExportResult {
            content: String::new(),
            diagnostics: vec![Diagnostic::error(
                DiagCode::UnknownDialect,
                format!("unknown export format '{}'", format_name),
            )],
        };
    };

    if let Err(reason) = format.can_export(story) {
        return ExportResult {
            content: String::new(),
            diagnostics: vec![Diagnostic::error(
                DiagCode::UnsupportedConstruct,
                format!("story cannot be exported as {}: {}", format_name, reason),
            )],
        };
    }

    format.export(story, options)
}
