//! The WhiskerScript linter.
//!
//! Linting runs the full parse + analysis pipeline and returns every
//! diagnostic. [`fix_source`] applies the mechanical fixes (trailing
//! whitespace, blank-line runs, missing final newline); fixes never
//! introduce new problems, so `lint(fix(s))` reports a subset of
//! `lint(s)`'s errors.

use serde::Deserialize;

use whisker_base::{DiagCode, Diagnostic, SourceFile};

use crate::analysis::{analyze, AnalysisConfig};
use crate::parser::parse;

/// Options read from `.whisker-lint.json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LintConfig {
    #[serde(flatten)]
    pub analysis: AnalysisConfig,
}

/// Parses a config file, reporting unknown keys as warnings.
pub fn load_lint_config(json: &str) -> (LintConfig, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();

    let known = [
        "max_passage_words",
        "max_choices",
        "warn_unreferenced",
        "warn_unused_variables",
    ];
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(json) {
        if let Some(map) = value.as_object() {
            for key in map.keys() {
                if !known.contains(&key.as_str()) {
                    diagnostics.push(Diagnostic::warning(
                        DiagCode::UnknownConfigKey,
                        format!("unknown config key '{}'", key),
                    ));
                }
            }
        }
    }

    let config = serde_json::from_str::<LintConfig>(json).unwrap_or_default();
    (config, diagnostics)
}

/// Lints one source file: parse diagnostics plus analysis diagnostics.
pub fn lint_source(path: &str, source: &str, config: &LintConfig) -> Vec<Diagnostic> {
    let file = SourceFile::new(path, source);
    let out = parse(&file);
    let mut diagnostics = out.diagnostics;
    let analysis = analyze(path, &out.module, &config.analysis);
    diagnostics.extend(analysis.diagnostics);
    diagnostics
}

/// Applies the mechanical fixes: strips trailing whitespace, collapses runs
/// of blank lines, and ensures a final newline.
pub fn fix_source(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut blank_run = 0;

    for line in source.lines() {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(trimmed);
        out.push('\n');
    }

    // Trim trailing blank lines, keep exactly one final newline.
    while out.ends_with("\n\n") {
        out.pop();
    }
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use whisker_base::Severity;

    #[test]
    fn lint_reports_parse_and_analysis_problems() {
        let diags = lint_source(
            "test.ws",
            ":: Start\n+ [Go] -> Nowhere\n~ broken\n",
            &LintConfig::default(),
        );
        assert!(diags.iter().any(|d| d.severity == Severity::Error));
        assert!(diags.iter().any(|d| d.code == DiagCode::UnresolvedTarget));
    }

    #[test]
    fn clean_story_lints_clean() {
        let diags = lint_source(
            "test.ws",
            ":: Start\nHello\n+ [Go] -> End\n\n:: End\nBye\n",
            &LintConfig::default(),
        );
        assert!(diags.is_empty(), "{:?}", diags);
    }

    #[test]
    fn fix_strips_trailing_whitespace() {
        assert_eq!(fix_source(":: S  \nhi   \n"), ":: S\nhi\n");
    }

    #[test]
    fn fix_collapses_blank_runs() {
        assert_eq!(fix_source(":: S\na\n\n\n\nb\n"), ":: S\na\n\nb\n");
    }

    #[test]
    fn fix_adds_final_newline() {
        assert_eq!(fix_source(":: S\nhi"), ":: S\nhi\n");
    }

    #[test]
    fn fix_never_introduces_errors() {
        let source = ":: Start   \nHello\n\n\n+ [Go] -> End\n\n:: End\nBye";
        let config = LintConfig::default();
        let before: Vec<_> = lint_source("t", source, &config)
            .into_iter()
            .filter(|d| d.severity == Severity::Error)
            .map(|d| d.code)
            .collect();
        let after: Vec<_> = lint_source("t", &fix_source(source), &config)
            .into_iter()
            .filter(|d| d.severity == Severity::Error)
            .map(|d| d.code)
            .collect();
        for code in &after {
            assert!(before.contains(code), "fix introduced {:?}", code);
        }
    }

    #[test]
    fn unknown_config_keys_are_warnings() {
        let (config, diags) = load_lint_config(r#"{"max_choices": 5, "colour": "red"}"#);
        assert_eq!(config.analysis.max_choices, 5);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagCode::UnknownConfigKey);
    }
}
