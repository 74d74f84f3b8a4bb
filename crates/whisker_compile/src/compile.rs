//! The end-to-end WhiskerScript compilation pipeline.
//!
//! # Pipeline Overview
//!
//! ```text
//! WhiskerScript source
//!       │
//!       ▼
//! ┌───────────────────┐
//! │  1. Lex + Parse   │ spanned AST, recovery diagnostics
//! └─────────┬─────────┘
//!           ▼
//! ┌───────────────────┐
//! │  2. Analysis      │ symbols, targets, lints
//! └─────────┬─────────┘
//!           ▼
//! ┌───────────────────┐
//! │  3. Lowering      │ Story IR + optional source map
//! └─────────┬─────────┘
//!           ▼
//!   CompileResult
//! ```
//!
//! Compilation never fails with an `Err`: user-source problems become
//! diagnostics next to a best-effort story, and callers check
//! [`CompileResult::is_fatal`] before running the result.

use whisker_base::{DiagCode, Diagnostic, SourceFile};
use whisker_language::analysis::{analyze, AnalysisConfig};
use whisker_language::parser::parse;
use whisker_story::Story;

use crate::codegen::lower;
use crate::sourcemap::{SourceMapBuilder, SourceMapV3};

/// Options for one compilation.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Path used in diagnostics and the source map; defaults to `<input>`.
    pub path: Option<String>,
    /// Build a Source Map v3 document alongside the story.
    pub emit_source_map: bool,
    pub analysis: AnalysisConfig,
}

/// Everything one compilation produced.
#[derive(Debug)]
pub struct CompileResult {
    pub story: Story,
    pub diagnostics: Vec<Diagnostic>,
    pub source_map: Option<SourceMapV3>,
}

impl CompileResult {
    /// True when the story is structurally unusable (no passages or no
    /// resolvable start). Advisory diagnostics never make a result fatal.
    pub fn is_fatal(&self) -> bool {
        self.diagnostics.iter().any(|d| {
            matches!(
                d.code,
                DiagCode::NoPassages | DiagCode::NoStartPassage | DiagCode::MissingStart
            )
        })
    }
}

/// Compiles WhiskerScript source into a Story IR.
pub fn compile(source: &str, options: &CompileOptions) -> CompileResult {
    let path = options.path.as_deref().unwrap_or("<input>");
    let file = SourceFile::new(path, source);

    let parsed = parse(&file);
    let mut diagnostics = parsed.diagnostics;

    let analysis = analyze(path, &parsed.module, &options.analysis);
    diagnostics.extend(analysis.diagnostics.iter().cloned());

    let mut map_builder = options
        .emit_source_map
        .then(|| SourceMapBuilder::new(format!("{}.json", path), path));

    let story = lower(
        path,
        &parsed.module,
        &analysis,
        map_builder.as_mut(),
        &mut diagnostics,
    );

    CompileResult {
        story,
        diagnostics,
        source_map: map_builder.map(SourceMapBuilder::build),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use whisker_story::{ContentNode, Value};

    fn compile_clean(source: &str) -> CompileResult {
        let result = compile(source, &CompileOptions::default());
        assert!(
            !whisker_base::has_errors(&result.diagnostics),
            "unexpected errors: {:?}",
            result.diagnostics
        );
        result
    }

    #[test]
    fn linear_story_compiles_to_two_passages() {
        let result = compile_clean(":: Start\nHello\n+ [Go] -> End\n\n:: End\nBye\n");
        assert_eq!(result.story.passage_count(), 2);
        assert_eq!(result.story.start_passage, "Start");

        let start = result.story.get_passage("Start").unwrap();
        let choices = start.choices();
        assert_eq!(choices.len(), 1);
        assert_eq!(choices[0].text, "Go");
        assert_eq!(choices[0].target.as_deref(), Some("End"));
    }

    #[test]
    fn metadata_flows_into_story() {
        let result = compile_clean("@@ title: A Tale\n@@ author: kit\n\n:: Start\nhi\n");
        assert_eq!(result.story.metadata.title, "A Tale");
        assert_eq!(result.story.metadata.author.as_deref(), Some("kit"));
    }

    #[test]
    fn declared_variables_get_constant_initials() {
        let result = compile_clean("@@ var $hp = 10\n@@ var $name = \"kit\"\n\n:: S\n{$hp}{$name}\n");
        assert_eq!(result.story.variables.len(), 2);
        assert_eq!(result.story.variables[0].initial, Value::Int(10));
        assert_eq!(result.story.variables[1].initial, Value::Str("kit".into()));
    }

    #[test]
    fn duplicate_passages_keep_first_definition() {
        let result = compile(
            ":: A\nfirst\n\n:: A\nsecond\n",
            &CompileOptions::default(),
        );
        assert_eq!(result.story.passage_count(), 1);
        let passage = result.story.get_passage("A").unwrap();
        let has_first = passage
            .content
            .iter()
            .any(|n| matches!(n, ContentNode::Text { text, .. } if text == "first"));
        assert!(has_first);
    }

    #[test]
    fn empty_source_is_fatal() {
        let result = compile("", &CompileOptions::default());
        assert!(result.is_fatal());
        assert_eq!(result.story.passage_count(), 0);
    }

    #[test]
    fn dangling_target_is_not_fatal() {
        let result = compile(":: S\n+ [Go] -> Gone\n", &CompileOptions::default());
        assert!(!result.is_fatal());
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.code == DiagCode::UnresolvedTarget));
    }

    #[test]
    fn source_map_positions_fall_inside_node_spans() {
        let source = ":: Start\nHello there\n~ $hp = 5\n+ [Go] -> End\n\n:: End\nBye\n";
        let options = CompileOptions {
            emit_source_map: true,
            ..CompileOptions::default()
        };
        let result = compile(source, &options);
        let map = result.source_map.expect("source map");
        assert_eq!(map.version, 3);

        let lines: Vec<&str> = source.lines().collect();
        for mapping in map.resolve() {
            let line = lines
                .get(mapping.source_line as usize)
                .unwrap_or_else(|| panic!("mapping points past EOF: {:?}", mapping));
            assert!(
                (mapping.source_column as usize) <= line.len(),
                "column out of range: {:?} in {:?}",
                mapping,
                line
            );
        }
        // The assignment on source line 3 (0-based 2) must be mapped.
        assert!(map.resolve().iter().any(|m| m.source_line == 2));
    }

    #[test]
    fn source_map_is_absent_by_default() {
        let result = compile(":: S\nhi\n", &CompileOptions::default());
        assert!(result.source_map.is_none());
    }

    #[test]
    fn compiled_story_round_trips_through_canonical_json() {
        let result = compile_clean(
            "@@ title: T\n\n:: Start\n{ if $x }\nyes\n{ endif }\n+ [Go] -> End\n\n:: End\nBye\n",
        );
        let json = whisker_story::to_canonical_json(&result.story).unwrap();
        let back = whisker_story::from_json(&json).unwrap();
        assert_eq!(result.story, back);
    }
}
