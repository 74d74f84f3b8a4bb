//! Semantic analysis of a parsed module.
//!
//! The analyzer builds the passage symbol table, resolves choice and divert
//! targets, tracks variable declarations and uses, and emits the advisory
//! lints (unreachable passages, unused variables, oversized passages).
//!
//! Analysis is deliberately non-fatal: a story with dangling targets or
//! duplicate passages still compiles — authors fix warnings at their own
//! pace — and only structural impossibilities (no passages at all, an
//! unresolvable start) are errors.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;

use whisker_base::{DiagCode, Diagnostic, SourceLocation, SourceSpan};
use whisker_story::Expr;

use crate::ast::{Module, NodeKind, PassageNode};

/// Thresholds for the advisory lints. Deserialized from
/// `.whisker-lint.json` by the linter; the defaults match the CLI's.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Warn when a passage's word count exceeds this.
    pub max_passage_words: usize,
    /// Warn when a passage offers more than this many choices.
    pub max_choices: usize,
    /// Emit `WSK0250` for passages nothing links to.
    pub warn_unreferenced: bool,
    /// Emit `WSK0220` for declared variables never read.
    pub warn_unused_variables: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_passage_words: 2000,
            max_choices: 12,
            warn_unreferenced: true,
            warn_unused_variables: true,
        }
    }
}

/// The analyzer's output: the symbol table plus diagnostics.
#[derive(Debug)]
pub struct Analysis {
    /// Passage name → header span of the surviving (first) definition.
    pub passages: FxHashMap<String, SourceSpan>,
    /// The resolved start passage name, empty when the module has none.
    pub start: String,
    /// Indices into `module.passages` that were shadowed by an earlier
    /// passage of the same name; lowering skips them.
    pub duplicates: FxHashSet<usize>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Runs all analysis passes over a module.
pub fn analyze(path: &str, module: &Module, config: &AnalysisConfig) -> Analysis {
    let mut analysis = Analysis {
        passages: FxHashMap::default(),
        start: String::new(),
        duplicates: FxHashSet::default(),
        diagnostics: Vec::new(),
    };

    collect_passages(path, module, &mut analysis);
    resolve_start(path, module, &mut analysis);
    resolve_targets(path, module, &mut analysis);
    check_variables(path, module, config, &mut analysis);
    check_shape(path, module, config, &mut analysis);

    analysis
}

/// First occurrence wins; later duplicates are recorded and skipped.
fn collect_passages(path: &str, module: &Module, analysis: &mut Analysis) {
    for (idx, passage) in module.passages.iter().enumerate() {
        if let Some(first_span) = analysis.passages.get(&passage.name) {
            analysis.duplicates.insert(idx);
            analysis.diagnostics.push(
                Diagnostic::warning(
                    DiagCode::DuplicatePassage,
                    format!("duplicate passage '{}'; first definition wins", passage.name),
                )
                .with_location(SourceLocation::new(path, passage.span))
                .with_secondary(
                    SourceLocation::new(path, *first_span),
                    "first defined here",
                ),
            );
        } else {
            analysis
                .passages
                .insert(passage.name.clone(), passage.span);
        }
    }
}

fn resolve_start(path: &str, module: &Module, analysis: &mut Analysis) {
    if module.passages.is_empty() {
        analysis
            .diagnostics
            .push(Diagnostic::error(DiagCode::NoPassages, "source has no passages"));
        return;
    }

    let declared = module
        .metadata
        .iter()
        .find(|entry| entry.key == "start")
        .map(|entry| (entry.value.clone(), entry.span));

    match declared {
        Some((name, span)) if !analysis.passages.contains_key(&name) => {
            analysis.diagnostics.push(
                Diagnostic::error(
                    DiagCode::NoStartPassage,
                    format!("declared start passage '{}' does not exist", name),
                )
                .with_location(SourceLocation::new(path, span)),
            );
            analysis.start = module.passages[0].name.clone();
        }
        Some((name, _)) => analysis.start = name,
        None => analysis.start = module.passages[0].name.clone(),
    }
}

fn resolve_targets(path: &str, module: &Module, analysis: &mut Analysis) {
    for passage in &module.passages {
        for node in &passage.body {
            node.walk(&mut |n| {
                let (target, span) = match &n.kind {
                    NodeKind::Choice {
                        target: Some(target),
                        ..
                    } => (target, n.span),
                    NodeKind::Divert { target } => (target, n.span),
                    _ => return,
                };
                if !analysis.passages.contains_key(target) {
                    analysis.diagnostics.push(
                        Diagnostic::warning(
                            DiagCode::UnresolvedTarget,
                            format!("choice or divert targets unknown passage '{}'", target),
                        )
                        .with_location(SourceLocation::new(path, span)),
                    );
                }
            });
        }
    }
}

fn check_variables(path: &str, module: &Module, config: &AnalysisConfig, analysis: &mut Analysis) {
    let mut declared: FxHashMap<&str, SourceSpan> = FxHashMap::default();
    for decl in &module.variables {
        declared.insert(decl.name.as_str(), decl.span);
    }

    let mut assigned: FxHashSet<&str> = FxHashSet::default();
    let mut binders: FxHashSet<&str> = FxHashSet::default();
    let mut read: FxHashSet<String> = FxHashSet::default();
    let mut read_spans: Vec<(String, SourceSpan)> = Vec::new();

    // Loop binders shadow globals inside their bodies. Scoping is tracked
    // per-module: a name used as any binder is never an "undeclared read".
    for passage in &module.passages {
        for node in &passage.body {
            node.walk(&mut |n| {
                if let NodeKind::ForEach { binder, .. } = &n.kind {
                    binders.insert(binder.as_str());
                }
            });
        }
    }

    for passage in &module.passages {
        for node in &passage.body {
            node.walk(&mut |n| {
                if let NodeKind::Assignment { var, .. } = &n.kind {
                    assigned.insert(var.as_str());
                }
                for expr_node in n.exprs() {
                    collect_reads(&expr_node.expr, &binders, n.span, &mut read, &mut read_spans);
                }
                if let NodeKind::Assignment { expr, .. } = &n.kind {
                    collect_reads(&expr.expr, &binders, n.span, &mut read, &mut read_spans);
                }
            });
        }
    }

    if config.warn_unused_variables {
        for (name, span) in &declared {
            if !read.contains(*name) {
                analysis.diagnostics.push(
                    Diagnostic::warning(
                        DiagCode::UnusedVariable,
                        format!("variable '${}' is declared but never read", name),
                    )
                    .with_location(SourceLocation::new(path, *span)),
                );
            }
        }
    }

    for (name, span) in &read_spans {
        if !declared.contains_key(name.as_str()) && !assigned.contains(name.as_str()) {
            analysis.diagnostics.push(
                Diagnostic::hint(
                    DiagCode::UndeclaredVariable,
                    format!("variable '${}' is never assigned; it reads as nil", name),
                )
                .with_location(SourceLocation::new(path, *span)),
            );
        }
    }
}

fn collect_reads(
    expr: &Expr,
    binders: &FxHashSet<&str>,
    span: SourceSpan,
    read: &mut FxHashSet<String>,
    read_spans: &mut Vec<(String, SourceSpan)>,
) {
    match expr {
        Expr::Variable { name } => {
            if !binders.contains(name.as_str()) && !read.contains(name) {
                read.insert(name.clone());
                read_spans.push((name.clone(), span));
            }
        }
        Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
            collect_reads(left, binders, span, read, read_spans);
            collect_reads(right, binders, span, read, read_spans);
        }
        Expr::Unary { operand, .. } => collect_reads(operand, binders, span, read, read_spans),
        Expr::Call { args, .. } => {
            for arg in args {
                collect_reads(arg, binders, span, read, read_spans);
            }
        }
        Expr::ArrayLiteral { items } => {
            for item in items {
                collect_reads(item, binders, span, read, read_spans);
            }
        }
        Expr::MapLiteral { pairs } => {
            for (_, value) in pairs {
                collect_reads(value, binders, span, read, read_spans);
            }
        }
        Expr::Literal { .. } | Expr::Raw { .. } => {}
    }
}

fn check_shape(path: &str, module: &Module, config: &AnalysisConfig, analysis: &mut Analysis) {
    // Reachability from the start passage over choice/divert edges.
    let mut edges: FxHashMap<&str, Vec<String>> = FxHashMap::default();
    for passage in &module.passages {
        let mut targets = Vec::new();
        for node in &passage.body {
            node.walk(&mut |n| match &n.kind {
                NodeKind::Choice {
                    target: Some(t), ..
                } => targets.push(t.clone()),
                NodeKind::Divert { target } => targets.push(target.clone()),
                _ => {}
            });
        }
        edges.insert(passage.name.as_str(), targets);
    }

    let mut stack = vec![analysis.start.clone()];
    let mut reachable: FxHashSet<String> = FxHashSet::default();
    while let Some(name) = stack.pop() {
        if !reachable.insert(name.clone()) {
            continue;
        }
        if let Some(targets) = edges.get(name.as_str()) {
            for target in targets {
                stack.push(target.clone());
            }
        }
    }

    for (idx, passage) in module.passages.iter().enumerate() {
        if analysis.duplicates.contains(&idx) {
            continue;
        }
        let location = SourceLocation::new(path, passage.span);

        if config.warn_unreferenced
            && passage.name != analysis.start
            && !reachable.contains(passage.name.as_str())
        {
            analysis.diagnostics.push(
                Diagnostic::warning(
                    DiagCode::UnreferencedPassage,
                    format!("passage '{}' is unreachable from the start", passage.name),
                )
                .with_location(location.clone()),
            );
        }

        if is_empty_passage(passage) {
            analysis.diagnostics.push(
                Diagnostic::warning(
                    DiagCode::EmptyPassage,
                    format!("passage '{}' has no content", passage.name),
                )
                .with_location(location.clone()),
            );
        }

        let words = word_count(passage);
        if words > config.max_passage_words {
            analysis.diagnostics.push(
                Diagnostic::warning(
                    DiagCode::OverlongPassage,
                    format!(
                        "passage '{}' has {} words (limit {})",
                        passage.name, words, config.max_passage_words
                    ),
                )
                .with_location(location.clone()),
            );
        }

        let choices = choice_count(passage);
        if choices > config.max_choices {
            analysis.diagnostics.push(
                Diagnostic::warning(
                    DiagCode::TooManyChoices,
                    format!(
                        "passage '{}' offers {} choices (limit {})",
                        passage.name, choices, config.max_choices
                    ),
                )
                .with_location(location),
            );
        }
    }
}

fn is_empty_passage(passage: &PassageNode) -> bool {
    passage.body.iter().all(|node| match &node.kind {
        NodeKind::Text { text, .. } => text.trim().is_empty(),
        _ => false,
    })
}

fn word_count(passage: &PassageNode) -> usize {
    let mut count = 0;
    for node in &passage.body {
        node.walk(&mut |n| {
            if let NodeKind::Text { text, .. } = &n.kind {
                count += text.split_whitespace().count();
            }
        });
    }
    count
}

fn choice_count(passage: &PassageNode) -> usize {
    let mut count = 0;
    for node in &passage.body {
        node.walk(&mut |n| {
            if matches!(n.kind, NodeKind::Choice { .. }) {
                count += 1;
            }
        });
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use whisker_base::SourceFile;

    fn analyze_source(source: &str) -> Analysis {
        let file = SourceFile::new("test.ws", source);
        let out = parse(&file);
        analyze("test.ws", &out.module, &AnalysisConfig::default())
    }

    fn codes(analysis: &Analysis) -> Vec<DiagCode> {
        analysis.diagnostics.iter().map(|d| d.code).collect()
    }

    #[test]
    fn linear_story_is_clean() {
        let analysis = analyze_source(":: Start\nHello\n+ [Go] -> End\n\n:: End\nBye\n");
        assert!(analysis.diagnostics.is_empty(), "{:?}", analysis.diagnostics);
        assert_eq!(analysis.start, "Start");
        assert_eq!(analysis.passages.len(), 2);
    }

    #[test]
    fn duplicate_passage_first_wins() {
        let analysis = analyze_source(":: A\none\n-> B\n\n:: B\n\nx\n\n:: A\ntwo\n");
        assert!(codes(&analysis).contains(&DiagCode::DuplicatePassage));
        assert_eq!(analysis.duplicates.len(), 1);
        assert!(analysis.duplicates.contains(&2));
    }

    #[test]
    fn unresolved_target_is_warning_not_error() {
        let analysis = analyze_source(":: Start\n+ [Go] -> Nowhere\n");
        let diag = analysis
            .diagnostics
            .iter()
            .find(|d| d.code == DiagCode::UnresolvedTarget)
            .expect("unresolved target diagnostic");
        assert_eq!(diag.severity, whisker_base::Severity::Warning);
    }

    #[test]
    fn unreachable_passage_is_flagged() {
        let analysis = analyze_source(":: Start\nhi\n\n:: Island\nlost\n");
        assert!(codes(&analysis).contains(&DiagCode::UnreferencedPassage));
    }

    #[test]
    fn reachability_follows_diverts() {
        let analysis = analyze_source(":: Start\n-> Mid\n\n:: Mid\n-> End\n\n:: End\nbye\n");
        assert!(!codes(&analysis).contains(&DiagCode::UnreferencedPassage));
    }

    #[test]
    fn declared_start_metadata_overrides_first_passage() {
        let analysis = analyze_source("@@ start: Real\n\n:: Decoy\nx\n-> Real\n\n:: Real\ny\n");
        assert_eq!(analysis.start, "Real");
    }

    #[test]
    fn missing_declared_start_is_error() {
        let analysis = analyze_source("@@ start: Ghost\n\n:: Start\nx\n");
        assert!(codes(&analysis).contains(&DiagCode::NoStartPassage));
    }

    #[test]
    fn no_passages_is_fatal() {
        let analysis = analyze_source("@@ title: Empty\n");
        assert!(codes(&analysis).contains(&DiagCode::NoPassages));
    }

    #[test]
    fn unused_variable_is_flagged() {
        let analysis = analyze_source("@@ var $ghost = 1\n\n:: Start\nhi\n");
        assert!(codes(&analysis).contains(&DiagCode::UnusedVariable));
    }

    #[test]
    fn used_variable_is_not_flagged() {
        let analysis = analyze_source("@@ var $hp = 1\n\n:: Start\n{$hp}\n");
        assert!(!codes(&analysis).contains(&DiagCode::UnusedVariable));
    }

    #[test]
    fn undeclared_read_is_a_hint() {
        let analysis = analyze_source(":: Start\n{$mystery}\n");
        let diag = analysis
            .diagnostics
            .iter()
            .find(|d| d.code == DiagCode::UndeclaredVariable)
            .expect("undeclared hint");
        assert_eq!(diag.severity, whisker_base::Severity::Hint);
    }

    #[test]
    fn loop_binder_is_not_an_undeclared_read() {
        let analysis =
            analyze_source("@@ var $bag = [1]\n\n:: Start\n{ for x in $bag }\n{x}\n{ endfor }\n");
        assert!(!codes(&analysis).contains(&DiagCode::UndeclaredVariable));
        assert!(!codes(&analysis).contains(&DiagCode::UnusedVariable));
    }

    #[test]
    fn empty_passage_is_flagged() {
        let analysis = analyze_source(":: Start\n-> End\n\n:: End\n\n");
        assert!(codes(&analysis).contains(&DiagCode::EmptyPassage));
    }

    #[test]
    fn too_many_choices_respects_config() {
        let mut source = String::from(":: Start\n");
        for i in 0..4 {
            source.push_str(&format!("+ [c{}] -> Start\n", i));
        }
        let file = SourceFile::new("test.ws", source);
        let out = parse(&file);
        let config = AnalysisConfig {
            max_choices: 3,
            ..AnalysisConfig::default()
        };
        let analysis = analyze("test.ws", &out.module, &config);
        assert!(codes(&analysis).contains(&DiagCode::TooManyChoices));
    }
}
