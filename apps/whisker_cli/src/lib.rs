//! # whisker-cli
//!
//! The `whisker` binary: compile, fmt, lint, import, and export commands
//! over the Whisker core crates. All user-facing behavior lives here in
//! library form so it can be tested without spawning processes; `main.rs`
//! is a thin wrapper.
//!
//! Exit codes follow the usual linter convention: 0 success, 1 warnings,
//! 2 errors.

pub mod cli;

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use whisker_base::{format_diagnostics, has_errors, Diagnostic, ReportMode, Severity, SourceFile};
use whisker_compile::{compile, CompileOptions};
use whisker_format::{export as export_story, import as import_story, ExportOptions};
use whisker_language::{
    fix_source, format_source, lint_source, load_fmt_config, load_lint_config, FmtConfig,
    LintConfig,
};
use whisker_story::{from_json, to_canonical_json};

use cli::{Cli, Command, OutputFormat};

/// Exit code for a clean run.
pub const EXIT_OK: i32 = 0;
/// Exit code when warnings were reported (or `--check` found drift).
pub const EXIT_WARNINGS: i32 = 1;
/// Exit code for errors.
pub const EXIT_ERRORS: i32 = 2;

/// Runs a parsed command line; returns the process exit code.
pub fn run(cli: Cli) -> i32 {
    match cli.command {
        Command::Compile {
            ref files,
            source_map,
            ref output,
        } => run_compile(files, source_map, output.as_deref(), cli.format),
        Command::Fmt {
            ref files,
            check,
            diff,
            stdin,
            write,
        } => run_fmt(files, check, diff, stdin, write),
        Command::Lint {
            ref files,
            fix,
            quiet,
            max_warnings,
            ref config,
        } => run_lint(files, fix, quiet, max_warnings, config.as_deref(), cli.format),
        Command::Import {
            ref file,
            ref from,
            ref output,
        } => run_import(file, from.as_deref(), output.as_deref(), cli.format),
        Command::Export {
            ref file,
            ref to,
            ref output,
            compact,
        } => run_export(file, to, output.as_deref(), compact, cli.format),
    }
}

fn report_mode(format: OutputFormat) -> ReportMode {
    match format {
        OutputFormat::Text => ReportMode::Annotated,
        OutputFormat::Json => ReportMode::Json,
    }
}

fn print_diagnostics(diags: &[Diagnostic], format: OutputFormat, files: &[&SourceFile]) {
    if diags.is_empty() {
        return;
    }
    eprintln!("{}", format_diagnostics(diags, report_mode(format), files));
}

fn exit_code_for(diags: &[Diagnostic]) -> i32 {
    if has_errors(diags) {
        EXIT_ERRORS
    } else if diags.iter().any(|d| d.severity == Severity::Warning) {
        EXIT_WARNINGS
    } else {
        EXIT_OK
    }
}

fn read_file(path: &Path) -> Result<String, i32> {
    fs::read_to_string(path).map_err(|err| {
        eprintln!("error: cannot read {}: {}", path.display(), err);
        EXIT_ERRORS
    })
}

fn write_output(path: Option<&Path>, content: &str) -> i32 {
    match path {
        Some(path) => match fs::write(path, content) {
            Ok(()) => EXIT_OK,
            Err(err) => {
                eprintln!("error: cannot write {}: {}", path.display(), err);
                EXIT_ERRORS
            }
        },
        None => {
            println!("{}", content);
            EXIT_OK
        }
    }
}

// ---------------------------------------------------------------------------
// compile
// ---------------------------------------------------------------------------

fn run_compile(
    files: &[PathBuf],
    source_map: bool,
    output: Option<&Path>,
    format: OutputFormat,
) -> i32 {
    let mut worst = EXIT_OK;

    for path in files {
        let source = match read_file(path) {
            Ok(source) => source,
            Err(code) => return code,
        };

        let options = CompileOptions {
            path: Some(path.display().to_string()),
            emit_source_map: source_map,
            ..CompileOptions::default()
        };
        let result = compile(&source, &options);

        let file = SourceFile::new(path.display().to_string(), source);
        print_diagnostics(&result.diagnostics, format, &[&file]);

        if result.is_fatal() {
            worst = worst.max(EXIT_ERRORS);
            continue;
        }

        let json = match to_canonical_json(&result.story) {
            Ok(json) => json,
            Err(err) => {
                eprintln!("error: serialization failed: {}", err);
                return EXIT_ERRORS;
            }
        };
        let code = write_output(output, &json);
        if code != EXIT_OK {
            return code;
        }

        if let Some(map) = result.source_map {
            let map_json = serde_json::to_string_pretty(&map).unwrap_or_default();
            let map_path = match output {
                Some(out) => Some(out.with_extension("json.map")),
                None => None,
            };
            let code = write_output(map_path.as_deref(), &map_json);
            if code != EXIT_OK {
                return code;
            }
        }

        worst = worst.max(exit_code_for(&result.diagnostics));
    }

    worst
}

// ---------------------------------------------------------------------------
// fmt
// ---------------------------------------------------------------------------

/// Looks for `.whisker-fmt.json` next to the file, then in the current
/// directory. Unknown keys are reported as warnings.
fn discover_fmt_config(near: Option<&Path>) -> FmtConfig {
    let mut candidates = Vec::new();
    if let Some(path) = near.and_then(Path::parent) {
        candidates.push(path.join(".whisker-fmt.json"));
    }
    candidates.push(PathBuf::from(".whisker-fmt.json"));

    for candidate in candidates {
        if let Ok(text) = fs::read_to_string(&candidate) {
            let (config, diags) = load_fmt_config(&text);
            print_diagnostics(&diags, OutputFormat::Text, &[]);
            return config;
        }
    }
    FmtConfig::default()
}

fn run_fmt(files: &[PathBuf], check: bool, diff: bool, stdin: bool, write: bool) -> i32 {
    if stdin {
        let mut source = String::new();
        if std::io::stdin().read_to_string(&mut source).is_err() {
            eprintln!("error: cannot read stdin");
            return EXIT_ERRORS;
        }
        let result = format_source("<stdin>", &source, &discover_fmt_config(None));
        print!("{}", result.text);
        return if has_errors(&result.diagnostics) {
            EXIT_ERRORS
        } else {
            EXIT_OK
        };
    }

    let mut worst = EXIT_OK;
    for path in files {
        let source = match read_file(path) {
            Ok(source) => source,
            Err(code) => return code,
        };
        let config = discover_fmt_config(Some(path));
        let result = format_source(&path.display().to_string(), &source, &config);

        if has_errors(&result.diagnostics) {
            let file = SourceFile::new(path.display().to_string(), source);
            print_diagnostics(&result.diagnostics, OutputFormat::Text, &[&file]);
            worst = worst.max(EXIT_ERRORS);
            continue;
        }

        if check {
            if result.changed {
                println!("would reformat {}", path.display());
                worst = worst.max(EXIT_WARNINGS);
            }
        } else if diff {
            if result.changed {
                print!("{}", unified_diff(&source, &result.text, &path.display().to_string()));
                worst = worst.max(EXIT_WARNINGS);
            }
        } else if write {
            if result.changed && fs::write(path, &result.text).is_err() {
                eprintln!("error: cannot write {}", path.display());
                return EXIT_ERRORS;
            }
        } else {
            print!("{}", result.text);
        }
    }
    worst
}

/// A minimal line diff: changed runs print as `-`/`+` blocks with line
/// numbers. Enough for `--diff`; not a patch format.
fn unified_diff(before: &str, after: &str, path: &str) -> String {
    let old_lines: Vec<&str> = before.lines().collect();
    let new_lines: Vec<&str> = after.lines().collect();
    let mut out = format!("--- {}\n+++ {} (formatted)\n", path, path);

    let max = old_lines.len().max(new_lines.len());
    for i in 0..max {
        let old = old_lines.get(i);
        let new = new_lines.get(i);
        if old != new {
            if let Some(old) = old {
                out.push_str(&format!("-{:>4} {}\n", i + 1, old));
            }
            if let Some(new) = new {
                out.push_str(&format!("+{:>4} {}\n", i + 1, new));
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// lint
// ---------------------------------------------------------------------------

fn load_config_for_lint(explicit: Option<&Path>, near: Option<&Path>) -> (LintConfig, Vec<Diagnostic>) {
    let mut candidates = Vec::new();
    if let Some(path) = explicit {
        candidates.push(path.to_path_buf());
    } else {
        if let Some(parent) = near.and_then(Path::parent) {
            candidates.push(parent.join(".whisker-lint.json"));
        }
        candidates.push(PathBuf::from(".whisker-lint.json"));
    }

    for candidate in candidates {
        if let Ok(text) = fs::read_to_string(&candidate) {
            return load_lint_config(&text);
        }
    }
    (LintConfig::default(), Vec::new())
}

fn run_lint(
    files: &[PathBuf],
    fix: bool,
    quiet: bool,
    max_warnings: Option<usize>,
    config_path: Option<&Path>,
    format: OutputFormat,
) -> i32 {
    let mut worst = EXIT_OK;
    let mut total_warnings = 0usize;

    for path in files {
        let mut source = match read_file(path) {
            Ok(source) => source,
            Err(code) => return code,
        };

        let (config, mut diags) = load_config_for_lint(config_path, Some(path));

        if fix {
            let fixed = fix_source(&source);
            if fixed != source {
                if fs::write(path, &fixed).is_err() {
                    eprintln!("error: cannot write {}", path.display());
                    return EXIT_ERRORS;
                }
                source = fixed;
            }
        }

        diags.extend(lint_source(&path.display().to_string(), &source, &config));

        if quiet {
            diags.retain(|d| d.severity == Severity::Error);
        }
        total_warnings += diags
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count();

        let file = SourceFile::new(path.display().to_string(), source);
        print_diagnostics(&diags, format, &[&file]);
        worst = worst.max(exit_code_for(&diags));
    }

    if let Some(limit) = max_warnings {
        if total_warnings > limit {
            eprintln!("error: {} warnings (limit {})", total_warnings, limit);
            worst = worst.max(EXIT_ERRORS);
        }
    }
    worst
}

// ---------------------------------------------------------------------------
// import / export
// ---------------------------------------------------------------------------

fn run_import(
    file: &Path,
    from: Option<&str>,
    output: Option<&Path>,
    format: OutputFormat,
) -> i32 {
    let source = match read_file(file) {
        Ok(source) => source,
        Err(code) => return code,
    };

    let hint = from.map(str::to_string).or_else(|| {
        file.extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_string)
    });
    let result = import_story(&source, hint.as_deref());

    let src_file = SourceFile::new(file.display().to_string(), source);
    print_diagnostics(&result.diagnostics, format, &[&src_file]);

    let Some(story) = result.story else {
        return EXIT_ERRORS;
    };
    let json = match to_canonical_json(&story) {
        Ok(json) => json,
        Err(err) => {
            eprintln!("error: serialization failed: {}", err);
            return EXIT_ERRORS;
        }
    };
    let code = write_output(output, &json);
    code.max(exit_code_for(&result.diagnostics))
}

fn run_export(
    file: &Path,
    to: &str,
    output: Option<&Path>,
    compact: bool,
    format: OutputFormat,
) -> i32 {
    let source = match read_file(file) {
        Ok(source) => source,
        Err(code) => return code,
    };
    let story = match from_json(&source) {
        Ok(story) => story,
        Err(err) => {
            eprintln!("error: {} is not Story IR JSON: {}", file.display(), err);
            return EXIT_ERRORS;
        }
    };

    let options = ExportOptions {
        pretty: !compact,
        ..ExportOptions::default()
    };
    let result = export_story(&story, to, &options);
    print_diagnostics(&result.diagnostics, format, &[]);

    if has_errors(&result.diagnostics) {
        return EXIT_ERRORS;
    }
    let code = write_output(output, &result.content);
    code.max(exit_code_for(&result.diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn temp_story(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("story.ws");
        let mut file = fs::File::create(&path).expect("create");
        file.write_all(content.as_bytes()).expect("write");
        (dir, path)
    }

    const CLEAN: &str = ":: Start\nHello\n+ [Go] -> End\n\n:: End\nBye\n";

    #[test]
    fn compile_clean_story_exits_zero() {
        let (_dir, path) = temp_story(CLEAN);
        let code = run_compile(&[path], false, None, OutputFormat::Text);
        assert_eq!(code, EXIT_OK);
    }

    #[test]
    fn compile_writes_ir_to_output_file() {
        let (dir, path) = temp_story(CLEAN);
        let out = dir.path().join("story.json");
        let code = run_compile(&[path], false, Some(&out), OutputFormat::Text);
        assert_eq!(code, EXIT_OK);
        let json = fs::read_to_string(&out).expect("output written");
        let story = from_json(&json).expect("valid IR");
        assert_eq!(story.passage_count(), 2);
    }

    #[test]
    fn compile_missing_file_exits_two() {
        let code = run_compile(
            &[PathBuf::from("/no/such/file.ws")],
            false,
            None,
            OutputFormat::Text,
        );
        assert_eq!(code, EXIT_ERRORS);
    }

    #[test]
    fn lint_dangling_target_exits_one() {
        let (_dir, path) = temp_story(":: Start\n+ [Go] -> Nowhere\n");
        let code = run_lint(&[path], false, false, None, None, OutputFormat::Text);
        assert_eq!(code, EXIT_WARNINGS);
    }

    #[test]
    fn lint_max_warnings_escalates_to_error() {
        let (_dir, path) = temp_story(":: Start\n+ [Go] -> Nowhere\n");
        let code = run_lint(&[path], false, false, Some(0), None, OutputFormat::Text);
        assert_eq!(code, EXIT_ERRORS);
    }

    #[test]
    fn fmt_check_flags_unformatted_files() {
        let (_dir, path) = temp_story("::   Start\nhi\n");
        let code = run_fmt(&[path], true, false, false, false);
        assert_eq!(code, EXIT_WARNINGS);
    }

    #[test]
    fn fmt_write_makes_check_clean() {
        let (_dir, path) = temp_story("::   Start\nhi\n");
        assert_eq!(run_fmt(&[path.clone()], false, false, false, true), EXIT_OK);
        assert_eq!(run_fmt(&[path], true, false, false, false), EXIT_OK);
    }

    #[test]
    fn lint_fix_rewrites_trailing_whitespace() {
        let (_dir, path) = temp_story(":: Start\nHello   \n+ [Go] -> End\n\n:: End\nx\n");
        let code = run_lint(&[path.clone()], true, false, None, None, OutputFormat::Text);
        assert_eq!(code, EXIT_OK);
        let fixed = fs::read_to_string(&path).unwrap();
        assert!(!fixed.contains("Hello   \n"));
    }

    #[test]
    fn import_twine_html_produces_ir() {
        let html = r#"<tw-storydata name="T" startnode="1" ifid="X" format="Harlowe"><tw-passagedata pid="1" name="Start">(set: $x to 2)</tw-passagedata></tw-storydata>"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("story.html");
        fs::write(&path, html).unwrap();
        let out = dir.path().join("out.json");

        let code = run_import(&path, None, Some(&out), OutputFormat::Text);
        assert_eq!(code, EXIT_OK);
        let story = from_json(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(story.metadata.title, "T");
    }

    #[test]
    fn export_roundtrip_through_ink() {
        let (dir, path) = temp_story(CLEAN);
        let ir = dir.path().join("story.json");
        assert_eq!(
            run_compile(&[path], false, Some(&ir), OutputFormat::Text),
            EXIT_OK
        );

        let ink_out = dir.path().join("story.ink.json");
        let code = run_export(&ir, "ink", Some(&ink_out), false, OutputFormat::Text);
        assert_eq!(code, EXIT_OK);
        let ink: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&ink_out).unwrap()).unwrap();
        assert_eq!(ink["inkVersion"], 20);
    }

    #[test]
    fn export_unknown_format_exits_two() {
        let (dir, path) = temp_story(CLEAN);
        let ir = dir.path().join("story.json");
        run_compile(&[path], false, Some(&ir), OutputFormat::Text);
        let code = run_export(&ir, "docx", None, false, OutputFormat::Text);
        assert_eq!(code, EXIT_ERRORS);
    }
}
