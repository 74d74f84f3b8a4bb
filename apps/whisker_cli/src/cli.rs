//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// How diagnostics and results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "whisker",
    version,
    about = "Compile, format, lint, and convert Whisker stories"
)]
pub struct Cli {
    /// Output format for diagnostics and results.
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compile WhiskerScript to Story IR JSON.
    Compile {
        /// Source files.
        files: Vec<PathBuf>,
        /// Emit a Source Map v3 document next to the output.
        #[arg(long)]
        source_map: bool,
        /// Write the IR here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Format WhiskerScript sources canonically.
    Fmt {
        files: Vec<PathBuf>,
        /// Exit nonzero when files would change, without writing.
        #[arg(long)]
        check: bool,
        /// Print a diff instead of the formatted text.
        #[arg(long)]
        diff: bool,
        /// Read from stdin, write to stdout.
        #[arg(long)]
        stdin: bool,
        /// Rewrite the files in place.
        #[arg(long)]
        write: bool,
    },

    /// Lint WhiskerScript sources.
    Lint {
        files: Vec<PathBuf>,
        /// Apply the mechanical fixes before linting.
        #[arg(long)]
        fix: bool,
        /// Only report errors.
        #[arg(long)]
        quiet: bool,
        /// Fail when more than this many warnings are produced.
        #[arg(long)]
        max_warnings: Option<usize>,
        /// Path to a `.whisker-lint.json` config.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Import a story (Twine HTML, Ink JSON, WhiskerScript) to IR JSON.
    Import {
        file: PathBuf,
        /// Format hint (name or extension); detected from content if
        /// omitted.
        #[arg(long)]
        from: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export an IR JSON story to another format.
    Export {
        file: PathBuf,
        /// Target format: whisker, harlowe, sugarcube, chapbook, snowman,
        /// ink.
        #[arg(long)]
        to: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Compact output (no extra whitespace).
        #[arg(long)]
        compact: bool,
    },
}
