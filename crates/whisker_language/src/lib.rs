//! # whisker-language
//!
//! The WhiskerScript front end: lexer, parser, semantic analyzer, and the
//! formatter/linter built on top of them.
//!
//! # Pipeline
//!
//! ```text
//! WhiskerScript source
//!       │
//!       ▼
//! ┌───────────────────┐
//! │  Lexer            │ line-oriented tokens with spans
//! └─────────┬─────────┘
//!           ▼
//! ┌───────────────────┐
//! │  Parser           │ spanned AST, error recovery
//! └─────────┬─────────┘
//!           ▼
//! ┌───────────────────┐
//! │  Analysis         │ symbol table, target resolution, lints
//! └─────────┬─────────┘
//!           ▼
//!   annotated AST (consumed by whisker-compile)
//! ```
//!
//! Every stage collects diagnostics instead of failing; even badly broken
//! sources produce a best-effort AST.

pub mod analysis;
pub mod ast;
pub mod formatter;
pub mod lexer;
pub mod lint;
pub mod parser;
pub mod token;

pub use analysis::{analyze, Analysis, AnalysisConfig};
pub use formatter::{
    format_source, load_fmt_config, print_expr, print_module, FmtConfig, FormatResult,
};
pub use lexer::{lex, LexOutput};
pub use lint::{fix_source, lint_source, load_lint_config, LintConfig};
pub use parser::{parse, ParseOutput};
pub use token::{Token, TokenKind};
