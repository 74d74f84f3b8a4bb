//! # whisker-base
//!
//! Source text and diagnostic atoms for the Whisker story pipeline.
//!
//! This crate provides the foundational types used by every other whisker
//! crate:
//!
//! - [`SourcePosition`]/[`SourceSpan`]/[`SourceLocation`] — source locations
//! - [`SourceFile`] — file content with a lazy line index and snippet rendering
//! - [`Diagnostic`]/[`DiagCode`]/[`Severity`] — problem reports with stable codes
//! - [`format_diagnostics`] — text, annotated, and JSON report modes
//!
//! # Design Principles
//!
//! This crate knows nothing about stories, passages, or formats. Compile
//! stages collect diagnostics and return them next to partial results; the
//! library never writes to stdout or stderr itself.

pub mod diagnostic;
pub mod report;
pub mod source;
pub mod span;

pub use diagnostic::{has_errors, max_severity, DiagCode, Diagnostic, Severity};
pub use report::{format_diagnostics, ReportMode};
pub use source::SourceFile;
pub use span::{SourceLocation, SourcePosition, SourceSpan};
