//! # whisker-compile
//!
//! The back half of the WhiskerScript front end: lowering the analyzed AST
//! into the Story IR, with optional Source Map v3 output.
//!
//! - [`compile`] — the one-call pipeline (lex → parse → analyze → lower)
//! - [`codegen`] — AST-to-IR lowering
//! - [`sourcemap`] — VLQ-encoded Source Map v3 builder and resolver

pub mod codegen;
pub mod compile;
pub mod sourcemap;

pub use compile::{compile, CompileOptions, CompileResult};
pub use sourcemap::{Mapping, SourceMapBuilder, SourceMapV3};
