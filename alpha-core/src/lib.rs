//! Core of the Alpha compiler.
//!
//! The pipeline is:
//!
//!   source .al
//!     -> lexer        (tokens)
//!     -> parser       (untyped AST; expressions via shunting-yard)
//!     -> typecheck    (names, overloads, casts -> typed HIR)
//!     -> codegen_llvm (textual LLVM IR through the `ir` builder)
//!
//! The CLI depends on this crate rather than reimplementing the pipeline.

// ---------------------------------------------------------------------
// Error handling and diagnostics
// ---------------------------------------------------------------------

pub mod span;
pub mod diagnostic;
pub mod error;
pub mod config;

// ---------------------------------------------------------------------
// Front-end: lexing and parsing
// ---------------------------------------------------------------------

pub mod lexer;
pub mod operators;
pub mod expr_parser;
pub mod parser;
pub mod ast;

// ---------------------------------------------------------------------
// Semantic layers: types, casts, names, type checking, HIR
// ---------------------------------------------------------------------

pub mod types;
pub mod coerce;
pub mod cast;
pub mod mangle;
pub mod resolver;
pub mod typecheck;
pub mod hir;

// ---------------------------------------------------------------------
// Back-end: code generation and compiler orchestration
// ---------------------------------------------------------------------

pub mod ir;
pub mod codegen_llvm;
pub mod sources;
pub mod compiler;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use compiler::{CompileOutput, compile_dir, compile_files, compile_source, parse_files};
pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use sources::{SourceFile, load_sources};
