//! The Drift compile pipeline, as a library.
//!
//! The CLI binary and the language server both drive compilations through
//! [`compile`]; tests use [`compile_source`] with an in-memory provider.

pub mod pipeline;

pub use pipeline::{compile, compile_source, CompileOptions, CompileResult, Outcome};
