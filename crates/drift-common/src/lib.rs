//! Shared foundation types for the Drift compiler.
//!
//! Everything in this crate is consumed by every later stage: source file
//! handles and the [`FileProvider`] abstraction, resolved source spans, the
//! append-only diagnostic collector, and the cooperative cancellation flag.

pub mod cancel;
pub mod diagnostic;
pub mod source;
pub mod span;

pub use cancel::CancelFlag;
pub use diagnostic::{Diagnostic, Diagnostics, Severity};
pub use source::{DiskProvider, FileId, FileProvider, MemoryProvider, SourceFile};
pub use span::{LineCol, SourceSpan};
