//! Type inference for Drift.
//!
//! Inference is monotone refinement toward a fixed point: every pass walks
//! each line's expression tree bottom-up and lets types flow -- literals
//! seed `Numeric`, variables pick up what `store` assigned them, calls
//! monomorphize per argument type tuple, macros substitute call-site
//! expressions for their parameters. Passes repeat until nothing changes
//! (or the cap is hit), then leftover `Numeric` defaults to sized integers
//! and validation reports whatever stayed untyped or ill-typed.

pub mod infer;
pub mod intrinsics;
pub mod validate;

pub use infer::{infer, InferOptions};
