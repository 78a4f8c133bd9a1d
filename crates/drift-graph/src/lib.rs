//! The Drift program graph.
//!
//! Every entity the pipeline produces -- code lines, sections, pattern
//! definitions and references, expressions, variables, matches -- lives in an
//! arena owned by [`ProgramGraph`] and is addressed by a `u32` id newtype.
//! Nothing moves after allocation and cross-references are always ids, never
//! pointers, so the mutually referential shape of the data (sections own
//! lines, lines point back at sections, pattern references point at
//! expressions that point back) stays borrow-checker friendly.
//!
//! The pattern trie owns its nodes in a separate arena ([`trie::Tries`]); it
//! is rebuilt alongside the graph on every compilation.

pub mod element;
pub mod expr;
pub mod graph;
pub mod ids;
pub mod transform;
pub mod trie;
pub mod ty;

pub use element::PatternElement;
pub use expr::{ExprKind, Expression, Literal};
pub use graph::{
    CodeLine, PatternDef, PatternKind, PatternRef, ProgramGraph, Section, SectionKind, Variable,
    VarRef,
};
pub use ids::{
    ClassId, DefId, ExprId, LineId, MatchId, NodeId, Range, RefId, SectionId, VarId, VarRefId,
};
pub use transform::{TransformedText, ARGUMENT_CHAR};
pub use trie::{PatternMatch, PatternTrie, TrieNode, Tries, VariableMatch, WordMatch};
pub use ty::{
    BackendBlock, BackendFunction, ClassDefinition, ClassInstantiation, FieldDef, Instantiation,
    Type, TypeKind,
};
