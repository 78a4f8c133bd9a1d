use crate::ids::{ExprId, MatchId, Range, RefId, VarRefId};
use crate::ty::Type;

/// A literal value embedded in a line.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
}

/// What an [`Expression`] node is.
///
/// Expressions are created as `Pending` by the line parser and rewritten in
/// place by the resolver once their pattern reference matched (or was
/// promoted to a variable). After expansion no `Pending` node remains
/// anywhere in a successful compilation.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    /// A variable occurrence. The reference is filled during expansion.
    Variable(Option<VarRefId>),
    /// A resolved call of a user pattern.
    PatternCall(MatchId),
    /// `@intrinsic("name", ...)`. The name literal stays in `args[0]`.
    IntrinsicCall(String),
    /// Not yet resolved; becomes a `PatternCall`, `Variable` or collapses
    /// into its intrinsic argument.
    Pending(RefId),
}

/// One node of a line's expression tree.
#[derive(Debug, Clone)]
pub struct Expression {
    pub id: ExprId,
    pub kind: ExprKind,
    /// Refined by type inference; `Undeduced` until then.
    pub ty: Type,
    pub range: Range,
    pub args: Vec<ExprId>,
}

impl Expression {
    pub fn is_pending(&self) -> bool {
        matches!(self.kind, ExprKind::Pending(_))
    }

    /// The intrinsic name, if this is an intrinsic call.
    pub fn intrinsic_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::IntrinsicCall(name) => Some(name),
            _ => None,
        }
    }

    /// The string payload, if this is a string literal.
    pub fn as_str_literal(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Literal(Literal::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// The integer payload, if this is an integer literal.
    pub fn as_int_literal(&self) -> Option<i64> {
        match &self.kind {
            ExprKind::Literal(Literal::Int(v)) => Some(*v),
            _ => None,
        }
    }
}
