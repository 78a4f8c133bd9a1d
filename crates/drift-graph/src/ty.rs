use std::fmt;

use serde::Serialize;

use crate::ids::{ClassId, Range};

/// Opaque handle to a backend (LLVM) function. Only the external code
/// generator assigns and interprets these; the pipeline merely stores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct BackendFunction(pub u32);

/// Opaque handle to a backend basic block, used for the control-flow wiring
/// that section intrinsics (`loop while`, `if`, ...) record on their section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BackendBlock(pub u32);

/// The shape of a [`Type`], before indirection is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum TypeKind {
    /// Not yet deduced. Refines to anything.
    Undeduced,
    Void,
    Bool,
    /// An integer literal whose size is still open. Refines to any `Integer`
    /// or `Float`.
    Numeric,
    Integer,
    Float,
    String,
    /// An instance of a class, with the instantiation index when known.
    Class(ClassId, Option<u32>),
    /// The class itself, as produced by naming a class pattern. Used by
    /// `construct` and `cast`.
    TypeReference(ClassId),
}

/// A Drift type: a kind, a byte size (integers 1/2/4/8, floats 4/8, otherwise
/// 0) and a pointer depth (0 = value, 1 = pointer, ...).
///
/// Types are plain values ordered lexicographically so they can key the
/// per-section instantiation maps deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Type {
    pub kind: TypeKind,
    pub byte_size: u8,
    pub pointer_depth: u32,
}

impl Default for Type {
    fn default() -> Self {
        Type::undeduced()
    }
}

impl Type {
    pub const fn undeduced() -> Type {
        Type { kind: TypeKind::Undeduced, byte_size: 0, pointer_depth: 0 }
    }

    pub const fn void() -> Type {
        Type { kind: TypeKind::Void, byte_size: 0, pointer_depth: 0 }
    }

    pub const fn boolean() -> Type {
        Type { kind: TypeKind::Bool, byte_size: 0, pointer_depth: 0 }
    }

    pub const fn numeric() -> Type {
        Type { kind: TypeKind::Numeric, byte_size: 0, pointer_depth: 0 }
    }

    pub const fn integer(byte_size: u8) -> Type {
        Type { kind: TypeKind::Integer, byte_size, pointer_depth: 0 }
    }

    pub const fn float(byte_size: u8) -> Type {
        Type { kind: TypeKind::Float, byte_size, pointer_depth: 0 }
    }

    pub const fn string() -> Type {
        Type { kind: TypeKind::String, byte_size: 0, pointer_depth: 0 }
    }

    pub const fn class(class: ClassId, instantiation: Option<u32>) -> Type {
        Type { kind: TypeKind::Class(class, instantiation), byte_size: 0, pointer_depth: 0 }
    }

    pub const fn type_reference(class: ClassId) -> Type {
        Type { kind: TypeKind::TypeReference(class), byte_size: 0, pointer_depth: 0 }
    }

    pub fn is_deduced(&self) -> bool {
        self.kind != TypeKind::Undeduced
    }

    pub fn is_pointer(&self) -> bool {
        self.pointer_depth > 0
    }

    pub fn is_numeric(&self) -> bool {
        self.pointer_depth == 0
            && matches!(self.kind, TypeKind::Numeric | TypeKind::Integer | TypeKind::Float)
    }

    /// Whether this type may be overwritten by the more specific `target`.
    ///
    /// `Undeduced` refines to anything; `Numeric` refines to any sized
    /// integer or float; a sized kind with `byte_size == 0` refines within
    /// its own kind. Pointer depths must agree.
    pub fn can_refine_to(&self, target: &Type) -> bool {
        if !self.is_deduced() {
            return true;
        }
        if self.pointer_depth != target.pointer_depth {
            return false;
        }
        if self.kind == TypeKind::Numeric
            && matches!(target.kind, TypeKind::Integer | TypeKind::Float)
        {
            return true;
        }
        if self.kind == target.kind
            && matches!(self.kind, TypeKind::Integer | TypeKind::Float)
            && self.byte_size == 0
        {
            return true;
        }
        false
    }

    /// This type with one more level of indirection.
    pub fn pointed(&self) -> Type {
        Type { pointer_depth: self.pointer_depth + 1, ..*self }
    }

    /// This type with one less level of indirection. Callers check
    /// [`Type::is_pointer`] first.
    pub fn dereferenced(&self) -> Type {
        Type { pointer_depth: self.pointer_depth.saturating_sub(1), ..*self }
    }

    /// Promote two numeric types for arithmetic. Float wins over Integer; on
    /// a size mismatch the larger size wins; `Numeric` adapts to the other
    /// operand.
    pub fn promote(a: Type, b: Type) -> Type {
        if a.kind == TypeKind::Float || b.kind == TypeKind::Float {
            let a_size = if a.kind == TypeKind::Float { a.byte_size } else { 0 };
            let b_size = if b.kind == TypeKind::Float { b.byte_size } else { 0 };
            let mut float_size = a_size.max(b_size);
            // Mixing Integer and Float uses the larger of both sizes so an
            // i64 + f32 produces an f64 rather than losing precision.
            if a.kind == TypeKind::Integer || b.kind == TypeKind::Integer {
                let int_size = if a.kind == TypeKind::Integer { a.byte_size } else { b.byte_size };
                float_size = float_size.max(int_size);
            }
            return Type::float(float_size);
        }
        if a.kind == TypeKind::Integer || b.kind == TypeKind::Integer {
            let a_size = if a.kind == TypeKind::Integer { a.byte_size } else { 0 };
            let b_size = if b.kind == TypeKind::Integer { b.byte_size } else { 0 };
            return Type::integer(a_size.max(b_size));
        }
        if a.kind == TypeKind::Numeric || b.kind == TypeKind::Numeric {
            return Type::numeric();
        }
        Type::undeduced()
    }

    /// Promote for arithmetic including pointer + integer -> pointer.
    pub fn promote_arithmetic(a: Type, b: Type) -> Type {
        if a.is_pointer() && (b.is_numeric() || !b.is_deduced()) {
            return a;
        }
        if b.is_pointer() && (a.is_numeric() || !a.is_deduced()) {
            return b;
        }
        Type::promote(a, b)
    }

    /// Parse a primitive type name (`void`, `bool`, `i8`..`i64`, `f32`,
    /// `f64`, `pointer`, `string`). Class names are resolved separately
    /// against the expression trie.
    pub fn from_name(name: &str) -> Option<Type> {
        Some(match name {
            "void" => Type::void(),
            "bool" => Type::boolean(),
            "i8" => Type::integer(1),
            "i16" => Type::integer(2),
            "i32" => Type::integer(4),
            "i64" => Type::integer(8),
            "f32" => Type::float(4),
            "f64" => Type::float(8),
            "pointer" => Type::integer(8).pointed(),
            "string" => Type::string(),
            _ => return None,
        })
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for _ in 0..self.pointer_depth {
            write!(f, "pointer to ")?;
        }
        match self.kind {
            TypeKind::Undeduced => write!(f, "undeduced"),
            TypeKind::Void => write!(f, "void"),
            TypeKind::Bool => write!(f, "bool"),
            TypeKind::Numeric => write!(f, "numeric"),
            TypeKind::Integer => match self.byte_size {
                1 => write!(f, "i8"),
                2 => write!(f, "i16"),
                4 => write!(f, "i32"),
                8 => write!(f, "i64"),
                _ => write!(f, "integer"),
            },
            TypeKind::Float => match self.byte_size {
                4 => write!(f, "f32"),
                8 => write!(f, "f64"),
                _ => write!(f, "float"),
            },
            TypeKind::String => write!(f, "string"),
            TypeKind::Class(id, _) => write!(f, "class#{}", id.0),
            TypeKind::TypeReference(id) => write!(f, "type class#{}", id.0),
        }
    }
}

/// A declared field of a class.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub range: Range,
    /// `Undeduced` when the declaration carried no `as <type>` clause.
    pub declared_type: Type,
}

/// One structural monomorphization of a class: the concrete field types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInstantiation {
    pub field_types: Vec<Type>,
}

/// A class: its fields, its structural instantiations and its alignment.
///
/// Classes monomorphize the way functions do: each distinct tuple of field
/// types used at a `construct` site becomes one [`ClassInstantiation`].
#[derive(Debug, Clone, Default)]
pub struct ClassDefinition {
    pub fields: Vec<FieldDef>,
    pub instantiations: Vec<ClassInstantiation>,
    /// Struct alignment in bytes; 0 means natural alignment.
    pub alignment: u32,
}

impl ClassDefinition {
    /// Find or create the instantiation with the given field types and
    /// return its index.
    pub fn get_or_create_instantiation(&mut self, field_types: Vec<Type>) -> u32 {
        if let Some(idx) = self
            .instantiations
            .iter()
            .position(|inst| inst.field_types == field_types)
        {
            return idx as u32;
        }
        self.instantiations.push(ClassInstantiation { field_types });
        (self.instantiations.len() - 1) as u32
    }
}

/// Per-call-site-type-tuple state of a non-macro pattern.
///
/// Keyed by the argument type vector in the owning section's instantiation
/// map; the return type is deduced by inference and the backend function is
/// assigned by the external code generator afterwards.
#[derive(Debug, Clone, Default)]
pub struct Instantiation {
    pub return_type: Type,
    pub backend_fn: Option<BackendFunction>,
}
