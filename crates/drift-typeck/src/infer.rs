//! The fixed-point inference pass.

use drift_common::{CancelFlag, Diagnostics};
use drift_graph::{
    ExprKind, ExprId, Literal, ProgramGraph, SectionId, SectionKind, Tries, Type, TypeKind,
};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::intrinsics;
use crate::validate;

#[derive(Debug, Clone)]
pub struct InferOptions {
    /// Bound on the fixed-point loop. Deeply nested macro and call chains
    /// propagate one level per pass.
    pub max_passes: usize,
}

impl Default for InferOptions {
    fn default() -> Self {
        Self { max_passes: 64 }
    }
}

/// Macro parameter bindings: parameter name to call-site expression. The
/// look-through happens at variable lookup, never by rewriting the body.
type Bindings = FxHashMap<String, ExprId>;

struct InferCtx {
    /// The instantiation whose body is being inferred; `return` refines it.
    current_instantiation: Option<(SectionId, Vec<Type>)>,
    /// Bodies on the current inference stack. Recursive patterns stop here
    /// and pick up their callee's return type on a later pass.
    active_bodies: FxHashSet<SectionId>,
}

/// Run inference to a fixed point, then default leftover `Numeric` types
/// and validate. Returns false when validation reported errors or the run
/// was cancelled.
pub fn infer(
    graph: &mut ProgramGraph,
    tries: &Tries,
    diags: &mut Diagnostics,
    options: &InferOptions,
    cancel: &CancelFlag,
) -> bool {
    let mut ctx = InferCtx {
        current_instantiation: None,
        active_bodies: FxHashSet::default(),
    };

    for _ in 0..options.max_passes {
        if cancel.is_cancelled() {
            return false;
        }
        let mut changed = false;
        for index in 0..graph.lines.len() {
            if let Some(expr) = graph.lines[index].expression {
                changed |= infer_expression(graph, tries, &mut ctx, expr, &Bindings::default());
            }
        }
        if !changed {
            break;
        }
    }

    validate::default_numeric_types(graph);
    validate::validate(graph, diags)
}

/// Infer one expression bottom-up. Returns whether anything (this node's
/// type, a variable's type, an instantiation) changed.
fn infer_expression(
    graph: &mut ProgramGraph,
    tries: &Tries,
    ctx: &mut InferCtx,
    expr_id: ExprId,
    bindings: &Bindings,
) -> bool {
    let mut changed = false;
    for arg in graph.expr(expr_id).args.clone() {
        changed |= infer_expression(graph, tries, ctx, arg, bindings);
    }

    let old = graph.expr(expr_id).ty;
    match graph.expr(expr_id).kind.clone() {
        ExprKind::Literal(literal) => {
            graph.expr_mut(expr_id).ty = match literal {
                Literal::Int(_) => Type::numeric(),
                Literal::Float(_) => Type::float(8),
                Literal::Str(_) => Type::integer(1).pointed(),
            };
        }
        ExprKind::Variable(Some(var_ref)) => {
            let name = graph.var_ref(var_ref).name.clone();
            if let Some(&bound) = bindings.get(&name) {
                // A macro parameter: the call-site expression's type, once
                // it is known.
                let bound_ty = graph.expr(bound).ty;
                if bound_ty.is_deduced() {
                    graph.expr_mut(expr_id).ty = bound_ty;
                }
            } else {
                let section = graph
                    .line(graph.expr(expr_id).range.line)
                    .section
                    .expect("expressions live on analyzed lines");
                if let Some(variable) = graph.find_variable(section, &name) {
                    let ty = graph.variable(variable).ty;
                    if ty.is_deduced() {
                        graph.expr_mut(expr_id).ty = ty;
                    }
                }
            }
        }
        ExprKind::Variable(None) | ExprKind::Pending(_) => {}
        ExprKind::IntrinsicCall(name) => {
            changed |= infer_intrinsic(graph, ctx, expr_id, &name, bindings);
        }
        ExprKind::PatternCall(match_id) => {
            changed |= infer_pattern_call(graph, tries, ctx, expr_id, match_id, bindings);
        }
    }

    changed || graph.expr(expr_id).ty != old
}

// ── Intrinsics ─────────────────────────────────────────────────────────

fn infer_intrinsic(
    graph: &mut ProgramGraph,
    ctx: &mut InferCtx,
    expr_id: ExprId,
    name: &str,
    bindings: &Bindings,
) -> bool {
    let args = graph.expr(expr_id).args.clone();
    let mut changed = false;

    if intrinsics::is_arithmetic_operator(name) {
        if args.len() >= 3 {
            let left = resolve_type_through_macro(graph, args[1], bindings);
            let right = resolve_type_through_macro(graph, args[2], bindings);
            if left.is_deduced() && right.is_deduced() {
                graph.expr_mut(expr_id).ty = if intrinsics::is_pointer_arithmetic_operator(name) {
                    Type::promote_arithmetic(left, right)
                } else {
                    Type::promote(left, right)
                };
            }
        }
    } else if intrinsics::is_comparison_operator(name) || intrinsics::is_logical_operator(name) {
        graph.expr_mut(expr_id).ty = Type::boolean();
    } else if name == "address of" {
        if args.len() >= 2 {
            let value = resolve_type_through_macro(graph, args[1], bindings);
            if value.is_deduced() {
                graph.expr_mut(expr_id).ty = value.pointed();
            }
        }
    } else if name == "dereference" {
        if args.len() >= 2 {
            let pointer = resolve_type_through_macro(graph, args[1], bindings);
            if pointer.is_deduced() && pointer.is_pointer() {
                graph.expr_mut(expr_id).ty = pointer.dereferenced();
            }
        }
    } else if name == "store at" {
        graph.expr_mut(expr_id).ty = Type::void();
    } else if name == "load at" {
        graph.expr_mut(expr_id).ty = Type::integer(8);
    } else if name == "store" {
        if args.len() >= 3 {
            changed |= infer_store(graph, args[1], args[2], bindings);
        }
        graph.expr_mut(expr_id).ty = Type::void();
    } else if name == "return" {
        if args.len() >= 2 {
            let value = resolve_type_through_macro(graph, args[1], bindings);
            if value.is_deduced() {
                graph.expr_mut(expr_id).ty = value;
                if let Some((section, key)) = ctx.current_instantiation.clone() {
                    let instantiation = graph
                        .section_mut(section)
                        .instantiations
                        .get_mut(&key)
                        .expect("current instantiation exists");
                    if instantiation.return_type != value {
                        instantiation.return_type = value;
                        changed = true;
                    }
                }
            }
        }
    } else if name == "call" {
        // @intrinsic("call", "library", "function", "return type", args...)
        if args.len() >= 4 {
            if let Some(type_name) = graph.expr(args[3]).as_str_literal() {
                if let Some(ty) = Type::from_name(type_name) {
                    graph.expr_mut(expr_id).ty = ty;
                }
            }
        }
    } else if name == "cast" {
        if args.len() >= 3 {
            changed |= infer_cast(graph, expr_id, &args, bindings);
        }
    } else if name == "construct" {
        if args.len() >= 2 {
            changed |= infer_construct(graph, expr_id, &args, bindings);
        }
    } else if name == "property" {
        if args.len() >= 3 {
            infer_property(graph, expr_id, &args, bindings);
        }
    } else if intrinsics::is_control_flow(name) {
        graph.expr_mut(expr_id).ty = Type::void();
    }

    changed
}

/// `store` refines the destination: a variable's type, or a class field's
/// type when the destination is a `property` access.
fn infer_store(graph: &mut ProgramGraph, dest: ExprId, value: ExprId, bindings: &Bindings) -> bool {
    let dest = resolve_expr_through_macro(graph, dest, bindings);
    let value_ty = resolve_type_through_macro(graph, value, bindings);
    if !value_ty.is_deduced() {
        return false;
    }

    match graph.expr(dest).kind.clone() {
        ExprKind::Variable(Some(var_ref)) => {
            let name = graph.var_ref(var_ref).name.clone();
            let section = graph
                .line(graph.expr(dest).range.line)
                .section
                .expect("expressions live on analyzed lines");
            if let Some(variable) = graph.find_variable(section, &name) {
                if graph.variable(variable).ty.can_refine_to(&value_ty) {
                    graph.variable_mut(variable).ty = value_ty;
                    return true;
                }
            }
            false
        }
        ExprKind::IntrinsicCall(name) if name == "property" => {
            let property_args = graph.expr(dest).args.clone();
            if property_args.len() < 3 {
                return false;
            }
            let instance = resolve_type_through_macro(graph, property_args[1], bindings);
            let TypeKind::Class(class, Some(instantiation)) = instance.kind else {
                return false;
            };
            let field_expr = resolve_expr_through_macro(graph, property_args[2], bindings);
            let Some(field_name) = graph.expr(field_expr).as_str_literal().map(str::to_string) else {
                return false;
            };
            let Some(field_index) = graph
                .class(class)
                .fields
                .iter()
                .position(|f| f.name == field_name)
            else {
                return false;
            };
            let definition = graph.class_mut(class);
            let field_types = &mut definition.instantiations[instantiation as usize].field_types;
            if field_types[field_index].can_refine_to(&value_ty) {
                field_types[field_index] = value_ty;
                return true;
            }
            false
        }
        _ => false,
    }
}

/// `cast` reads its target: a class pattern reference, `"integer"` /
/// `"float"` with an optional bit size, a primitive type name -- or, when
/// none of those apply, an identity conversion.
fn infer_cast(graph: &mut ProgramGraph, expr_id: ExprId, args: &[ExprId], bindings: &Bindings) -> bool {
    let target = resolve_type_through_macro(graph, args[2], bindings);
    if let TypeKind::TypeReference(class) = target.kind {
        let instantiation = if graph.class(class).instantiations.is_empty() {
            None
        } else {
            Some(0)
        };
        graph.expr_mut(expr_id).ty = Type::class(class, instantiation);
        return false;
    }

    let target_name = {
        let resolved = resolve_expr_through_macro(graph, args[2], bindings);
        graph.expr(resolved).as_str_literal().map(str::to_string)
    };
    match target_name.as_deref() {
        Some(kind @ ("integer" | "float")) => {
            let bits = args
                .get(3)
                .and_then(|&a| graph.expr(a).as_int_literal())
                .unwrap_or(64);
            let byte_size = (bits / 8) as u8;
            graph.expr_mut(expr_id).ty = if kind == "integer" {
                Type::integer(byte_size)
            } else {
                Type::float(byte_size)
            };
        }
        Some(name) if Type::from_name(name).is_some() => {
            graph.expr_mut(expr_id).ty = Type::from_name(name).unwrap();
        }
        _ => {
            // Identity conversion.
            let value = resolve_type_through_macro(graph, args[1], bindings);
            if value.is_deduced() {
                graph.expr_mut(expr_id).ty = value;
            }
        }
    }
    false
}

/// `construct` instantiates a class for the tuple of field value types.
fn infer_construct(graph: &mut ProgramGraph, expr_id: ExprId, args: &[ExprId], bindings: &Bindings) -> bool {
    let target = resolve_type_through_macro(graph, args[1], bindings);
    let TypeKind::TypeReference(class) = target.kind else {
        return false;
    };
    let field_types: Vec<Type> = args[2..]
        .iter()
        .map(|&a| resolve_type_through_macro(graph, a, bindings))
        .collect();
    if !field_types.iter().all(Type::is_deduced) {
        return false;
    }
    let before = graph.class(class).instantiations.len();
    let index = graph.class_mut(class).get_or_create_instantiation(field_types);
    graph.expr_mut(expr_id).ty = Type::class(class, Some(index));
    graph.class(class).instantiations.len() != before
}

/// `property` reads a field's type out of the instance's instantiation.
fn infer_property(graph: &mut ProgramGraph, expr_id: ExprId, args: &[ExprId], bindings: &Bindings) {
    let instance = resolve_type_through_macro(graph, args[1], bindings);
    let TypeKind::Class(class, Some(instantiation)) = instance.kind else {
        return;
    };
    let field_expr = resolve_expr_through_macro(graph, args[2], bindings);
    let Some(field_name) = graph.expr(field_expr).as_str_literal().map(str::to_string) else {
        return;
    };
    if let Some(index) = graph
        .class(class)
        .fields
        .iter()
        .position(|f| f.name == field_name)
    {
        graph.expr_mut(expr_id).ty =
            graph.class(class).instantiations[instantiation as usize].field_types[index];
    }
}

// ── Pattern calls ──────────────────────────────────────────────────────

fn infer_pattern_call(
    graph: &mut ProgramGraph,
    tries: &Tries,
    ctx: &mut InferCtx,
    expr_id: ExprId,
    match_id: drift_graph::MatchId,
    bindings: &Bindings,
) -> bool {
    let def = graph.pattern_match(match_id).def;
    let section = graph.def(def).section;
    let section_kind = graph.section(section).kind;
    let mut changed = false;

    // Pair call-site arguments (in source order) with the parameter names
    // recorded along the matched path, resolving arguments through the
    // enclosing macro bindings.
    let sorted_args = graph.sort_args_by_position(&graph.expr(expr_id).args);
    let trie = tries.for_section(section_kind);
    let mut ordered_params: Vec<(String, ExprId)> = Vec::new();
    for &node in &graph.pattern_match(match_id).nodes_passed {
        if let Some(name) = trie.node(node).parameter_names.get(&def) {
            if ordered_params.len() < sorted_args.len() {
                let mut actual = sorted_args[ordered_params.len()];
                if let ExprKind::Variable(Some(var_ref)) = graph.expr(actual).kind {
                    if let Some(&bound) = bindings.get(graph.var_ref(var_ref).name.as_str()) {
                        actual = bound;
                    }
                }
                ordered_params.push((name.clone(), actual));
            }
        }
    }
    let call_bindings: Bindings = ordered_params.iter().cloned().collect();

    match section_kind {
        SectionKind::Class => {
            let class = graph.section(section).class.expect("class sections carry a class");
            graph.expr_mut(expr_id).ty = Type::type_reference(class);
        }
        SectionKind::Effect => {
            changed |= infer_body_guarded(graph, tries, ctx, section, &call_bindings);
            graph.expr_mut(expr_id).ty = Type::void();
        }
        _ if graph.section(section).is_macro => {
            // The replacement body is inferred with the call-site
            // expressions substituted; its type becomes the call's type.
            changed |= infer_body_guarded(graph, tries, ctx, section, &call_bindings);
            if let Some(ty) = macro_result_type(graph, section) {
                graph.expr_mut(expr_id).ty = ty;
            }
        }
        _ => {
            // Non-macro pattern: one instantiation per argument type tuple.
            let arg_types: Vec<Type> = ordered_params
                .iter()
                .map(|&(_, arg)| resolve_type_through_macro(graph, arg, bindings))
                .collect();
            graph
                .section_mut(section)
                .instantiations
                .entry(arg_types.clone())
                .or_default();

            let key = (section, arg_types);
            let saved = ctx.current_instantiation.take();
            ctx.current_instantiation = Some(key.clone());
            changed |= infer_body_guarded(graph, tries, ctx, section, &call_bindings);
            ctx.current_instantiation = saved;

            let return_type = graph.section(section).instantiations[&key.1].return_type;
            if return_type.is_deduced() {
                graph.expr_mut(expr_id).ty = return_type;
            }
        }
    }

    changed
}

/// Infer through a definition body unless it is already on the inference
/// stack (recursion converges across passes instead).
fn infer_body_guarded(
    graph: &mut ProgramGraph,
    tries: &Tries,
    ctx: &mut InferCtx,
    section: SectionId,
    bindings: &Bindings,
) -> bool {
    if !ctx.active_bodies.insert(section) {
        return false;
    }
    let changed = infer_body(graph, tries, ctx, section, bindings);
    ctx.active_bodies.remove(&section);
    changed
}

fn infer_body(
    graph: &mut ProgramGraph,
    tries: &Tries,
    ctx: &mut InferCtx,
    section: SectionId,
    bindings: &Bindings,
) -> bool {
    let mut changed = false;
    for line in graph.section(section).lines.clone() {
        if let Some(expr) = graph.line(line).expression {
            changed |= infer_expression(graph, tries, ctx, expr, bindings);
        }
    }
    for child in graph.section(section).children.clone() {
        changed |= infer_body(graph, tries, ctx, child, bindings);
    }
    changed
}

/// The type of a macro's replacement body: the last deduced expression type
/// among its body lines.
fn macro_result_type(graph: &ProgramGraph, section: SectionId) -> Option<Type> {
    let mut result = None;
    for &child in &graph.section(section).children {
        for &line in &graph.section(child).lines {
            if let Some(expr) = graph.line(line).expression {
                let ty = graph.expr(expr).ty;
                if ty.is_deduced() {
                    result = Some(ty);
                }
            }
        }
    }
    result
}

// ── Macro look-through ─────────────────────────────────────────────────

/// Resolve a variable expression through macro bindings to the call-site
/// expression it stands for. Stops on self-referential bindings and after a
/// fixed number of hops.
fn resolve_expr_through_macro(graph: &ProgramGraph, expr_id: ExprId, bindings: &Bindings) -> ExprId {
    let mut current = expr_id;
    for _ in 0..32 {
        let ExprKind::Variable(Some(var_ref)) = graph.expr(current).kind else {
            return current;
        };
        match bindings.get(graph.var_ref(var_ref).name.as_str()) {
            Some(&bound) if bound != current => current = bound,
            _ => return current,
        }
    }
    current
}

fn resolve_type_through_macro(graph: &ProgramGraph, expr_id: ExprId, bindings: &Bindings) -> Type {
    graph.expr(resolve_expr_through_macro(graph, expr_id, bindings)).ty
}
