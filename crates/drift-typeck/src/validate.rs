//! Numeric defaulting and post-inference validation.

use drift_common::{Diagnostics, Severity};
use drift_graph::{
    ExprKind, ExprId, Literal, ProgramGraph, SectionId, Type, TypeKind,
};

use crate::intrinsics;

/// Default whatever stayed `Numeric` after the fixed point: literals that
/// fit 32 bits (and everything else) become `i32`, larger literals `i64`.
/// Variables, class instantiations and instantiation maps follow.
pub fn default_numeric_types(graph: &mut ProgramGraph) {
    for index in 0..graph.lines.len() {
        if let Some(expr) = graph.lines[index].expression {
            default_numeric_expression(graph, expr);
        }
    }

    for variable in &mut graph.variables {
        if variable.ty.kind == TypeKind::Numeric {
            variable.ty = Type::integer(4);
        }
    }

    for class in &mut graph.classes {
        for instantiation in &mut class.instantiations {
            for field in &mut instantiation.field_types {
                if field.kind == TypeKind::Numeric {
                    *field = Type::integer(4);
                }
            }
        }
    }

    for section in &mut graph.sections {
        if section.instantiations.is_empty() {
            continue;
        }
        let old = std::mem::take(&mut section.instantiations);
        for (arg_types, mut instantiation) in old {
            // Early passes can key an instantiation by argument types that
            // were not deduced yet; a later pass re-creates it under the
            // real types. Drop the stale entry.
            if arg_types.iter().any(|ty| !ty.is_deduced()) {
                continue;
            }
            let defaulted: Vec<Type> = arg_types
                .into_iter()
                .map(|ty| {
                    if ty.kind == TypeKind::Numeric {
                        Type::integer(4)
                    } else {
                        ty
                    }
                })
                .collect();
            instantiation.return_type = match instantiation.return_type.kind {
                TypeKind::Numeric => Type::integer(4),
                // A body with no `return` produces nothing.
                TypeKind::Undeduced => Type::void(),
                _ => instantiation.return_type,
            };
            section.instantiations.insert(defaulted, instantiation);
        }
    }
}

fn default_numeric_expression(graph: &mut ProgramGraph, expr_id: ExprId) {
    if graph.expr(expr_id).ty.kind == TypeKind::Numeric {
        let mut size = 4;
        if let ExprKind::Literal(Literal::Int(value)) = graph.expr(expr_id).kind {
            if value < i64::from(i32::MIN) || value > i64::from(i32::MAX) {
                size = 8;
            }
        }
        graph.expr_mut(expr_id).ty = Type::integer(size);
    }
    for arg in graph.expr(expr_id).args.clone() {
        default_numeric_expression(graph, arg);
    }
}

/// Post-inference validation: arithmetic operands must be numeric (or
/// pointer arithmetic), comparisons of two different non-numeric types are
/// errors, and every variable outside non-macro function bodies must have a
/// deduced type. Returns whether everything validated.
pub fn validate(graph: &mut ProgramGraph, diags: &mut Diagnostics) -> bool {
    let mut valid = validate_variables(graph, diags, graph.root);
    for index in 0..graph.lines.len() {
        if let Some(expr) = graph.lines[index].expression {
            valid &= validate_expression(graph, diags, expr);
        }
    }
    valid
}

/// Walk the section tree reporting undeduced variables. Bodies of non-macro
/// definitions are skipped: their variables only receive types per
/// monomorphized instantiation.
fn validate_variables(graph: &ProgramGraph, diags: &mut Diagnostics, section: SectionId) -> bool {
    if let Some(parent) = graph.section(section).parent {
        let parent_section = graph.section(parent);
        if !parent_section.is_macro && !parent_section.pattern_definitions.is_empty() {
            return true;
        }
    }

    let mut valid = true;
    let mut variables: Vec<_> = graph.section(section).variables.values().copied().collect();
    variables.sort();
    for var_id in variables {
        let variable = graph.variable(var_id);
        if !variable.ty.is_deduced() {
            let range = graph.var_ref(variable.definition).range;
            diags.push(graph.diagnostic_at(
                Severity::Error,
                range,
                format!(
                    "variable '{}' has no type (never assigned a value)",
                    variable.name
                ),
            ));
            valid = false;
        }
    }

    for &child in &graph.section(section).children {
        valid &= validate_variables(graph, diags, child);
    }
    valid
}

fn validate_expression(graph: &ProgramGraph, diags: &mut Diagnostics, expr_id: ExprId) -> bool {
    let mut valid = true;
    for &arg in &graph.expr(expr_id).args {
        valid &= validate_expression(graph, diags, arg);
    }

    let ExprKind::IntrinsicCall(name) = &graph.expr(expr_id).kind else {
        return valid;
    };
    let args = &graph.expr(expr_id).args;

    if intrinsics::is_arithmetic_operator(name) {
        if args.len() >= 3 {
            let left = graph.expr(args[1]).ty;
            let right = graph.expr(args[2]).ty;
            let pointer_arithmetic = intrinsics::is_pointer_arithmetic_operator(name)
                && (left.is_pointer() || right.is_pointer());
            if !pointer_arithmetic {
                for (operand, ty) in [(args[1], left), (args[2], right)] {
                    if ty.is_deduced() && !ty.is_numeric() {
                        diags.push(graph.diagnostic_at(
                            Severity::Error,
                            graph.expr(operand).range,
                            format!("cannot use {ty} in arithmetic (expected a numeric type)"),
                        ));
                        valid = false;
                    }
                }
            }
        }
    } else if intrinsics::is_comparison_operator(name) {
        if args.len() >= 3 {
            let left = graph.expr(args[1]).ty;
            let right = graph.expr(args[2]).ty;
            if left.is_deduced()
                && right.is_deduced()
                && !left.is_numeric()
                && !right.is_numeric()
                && left != right
            {
                diags.push(graph.diagnostic_at(
                    Severity::Error,
                    graph.expr(expr_id).range,
                    format!("cannot compare {left} with {right}"),
                ));
                valid = false;
            }
        }
    } else if name == "negate" && args.len() >= 2 {
        let operand = graph.expr(args[1]).ty;
        if operand.is_deduced() && !operand.is_numeric() {
            diags.push(graph.diagnostic_at(
                Severity::Error,
                graph.expr(args[1]).range,
                format!("cannot negate {operand} (expected a numeric type)"),
            ));
            valid = false;
        }
    }

    valid
}
