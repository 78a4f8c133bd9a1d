//! Intrinsic name classification.
//!
//! Intrinsic calls are table-driven by name; these predicates group the
//! names the inference and validation passes treat uniformly.

pub fn is_arithmetic_operator(name: &str) -> bool {
    matches!(name, "add" | "subtract" | "multiply" | "divide" | "modulo")
}

/// Arithmetic operators that also accept pointer + integer operands.
pub fn is_pointer_arithmetic_operator(name: &str) -> bool {
    matches!(name, "add" | "subtract")
}

pub fn is_comparison_operator(name: &str) -> bool {
    matches!(
        name,
        "less than"
            | "greater than"
            | "equal"
            | "not equal"
            | "less than or equal"
            | "greater than or equal"
    )
}

pub fn is_logical_operator(name: &str) -> bool {
    matches!(name, "and" | "or" | "not")
}

/// Control-flow intrinsics record block wiring on their section and produce
/// no value.
pub fn is_control_flow(name: &str) -> bool {
    matches!(
        name,
        "loop while" | "if" | "else if" | "else" | "switch" | "case"
    )
}
