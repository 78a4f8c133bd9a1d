//! Integration tests for type inference.
//!
//! Each test runs the whole front end -- import, section analysis, pattern
//! resolution -- and then inference, asserting on deduced variable types,
//! instantiations and validation diagnostics.

use std::path::Path;

use drift_common::{CancelFlag, Diagnostics, MemoryProvider};
use drift_graph::{ProgramGraph, SectionKind, Tries, Type, TypeKind};
use drift_parser::importer::ImportOptions;
use drift_typeck::{infer, InferOptions};

fn check_source(source: &str) -> (ProgramGraph, Diagnostics, bool) {
    let mut provider = MemoryProvider::new();
    provider.insert("main.dl", source);
    let mut graph = ProgramGraph::new();
    let mut diags = Diagnostics::new();
    drift_parser::import(
        &mut graph,
        &mut diags,
        &provider,
        Path::new("main.dl"),
        &ImportOptions::default(),
        &CancelFlag::new(),
    )
    .expect("import should succeed");
    drift_parser::analyze(&mut graph, &mut diags).expect("section analysis should succeed");
    let mut tries = Tries::new();
    let resolved = drift_resolver::resolve(
        &mut graph,
        &mut tries,
        &mut diags,
        &drift_resolver::ResolveOptions::default(),
        &CancelFlag::new(),
    );
    assert!(resolved, "resolution failed: {:?}", diags.entries());
    let ok = infer(
        &mut graph,
        &tries,
        &mut diags,
        &InferOptions::default(),
        &CancelFlag::new(),
    );
    (graph, diags, ok)
}

fn variable_type(graph: &ProgramGraph, name: &str) -> Type {
    let variable = graph
        .variables
        .iter()
        .find(|v| v.name == name)
        .unwrap_or_else(|| panic!("no variable `{name}`"));
    variable.ty
}

const PRELUDE: &str = "\
effect set value to target:
  execute:
    @intrinsic(\"store\", value, target)
effect print value:
  execute:
    @intrinsic(\"print_i64\", value)
";

#[test]
fn integer_literal_assignment_defaults_to_i32() {
    let source = format!("{PRELUDE}set x to 5\nprint x\n");
    let (graph, diags, ok) = check_source(&source);
    assert!(ok, "diags: {:?}", diags.entries());
    assert!(!diags.has_errors());
    assert_eq!(variable_type(&graph, "x"), Type::integer(4));
}

#[test]
fn large_literals_keep_sixty_four_bits() {
    let source = format!("{PRELUDE}set x to 5000000000\n");
    let (graph, diags, ok) = check_source(&source);
    assert!(ok, "diags: {:?}", diags.entries());
    // The literal itself widens; the store happened while the value was
    // still `Numeric`, so the variable defaults alongside it.
    let wide = graph
        .exprs
        .iter()
        .any(|e| e.ty == Type::integer(8));
    assert!(wide);
    let _ = variable_type(&graph, "x");
}

#[test]
fn float_literal_assignment_is_f64() {
    let source = format!("{PRELUDE}set x to 2.5\n");
    let (graph, diags, ok) = check_source(&source);
    assert!(ok, "diags: {:?}", diags.entries());
    assert_eq!(variable_type(&graph, "x"), Type::float(8));
}

#[test]
fn string_literal_assignment_is_a_byte_pointer() {
    let source = format!("{PRELUDE}set x to \"hello\"\n");
    let (graph, diags, ok) = check_source(&source);
    assert!(ok, "diags: {:?}", diags.entries());
    assert_eq!(variable_type(&graph, "x"), Type::integer(1).pointed());
}

#[test]
fn arithmetic_promotes_through_expression_patterns() {
    let source = format!(
        "{PRELUDE}expression first plus second:
  get:
    @intrinsic(\"return\", @intrinsic(\"add\", first, second))
set x to 1 plus 2
set y to 1.5 plus 2
"
    );
    let (graph, diags, ok) = check_source(&source);
    assert!(ok, "diags: {:?}", diags.entries());
    assert_eq!(variable_type(&graph, "x"), Type::integer(4));
    // Float beats integer under promotion.
    assert_eq!(variable_type(&graph, "y"), Type::float(8));
}

#[test]
fn comparisons_make_booleans() {
    let source = format!(
        "{PRELUDE}expression first below second:
  get:
    @intrinsic(\"return\", @intrinsic(\"less than\", first, second))
set x to 1 below 2
"
    );
    let (graph, diags, ok) = check_source(&source);
    assert!(ok, "diags: {:?}", diags.entries());
    assert_eq!(variable_type(&graph, "x"), Type::boolean());
}

#[test]
fn non_macro_patterns_monomorphize_per_argument_types() {
    let source = format!(
        "{PRELUDE}expression twice value:
  get:
    @intrinsic(\"return\", @intrinsic(\"multiply\", value, 2))
set x to twice 3
set y to twice 1.5
"
    );
    let (graph, diags, ok) = check_source(&source);
    assert!(ok, "diags: {:?}", diags.entries());
    assert_eq!(variable_type(&graph, "x"), Type::integer(4));
    assert_eq!(variable_type(&graph, "y"), Type::float(8));

    // Two distinct instantiations on the expression section, both with
    // deduced return types.
    let section = graph
        .sections
        .iter()
        .find(|s| s.kind == SectionKind::Expression)
        .unwrap();
    assert_eq!(section.instantiations.len(), 2);
    assert!(section
        .instantiations
        .values()
        .all(|inst| inst.return_type.is_deduced()));
    let keys: Vec<&Vec<Type>> = section.instantiations.keys().collect();
    assert!(keys.contains(&&vec![Type::integer(4)]));
    assert!(keys.contains(&&vec![Type::float(8)]));
}

#[test]
fn expression_macros_take_their_replacement_type() {
    let source = format!(
        "{PRELUDE}macro expression doubled value:
  replacement:
    @intrinsic(\"multiply\", value, 2)
set x to doubled 4
"
    );
    let (graph, diags, ok) = check_source(&source);
    assert!(ok, "diags: {:?}", diags.entries());
    assert_eq!(variable_type(&graph, "x"), Type::integer(4));
    // Macros are never monomorphized.
    let section = graph
        .sections
        .iter()
        .find(|s| s.kind == SectionKind::Expression)
        .unwrap();
    assert!(section.is_macro);
    assert!(section.instantiations.is_empty());
}

#[test]
fn construct_and_property_go_through_class_instantiations() {
    let source = format!(
        "{PRELUDE}class box:
  members:
    val
expression boxed value:
  get:
    @intrinsic(\"return\", @intrinsic(\"construct\", box, value))
expression contents of thing:
  get:
    @intrinsic(\"return\", @intrinsic(\"property\", thing, \"val\"))
set b to boxed 7
set v to contents of b
"
    );
    let (graph, diags, ok) = check_source(&source);
    assert!(ok, "diags: {:?}", diags.entries());

    let b = variable_type(&graph, "b");
    assert!(matches!(b.kind, TypeKind::Class(_, Some(0))));
    // One structural instantiation, defaulted to i32.
    assert_eq!(graph.classes.len(), 1);
    assert_eq!(graph.classes[0].instantiations.len(), 1);
    assert_eq!(
        graph.classes[0].instantiations[0].field_types,
        vec![Type::integer(4)]
    );
    assert_eq!(variable_type(&graph, "v"), Type::integer(4));
}

#[test]
fn cast_reads_its_target_type() {
    let source = format!(
        "{PRELUDE}expression shrunk value:
  get:
    @intrinsic(\"return\", @intrinsic(\"cast\", value, \"integer\", 8))
set x to shrunk 300
"
    );
    let (graph, diags, ok) = check_source(&source);
    assert!(ok, "diags: {:?}", diags.entries());
    assert_eq!(variable_type(&graph, "x"), Type::integer(1));
}

#[test]
fn undeduced_variable_is_reported() {
    let source = format!("{PRELUDE}print ghost\n");
    let (_, diags, ok) = check_source(&source);
    assert!(!ok);
    assert!(diags.has_errors());
    assert!(diags
        .entries()
        .iter()
        .any(|d| d.message.contains("'ghost' has no type")));
}

#[test]
fn negating_a_string_is_reported() {
    let source = format!("{PRELUDE}@intrinsic(\"negate\", \"oops\")\n");
    let (_, diags, ok) = check_source(&source);
    assert!(!ok);
    assert!(diags
        .entries()
        .iter()
        .any(|d| d.message.contains("cannot negate")));
}

#[test]
fn inference_is_idempotent() {
    let source = format!("{PRELUDE}set x to 5\nset y to x\nprint y\n");
    let (first_graph, first_diags, ok_first) = check_source(&source);
    let (second_graph, second_diags, ok_second) = check_source(&source);
    assert!(ok_first && ok_second);
    assert_eq!(first_diags.entries(), second_diags.entries());
    assert_eq!(
        variable_type(&first_graph, "y"),
        variable_type(&second_graph, "y")
    );
}
