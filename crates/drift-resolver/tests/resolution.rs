//! Integration tests for pattern resolution.
//!
//! Each test assembles Drift source, runs import + section analysis + the
//! resolver, and asserts on the resolved graph: matches, promoted
//! variables, expanded expression trees, and the diagnostic stream.

use std::path::Path;

use drift_common::{CancelFlag, Diagnostics, MemoryProvider, Severity};
use drift_graph::{ExprKind, ProgramGraph, SectionKind, Tries};
use drift_parser::importer::ImportOptions;
use drift_resolver::{resolve, ResolveOptions};

fn run(source: &str) -> (ProgramGraph, Tries, Diagnostics, bool) {
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
    let ok = resolve(
        &mut graph,
        &mut tries,
        &mut diags,
        &ResolveOptions::default(),
        &CancelFlag::new(),
    );
    (graph, tries, diags, ok)
}

/// The expression of the line whose trimmed text equals `text`.
fn line_expr(graph: &ProgramGraph, text: &str) -> drift_graph::ExprId {
    graph
        .lines
        .iter()
        .find(|l| l.trimmed.trim_start() == text)
        .unwrap_or_else(|| panic!("no line `{text}`"))
        .expression
        .unwrap_or_else(|| panic!("line `{text}` has no expression"))
}

const SET_AND_PRINT: &str = "\
effect set value to target:
  execute:
    @intrinsic(\"store\", value, target)
effect print value:
  execute:
    @intrinsic(\"print_i64\", value)
";

#[test]
fn definitions_classify_from_body_evidence() {
    let (_graph, tries, diags, ok) = run(SET_AND_PRINT);
    assert!(ok, "diags: {:?}", diags.entries());
    assert!(!diags.has_errors());

    // Both effect definitions made it into the effect trie: `set ` + var +
    // ` to ` + var, and `print ` + var.
    let root = tries.effect.root();
    let after_set = tries.effect.node(root).literal_children["set "];
    let value_node = tries.effect.node(after_set).variable_child.expect("set takes a value");
    let after_to = tries.effect.node(value_node).literal_children[" to "];
    let target_node = tries.effect.node(after_to).variable_child.expect("set takes a target");
    assert_eq!(tries.effect.node(target_node).patterns_ended_here.len(), 1);

    let after_print = tries.effect.node(root).literal_children["print "];
    let print_value = tries.effect.node(after_print).variable_child.unwrap();
    assert_eq!(tries.effect.node(print_value).patterns_ended_here.len(), 1);

    // Parameter names survive on the capture nodes.
    let set_def = tries.effect.node(target_node).patterns_ended_here[0];
    assert_eq!(tries.effect.node(value_node).parameter_names[&set_def], "value");
    assert_eq!(tries.effect.node(target_node).parameter_names[&set_def], "target");
}

#[test]
fn global_calls_match_and_variables_resolve() {
    let source = format!("{SET_AND_PRINT}set x to 5\nprint x\n");
    let (graph, _, diags, ok) = run(&source);
    assert!(ok, "diags: {:?}", diags.entries());
    assert!(!diags.has_errors());

    // Both global lines became pattern calls.
    let set_call = graph.expr(line_expr(&graph, "set x to 5"));
    assert!(matches!(set_call.kind, ExprKind::PatternCall(_)));
    let print_call = graph.expr(line_expr(&graph, "print x"));
    assert!(matches!(print_call.kind, ExprKind::PatternCall(_)));

    // `x` became a variable on the root section; the second reference
    // points at the first.
    let var = graph.section(graph.root).variables["x"];
    let definition = graph.variable(var).definition;
    assert!(graph.var_ref(definition).is_definition());
    let x_refs: Vec<_> = graph
        .var_refs
        .iter()
        .filter(|r| r.name == "x" && !r.is_definition())
        .collect();
    assert!(!x_refs.is_empty());
    assert!(x_refs.iter().all(|r| r.definition == Some(definition)));
}

#[test]
fn no_pending_expressions_survive_resolution() {
    let source = format!("{SET_AND_PRINT}set x to 5\nset x to x\n");
    let (graph, _, _, ok) = run(&source);
    assert!(ok);
    fn assert_no_pending(graph: &ProgramGraph, expr: drift_graph::ExprId) {
        assert!(!graph.expr(expr).is_pending(), "pending: {:?}", graph.expr(expr));
        for &arg in &graph.expr(expr).args {
            assert_no_pending(graph, arg);
        }
    }
    for line in &graph.lines {
        if let Some(expr) = line.expression {
            assert_no_pending(&graph, expr);
        }
    }
}

#[test]
fn nested_expression_calls_expand_with_sub_matches() {
    let source = format!(
        "{SET_AND_PRINT}expression first plus second:
  get:
    @intrinsic(\"add\", first, second)
set x to 1 plus 2
"
    );
    let (graph, _, diags, ok) = run(&source);
    assert!(ok, "diags: {:?}", diags.entries());

    let set_call = graph.expr(line_expr(&graph, "set x to 1 plus 2"));
    let ExprKind::PatternCall(_) = set_call.kind else {
        panic!("expected a pattern call, got {:?}", set_call.kind);
    };
    // Arguments: the discovered variable `x` and the nested `1 plus 2`
    // call; the nested call carries the two carved literals.
    let nested = set_call
        .args
        .iter()
        .map(|&a| graph.expr(a))
        .find(|e| matches!(e.kind, ExprKind::PatternCall(_)))
        .expect("nested plus call");
    let literals: Vec<i64> = nested
        .args
        .iter()
        .filter_map(|&a| graph.expr(a).as_int_literal())
        .collect();
    assert_eq!(literals, [1, 2]);
}

#[test]
fn choice_alternatives_resolve_to_the_same_definition() {
    let source = "\
effect print value:
  execute:
    @intrinsic(\"print_i64\", value)
expression [the|] answer:
  get:
    @intrinsic(\"return\", 42)
print the answer
print answer
";
    let (graph, _, diags, ok) = run(source);
    assert!(ok, "diags: {:?}", diags.entries());
    assert!(!diags.has_errors());

    let with_article = graph.expr(line_expr(&graph, "print the answer"));
    let bare = graph.expr(line_expr(&graph, "print answer"));
    let def_of = |expr: &drift_graph::Expression| {
        let nested = expr
            .args
            .iter()
            .map(|&a| graph.expr(a))
            .find_map(|e| match e.kind {
                ExprKind::PatternCall(m) => Some(graph.pattern_match(m).def),
                _ => None,
            });
        nested.expect("call argument")
    };
    assert_eq!(def_of(with_article), def_of(bare));
}

#[test]
fn duplicate_definitions_report_ambiguity_once_per_call_site() {
    let source = "\
effect print value:
  execute:
    @intrinsic(\"print_i64\", value)
expression first plus second:
  get:
    @intrinsic(\"add\", first, second)
expression lhs plus rhs:
  get:
    @intrinsic(\"add\", lhs, rhs)
print 1 plus 2
";
    let (_, _, diags, ok) = run(source);
    assert!(ok, "diags: {:?}", diags.entries());
    let infos: Vec<_> = diags
        .entries()
        .iter()
        .filter(|d| d.severity == Severity::Info)
        .collect();
    assert_eq!(infos.len(), 1, "diags: {:?}", diags.entries());
    assert!(infos[0].message.contains("first one defined"));
}

#[test]
fn unresolved_references_each_get_a_diagnostic() {
    let source = "\
conjure a unicorn
summon two dragons
";
    let (_, _, diags, ok) = run(source);
    assert!(!ok);
    let errors: Vec<_> = diags
        .entries()
        .iter()
        .filter(|d| d.message == "pattern could not be resolved")
        .collect();
    assert_eq!(errors.len(), 2);
}

#[test]
fn custom_sections_resolve_as_section_patterns() {
    let source = "\
macro section loop while condition:
  replacement:
    @intrinsic(\"loop_while\", condition)
effect set value to target:
  execute:
    @intrinsic(\"store\", value, target)
set x to 0
loop while x:
  set x to 1
";
    let (graph, _, diags, ok) = run(source);
    assert!(ok, "diags: {:?}", diags.entries());
    assert!(!diags.has_errors());

    let header = graph.expr(line_expr(&graph, "loop while x:"));
    assert!(matches!(header.kind, ExprKind::PatternCall(_)));
    // The header opened a custom body whose line resolved too.
    let body = graph.expr(line_expr(&graph, "set x to 1"));
    assert!(matches!(body.kind, ExprKind::PatternCall(_)));
    // The macro definition section is marked as such.
    let loop_section = graph
        .sections
        .iter()
        .find(|s| s.kind == SectionKind::Section)
        .unwrap();
    assert!(loop_section.is_macro);
}

#[test]
fn patterns_section_aliases_share_one_body() {
    let source = "\
effect print value:
  execute:
    @intrinsic(\"print_i64\", value)
expression first plus second:
  patterns:
    second added to first
  get:
    @intrinsic(\"add\", first, second)
print 1 plus 2
print 2 added to 1
";
    let (graph, _, diags, ok) = run(source);
    assert!(ok, "diags: {:?}", diags.entries());
    assert!(!diags.has_errors());
    // Both syntaxes resolve, to two definitions owned by one section.
    let expression_section = graph
        .sections
        .iter()
        .find(|s| s.kind == SectionKind::Expression)
        .unwrap();
    assert_eq!(expression_section.pattern_definitions.len(), 2);
}

#[test]
fn resolution_is_idempotent_across_runs() {
    let source = format!("{SET_AND_PRINT}set x to 5\nprint x\nunknown incantation\n");
    let (_, _, first, ok_first) = run(&source);
    let (_, _, second, ok_second) = run(&source);
    assert_eq!(ok_first, ok_second);
    assert_eq!(first.entries(), second.entries());
}
