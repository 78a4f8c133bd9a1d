//! The fixed-point pattern resolver.
//!
//! Definitions and references converge together. A definition with
//! still-ambiguous `VariableLike` elements waits for body evidence: the
//! per-section counts say how many unresolved body references still mention
//! each candidate name. A name nobody uses as an argument is a keyword; a
//! name that appears in resolved calls becomes a parameter. References
//! resolve by trie match (or promote to a variable when they are one bare
//! identifier), and every resolution feeds the counts that let more
//! definitions finish.
//!
//! Phase 1 drains definition bodies; phase 2 drains global code with every
//! definition in the tries. Whatever survives both phases is reported, one
//! diagnostic per reference.

use drift_common::{CancelFlag, Diagnostics, Severity};
use drift_graph::{
    element::{for_each_leaf, for_each_leaf_mut},
    ExprKind, ExprId, Literal, PatternElement, PatternKind, ProgramGraph, Range, RefId, SectionId,
    SectionKind, Tries, VarRefId,
};
use drift_parser::element::{parse_definition_elements, parse_reference_elements};
use rustc_hash::FxHashSet;

use crate::matcher;

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Bound on both phase loops.
    pub max_iterations: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self { max_iterations: 256 }
    }
}

/// Resolve every pattern reference in the graph, expand the expression
/// trees, and resolve variable scopes. Returns false when references remain
/// unresolved (diagnostics name each one) or the run was cancelled.
pub fn resolve(
    graph: &mut ProgramGraph,
    tries: &mut Tries,
    diags: &mut Diagnostics,
    options: &ResolveOptions,
    cancel: &CancelFlag,
) -> bool {
    let mut body_refs = Vec::new();
    let mut global_refs = Vec::new();
    let mut sections = Vec::new();
    collect(graph, graph.root, false, &mut body_refs, &mut global_refs, &mut sections);

    // Parse elements for every definition and reference up front.
    for &section in &sections {
        for def_id in graph.section(section).pattern_definitions.clone() {
            let elements = parse_definition_elements(&graph.def(def_id).text);
            graph.def_mut(def_id).elements = elements;
        }
    }
    for &ref_id in body_refs.iter().chain(global_refs.iter()) {
        let elements = parse_reference_elements(graph.pattern_ref(ref_id).pattern.text());
        graph.pattern_ref_mut(ref_id).elements = elements;
    }

    compute_variable_like_counts(graph, &sections);

    // Phase 1: definitions and their bodies.
    for _ in 0..options.max_iterations {
        if cancel.is_cancelled() {
            return false;
        }
        let sections_before = sections.len();
        resolve_definitions(graph, tries, &mut sections);
        let refs_progressed = resolve_references(graph, tries, diags, &mut body_refs, true);
        if sections.is_empty() && body_refs.is_empty() {
            break;
        }
        if sections.len() == sections_before && !refs_progressed {
            break;
        }
    }

    // Phase 2: global code, with all definitions in the tries.
    for _ in 0..options.max_iterations {
        if cancel.is_cancelled() {
            return false;
        }
        if !resolve_references(graph, tries, diags, &mut global_refs, false) {
            break;
        }
        if global_refs.is_empty() {
            break;
        }
    }

    if !sections.is_empty() || !body_refs.is_empty() || !global_refs.is_empty() {
        for &ref_id in body_refs.iter().chain(global_refs.iter()) {
            let range = graph.expr(graph.pattern_ref(ref_id).expression).range;
            diags.push(graph.diagnostic_at(
                Severity::Error,
                range,
                "pattern could not be resolved",
            ));
        }
        return false;
    }

    expand_all(graph);
    resolve_variable_scopes(graph);
    true
}

// ── Bootstrap ──────────────────────────────────────────────────────────

/// Collect references and definition-owning sections. References inside any
/// definition body are body references; the rest are global. A definition
/// section's own references (its header line) count as global.
fn collect(
    graph: &ProgramGraph,
    section: SectionId,
    inside_definition: bool,
    body_refs: &mut Vec<RefId>,
    global_refs: &mut Vec<RefId>,
    sections: &mut Vec<SectionId>,
) {
    let sec = graph.section(section);
    let target = if inside_definition { &mut *body_refs } else { &mut *global_refs };
    target.extend(sec.pattern_references.iter().copied());
    if !sec.pattern_definitions.is_empty() {
        sections.push(section);
    }
    let child_inside = inside_definition || !sec.pattern_definitions.is_empty();
    for &child in &sec.children {
        collect(graph, child, child_inside, body_refs, global_refs, sections);
    }
}

/// Body references of a definition section: everything in its descendants.
/// Nested definitions stay included, since nested code can reach the outer
/// parameters.
fn collect_body_refs(graph: &ProgramGraph, section: SectionId, refs: &mut Vec<RefId>) {
    for &child in &graph.section(section).children {
        refs.extend(graph.section(child).pattern_references.iter().copied());
        collect_body_refs(graph, child, refs);
    }
}

/// Initial `VariableLike` counts: for each candidate name of a section's
/// definitions, how many body references mention it. Counted once per
/// reference, decremented as references resolve.
fn compute_variable_like_counts(graph: &mut ProgramGraph, sections: &[SectionId]) {
    for &section in sections {
        let mut body_refs = Vec::new();
        collect_body_refs(graph, section, &mut body_refs);

        let mut candidate_names = FxHashSet::default();
        for &def_id in &graph.section(section).pattern_definitions {
            for_each_leaf(&graph.def(def_id).elements, &mut |element| {
                if element.is_variable_like() {
                    candidate_names.insert(element.text().to_string());
                }
            });
        }

        for name in candidate_names {
            let count = body_refs
                .iter()
                .filter(|&&r| {
                    graph
                        .pattern_ref(r)
                        .elements
                        .iter()
                        .any(|e| e.is_variable_like() && e.text() == name)
                })
                .count();
            graph
                .section_mut(section)
                .variable_like_counts
                .insert(name, count);
        }
    }
}

// ── Definitions ────────────────────────────────────────────────────────

/// One pass over the unresolved sections: classify what the counts allow,
/// insert finished definitions, and force-resolve sections whose whole
/// subtree has no unresolved references left (all evidence is in).
fn resolve_definitions(graph: &mut ProgramGraph, tries: &mut Tries, sections: &mut Vec<SectionId>) {
    sections.retain(|&section| {
        let def_ids = graph.section(section).pattern_definitions.clone();
        let mut all_resolved = true;

        for &def_id in &def_ids {
            if graph.def(def_id).resolved {
                continue;
            }
            let top_level_len = graph.def(def_id).elements.len();
            let mut resolved = true;
            let counts = graph.section(section).variable_like_counts.clone();
            {
                let def = graph.def_mut(def_id);
                for_each_leaf_mut(&mut def.elements, &mut |element| {
                    if let PatternElement::VariableLike { text, start } = element {
                        if top_level_len > 1 {
                            if counts.get(text.as_str()).copied().unwrap_or(0) == 0 {
                                // Nothing in the body uses it as an
                                // argument: it is a keyword.
                                *element = PatternElement::Literal {
                                    text: std::mem::take(text),
                                    start: *start,
                                };
                            } else {
                                resolved = false;
                            }
                        }
                    }
                });
            }
            if resolved {
                graph.def_mut(def_id).resolved = true;
                insert_definition(graph, tries, section, def_id);
            } else {
                all_resolved = false;
            }
        }

        if !all_resolved && graph.section(section).unresolved_count == 0 {
            // All body references have resolved, so every decrement already
            // happened; names still counted are stale. Finish the remaining
            // definitions with their undecided names as keywords.
            for &def_id in &def_ids {
                if !graph.def(def_id).resolved {
                    graph.def_mut(def_id).resolved = true;
                    insert_definition(graph, tries, section, def_id);
                }
            }
            all_resolved = true;
        }

        graph.section_mut(section).defs_resolved = all_resolved;
        !all_resolved
    });
}

fn insert_definition(graph: &ProgramGraph, tries: &mut Tries, section: SectionId, def_id: drift_graph::DefId) {
    let kind = trie_kind_for_section(graph.section(section).kind);
    tries
        .for_kind_mut(kind)
        .insert(&graph.def(def_id).elements, def_id);
}

/// Which trie a definition section's patterns go to. Classes are
/// expressions: naming a class yields a type reference.
pub fn trie_kind_for_section(kind: SectionKind) -> PatternKind {
    match kind {
        SectionKind::Effect => PatternKind::Effect,
        SectionKind::Section => PatternKind::Section,
        _ => PatternKind::Expression,
    }
}

// ── References ─────────────────────────────────────────────────────────

/// One pass over a reference worklist. Resolved references leave the list;
/// returns whether anything resolved.
fn resolve_references(
    graph: &mut ProgramGraph,
    tries: &Tries,
    diags: &mut Diagnostics,
    refs: &mut Vec<RefId>,
    decrement_counts_on_resolve: bool,
) -> bool {
    let mut remaining = Vec::with_capacity(refs.len());
    let mut progressed = false;
    for &ref_id in refs.iter() {
        if try_resolve(graph, tries, diags, ref_id, decrement_counts_on_resolve) {
            progressed = true;
        } else {
            remaining.push(ref_id);
        }
    }
    *refs = remaining;
    progressed
}

fn try_resolve(
    graph: &mut ProgramGraph,
    tries: &Tries,
    diags: &mut Diagnostics,
    ref_id: RefId,
    decrement: bool,
) -> bool {
    let section = graph.pattern_ref(ref_id).section;

    if let Some(tree) = matcher::match_reference(graph, tries, ref_id) {
        report_ambiguities(graph, diags, ref_id, &tree);
        let match_id = matcher::intern(graph, tree);
        let line = graph.expr(graph.pattern_ref(ref_id).expression).range.line;
        register_discovered_variables(graph, section, line, match_id);
        {
            let reference = graph.pattern_ref_mut(ref_id);
            reference.matched = Some(match_id);
            reference.resolved = true;
        }
        graph.decrement_unresolved(section);
        if decrement {
            decrement_variable_like_counts(graph, ref_id);
        }
        return true;
    }

    // A reference that is one bare identifier is a variable.
    let promote = {
        let reference = graph.pattern_ref(ref_id);
        reference.elements.len() == 1 && reference.elements[0].is_variable_like()
    };
    if promote {
        let (name, range) = {
            let reference = graph.pattern_ref(ref_id);
            let expr = graph.expr(reference.expression);
            (reference.elements[0].text().to_string(), expr.range)
        };
        {
            let reference = graph.pattern_ref_mut(ref_id);
            let PatternElement::VariableLike { text, start } = reference.elements[0].clone() else {
                unreachable!();
            };
            reference.elements[0] = PatternElement::Variable { text, start };
        }
        let var_ref = graph.alloc_var_ref(range, name);
        graph.add_variable_reference(section, var_ref);
        {
            let reference = graph.pattern_ref_mut(ref_id);
            reference.promoted_var = Some(var_ref);
            reference.resolved = true;
        }
        graph.decrement_unresolved(section);
        if decrement {
            decrement_variable_like_counts(graph, ref_id);
        }
        return true;
    }

    false
}

/// One Info per call site (the reference itself or any nested
/// sub-expression) where several definitions tied; the earliest-defined one
/// was taken.
fn report_ambiguities(
    graph: &ProgramGraph,
    diags: &mut Diagnostics,
    ref_id: RefId,
    tree: &matcher::MatchTree,
) {
    if !tree.ambiguous_with.is_empty() {
        let line = graph.expr(graph.pattern_ref(ref_id).expression).range.line;
        let range = Range::new(line, tree.start, tree.end);
        diags.push(graph.diagnostic_at(
            Severity::Info,
            range,
            "multiple pattern definitions match here; using the first one defined",
        ));
    }
    for sub in &tree.subs {
        report_ambiguities(graph, diags, ref_id, sub);
    }
}

/// Create variable references for every discovered variable of a committed
/// match, including inside its sub-matches. The whole match tree lives on
/// the owning reference's line.
fn register_discovered_variables(
    graph: &mut ProgramGraph,
    section: SectionId,
    line: drift_graph::LineId,
    match_id: drift_graph::MatchId,
) {
    let variable_count = graph.pattern_match(match_id).discovered_variables.len();
    for index in 0..variable_count {
        let (name, start, end) = {
            let var = &graph.pattern_match(match_id).discovered_variables[index];
            (var.name.clone(), var.start, var.end)
        };
        let var_ref = graph.alloc_var_ref(Range::new(line, start, end), name);
        graph.pattern_match_mut(match_id).discovered_variables[index].var_ref = Some(var_ref);
        graph.add_variable_reference(section, var_ref);
    }
    for sub in graph.pattern_match(match_id).sub_matches.clone() {
        register_discovered_variables(graph, section, line, sub);
    }
}

/// After a body reference resolves, its `VariableLike` mentions stop being
/// evidence: decrement the counts on every ancestor definition section.
fn decrement_variable_like_counts(graph: &mut ProgramGraph, ref_id: RefId) {
    let names: Vec<String> = graph
        .pattern_ref(ref_id)
        .elements
        .iter()
        .filter(|e| e.is_variable_like())
        .map(|e| e.text().to_string())
        .collect();
    let mut section = Some(graph.pattern_ref(ref_id).section);
    while let Some(current) = section {
        if !graph.section(current).pattern_definitions.is_empty() {
            for name in &names {
                if let Some(count) = graph
                    .section_mut(current)
                    .variable_like_counts
                    .get_mut(name.as_str())
                {
                    if *count > 0 {
                        *count -= 1;
                    }
                }
            }
        }
        section = graph.section(current).parent;
    }
}

// ── Expansion ──────────────────────────────────────────────────────────

/// Rewrite every `Pending` expression into its resolved form, bottom-up.
fn expand_all(graph: &mut ProgramGraph) {
    for index in 0..graph.lines.len() {
        if let Some(expr) = graph.lines[index].expression {
            expand_expression(graph, expr);
        }
    }
}

fn expand_expression(graph: &mut ProgramGraph, expr_id: ExprId) {
    let args = graph.expr(expr_id).args.clone();
    for arg in args {
        expand_expression(graph, arg);
    }

    let ExprKind::Pending(ref_id) = graph.expr(expr_id).kind else {
        return;
    };
    let (matched, promoted) = {
        let reference = graph.pattern_ref(ref_id);
        (reference.matched, reference.promoted_var)
    };
    if let Some(match_id) = matched {
        expand_match(graph, expr_id, match_id);
        return;
    }
    let is_single_variable = {
        let reference = graph.pattern_ref(ref_id);
        reference.elements.len() == 1
            && matches!(reference.elements[0], PatternElement::Variable { .. })
    };
    if is_single_variable {
        graph.expr_mut(expr_id).kind = ExprKind::Variable(promoted);
        return;
    }
    // A lone intrinsic argument promotes to this expression in place.
    let args = graph.expr(expr_id).args.clone();
    if let [only] = args[..] {
        if matches!(graph.expr(only).kind, ExprKind::IntrinsicCall(_)) {
            let inner = graph.expr(only).clone();
            let expr = graph.expr_mut(expr_id);
            expr.kind = inner.kind;
            expr.args = inner.args;
            expr.range = inner.range;
        }
    }
}

/// Turn a pending expression into a pattern call: its arguments are the
/// carved expressions the match consumed, plus one expression per
/// sub-match, discovered variable and captured word.
fn expand_match(graph: &mut ProgramGraph, expr_id: ExprId, match_id: drift_graph::MatchId) {
    let line = graph.expr(expr_id).range.line;
    let (arguments, subs, variables, words) = {
        let m = graph.pattern_match(match_id);
        (
            m.arguments.clone(),
            m.sub_matches.clone(),
            m.discovered_variables.clone(),
            m.discovered_words.clone(),
        )
    };

    {
        let expr = graph.expr_mut(expr_id);
        expr.kind = ExprKind::PatternCall(match_id);
        expr.args = arguments;
    }

    for sub in subs {
        let (start, end) = {
            let m = graph.pattern_match(sub);
            (m.start, m.end)
        };
        let sub_expr = graph.alloc_expr(ExprKind::PatternCall(sub), Range::new(line, start, end));
        expand_match(graph, sub_expr, sub);
        graph.expr_mut(expr_id).args.push(sub_expr);
    }
    for variable in variables {
        let arg = graph.alloc_expr(
            ExprKind::Variable(variable.var_ref),
            Range::new(line, variable.start, variable.end),
        );
        graph.expr_mut(expr_id).args.push(arg);
    }
    for word in words {
        let arg = graph.alloc_expr(
            ExprKind::Literal(Literal::Str(word.text)),
            Range::new(line, word.start, word.end),
        );
        graph.expr_mut(expr_id).args.push(arg);
    }
}

// ── Variable scopes ────────────────────────────────────────────────────

/// Give every still-unresolved variable name a definition: group its
/// references by the highest ancestor section that mentions the name, make
/// the earliest reference (merged line order) the definition, and register
/// the variable there.
fn resolve_variable_scopes(graph: &mut ProgramGraph) {
    let names: Vec<(String, Vec<VarRefId>)> = graph
        .unresolved_var_refs
        .iter()
        .map(|(name, refs)| (name.clone(), refs.clone()))
        .collect();

    for (name, refs) in names {
        let mut highest_of: Vec<(SectionId, SectionId)> = Vec::new();
        for &var_ref in &refs {
            let section = section_of_var_ref(graph, var_ref);
            if highest_of.iter().any(|&(s, _)| s == section) {
                continue;
            }
            let mut highest = section;
            let mut ancestor = graph.section(section).parent;
            while let Some(current) = ancestor {
                if graph.section(current).variable_refs.contains_key(&name) {
                    highest = current;
                }
                ancestor = graph.section(current).parent;
            }
            highest_of.push((section, highest));
        }

        let mut groups: Vec<(SectionId, Vec<VarRefId>)> = Vec::new();
        for &var_ref in &refs {
            let section = section_of_var_ref(graph, var_ref);
            let highest = highest_of
                .iter()
                .find(|&&(s, _)| s == section)
                .map(|&(_, h)| h)
                .unwrap();
            match groups.iter_mut().find(|(h, _)| *h == highest) {
                Some((_, group)) => group.push(var_ref),
                None => groups.push((highest, vec![var_ref])),
            }
        }

        for (highest, group) in groups {
            let definition = *group
                .iter()
                .min_by_key(|&&r| graph.line(graph.var_ref(r).range.line).merged_index)
                .unwrap();
            let def_section = section_of_var_ref(graph, definition);
            graph
                .section_mut(def_section)
                .variable_defs
                .insert(name.clone(), definition);
            let variable = graph.alloc_variable(name.clone(), definition);
            graph
                .section_mut(highest)
                .variables
                .insert(name.clone(), variable);
            for &var_ref in &group {
                if var_ref != definition {
                    graph.var_ref_mut(var_ref).definition = Some(definition);
                }
            }
        }
    }
}

fn section_of_var_ref(graph: &ProgramGraph, var_ref: VarRefId) -> SectionId {
    graph
        .line(graph.var_ref(var_ref).range.line)
        .section
        .expect("variable references live on analyzed lines")
}
