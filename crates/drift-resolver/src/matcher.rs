//! Backtracking trie matching.
//!
//! A reference's transformed text is walked through its trie character by
//! character. At each node the walker tries, most specific first: literal
//! edges (longest first), then the variable edge -- which can consume an
//! argument slot, open a nested sub-match rooted at the expression trie, or
//! swallow one identifier as a discovered variable -- and finally the word
//! capture edge. The search is exhaustive but budgeted; all complete
//! candidates are collected and ranked by specificity, consumed length and
//! definition insertion order.

use drift_graph::{
    DefId, ExprId, NodeId, PatternMatch, PatternTrie, ProgramGraph, RefId, TransformedText, Tries,
    VariableMatch, WordMatch, ARGUMENT_CHAR,
};

/// Nested sub-matches deeper than this stop opening further sub-matches.
const MAX_SUB_DEPTH: u32 = 32;
/// Search steps allowed per byte of reference text.
const BUDGET_PER_BYTE: usize = 64;
const BUDGET_BASE: usize = 4096;

/// A candidate match before it is committed to the graph.
#[derive(Debug, Clone)]
pub struct MatchTree {
    pub end_node: NodeId,
    pub def: DefId,
    /// Line columns covered by the match.
    pub start: u32,
    pub end: u32,
    /// Pattern byte position where the walk stopped (for sub-matches).
    pub end_pos: usize,
    /// Literal edges traversed: the specificity of the match.
    pub literal_edges: u32,
    pub nodes_passed: Vec<NodeId>,
    pub arguments: Vec<ExprId>,
    pub discovered_variables: Vec<(String, u32, u32)>,
    pub discovered_words: Vec<(String, u32, u32)>,
    pub subs: Vec<MatchTree>,
    /// Other definitions that tied with this one at the same end node with
    /// the same specificity. The resolver reports them as an Info.
    pub ambiguous_with: Vec<DefId>,
}

/// Try to match a reference against its trie. Returns `None` when no walk
/// consumes the whole text.
pub fn match_reference(graph: &ProgramGraph, tries: &Tries, ref_id: RefId) -> Option<MatchTree> {
    let reference = graph.pattern_ref(ref_id);
    let text = reference.pattern.text();
    if text.is_empty() {
        return None;
    }

    let ctx = Ctx {
        tries,
        pattern: &reference.pattern,
        args: &reference.args,
        text,
    };
    let trie = tries.for_kind(reference.kind);
    let mut budget = BUDGET_BASE + text.len() * BUDGET_PER_BYTE;
    let mut candidates = Vec::new();
    search(
        &ctx,
        trie,
        trie.root(),
        0,
        0,
        &Progress::default(),
        true,
        0,
        &mut budget,
        &mut candidates,
    );

    let best = select_best(&candidates)?;
    let mut tree = best.clone();
    for candidate in &candidates {
        if candidate.end_node == tree.end_node
            && candidate.literal_edges == tree.literal_edges
            && candidate.def != tree.def
            && !tree.ambiguous_with.contains(&candidate.def)
        {
            tree.ambiguous_with.push(candidate.def);
        }
    }
    Some(tree)
}

/// Rank candidates: more literal edges, then longer consumed text, then the
/// earliest-inserted definition. Earlier discovery wins remaining ties.
fn select_best(candidates: &[MatchTree]) -> Option<&MatchTree> {
    let mut best: Option<&MatchTree> = None;
    for candidate in candidates {
        let better = match best {
            None => true,
            Some(current) => {
                (candidate.literal_edges, candidate.end_pos, std::cmp::Reverse(candidate.def))
                    > (current.literal_edges, current.end_pos, std::cmp::Reverse(current.def))
            }
        };
        if better {
            best = Some(candidate);
        }
    }
    best
}

struct Ctx<'a> {
    tries: &'a Tries,
    pattern: &'a TransformedText,
    args: &'a [(u32, ExprId)],
    text: &'a str,
}

impl Ctx<'_> {
    /// The carved argument expression whose slot sits at this pattern
    /// position.
    fn arg_at(&self, pos: usize) -> Option<ExprId> {
        let col = self.pattern.line_pos(pos);
        self.args.iter().find(|&&(c, _)| c == col).map(|&(_, id)| id)
    }
}

#[derive(Debug, Clone, Default)]
struct Progress {
    literal_edges: u32,
    nodes_passed: Vec<NodeId>,
    arguments: Vec<ExprId>,
    variables: Vec<(String, u32, u32)>,
    words: Vec<(String, u32, u32)>,
    subs: Vec<MatchTree>,
}

#[allow(clippy::too_many_arguments)]
fn search(
    ctx: &Ctx<'_>,
    trie: &PatternTrie,
    node: NodeId,
    pos: usize,
    start_pos: usize,
    progress: &Progress,
    require_full: bool,
    depth: u32,
    budget: &mut usize,
    out: &mut Vec<MatchTree>,
) {
    let current = trie.node(node);

    // A node where definitions end completes the walk -- for the root
    // reference only at end of text, for sub-matches anywhere past the
    // start.
    if !current.patterns_ended_here.is_empty()
        && pos > start_pos
        && (!require_full || pos == ctx.text.len())
    {
        for &def in &current.patterns_ended_here {
            out.push(MatchTree {
                end_node: node,
                def,
                start: ctx.pattern.line_pos(start_pos),
                end: ctx.pattern.line_pos(pos),
                end_pos: pos,
                literal_edges: progress.literal_edges,
                nodes_passed: progress.nodes_passed.clone(),
                arguments: progress.arguments.clone(),
                discovered_variables: progress.variables.clone(),
                discovered_words: progress.words.clone(),
                subs: progress.subs.clone(),
                ambiguous_with: Vec::new(),
            });
        }
    }

    if pos >= ctx.text.len() {
        return;
    }
    if *budget == 0 {
        return;
    }
    *budget -= 1;

    let rest = &ctx.text[pos..];

    // 1. Literal edges, longest first (then lexicographic, for determinism).
    let mut literals: Vec<(&String, NodeId)> =
        current.literal_children.iter().map(|(k, &v)| (k, v)).collect();
    literals.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));
    for (key, child) in literals {
        if rest.starts_with(key.as_str()) {
            let mut next = progress.clone();
            next.literal_edges += 1;
            next.nodes_passed.push(child);
            search(ctx, trie, child, pos + key.len(), start_pos, &next, require_full, depth, budget, out);
        }
    }

    // 2. The variable edge.
    if let Some(variable_child) = current.variable_child {
        // 2a. An argument slot: one carved expression.
        if rest.starts_with(ARGUMENT_CHAR) {
            if let Some(arg) = ctx.arg_at(pos) {
                let mut next = progress.clone();
                next.nodes_passed.push(variable_child);
                next.arguments.push(arg);
                search(
                    ctx,
                    trie,
                    variable_child,
                    pos + ARGUMENT_CHAR.len_utf8(),
                    start_pos,
                    &next,
                    require_full,
                    depth,
                    budget,
                    out,
                );
            }
        }

        // 2b. A bare identifier: a discovered variable.
        if let Some(len) = identifier_len(rest) {
            let mut next = progress.clone();
            next.nodes_passed.push(variable_child);
            next.variables.push((
                rest[..len].to_string(),
                ctx.pattern.line_pos(pos),
                ctx.pattern.line_pos(pos + len),
            ));
            search(ctx, trie, variable_child, pos + len, start_pos, &next, require_full, depth, budget, out);
        }

        // 2c. A nested expression pattern, matched from the expression
        // trie. Tried last: the sub-search is the expensive branch and all
        // candidates are ranked afterwards anyway.
        if depth < MAX_SUB_DEPTH {
            let expression_trie = &ctx.tries.expression;
            let mut sub_candidates = Vec::new();
            search(
                ctx,
                expression_trie,
                expression_trie.root(),
                pos,
                pos,
                &Progress::default(),
                false,
                depth + 1,
                budget,
                &mut sub_candidates,
            );
            // Continue the parent once per distinct end position, with the
            // best-ranked sub-match for that position.
            let mut tried_ends: Vec<usize> = Vec::new();
            loop {
                let next_group: Vec<&MatchTree> = sub_candidates
                    .iter()
                    .filter(|s| !tried_ends.contains(&s.end_pos))
                    .collect();
                if next_group.is_empty() {
                    break;
                }
                let end_pos = next_group[0].end_pos;
                let group: Vec<&MatchTree> =
                    next_group.into_iter().filter(|s| s.end_pos == end_pos).collect();
                tried_ends.push(end_pos);
                let chosen = group
                    .iter()
                    .copied()
                    .max_by_key(|s| (s.literal_edges, std::cmp::Reverse(s.def)))
                    .unwrap();
                let mut sub = chosen.clone();
                for other in &group {
                    if other.end_node == sub.end_node
                        && other.literal_edges == sub.literal_edges
                        && other.def != sub.def
                        && !sub.ambiguous_with.contains(&other.def)
                    {
                        sub.ambiguous_with.push(other.def);
                    }
                }
                let mut next = progress.clone();
                next.nodes_passed.push(variable_child);
                next.subs.push(sub);
                search(ctx, trie, variable_child, end_pos, start_pos, &next, require_full, depth, budget, out);
            }
        }
    }

    // 3. The word capture edge: exactly one identifier.
    if let Some(word_child) = current.word_child {
        if let Some(len) = identifier_len(rest) {
            let mut next = progress.clone();
            next.nodes_passed.push(word_child);
            next.words.push((
                rest[..len].to_string(),
                ctx.pattern.line_pos(pos),
                ctx.pattern.line_pos(pos + len),
            ));
            search(ctx, trie, word_child, pos + len, start_pos, &next, require_full, depth, budget, out);
        }
    }
}

/// Length of the identifier at the start of `text` (`[A-Za-z_][A-Za-z0-9_]*`).
fn identifier_len(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let first = *bytes.first()?;
    if !(first.is_ascii_alphabetic() || first == b'_') {
        return None;
    }
    let mut len = 1;
    while len < bytes.len() && (bytes[len].is_ascii_alphanumeric() || bytes[len] == b'_') {
        len += 1;
    }
    Some(len)
}

/// Commit a match tree into the graph arena, sub-matches first.
pub fn intern(graph: &mut ProgramGraph, tree: MatchTree) -> drift_graph::MatchId {
    let sub_matches = tree
        .subs
        .into_iter()
        .map(|sub| intern(graph, sub))
        .collect();
    graph.alloc_match(PatternMatch {
        end_node: tree.end_node,
        def: tree.def,
        start: tree.start,
        end: tree.end,
        nodes_passed: tree.nodes_passed,
        arguments: tree.arguments,
        discovered_variables: tree
            .discovered_variables
            .into_iter()
            .map(|(name, start, end)| VariableMatch { name, start, end, var_ref: None })
            .collect(),
        discovered_words: tree
            .discovered_words
            .into_iter()
            .map(|(text, start, end)| WordMatch { text, start, end })
            .collect(),
        sub_matches,
    })
}
