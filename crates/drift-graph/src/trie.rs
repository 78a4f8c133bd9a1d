use rustc_hash::FxHashMap;

use crate::element::PatternElement;
use crate::graph::PatternKind;
use crate::ids::{DefId, ExprId, MatchId, NodeId, VarRefId};

/// One node of a pattern trie.
///
/// Nodes are shared across definitions whenever prefix paths coincide, so
/// common prefixes and `[a|b]` alternatives converge. `parameter_names`
/// remembers, per definition, which parameter the capture edge into this
/// node binds, preserving positional order across shared paths.
#[derive(Debug, Default)]
pub struct TrieNode {
    pub literal_children: FxHashMap<String, NodeId>,
    pub variable_child: Option<NodeId>,
    pub word_child: Option<NodeId>,
    pub patterns_ended_here: Vec<DefId>,
    pub parameter_names: FxHashMap<DefId, String>,
}

/// An arena-backed pattern trie.
#[derive(Debug)]
pub struct PatternTrie {
    nodes: Vec<TrieNode>,
    root: NodeId,
}

impl Default for PatternTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternTrie {
    pub fn new() -> Self {
        Self {
            nodes: vec![TrieNode::default()],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &TrieNode {
        &self.nodes[id.index()]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn alloc(&mut self) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(TrieNode::default());
        id
    }

    /// Insert a definition's elements.
    ///
    /// Insertion walks a *frontier* of nodes rather than a single node: a
    /// `Choice` leaves one terminus per alternative and the following
    /// element continues from all of them. Existing children are reused;
    /// frontier nodes missing a child all gain the same newly created
    /// successor, so alternatives converge back into shared suffixes.
    pub fn insert(&mut self, elements: &[PatternElement], def: DefId) {
        let root = self.root;
        let termini = self.insert_elements(&[root], elements, def);
        for node in termini {
            let ended = &mut self.nodes[node.index()].patterns_ended_here;
            if !ended.contains(&def) {
                ended.push(def);
            }
        }
    }

    fn insert_elements(&mut self, frontier: &[NodeId], elements: &[PatternElement], def: DefId) -> Vec<NodeId> {
        let mut frontier = frontier.to_vec();
        // Adjacent literal runs (including VariableLike leaves classified as
        // keywords) merge into a single edge for trie compactness.
        let mut literal = String::new();
        for element in elements {
            match element {
                PatternElement::Literal { text, .. } | PatternElement::VariableLike { text, .. } => {
                    literal.push_str(text);
                }
                PatternElement::Variable { text, .. } => {
                    if !literal.is_empty() {
                        frontier = self.advance_literal(&frontier, &literal);
                        literal.clear();
                    }
                    frontier = self.advance_capture(&frontier, CaptureEdge::Variable, def, text);
                }
                PatternElement::WordCapture { name, .. } => {
                    if !literal.is_empty() {
                        frontier = self.advance_literal(&frontier, &literal);
                        literal.clear();
                    }
                    frontier = self.advance_capture(&frontier, CaptureEdge::Word, def, name);
                }
                PatternElement::Choice { alternatives, .. } => {
                    if !literal.is_empty() {
                        frontier = self.advance_literal(&frontier, &literal);
                        literal.clear();
                    }
                    let mut next = Vec::new();
                    for alternative in alternatives {
                        let termini = if alternative.is_empty() {
                            frontier.clone()
                        } else {
                            self.insert_elements(&frontier, alternative, def)
                        };
                        for node in termini {
                            if !next.contains(&node) {
                                next.push(node);
                            }
                        }
                    }
                    frontier = next;
                }
            }
        }
        if !literal.is_empty() {
            frontier = self.advance_literal(&frontier, &literal);
        }
        frontier
    }

    fn advance_literal(&mut self, frontier: &[NodeId], text: &str) -> Vec<NodeId> {
        let mut next = Vec::new();
        let mut shared_new: Option<NodeId> = None;
        for &node in frontier {
            let child = match self.nodes[node.index()].literal_children.get(text) {
                Some(&existing) => existing,
                None => {
                    let child = *shared_new.get_or_insert_with(|| {
                        let id = NodeId(self.nodes.len() as u32);
                        self.nodes.push(TrieNode::default());
                        id
                    });
                    self.nodes[node.index()]
                        .literal_children
                        .insert(text.to_string(), child);
                    child
                }
            };
            if !next.contains(&child) {
                next.push(child);
            }
        }
        next
    }

    fn advance_capture(&mut self, frontier: &[NodeId], edge: CaptureEdge, def: DefId, name: &str) -> Vec<NodeId> {
        let mut next = Vec::new();
        let mut shared_new: Option<NodeId> = None;
        for &node in frontier {
            let slot = match edge {
                CaptureEdge::Variable => self.nodes[node.index()].variable_child,
                CaptureEdge::Word => self.nodes[node.index()].word_child,
            };
            let child = match slot {
                Some(existing) => existing,
                None => {
                    let child = *shared_new.get_or_insert_with(|| {
                        let id = NodeId(self.nodes.len() as u32);
                        self.nodes.push(TrieNode::default());
                        id
                    });
                    match edge {
                        CaptureEdge::Variable => self.nodes[node.index()].variable_child = Some(child),
                        CaptureEdge::Word => self.nodes[node.index()].word_child = Some(child),
                    }
                    child
                }
            };
            self.nodes[child.index()]
                .parameter_names
                .insert(def, name.to_string());
            if !next.contains(&child) {
                next.push(child);
            }
        }
        next
    }
}

#[derive(Clone, Copy)]
enum CaptureEdge {
    Variable,
    Word,
}

/// The tries of one compilation, one per pattern kind. Class definitions
/// share the expression trie: naming a class is an expression.
#[derive(Debug, Default)]
pub struct Tries {
    pub effect: PatternTrie,
    pub expression: PatternTrie,
    pub section: PatternTrie,
}

impl Tries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_kind(&self, kind: PatternKind) -> &PatternTrie {
        match kind {
            PatternKind::Effect => &self.effect,
            PatternKind::Expression => &self.expression,
            PatternKind::Section => &self.section,
        }
    }

    pub fn for_kind_mut(&mut self, kind: PatternKind) -> &mut PatternTrie {
        match kind {
            PatternKind::Effect => &mut self.effect,
            PatternKind::Expression => &mut self.expression,
            PatternKind::Section => &mut self.section,
        }
    }

    /// The trie a definition section's patterns live in. Class patterns are
    /// expressions.
    pub fn for_section(&self, kind: crate::graph::SectionKind) -> &PatternTrie {
        use crate::graph::SectionKind;
        match kind {
            SectionKind::Effect => &self.effect,
            SectionKind::Section => &self.section,
            _ => &self.expression,
        }
    }
}

/// A discovered variable occurrence inside a match. The reference is filled
/// in when the match commits.
#[derive(Debug, Clone)]
pub struct VariableMatch {
    pub name: String,
    pub start: u32,
    pub end: u32,
    pub var_ref: Option<VarRefId>,
}

/// A `{word:...}` capture inside a match; becomes a string literal argument.
#[derive(Debug, Clone)]
pub struct WordMatch {
    pub text: String,
    pub start: u32,
    pub end: u32,
}

/// One successful walk of a trie over a reference's transformed text.
///
/// `nodes_passed` together with the per-definition `parameter_names` on the
/// nodes reconstructs positional parameter order; `start`/`end` are line
/// columns.
#[derive(Debug, Clone)]
pub struct PatternMatch {
    pub end_node: NodeId,
    pub def: DefId,
    pub start: u32,
    pub end: u32,
    pub nodes_passed: Vec<NodeId>,
    /// Carved argument expressions, in consumption order.
    pub arguments: Vec<ExprId>,
    pub discovered_variables: Vec<VariableMatch>,
    pub discovered_words: Vec<WordMatch>,
    pub sub_matches: Vec<MatchId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(text: &str) -> PatternElement {
        PatternElement::Literal { text: text.into(), start: 0 }
    }

    fn var(name: &str) -> PatternElement {
        PatternElement::Variable { text: name.into(), start: 0 }
    }

    /// Walk literal edges by text, for assertions.
    fn walk(trie: &PatternTrie, path: &[&str]) -> Option<NodeId> {
        let mut node = trie.root();
        for step in path {
            node = *trie.node(node).literal_children.get(*step)?;
        }
        Some(node)
    }

    #[test]
    fn insert_then_walk_reaches_end_node() {
        let mut trie = PatternTrie::new();
        let def = DefId(0);
        trie.insert(&[lit("print"), lit(" "), var("value")], def);

        // "print" and " " merged into one edge.
        let after_print = walk(&trie, &["print "]).expect("literal edge");
        let var_node = trie.node(after_print).variable_child.expect("variable edge");
        assert_eq!(trie.node(var_node).patterns_ended_here, vec![def]);
        assert_eq!(trie.node(var_node).parameter_names[&def], "value");
    }

    #[test]
    fn shared_prefixes_reuse_nodes() {
        let mut trie = PatternTrie::new();
        trie.insert(&[lit("set "), var("a"), lit(" to "), var("b")], DefId(0));
        let count_after_first = trie.node_count();
        trie.insert(&[lit("set "), var("x"), lit(" backwards")], DefId(1));
        // The "set " edge and the variable child are reused; only the
        // " backwards" suffix is new.
        assert_eq!(trie.node_count(), count_after_first + 1);

        let var_node = trie
            .node(walk(&trie, &["set "]).unwrap())
            .variable_child
            .unwrap();
        assert_eq!(trie.node(var_node).parameter_names[&DefId(0)], "a");
        assert_eq!(trie.node(var_node).parameter_names[&DefId(1)], "x");
    }

    #[test]
    fn choice_alternatives_converge() {
        // `[the|] result` with the space absorbed into the non-empty
        // alternative: both paths end at the same node.
        let mut trie = PatternTrie::new();
        let def = DefId(0);
        let choice = PatternElement::Choice {
            alternatives: vec![vec![lit("the ")], vec![]],
            start: 0,
        };
        trie.insert(&[choice, lit("result")], def);

        let with_article = walk(&trie, &["the ", "result"]).expect("long path");
        let without = walk(&trie, &["result"]).expect("short path");
        assert_eq!(with_article, without);
        assert_eq!(trie.node(without).patterns_ended_here, vec![def]);
    }

    #[test]
    fn duplicate_definitions_share_an_end_node() {
        let mut trie = PatternTrie::new();
        trie.insert(&[var("a"), lit(" + "), var("b")], DefId(0));
        trie.insert(&[var("c"), lit(" + "), var("d")], DefId(1));
        let first = trie.node(trie.root()).variable_child.unwrap();
        let plus = walk_from(&trie, first, " + ");
        let second = trie.node(plus).variable_child.unwrap();
        assert_eq!(trie.node(second).patterns_ended_here, vec![DefId(0), DefId(1)]);
    }

    fn walk_from(trie: &PatternTrie, from: NodeId, text: &str) -> NodeId {
        trie.node(from).literal_children[text]
    }
}
