use std::collections::BTreeMap;
use std::path::PathBuf;

use rustc_hash::FxHashMap;

use drift_common::{Diagnostic, FileId, Severity, SourceFile, SourceSpan};

use crate::element::{for_each_leaf_mut, PatternElement};
use crate::expr::{ExprKind, Expression};
use crate::ids::{
    ClassId, DefId, ExprId, LineId, MatchId, Range, RefId, SectionId, VarId, VarRefId,
};
use crate::transform::TransformedText;
use crate::trie::PatternMatch;
use crate::ty::{BackendBlock, ClassDefinition, Instantiation, Type};

/// What kind of node a [`Section`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// Ordinary code opened by a pattern reference line (or the root).
    Custom,
    /// `section ...:` definition.
    Section,
    /// `effect ...:` definition.
    Effect,
    /// `expression ...:` definition.
    Expression,
    /// `class ...:` definition.
    Class,
    /// `patterns:` -- alias syntaxes for the enclosing definition.
    Patterns,
    /// `execute:` body of an effect or section definition.
    Execute,
    /// `get:` body of an expression definition.
    Get,
    /// `replacement:` body of a macro.
    Replacement,
    /// `members:` field list of a class.
    Members,
}

impl SectionKind {
    /// Definition sections own pattern definitions and scope their bodies.
    pub fn is_definition(self) -> bool {
        matches!(
            self,
            SectionKind::Effect | SectionKind::Expression | SectionKind::Section | SectionKind::Class
        )
    }
}

/// Which trie a pattern reference is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Effect,
    Expression,
    Section,
}

/// One line of the merged source, the unit of parsing.
#[derive(Debug)]
pub struct CodeLine {
    pub id: LineId,
    pub file: FileId,
    /// 0-based index of the line within its own source file.
    pub file_line_index: u32,
    /// Position in the flattened import sequence; total order for tie-breaks.
    pub merged_index: u32,
    /// Original text, without the line terminator.
    pub text: String,
    /// Comment-stripped, right-trimmed text (leading indent kept).
    pub trimmed: String,
    /// Byte length of the leading indent of `trimmed`.
    pub indent_len: u32,
    /// `trimmed` without indent and without a trailing `:`.
    pub pattern_text: String,
    /// Owning section, assigned by the section analyzer.
    pub section: Option<SectionId>,
    /// The child section this line opens, when it ends with `:`.
    pub opens_section: Option<SectionId>,
    /// Top-level expression of the line, filled by the line parser.
    pub expression: Option<ExprId>,
    pub resolved: bool,
}

impl CodeLine {
    pub fn has_child_section(&self) -> bool {
        self.opens_section.is_some()
    }
}

/// A node of the section tree.
#[derive(Debug)]
pub struct Section {
    pub id: SectionId,
    pub kind: SectionKind,
    pub parent: Option<SectionId>,
    pub children: Vec<SectionId>,
    pub lines: Vec<LineId>,
    pub pattern_definitions: Vec<DefId>,
    pub pattern_references: Vec<RefId>,
    /// All textual occurrences of each variable name in this scope.
    pub variable_refs: FxHashMap<String, Vec<VarRefId>>,
    /// The defining occurrence of each variable name, once known.
    pub variable_defs: FxHashMap<String, VarRefId>,
    /// Scope-level variables registered on this section.
    pub variables: FxHashMap<String, VarId>,
    /// Monomorphization: one entry per distinct argument type tuple.
    pub instantiations: BTreeMap<Vec<Type>, Instantiation>,
    pub is_macro: bool,
    pub is_local: bool,
    /// Unresolved references in this subtree; propagates to the parent
    /// exactly on transitions to and from zero.
    pub unresolved_count: u32,
    /// Per VariableLike text: how many unresolved body references mention it.
    pub variable_like_counts: FxHashMap<String, usize>,
    /// Whether all pattern definitions of this section are in the trie.
    pub defs_resolved: bool,
    /// The class payload of a `class ...:` section.
    pub class: Option<ClassId>,
    /// Control-flow wiring recorded by section intrinsics, consumed by the
    /// external code generator.
    pub exit_block: Option<BackendBlock>,
    pub branch_back_block: Option<BackendBlock>,
}

/// A pattern definition: the text after the kind keyword of a definition
/// line, or a line inside a `patterns:` section.
#[derive(Debug)]
pub struct PatternDef {
    pub id: DefId,
    /// The owning definition section.
    pub section: SectionId,
    /// Raw pattern text as written.
    pub text: String,
    pub range: Range,
    /// Parsed elements; `VariableLike` leaves are reclassified in place.
    pub elements: Vec<PatternElement>,
    pub resolved: bool,
}

/// A pattern reference: one transformed pattern text awaiting a trie match.
#[derive(Debug)]
pub struct PatternRef {
    pub id: RefId,
    /// The `Pending` expression this reference belongs to.
    pub expression: ExprId,
    /// The section whose scope the reference lives in.
    pub section: SectionId,
    pub kind: PatternKind,
    /// The transformed pattern text with its line back-mapping.
    pub pattern: TransformedText,
    /// Carved argument expressions, keyed by their starting line column.
    pub args: Vec<(u32, ExprId)>,
    pub elements: Vec<PatternElement>,
    pub matched: Option<MatchId>,
    /// Set when a single-identifier reference was promoted to a variable.
    pub promoted_var: Option<VarRefId>,
    pub resolved: bool,
}

/// One textual occurrence of a variable.
#[derive(Debug)]
pub struct VarRef {
    pub id: VarRefId,
    pub range: Range,
    pub name: String,
    /// The defining occurrence; `None` while unresolved, or when this *is*
    /// the definition.
    pub definition: Option<VarRefId>,
}

impl VarRef {
    pub fn is_definition(&self) -> bool {
        self.definition.is_none()
    }
}

/// A scope-level variable, registered on the ancestor section nearest to the
/// highest-level reference.
#[derive(Debug)]
pub struct Variable {
    pub id: VarId,
    pub name: String,
    pub ty: Type,
    pub definition: VarRefId,
}

/// Owner of every entity the pipeline produces.
///
/// Re-runs (the language server recompiles on every edit) build a fresh
/// graph rather than mutating the previous one.
#[derive(Debug)]
pub struct ProgramGraph {
    pub files: Vec<SourceFile>,
    pub lines: Vec<CodeLine>,
    pub sections: Vec<Section>,
    pub defs: Vec<PatternDef>,
    pub refs: Vec<PatternRef>,
    pub exprs: Vec<Expression>,
    pub var_refs: Vec<VarRef>,
    pub variables: Vec<Variable>,
    pub classes: Vec<ClassDefinition>,
    pub matches: Vec<PatternMatch>,
    /// Variable references that matched no pattern element in any ancestor
    /// definition; resolved by scope grouping after pattern resolution.
    /// Ordered by name so diagnostics stay deterministic.
    pub unresolved_var_refs: BTreeMap<String, Vec<VarRefId>>,
    pub root: SectionId,
}

impl Default for ProgramGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramGraph {
    pub fn new() -> Self {
        let mut graph = Self {
            files: Vec::new(),
            lines: Vec::new(),
            sections: Vec::new(),
            defs: Vec::new(),
            refs: Vec::new(),
            exprs: Vec::new(),
            var_refs: Vec::new(),
            variables: Vec::new(),
            classes: Vec::new(),
            matches: Vec::new(),
            unresolved_var_refs: BTreeMap::new(),
            root: SectionId::ROOT,
        };
        graph.alloc_section(SectionKind::Custom, None);
        graph
    }

    // ── Allocation ─────────────────────────────────────────────────────

    pub fn alloc_file(&mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> FileId {
        let id = FileId(self.files.len() as u32);
        self.files.push(SourceFile::new(id, path, content));
        id
    }

    pub fn alloc_line(&mut self, file: FileId, file_line_index: u32, text: String, trimmed: String) -> LineId {
        let id = LineId(self.lines.len() as u32);
        self.lines.push(CodeLine {
            id,
            file,
            file_line_index,
            merged_index: id.0,
            text,
            trimmed,
            indent_len: 0,
            pattern_text: String::new(),
            section: None,
            opens_section: None,
            expression: None,
            resolved: false,
        });
        id
    }

    pub fn alloc_section(&mut self, kind: SectionKind, parent: Option<SectionId>) -> SectionId {
        let id = SectionId(self.sections.len() as u32);
        self.sections.push(Section {
            id,
            kind,
            parent,
            children: Vec::new(),
            lines: Vec::new(),
            pattern_definitions: Vec::new(),
            pattern_references: Vec::new(),
            variable_refs: FxHashMap::default(),
            variable_defs: FxHashMap::default(),
            variables: FxHashMap::default(),
            instantiations: BTreeMap::new(),
            is_macro: false,
            is_local: false,
            unresolved_count: 0,
            variable_like_counts: FxHashMap::default(),
            defs_resolved: false,
            class: None,
            exit_block: None,
            branch_back_block: None,
        });
        if let Some(parent) = parent {
            self.sections[parent.index()].children.push(id);
        }
        id
    }

    pub fn alloc_def(&mut self, section: SectionId, text: String, range: Range) -> DefId {
        let id = DefId(self.defs.len() as u32);
        self.defs.push(PatternDef {
            id,
            section,
            text,
            range,
            elements: Vec::new(),
            resolved: false,
        });
        self.sections[section.index()].pattern_definitions.push(id);
        id
    }

    pub fn alloc_expr(&mut self, kind: ExprKind, range: Range) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(Expression {
            id,
            kind,
            ty: Type::undeduced(),
            range,
            args: Vec::new(),
        });
        id
    }

    /// Allocate a pattern reference and register it on its section,
    /// incrementing the unresolved tally up the tree.
    pub fn alloc_ref(
        &mut self,
        section: SectionId,
        expression: ExprId,
        kind: PatternKind,
        pattern: TransformedText,
        args: Vec<(u32, ExprId)>,
    ) -> RefId {
        let id = RefId(self.refs.len() as u32);
        self.refs.push(PatternRef {
            id,
            expression,
            section,
            kind,
            pattern,
            args,
            elements: Vec::new(),
            matched: None,
            promoted_var: None,
            resolved: false,
        });
        self.sections[section.index()].pattern_references.push(id);
        self.increment_unresolved(section);
        id
    }

    pub fn alloc_var_ref(&mut self, range: Range, name: String) -> VarRefId {
        let id = VarRefId(self.var_refs.len() as u32);
        self.var_refs.push(VarRef { id, range, name, definition: None });
        id
    }

    pub fn alloc_variable(&mut self, name: String, definition: VarRefId) -> VarId {
        let id = VarId(self.variables.len() as u32);
        self.variables.push(Variable {
            id,
            name,
            ty: Type::undeduced(),
            definition,
        });
        id
    }

    pub fn alloc_class(&mut self) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        self.classes.push(ClassDefinition::default());
        id
    }

    pub fn alloc_match(&mut self, m: PatternMatch) -> MatchId {
        let id = MatchId(self.matches.len() as u32);
        self.matches.push(m);
        id
    }

    // ── Accessors ──────────────────────────────────────────────────────

    pub fn file(&self, id: FileId) -> &SourceFile {
        &self.files[id.0 as usize]
    }

    pub fn line(&self, id: LineId) -> &CodeLine {
        &self.lines[id.index()]
    }

    pub fn line_mut(&mut self, id: LineId) -> &mut CodeLine {
        &mut self.lines[id.index()]
    }

    pub fn section(&self, id: SectionId) -> &Section {
        &self.sections[id.index()]
    }

    pub fn section_mut(&mut self, id: SectionId) -> &mut Section {
        &mut self.sections[id.index()]
    }

    pub fn def(&self, id: DefId) -> &PatternDef {
        &self.defs[id.index()]
    }

    pub fn def_mut(&mut self, id: DefId) -> &mut PatternDef {
        &mut self.defs[id.index()]
    }

    pub fn pattern_ref(&self, id: RefId) -> &PatternRef {
        &self.refs[id.index()]
    }

    pub fn pattern_ref_mut(&mut self, id: RefId) -> &mut PatternRef {
        &mut self.refs[id.index()]
    }

    pub fn expr(&self, id: ExprId) -> &Expression {
        &self.exprs[id.index()]
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expression {
        &mut self.exprs[id.index()]
    }

    pub fn var_ref(&self, id: VarRefId) -> &VarRef {
        &self.var_refs[id.index()]
    }

    pub fn var_ref_mut(&mut self, id: VarRefId) -> &mut VarRef {
        &mut self.var_refs[id.index()]
    }

    pub fn variable(&self, id: VarId) -> &Variable {
        &self.variables[id.index()]
    }

    pub fn variable_mut(&mut self, id: VarId) -> &mut Variable {
        &mut self.variables[id.index()]
    }

    pub fn class(&self, id: ClassId) -> &ClassDefinition {
        &self.classes[id.index()]
    }

    pub fn class_mut(&mut self, id: ClassId) -> &mut ClassDefinition {
        &mut self.classes[id.index()]
    }

    pub fn pattern_match(&self, id: MatchId) -> &PatternMatch {
        &self.matches[id.index()]
    }

    pub fn pattern_match_mut(&mut self, id: MatchId) -> &mut PatternMatch {
        &mut self.matches[id.index()]
    }

    // ── Ranges and diagnostics ─────────────────────────────────────────

    /// Resolve a line-relative range to a file position.
    pub fn resolve_range(&self, range: Range) -> SourceSpan {
        let line = self.line(range.line);
        SourceSpan::on_line(line.file, line.file_line_index + 1, range.start, range.end)
    }

    /// Build a diagnostic anchored at `range`.
    pub fn diagnostic_at(&self, severity: Severity, range: Range, message: impl Into<String>) -> Diagnostic {
        let span = self.resolve_range(range);
        Diagnostic::new(
            severity,
            self.file(span.file).display_path(),
            span.start.line,
            span.start.col,
            span.end.line,
            span.end.col,
            message,
        )
    }

    // ── Scope and resolution bookkeeping ───────────────────────────────

    /// Walk `section` and its ancestors for a registered variable.
    pub fn find_variable(&self, section: SectionId, name: &str) -> Option<VarId> {
        let mut current = Some(section);
        while let Some(id) = current {
            let sec = self.section(id);
            if let Some(&var) = sec.variables.get(name) {
                return Some(var);
            }
            current = sec.parent;
        }
        None
    }

    pub fn increment_unresolved(&mut self, section: SectionId) {
        if self.sections[section.index()].unresolved_count == 0 {
            if let Some(parent) = self.sections[section.index()].parent {
                self.increment_unresolved(parent);
            }
        }
        self.sections[section.index()].unresolved_count += 1;
    }

    pub fn decrement_unresolved(&mut self, section: SectionId) {
        let sec = &mut self.sections[section.index()];
        debug_assert!(sec.unresolved_count > 0, "unresolved count underflow");
        sec.unresolved_count -= 1;
        if sec.unresolved_count == 0 {
            if let Some(parent) = sec.parent {
                self.decrement_unresolved(parent);
            }
        }
    }

    /// Register a variable reference on a section and hunt for its
    /// definition among the pattern parameters of enclosing definitions.
    ///
    /// A matching `VariableLike` element is reclassified to `Variable` in
    /// place (a word capture matches by name but keeps its kind). The first
    /// matching element becomes the definition point; references that match
    /// nothing anywhere up the tree go to the deferred scope-resolution
    /// list.
    pub fn add_variable_reference(&mut self, section: SectionId, var_ref: VarRefId) {
        let name = self.var_refs[var_ref.index()].name.clone();
        self.sections[section.index()]
            .variable_refs
            .entry(name.clone())
            .or_default()
            .push(var_ref);
        self.search_parent_patterns(section, var_ref, &name);
    }

    fn search_parent_patterns(&mut self, section: SectionId, var_ref: VarRefId, name: &str) {
        // Scan this section's definitions for a pattern element with the
        // reference's name, rewriting every matching VariableLike leaf.
        let def_ids = self.sections[section.index()].pattern_definitions.clone();
        let mut first_match: Option<(DefId, u32, u32)> = None;
        for def_id in def_ids {
            let def = &mut self.defs[def_id.index()];
            let def_range = def.range;
            for_each_leaf_mut(&mut def.elements, &mut |element| {
                let matched = match element {
                    PatternElement::VariableLike { text, start } if text == name => {
                        let (text, start) = (std::mem::take(text), *start);
                        let len = text.len() as u32;
                        *element = PatternElement::Variable { text, start };
                        Some((start, len))
                    }
                    PatternElement::Variable { text, start } if text == name => {
                        Some((*start, text.len() as u32))
                    }
                    PatternElement::WordCapture { name: capture, start } if capture == name => {
                        Some((*start, capture.len() as u32))
                    }
                    _ => None,
                };
                if let (Some((start, len)), None) = (matched, first_match) {
                    first_match = Some((def_id, def_range.start + start, len));
                }
            });
        }

        if let Some((def_id, start, len)) = first_match {
            let definition = match self.sections[section.index()].variable_defs.get(name) {
                Some(&existing) => existing,
                None => {
                    let def_line = self.defs[def_id.index()].range.line;
                    let definition = self.alloc_var_ref(Range::new(def_line, start, start + len), name.to_string());
                    let sec = &mut self.sections[section.index()];
                    sec.variable_defs.insert(name.to_string(), definition);
                    sec.variable_refs.entry(name.to_string()).or_default().push(definition);
                    definition
                }
            };
            if var_ref != definition {
                self.var_refs[var_ref.index()].definition = Some(definition);
            }
            return;
        }

        match self.sections[section.index()].parent {
            Some(parent) => self.search_parent_patterns(parent, var_ref, name),
            None => {
                self.unresolved_var_refs
                    .entry(name.to_string())
                    .or_default()
                    .push(var_ref);
            }
        }
    }

    /// Sort expression ids by their starting column, the order pattern
    /// parameters are bound in.
    pub fn sort_args_by_position(&self, args: &[ExprId]) -> Vec<ExprId> {
        let mut sorted = args.to_vec();
        sorted.sort_by_key(|&id| {
            let range = self.expr(id).range;
            (self.line(range.line).merged_index, range.start)
        });
        sorted
    }
}
