//! Section analysis: indentation, the section tree, and line dispatch.
//!
//! Indentation carries the structure. A line ending with `:` opens a child
//! section; the indent unit is discovered from the first indented line and
//! every later indent must be a whole multiple of it using the same
//! character. Exiting levels closes sections; skipping a level going deeper
//! is the one unrecoverable error of this stage.

use drift_common::{Diagnostics, Severity};
use drift_graph::{
    FieldDef, LineId, PatternKind, ProgramGraph, Range, SectionId, SectionKind, Type,
};

use crate::line_parser;

/// Over-indentation aborts section analysis; no tree can be built past it.
#[derive(Debug)]
pub struct OverIndentError;

/// Build the section tree over the merged line sequence.
pub fn analyze(
    graph: &mut ProgramGraph,
    diags: &mut Diagnostics,
) -> Result<(), OverIndentError> {
    let mut analyzer = Analyzer {
        current: graph.root,
        unit: None,
        level: 0,
        warned_mixed_unit: false,
    };
    for index in 0..graph.lines.len() {
        analyzer.process(graph, diags, LineId(index as u32))?;
    }
    create_declared_instantiations(graph);
    Ok(())
}

struct Analyzer {
    current: SectionId,
    /// Indent unit: the character and how many of it make one level.
    unit: Option<(char, usize)>,
    level: u32,
    warned_mixed_unit: bool,
}

impl Analyzer {
    fn process(
        &mut self,
        graph: &mut ProgramGraph,
        diags: &mut Diagnostics,
        line_id: LineId,
    ) -> Result<(), OverIndentError> {
        let trimmed = graph.line(line_id).trimmed.clone();

        // Blank and comment-only lines belong to the current section but do
        // not participate in indent tracking.
        if trimmed.is_empty() {
            let line = graph.line_mut(line_id);
            line.section = Some(self.current);
            line.resolved = true;
            graph.section_mut(self.current).lines.push(line_id);
            return Ok(());
        }

        let indent: String = trimmed.chars().take_while(|c| c.is_whitespace()).collect();
        let new_level = self.indent_level(graph, diags, line_id, &indent);

        if new_level > self.level {
            // Deeper than the open section: levels can only be entered one
            // at a time, through a line ending in `:`.
            let range = Range::new(line_id, 0, indent.len() as u32);
            diags.push(graph.diagnostic_at(
                Severity::Error,
                range,
                format!(
                    "invalid indentation: expected at most {} levels, found {}",
                    self.level, new_level
                ),
            ));
            return Err(OverIndentError);
        }
        for _ in new_level..self.level {
            if let Some(parent) = graph.section(self.current).parent {
                self.current = parent;
            }
        }
        self.level = new_level;

        graph.line_mut(line_id).section = Some(self.current);
        graph.line_mut(line_id).indent_len = indent.len() as u32;
        graph.section_mut(self.current).lines.push(line_id);

        let code = &trimmed[indent.len()..];
        if let Some(header) = code.strip_suffix(':') {
            graph.line_mut(line_id).pattern_text = header.to_string();
            let child = self.create_section(graph, diags, line_id);
            graph.line_mut(line_id).opens_section = Some(child);
            self.current = child;
            self.level += 1;
        } else {
            graph.line_mut(line_id).pattern_text = code.to_string();
            if code.is_empty() {
                graph.line_mut(line_id).resolved = true;
            } else {
                self.process_line(graph, diags, line_id);
            }
        }
        Ok(())
    }

    /// Indent level of a line, discovering the unit on the first indented
    /// line and diagnosing width and character mismatches after that.
    fn indent_level(
        &mut self,
        graph: &ProgramGraph,
        diags: &mut Diagnostics,
        line_id: LineId,
        indent: &str,
    ) -> u32 {
        if indent.is_empty() {
            return 0;
        }

        let (unit_char, unit_width) = match self.unit {
            Some(unit) => unit,
            None => {
                let first = indent.chars().next().unwrap();
                let run = indent.chars().take_while(|&c| c == first).count();
                if run < indent.chars().count() && !self.warned_mixed_unit {
                    // Mixed characters inside the discovering indent: the
                    // leading character wins as the unit.
                    self.warned_mixed_unit = true;
                    let range = Range::new(line_id, 0, indent.len() as u32);
                    diags.push(graph.diagnostic_at(
                        Severity::Warning,
                        range,
                        format!(
                            "indentation mixes {}s and other whitespace; using the {} as the indent unit",
                            char_name(first),
                            char_name(first)
                        ),
                    ));
                }
                self.unit = Some((first, run));
                return 1;
            }
        };

        if let Some(bad) = indent.chars().position(|c| c != unit_char) {
            let range = Range::new(line_id, bad as u32, indent.len() as u32);
            diags.push(graph.diagnostic_at(
                Severity::Error,
                range,
                format!(
                    "invalid indentation: expected only {}s, found a {}",
                    char_name(unit_char),
                    char_name(indent.chars().nth(bad).unwrap())
                ),
            ));
            // The previous level carries on; the line stays where it was.
            return self.level;
        }

        let width = indent.chars().count();
        if width % unit_width != 0 {
            let range = Range::new(line_id, 0, indent.len() as u32);
            diags.push(graph.diagnostic_at(
                Severity::Warning,
                range,
                format!(
                    "invalid indentation: expected a multiple of {} {}s, found {}",
                    unit_width,
                    char_name(unit_char),
                    width
                ),
            ));
        }
        (width / unit_width) as u32
    }

    // ── Section creation ───────────────────────────────────────────────

    /// Create the child section a `:` line opens, dispatching on the kind
    /// of the section the line sits in.
    fn create_section(
        &mut self,
        graph: &mut ProgramGraph,
        diags: &mut Diagnostics,
        line_id: LineId,
    ) -> SectionId {
        let parent = self.current;
        let parent_kind = graph.section(parent).kind;
        let header = graph.line(line_id).pattern_text.clone();

        match parent_kind {
            SectionKind::Custom
            | SectionKind::Execute
            | SectionKind::Get
            | SectionKind::Replacement => self.create_from_keywords(graph, diags, line_id, &header),
            SectionKind::Effect | SectionKind::Section => {
                self.create_definition_body(graph, diags, line_id, &header, "execute", SectionKind::Execute)
            }
            SectionKind::Expression => {
                self.create_definition_body(graph, diags, line_id, &header, "get", SectionKind::Get)
            }
            SectionKind::Class => match header.as_str() {
                "patterns" => graph.alloc_section(SectionKind::Patterns, Some(parent)),
                "members" => graph.alloc_section(SectionKind::Members, Some(parent)),
                _ => self.create_definition_body(graph, diags, line_id, &header, "", SectionKind::Execute),
            },
            SectionKind::Patterns | SectionKind::Members => {
                let range = self.code_range(graph, line_id);
                diags.push(graph.diagnostic_at(
                    Severity::Error,
                    range,
                    format!(
                        "you can't create sections in a {} section",
                        kind_name(parent_kind)
                    ),
                ));
                graph.alloc_section(SectionKind::Custom, Some(parent))
            }
        }
    }

    /// Body sections of a definition: the expected keyword (`execute` or
    /// `get`), or `replacement` for macros. Anything else is an error; a
    /// custom section keeps analysis going.
    fn create_definition_body(
        &mut self,
        graph: &mut ProgramGraph,
        diags: &mut Diagnostics,
        line_id: LineId,
        header: &str,
        expected: &str,
        kind: SectionKind,
    ) -> SectionId {
        let parent = self.current;
        if !expected.is_empty() && header == expected {
            return graph.alloc_section(kind, Some(parent));
        }
        if graph.section(parent).is_macro && header == "replacement" {
            return graph.alloc_section(SectionKind::Replacement, Some(parent));
        }
        let range = self.code_range(graph, line_id);
        diags.push(graph.diagnostic_at(
            Severity::Error,
            range,
            format!("unknown section: {header}"),
        ));
        graph.alloc_section(SectionKind::Custom, Some(parent))
    }

    /// A `:` line in ordinary code: leading `macro` / `local` modifiers,
    /// then a definition keyword -- or, failing that, a custom section whose
    /// header line is itself a section-pattern reference.
    fn create_from_keywords(
        &mut self,
        graph: &mut ProgramGraph,
        diags: &mut Diagnostics,
        line_id: LineId,
        header: &str,
    ) -> SectionId {
        let parent = self.current;
        let mut is_macro = false;
        let mut is_local = false;
        let mut remaining = header;

        loop {
            let (word, rest) = match remaining.split_once(' ') {
                Some((word, rest)) => (word, rest),
                None => (remaining, ""),
            };
            let kind = match word {
                "macro" => {
                    is_macro = true;
                    remaining = rest;
                    continue;
                }
                "local" => {
                    is_local = true;
                    remaining = rest;
                    continue;
                }
                "effect" => Some(SectionKind::Effect),
                "expression" => Some(SectionKind::Expression),
                "section" => Some(SectionKind::Section),
                "class" => Some(SectionKind::Class),
                _ => None,
            };

            let Some(kind) = kind else { break };
            let section = graph.alloc_section(kind, Some(parent));
            {
                let s = graph.section_mut(section);
                s.is_macro = is_macro;
                s.is_local = is_local;
            }
            if kind == SectionKind::Class {
                let class = graph.alloc_class();
                graph.section_mut(section).class = Some(class);
            }
            if !rest.is_empty() {
                let indent = graph.line(line_id).indent_len;
                let offset = (header.len() - rest.len()) as u32;
                let range = Range::new(
                    line_id,
                    indent + offset,
                    indent + header.len() as u32,
                );
                graph.alloc_def(section, rest.to_string(), range);
            }
            return section;
        }

        // No definition keyword: a custom section. The header line is also a
        // section-pattern reference of the parent.
        let section = graph.alloc_section(SectionKind::Custom, Some(parent));
        let expr = line_parser::parse_line(graph, diags, line_id, PatternKind::Section);
        graph.line_mut(line_id).expression = expr;
        section
    }

    // ── Plain line dispatch ────────────────────────────────────────────

    fn process_line(&mut self, graph: &mut ProgramGraph, diags: &mut Diagnostics, line_id: LineId) {
        let kind = graph.section(self.current).kind;
        match kind {
            SectionKind::Custom
            | SectionKind::Execute
            | SectionKind::Get
            | SectionKind::Replacement => {
                let expr = line_parser::parse_line(graph, diags, line_id, PatternKind::Effect);
                graph.line_mut(line_id).expression = expr;
            }
            SectionKind::Patterns => {
                // Each line is an extra syntax for the enclosing definition.
                let definition_section = graph
                    .section(self.current)
                    .parent
                    .expect("patterns sections always have a parent");
                let text = graph.line(line_id).pattern_text.clone();
                let range = self.code_range(graph, line_id);
                graph.alloc_def(definition_section, text, range);
                graph.line_mut(line_id).resolved = true;
            }
            SectionKind::Members => self.process_member_line(graph, diags, line_id),
            SectionKind::Class => self.process_class_line(graph, diags, line_id),
            SectionKind::Effect | SectionKind::Section => {
                let range = self.code_range(graph, line_id);
                diags.push(graph.diagnostic_at(
                    Severity::Error,
                    range,
                    "code without execute: section",
                ));
            }
            SectionKind::Expression => {
                let range = self.code_range(graph, line_id);
                diags.push(graph.diagnostic_at(
                    Severity::Error,
                    range,
                    "code without get: section",
                ));
            }
        }
    }

    /// A line of a `members:` section: a field declaration, or a
    /// `padding: N` directive that pads the struct to a byte boundary.
    fn process_member_line(
        &mut self,
        graph: &mut ProgramGraph,
        diags: &mut Diagnostics,
        line_id: LineId,
    ) {
        let class_section = graph.section(self.current).parent.unwrap();
        let Some(class) = graph.section(class_section).class else {
            return;
        };
        let text = graph.line(line_id).pattern_text.clone();
        let range = self.code_range(graph, line_id);

        if let Some(number) = text.strip_prefix("padding:") {
            match number.trim().parse::<u32>() {
                Ok(alignment) => {
                    let def = graph.class_mut(class);
                    if alignment > def.alignment {
                        def.alignment = alignment;
                    }
                    insert_alignment_padding(def, alignment, range);
                }
                Err(_) => diags.push(graph.diagnostic_at(
                    Severity::Error,
                    range,
                    "padding: expects a byte count",
                )),
            }
            graph.line_mut(line_id).resolved = true;
            return;
        }

        let field = parse_field_declaration(&text, range);
        graph.class_mut(class).fields.push(field);
        graph.line_mut(line_id).resolved = true;
    }

    /// A plain line directly inside `class ...:`: the inline `members:` and
    /// `alignment:` forms.
    fn process_class_line(
        &mut self,
        graph: &mut ProgramGraph,
        diags: &mut Diagnostics,
        line_id: LineId,
    ) {
        let Some(class) = graph.section(self.current).class else {
            return;
        };
        let text = graph.line(line_id).pattern_text.clone();
        let range = self.code_range(graph, line_id);

        if let Some(fields) = text.strip_prefix("members:") {
            for field_text in fields.split(',') {
                let field_text = field_text.trim();
                if !field_text.is_empty() {
                    let field = parse_field_declaration(field_text, range);
                    graph.class_mut(class).fields.push(field);
                }
            }
            graph.line_mut(line_id).resolved = true;
            return;
        }

        if let Some(number) = text.strip_prefix("alignment:") {
            match number.trim().parse::<u32>() {
                Ok(alignment) => graph.class_mut(class).alignment = alignment,
                Err(_) => diags.push(graph.diagnostic_at(
                    Severity::Error,
                    range,
                    "alignment: expects a byte count",
                )),
            }
            graph.line_mut(line_id).resolved = true;
            return;
        }

        diags.push(graph.diagnostic_at(
            Severity::Error,
            range,
            "unexpected line in class definition",
        ));
    }

    fn code_range(&self, graph: &ProgramGraph, line_id: LineId) -> Range {
        let line = graph.line(line_id);
        Range::new(
            line_id,
            line.indent_len,
            line.indent_len + line.pattern_text.len() as u32,
        )
    }
}

/// Parse `name` or `name as <type>`. Only primitive type names resolve at
/// this stage; class-typed fields deduce through their `construct` sites.
fn parse_field_declaration(text: &str, range: Range) -> FieldDef {
    if let Some((name, type_name)) = text.split_once(" as ") {
        return FieldDef {
            name: name.trim().to_string(),
            range,
            declared_type: Type::from_name(type_name.trim()).unwrap_or_default(),
        };
    }
    FieldDef {
        name: text.trim().to_string(),
        range,
        declared_type: Type::undeduced(),
    }
}

/// Insert `_padN` filler fields up to the next `alignment`-byte boundary,
/// greedily using the widest primitive that fits.
fn insert_alignment_padding(class: &mut drift_graph::ClassDefinition, alignment: u32, range: Range) {
    if alignment == 0 {
        return;
    }
    let offset = current_struct_offset(&class.fields);
    let mut padding = (alignment - (offset % alignment)) % alignment;
    let mut pad_index = class
        .fields
        .iter()
        .filter(|f| f.name.starts_with("_pad"))
        .count();
    for (size, type_name) in [(8, "i64"), (4, "i32"), (2, "i16"), (1, "i8")] {
        while padding >= size {
            class.fields.push(FieldDef {
                name: format!("_pad{pad_index}"),
                range,
                declared_type: Type::from_name(type_name).unwrap(),
            });
            pad_index += 1;
            padding -= size;
        }
    }
}

/// Byte offset past the declared fields of a non-packed struct (x86-64
/// natural alignment).
fn current_struct_offset(fields: &[FieldDef]) -> u32 {
    let mut offset = 0u32;
    for field in fields {
        let (size, align) = type_size_align(field.declared_type);
        offset = (offset + align - 1) / align * align;
        offset += size;
    }
    offset
}

fn type_size_align(ty: Type) -> (u32, u32) {
    use drift_graph::TypeKind;
    if ty.is_pointer() {
        return (8, 8);
    }
    match ty.kind {
        TypeKind::Integer | TypeKind::Float => (ty.byte_size as u32, ty.byte_size as u32),
        TypeKind::Bool => (1, 1),
        _ => (8, 8),
    }
}

/// A class whose fields all carry declared types gets one eager
/// instantiation from those declarations.
fn create_declared_instantiations(graph: &mut ProgramGraph) {
    for class in &mut graph.classes {
        if class.fields.is_empty() || !class.instantiations.is_empty() {
            continue;
        }
        let declared: Vec<Type> = class.fields.iter().map(|f| f.declared_type).collect();
        if declared.iter().all(Type::is_deduced) {
            class.get_or_create_instantiation(declared);
        }
    }
}

fn char_name(c: char) -> String {
    match c {
        ' ' => "space".to_string(),
        '\t' => "tab".to_string(),
        other => format!("'{other}'"),
    }
}

fn kind_name(kind: SectionKind) -> &'static str {
    match kind {
        SectionKind::Custom => "custom",
        SectionKind::Section => "section",
        SectionKind::Effect => "effect",
        SectionKind::Expression => "expression",
        SectionKind::Class => "class",
        SectionKind::Patterns => "patterns",
        SectionKind::Execute => "execute",
        SectionKind::Get => "get",
        SectionKind::Replacement => "replacement",
        SectionKind::Members => "members",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drift_common::{CancelFlag, MemoryProvider};
    use std::path::Path;

    fn analyze_source(source: &str) -> (ProgramGraph, Diagnostics, Result<(), OverIndentError>) {
        let mut provider = MemoryProvider::new();
        provider.insert("main.dl", source);
        let mut graph = ProgramGraph::new();
        let mut diags = Diagnostics::new();
        crate::importer::import(
            &mut graph,
            &mut diags,
            &provider,
            Path::new("main.dl"),
            &crate::importer::ImportOptions::default(),
            &CancelFlag::new(),
        )
        .unwrap();
        let result = analyze(&mut graph, &mut diags);
        (graph, diags, result)
    }

    fn child_kinds(graph: &ProgramGraph, section: SectionId) -> Vec<SectionKind> {
        graph
            .section(section)
            .children
            .iter()
            .map(|&c| graph.section(c).kind)
            .collect()
    }

    #[test]
    fn definition_sections_get_their_kinds() {
        let source = "\
effect say hello:
  execute:
    code
expression answer:
  get:
    code
";
        let (graph, diags, result) = analyze_source(source);
        assert!(result.is_ok());
        assert!(!diags.has_errors());
        assert_eq!(
            child_kinds(&graph, graph.root),
            [SectionKind::Effect, SectionKind::Expression]
        );
        let effect = graph.section(graph.root).children[0];
        assert_eq!(child_kinds(&graph, effect), [SectionKind::Execute]);
        // The definition text was registered.
        assert_eq!(graph.defs.len(), 2);
        assert_eq!(graph.def(drift_graph::DefId(0)).text, "say hello");
    }

    #[test]
    fn macro_and_local_modifiers() {
        let source = "\
local macro section loop while condition:
  replacement:
    code
";
        let (graph, diags, result) = analyze_source(source);
        assert!(result.is_ok());
        assert!(!diags.has_errors(), "{:?}", diags.entries());
        let section = graph.section(graph.root).children[0];
        assert_eq!(graph.section(section).kind, SectionKind::Section);
        assert!(graph.section(section).is_macro);
        assert!(graph.section(section).is_local);
        assert_eq!(child_kinds(&graph, section), [SectionKind::Replacement]);
        assert_eq!(graph.def(drift_graph::DefId(0)).text, "loop while condition");
    }

    #[test]
    fn custom_section_line_is_a_section_reference() {
        let source = "\
countdown from 10:
  tick
";
        let (graph, diags, result) = analyze_source(source);
        assert!(result.is_ok());
        assert!(!diags.has_errors());
        let header = &graph.lines[0];
        assert!(header.expression.is_some());
        assert!(header.opens_section.is_some());
        let custom = header.opens_section.unwrap();
        assert_eq!(graph.section(custom).kind, SectionKind::Custom);
        // One Section-kind reference for the header, one Effect reference
        // for the body line.
        assert_eq!(graph.refs.len(), 2);
        assert_eq!(graph.refs[0].kind, PatternKind::Section);
        assert_eq!(graph.refs[1].kind, PatternKind::Effect);
    }

    #[test]
    fn patterns_section_adds_alias_definitions() {
        let source = "\
expression first value and second value:
  patterns:
    second value and first value
  get:
    code
";
        let (graph, diags, result) = analyze_source(source);
        assert!(result.is_ok());
        assert!(!diags.has_errors());
        let expression = graph.section(graph.root).children[0];
        assert_eq!(graph.section(expression).pattern_definitions.len(), 2);
        assert_eq!(
            graph.def(graph.section(expression).pattern_definitions[1]).text,
            "second value and first value"
        );
    }

    #[test]
    fn class_members_and_padding() {
        let source = "\
class point:
  members:
    x as i32
    y as i32
    padding: 16
    z
";
        let (graph, diags, result) = analyze_source(source);
        assert!(result.is_ok());
        assert!(!diags.has_errors(), "{:?}", diags.entries());
        let class_section = graph.section(graph.root).children[0];
        let class = graph.section(class_section).class.unwrap();
        let fields = &graph.class(class).fields;
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        // 8 bytes of declared fields, padded to 16 with one i64.
        assert_eq!(names, ["x", "y", "_pad0", "z"]);
        assert_eq!(fields[0].declared_type, Type::integer(4));
        assert_eq!(fields[2].declared_type, Type::integer(8));
        assert_eq!(graph.class(class).alignment, 16);
    }

    #[test]
    fn inline_members_and_alignment() {
        let source = "\
class pair:
  members: a as i64, b as i64
  alignment: 16
";
        let (graph, diags, result) = analyze_source(source);
        assert!(result.is_ok());
        assert!(!diags.has_errors());
        let class = graph.section(graph.section(graph.root).children[0]).class.unwrap();
        assert_eq!(graph.class(class).fields.len(), 2);
        assert_eq!(graph.class(class).alignment, 16);
        // All fields declared: the eager instantiation exists.
        assert_eq!(graph.class(class).instantiations.len(), 1);
    }

    #[test]
    fn over_indent_is_fatal() {
        let source = "\
outer:
      way too deep
";
        let (_, diags, result) = analyze_source(source);
        assert!(result.is_err());
        assert!(diags.has_errors());
        assert!(diags.entries()[0].message.contains("indentation"));
    }

    #[test]
    fn wrong_indent_character_is_an_error() {
        let source = "outer:\n  two spaces\n\tthen a tab\n";
        let (_, diags, result) = analyze_source(source);
        assert!(result.is_ok());
        assert!(diags.has_errors());
    }

    #[test]
    fn indent_width_mismatch_is_a_warning() {
        let source = "outer:\n  two spaces\nnext:\n   three spaces\n";
        let (_, diags, result) = analyze_source(source);
        assert!(result.is_ok());
        assert!(!diags.has_errors());
        assert!(diags
            .entries()
            .iter()
            .any(|d| d.severity == Severity::Warning && d.message.contains("multiple")));
    }

    #[test]
    fn mixed_discovery_indent_warns_once() {
        let source = "outer:\n\t inner:\n\t\tdeeper\n";
        let (_, diags, _) = analyze_source(source);
        let mixed: Vec<_> = diags
            .entries()
            .iter()
            .filter(|d| d.message.contains("mixes"))
            .collect();
        assert_eq!(mixed.len(), 1);
    }

    #[test]
    fn dedent_closes_sections() {
        let source = "\
a:
  b:
    deep line
  back one
top level
";
        let (graph, diags, result) = analyze_source(source);
        assert!(result.is_ok());
        assert!(!diags.has_errors());
        let a = graph.lines[0].opens_section.unwrap();
        let b = graph.lines[1].opens_section.unwrap();
        assert_eq!(graph.lines[2].section, Some(b));
        assert_eq!(graph.lines[3].section, Some(a));
        assert_eq!(graph.lines[4].section, Some(graph.root));
    }

    #[test]
    fn every_line_belongs_to_exactly_one_section() {
        let source = "\
effect greet name:
  execute:
    @intrinsic(\"print_str\", \"hi\")

top
nest:
  inner
";
        let (graph, _, result) = analyze_source(source);
        assert!(result.is_ok());
        for line in &graph.lines {
            let section = line.section.expect("analyzed lines have a section");
            assert!(
                graph.section(section).lines.contains(&line.id),
                "line {:?} not owned by its section",
                line.trimmed
            );
            // Owned by exactly one section.
            let owners = graph
                .sections
                .iter()
                .filter(|s| s.lines.contains(&line.id))
                .count();
            assert_eq!(owners, 1);
        }
    }

    #[test]
    fn code_directly_under_a_definition_is_an_error() {
        let source = "\
effect broken:
  stray code
";
        let (_, diags, result) = analyze_source(source);
        assert!(result.is_ok());
        assert!(diags.has_errors());
        assert!(diags.entries()[0].message.contains("execute"));
    }

    #[test]
    fn unknown_definition_body_section_is_an_error() {
        let source = "\
effect broken:
  wrong:
    code
";
        let (_, diags, result) = analyze_source(source);
        assert!(result.is_ok());
        assert!(diags.has_errors());
        assert!(diags.entries()[0].message.contains("unknown section"));
    }
}
