//! Per-line parsing: bracket hierarchy, literal carving, transformation.
//!
//! A line's pattern text is scanned once into a hierarchy of parentheses,
//! strings and comma groups. Recognized literals -- `@intrinsic(...)` calls,
//! string literals, number literals and parenthesized sub-expressions -- are
//! parsed into child expressions and carved out of the pattern text, each
//! replaced by the reserved argument character. What survives is the shape
//! the resolver matches against the pattern tries.

use drift_common::{Diagnostics, Severity};
use drift_graph::{
    ExprKind, ExprId, LineId, Literal, PatternKind, ProgramGraph, Range, RefId, TransformedText,
    ARGUMENT_CHAR,
};

const INTRINSIC_KEYWORD: &str = "@intrinsic";

/// Parse a code line's pattern text into its top-level expression.
///
/// `kind` is the pattern kind the line is matched as: `Effect` for plain
/// code lines, `Section` for lines that open a custom section. Returns
/// `None` when the line had a syntax error (already recorded); the line is
/// then skipped.
pub fn parse_line(
    graph: &mut ProgramGraph,
    diags: &mut Diagnostics,
    line: LineId,
    kind: PatternKind,
) -> Option<ExprId> {
    let text = graph.line(line).pattern_text.clone();
    let offset = graph.line(line).indent_len;
    parse_expression(graph, diags, line, offset, &text, kind)
}

// ── Bracket hierarchy ──────────────────────────────────────────────────

/// A node of the bracket hierarchy: `(` groups, `"` strings and `,`
/// argument slots. `start..end` is the interior span, delimiters excluded.
struct HierNode {
    ch: u8,
    start: usize,
    end: usize,
    children: Vec<HierNode>,
}

impl HierNode {
    fn new(ch: u8, start: usize) -> Self {
        Self { ch, start, end: start, children: Vec::new() }
    }
}

/// Build the hierarchy in one left-to-right pass. Errors (unmatched
/// delimiters, stray commas) are recorded and the line is abandoned.
fn build_hierarchy(
    graph: &ProgramGraph,
    diags: &mut Diagnostics,
    line: LineId,
    offset: u32,
    text: &str,
) -> Option<HierNode> {
    let bytes = text.as_bytes();
    let mut stack = vec![HierNode::new(0, 0)];

    let mut error = |diags: &mut Diagnostics, at: usize, len: usize, message: String| {
        let range = Range::new(line, offset + at as u32, offset + (at + len) as u32);
        diags.push(graph.diagnostic_at(Severity::Error, range, message));
    };

    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => stack.push(HierNode::new(b'(', i + 1)),
            b'"' => {
                // Scan to the closing quote, skipping escaped ones.
                let mut j = i + 1;
                let close = loop {
                    match bytes[j..].iter().position(|&b| b == b'"') {
                        Some(found) => {
                            let at = j + found;
                            if bytes[at - 1] != b'\\' {
                                break Some(at);
                            }
                            j = at + 1;
                        }
                        None => break None,
                    }
                };
                let Some(close) = close else {
                    error(diags, i, 1, "unmatched string delimiter '\"'".into());
                    return None;
                };
                let mut node = HierNode::new(b'"', i + 1);
                node.end = close;
                stack.last_mut().unwrap().children.push(node);
                i = close;
            }
            b')' => {
                if stack.last().unwrap().ch == b',' {
                    let mut comma = stack.pop().unwrap();
                    comma.end = i;
                    stack.last_mut().unwrap().children.push(comma);
                }
                if stack.last().unwrap().ch == b'(' {
                    let mut paren = stack.pop().unwrap();
                    paren.end = i;
                    stack.last_mut().unwrap().children.push(paren);
                } else {
                    error(diags, i, 1, "unmatched closing character ')'".into());
                    return None;
                }
            }
            b',' => {
                let top = stack.last_mut().unwrap();
                if top.ch == b'(' {
                    // First comma inside this group: wrap what the group has
                    // collected so far as the first argument slot.
                    let mut first = HierNode::new(b',', top.start);
                    first.end = i;
                    first.children = std::mem::take(&mut top.children);
                    top.children.push(first);
                    stack.push(HierNode::new(b',', i + 1));
                } else if top.ch == b',' {
                    let mut comma = stack.pop().unwrap();
                    comma.end = i;
                    stack.last_mut().unwrap().children.push(comma);
                    stack.push(HierNode::new(b',', i + 1));
                } else {
                    error(diags, i, 1, "found comma without enclosing braces".into());
                    return None;
                }
            }
            _ => {}
        }
        i += 1;
    }

    if stack.len() > 1 {
        for node in stack.iter().skip(1) {
            error(
                diags,
                node.start.saturating_sub(1),
                1,
                format!("unclosed '{}'", node.ch as char),
            );
        }
        return None;
    }

    let mut root = stack.pop().unwrap();
    root.end = text.len();
    Some(root)
}

// ── Expression detection ───────────────────────────────────────────────

fn parse_expression(
    graph: &mut ProgramGraph,
    diags: &mut Diagnostics,
    line: LineId,
    offset: u32,
    text: &str,
    kind: PatternKind,
) -> Option<ExprId> {
    let root = build_hierarchy(graph, diags, line, offset, text)?;
    let mut transform = TransformedText::new(text, offset);
    let mut args: Vec<(u32, ExprId)> = Vec::new();

    for child in &root.children {
        match child.ch {
            b'(' => {
                let paren_pos = child.start - 1;
                let is_intrinsic = paren_pos >= INTRINSIC_KEYWORD.len()
                    && text.as_bytes()[paren_pos - INTRINSIC_KEYWORD.len()..paren_pos]
                        == *INTRINSIC_KEYWORD.as_bytes();
                if is_intrinsic {
                    let start = paren_pos - INTRINSIC_KEYWORD.len();
                    let end = child.end + 1;
                    let intrinsic = parse_intrinsic(graph, diags, line, offset, text, child)?;
                    transform.replace_line(offset + start as u32, offset + end as u32);
                    args.push((offset + start as u32, intrinsic));
                } else {
                    // Ordinary grouping: every argument slot re-parses as an
                    // expression.
                    let slots: Vec<(usize, usize)> = argument_slots(child);
                    for (start, end) in slots {
                        let expr = parse_expression(
                            graph,
                            diags,
                            line,
                            offset + start as u32,
                            &text[start..end],
                            PatternKind::Expression,
                        )?;
                        args.push((offset + start as u32, expr));
                    }
                    transform
                        .replace_line(offset + (child.start - 1) as u32, offset + (child.end + 1) as u32);
                }
            }
            b'"' => {
                let expr = string_literal(graph, line, offset, text, child);
                transform
                    .replace_line(offset + (child.start - 1) as u32, offset + (child.end + 1) as u32);
                args.push((offset + (child.start - 1) as u32, expr));
            }
            _ => {}
        }
    }

    carve_numbers(graph, line, &mut transform, &mut args);
    normalize_whitespace(graph, diags, line, &mut transform);

    // A pattern that is exactly one argument slot needs no lookup: return
    // the argument itself when the context demands an expression, or when
    // the argument is an intrinsic call (which is an effect on its own).
    if transform.text().len() == ARGUMENT_CHAR.len_utf8() && transform.text().starts_with(ARGUMENT_CHAR) {
        if let [(_, only)] = args[..] {
            if kind == PatternKind::Expression
                || matches!(graph.expr(only).kind, ExprKind::IntrinsicCall(_))
            {
                return Some(only);
            }
        }
    }

    let range = Range::new(line, offset, offset + text.len() as u32);
    let expr = graph.alloc_expr(ExprKind::Pending(RefId(0)), range);
    graph.expr_mut(expr).args = args.iter().map(|&(_, id)| id).collect();
    let section = graph
        .line(line)
        .section
        .expect("lines are parsed after section assignment");
    let ref_id = graph.alloc_ref(section, expr, kind, transform, args);
    graph.expr_mut(expr).kind = ExprKind::Pending(ref_id);
    Some(expr)
}

/// The argument slots of a parenthesized group: its comma children when it
/// has them, otherwise the whole interior.
fn argument_slots(paren: &HierNode) -> Vec<(usize, usize)> {
    if paren.children.first().map(|c| c.ch) == Some(b',') {
        paren.children.iter().map(|c| (c.start, c.end)).collect()
    } else {
        vec![(paren.start, paren.end)]
    }
}

fn parse_intrinsic(
    graph: &mut ProgramGraph,
    diags: &mut Diagnostics,
    line: LineId,
    offset: u32,
    text: &str,
    paren: &HierNode,
) -> Option<ExprId> {
    let start = paren.start - 1 - INTRINSIC_KEYWORD.len();
    let range = Range::new(line, offset + start as u32, offset + (paren.end + 1) as u32);

    // The argument nodes: comma slots, or the single direct child.
    let arg_nodes: Vec<&HierNode> = if paren.children.first().map(|c| c.ch) == Some(b',') {
        paren.children.iter().collect()
    } else {
        paren.children.iter().take(1).collect()
    };

    let mut name = String::new();
    let mut arg_ids = Vec::new();
    for node in arg_nodes {
        let expr = if node.ch == b'"' {
            string_literal(graph, line, offset, text, node)
        } else {
            parse_expression(
                graph,
                diags,
                line,
                offset + node.start as u32,
                &text[node.start..node.end],
                PatternKind::Expression,
            )?
        };
        // The first string literal names the intrinsic. It stays in the
        // argument list; intrinsic typing indexes arguments from 1.
        if name.is_empty() {
            if let Some(s) = graph.expr(expr).as_str_literal() {
                name = s.to_string();
            }
        }
        arg_ids.push(expr);
    }

    let id = graph.alloc_expr(ExprKind::IntrinsicCall(name), range);
    graph.expr_mut(id).args = arg_ids;
    Some(id)
}

fn string_literal(
    graph: &mut ProgramGraph,
    line: LineId,
    offset: u32,
    text: &str,
    node: &HierNode,
) -> ExprId {
    let value = decode_escapes(&text[node.start..node.end]);
    let range = Range::new(
        line,
        offset + (node.start - 1) as u32,
        offset + (node.end + 1) as u32,
    );
    graph.alloc_expr(ExprKind::Literal(Literal::Str(value)), range)
}

/// Decode backslash escapes. Unknown escapes keep the escaped character.
fn decode_escapes(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('a') => result.push('\u{7}'),
            Some('b') => result.push('\u{8}'),
            Some('f') => result.push('\u{c}'),
            Some('v') => result.push('\u{b}'),
            Some('\\') => result.push('\\'),
            Some('"') => result.push('"'),
            Some('0') => result.push('\0'),
            Some(other) => result.push(other),
            None => result.push('\\'),
        }
    }
    result
}

// ── Number literals ────────────────────────────────────────────────────

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Carve decimal number literals out of the *transformed* text, so digits
/// inside strings or type names are never matched. Matches are processed
/// right to left so earlier positions stay valid.
fn carve_numbers(
    graph: &mut ProgramGraph,
    line: LineId,
    transform: &mut TransformedText,
    args: &mut Vec<(u32, ExprId)>,
) {
    let snapshot = transform.text().to_string();
    let bytes = snapshot.as_bytes();

    let mut found: Vec<(usize, usize, bool)> = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        if !is_word_byte(bytes[i]) {
            i += 1;
            continue;
        }
        let run_end = word_run_end(bytes, i);
        let all_digits = bytes[i..run_end].iter().all(u8::is_ascii_digit);
        if !all_digits {
            i = run_end;
            continue;
        }
        let mut end = run_end;
        let mut is_float = false;
        if end < bytes.len() && bytes[end] == b'.' {
            let frac_end = word_run_end(bytes, end + 1);
            if frac_end > end + 1 && bytes[end + 1..frac_end].iter().all(u8::is_ascii_digit) {
                end = frac_end;
                is_float = true;
            }
        }
        found.push((i, end, is_float));
        i = end;
    }

    for &(start, end, is_float) in found.iter().rev() {
        let literal = &snapshot[start..end];
        let value = if is_float {
            Literal::Float(literal.parse().unwrap_or(0.0))
        } else {
            Literal::Int(literal.parse().unwrap_or(i64::MAX))
        };
        let line_start = transform.line_pos(start);
        let line_end = transform.line_pos(end);
        let expr = graph.alloc_expr(
            ExprKind::Literal(value),
            Range::new(line, line_start, line_end),
        );
        transform.replace_pattern(start, end, &ARGUMENT_CHAR.to_string());
        args.push((line_start, expr));
    }
}

fn word_run_end(bytes: &[u8], from: usize) -> usize {
    let mut end = from;
    while end < bytes.len() && is_word_byte(bytes[end]) {
        end += 1;
    }
    end
}

// ── Whitespace normalization ───────────────────────────────────────────

/// Trim leading and trailing whitespace and collapse interior runs to a
/// single space. Anything other than an exact single space gets a warning.
fn normalize_whitespace(
    graph: &ProgramGraph,
    diags: &mut Diagnostics,
    line: LineId,
    transform: &mut TransformedText,
) {
    let mut warn = |diags: &mut Diagnostics, transform: &TransformedText, start: usize, end: usize| {
        let range = Range::new(line, transform.line_pos(start), transform.line_pos(end));
        diags.push(graph.diagnostic_at(
            Severity::Warning,
            range,
            "all whitespace in patterns should be a single space",
        ));
    };

    // Leading run. A single leading space trims silently.
    let lead: usize = transform
        .text()
        .chars()
        .take_while(|c| c.is_whitespace())
        .map(char::len_utf8)
        .sum();
    if lead > 0 {
        if transform.text()[..lead] != *" " {
            warn(diags, transform, 0, lead);
        }
        transform.replace_pattern(0, lead, "");
    }

    // Trailing run.
    let trail: usize = transform
        .text()
        .chars()
        .rev()
        .take_while(|c| c.is_whitespace())
        .map(char::len_utf8)
        .sum();
    if trail > 0 {
        let start = transform.len() - trail;
        if transform.text()[start..] != *" " {
            warn(diags, transform, start, transform.len());
        }
        transform.replace_pattern(start, transform.len(), "");
    }

    // Interior runs: two or more whitespace characters, or a single
    // whitespace character that is not a space.
    let mut i = 0usize;
    while i < transform.len() {
        let text = transform.text();
        let c = text[i..].chars().next().unwrap();
        if !c.is_whitespace() {
            i += c.len_utf8();
            continue;
        }
        let run: usize = text[i..]
            .chars()
            .take_while(|c| c.is_whitespace())
            .map(char::len_utf8)
            .sum();
        if run > 1 || c != ' ' {
            warn(diags, transform, i, i + run);
            transform.replace_pattern(i, i + run, " ");
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drift_common::Diagnostics;
    use drift_graph::SectionId;

    /// Build a graph holding one line of code, pre-assigned to the root
    /// section the way the section analyzer would.
    fn graph_with_line(text: &str) -> (ProgramGraph, LineId) {
        let mut graph = ProgramGraph::new();
        let file = graph.alloc_file("test.dl", text);
        let line = graph.alloc_line(file, 0, text.into(), text.into());
        graph.line_mut(line).section = Some(SectionId::ROOT);
        graph.line_mut(line).pattern_text = text.into();
        graph.section_mut(SectionId::ROOT).lines.push(line);
        (graph, line)
    }

    fn parse(text: &str, kind: PatternKind) -> (ProgramGraph, Diagnostics, Option<ExprId>) {
        let (mut graph, line) = graph_with_line(text);
        let mut diags = Diagnostics::new();
        let expr = parse_line(&mut graph, &mut diags, line, kind);
        (graph, diags, expr)
    }

    fn ref_text(graph: &ProgramGraph, expr: ExprId) -> String {
        let ExprKind::Pending(ref_id) = graph.expr(expr).kind else {
            panic!("expected a pending expression");
        };
        graph.pattern_ref(ref_id).pattern.text().to_string()
    }

    #[test]
    fn plain_line_keeps_its_text() {
        let (graph, diags, expr) = parse("print x", PatternKind::Effect);
        let expr = expr.unwrap();
        assert!(diags.is_empty());
        assert_eq!(ref_text(&graph, expr), "print x");
        assert!(graph.expr(expr).args.is_empty());
    }

    #[test]
    fn numbers_are_carved() {
        let (graph, diags, expr) = parse("set x to 5", PatternKind::Effect);
        let expr = expr.unwrap();
        assert!(diags.is_empty());
        assert_eq!(ref_text(&graph, expr), "set x to \u{7}");
        assert_eq!(graph.expr(expr).args.len(), 1);
        let arg = graph.expr(graph.expr(expr).args[0]);
        assert_eq!(arg.as_int_literal(), Some(5));
        assert_eq!(arg.range.start, 9);
        assert_eq!(arg.range.end, 10);
    }

    #[test]
    fn float_literals_and_boundaries() {
        let (graph, _, expr) = parse("wait 1.5 units", PatternKind::Effect);
        let expr = expr.unwrap();
        assert_eq!(ref_text(&graph, expr), "wait \u{7} units");
        let arg = graph.expr(graph.expr(expr).args[0]);
        assert!(matches!(arg.kind, ExprKind::Literal(Literal::Float(f)) if f == 1.5));
    }

    #[test]
    fn digits_inside_identifiers_are_not_numbers() {
        let (graph, _, expr) = parse("use i64 here", PatternKind::Effect);
        let expr = expr.unwrap();
        assert_eq!(ref_text(&graph, expr), "use i64 here");
        assert!(graph.expr(expr).args.is_empty());
    }

    #[test]
    fn digits_inside_strings_are_not_numbers() {
        let (graph, _, expr) = parse("print \"version 3\"", PatternKind::Effect);
        let expr = expr.unwrap();
        assert_eq!(ref_text(&graph, expr), "print \u{7}");
        assert_eq!(graph.expr(expr).args.len(), 1);
        assert_eq!(
            graph.expr(graph.expr(expr).args[0]).as_str_literal(),
            Some("version 3")
        );
    }

    #[test]
    fn string_escapes_decode() {
        let (graph, _, expr) = parse("print \"a\\n\\\"b\\\"\"", PatternKind::Effect);
        let expr = expr.unwrap();
        let arg = graph.expr(graph.expr(expr).args[0]);
        assert_eq!(arg.as_str_literal(), Some("a\n\"b\""));
    }

    #[test]
    fn parenthesized_group_becomes_argument() {
        let (graph, diags, expr) = parse("set y to (x + 1)", PatternKind::Effect);
        let expr = expr.unwrap();
        assert!(diags.is_empty());
        assert_eq!(ref_text(&graph, expr), "set y to \u{7}");
        // The group re-parsed as an expression reference with its own
        // carved number.
        let inner = graph.expr(graph.expr(expr).args[0]);
        let ExprKind::Pending(inner_ref) = inner.kind else {
            panic!("inner group should be pending");
        };
        assert_eq!(graph.pattern_ref(inner_ref).pattern.text(), "x + \u{7}");
    }

    #[test]
    fn bare_parenthesized_expression_collapses() {
        let (graph, _, expr) = parse("(x)", PatternKind::Expression);
        let expr = expr.unwrap();
        // `(x)` collapses to the inner reference for `x` directly.
        let ExprKind::Pending(ref_id) = graph.expr(expr).kind else {
            panic!("expected pending");
        };
        assert_eq!(graph.pattern_ref(ref_id).pattern.text(), "x");
    }

    #[test]
    fn intrinsic_call_collapses_on_effect_lines() {
        let (graph, diags, expr) = parse("@intrinsic(\"print_i32\", x)", PatternKind::Effect);
        let expr = expr.unwrap();
        assert!(diags.is_empty());
        let e = graph.expr(expr);
        assert_eq!(e.intrinsic_name(), Some("print_i32"));
        // name literal + one argument
        assert_eq!(e.args.len(), 2);
        assert_eq!(graph.expr(e.args[0]).as_str_literal(), Some("print_i32"));
    }

    #[test]
    fn intrinsic_number_arguments_parse() {
        let (graph, _, expr) = parse("@intrinsic(\"add\", x, 41)", PatternKind::Effect);
        let expr = expr.unwrap();
        let e = graph.expr(expr);
        assert_eq!(e.intrinsic_name(), Some("add"));
        assert_eq!(e.args.len(), 3);
        assert_eq!(graph.expr(e.args[2]).as_int_literal(), Some(41));
    }

    #[test]
    fn whitespace_runs_collapse_with_warning() {
        let (graph, diags, expr) = parse("print   x", PatternKind::Effect);
        let expr = expr.unwrap();
        assert_eq!(ref_text(&graph, expr), "print x");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags.entries()[0].severity, Severity::Warning);
    }

    #[test]
    fn tab_inside_pattern_warns() {
        let (_, diags, _) = parse("print\tx", PatternKind::Effect);
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn unmatched_paren_is_an_error() {
        let (_, diags, expr) = parse("print (x", PatternKind::Effect);
        assert!(expr.is_none());
        assert!(diags.has_errors());
    }

    #[test]
    fn unmatched_string_is_an_error() {
        let (_, diags, expr) = parse("print \"x", PatternKind::Effect);
        assert!(expr.is_none());
        assert!(diags.has_errors());
    }

    #[test]
    fn stray_comma_is_an_error() {
        let (_, diags, expr) = parse("a, b", PatternKind::Effect);
        assert!(expr.is_none());
        assert!(diags.has_errors());
    }

    #[test]
    fn reference_registration_updates_unresolved_counts() {
        let (graph, _, expr) = parse("print x", PatternKind::Effect);
        assert!(expr.is_some());
        assert_eq!(graph.section(SectionId::ROOT).unresolved_count, 1);
        assert_eq!(graph.section(SectionId::ROOT).pattern_references.len(), 1);
    }
}
