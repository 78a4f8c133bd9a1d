//! Pattern element parsing.
//!
//! Two entry points: [`parse_reference_elements`] for transformed reference
//! texts (flat runs, argument characters already in place) and
//! [`parse_definition_elements`] for definition texts as written, which
//! additionally understand `[a|b]` choices and `{word:name}` captures.

use drift_graph::{PatternElement, ARGUMENT_CHAR};

#[derive(PartialEq, Clone, Copy)]
enum RunKind {
    Argument,
    Word,
    Other,
}

fn run_kind(c: char) -> RunKind {
    if c == ARGUMENT_CHAR {
        RunKind::Argument
    } else if c.is_ascii_alphanumeric() || c == '_' {
        RunKind::Word
    } else {
        RunKind::Other
    }
}

/// Split a transformed reference text into runs: argument characters become
/// `Variable`, identifier runs `VariableLike`, everything else `Literal`.
pub fn parse_reference_elements(text: &str) -> Vec<PatternElement> {
    element_runs(text, 0)
}

fn element_runs(text: &str, offset: u32) -> Vec<PatternElement> {
    let mut elements = Vec::new();
    let mut run_start = 0usize;
    let mut current: Option<RunKind> = None;

    let mut flush = |elements: &mut Vec<PatternElement>, kind: RunKind, start: usize, end: usize| {
        if start == end {
            return;
        }
        let run = text[start..end].to_string();
        let start = offset + start as u32;
        elements.push(match kind {
            RunKind::Argument => PatternElement::Variable { text: run, start },
            RunKind::Word => PatternElement::VariableLike { text: run, start },
            RunKind::Other => PatternElement::Literal { text: run, start },
        });
    };

    for (pos, c) in text.char_indices() {
        let kind = run_kind(c);
        if current != Some(kind) {
            if let Some(prev) = current {
                flush(&mut elements, prev, run_start, pos);
            }
            run_start = pos;
            current = Some(kind);
        }
    }
    if let Some(prev) = current {
        flush(&mut elements, prev, run_start, text.len());
    }
    elements
}

/// Parse a definition's pattern text as written.
///
/// On top of the plain runs this recognizes `[a|b|...]` choice groups
/// (recursively) and `{word:name}` word captures. An unmatched `[` or a
/// brace that is not a word capture falls through as literal text.
pub fn parse_definition_elements(text: &str) -> Vec<PatternElement> {
    parse_definition_inner(text, 0)
}

fn parse_definition_inner(text: &str, offset: u32) -> Vec<PatternElement> {
    let mut elements = Vec::new();
    let bytes = text.as_bytes();
    let mut pos = 0usize;
    let mut plain_start = 0usize;

    let mut flush_plain = |elements: &mut Vec<PatternElement>, start: usize, end: usize| {
        if start < end {
            elements.extend(element_runs(&text[start..end], offset + start as u32));
        }
    };

    while pos < bytes.len() {
        match bytes[pos] {
            b'[' => {
                let Some(close) = matching_bracket(bytes, pos) else {
                    pos += 1;
                    continue;
                };
                flush_plain(&mut elements, plain_start, pos);

                let content = &text[pos + 1..close];
                let mut alternatives = Vec::new();
                let mut part_start = 0usize;
                let mut depth = 0usize;
                for (i, b) in content.bytes().enumerate() {
                    match b {
                        b'[' => depth += 1,
                        b']' => depth = depth.saturating_sub(1),
                        b'|' if depth == 0 => {
                            alternatives.push((part_start, i));
                            part_start = i + 1;
                        }
                        _ => {}
                    }
                }
                alternatives.push((part_start, content.len()));

                let content_offset = offset + pos as u32 + 1;
                let mut parsed: Vec<Vec<PatternElement>> = alternatives
                    .iter()
                    .map(|&(start, end)| {
                        parse_definition_inner(&content[start..end], content_offset + start as u32)
                    })
                    .collect();

                // An empty alternative followed by a space would leave the
                // other alternatives producing a double space; absorb the
                // space into the non-empty ones instead. `[the|] screen`
                // behaves as `[the |]screen`.
                let mut next = close + 1;
                let has_empty = parsed.iter().any(Vec::is_empty);
                if has_empty && bytes.get(next) == Some(&b' ') {
                    for alternative in parsed.iter_mut().filter(|a| !a.is_empty()) {
                        alternative.push(PatternElement::Literal {
                            text: " ".into(),
                            start: offset + next as u32,
                        });
                    }
                    next += 1;
                }

                elements.push(PatternElement::Choice {
                    alternatives: parsed,
                    start: offset + pos as u32,
                });
                pos = next;
                plain_start = pos;
            }
            b'{' => {
                let close = text[pos..].find('}').map(|i| pos + i);
                let capture = close.and_then(|close| {
                    let content = &text[pos + 1..close];
                    content
                        .split_once(':')
                        .filter(|(kind, name)| *kind == "word" && !name.is_empty())
                        .map(|(_, name)| (close, name.to_string()))
                });
                match capture {
                    Some((close, name)) => {
                        flush_plain(&mut elements, plain_start, pos);
                        elements.push(PatternElement::WordCapture {
                            name,
                            start: offset + pos as u32,
                        });
                        pos = close + 1;
                        plain_start = pos;
                    }
                    None => pos += 1,
                }
            }
            _ => pos += 1,
        }
    }
    flush_plain(&mut elements, plain_start, text.len());
    elements
}

/// Index of the `]` matching the `[` at `open`, if any.
fn matching_bracket(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(elements: &[PatternElement]) -> Vec<(&'static str, String)> {
        elements
            .iter()
            .map(|e| {
                let kind = match e {
                    PatternElement::Literal { .. } => "lit",
                    PatternElement::VariableLike { .. } => "vl",
                    PatternElement::Variable { .. } => "var",
                    PatternElement::WordCapture { .. } => "word",
                    PatternElement::Choice { .. } => "choice",
                };
                (kind, e.text().to_string())
            })
            .collect()
    }

    #[test]
    fn reference_runs_split_by_class() {
        let elements = parse_reference_elements("set x to \u{7}");
        assert_eq!(
            texts(&elements),
            [
                ("vl", "set".into()),
                ("lit", " ".into()),
                ("vl", "x".into()),
                ("lit", " ".into()),
                ("vl", "to".into()),
                ("lit", " ".into()),
                ("var", "\u{7}".into()),
            ]
        );
        assert_eq!(elements[2].start(), 4);
    }

    #[test]
    fn consecutive_argument_chars_merge() {
        let elements = parse_reference_elements("\u{7}\u{7}");
        assert_eq!(elements.len(), 1);
        assert!(matches!(elements[0], PatternElement::Variable { .. }));
    }

    #[test]
    fn definition_plain_words() {
        let elements = parse_definition_elements("set value to target");
        assert_eq!(elements.len(), 7);
        assert!(elements.iter().step_by(2).all(PatternElement::is_variable_like));
    }

    #[test]
    fn definition_word_capture() {
        let elements = parse_definition_elements("member {word:name} of owner");
        assert_eq!(
            texts(&elements),
            [
                ("vl", "member".into()),
                ("lit", " ".into()),
                ("word", "name".into()),
                ("lit", " ".into()),
                ("vl", "of".into()),
                ("lit", " ".into()),
                ("vl", "owner".into()),
            ]
        );
    }

    #[test]
    fn brace_without_word_prefix_stays_literal() {
        let elements = parse_definition_elements("{x}");
        assert_eq!(
            texts(&elements),
            [("lit", "{".into()), ("vl", "x".into()), ("lit", "}".into())]
        );
    }

    #[test]
    fn choice_with_alternatives() {
        let elements = parse_definition_elements("go [left|right] now");
        let PatternElement::Choice { alternatives, .. } = &elements[2] else {
            panic!("expected a choice, got {:?}", elements[2]);
        };
        assert_eq!(alternatives.len(), 2);
        assert_eq!(alternatives[0][0].text(), "left");
        assert_eq!(alternatives[1][0].text(), "right");
    }

    #[test]
    fn empty_alternative_absorbs_following_space() {
        let elements = parse_definition_elements("[the|] result");
        let PatternElement::Choice { alternatives, .. } = &elements[0] else {
            panic!("expected a choice first");
        };
        // "the" alternative gained the trailing space; the empty alternative
        // stayed empty; the space after the bracket was consumed.
        assert_eq!(alternatives[0].last().unwrap().text(), " ");
        assert!(alternatives[1].is_empty());
        assert_eq!(elements[1].text(), "result");
    }

    #[test]
    fn nested_choices() {
        let elements = parse_definition_elements("[a[b|c]|d]");
        let PatternElement::Choice { alternatives, .. } = &elements[0] else {
            panic!("expected a choice");
        };
        assert_eq!(alternatives.len(), 2);
        assert!(matches!(alternatives[0][1], PatternElement::Choice { .. }));
    }
}
