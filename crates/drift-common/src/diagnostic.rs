use std::fmt;

use serde::Serialize;

/// Severity of a diagnostic entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Hint,
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Hint => write!(f, "hint"),
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// One diagnostic entry with a resolved source location.
///
/// Lines are 1-based, columns 0-based. Entries are plain data: rendering
/// (terminal reports, JSON lines, LSP publish) happens in the consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub file: String,
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        file: impl Into<String>,
        start_line: u32,
        start_col: u32,
        end_line: u32,
        end_col: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            file: file.into(),
            start_line,
            start_col,
            end_line,
            end_col,
            message: message.into(),
        }
    }

    /// A diagnostic not anchored to any source position (e.g. an unreadable
    /// root file).
    pub fn unanchored(severity: Severity, file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(severity, file, 1, 0, 1, 0, message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}: {}",
            self.file, self.start_line, self.start_col, self.severity, self.message
        )
    }
}

/// Ordered, append-only diagnostic collector.
///
/// Every pipeline stage pushes into one shared collector; nothing is ever
/// removed or deduplicated, so two runs over the same sources produce
/// identical sequences.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether any entry has `Error` severity. Stages consult this before
    /// deciding whether to run; `compile` fails if it is true at the end.
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Error)
    }

    /// Number of error-severity entries.
    pub fn error_count(&self) -> usize {
        self.entries.iter().filter(|d| d.severity == Severity::Error).count()
    }
}
