//! Source import: loading files and flattening `import` lines.
//!
//! Importing is depth-first: an `import <path>` line is replaced in the
//! merged sequence by the fully expanded lines of the imported file, so the
//! merged order reads as if every import had been pasted in place. A file is
//! loaded at most once; re-imports (including circular ones) expand to
//! nothing.

use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

use drift_common::{CancelFlag, Diagnostic, Diagnostics, FileId, FileProvider, Severity};
use drift_graph::ProgramGraph;

/// How the importer resolves and seeds files.
#[derive(Debug, Default, Clone)]
pub struct ImportOptions {
    /// Loaded as the first import of the root file when set (the pattern
    /// primitives prelude).
    pub prelude: Option<PathBuf>,
    /// Second candidate directory for import paths that do not resolve
    /// relative to the importing file.
    pub library_root: Option<PathBuf>,
}

/// Why importing aborted.
#[derive(Debug)]
pub enum ImportError {
    /// The root file could not be read. The driver maps this to exit code 2.
    UnreadableRoot(PathBuf),
    /// An imported file could not be read; a diagnostic names the import.
    ImportFailed,
    Cancelled,
}

/// Load `root` and its transitive imports into `graph`, producing the merged
/// code line sequence.
pub fn import(
    graph: &mut ProgramGraph,
    diags: &mut Diagnostics,
    provider: &dyn FileProvider,
    root: &Path,
    options: &ImportOptions,
    cancel: &CancelFlag,
) -> Result<(), ImportError> {
    let mut importer = Importer {
        graph,
        diags,
        provider,
        options,
        cancel,
        imported: FxHashMap::default(),
    };
    if let Some(prelude) = &options.prelude {
        // The prelude is configuration, not source: a missing prelude is an
        // import failure even though no import line names it.
        importer.import_file(prelude, ImportSite::Prelude)?;
    }
    importer.import_file(root, ImportSite::Root)?;
    Ok(())
}

enum ImportSite {
    Root,
    Prelude,
    /// An `import` line: the importing file, its 1-based line number and the
    /// column span of the path argument.
    Line {
        file: PathBuf,
        line: u32,
        start_col: u32,
        end_col: u32,
    },
}

struct Importer<'a> {
    graph: &'a mut ProgramGraph,
    diags: &'a mut Diagnostics,
    provider: &'a dyn FileProvider,
    options: &'a ImportOptions,
    cancel: &'a CancelFlag,
    imported: FxHashMap<PathBuf, FileId>,
}

impl Importer<'_> {
    fn import_file(&mut self, path: &Path, site: ImportSite) -> Result<(), ImportError> {
        if self.cancel.is_cancelled() {
            return Err(ImportError::Cancelled);
        }
        let canonical = self.provider.canonical(path);
        if self.imported.contains_key(&canonical) {
            // Already expanded (or currently being expanded): a circular
            // import produces zero lines.
            return Ok(());
        }

        let content = match self.provider.read(path) {
            Ok(content) => content,
            Err(_) => {
                return match site {
                    ImportSite::Root => Err(ImportError::UnreadableRoot(path.to_path_buf())),
                    ImportSite::Prelude => {
                        self.diags.push(Diagnostic::unanchored(
                            Severity::Error,
                            path.display().to_string(),
                            format!("failed to import prelude file: {}", path.display()),
                        ));
                        Err(ImportError::ImportFailed)
                    }
                    ImportSite::Line { file, line, start_col, end_col } => {
                        self.diags.push(Diagnostic::new(
                            Severity::Error,
                            file.display().to_string(),
                            line,
                            start_col,
                            line,
                            end_col,
                            format!("failed to import source file: {}", path.display()),
                        ));
                        Err(ImportError::ImportFailed)
                    }
                };
            }
        };

        let file = self.graph.alloc_file(path, content.clone());
        self.imported.insert(canonical, file);

        for (index, raw) in split_lines(&content).into_iter().enumerate() {
            let trimmed = strip_comment(raw).trim_end().to_string();

            if let Some(import_path) = trimmed.trim_start().strip_prefix("import ") {
                let import_path = import_path.trim();
                let resolved = self.resolve_import(path, import_path);
                // The import line itself never enters the merged sequence:
                // the imported file's lines take its place.
                let keyword_len = trimmed.len() - trimmed.trim_start().len() + "import ".len();
                let site = ImportSite::Line {
                    file: path.to_path_buf(),
                    line: index as u32 + 1,
                    start_col: keyword_len as u32,
                    end_col: trimmed.len() as u32,
                };
                self.import_file(&resolved, site)?;
                continue;
            }

            self.graph.alloc_line(file, index as u32, raw.to_string(), trimmed);
        }
        Ok(())
    }

    /// Resolve an import path: relative to the importing file's directory
    /// first, then against the configured library root.
    fn resolve_import(&self, importing: &Path, import_path: &str) -> PathBuf {
        let relative = importing
            .parent()
            .map(|dir| dir.join(import_path))
            .unwrap_or_else(|| PathBuf::from(import_path));
        if self.provider.exists(&relative) {
            return relative;
        }
        if let Some(library_root) = &self.options.library_root {
            let in_library = library_root.join(import_path);
            if self.provider.exists(&in_library) {
                return in_library;
            }
        }
        relative
    }
}

/// Split source text into lines, accepting `\n`, `\r\n` and `\r` terminators.
/// A trailing terminator does not produce an extra empty line.
pub fn split_lines(content: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let bytes = content.as_bytes();
    let mut start = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                lines.push(&content[start..i]);
                i += 1;
                start = i;
            }
            b'\r' => {
                lines.push(&content[start..i]);
                i += if bytes.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
                start = i;
            }
            _ => i += 1,
        }
    }
    if start < bytes.len() {
        lines.push(&content[start..]);
    }
    lines
}

/// Strip a `#` comment, honoring `"`-delimited strings with backslash
/// escapes.
pub fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    let mut prev = '\0';
    for (i, c) in line.char_indices() {
        if c == '"' && prev != '\\' {
            in_string = !in_string;
        } else if c == '#' && !in_string {
            return &line[..i];
        }
        prev = c;
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use drift_common::MemoryProvider;

    fn run(provider: &MemoryProvider, root: &str) -> (ProgramGraph, Diagnostics, Result<(), ImportError>) {
        let mut graph = ProgramGraph::new();
        let mut diags = Diagnostics::new();
        let result = import(
            &mut graph,
            &mut diags,
            provider,
            Path::new(root),
            &ImportOptions::default(),
            &CancelFlag::new(),
        );
        (graph, diags, result)
    }

    fn merged_texts(graph: &ProgramGraph) -> Vec<&str> {
        graph.lines.iter().map(|l| l.trimmed.as_str()).collect()
    }

    #[test]
    fn split_lines_accepts_all_terminators() {
        assert_eq!(split_lines("a\nb\r\nc\rd"), ["a", "b", "c", "d"]);
        assert_eq!(split_lines("a\n"), ["a"]);
        assert_eq!(split_lines(""), Vec::<&str>::new());
    }

    #[test]
    fn strip_comment_honors_strings() {
        assert_eq!(strip_comment("print x # trailing"), "print x ");
        assert_eq!(strip_comment("print \"#not a comment\""), "print \"#not a comment\"");
        assert_eq!(strip_comment("# whole line"), "");
    }

    #[test]
    fn import_lines_are_replaced_by_file_content() {
        let mut provider = MemoryProvider::new();
        provider.insert("main.dl", "before\nimport lib.dl\nafter");
        provider.insert("lib.dl", "one\ntwo");
        let (graph, diags, result) = run(&provider, "main.dl");
        assert!(result.is_ok());
        assert!(diags.is_empty());
        assert_eq!(merged_texts(&graph), ["before", "one", "two", "after"]);
        // Merged indexes are the arena order.
        assert!(graph.lines.iter().enumerate().all(|(i, l)| l.merged_index as usize == i));
    }

    #[test]
    fn a_file_is_loaded_once() {
        let mut provider = MemoryProvider::new();
        provider.insert("main.dl", "import lib.dl\nimport lib.dl");
        provider.insert("lib.dl", "content");
        let (graph, diags, result) = run(&provider, "main.dl");
        assert!(result.is_ok());
        assert!(diags.is_empty());
        assert_eq!(merged_texts(&graph), ["content"]);
        assert_eq!(graph.files.len(), 2);
    }

    #[test]
    fn circular_imports_short_circuit() {
        let mut provider = MemoryProvider::new();
        provider.insert("a.dl", "in a\nimport b.dl");
        provider.insert("b.dl", "in b\nimport a.dl");
        let (graph, diags, result) = run(&provider, "a.dl");
        assert!(result.is_ok());
        assert!(diags.is_empty());
        assert_eq!(merged_texts(&graph), ["in a", "in b"]);
    }

    #[test]
    fn unreadable_root_is_fatal() {
        let provider = MemoryProvider::new();
        let (_, diags, result) = run(&provider, "missing.dl");
        assert!(matches!(result, Err(ImportError::UnreadableRoot(_))));
        assert!(diags.is_empty());
    }

    #[test]
    fn unreadable_import_records_a_diagnostic() {
        let mut provider = MemoryProvider::new();
        provider.insert("main.dl", "import nowhere.dl");
        let (_, diags, result) = run(&provider, "main.dl");
        assert!(matches!(result, Err(ImportError::ImportFailed)));
        assert_eq!(diags.error_count(), 1);
        assert!(diags.entries()[0].message.contains("nowhere.dl"));
    }

    #[test]
    fn prelude_loads_first() {
        let mut provider = MemoryProvider::new();
        provider.insert("main.dl", "main line");
        provider.insert("prelude.dl", "prelude line");
        let mut graph = ProgramGraph::new();
        let mut diags = Diagnostics::new();
        let options = ImportOptions {
            prelude: Some("prelude.dl".into()),
            ..Default::default()
        };
        import(
            &mut graph,
            &mut diags,
            &provider,
            Path::new("main.dl"),
            &options,
            &CancelFlag::new(),
        )
        .unwrap();
        assert_eq!(merged_texts(&graph), ["prelude line", "main line"]);
    }

    #[test]
    fn comment_only_lines_keep_their_merged_slot() {
        let mut provider = MemoryProvider::new();
        provider.insert("main.dl", "# header\n\ncode");
        let (graph, _, _) = run(&provider, "main.dl");
        assert_eq!(merged_texts(&graph), ["", "", "code"]);
        assert_eq!(graph.lines[2].merged_index, 2);
    }
}
