//! The compile pipeline: import, sections, resolution, inference.
//!
//! Each stage checks the diagnostic tally before the next runs. Stages keep
//! going past non-fatal errors inside themselves, so a run reports
//! everything it can; the two hard aborts are an unreadable root file and
//! over-indentation.

use std::path::{Path, PathBuf};

use drift_common::{CancelFlag, Diagnostics, FileProvider, MemoryProvider};
use drift_graph::{ProgramGraph, Tries};
use drift_parser::importer::{self, ImportError, ImportOptions};
use drift_resolver::ResolveOptions;
use drift_typeck::InferOptions;

/// Configuration for one compilation.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Output path, handed to the external code generator.
    pub output: Option<PathBuf>,
    /// Emit LLVM IR alongside the binary (external code generator).
    pub emit_llvm: bool,
    /// Optimization level 0-3 (external code generator).
    pub opt_level: u8,
    /// The pattern primitives prelude, loaded as the first import.
    pub prelude: Option<PathBuf>,
    /// Second candidate directory for import paths.
    pub library_root: Option<PathBuf>,
    /// Bound on the resolver's fixed-point loops.
    pub max_resolution_iterations: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            output: None,
            emit_llvm: false,
            opt_level: 0,
            prelude: None,
            library_root: None,
            max_resolution_iterations: 256,
        }
    }
}

/// How a compilation ended. Maps directly to the CLI exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No error diagnostics; the graph is ready for code generation.
    Success,
    /// Error diagnostics were recorded (or the run was cancelled).
    Failed,
    /// The root file could not be read; nothing ran.
    UnreadableRoot,
}

impl Outcome {
    pub fn exit_code(self) -> i32 {
        match self {
            Outcome::Success => 0,
            Outcome::Failed => 1,
            Outcome::UnreadableRoot => 2,
        }
    }
}

/// Everything a compilation produced. The graph and tries are present even
/// on failure, holding whatever the pipeline got through; diagnostics are
/// ordered and never deduplicated.
pub struct CompileResult {
    pub graph: ProgramGraph,
    pub tries: Tries,
    pub diagnostics: Diagnostics,
    pub outcome: Outcome,
}

/// Compile `input` through the front end.
pub fn compile(
    provider: &dyn FileProvider,
    input: &Path,
    options: &CompileOptions,
    cancel: &CancelFlag,
) -> CompileResult {
    let mut graph = ProgramGraph::new();
    let mut tries = Tries::new();
    let mut diags = Diagnostics::new();
    let outcome = run_stages(&mut graph, &mut tries, &mut diags, provider, input, options, cancel);
    CompileResult {
        graph,
        tries,
        diagnostics: diags,
        outcome,
    }
}

fn run_stages(
    graph: &mut ProgramGraph,
    tries: &mut Tries,
    diags: &mut Diagnostics,
    provider: &dyn FileProvider,
    input: &Path,
    options: &CompileOptions,
    cancel: &CancelFlag,
) -> Outcome {
    let import_options = ImportOptions {
        prelude: options.prelude.clone(),
        library_root: options.library_root.clone(),
    };
    match importer::import(graph, diags, provider, input, &import_options, cancel) {
        Ok(()) => {}
        Err(ImportError::UnreadableRoot(_)) => return Outcome::UnreadableRoot,
        Err(ImportError::ImportFailed) | Err(ImportError::Cancelled) => return Outcome::Failed,
    }

    if drift_parser::analyze(graph, diags).is_err() {
        return Outcome::Failed;
    }
    if diags.has_errors() {
        return Outcome::Failed;
    }

    let resolve_options = ResolveOptions {
        max_iterations: options.max_resolution_iterations,
    };
    if !drift_resolver::resolve(graph, tries, diags, &resolve_options, cancel) {
        return Outcome::Failed;
    }

    if !drift_typeck::infer(graph, tries, diags, &InferOptions::default(), cancel) {
        return Outcome::Failed;
    }

    if diags.has_errors() {
        Outcome::Failed
    } else {
        Outcome::Success
    }
}

/// Compile a single in-memory source, for tests and tooling.
pub fn compile_source(source: &str) -> CompileResult {
    let mut provider = MemoryProvider::new();
    provider.insert("main.dl", source);
    compile(
        &provider,
        Path::new("main.dl"),
        &CompileOptions::default(),
        &CancelFlag::new(),
    )
}
