//! The Drift compiler CLI.
//!
//! `driftc compile <input.dl>` runs the front end -- importing, section
//! analysis, pattern resolution, type inference -- and reports diagnostics.
//!
//! Options:
//! - `-o, --output` - Output path for the compiled binary
//! - `--emit-llvm` - Emit LLVM IR alongside the binary
//! - `-O` - Optimization level (0-3)
//! - `--prelude` - Pattern primitives file, loaded as the first import
//! - `--library-root` - Second lookup directory for imports
//! - `--json` - Output diagnostics as JSON (one object per line)
//! - `--no-color` - Disable colorized output
//!
//! Exit codes: 0 on success, 1 if any error diagnostic was emitted, 2 when
//! the root file cannot be read.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use drift_common::{CancelFlag, Diagnostic, DiskProvider, Severity};
use driftc::{compile, CompileOptions, CompileResult, Outcome};

#[derive(Parser)]
#[command(name = "driftc", version, about = "The Drift compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a Drift source file
    Compile {
        /// Path to the root source file (.dl)
        input: PathBuf,

        /// Output path for the compiled binary
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Emit LLVM IR (.ll file) alongside the binary
        #[arg(long = "emit-llvm")]
        emit_llvm: bool,

        /// Optimization level (0-3)
        #[arg(short = 'O', default_value = "0", value_parser = clap::value_parser!(u8).range(0..=3))]
        opt_level: u8,

        /// Pattern primitives file, loaded as the first import
        #[arg(long)]
        prelude: Option<PathBuf>,

        /// Second lookup directory for import paths
        #[arg(long = "library-root")]
        library_root: Option<PathBuf>,

        /// Output diagnostics as JSON (one object per line)
        #[arg(long)]
        json: bool,

        /// Disable colorized output
        #[arg(long = "no-color")]
        no_color: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    match cli.command {
        Commands::Compile {
            input,
            output,
            emit_llvm,
            opt_level,
            prelude,
            library_root,
            json,
            no_color,
        } => {
            let options = CompileOptions {
                output,
                emit_llvm,
                opt_level,
                prelude,
                library_root,
                ..Default::default()
            };
            let provider = DiskProvider::new();
            let result = compile(&provider, &input, &options, &CancelFlag::new());

            report_diagnostics(&result, json, !no_color && !json);

            match result.outcome {
                Outcome::Success => {
                    eprintln!("  Checked: {}", input.display());
                }
                Outcome::Failed => {}
                Outcome::UnreadableRoot => {
                    eprintln!("error: cannot read '{}'", input.display());
                }
            }
            process::exit(result.outcome.exit_code());
        }
    }
}

/// Render every diagnostic: JSON lines, or ariadne reports on the source.
fn report_diagnostics(result: &CompileResult, json: bool, color: bool) {
    for diagnostic in result.diagnostics.entries() {
        if json {
            let line = serde_json::json!({
                "severity": diagnostic.severity,
                "file": diagnostic.file,
                "start_line": diagnostic.start_line,
                "start_col": diagnostic.start_col,
                "end_line": diagnostic.end_line,
                "end_col": diagnostic.end_col,
                "message": diagnostic.message,
            });
            eprintln!("{line}");
        } else {
            render_report(result, diagnostic, color);
        }
    }
}

fn render_report(result: &CompileResult, diagnostic: &Diagnostic, color: bool) {
    use ariadne::{Config, Label, Report, ReportKind, Source};

    let Some(file) = result
        .graph
        .files
        .iter()
        .find(|f| f.display_path() == diagnostic.file)
    else {
        // Not anchored to a loaded file (e.g. an unreadable prelude).
        eprintln!("{diagnostic}");
        return;
    };

    let start = byte_offset(&file.content, diagnostic.start_line, diagnostic.start_col);
    let end = byte_offset(&file.content, diagnostic.end_line, diagnostic.end_col).max(start + 1);

    let kind = match diagnostic.severity {
        Severity::Error => ReportKind::Error,
        Severity::Warning => ReportKind::Warning,
        Severity::Info | Severity::Hint => ReportKind::Advice,
    };
    let config = if color {
        Config::default()
    } else {
        Config::default().with_color(false)
    };
    let _ = Report::<std::ops::Range<usize>>::build(kind, start..end)
        .with_message(&diagnostic.message)
        .with_config(config)
        .with_label(Label::new(start..end).with_message(&diagnostic.message))
        .finish()
        .eprint(Source::from(file.content.as_str()));
}

/// Byte offset of a (1-based line, 0-based column) pair in `content`.
fn byte_offset(content: &str, line: u32, col: u32) -> usize {
    let mut remaining = line.saturating_sub(1);
    let mut offset = 0usize;
    for (i, b) in content.bytes().enumerate() {
        if remaining == 0 {
            break;
        }
        if b == b'\n' {
            remaining -= 1;
            offset = i + 1;
        }
    }
    (offset + col as usize).min(content.len())
}
