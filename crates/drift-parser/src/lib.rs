//! The Drift front end up to (but not including) pattern resolution.
//!
//! Three stages run here, in order:
//!
//! 1. [`importer`] loads the root file, expands `import` lines depth-first
//!    and produces the merged code line sequence.
//! 2. [`sections`] turns the merged lines into the section tree using
//!    indentation and trailing `:`, dispatching each line by its section's
//!    kind. Plain code lines are handed to the line parser on the way.
//! 3. [`line_parser`] parses one line's pattern text into a bracket
//!    hierarchy, carves out recognized literals (strings, numbers, groups,
//!    `@intrinsic(...)` calls) and leaves behind a transformed pattern text
//!    with argument slots for the resolver to match.
//!
//! [`element`] parses pattern texts into [`drift_graph::PatternElement`]
//! sequences for both definitions and references.

pub mod element;
pub mod importer;
pub mod line_parser;
pub mod sections;

pub use importer::{import, ImportError, ImportOptions};
pub use sections::analyze;
