use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;

/// A unique identifier for a loaded source file within one compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FileId(pub u32);

/// A loaded source file. Immutable after load.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub id: FileId,
    pub path: PathBuf,
    pub content: String,
}

impl SourceFile {
    pub fn new(id: FileId, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            id,
            path: path.into(),
            content: content.into(),
        }
    }

    /// Display form of the path, used in diagnostics.
    pub fn display_path(&self) -> String {
        self.path.display().to_string()
    }
}

/// Abstract read-by-path source access.
///
/// The importer only ever talks to a `FileProvider`; the CLI hands it a
/// [`DiskProvider`], the language server and the tests hand it a
/// [`MemoryProvider`]. `canonical` is used to key the already-imported set so
/// a file reached through two different relative paths still loads once.
pub trait FileProvider {
    /// Read the contents of the file at `path`.
    fn read(&self, path: &Path) -> io::Result<String>;

    /// A canonical form of `path` for identity comparisons. Providers that
    /// have no real filesystem fall back to the path itself.
    fn canonical(&self, path: &Path) -> PathBuf {
        path.to_path_buf()
    }

    /// Whether a file exists at `path` without reading it.
    fn exists(&self, path: &Path) -> bool;
}

/// Disk-backed provider with a process-wide content cache.
///
/// The cache outlives individual compilations: a language-server session
/// re-runs the pipeline on every edit and replaces the program graph
/// wholesale, but unchanged files are served from here without touching the
/// filesystem. `invalidate` drops a single entry when the editor reports a
/// change.
#[derive(Debug, Default)]
pub struct DiskProvider {
    cache: Mutex<HashMap<PathBuf, String>>,
}

impl DiskProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the cached content for `path`, forcing a re-read.
    pub fn invalidate(&self, path: &Path) {
        self.cache.lock().unwrap().remove(&self.canonical(path));
    }

    /// Drop all cached contents.
    pub fn clear(&self) {
        self.cache.lock().unwrap().clear();
    }
}

impl FileProvider for DiskProvider {
    fn read(&self, path: &Path) -> io::Result<String> {
        let key = self.canonical(path);
        if let Some(content) = self.cache.lock().unwrap().get(&key) {
            return Ok(content.clone());
        }
        let content = std::fs::read_to_string(path)?;
        self.cache.lock().unwrap().insert(key, content.clone());
        Ok(content)
    }

    fn canonical(&self, path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// In-memory provider for tests and language-server overlays.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    files: HashMap<PathBuf, String>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file under `path`.
    pub fn insert(&mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> &mut Self {
        self.files.insert(path.into(), content.into());
        self
    }
}

impl FileProvider for MemoryProvider {
    fn read(&self, path: &Path) -> io::Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no such file: {}", path.display())))
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file#{}", self.0)
    }
}
