//! Output sinks.
//!
//! Every filesystem side effect of a conversion (creating output
//! directories, writing the PDF, measuring it, cleaning up after a failure)
//! goes through an [`OutputSink`]. The router, the output-path validator and
//! the bundled backends all depend on the sink rather than on `std::fs`, so
//! tests can substitute [`MemorySink`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Destination for converted PDFs.
pub trait OutputSink: Send + Sync + fmt::Debug {
    /// Whether `dir` exists as a directory.
    fn dir_exists(&self, dir: &Path) -> bool;

    /// Create `dir` and its parents (owner-writable, world-readable).
    fn prepare_dir(&self, dir: &Path) -> io::Result<()>;

    /// Whether new files can be created in `dir`.
    fn dir_writable(&self, dir: &Path) -> bool;

    /// Whether a file exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Whether the existing file at `path` can be overwritten.
    fn file_writable(&self, path: &Path) -> bool;

    /// Write `data` to `path` in one step. A failed write leaves no file
    /// behind. Returns the number of bytes written.
    fn write(&self, path: &Path, data: &[u8]) -> io::Result<u64>;

    /// Read back a file.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Size of the file at `path`, if present.
    fn file_size(&self, path: &Path) -> Option<u64>;

    /// Remove the file at `path`.
    fn remove(&self, path: &Path) -> io::Result<()>;
}

/// Parent directory of `path`, treating a bare file name as `.`.
pub fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Sink backed by the real filesystem.
///
/// Writes go to a temporary file in the destination directory which is
/// then renamed over the target, so readers never see a partial PDF.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSink;

impl FsSink {
    /// Create a filesystem sink.
    pub fn new() -> Self {
        Self
    }
}

impl OutputSink for FsSink {
    fn dir_exists(&self, dir: &Path) -> bool {
        dir.is_dir()
    }

    fn prepare_dir(&self, dir: &Path) -> io::Result<()> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o755);
        }
        builder.create(dir)
    }

    fn dir_writable(&self, dir: &Path) -> bool {
        tempfile::Builder::new()
            .prefix(".topdf-probe")
            .tempfile_in(dir)
            .is_ok()
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn file_writable(&self, path: &Path) -> bool {
        fs::OpenOptions::new().append(true).open(path).is_ok()
    }

    fn write(&self, path: &Path, data: &[u8]) -> io::Result<u64> {
        let dir = parent_dir(path);
        let mut tmp = tempfile::Builder::new()
            .prefix(".topdf-")
            .suffix(".part")
            .tempfile_in(dir)?;
        tmp.write_all(data)?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(data.len() as u64)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn file_size(&self, path: &Path) -> Option<u64> {
        fs::metadata(path).ok().filter(|m| m.is_file()).map(|m| m.len())
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<PathBuf, Vec<u8>>,
    dirs: BTreeSet<PathBuf>,
    read_only: BTreeSet<PathBuf>,
    fail_writes: bool,
}

/// In-memory sink for tests and embedders that post-process output.
#[derive(Debug, Default)]
pub struct MemorySink {
    state: Mutex<MemoryState>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        // A poisoned map is still a consistent map.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark a directory or file as not writable.
    pub fn mark_read_only(&self, path: impl Into<PathBuf>) {
        self.state().read_only.insert(path.into());
    }

    /// Make every subsequent write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    /// Seed a file.
    pub fn insert(&self, path: impl Into<PathBuf>, data: Vec<u8>) {
        let path = path.into();
        let mut state = self.state();
        state.dirs.insert(parent_dir(&path).to_path_buf());
        state.files.insert(path, data);
    }

    /// Contents of a stored file.
    pub fn get(&self, path: &Path) -> Option<Vec<u8>> {
        self.state().files.get(path).cloned()
    }

    /// Paths of every stored file.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.state().files.keys().cloned().collect()
    }
}

impl OutputSink for MemorySink {
    fn dir_exists(&self, dir: &Path) -> bool {
        dir == Path::new(".") || self.state().dirs.contains(dir)
    }

    fn prepare_dir(&self, dir: &Path) -> io::Result<()> {
        let mut state = self.state();
        if let Some(blocked) = dir.ancestors().find(|a| state.read_only.contains(*a)) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} is read-only", blocked.display()),
            ));
        }
        for ancestor in dir.ancestors().filter(|a| !a.as_os_str().is_empty()) {
            state.dirs.insert(ancestor.to_path_buf());
        }
        Ok(())
    }

    fn dir_writable(&self, dir: &Path) -> bool {
        !self.state().read_only.contains(dir)
    }

    fn exists(&self, path: &Path) -> bool {
        self.state().files.contains_key(path)
    }

    fn file_writable(&self, path: &Path) -> bool {
        !self.state().read_only.contains(path)
    }

    fn write(&self, path: &Path, data: &[u8]) -> io::Result<u64> {
        let mut state = self.state();
        if state.fail_writes || state.read_only.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("cannot write {}", path.display()),
            ));
        }
        state.files.insert(path.to_path_buf(), data.to_vec());
        Ok(data.len() as u64)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.state().files.get(path).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path.display()))
        })
    }

    fn file_size(&self, path: &Path) -> Option<u64> {
        self.state().files.get(path).map(|d| d.len() as u64)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        self.state().files.remove(path).map(|_| ()).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir(Path::new("out.pdf")), Path::new("."));
        assert_eq!(parent_dir(Path::new("a/b/out.pdf")), Path::new("a/b"));
    }

    #[test]
    fn test_fs_sink_write_and_measure() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsSink::new();
        let target = dir.path().join("nested/deeper/out.pdf");

        assert!(!sink.dir_exists(parent_dir(&target)));
        sink.prepare_dir(parent_dir(&target)).unwrap();
        assert!(sink.dir_writable(parent_dir(&target)));

        let written = sink.write(&target, b"%PDF-1.5 test").unwrap();
        assert_eq!(written, 13);
        assert_eq!(sink.file_size(&target), Some(13));
        assert!(sink.file_writable(&target));
        assert_eq!(sink.read(&target).unwrap(), b"%PDF-1.5 test");

        // Only the target is left; the staging file was renamed away.
        let entries = fs::read_dir(parent_dir(&target)).unwrap().count();
        assert_eq!(entries, 1);

        sink.remove(&target).unwrap();
        assert!(!sink.exists(&target));
    }

    #[test]
    fn test_memory_sink() {
        let sink = MemorySink::new();
        let path = Path::new("out/report.pdf");

        assert!(!sink.dir_exists(Path::new("out")));
        sink.prepare_dir(Path::new("out")).unwrap();
        assert!(sink.dir_exists(Path::new("out")));

        sink.write(path, b"%PDF-1.5").unwrap();
        assert_eq!(sink.file_size(path), Some(8));
        assert_eq!(sink.paths(), vec![path.to_path_buf()]);

        sink.mark_read_only(path);
        assert!(!sink.file_writable(path));
        assert!(sink.write(path, b"x").is_err());
    }

    #[test]
    fn test_memory_sink_read_only_dir() {
        let sink = MemorySink::new();
        sink.mark_read_only("locked");
        assert!(sink.prepare_dir(Path::new("locked/sub")).is_err());
        assert!(!sink.dir_writable(Path::new("locked")));
    }
}
