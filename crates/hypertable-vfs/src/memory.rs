use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::MemoryFsError;
use crate::traits::{ReadableFilesystem, WritableFilesystem};


/// An in-memory [`ReadableFilesystem`]/[`WritableFilesystem`], used to exercise the reaper and
/// the metalog reader without touching the real filesystem.
///
/// Directories are tracked explicitly (rather than inferred from file paths), so an empty
/// directory created with [`MemoryFilesystem::mkdir`] can be observed and removed by the reaper
/// exactly like a directory a real DFS broker would report.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilesystem(Arc<Mutex<Inner>>);

#[derive(Debug, Default)]
struct Inner {
    files:       HashMap<PathBuf, Vec<u8>>,
    directories: HashSet<PathBuf>,
}

impl MemoryFilesystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/fixture helper: write `contents` at `path`, implicitly creating it.
    pub fn write_file(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        let mut inner = self.0.lock().expect("MemoryFilesystem mutex poisoned");
        inner.files.insert(path.into(), contents.into());
    }

    /// Test/fixture helper: create an empty directory at `path`.
    pub fn mkdir(&self, path: impl Into<PathBuf>) {
        let mut inner = self.0.lock().expect("MemoryFilesystem mutex poisoned");
        inner.directories.insert(path.into());
    }

    /// Test helper: whether a file still exists at `path`.
    #[must_use]
    pub fn contains_file(&self, path: &Path) -> bool {
        let inner = self.0.lock().expect("MemoryFilesystem mutex poisoned");
        inner.files.contains_key(path)
    }

    /// Test helper: whether a directory still exists at `path`.
    #[must_use]
    pub fn contains_dir(&self, path: &Path) -> bool {
        let inner = self.0.lock().expect("MemoryFilesystem mutex poisoned");
        inner.directories.contains(path)
    }

    fn has_child_of(inner: &Inner, dir: &Path) -> bool {
        inner.files.keys().any(|p| p.parent() == Some(dir))
            || inner.directories.iter().any(|p| p.as_path() != dir && p.parent() == Some(dir))
    }
}

impl ReadableFilesystem for MemoryFilesystem {
    type ReadFile = Cursor<Vec<u8>>;
    type Error    = MemoryFsError;

    fn open_sequential(&self, path: &Path) -> Result<Self::ReadFile, Self::Error> {
        let inner = self.0.lock().expect("MemoryFilesystem mutex poisoned");
        inner.files.get(path)
            .cloned()
            .map(Cursor::new)
            .ok_or_else(|| MemoryFsError::NotFound(path.to_path_buf()))
    }

    fn exists(&self, path: &Path) -> Result<bool, Self::Error> {
        let inner = self.0.lock().expect("MemoryFilesystem mutex poisoned");
        Ok(inner.files.contains_key(path) || inner.directories.contains(path))
    }
}

impl WritableFilesystem for MemoryFilesystem {
    fn remove(&self, path: &Path) -> Result<(), Self::Error> {
        let mut inner = self.0.lock().expect("MemoryFilesystem mutex poisoned");
        if inner.directories.contains(path) {
            return Err(MemoryFsError::IsADirectory(path.to_path_buf()));
        }
        inner.files.remove(path)
            .map(|_| ())
            .ok_or_else(|| MemoryFsError::NotFound(path.to_path_buf()))
    }

    fn rmdir(&self, path: &Path) -> Result<(), Self::Error> {
        let mut inner = self.0.lock().expect("MemoryFilesystem mutex poisoned");
        if !inner.directories.contains(path) {
            return Err(MemoryFsError::NotFound(path.to_path_buf()));
        }
        if Self::has_child_of(&inner, path) {
            return Err(MemoryFsError::NonemptyDirectory(path.to_path_buf()));
        }
        inner.directories.remove(path);
        Ok(())
    }
}
