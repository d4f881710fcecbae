use std::fmt::Debug;
use std::io::Read;
use std::path::Path;


/// The subset of Hypertable's DFS broker interface the range-server metalog and the master's
/// garbage collector actually depend on.
///
/// Opening a sequential read handle is split from reading; callers hold on to the `ReadFile`
/// (typically wrapping it in a buffered reader) rather than re-opening the path on every call.
pub trait ReadableFilesystem: Debug {
    /// A file opened for sequential reads.
    type ReadFile: Read;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a file which can be read from sequentially.
    ///
    /// Analogous to [`File::open`](std::fs::File::open).
    fn open_sequential(&self, path: &Path) -> Result<Self::ReadFile, Self::Error>;

    /// Returns whether a file or directory exists at `path`.
    fn exists(&self, path: &Path) -> Result<bool, Self::Error>;
}

/// The mutating half of the DFS broker interface: deleting orphaned cell-store files and the
/// directories left empty behind them.
pub trait WritableFilesystem: ReadableFilesystem {
    /// Delete a file at `path`.
    ///
    /// Analogous to [`fs::remove_file`](std::fs::remove_file). Returns an error if no file
    /// exists at `path`.
    fn remove(&self, path: &Path) -> Result<(), Self::Error>;

    /// Remove an empty directory at `path`.
    ///
    /// Analogous to [`fs::remove_dir`](std::fs::remove_dir), or `rmdir` on Unix. Returns an
    /// error if the directory does not exist or is not empty.
    fn rmdir(&self, path: &Path) -> Result<(), Self::Error>;
}
