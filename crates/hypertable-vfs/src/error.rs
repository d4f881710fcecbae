use std::path::PathBuf;

use thiserror::Error;


/// Errors produced by [`MemoryFilesystem`](crate::memory::MemoryFilesystem).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MemoryFsError {
    #[error("no file or directory exists at `{}`", .0.display())]
    NotFound(PathBuf),
    #[error("`{}` is a directory, not a file", .0.display())]
    IsADirectory(PathBuf),
    #[error("directory `{}` is not empty", .0.display())]
    NonemptyDirectory(PathBuf),
}
