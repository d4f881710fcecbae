use std::fs::{self, File};
use std::io::Error as IoError;
use std::path::Path;

use crate::traits::{ReadableFilesystem, WritableFilesystem};


/// A [`ReadableFilesystem`]/[`WritableFilesystem`] backed directly by the local POSIX
/// filesystem. Stands in for Hypertable's DFS broker, which in production fronts HDFS, Ceph, or
/// a local disk and is not itself part of this crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixFilesystem;

impl ReadableFilesystem for PosixFilesystem {
    type ReadFile = File;
    type Error    = IoError;

    #[inline]
    fn open_sequential(&self, path: &Path) -> Result<Self::ReadFile, Self::Error> {
        File::open(path)
    }

    #[inline]
    fn exists(&self, path: &Path) -> Result<bool, Self::Error> {
        path.try_exists()
    }
}

impl WritableFilesystem for PosixFilesystem {
    #[inline]
    fn remove(&self, path: &Path) -> Result<(), Self::Error> {
        fs::remove_file(path)
    }

    #[inline]
    fn rmdir(&self, path: &Path) -> Result<(), Self::Error> {
        fs::remove_dir(path)
    }
}
