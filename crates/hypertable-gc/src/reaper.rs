//! Component F: turns a [`CountMap`](crate::scanner::CountMap) into actual filesystem removals.
//!
//! Two passes. The first removes every file whose count dropped to zero and, whatever its count,
//! folds that count into a second map keyed by the file's parent directory; a directory
//! therefore accumulates the live-reference count of its children, not a fixed increment per
//! child. The second pass then removes every directory whose accumulated count is also zero.
//! `dryrun` suppresses the filesystem calls but not the logging or the counters, so a dry run and
//! a real run report identical totals.

use std::path::Path;

use hypertable_vfs::WritableFilesystem;

use crate::scanner::CountMap;


/// Totals from one [`reap`] pass, logged at completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapStats {
    /// Orphaned files considered for removal.
    pub nf:      u64,
    /// Of those, how many were removed (or would be, under `dryrun`).
    pub nf_done: u64,
    /// Empty directories considered for removal.
    pub nd:      u64,
    /// Of those, how many were removed (or would be, under `dryrun`).
    pub nd_done: u64,
}

/// Reaps every entry of `files_map` with a zero reference count, then any directory left empty
/// by doing so.
pub fn reap<FS: WritableFilesystem>(files_map: &CountMap, fs: &FS, dryrun: bool) -> ReapStats {
    let mut dirs_map: CountMap = CountMap::new();
    let mut stats = ReapStats::default();

    for (path, &count) in files_map {
        *dirs_map.entry(dirname(path)).or_insert(0) += count;

        if count != 0 {
            continue;
        }
        stats.nf += 1;
        if dryrun {
            tracing::info!(path = %path, "would remove orphaned file (dryrun)");
            stats.nf_done += 1;
        } else {
            match fs.remove(Path::new(path)) {
                Ok(()) => {
                    stats.nf_done += 1;
                    tracing::info!(path = %path, "removed orphaned file");
                },
                Err(err) => tracing::warn!(path = %path, error = %err, "failed to remove orphaned file"),
            }
        }
    }

    for (dir, &count) in &dirs_map {
        if count != 0 {
            continue;
        }
        stats.nd += 1;
        if dryrun {
            tracing::info!(dir = %dir, "would remove empty directory (dryrun)");
            stats.nd_done += 1;
        } else {
            match fs.rmdir(Path::new(dir)) {
                Ok(()) => {
                    stats.nd_done += 1;
                    tracing::info!(dir = %dir, "removed empty directory");
                },
                Err(err) => tracing::warn!(dir = %dir, error = %err, "failed to remove directory"),
            }
        }
    }

    tracing::info!(
        nf_done = stats.nf_done,
        nf = stats.nf,
        nd_done = stats.nd_done,
        nd = stats.nd,
        "GC reap pass complete",
    );
    stats
}

fn dirname(path: &str) -> String {
    Path::new(path)
        .parent()
        .map(|parent| parent.to_string_lossy().into_owned())
        .unwrap_or_default()
}
