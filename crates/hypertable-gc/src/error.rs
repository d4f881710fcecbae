use thiserror::Error;


/// Errors produced while the garbage collector scans METADATA or reaps orphaned files.
///
/// Per-file filesystem errors (`FileNotFound`, `FsError`) are caught and logged by
/// [`crate::reaper::reap`]; they never abort a reap pass. A `Mutator` error during METADATA
/// tombstoning is likewise logged and the scan continues; it is the scanner's job to keep
/// `files_map` correct even when a delete could not be issued. Only a scanner error that leaves
/// `files_map` itself untrustworthy (for example, a malformed scan spec rejected by the table
/// client) should abort a whole GC cycle: see [`GcError::Scan`].
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GcError {
    #[error("METADATA scan failed: {0}")]
    Scan(String),

    #[error("failed to flush METADATA mutator: {0}")]
    MutatorFlush(String),
}
