use thiserror::Error;

use crate::codec::ShortBuffer;


/// Errors produced while opening, scanning, or folding a range-server metalog.
///
/// `BadRsHeader` and `VersionMismatch` are fatal at reader construction. `EntryBadPayload` aborts
/// the current scan. `EntryBadOrder` aborts the fold: the log's record of range lifecycle events
/// is internally inconsistent and cannot be trusted to resume from.
#[derive(Error, Debug)]
pub enum MetalogError {
    #[error("metalog header too short to contain the `RSML` prefix and version")]
    BadRsHeader,
    #[error("metalog version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u16, found: u16 },
    #[error("malformed metalog entry payload while {phase}: {source}")]
    EntryBadPayload {
        phase:  &'static str,
        source: ShortBuffer,
    },
    #[error("metalog entry type {0} is not a recognized wire tag")]
    UnknownEntryType(u16),
    #[error("metalog entries out of order at byte offset {offset}: {reason}")]
    EntryBadOrder { offset: u64, reason: &'static str },
    #[error("I/O error reading metalog: {0}")]
    Io(#[from] std::io::Error),
}

impl MetalogError {
    /// The byte offset at which the error was detected, when known.
    #[must_use]
    pub fn byte_offset(&self) -> Option<u64> {
        match self {
            Self::EntryBadOrder { offset, .. } => Some(*offset),
            Self::BadRsHeader
            | Self::VersionMismatch { .. }
            | Self::EntryBadPayload { .. }
            | Self::UnknownEntryType(_)
            | Self::Io(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MetalogError>;
