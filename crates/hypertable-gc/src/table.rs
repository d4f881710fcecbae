//! The slice of Hypertable's client table interface the garbage collector consumes: a scanner
//! over METADATA cells and a mutator for tombstoning rows and superseded cells.
//!
//! None of this crate's logic depends on how a concrete `Table` talks to range servers, only on
//! these traits, which mirror `Table::create_scanner`/`Table::create_mutator` from the original
//! client library closely enough that a real binding can implement them directly.

use std::time::Duration;

use crate::error::GcError;


/// The column family the garbage collector's scan is restricted to. Any cell reported under a
/// different family indicates a table client that ignored the `ScanSpec`.
pub const FILES_COLUMN_FAMILY: &str = "Files";

/// One cell returned by a METADATA scan.
///
/// The garbage collector's scan is restricted to the `Files` column family across the full row
/// range (endpoints excluded), requesting all versions; `column_qualifier` names the access
/// group a cell belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataCell {
    pub row:              String,
    pub column_family:    String,
    pub column_qualifier: String,
    pub timestamp:        u64,
    pub value:            Vec<u8>,
}

/// The single scan specification the garbage collector issues. Carries no fields of its own: a
/// concrete `MetadataTable` implementation is expected to translate this marker into whatever
/// `ScanSpec` its wire protocol requires (the `Files` column family, full row range with both
/// endpoints excluded, all versions).
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanSpec;

impl ScanSpec {
    #[must_use]
    pub fn metadata_files() -> Self {
        Self
    }
}

/// A live scan over METADATA, in the row-major, newest-version-first order the scanner in
/// [`crate::scanner`] depends on.
pub trait MetadataScanner {
    /// Returns the next cell, or `None` once the scan is exhausted.
    fn next_cell(&mut self) -> Option<MetadataCell>;
}

/// Identifies what a mutator delete applies to: an entire row (every access group, used to
/// tombstone a row with no surviving files) or one specific cell (used to retire a superseded,
/// non-tombstone version once its files have been counted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellKey {
    pub row:              String,
    pub column_qualifier: Option<String>,
    pub timestamp:        Option<u64>,
}

impl CellKey {
    /// A delete covering every column and version of `row`.
    #[must_use]
    pub fn whole_row(row: impl Into<String>) -> Self {
        Self { row: row.into(), column_qualifier: None, timestamp: None }
    }

    /// A delete covering one specific, already-superseded cell.
    #[must_use]
    pub fn cell(row: impl Into<String>, column_qualifier: impl Into<String>, timestamp: u64) -> Self {
        Self {
            row:              row.into(),
            column_qualifier: Some(column_qualifier.into()),
            timestamp:        Some(timestamp),
        }
    }
}

/// A mutation error reported against a single cell by [`MetadataMutator::get_failed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedMutation {
    pub key:     CellKey,
    pub message: String,
}

/// A batched set of deletes against METADATA.
///
/// `set_delete` only buffers the delete; nothing is sent until [`MetadataMutator::flush`]. This
/// mirrors the source's scatter-buffer mutator: individual `set_delete` calls cannot themselves
/// fail, only the flush (and, transitively, any retry of it) can.
pub trait MetadataMutator {
    /// Buffers a delete of `key` at `timestamp`.
    fn set_delete(&mut self, timestamp: u64, key: &CellKey);

    /// Sends all buffered deletes.
    ///
    /// # Errors
    /// Returns [`GcError::MutatorFlush`] if the flush could not be issued at all. Partial,
    /// per-cell failures within an otherwise successful flush are not reported here: see
    /// [`MetadataMutator::get_failed`].
    fn flush(&mut self) -> Result<(), GcError>;

    /// Drains and returns the per-cell failures from the most recent flush.
    fn get_failed(&mut self) -> Vec<FailedMutation>;

    /// Re-issues the cells reported by [`MetadataMutator::get_failed`], waiting up to `timeout`.
    ///
    /// # Errors
    /// Returns [`GcError::MutatorFlush`] if the retry itself could not be issued.
    fn retry(&mut self, timeout: Duration) -> Result<(), GcError>;
}

/// A handle to the METADATA table: produces the scanner and mutator the GC drives each cycle.
pub trait MetadataTable {
    type Scanner: MetadataScanner;
    type Mutator: MetadataMutator;

    fn create_scanner(&self, spec: ScanSpec) -> Self::Scanner;
    fn create_mutator(&self) -> Self::Mutator;
}
