//! Component E: the METADATA scanner that builds a file-reference count map and tombstones rows
//! whose access groups carry no live files.
//!
//! METADATA's `Files` column stores, per access group, a `;\n`-separated list of live CellStore
//! file names (each optionally prefixed with `#`, which is stripped and otherwise ignored), or a
//! leading `!` marking the access group itself as tombstoned. The scanner relies on the table
//! returning versions newest-first within a cell and cells grouped by row, then by column
//! qualifier: the first version seen for a given `(row, column_qualifier)` pair is the live one
//! and is counted; every older version is superseded and is deleted outright rather than counted.
//!
//! Grouping state is exactly the four variables below: no larger lookahead buffer is kept.

use std::collections::HashMap;

use crate::table::{CellKey, MetadataCell, MetadataMutator, MetadataScanner, FILES_COLUMN_FAMILY};


/// Maps a CellStore file path to the number of live (non-superseded, non-tombstoned) METADATA
/// references that name it. A count of `0` means every row that used to reference the file has
/// since been superseded, tombstoned, or split away; the file is an orphan.
pub type CountMap = HashMap<String, i64>;

/// Drives `scanner` to completion, folding every cell into `files_map` and buffering deletes
/// (superseded cell versions, and whole rows with no surviving files) onto `mutator`.
///
/// Does not flush `mutator`: the caller decides when a cycle's deletes are sent.
pub fn scan_metadata(
    scanner: &mut impl MetadataScanner,
    mutator: &mut impl MetadataMutator,
    files_map: &mut CountMap,
) {
    let mut last_row: Option<String> = None;
    let mut last_cq: Option<String> = None;
    let mut last_time: Option<u64> = None;
    let mut found_valid_files = false;

    while let Some(cell) = scanner.next_cell() {
        if cell.column_family != FILES_COLUMN_FAMILY {
            tracing::error!(
                row = %cell.row,
                column_family = %cell.column_family,
                "METADATA scan returned a cell outside the Files column family; skipping it",
            );
            continue;
        }

        if last_row.as_deref() != Some(cell.row.as_str()) {
            if let Some(row) = last_row.take() {
                finish_row(&row, found_valid_files, mutator);
            }
            last_row = Some(cell.row.clone());
            last_cq = None;
            last_time = None;
            found_valid_files = false;
        }

        if last_cq.as_deref() == Some(cell.column_qualifier.as_str()) {
            // An older version of an access group already seen for this row: the newest version
            // already accounted for any files it names, so its own files are only registered
            // (delta 0) rather than counted, and the now-superseded cell is reclaimed outright.
            if let Some(newer) = last_time {
                if cell.timestamp > newer {
                    tracing::warn!(
                        row = %cell.row,
                        column_qualifier = %cell.column_qualifier,
                        "METADATA scan saw a version out of newest-first order",
                    );
                }
            }
            if !is_tombstone(&cell.value) {
                insert_files(files_map, parse_files(&cell.value), 0);
            }
            mutator.set_delete(
                cell.timestamp,
                &CellKey::cell(cell.row.clone(), cell.column_qualifier.clone(), cell.timestamp),
            );
            continue;
        }

        last_cq = Some(cell.column_qualifier.clone());
        last_time = Some(cell.timestamp);
        if apply_newest_cell(&cell, files_map) {
            found_valid_files = true;
        }
    }

    if let Some(row) = last_row {
        finish_row(&row, found_valid_files, mutator);
    }
}

/// Folds the newest version of a `(row, column_qualifier)` pair into `files_map`. Returns
/// whether this access group counts as carrying at least one live file.
fn apply_newest_cell(cell: &MetadataCell, files_map: &mut CountMap) -> bool {
    if is_tombstone(&cell.value) {
        return false;
    }
    let files = parse_files(&cell.value);
    let has_files = !files.is_empty();
    insert_files(files_map, files, 1);
    has_files
}

fn finish_row(row: &str, found_valid_files: bool, mutator: &mut impl MetadataMutator) {
    if !found_valid_files {
        tracing::debug!(row, "tombstoning METADATA row with no live files");
        mutator.set_delete(0, &CellKey::whole_row(row));
    }
}

fn is_tombstone(value: &[u8]) -> bool {
    value.first() == Some(&b'!')
}

fn parse_files(value: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(value)
        .split(";\n")
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| chunk.strip_prefix('#').unwrap_or(chunk).to_string())
        .collect()
}

fn insert_files(files_map: &mut CountMap, names: Vec<String>, delta: i64) {
    for name in names {
        *files_map.entry(name).or_insert(0) += delta;
    }
}
