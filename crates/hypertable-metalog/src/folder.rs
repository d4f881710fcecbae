//! Component D: folds a stream of [`MetaLogEntry`] values into the set of per-range state a
//! recovering range server must resume from.
//!
//! [`RangeStateFolder`] is deterministic in the input order (it never reorders or buffers
//! ahead) and enforces the ordering invariants documented on each [`MetaLogEntry`] variant.
//! Split and move are folded symmetrically: a `*Start` opens a transaction against an already
//! loaded range, the matching `*Prepared`/`Shrunk` continuation extends it, and `*Done` clears
//! it. The one asymmetry is that a `SplitShrunk` changes the range's `end_row`, which is also
//! the folder's external key for that range: see [`RangeStateFolder::apply_split_shrunk`] for
//! how that rekeying is located and performed.

use std::collections::HashMap;

use tracing::warn;

use crate::entry::{MetaLogEntry, RangeSpec, TableIdentifier};
use crate::error::MetalogError;


/// Key a [`RangeStateInfo`] is addressed by: a table, paired with the end_row of the range as it
/// currently stands. Stable except across a `SplitShrunk`, which moves a range to a new key.
type RangeKey = (u32, Vec<u8>);

/// The folded, in-memory state of a single range, reconstructed from the transactions recorded
/// for it in a metalog.
///
/// `transactions` holds the in-flight prefix of a split or move: empty when the range is quiescent,
/// or a nonempty list beginning with the transaction's `*Start` entry when one is underway. A
/// recovering range server resumes whatever `transactions` holds.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeStateInfo {
    pub table:        TableIdentifier,
    pub range:        RangeSpec,
    pub soft_limit:   u64,
    pub timestamp:    u64,
    pub transactions: Vec<MetaLogEntry>,
}

impl RangeStateInfo {
    fn key(&self) -> RangeKey {
        (self.table.id, self.range.end_row.clone())
    }
}

/// Folds entries into a set of [`RangeStateInfo`] objects, one per distinct `(table.id, end_row)`.
#[derive(Debug, Default)]
pub struct RangeStateFolder {
    entries: Vec<RangeStateInfo>,
    by_key:  HashMap<RangeKey, usize>,
}

impl RangeStateFolder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one entry, read from byte offset `offset` in its source metalog (used only to
    /// annotate [`MetalogError::EntryBadOrder`]).
    ///
    /// # Errors
    /// Returns [`MetalogError::EntryBadOrder`] if `entry` violates the ordering invariants for
    /// its variant, most commonly a split or move continuation with no matching `*Start`. A
    /// duplicate `RangeLoaded` is not an error: it is logged as a warning and discarded.
    pub fn apply(&mut self, entry: MetaLogEntry, offset: u64) -> Result<(), MetalogError> {
        match entry {
            MetaLogEntry::RangeLoaded { .. } => self.apply_range_loaded(entry),
            MetaLogEntry::SplitStart { .. } => self.apply_split_start(entry, offset),
            MetaLogEntry::SplitShrunk { .. } => self.apply_split_shrunk(entry, offset),
            MetaLogEntry::SplitDone { .. } => self.apply_split_done(entry, offset),
            MetaLogEntry::MoveStart { .. } => self.apply_move_start(entry, offset),
            MetaLogEntry::MovePrepared { .. } => self.apply_move_prepared(entry, offset),
            MetaLogEntry::MoveDone { .. } => self.apply_move_done(entry, offset),
        }
    }

    /// Consumes the folder, returning its entries in the output ordering: lexicographic on
    /// `(table.id, end_row)`, not the temporal order entries were applied in.
    #[must_use]
    pub fn into_sorted_vec(self) -> Vec<RangeStateInfo> {
        let mut entries = self.entries;
        entries.sort_by(|a, b| (a.table.id, &a.range.end_row).cmp(&(b.table.id, &b.range.end_row)));
        entries
    }

    fn apply_range_loaded(&mut self, entry: MetaLogEntry) -> Result<(), MetalogError> {
        let MetaLogEntry::RangeLoaded { table, range, state, timestamp } = entry else {
            unreachable!("dispatched on this variant")
        };
        let key = (table.id, range.end_row.clone());

        if self.by_key.contains_key(&key) {
            warn!(
                table_id = table.id,
                end_row  = ?String::from_utf8_lossy(&range.end_row),
                "duplicate RangeLoaded for an already-loaded range; discarding",
            );
            return Ok(());
        }

        let index = self.entries.len();
        self.entries.push(RangeStateInfo {
            table, range, soft_limit: state.soft_limit, timestamp, transactions: Vec::new(),
        });
        self.by_key.insert(key, index);
        Ok(())
    }

    fn apply_split_start(&mut self, entry: MetaLogEntry, offset: u64) -> Result<(), MetalogError> {
        let (key, soft_limit, timestamp) = {
            let MetaLogEntry::SplitStart { table, range, state, timestamp, .. } = &entry else {
                unreachable!("dispatched on this variant")
            };
            ((table.id, range.end_row.clone()), state.soft_limit, *timestamp)
        };

        let index = self.require_index(&key, offset, "split start references a range with no prior RangeLoaded")?;
        let info = &mut self.entries[index];
        info.soft_limit = soft_limit;
        info.timestamp = timestamp;
        info.transactions.push(entry);
        Ok(())
    }

    /// A `SplitShrunk` carries the range's *new* bounds, so it cannot be located by the
    /// folder's usual `(table.id, end_row)` key: that key is exactly what's about to change.
    /// Instead it's located by `(table.id, start_row)`: `start_row` is invariant across a shrink
    /// (only `end_row` moves), and only a range with a `SplitStart` already at the head of its
    /// transaction list is eligible. Once found, the entry's `range` and its external key are
    /// both updated in place.
    fn apply_split_shrunk(&mut self, entry: MetaLogEntry, offset: u64) -> Result<(), MetalogError> {
        let (table_id, new_range, timestamp) = {
            let MetaLogEntry::SplitShrunk { table, range, timestamp } = &entry else {
                unreachable!("dispatched on this variant")
            };
            (table.id, range.clone(), *timestamp)
        };

        let index = self.find_open_transaction(table_id, &new_range.start_row, is_split_start, offset)?;

        let old_key = self.entries[index].key();
        let new_key = (table_id, new_range.end_row.clone());

        if old_key != new_key {
            if let Some(&existing) = self.by_key.get(&new_key) {
                if existing != index {
                    return Err(MetalogError::EntryBadOrder {
                        offset,
                        reason: "split shrunk would collide with an already-loaded range",
                    });
                }
            }
            self.by_key.remove(&old_key);
            self.by_key.insert(new_key, index);
        }

        let info = &mut self.entries[index];
        info.range = new_range;
        info.timestamp = timestamp;
        info.transactions.push(entry);
        Ok(())
    }

    fn apply_split_done(&mut self, entry: MetaLogEntry, offset: u64) -> Result<(), MetalogError> {
        let key = {
            let MetaLogEntry::SplitDone { table, range, .. } = &entry else {
                unreachable!("dispatched on this variant")
            };
            (table.id, range.end_row.clone())
        };

        let index = self.require_index(&key, offset, "split done references a range with no prior RangeLoaded")?;
        self.require_transaction_head(index, is_split_start, offset, "split done without a preceding split start")?;
        self.entries[index].transactions.clear();
        Ok(())
    }

    fn apply_move_start(&mut self, entry: MetaLogEntry, offset: u64) -> Result<(), MetalogError> {
        let (key, timestamp) = {
            let MetaLogEntry::MoveStart { table, range, timestamp, .. } = &entry else {
                unreachable!("dispatched on this variant")
            };
            ((table.id, range.end_row.clone()), *timestamp)
        };

        let index = self.require_index(&key, offset, "move start references a range with no prior RangeLoaded")?;
        let info = &mut self.entries[index];
        info.timestamp = timestamp;
        info.transactions.push(entry);
        Ok(())
    }

    fn apply_move_prepared(&mut self, entry: MetaLogEntry, offset: u64) -> Result<(), MetalogError> {
        let (key, timestamp) = {
            let MetaLogEntry::MovePrepared { table, range, timestamp } = &entry else {
                unreachable!("dispatched on this variant")
            };
            ((table.id, range.end_row.clone()), *timestamp)
        };

        let index = self.require_index(&key, offset, "move prepared references a range with no prior RangeLoaded")?;
        self.require_transaction_head(index, is_move_start, offset, "move prepared without a preceding move start")?;
        let info = &mut self.entries[index];
        info.timestamp = timestamp;
        info.transactions.push(entry);
        Ok(())
    }

    fn apply_move_done(&mut self, entry: MetaLogEntry, offset: u64) -> Result<(), MetalogError> {
        let key = {
            let MetaLogEntry::MoveDone { table, range, .. } = &entry else {
                unreachable!("dispatched on this variant")
            };
            (table.id, range.end_row.clone())
        };

        let index = self.require_index(&key, offset, "move done references a range with no prior RangeLoaded")?;
        self.require_transaction_head(index, is_move_start, offset, "move done without a preceding move start")?;
        self.entries[index].transactions.clear();
        Ok(())
    }

    fn require_index(
        &self,
        key:    &RangeKey,
        offset: u64,
        reason: &'static str,
    ) -> Result<usize, MetalogError> {
        self.by_key.get(key).copied().ok_or(MetalogError::EntryBadOrder { offset, reason })
    }

    fn require_transaction_head(
        &self,
        index:     usize,
        is_head:   fn(&MetaLogEntry) -> bool,
        offset:    u64,
        reason:    &'static str,
    ) -> Result<(), MetalogError> {
        match self.entries[index].transactions.first() {
            Some(head) if is_head(head) => Ok(()),
            _ => Err(MetalogError::EntryBadOrder { offset, reason }),
        }
    }

    fn find_open_transaction(
        &self,
        table_id:   u32,
        start_row:  &[u8],
        is_head:    fn(&MetaLogEntry) -> bool,
        offset:     u64,
    ) -> Result<usize, MetalogError> {
        self.entries.iter().position(|info| {
            info.table.id == table_id
                && info.range.start_row == start_row
                && info.transactions.first().is_some_and(is_head)
        }).ok_or(MetalogError::EntryBadOrder {
            offset,
            reason: "split shrunk with no in-flight split start for this range",
        })
    }
}

fn is_split_start(entry: &MetaLogEntry) -> bool {
    matches!(entry, MetaLogEntry::SplitStart { .. })
}

fn is_move_start(entry: &MetaLogEntry) -> bool {
    matches!(entry, MetaLogEntry::MoveStart { .. })
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::RangeState;

    fn table() -> TableIdentifier {
        TableIdentifier { id: 1, generation: 0 }
    }

    fn range(start: &[u8], end: &[u8]) -> RangeSpec {
        RangeSpec { start_row: start.to_vec(), end_row: end.to_vec() }
    }

    fn state(soft_limit: u64) -> RangeState {
        RangeState { soft_limit, transfer_log: None }
    }

    fn fold(entries: Vec<MetaLogEntry>) -> Result<Vec<RangeStateInfo>, MetalogError> {
        let mut folder = RangeStateFolder::new();
        for (offset, entry) in entries.into_iter().enumerate() {
            folder.apply(entry, offset as u64)?;
        }
        Ok(folder.into_sorted_vec())
    }

    #[test]
    fn s1_load_then_split_cycle() {
        let result = fold(vec![
            MetaLogEntry::RangeLoaded {
                table: table(), range: range(b"a", b"m"), state: state(1), timestamp: 1,
            },
            MetaLogEntry::SplitStart {
                table: table(), range: range(b"a", b"m"), split_off: range(b"g", b"m"),
                state: state(64 << 20), timestamp: 2,
            },
            MetaLogEntry::SplitShrunk {
                table: table(), range: range(b"a", b"g"), timestamp: 3,
            },
            MetaLogEntry::SplitDone { table: table(), range: range(b"a", b"g"), timestamp: 4 },
        ]).unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].table.id, 1);
        assert_eq!(result[0].range.end_row, b"g");
        assert_eq!(result[0].soft_limit, 64 << 20);
        assert!(result[0].transactions.is_empty());
    }

    #[test]
    fn s2_split_in_flight_at_crash() {
        let result = fold(vec![
            MetaLogEntry::RangeLoaded {
                table: table(), range: range(b"m", b"z"), state: state(1), timestamp: 1,
            },
            MetaLogEntry::SplitStart {
                table: table(), range: range(b"m", b"z"), split_off: range(b"p", b"z"),
                state: state(32 << 20), timestamp: 2,
            },
        ]).unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].range.end_row, b"z");
        assert_eq!(result[0].soft_limit, 32 << 20);
        assert_eq!(result[0].transactions.len(), 1);
        assert!(matches!(result[0].transactions[0], MetaLogEntry::SplitStart { .. }));
    }

    #[test]
    fn s3_bad_order() {
        let err = fold(vec![
            MetaLogEntry::SplitShrunk { table: table(), range: range(b"", b"a"), timestamp: 1 },
        ]).unwrap_err();
        assert!(matches!(err, MetalogError::EntryBadOrder { .. }));
    }

    #[test]
    fn duplicate_range_loaded_is_discarded_not_an_error() {
        let result = fold(vec![
            MetaLogEntry::RangeLoaded {
                table: table(), range: range(b"a", b"m"), state: state(1), timestamp: 1,
            },
            MetaLogEntry::RangeLoaded {
                table: table(), range: range(b"a", b"m"), state: state(2), timestamp: 2,
            },
        ]).unwrap();

        assert_eq!(result.len(), 1);
        // The second RangeLoaded was discarded: soft_limit and timestamp are unchanged.
        assert_eq!(result[0].soft_limit, 1);
        assert_eq!(result[0].timestamp, 1);
    }

    #[test]
    fn move_cycle_mirrors_split() {
        let result = fold(vec![
            MetaLogEntry::RangeLoaded {
                table: table(), range: range(b"a", b"m"), state: state(1), timestamp: 1,
            },
            MetaLogEntry::MoveStart {
                table: table(), range: range(b"a", b"m"), state: state(16 << 20), timestamp: 2,
            },
            MetaLogEntry::MovePrepared { table: table(), range: range(b"a", b"m"), timestamp: 3 },
            MetaLogEntry::MoveDone { table: table(), range: range(b"a", b"m"), timestamp: 4 },
        ]).unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].soft_limit, 1);
        assert!(result[0].transactions.is_empty());
    }

    #[test]
    fn move_prepared_without_move_start_is_bad_order() {
        let err = fold(vec![
            MetaLogEntry::RangeLoaded {
                table: table(), range: range(b"a", b"m"), state: state(1), timestamp: 1,
            },
            MetaLogEntry::MovePrepared { table: table(), range: range(b"a", b"m"), timestamp: 2 },
        ]).unwrap_err();
        assert!(matches!(err, MetalogError::EntryBadOrder { .. }));
    }

    #[test]
    fn output_is_sorted_lexicographically_by_table_then_end_row() {
        let result = fold(vec![
            MetaLogEntry::RangeLoaded {
                table: TableIdentifier { id: 2, generation: 0 },
                range: range(b"", b"z"), state: state(1), timestamp: 1,
            },
            MetaLogEntry::RangeLoaded {
                table: table(), range: range(b"", b"z"), state: state(1), timestamp: 2,
            },
            MetaLogEntry::RangeLoaded {
                table: table(), range: range(b"", b"a"), state: state(1), timestamp: 3,
            },
        ]).unwrap();

        let keys: Vec<_> = result.iter().map(|info| (info.table.id, info.range.end_row.clone())).collect();
        assert_eq!(keys, vec![
            (1, b"a".to_vec()),
            (1, b"z".to_vec()),
            (2, b"z".to_vec()),
        ]);
    }
}
