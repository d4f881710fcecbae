//! Typed range-server metalog entries (component B) and the types they carry.
//!
//! Every range-bearing entry shares two payload shapes: [`write_range_common`] (table + range +
//! state) used by `RangeLoaded`, `SplitStart`, and `MoveStart`, and [`write_range_base`]
//! (table + range only) used by the remaining variants. `SplitStart` additionally appends a
//! second [`RangeSpec`] for `split_off`.

use bijective_enum_map::injective_enum_map;

use crate::codec::{Cursor, EncodeBuf, ShortBuffer};
use crate::error::MetalogError;


/// Sentinel `end_row` denoting the final range of a table: compares greater than any legal row
/// key under the byte-lexicographic ordering the folder uses.
pub const END_ROW_MARKER: &[u8] = &[0xff; 20];

/// Identifies a logical table across schema evolutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableIdentifier {
    pub id:         u32,
    pub generation: u32,
}

/// A contiguous row-key interval. `end_row` is inclusive, `start_row` is exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeSpec {
    pub start_row: Vec<u8>,
    pub end_row:   Vec<u8>,
}

impl RangeSpec {
    #[must_use]
    pub fn is_end_of_table(&self) -> bool {
        self.end_row == END_ROW_MARKER
    }
}

/// Per-range scratch state; `soft_limit` is the size threshold after which a split is scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeState {
    pub soft_limit:   u64,
    /// Path of an in-progress transfer log, present only mid-move. Opaque to the folder.
    pub transfer_log: Option<Vec<u8>>,
}

/// A single range-lifecycle transaction, as folded from (or written to) a metalog.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaLogEntry {
    RangeLoaded {
        table:     TableIdentifier,
        range:     RangeSpec,
        state:     RangeState,
        timestamp: u64,
    },
    SplitStart {
        table:     TableIdentifier,
        range:     RangeSpec,
        split_off: RangeSpec,
        state:     RangeState,
        timestamp: u64,
    },
    SplitShrunk {
        table:     TableIdentifier,
        range:     RangeSpec,
        timestamp: u64,
    },
    SplitDone {
        table:     TableIdentifier,
        range:     RangeSpec,
        timestamp: u64,
    },
    MoveStart {
        table:     TableIdentifier,
        range:     RangeSpec,
        state:     RangeState,
        timestamp: u64,
    },
    MovePrepared {
        table:     TableIdentifier,
        range:     RangeSpec,
        timestamp: u64,
    },
    MoveDone {
        table:     TableIdentifier,
        range:     RangeSpec,
        timestamp: u64,
    },
}

impl MetaLogEntry {
    #[must_use]
    pub fn tag(&self) -> MetaLogEntryTag {
        match self {
            Self::RangeLoaded { .. }  => MetaLogEntryTag::RangeLoaded,
            Self::SplitStart { .. }   => MetaLogEntryTag::SplitStart,
            Self::SplitShrunk { .. }  => MetaLogEntryTag::SplitShrunk,
            Self::SplitDone { .. }    => MetaLogEntryTag::SplitDone,
            Self::MoveStart { .. }    => MetaLogEntryTag::MoveStart,
            Self::MovePrepared { .. } => MetaLogEntryTag::MovePrepared,
            Self::MoveDone { .. }     => MetaLogEntryTag::MoveDone,
        }
    }

    #[must_use]
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::RangeLoaded { timestamp, .. }
            | Self::SplitStart { timestamp, .. }
            | Self::SplitShrunk { timestamp, .. }
            | Self::SplitDone { timestamp, .. }
            | Self::MoveStart { timestamp, .. }
            | Self::MovePrepared { timestamp, .. }
            | Self::MoveDone { timestamp, .. } => *timestamp,
        }
    }

    #[must_use]
    pub fn table(&self) -> TableIdentifier {
        match self {
            Self::RangeLoaded { table, .. }
            | Self::SplitStart { table, .. }
            | Self::SplitShrunk { table, .. }
            | Self::SplitDone { table, .. }
            | Self::MoveStart { table, .. }
            | Self::MovePrepared { table, .. }
            | Self::MoveDone { table, .. } => *table,
        }
    }

    #[must_use]
    pub fn range(&self) -> &RangeSpec {
        match self {
            Self::RangeLoaded { range, .. }
            | Self::SplitStart { range, .. }
            | Self::SplitShrunk { range, .. }
            | Self::SplitDone { range, .. }
            | Self::MoveStart { range, .. }
            | Self::MovePrepared { range, .. }
            | Self::MoveDone { range, .. } => range,
        }
    }

    /// Appends this entry's payload (everything after the frame header's `timestamp`) to `buf`.
    pub fn write_payload(&self, buf: &mut EncodeBuf) {
        match self {
            Self::RangeLoaded { table, range, state, .. }
            | Self::MoveStart { table, range, state, .. } => {
                write_range_common(buf, *table, range, state);
            }
            Self::SplitStart { table, range, split_off, state, .. } => {
                write_range_common(buf, *table, range, state);
                write_range_spec(buf, split_off);
            }
            Self::SplitShrunk { table, range, .. }
            | Self::SplitDone { table, range, .. }
            | Self::MovePrepared { table, range, .. }
            | Self::MoveDone { table, range, .. } => {
                write_range_base(buf, *table, range);
            }
        }
    }

    /// Decodes a payload for the given tag and timestamp.
    ///
    /// # Errors
    /// Returns [`MetalogError::EntryBadPayload`] if `payload` does not hold a complete, validly
    /// framed instance of the variant named by `tag`.
    pub fn decode_payload(
        tag:       MetaLogEntryTag,
        timestamp: u64,
        payload:   &[u8],
    ) -> Result<Self, MetalogError> {
        let mut cursor = Cursor::new(payload);

        let entry = match tag {
            MetaLogEntryTag::RangeLoaded => {
                let (table, range, state) = read_range_common(&mut cursor)
                    .map_err(|source| bad_payload("decoding range loaded", source))?;
                Self::RangeLoaded { table, range, state, timestamp }
            }
            MetaLogEntryTag::SplitStart => {
                let (table, range, state) = read_range_common(&mut cursor)
                    .map_err(|source| bad_payload("decoding split start", source))?;
                let split_off = read_range_spec(&mut cursor)
                    .map_err(|source| bad_payload("decoding split start", source))?;
                Self::SplitStart { table, range, split_off, state, timestamp }
            }
            MetaLogEntryTag::SplitShrunk => {
                let (table, range) = read_range_base(&mut cursor)
                    .map_err(|source| bad_payload("decoding split shrunk", source))?;
                Self::SplitShrunk { table, range, timestamp }
            }
            MetaLogEntryTag::SplitDone => {
                let (table, range) = read_range_base(&mut cursor)
                    .map_err(|source| bad_payload("decoding split done", source))?;
                Self::SplitDone { table, range, timestamp }
            }
            MetaLogEntryTag::MoveStart => {
                let (table, range, state) = read_range_common(&mut cursor)
                    .map_err(|source| bad_payload("decoding move start", source))?;
                Self::MoveStart { table, range, state, timestamp }
            }
            MetaLogEntryTag::MovePrepared => {
                let (table, range) = read_range_base(&mut cursor)
                    .map_err(|source| bad_payload("decoding move prepared", source))?;
                Self::MovePrepared { table, range, timestamp }
            }
            MetaLogEntryTag::MoveDone => {
                let (table, range) = read_range_base(&mut cursor)
                    .map_err(|source| bad_payload("decoding move done", source))?;
                Self::MoveDone { table, range, timestamp }
            }
        };

        Ok(entry)
    }
}

fn bad_payload(phase: &'static str, source: ShortBuffer) -> MetalogError {
    MetalogError::EntryBadPayload { phase, source }
}

/// The closed, centrally-defined set of wire tags for [`MetaLogEntry`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaLogEntryTag {
    RangeLoaded,
    SplitStart,
    SplitShrunk,
    SplitDone,
    MoveStart,
    MovePrepared,
    MoveDone,
}

injective_enum_map! {
    MetaLogEntryTag, u16,
    RangeLoaded  <=> 1,
    SplitStart   <=> 2,
    SplitShrunk  <=> 3,
    SplitDone    <=> 4,
    MoveStart    <=> 5,
    MovePrepared <=> 6,
    MoveDone     <=> 7,
}

fn write_table_identifier(buf: &mut EncodeBuf, table: TableIdentifier) {
    buf.write_u32(table.id);
    buf.write_u32(table.generation);
}

fn read_table_identifier(cursor: &mut Cursor<'_>) -> Result<TableIdentifier, ShortBuffer> {
    let id = cursor.read_u32()?;
    let generation = cursor.read_u32()?;
    Ok(TableIdentifier { id, generation })
}

fn write_range_spec(buf: &mut EncodeBuf, range: &RangeSpec) {
    buf.write_str(&range.start_row);
    buf.write_str(&range.end_row);
}

fn read_range_spec(cursor: &mut Cursor<'_>) -> Result<RangeSpec, ShortBuffer> {
    let start_row = cursor.read_str()?.to_vec();
    let end_row = cursor.read_str()?.to_vec();
    Ok(RangeSpec { start_row, end_row })
}

fn write_range_state(buf: &mut EncodeBuf, state: &RangeState) {
    buf.write_u64(state.soft_limit);
    match &state.transfer_log {
        Some(log) => {
            buf.write_u8(1);
            buf.write_str(log);
        }
        None => buf.write_u8(0),
    }
}

fn read_range_state(cursor: &mut Cursor<'_>) -> Result<RangeState, ShortBuffer> {
    let soft_limit = cursor.read_u64()?;
    let transfer_log = match cursor.read_u8()? {
        0 => None,
        _ => Some(cursor.read_str()?.to_vec()),
    };
    Ok(RangeState { soft_limit, transfer_log })
}

fn write_range_base(buf: &mut EncodeBuf, table: TableIdentifier, range: &RangeSpec) {
    write_table_identifier(buf, table);
    write_range_spec(buf, range);
}

fn read_range_base(
    cursor: &mut Cursor<'_>,
) -> Result<(TableIdentifier, RangeSpec), ShortBuffer> {
    let table = read_table_identifier(cursor)?;
    let range = read_range_spec(cursor)?;
    Ok((table, range))
}

fn write_range_common(buf: &mut EncodeBuf, table: TableIdentifier, range: &RangeSpec, state: &RangeState) {
    write_range_base(buf, table, range);
    write_range_state(buf, state);
}

fn read_range_common(
    cursor: &mut Cursor<'_>,
) -> Result<(TableIdentifier, RangeSpec, RangeState), ShortBuffer> {
    let (table, range) = read_range_base(cursor)?;
    let state = read_range_state(cursor)?;
    Ok((table, range, state))
}


#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> TableIdentifier {
        TableIdentifier { id: 1, generation: 0 }
    }

    fn sample_range(end_row: &[u8]) -> RangeSpec {
        RangeSpec { start_row: b"a".to_vec(), end_row: end_row.to_vec() }
    }

    fn sample_state(soft_limit: u64) -> RangeState {
        RangeState { soft_limit, transfer_log: None }
    }

    #[test]
    fn round_trips_every_variant() {
        let entries = vec![
            MetaLogEntry::RangeLoaded {
                table: sample_table(), range: sample_range(b"m"),
                state: sample_state(64 << 20), timestamp: 100,
            },
            MetaLogEntry::SplitStart {
                table: sample_table(), range: sample_range(b"m"),
                split_off: sample_range(b"g"), state: sample_state(64 << 20), timestamp: 101,
            },
            MetaLogEntry::SplitShrunk {
                table: sample_table(), range: sample_range(b"g"), timestamp: 102,
            },
            MetaLogEntry::SplitDone {
                table: sample_table(), range: sample_range(b"g"), timestamp: 103,
            },
            MetaLogEntry::MoveStart {
                table: sample_table(), range: sample_range(b"z"),
                state: sample_state(32 << 20), timestamp: 104,
            },
            MetaLogEntry::MovePrepared {
                table: sample_table(), range: sample_range(b"z"), timestamp: 105,
            },
            MetaLogEntry::MoveDone {
                table: sample_table(), range: sample_range(b"z"), timestamp: 106,
            },
        ];

        for entry in entries {
            let mut buf = EncodeBuf::new();
            entry.write_payload(&mut buf);
            let bytes = buf.into_inner();
            let decoded = MetaLogEntry::decode_payload(entry.tag(), entry.timestamp(), &bytes)
                .expect("round trip decode");
            assert_eq!(decoded, entry);
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert!(MetaLogEntryTag::try_from(0_u16).is_err());
        assert!(MetaLogEntryTag::try_from(8_u16).is_err());
        assert_eq!(MetaLogEntryTag::try_from(1_u16).unwrap(), MetaLogEntryTag::RangeLoaded);
    }

    #[test]
    fn truncated_payload_is_bad_payload() {
        let mut buf = EncodeBuf::new();
        write_table_identifier(&mut buf, sample_table());
        // Missing the RangeSpec and RangeState that RangeLoaded requires.
        let bytes = buf.into_inner();
        let err = MetaLogEntry::decode_payload(MetaLogEntryTag::RangeLoaded, 0, &bytes)
            .unwrap_err();
        assert!(matches!(err, MetalogError::EntryBadPayload { .. }));
    }
}
