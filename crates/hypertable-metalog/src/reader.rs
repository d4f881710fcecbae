//! Component C: a restartable reader over a range-server metalog (RSML) file.
//!
//! A metalog is framed as a fixed `RSML` header followed by any number of records:
//! `{ type: u16, timestamp: u64, payload_len: u32, payload: bytes }`, all little-endian. The
//! reader validates the header once at construction, then exposes [`MetalogReader::read`] as a
//! simple "next entry or none" scan. There is no resynchronization after a malformed record: a
//! partial write at the tail of the file means the producer crashed before `fsync`, and the
//! recovery policy is to stop, not guess.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;

use hypertable_vfs::ReadableFilesystem;

use crate::codec::ShortBuffer;
use crate::entry::{MetaLogEntry, MetaLogEntryTag};
use crate::error::MetalogError;
use crate::folder::{RangeStateFolder, RangeStateInfo};


/// The `RSML` ASCII prefix every metalog file begins with.
pub const RSML_MAGIC: &[u8; 4] = b"RSML";

/// The metalog format version this reader understands. A file whose header carries any other
/// version is rejected with [`MetalogError::VersionMismatch`]; there is no forward-compatible
/// decoding path.
pub const RSML_VERSION: u16 = 1;

/// Size in bytes of the fixed header: the 4-byte `RSML` prefix plus a `u16` version field.
pub const RSML_HEADER_SIZE: usize = 4 + size_of::<u16>();

/// Size in bytes of a record's fixed frame, excluding the payload: `u16` type, `u64` timestamp,
/// `u32` payload length.
const FRAME_HEADER_SIZE: usize = size_of::<u16>() + size_of::<u64>() + size_of::<u32>();


/// A reader over a single metalog file, tracking how many bytes have been consumed.
///
/// Construction opens the file and validates its header; [`MetalogReader::read`] then yields
/// framed entries one at a time until EOF. [`MetalogReader::load_range_states`] drives a full
/// scan through [`RangeStateFolder`] and caches the folded result, rewinding (by reopening the
/// file, since buffered reads here do not support seeking back) to force a fresh replay.
pub struct MetalogReader<FS: ReadableFilesystem> {
    fs:            FS,
    path:          PathBuf,
    file:          BufReader<FS::ReadFile>,
    pos:           u64,
    cached_states: Option<Vec<RangeStateInfo>>,
}

impl<FS: ReadableFilesystem> Debug for MetalogReader<FS> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("MetalogReader")
            .field("path", &self.path)
            .field("pos", &self.pos)
            .field("cached_states", &self.cached_states.as_ref().map(Vec::len))
            .finish()
    }
}

impl<FS: ReadableFilesystem> MetalogReader<FS> {
    /// Opens `path` through `fs` and validates the `RSML` header.
    ///
    /// # Errors
    /// Returns [`ReaderError::Filesystem`] if the file cannot be opened, or
    /// [`ReaderError::Metalog`] wrapping [`MetalogError::BadRsHeader`] /
    /// [`MetalogError::VersionMismatch`] if the header is short, missing the `RSML` prefix, or
    /// names an unsupported version.
    pub fn open(fs: FS, path: impl Into<PathBuf>) -> Result<Self, ReaderError<FS::Error>> {
        let path = path.into();
        let file = open_and_validate_header(&fs, &path)?;
        Ok(Self { fs, path, file, pos: RSML_HEADER_SIZE as u64, cached_states: None })
    }

    /// Path this reader was opened against.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes consumed so far, including the header.
    #[must_use]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Reads the next entry, or `None` at a clean end of file.
    ///
    /// # Errors
    /// Returns [`MetalogError::EntryBadPayload`] if the stream ends partway through a record's
    /// frame or payload, if the payload fails to decode, or [`MetalogError::UnknownEntryType`]
    /// if the record's type tag is not among the closed set `hypertable-metalog` understands.
    /// The reader's position is left at whatever was consumed right before the failing record;
    /// callers must treat any `Err` as fatal to this scan.
    pub fn read(&mut self) -> Result<Option<MetaLogEntry>, MetalogError> {
        let mut head = [0_u8; FRAME_HEADER_SIZE];
        if !fill_or_eof(&mut self.file, &mut head)? {
            return Ok(None);
        }

        #[expect(clippy::indexing_slicing, reason = "head has a fixed, checked length")]
        let tag_raw = u16::from_le_bytes([head[0], head[1]]);
        #[expect(clippy::indexing_slicing, reason = "head has a fixed, checked length")]
        let timestamp = u64::from_le_bytes(head[2..10].try_into().expect("slice has length 8"));
        #[expect(clippy::indexing_slicing, reason = "head has a fixed, checked length")]
        let payload_len = u32::from_le_bytes(head[10..14].try_into().expect("slice has length 4"));
        let payload_len = payload_len as usize;

        let mut payload = vec![0_u8; payload_len];
        if !fill_or_eof(&mut self.file, &mut payload)? {
            return Err(MetalogError::EntryBadPayload {
                phase:  "reading record payload",
                source: ShortBuffer { needed: payload_len, remaining: 0 },
            });
        }

        self.pos += (FRAME_HEADER_SIZE + payload_len) as u64;

        let tag = MetaLogEntryTag::try_from(tag_raw)
            .map_err(|()| MetalogError::UnknownEntryType(tag_raw))?;
        MetaLogEntry::decode_payload(tag, timestamp, &payload).map(Some)
    }

    /// Returns the folded range states, replaying the whole file when `force` is set or no
    /// replay has happened yet. Otherwise returns the cached result of the last replay.
    ///
    /// # Errors
    /// Propagates filesystem errors from reopening the file, and any [`MetalogError`] raised
    /// while scanning or folding, in particular [`MetalogError::EntryBadOrder`], which means
    /// the log is internally inconsistent and cannot be trusted to resume from.
    pub fn load_range_states(
        &mut self,
        force: bool,
    ) -> Result<&[RangeStateInfo], ReaderError<FS::Error>> {
        if force || self.cached_states.is_none() {
            self.rewind()?;

            let mut folder = RangeStateFolder::new();
            loop {
                let offset = self.pos;
                match self.read()? {
                    Some(entry) => folder.apply(entry, offset)?,
                    None => break,
                }
            }
            self.cached_states = Some(folder.into_sorted_vec());
        }

        Ok(self.cached_states.as_deref().expect("just populated"))
    }

    fn rewind(&mut self) -> Result<(), ReaderError<FS::Error>> {
        self.file = open_and_validate_header(&self.fs, &self.path)?;
        self.pos = RSML_HEADER_SIZE as u64;
        Ok(())
    }
}

fn open_and_validate_header<FS: ReadableFilesystem>(
    fs:   &FS,
    path: &Path,
) -> Result<BufReader<FS::ReadFile>, ReaderError<FS::Error>> {
    let file = fs.open_sequential(path).map_err(ReaderError::Filesystem)?;
    let mut file = BufReader::new(file);

    let mut header = [0_u8; RSML_HEADER_SIZE];
    let complete = fill_or_eof(&mut file, &mut header).map_err(ReaderError::Metalog)?;
    #[expect(clippy::indexing_slicing, reason = "header has a fixed, checked length")]
    let magic_ok = complete && &header[..4] == RSML_MAGIC;
    if !magic_ok {
        return Err(ReaderError::Metalog(MetalogError::BadRsHeader));
    }

    #[expect(clippy::indexing_slicing, reason = "header has a fixed, checked length")]
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != RSML_VERSION {
        return Err(ReaderError::Metalog(MetalogError::VersionMismatch {
            expected: RSML_VERSION,
            found:    version,
        }));
    }

    Ok(file)
}

/// Fills `buf` completely, returning `Ok(true)`. Returns `Ok(false)` if zero bytes were available
/// before the first read (a clean EOF). Any other short read, where the stream ended partway
/// through `buf`, is reported as [`MetalogError::EntryBadPayload`], since a partially-written
/// frame is not something the reader can resynchronize past.
fn fill_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool, MetalogError> {
    if buf.is_empty() {
        return Ok(true);
    }

    let mut filled = 0;
    while filled < buf.len() {
        #[expect(clippy::indexing_slicing, reason = "filled <= buf.len() by the loop condition")]
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(MetalogError::Io(e)),
        }
    }

    if filled == 0 {
        Ok(false)
    } else if filled == buf.len() {
        Ok(true)
    } else {
        Err(MetalogError::EntryBadPayload {
            phase:  "reading record frame header",
            source: ShortBuffer { needed: buf.len(), remaining: filled },
        })
    }
}

/// Encodes a full record frame (`type | timestamp | payload_len | payload`) for `entry`.
///
/// Not used by production code (metalog append happens on the range server, out of scope here),
/// but every test fixture in this crate builds its metalog bytes through this function, and it's
/// the natural counterpart to [`MetalogReader::read`] for anyone standing up a writer later.
#[must_use]
pub fn encode_record(entry: &MetaLogEntry) -> Vec<u8> {
    use crate::codec::EncodeBuf;

    let mut payload = EncodeBuf::new();
    entry.write_payload(&mut payload);
    let payload = payload.into_inner();

    let mut record = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    record.extend_from_slice(&u16::from(entry.tag()).to_le_bytes());
    record.extend_from_slice(&entry.timestamp().to_le_bytes());
    record.extend_from_slice(&u32::try_from(payload.len())
        .expect("a single metalog record's payload fits in a u32")
        .to_le_bytes());
    record.extend_from_slice(&payload);
    record
}

/// Encodes the fixed `RSML` header (magic + version) a metalog file begins with.
#[must_use]
pub fn encode_header() -> [u8; RSML_HEADER_SIZE] {
    let mut header = [0_u8; RSML_HEADER_SIZE];
    #[expect(clippy::indexing_slicing, reason = "header has a fixed, checked length")]
    {
        header[..4].copy_from_slice(RSML_MAGIC);
        header[4..].copy_from_slice(&RSML_VERSION.to_le_bytes());
    }
    header
}

/// Errors that can occur opening, scanning, or folding a metalog through a [`MetalogReader`].
#[derive(Error, Debug)]
pub enum ReaderError<E> {
    #[error(transparent)]
    Metalog(#[from] MetalogError),
    #[error("filesystem error: {0}")]
    Filesystem(E),
}


#[cfg(test)]
mod tests {
    use hypertable_vfs::memory::MemoryFilesystem;

    use super::*;
    use crate::entry::{RangeSpec, RangeState, TableIdentifier};

    fn table() -> TableIdentifier {
        TableIdentifier { id: 1, generation: 0 }
    }

    fn range(end_row: &[u8]) -> RangeSpec {
        RangeSpec { start_row: b"".to_vec(), end_row: end_row.to_vec() }
    }

    fn state(soft_limit: u64) -> RangeState {
        RangeState { soft_limit, transfer_log: None }
    }

    fn write_metalog(fs: &MemoryFilesystem, path: &str, entries: &[MetaLogEntry]) {
        let mut bytes = encode_header().to_vec();
        for entry in entries {
            bytes.extend(encode_record(entry));
        }
        fs.write_file(path, bytes);
    }

    #[test]
    fn empty_file_is_not_an_error() {
        let fs = MemoryFilesystem::new();
        write_metalog(&fs, "/rsml/1", &[]);

        let mut reader = MetalogReader::open(fs, "/rsml/1").unwrap();
        assert!(reader.read().unwrap().is_none());
    }

    #[test]
    fn missing_magic_is_bad_header() {
        let fs = MemoryFilesystem::new();
        fs.write_file("/rsml/1", b"nope!!".to_vec());

        let err = MetalogReader::open(fs, "/rsml/1").unwrap_err();
        assert!(matches!(err, ReaderError::Metalog(MetalogError::BadRsHeader)));
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let fs = MemoryFilesystem::new();
        let mut bytes = RSML_MAGIC.to_vec();
        bytes.extend_from_slice(&99_u16.to_le_bytes());
        fs.write_file("/rsml/1", bytes);

        let err = MetalogReader::open(fs, "/rsml/1").unwrap_err();
        assert!(matches!(
            err,
            ReaderError::Metalog(MetalogError::VersionMismatch { expected: 1, found: 99 }),
        ));
    }

    #[test]
    fn truncated_record_is_bad_payload() {
        let fs = MemoryFilesystem::new();
        let mut bytes = encode_header().to_vec();
        let full_record = encode_record(&MetaLogEntry::RangeLoaded {
            table: table(), range: range(b"m"), state: state(64 << 20), timestamp: 7,
        });
        bytes.extend_from_slice(&full_record[..full_record.len() - 2]);
        fs.write_file("/rsml/1", bytes);

        let mut reader = MetalogReader::open(fs, "/rsml/1").unwrap();
        let err = reader.read().unwrap_err();
        assert!(matches!(err, MetalogError::EntryBadPayload { .. }));
    }

    #[test]
    fn reads_back_entries_with_timestamps_preserved() {
        let fs = MemoryFilesystem::new();
        let entries = vec![
            MetaLogEntry::RangeLoaded {
                table: table(), range: range(b"m"), state: state(64 << 20), timestamp: 100,
            },
            MetaLogEntry::SplitDone { table: table(), range: range(b"m"), timestamp: 101 },
        ];
        write_metalog(&fs, "/rsml/1", &entries);

        let mut reader = MetalogReader::open(fs, "/rsml/1").unwrap();
        let first = reader.read().unwrap().unwrap();
        let second = reader.read().unwrap().unwrap();
        assert!(reader.read().unwrap().is_none());

        assert_eq!(first, entries[0]);
        assert_eq!(second, entries[1]);
    }

    #[test]
    fn load_range_states_rewinds_on_force() {
        let fs = MemoryFilesystem::new();
        write_metalog(&fs, "/rsml/1", &[MetaLogEntry::RangeLoaded {
            table: table(), range: range(b"m"), state: state(64 << 20), timestamp: 1,
        }]);

        let mut reader = MetalogReader::open(fs, "/rsml/1").unwrap();
        let first = reader.load_range_states(false).unwrap().to_vec();
        assert_eq!(first.len(), 1);

        // Without forcing, a second call returns the cached result even though the reader's
        // internal cursor has already reached EOF.
        let cached = reader.load_range_states(false).unwrap();
        assert_eq!(cached.len(), 1);

        let forced = reader.load_range_states(true).unwrap();
        assert_eq!(forced.len(), 1);
    }
}
