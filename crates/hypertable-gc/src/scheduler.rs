//! Component G: the periodic loop that ties a METADATA scan, its reap pass, and the
//! interruptible sleep between cycles together.

use std::fmt::{Debug, Formatter, Result as FmtResult};

use hypertable_vfs::WritableFilesystem;

use crate::error::GcError;
use crate::properties::GcConfig;
use crate::reaper::{self, ReapStats};
use crate::scanner::{self, CountMap};
use crate::stopper::Stopper;
use crate::table::{MetadataTable, ScanSpec};

/// Drives one GC cycle (scan + reap) and the sleep/repeat loop around it.
///
/// The METADATA table handle is set lazily: a master may run this scheduler before it has
/// finished acquiring its METADATA handle, in which case a cycle is a harmless no-op that logs
/// and waits for the next tick rather than erroring.
pub struct GcScheduler<T, FS> {
    table:   Option<T>,
    fs:      FS,
    config:  GcConfig,
    stopper: Stopper,
}

// T (the METADATA table handle) isn't required to be Debug by MetadataTable, so this can't be
// derived.
impl<T, FS: Debug> Debug for GcScheduler<T, FS> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("GcScheduler")
            .field("table_set", &self.table.is_some())
            .field("fs", &self.fs)
            .field("config", &self.config)
            .field("stopper", &self.stopper)
            .finish()
    }
}

impl<T: MetadataTable, FS: WritableFilesystem> GcScheduler<T, FS> {
    #[must_use]
    pub fn new(fs: FS, config: GcConfig) -> Self {
        Self { table: None, fs, config, stopper: Stopper::new() }
    }

    /// A handle that can call [`Stopper::request_stop`] to break [`GcScheduler::run_blocking`]
    /// out of its sleep and return.
    #[must_use]
    pub fn stopper(&self) -> Stopper {
        self.stopper.clone()
    }

    pub fn set_table(&mut self, table: T) {
        self.table = Some(table);
    }

    /// Runs a single GC cycle: scan METADATA, flush the resulting deletes, and reap any file or
    /// directory left with no live references. Returns `Ok(None)` without touching the
    /// filesystem if no METADATA table handle has been set yet.
    ///
    /// # Errors
    /// Returns [`GcError`] only when the METADATA mutator's flush itself could not be issued;
    /// per-cell and per-file failures are logged and do not abort the cycle.
    pub fn run_once(&mut self) -> Result<Option<ReapStats>, GcError> {
        let Some(table) = self.table.as_ref() else {
            tracing::info!("METADATA not ready; skipping GC cycle");
            return Ok(None);
        };
        run_cycle(table, &self.fs, self.config.dryrun).map(Some)
    }

    /// Runs cycles until [`Stopper::request_stop`] is called on a handle returned by
    /// [`GcScheduler::stopper`], sleeping [`GcConfig::interval`] between them.
    pub fn run_blocking(&mut self) {
        loop {
            if let Err(err) = self.run_once() {
                tracing::error!(error = %err, "GC cycle failed");
            }
            if self.stopper.wait_or_stopped(self.config.interval) {
                break;
            }
        }
    }
}

fn run_cycle<T: MetadataTable>(
    table: &T,
    fs: &impl WritableFilesystem,
    dryrun: bool,
) -> Result<ReapStats, GcError> {
    let mut scan = table.create_scanner(ScanSpec::metadata_files());
    let mut mutator = table.create_mutator();
    let mut files_map = CountMap::new();

    scanner::scan_metadata(&mut scan, &mut mutator, &mut files_map);

    if let Err(err) = mutator.flush() {
        tracing::error!(error = %err, "failed to flush METADATA mutator at end of GC cycle");
    }
    for failed in mutator.get_failed() {
        tracing::warn!(row = %failed.key.row, message = %failed.message, "METADATA delete failed");
    }

    Ok(reaper::reap(&files_map, fs, dryrun))
}


#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::path::Path;
    use std::rc::Rc;
    use std::time::Duration;

    use hypertable_vfs::memory::MemoryFilesystem;

    use super::*;
    use crate::table::{CellKey, FailedMutation, MetadataCell, MetadataMutator, MetadataScanner};

    #[derive(Default)]
    struct FakeTable {
        cells: Rc<RefCell<Vec<MetadataCell>>>,
        deletes: Rc<RefCell<Vec<CellKey>>>,
    }

    struct FakeScanner(std::collections::VecDeque<MetadataCell>);
    impl MetadataScanner for FakeScanner {
        fn next_cell(&mut self) -> Option<MetadataCell> {
            self.0.pop_front()
        }
    }

    struct FakeMutator(Rc<RefCell<Vec<CellKey>>>);
    impl MetadataMutator for FakeMutator {
        fn set_delete(&mut self, _timestamp: u64, key: &CellKey) {
            self.0.borrow_mut().push(key.clone());
        }
        fn flush(&mut self) -> Result<(), GcError> {
            Ok(())
        }
        fn get_failed(&mut self) -> Vec<FailedMutation> {
            Vec::new()
        }
        fn retry(&mut self, _timeout: Duration) -> Result<(), GcError> {
            Ok(())
        }
    }

    impl MetadataTable for FakeTable {
        type Scanner = FakeScanner;
        type Mutator = FakeMutator;

        fn create_scanner(&self, _spec: ScanSpec) -> Self::Scanner {
            FakeScanner(self.cells.borrow().clone().into())
        }
        fn create_mutator(&self) -> Self::Mutator {
            FakeMutator(Rc::clone(&self.deletes))
        }
    }

    #[test]
    fn run_once_without_a_table_is_a_harmless_noop() {
        let fs = MemoryFilesystem::new();
        let config = GcConfig { interval: Duration::from_secs(300), dryrun: false };
        let mut scheduler: GcScheduler<FakeTable, _> = GcScheduler::new(fs, config);
        assert_eq!(scheduler.run_once().unwrap(), None);
    }

    #[test]
    fn run_once_scans_and_reaps_orphaned_files() {
        let fs = MemoryFilesystem::new();
        fs.write_file(Path::new("tables/t1/orphan"), b"data");

        let table = FakeTable {
            cells: Rc::new(RefCell::new(vec![MetadataCell {
                row:               "t1:row1".to_string(),
                column_family:     "Files".to_string(),
                column_qualifier:  "default".to_string(),
                timestamp:         1,
                value:             b"!".to_vec(),
            }])),
            deletes: Rc::new(RefCell::new(Vec::new())),
        };
        let deletes = Rc::clone(&table.deletes);

        let config = GcConfig { interval: Duration::from_secs(300), dryrun: false };
        let mut scheduler = GcScheduler::new(fs, config);
        scheduler.set_table(table);

        let stats = scheduler.run_once().unwrap().expect("table was set");
        assert_eq!(stats.nf, 0);
        assert_eq!(deletes.borrow().len(), 1);
    }

    #[test]
    fn run_blocking_stops_promptly_on_request() {
        let fs = MemoryFilesystem::new();
        let config = GcConfig { interval: Duration::from_secs(30), dryrun: false };
        let mut scheduler: GcScheduler<FakeTable, _> = GcScheduler::new(fs, config);
        let stopper = scheduler.stopper();

        let handle = std::thread::spawn(move || scheduler.run_blocking());
        std::thread::sleep(Duration::from_millis(10));
        let start = std::time::Instant::now();
        stopper.request_stop();
        handle.join().expect("scheduler thread panicked");
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
