//! Master-side garbage collection for Hypertable CellStore files.
//!
//! Each range server records the CellStore files it currently references in its `Files` METADATA
//! column. Splits, compactions, and range moves leave stale files behind without ever deleting
//! them outright; only the GC, working from a table-wide METADATA scan, has enough information
//! to tell a truly orphaned file from one still referenced by some other range.
//!
//! [`scanner::scan_metadata`] performs that scan, building a [`scanner::CountMap`] of live
//! references and tombstoning METADATA rows left with none; [`reaper::reap`] turns a zero count
//! into an actual filesystem removal; [`scheduler::GcScheduler`] runs the two together on a
//! timer.

pub mod error;
pub mod properties;
pub mod reaper;
pub mod scanner;
pub mod scheduler;
pub mod stopper;
pub mod table;

pub use error::GcError;
pub use properties::{GcConfig, MapPropertySource, PropertySource};
pub use reaper::{reap, ReapStats};
pub use scanner::{scan_metadata, CountMap};
pub use scheduler::GcScheduler;
pub use stopper::Stopper;
pub use table::{
    CellKey, FailedMutation, MetadataCell, MetadataMutator, MetadataScanner, MetadataTable,
    ScanSpec, FILES_COLUMN_FAMILY,
};
