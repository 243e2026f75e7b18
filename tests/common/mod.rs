#![allow(dead_code)]

mod backend;
mod fixtures;
pub use backend::*;
pub use fixtures::*;

// Re-export commonly used types from qrpark for tests
pub use qrpark::models::{DecodedCode, Detection, Frame, Point, SnapshotEntry, StableSnapshot};
pub use qrpark::reporter::{Publisher, Report, ReportError};
pub use qrpark::tracker::PersistenceTracker;
pub use qrpark::zones::{Zone, ZoneTable};
