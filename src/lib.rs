pub mod capture;
pub mod config;
pub mod detection;
pub mod models;
pub mod pipeline;
pub mod queue;
pub mod render;
pub mod reporter;
pub mod telemetry;
pub mod tracker;
pub mod zones;

pub use detection::{CodeDetector, Preprocessor};
pub use models::{DecodedCode, Detection, Frame, Point, SnapshotEntry, StableSnapshot};
pub use pipeline::{Phase, Pipeline, PipelineState, StateReader, Worker, WorkerMessage};
pub use reporter::{HttpReporter, LogPublisher, Publisher, Report};
pub use tracker::PersistenceTracker;
pub use zones::{Zone, ZoneTable};
