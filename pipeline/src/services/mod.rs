//! Stage implementations.
//!
//! Each stage reads the artifact written by the previous one, so any stage can
//! be run on its own against an existing artifact tree.

pub mod acquisition;
pub mod catalog;
pub mod detection;
pub mod preprocessing;
pub mod publishing;
pub mod run_tracker;

pub use acquisition::{LightCurveDownload, LightCurveProvider, SeriesAcquirer};
pub use catalog::{CatalogClient, CatalogQuery, IdentifierCatalog};
pub use detection::{DetectionStage, SampleGate, DEFAULT_MIN_SAMPLES};
pub use preprocessing::{preprocess, SeriesPreprocessor};
pub use publishing::{ObjectSink, PublishOutcome, ResultPublisher, SinkStatus};
pub use run_tracker::{ItemRecord, ItemState, LogEntry, LogLevel, RunTracker};
