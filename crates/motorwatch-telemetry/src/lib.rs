//! Motorwatch Telemetry
//!
//! The data side of the monitor: a third-party IoT channel is polled for
//! motor readings, entries are mapped positionally onto typed readings and
//! new ones are appended to a single SQLite table.
//!
//! Key features:
//! - Feed model for the channel JSON (`feeds[].field1..field8`)
//! - Positional mapping: temperature, voltage, current, x/y/z, status
//! - Append-only reading store with newest-N queries
//! - One-shot and periodic ingestion

pub mod error;
pub mod feed;
pub mod ingest;
pub mod reading;
pub mod store;

pub use error::{TelemetryError, TelemetryResult};
pub use feed::{Feed, FeedEntry};
pub use ingest::{apply_feed, FeedClient, IngestReport, Ingestor};
pub use reading::{MotorReading, NewReading};
pub use store::ReadingStore;
