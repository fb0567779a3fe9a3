//! Ingestion transports
//!
//! All three feed `RetrievalEngine::ingest`; none of them bypasses the
//! engine's transaction.
//!
//! - batch: one-shot directory load
//! - stream: bounded channel + worker task
//! - inbox: polled directory of JSON drop files

mod batch;
mod inbox;
mod stream;

pub use batch::{load_from_directory, LoadReport};
pub use inbox::{InboxScan, InboxWatcher};
pub use stream::{IncomingDocument, StreamIngestor, StreamStats};
