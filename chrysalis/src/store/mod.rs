//! The narrow capability interfaces the coordinator is written against,
//! plus the bundled implementations.
//!
//! Three seams: a blocking-pop queue, a batch document store, and an
//! append-only dead-letter sink. (The fourth external collaborator, the
//! schema registry, lives in [crate::registry].) The coordinator only ever
//! sees these traits, so tests run it against the in-memory fakes and
//! deployments point it at the SQLite backend, or at anything else that can
//! pop, insert and append.

mod memory;
mod sqlite;

pub use memory::{MemoryDlq, MemoryQueue, MemoryRegistry, MemoryStore};
pub use sqlite::{SqliteDlq, SqliteQueue, SqliteRegistry, SqliteStore, init};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// FIFO byte-payload queue: producers push, workers blocking-pop.
pub trait JobQueue {
    /// Enqueue one payload.
    fn push(&self, payload: &[u8]) -> Result<()>;

    /// Pop the oldest payload, waiting up to `timeout` on an empty queue.
    /// `Ok(None)` means the wait timed out; exactly one caller receives any
    /// given payload.
    fn pop_blocking(&self, timeout: Duration) -> Result<Option<Vec<u8>>>;
}

/// Durable document collection with atomic batch insert.
pub trait DocumentStore {
    /// Insert a batch atomically and return how many documents landed.
    /// An empty batch returns 0 without side effects.
    fn insert_many(&self, documents: &[Value]) -> Result<usize>;
}

/// One dead-lettered item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlqEntry {
    /// The offending payload, preserved for inspection and replay.
    pub payload: Value,
    /// Machine-readable reason token. Never empty.
    pub reason: String,
    /// When the deflection happened (ISO-8601 UTC).
    pub timestamp: String,
}

/// Append-only sink for rejected payloads, readable in insertion order.
pub trait DeadLetterSink {
    /// Append a payload with its reason; the sink stamps the timestamp.
    fn send(&self, payload: Value, reason: &str) -> Result<()>;
}
