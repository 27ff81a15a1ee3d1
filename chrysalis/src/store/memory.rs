//! In-memory implementations of the capability interfaces.
//!
//! These back the test suite and any embedded single-process use. They
//! honor the same contracts as the durable backends: FIFO pops with a real
//! blocking wait, gapless version allocation, atomic batch inserts and
//! insertion-ordered dead letters.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;

use crate::error::Result;
use crate::registry::{NewVersion, SchemaRecord, SchemaRegistry};
use crate::store::{DeadLetterSink, DlqEntry, DocumentStore, JobQueue};

/// A panicking writer cannot leave these stores half-updated (every
/// critical section is a single push or pop), so a poisoned lock is safe to
/// enter anyway.
fn relock<'a, T>(
    result: std::result::Result<MutexGuard<'a, T>, PoisonError<MutexGuard<'a, T>>>,
) -> MutexGuard<'a, T> {
    result.unwrap_or_else(PoisonError::into_inner)
}

//
// Queue
//

/// A FIFO queue over a [VecDeque]: producers push the head, workers pop the
/// tail, a [Condvar] wakes blocked pops the moment a payload arrives.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    payloads: Mutex<VecDeque<Vec<u8>>>,
    arrival: Condvar,
}

impl MemoryQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of payloads currently waiting.
    pub fn len(&self) -> usize {
        relock(self.payloads.lock()).len()
    }

    /// `true` when nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl JobQueue for MemoryQueue {
    fn push(&self, payload: &[u8]) -> Result<()> {
        relock(self.payloads.lock()).push_front(payload.to_vec());
        self.arrival.notify_one();
        Ok(())
    }

    fn pop_blocking(&self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let deadline = Instant::now() + timeout;
        let mut payloads = relock(self.payloads.lock());
        loop {
            if let Some(payload) = payloads.pop_back() {
                return Ok(Some(payload));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let (guard, _timeout) = self
                .arrival
                .wait_timeout(payloads, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            payloads = guard;
        }
    }
}

//
// Registry
//

/// Append-only in-memory registry. Versions are allocated under the lock,
/// so they are trivially gapless and unique.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    records: Mutex<Vec<SchemaRecord>>,
}

impl MemoryRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record, oldest first.
    pub fn records(&self) -> Vec<SchemaRecord> {
        relock(self.records.lock()).clone()
    }
}

impl SchemaRegistry for MemoryRegistry {
    fn get_latest(&self) -> Result<Option<SchemaRecord>> {
        Ok(relock(self.records.lock()).last().cloned())
    }

    fn get(&self, version: i64) -> Result<Option<SchemaRecord>> {
        Ok(relock(self.records.lock())
            .iter()
            .find(|record| record.version == version)
            .cloned())
    }

    fn create_new_version(&self, new: NewVersion<'_>) -> Result<SchemaRecord> {
        let mut records = relock(self.records.lock());
        let version = records.last().map_or(1, |record| record.version + 1);
        let record = new.to_record(version);
        records.push(record.clone());
        Ok(record)
    }

    fn mark_promoted(&self, version: i64) -> Result<SchemaRecord> {
        let mut records = relock(self.records.lock());
        let record = records
            .iter_mut()
            .find(|record| record.version == version)
            .ok_or(crate::Error::SchemaNotFound(version))?;
        record.pending_promotion = true;
        record.promoted_at = Some(Utc::now().to_rfc3339());
        Ok(record.clone())
    }
}

//
// Document store
//

/// Accepted documents, in insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<Vec<Value>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every inserted document, oldest first.
    pub fn documents(&self) -> Vec<Value> {
        relock(self.documents.lock()).clone()
    }
}

impl DocumentStore for MemoryStore {
    fn insert_many(&self, documents: &[Value]) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        relock(self.documents.lock()).extend_from_slice(documents);
        Ok(documents.len())
    }
}

//
// Dead-letter sink
//

/// Dead letters, in insertion order.
#[derive(Debug, Default)]
pub struct MemoryDlq {
    entries: Mutex<Vec<DlqEntry>>,
}

impl MemoryDlq {
    /// An empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry, oldest first.
    pub fn entries(&self) -> Vec<DlqEntry> {
        relock(self.entries.lock()).clone()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        relock(self.entries.lock()).len()
    }

    /// `true` when nothing has been deflected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DeadLetterSink for MemoryDlq {
    fn send(&self, payload: Value, reason: &str) -> Result<()> {
        relock(self.entries.lock()).push(DlqEntry {
            payload,
            reason: reason.to_owned(),
            timestamp: Utc::now().to_rfc3339(),
        });
        Ok(())
    }
}
