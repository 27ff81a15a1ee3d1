//! SQLite-backed implementations of the capability interfaces.
//!
//! One database file carries all four collections. Every component opens
//! its own connection at startup and keeps it for the process lifetime;
//! WAL mode plus a busy timeout make that safe for multiple workers on the
//! same file. Queue pops run in an immediate transaction so one job goes to
//! exactly one worker, and version allocation relies on the `UNIQUE`
//! constraint plus a bounded retry so racing promotions cannot both win the
//! same version.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use rusqlite::{Connection, ErrorCode, OptionalExtension, TransactionBehavior, params};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::registry::{NewVersion, SchemaRecord, SchemaRegistry};
use crate::store::{DeadLetterSink, DlqEntry, DocumentStore, JobQueue};

/// How often a blocking pop re-checks the queue table.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How many times version allocation retries after losing the race on the
/// unique version index.
const VERSION_ALLOC_RETRIES: usize = 5;

/// Create (or migrate) the database at `path`.
///
/// Idempotent: calling it on an existing database is safe.
pub fn init(path: &str) -> Result<()> {
    let conn = open_connection(path)?;
    migrate(&conn)?;
    debug!(path, "database ready");
    Ok(())
}

fn open_connection(path: &str) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;
    Ok(conn)
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Ingest queue: producers append, workers consume oldest-first.
        CREATE TABLE IF NOT EXISTS ingest_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            queue TEXT NOT NULL,
            payload BLOB NOT NULL,
            enqueued_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_ingest_queue_order
            ON ingest_queue (queue, id);

        -- Schema registry: append-only version records. The unique index
        -- is what arbitrates concurrent version allocation.
        CREATE TABLE IF NOT EXISTS schema_registry (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            version INTEGER NOT NULL UNIQUE,
            record TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_schema_registry_version
            ON schema_registry (version DESC);

        -- Accepted documents, already carrying their provenance stamps.
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            body TEXT NOT NULL
        );

        -- Dead letters, readable in insertion order.
        CREATE TABLE IF NOT EXISTS dead_letters (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            queue TEXT NOT NULL,
            entry TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

fn relock<'a, T>(
    result: std::result::Result<MutexGuard<'a, T>, PoisonError<MutexGuard<'a, T>>>,
) -> MutexGuard<'a, T> {
    result.unwrap_or_else(PoisonError::into_inner)
}

fn is_unique_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation
    )
}

//
// Queue
//

/// FIFO queue over the `ingest_queue` table, namespaced by queue name.
#[derive(Debug)]
pub struct SqliteQueue {
    conn: Mutex<Connection>,
    queue: String,
}

impl SqliteQueue {
    /// Open the queue `name` in the database at `path`.
    pub fn open(path: &str, name: &str) -> Result<Self> {
        let conn = open_connection(path)?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            queue: name.to_owned(),
        })
    }

    fn try_pop(&self) -> Result<Option<Vec<u8>>> {
        let mut conn = relock(self.conn.lock());
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let oldest: Option<(i64, Vec<u8>)> = tx
            .query_row(
                "SELECT id, payload FROM ingest_queue
                 WHERE queue = ?1 ORDER BY id LIMIT 1",
                params![self.queue],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((id, payload)) = oldest else {
            return Ok(None);
        };
        tx.execute("DELETE FROM ingest_queue WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(Some(payload))
    }
}

impl JobQueue for SqliteQueue {
    fn push(&self, payload: &[u8]) -> Result<()> {
        relock(self.conn.lock()).execute(
            "INSERT INTO ingest_queue (queue, payload, enqueued_at) VALUES (?1, ?2, ?3)",
            params![self.queue, payload, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn pop_blocking(&self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(payload) = self.try_pop()? {
                return Ok(Some(payload));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

//
// Registry
//

/// Schema registry over the `schema_registry` table.
#[derive(Debug)]
pub struct SqliteRegistry {
    conn: Mutex<Connection>,
}

impl SqliteRegistry {
    /// Open the registry in the database at `path`.
    pub fn open(path: &str) -> Result<Self> {
        let conn = open_connection(path)?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn parse_record(json: String) -> Result<SchemaRecord> {
        Ok(serde_json::from_str(&json)?)
    }
}

impl SchemaRegistry for SqliteRegistry {
    fn get_latest(&self) -> Result<Option<SchemaRecord>> {
        let json: Option<String> = relock(self.conn.lock())
            .query_row(
                "SELECT record FROM schema_registry ORDER BY version DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        json.map(Self::parse_record).transpose()
    }

    fn get(&self, version: i64) -> Result<Option<SchemaRecord>> {
        let json: Option<String> = relock(self.conn.lock())
            .query_row(
                "SELECT record FROM schema_registry WHERE version = ?1",
                params![version],
                |row| row.get(0),
            )
            .optional()?;
        json.map(Self::parse_record).transpose()
    }

    fn create_new_version(&self, new: NewVersion<'_>) -> Result<SchemaRecord> {
        // Read the current maximum, try to claim the next slot, and let the
        // unique index arbitrate when another worker claimed it first.
        for _attempt in 0..VERSION_ALLOC_RETRIES {
            let latest: Option<i64> = relock(self.conn.lock())
                .query_row("SELECT MAX(version) FROM schema_registry", [], |row| {
                    row.get(0)
                })
                .optional()?
                .flatten();
            let version = latest.map_or(1, |version| version + 1);
            let record = new.to_record(version);
            let json = serde_json::to_string(&record)?;

            let inserted = relock(self.conn.lock()).execute(
                "INSERT INTO schema_registry (version, record) VALUES (?1, ?2)",
                params![version, json],
            );
            match inserted {
                Ok(_) => return Ok(record),
                Err(error) if is_unique_violation(&error) => {
                    debug!(version, "lost version allocation race, retrying");
                    continue;
                }
                Err(error) => return Err(error.into()),
            }
        }
        Err(Error::Registry(
            "version allocation still contended after retries".into(),
        ))
    }

    fn mark_promoted(&self, version: i64) -> Result<SchemaRecord> {
        let mut record = self
            .get(version)?
            .ok_or(Error::SchemaNotFound(version))?;
        record.pending_promotion = true;
        record.promoted_at = Some(Utc::now().to_rfc3339());

        let json = serde_json::to_string(&record)?;
        relock(self.conn.lock()).execute(
            "UPDATE schema_registry SET record = ?1 WHERE version = ?2",
            params![json, version],
        )?;
        Ok(record)
    }
}

//
// Document store
//

/// Durable document collection over the `documents` table.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open the store in the database at `path`.
    pub fn open(path: &str) -> Result<Self> {
        let conn = open_connection(path)?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Every stored document, oldest first.
    pub fn documents(&self) -> Result<Vec<Value>> {
        let conn = relock(self.conn.lock());
        let mut stmt = conn.prepare("SELECT body FROM documents ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut documents = Vec::new();
        for body in rows {
            documents.push(serde_json::from_str(&body?)?);
        }
        Ok(documents)
    }
}

impl DocumentStore for SqliteStore {
    fn insert_many(&self, documents: &[Value]) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        let mut conn = relock(self.conn.lock());
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("INSERT INTO documents (body) VALUES (?1)")?;
            for document in documents {
                stmt.execute(params![serde_json::to_string(document)?])?;
            }
        }
        tx.commit()?;
        Ok(documents.len())
    }
}

//
// Dead-letter sink
//

/// Append-only dead-letter sink over the `dead_letters` table.
#[derive(Debug)]
pub struct SqliteDlq {
    conn: Mutex<Connection>,
    queue: String,
}

impl SqliteDlq {
    /// Open the sink `name` in the database at `path`.
    pub fn open(path: &str, name: &str) -> Result<Self> {
        let conn = open_connection(path)?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            queue: name.to_owned(),
        })
    }

    /// Every entry, oldest first.
    pub fn entries(&self) -> Result<Vec<DlqEntry>> {
        let conn = relock(self.conn.lock());
        let mut stmt =
            conn.prepare("SELECT entry FROM dead_letters WHERE queue = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![self.queue], |row| row.get::<_, String>(0))?;
        let mut entries = Vec::new();
        for entry in rows {
            entries.push(serde_json::from_str(&entry?)?);
        }
        Ok(entries)
    }
}

impl DeadLetterSink for SqliteDlq {
    fn send(&self, payload: Value, reason: &str) -> Result<()> {
        let entry = DlqEntry {
            payload,
            reason: reason.to_owned(),
            timestamp: Utc::now().to_rfc3339(),
        };
        relock(self.conn.lock()).execute(
            "INSERT INTO dead_letters (queue, entry) VALUES (?1, ?2)",
            params![self.queue, serde_json::to_string(&entry)?],
        )?;
        Ok(())
    }
}
