//! Queue, document-store and dead-letter contracts across both backends.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::DateTime;
use serde_json::json;

use chrysalis::store::{
    DeadLetterSink, DocumentStore, JobQueue, MemoryDlq, MemoryQueue, MemoryStore, SqliteDlq,
    SqliteQueue, SqliteStore, init,
};

#[test]
fn memory_queue_is_fifo() {
    let queue = MemoryQueue::new();
    queue.push(b"first").unwrap();
    queue.push(b"second").unwrap();

    let popped = queue.pop_blocking(Duration::from_millis(10)).unwrap();
    assert_eq!(popped.as_deref(), Some(&b"first"[..]));
    let popped = queue.pop_blocking(Duration::from_millis(10)).unwrap();
    assert_eq!(popped.as_deref(), Some(&b"second"[..]));
}

#[test]
fn memory_queue_times_out_empty() {
    let queue = MemoryQueue::new();
    let started = Instant::now();
    let popped = queue.pop_blocking(Duration::from_millis(50)).unwrap();
    assert_eq!(popped, None);
    assert!(started.elapsed() >= Duration::from_millis(50));
}

#[test]
fn memory_queue_wakes_a_blocked_pop() {
    let queue = Arc::new(MemoryQueue::new());
    let producer = Arc::clone(&queue);

    let consumer = thread::spawn(move || queue.pop_blocking(Duration::from_secs(5)).unwrap());
    thread::sleep(Duration::from_millis(20));
    producer.push(b"payload").unwrap();

    let popped = consumer.join().unwrap();
    assert_eq!(popped.as_deref(), Some(&b"payload"[..]));
}

#[test]
fn memory_store_batches_atomically() {
    let store = MemoryStore::new();
    assert_eq!(store.insert_many(&[]).unwrap(), 0);
    assert!(store.documents().is_empty());

    let inserted = store
        .insert_many(&[json!({ "a": 1 }), json!({ "b": 2 })])
        .unwrap();
    assert_eq!(inserted, 2);
    assert_eq!(store.documents()[0], json!({ "a": 1 }));
}

#[test]
fn memory_dlq_keeps_insertion_order() {
    let dlq = MemoryDlq::new();
    dlq.send(json!({ "n": 1 }), "first_reason").unwrap();
    dlq.send(json!({ "n": 2 }), "second_reason").unwrap();

    let entries = dlq.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].reason, "first_reason");
    assert_eq!(entries[1].payload, json!({ "n": 2 }));
    assert!(DateTime::parse_from_rfc3339(&entries[0].timestamp).is_ok());
}

//
// SQLite backend
//

#[test]
fn sqlite_queue_is_fifo_and_consumes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pipeline.db");
    let path = path.to_str().unwrap();
    init(path).unwrap();

    let queue = SqliteQueue::open(path, "test:queue").unwrap();
    queue.push(b"first").unwrap();
    queue.push(b"second").unwrap();

    let popped = queue.pop_blocking(Duration::from_millis(10)).unwrap();
    assert_eq!(popped.as_deref(), Some(&b"first"[..]));
    let popped = queue.pop_blocking(Duration::from_millis(10)).unwrap();
    assert_eq!(popped.as_deref(), Some(&b"second"[..]));
    // Consumed payloads are gone.
    let popped = queue.pop_blocking(Duration::from_millis(10)).unwrap();
    assert_eq!(popped, None);
}

#[test]
fn sqlite_queues_are_namespaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pipeline.db");
    let path = path.to_str().unwrap();

    let ingest = SqliteQueue::open(path, "ingest").unwrap();
    let other = SqliteQueue::open(path, "other").unwrap();
    ingest.push(b"payload").unwrap();

    assert_eq!(other.pop_blocking(Duration::from_millis(10)).unwrap(), None);
    assert!(
        ingest
            .pop_blocking(Duration::from_millis(10))
            .unwrap()
            .is_some()
    );
}

#[test]
fn sqlite_store_batches_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pipeline.db");
    let store = SqliteStore::open(path.to_str().unwrap()).unwrap();

    assert_eq!(store.insert_many(&[]).unwrap(), 0);
    let inserted = store
        .insert_many(&[json!({ "a": 1 }), json!({ "b": 2 })])
        .unwrap();
    assert_eq!(inserted, 2);

    let documents = store.documents().unwrap();
    assert_eq!(documents, vec![json!({ "a": 1 }), json!({ "b": 2 })]);
}

#[test]
fn sqlite_dlq_keeps_insertion_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pipeline.db");
    let dlq = SqliteDlq::open(path.to_str().unwrap(), "test:dlq").unwrap();

    dlq.send(json!("raw bytes"), "invalid_job_payload").unwrap();
    dlq.send(json!({ "doc": {} }), "missing_required:name")
        .unwrap();

    let entries = dlq.entries().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].reason, "invalid_job_payload");
    assert_eq!(entries[0].payload, json!("raw bytes"));
    assert_eq!(entries[1].reason, "missing_required:name");
}
