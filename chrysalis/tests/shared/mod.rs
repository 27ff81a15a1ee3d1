#![allow(dead_code)]

use serde_json::Value;

use chrysalis::store::{DocumentStore, MemoryDlq, MemoryQueue, MemoryRegistry, MemoryStore};
use chrysalis::worker::{JobOutcome, Worker, WorkerOptions};
use chrysalis::{Config, Error, Job, PropertyDef, Schema};

/// Bundles the in-memory collaborators so tests can drive the real worker
/// end to end without any external service.
pub struct Harness {
    pub queue: MemoryQueue,
    pub registry: MemoryRegistry,
    pub store: MemoryStore,
    pub dlq: MemoryDlq,
    pub config: Config,
    pub options: WorkerOptions,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(WorkerOptions::default())
    }

    pub fn with_options(options: WorkerOptions) -> Self {
        Self {
            queue: MemoryQueue::new(),
            registry: MemoryRegistry::new(),
            store: MemoryStore::new(),
            dlq: MemoryDlq::new(),
            config: Config::default(),
            options,
        }
    }

    pub fn worker(&self) -> Worker<'_> {
        Worker::new(
            &self.queue,
            &self.registry,
            &self.store,
            &self.dlq,
            self.config.clone(),
            self.options.clone(),
        )
    }

    /// Run one job through the pipeline, bypassing the queue.
    pub fn process(&self, job: &Job) -> Option<JobOutcome> {
        self.process_raw(&job.encode().unwrap())
    }

    /// Run one raw payload through the pipeline, bypassing the queue.
    pub fn process_raw(&self, payload: &[u8]) -> Option<JobOutcome> {
        self.worker().process_payload(payload)
    }
}

/// A batch the way a producer would submit it.
pub fn batch(documents: Vec<Value>) -> Job {
    Job::new("test", documents)
}

/// Build a schema from name→definition pairs.
pub fn schema_of(properties: &[(&str, PropertyDef)]) -> Schema {
    let mut schema = Schema::default();
    for (name, def) in properties {
        schema.properties.insert((*name).to_owned(), def.clone());
    }
    schema.sort_properties();
    schema
}

/// A document store whose inserts always fail, for exercising the
/// insert-failure deflection path.
pub struct FailingStore;

impl DocumentStore for FailingStore {
    fn insert_many(&self, _documents: &[Value]) -> chrysalis::Result<usize> {
        Err(Error::Store("store offline".into()))
    }
}
