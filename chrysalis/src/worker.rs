//! The at-least-once worker loop: pop a job, infer, diff, decide, validate,
//! persist, deflect.
//!
//! One worker runs one single-threaded cooperative loop. Several workers may
//! share a queue: pops hand each job to exactly one of them, registry writes
//! are arbitrated by the version index, and nothing else is shared. A job,
//! once popped, runs to completion; the stop flag is only consulted between
//! jobs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::analysis::infer_from_sample;
use crate::config::Config;
use crate::diff::compute_diff;
use crate::job::Job;
use crate::policy::{Decision, PromotionPolicy, decide};
use crate::registry::{NewVersion, SAMPLE_DOCS_KEPT, SchemaRegistry, normalize_diff};
use crate::schema::Schema;
use crate::stats::FieldStats;
use crate::store::{DeadLetterSink, DocumentStore, JobQueue};
use crate::validator::{RejectReason, ValidationMode, validate};

/// How long the worker naps after an empty poll before trying again.
const COURTESY_SLEEP: Duration = Duration::from_millis(100);

/// How long the worker backs off after a queue read error.
const READ_ERROR_SLEEP: Duration = Duration::from_secs(1);

/// How many documents of a batch feed schema inference.
pub const SAMPLE_LIMIT: usize = 200;

/// The coordinator's position in its loop. Processing is not interruptible;
/// [WorkerState::Stopping] is only ever entered from [WorkerState::Idle].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Between jobs, about to poll.
    Idle,
    /// Blocked on the queue read.
    Popping,
    /// Driving one job through the pipeline.
    Processing,
    /// Cooperative stop observed; the loop is done.
    Stopping,
}

/// Which schema governs validation. Fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GoverningMode {
    /// Validate against the latest *registered* contract, meaning the
    /// record read before any promotion this job performed. Documents must
    /// conform to what consumers already rely on. The default.
    #[default]
    Latest,
    /// Validate against the candidate inferred from this very batch.
    Candidate,
}

/// Per-deployment behavior knobs, fixed at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerOptions {
    /// Which promotion policy runs.
    pub policy: PromotionPolicy,
    /// How required fields are derived during validation.
    pub mode: ValidationMode,
    /// Which schema documents are validated against.
    pub governing: GoverningMode,
    /// How many documents of a batch feed inference.
    pub sample_limit: usize,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            policy: PromotionPolicy::default(),
            mode: ValidationMode::default(),
            governing: GoverningMode::default(),
            sample_limit: SAMPLE_LIMIT,
        }
    }
}

/// What happened to one processed job. Returned for logging and assertions;
/// the durable effects have already happened by the time this exists.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    /// The job's producer-assigned id.
    pub job_id: String,
    /// The version stamped onto accepted documents. 0 when no schema has
    /// ever been registered and promotion failed.
    pub governing_version: i64,
    /// How many documents landed in the durable store.
    pub inserted: usize,
    /// How many documents were deflected.
    pub rejected: usize,
    /// The newly registered version, when promotion fired and stuck.
    pub promoted: Option<i64>,
    /// The promotion decision, reasons included.
    pub decision: Decision,
}

/// One ingest worker, wired to its four external collaborators.
pub struct Worker<'a> {
    queue: &'a dyn JobQueue,
    registry: &'a dyn SchemaRegistry,
    store: &'a dyn DocumentStore,
    dlq: &'a dyn DeadLetterSink,
    config: Config,
    options: WorkerOptions,
}

impl<'a> Worker<'a> {
    /// Wire up a worker. The configuration is cloned and frozen here.
    pub fn new(
        queue: &'a dyn JobQueue,
        registry: &'a dyn SchemaRegistry,
        store: &'a dyn DocumentStore,
        dlq: &'a dyn DeadLetterSink,
        config: Config,
        options: WorkerOptions,
    ) -> Self {
        Self {
            queue,
            registry,
            store,
            dlq,
            config,
            options,
        }
    }

    /// Run the loop until `stop` is raised. The flag is checked at the top
    /// of each iteration only; a popped job always runs to completion.
    pub fn run(&self, stop: &AtomicBool) {
        info!("worker started, polling ingest queue");
        while !stop.load(Ordering::Relaxed) {
            debug!(state = ?WorkerState::Popping, "awaiting job");
            match self.queue.pop_blocking(self.config.blpop_timeout) {
                Ok(Some(payload)) => {
                    debug!(state = ?WorkerState::Processing, "payload popped");
                    if let Some(outcome) = self.process_payload(&payload) {
                        info!(
                            job_id = %outcome.job_id,
                            governing_version = outcome.governing_version,
                            inserted = outcome.inserted,
                            rejected = outcome.rejected,
                            promoted = ?outcome.promoted,
                            "job processed"
                        );
                    }
                }
                Ok(None) => {
                    thread::sleep(COURTESY_SLEEP);
                }
                Err(queue_error) => {
                    error!(error = %queue_error, "queue read failed");
                    thread::sleep(READ_ERROR_SLEEP);
                }
            }
            debug!(state = ?WorkerState::Idle, "job cycle complete");
        }
        info!(state = ?WorkerState::Stopping, "worker stopped");
    }

    /// Drive one raw queue payload through the full pipeline.
    ///
    /// Returns [None] when the payload never became a processable job (it
    /// was deflected whole) or when the registry could not even be read.
    pub fn process_payload(&self, payload: &[u8]) -> Option<JobOutcome> {
        let job = match Job::from_payload(payload) {
            Ok(job) => job,
            Err(reject) => {
                let reason = reject.reason();
                warn!(reason, "unprocessable queue payload");
                self.deflect(reject.into_payload(), reason);
                return None;
            }
        };

        info!(job_id = %job.job_id, documents = job.documents.len(), "processing job");

        // Inference over the sample head.
        let sample = &job.documents[..job.documents.len().min(self.options.sample_limit)];
        let (candidate, stats) = infer_from_sample(sample);

        // Drift detection and versioning.
        let latest = match self.registry.get_latest() {
            Ok(latest) => latest,
            Err(registry_error) => {
                error!(error = %registry_error, job_id = %job.job_id, "registry unreadable, job abandoned");
                return None;
            }
        };
        let latest_schema = latest.as_ref().map(|record| &record.schema);
        let diff = compute_diff(
            latest_schema,
            &candidate,
            &stats,
            latest.as_ref().map(|record| &record.field_stats),
        );
        let decision = decide(
            self.options.policy,
            &diff,
            &candidate,
            latest_schema,
            &stats,
            sample.len(),
            &self.config,
        );

        let mut governing_version = latest.as_ref().map_or(0, |record| record.version);
        let mut promoted = None;
        if decision.promote {
            let submission = NewVersion {
                schema: &candidate,
                diff: normalize_diff(&diff),
                source_job_id: &job.job_id,
                sample_docs: &sample[..sample.len().min(SAMPLE_DOCS_KEPT)],
                field_stats: &stats,
            };
            match self.registry.create_new_version(submission) {
                Ok(record) => {
                    info!(
                        version = record.version,
                        reasons = ?decision.reasons,
                        "schema version promoted"
                    );
                    governing_version = record.version;
                    promoted = Some(record.version);
                }
                Err(registry_error) => {
                    // The job proceeds against the last read latest; the
                    // next batch will retry promotion.
                    error!(error = %registry_error, "registry write failed");
                }
            }
        }

        // Validation runs over the FULL batch, not just the sample.
        let (governing_schema, governing_stats): (Option<&Schema>, Option<&FieldStats>) =
            match self.options.governing {
                GoverningMode::Latest => (
                    latest_schema,
                    latest.as_ref().map(|record| &record.field_stats),
                ),
                GoverningMode::Candidate => (Some(&candidate), Some(&stats)),
            };

        let ingest_ts = Utc::now().to_rfc3339();
        let mut accepted = Vec::new();
        let mut rejected = 0;
        for document in &job.documents {
            match self.check(document, governing_schema, governing_stats) {
                Ok(()) => {
                    accepted.push(stamp(document, governing_version, &job.job_id, &ingest_ts));
                }
                Err(reason) => {
                    rejected += 1;
                    let token = reason.to_string();
                    self.deflect(
                        json!({ "doc": document, "reason": &token, "job_id": &job.job_id }),
                        &token,
                    );
                }
            }
        }

        let inserted = match self.store.insert_many(&accepted) {
            Ok(count) => count,
            Err(store_error) => {
                // The whole accepted set is considered lost; operators can
                // replay it from the dead letters.
                error!(error = %store_error, job_id = %job.job_id, "batch insert failed");
                for document in accepted.drain(..) {
                    self.deflect(document, "insert_failed");
                }
                0
            }
        };

        Some(JobOutcome {
            job_id: job.job_id,
            governing_version,
            inserted,
            rejected,
            promoted,
            decision,
        })
    }

    /// Validate one document against the governing schema, if there is one.
    ///
    /// With no schema registered yet anything object-shaped passes.
    /// Non-objects are still deflected because they cannot carry provenance
    /// stamps.
    fn check(
        &self,
        document: &Value,
        schema: Option<&Schema>,
        stats: Option<&FieldStats>,
    ) -> Result<(), RejectReason> {
        match schema {
            Some(schema) => validate(document, schema, stats, self.options.mode, &self.config),
            None if document.is_object() => Ok(()),
            None => Err(RejectReason::NotAnObject),
        }
    }

    /// Append to the dead-letter queue, swallowing sink failures: losing a
    /// dead letter must never abort the job that produced it.
    fn deflect(&self, payload: Value, reason: &str) {
        if let Err(sink_error) = self.dlq.send(payload, reason) {
            warn!(reason, error = %sink_error, "dead-letter append failed, entry dropped");
        }
    }
}

/// Attach the provenance stamps to an accepted document.
fn stamp(document: &Value, version: i64, job_id: &str, ingest_ts: &str) -> Value {
    let mut stamped = document.clone();
    if let Value::Object(fields) = &mut stamped {
        fields.insert("_schema_version".into(), Value::from(version));
        fields.insert("_ingest_job_id".into(), Value::from(job_id));
        fields.insert("_ingest_ts".into(), Value::from(ingest_ts));
    }
    stamped
}
