#![forbid(unsafe_code)]
#![warn(missing_docs)]
/*!
# Chrysalis

An ingest pipeline for document batches whose shape is not known ahead of
time.

Producers enqueue batches of arbitrary JSON documents. A worker pops each
batch, infers a structural schema from a sample, compares it against the
last registered schema version to detect drift, promotes a new version when
the drift is significant, then validates every document of the batch against
the governing contract: conforming documents land in a durable store carrying
provenance stamps, the rest are deflected to a dead-letter queue with a
machine-readable reason.

## Usage

The analysis and decision pieces are plain pure functions:

```
use chrysalis::{infer_from_sample, validate, Config, ValidationMode};
use serde_json::json;

let sample = vec![
    json!({ "id": 1, "name": "a" }),
    json!({ "id": 2, "name": "b" }),
];

let (schema, stats) = infer_from_sample(&sample);
let config = Config::default();

// A conforming document passes...
let ok = validate(
    &json!({ "id": 3, "name": "c" }),
    &schema,
    Some(&stats),
    ValidationMode::Strict,
    &config,
);
assert!(ok.is_ok());

// ...a document missing an always-present field does not.
let missing = validate(
    &json!({ "id": 4 }),
    &schema,
    Some(&stats),
    ValidationMode::Strict,
    &config,
);
assert_eq!(missing.unwrap_err().to_string(), "missing_required:name");
```

The full pipeline is driven by a [Worker](worker::Worker) wired to four
narrow capability interfaces: a blocking-pop queue, the schema registry, a
batch document store, and the dead-letter sink. In-memory and SQLite-backed
implementations of all four ship in [store] (and [registry] for the
registry trait); anything else that can pop, insert and append can be
dropped in instead.
*/

pub mod analysis;
pub mod config;
pub mod diff;
mod error;
pub mod job;
pub mod policy;
pub mod registry;
pub mod schema;
pub mod stats;
pub mod store;
pub mod traits;
pub mod validator;
pub mod worker;

pub use analysis::{classify, infer_from_sample};
pub use config::Config;
pub use diff::{Diff, compute_diff};
pub use error::{Error, Result};
pub use job::Job;
pub use policy::{Decision, PromotionPolicy, decide};
pub use registry::{NewVersion, SchemaRecord, SchemaRegistry, approve_version, normalize_diff};
pub use schema::{PropertyDef, Schema, TypeSet, TypeTag};
pub use stats::{FieldStat, FieldStats};
pub use traits::{Aggregate, Coalesce, StructuralEq};
pub use validator::{RejectReason, ValidationMode, validate};
pub use worker::{GoverningMode, JobOutcome, Worker, WorkerOptions};
