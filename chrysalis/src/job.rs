//! The unit of work producers enqueue: a batch of documents plus minimal
//! provenance.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One ingest batch as it travels the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Opaque producer-assigned identifier; `"unknown"` when absent.
    #[serde(default = "unknown_job_id")]
    pub job_id: String,
    /// Free-form description of where the batch came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// When the producer accepted the batch (ISO-8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<String>,
    /// The documents themselves. A job with none is deflected whole.
    #[serde(default)]
    pub documents: Vec<Value>,
}

fn unknown_job_id() -> String {
    "unknown".into()
}

/// Why a queue payload could not be turned into a processable [Job].
///
/// Carries the payload to preserve on the dead-letter queue, so a deflected
/// batch can still be inspected and replayed.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadReject {
    /// The bytes were not valid JSON. The raw payload is preserved as a
    /// lossy string.
    Undecodable {
        /// The original bytes, lossily decoded.
        raw: String,
    },
    /// `documents` was missing, not a list, or empty.
    EmptyDocuments {
        /// The decoded payload.
        payload: Value,
    },
    /// The payload decoded but does not fit the job shape.
    Malformed {
        /// The decoded payload.
        payload: Value,
    },
}

impl PayloadReject {
    /// The dead-letter reason token for this rejection.
    pub fn reason(&self) -> &'static str {
        match self {
            PayloadReject::Undecodable { .. } => "invalid_job_payload",
            PayloadReject::EmptyDocuments { .. } => "empty_documents",
            PayloadReject::Malformed { .. } => "invalid_job_payload",
        }
    }

    /// The payload to preserve alongside the reason.
    pub fn into_payload(self) -> Value {
        match self {
            PayloadReject::Undecodable { raw } => Value::String(raw),
            PayloadReject::EmptyDocuments { payload } => payload,
            PayloadReject::Malformed { payload } => payload,
        }
    }
}

impl Job {
    /// Build a fresh job the way a producer would: a v4 UUID for the id and
    /// the current UTC instant for `received_at`.
    pub fn new(source: impl Into<String>, documents: Vec<Value>) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            source: Some(source.into()),
            received_at: Some(Utc::now().to_rfc3339()),
            documents,
        }
    }

    /// Serialize for the queue.
    pub fn encode(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a raw queue payload, distinguishing undecodable bytes from a
    /// decoded-but-unusable batch so each lands on the DLQ with the right
    /// reason.
    pub fn from_payload(bytes: &[u8]) -> Result<Self, PayloadReject> {
        let value: Value = serde_json::from_slice(bytes).map_err(|_| PayloadReject::Undecodable {
            raw: String::from_utf8_lossy(bytes).into_owned(),
        })?;

        let has_documents = value
            .get("documents")
            .and_then(Value::as_array)
            .is_some_and(|documents| !documents.is_empty());
        if !has_documents {
            return Err(PayloadReject::EmptyDocuments { payload: value });
        }

        serde_json::from_value(value.clone())
            .map_err(|_| PayloadReject::Malformed { payload: value })
    }
}
