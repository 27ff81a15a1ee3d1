//! The schema registry: ordered, monotonically versioned schema metadata.
//!
//! Records are append-only. A version, once written, is never edited; the
//! single exception is the out-of-band approval flow, which may flip
//! `pending_promotion` and stamp `promoted_at` on an existing record.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::stats::FieldStats;

/// How many sample documents a record keeps for forensic replay.
pub const SAMPLE_DOCS_KEPT: usize = 5;

/// One registered schema version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaRecord {
    /// Monotone positive version, gapless from 1.
    pub version: i64,
    /// The candidate schema exactly as it was at the moment of promotion.
    pub schema: Schema,
    /// The diff that justified the promotion; empty for version 1.
    pub diff: Value,
    /// When the record was created (ISO-8601 UTC).
    pub created_at: String,
    /// The job whose sample produced this version.
    pub source_job_id: String,
    /// Head of the inferring sample, kept for forensic replay.
    pub sample_docs: Vec<Value>,
    /// Per-field statistics of the inferring sample.
    pub field_stats: FieldStats,
    /// Set by the out-of-band approval flow.
    #[serde(default)]
    pub pending_promotion: bool,
    /// When the approval happened (ISO-8601 UTC).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promoted_at: Option<String>,
}

/// Everything a caller supplies to register a new version; the registry
/// itself assigns the version number and the creation timestamp.
#[derive(Debug, Clone)]
pub struct NewVersion<'a> {
    /// The candidate schema being registered.
    pub schema: &'a Schema,
    /// The justifying diff, already normalized to a plain mapping.
    pub diff: Value,
    /// The job whose sample produced the candidate.
    pub source_job_id: &'a str,
    /// The inferring sample; only the first [SAMPLE_DOCS_KEPT] documents
    /// are persisted.
    pub sample_docs: &'a [Value],
    /// Per-field statistics of the inferring sample.
    pub field_stats: &'a FieldStats,
}

impl NewVersion<'_> {
    /// Materialize the record this submission becomes at `version`,
    /// stamped with the current UTC instant.
    pub fn to_record(&self, version: i64) -> SchemaRecord {
        let kept = self.sample_docs.len().min(SAMPLE_DOCS_KEPT);
        SchemaRecord {
            version,
            schema: self.schema.clone(),
            diff: self.diff.clone(),
            created_at: Utc::now().to_rfc3339(),
            source_job_id: self.source_job_id.to_owned(),
            sample_docs: self.sample_docs[..kept].to_vec(),
            field_stats: self.field_stats.clone(),
            pending_promotion: false,
            promoted_at: None,
        }
    }
}

/// Normalize a heterogeneous diff input (structured object or plain
/// mapping) into the plain nested mapping persisted on records.
pub fn normalize_diff<T: Serialize>(diff: &T) -> Value {
    serde_json::to_value(diff).unwrap_or_else(|_| Value::Object(Default::default()))
}

/// Storage capability for schema metadata records.
///
/// Implementations must resolve concurrent version allocation so that at
/// most one record exists per version; callers may race freely.
pub trait SchemaRegistry {
    /// The record with the greatest version, if any.
    fn get_latest(&self) -> Result<Option<SchemaRecord>>;

    /// Fetch a specific version.
    fn get(&self, version: i64) -> Result<Option<SchemaRecord>>;

    /// Append a new version: `latest.version + 1`, or 1 for the first
    /// record. Persists atomically.
    fn create_new_version(&self, new: NewVersion<'_>) -> Result<SchemaRecord>;

    /// Flip the approval flag on an existing record and stamp
    /// `promoted_at`. Returns the updated record.
    fn mark_promoted(&self, version: i64) -> Result<SchemaRecord>;
}

/// The out-of-band approval flow: check the shared token, then mark the
/// record. Token verification lives here, outside the storage layer, so
/// every backend enforces it identically.
pub fn approve_version(
    registry: &dyn SchemaRegistry,
    version: i64,
    token: &str,
    config: &Config,
) -> Result<SchemaRecord> {
    if token != config.promote_token {
        return Err(Error::Unauthorized);
    }
    registry.mark_promoted(version)
}
