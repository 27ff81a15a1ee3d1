//! Frozen runtime configuration.
//!
//! Every tunable is read from the environment exactly once, at startup, and
//! the resulting value is passed into components by reference. Nothing in
//! the engine reads the environment on its own, so identical inputs always
//! produce identical decisions.

use std::env;
use std::time::Duration;

/// All runtime tunables with their defaults.
///
/// An unset or unparsable variable falls back to its default: a worker that
/// refuses to start over a typo'd threshold would contradict the
/// nothing-is-fatal posture of the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Ingest queue identifier.
    pub queue_name: String,
    /// Dead-letter queue identifier.
    pub dlq_name: String,
    /// How long a blocking queue read waits on an empty queue.
    pub blpop_timeout: Duration,
    /// Share of the sample a new field must reach to count as major drift.
    pub added_major_pct: f64,
    /// Historical presence share above which a removed field counts as
    /// major drift.
    pub removed_major_prev_pct: f64,
    /// Dominant-type share above which a changed field counts as a type
    /// shift.
    pub type_shift_major_pct: f64,
    /// Historical presence share above which a field is treated as
    /// required by the strict validator.
    pub required_pct: f64,
    /// Coverage bar for the coverage promotion policy.
    pub promote_pct: f64,
    /// Whether the validator applies the lenient type coercions
    /// (numbers into strings, numeric strings into numbers).
    pub allow_type_promotion: bool,
    /// Shared secret for the out-of-band approval flow.
    pub promote_token: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue_name: "chrysalis:ingest:queue".into(),
            dlq_name: "chrysalis:dlq".into(),
            blpop_timeout: Duration::from_secs(5),
            added_major_pct: 0.10,
            removed_major_prev_pct: 0.20,
            type_shift_major_pct: 0.50,
            required_pct: 0.90,
            promote_pct: 0.90,
            allow_type_promotion: true,
            promote_token: "demo-token".into(),
        }
    }
}

impl Config {
    /// Read the configuration from the environment, falling back to the
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            queue_name: env_string("QUEUE_NAME", defaults.queue_name),
            dlq_name: env_string("DLQ_NAME", defaults.dlq_name),
            blpop_timeout: Duration::from_secs(env_u64(
                "BLPOP_TIMEOUT",
                defaults.blpop_timeout.as_secs(),
            )),
            added_major_pct: env_f64("ADDED_MAJOR_PCT", defaults.added_major_pct),
            removed_major_prev_pct: env_f64(
                "REMOVED_MAJOR_PREV_PCT",
                defaults.removed_major_prev_pct,
            ),
            type_shift_major_pct: env_f64("TYPE_SHIFT_MAJOR_PCT", defaults.type_shift_major_pct),
            required_pct: env_f64("REQUIRED_PCT", defaults.required_pct),
            promote_pct: env_f64("PROMOTE_PCT", defaults.promote_pct),
            allow_type_promotion: env_bool("ALLOW_TYPE_PROMOTION", defaults.allow_type_promotion),
            promote_token: env_string("PROMOTE_TOKEN", defaults.promote_token),
        }
    }
}

fn env_string(name: &str, default: String) -> String {
    env::var(name).unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn env_f64(name: &str, default: f64) -> f64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(value) => matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes"
        ),
        Err(_) => default,
    }
}
