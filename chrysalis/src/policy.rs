//! The version-promotion decision.
//!
//! Two postures are supported and a deployment runs exactly one of them:
//!
//! - [PromotionPolicy::Drift] watches for individually-significant changes
//!   (a common field vanished, a common field appeared, a field's dominant
//!   type shifted) and promotes on the first rule that fires.
//! - [PromotionPolicy::Coverage] only cares whether the candidate differs
//!   from the latest schema *and* is well-supported by the sample as a
//!   whole.
//!
//! Both are pure functions of their inputs, and both leave a reason behind
//! even when declining, so operators can always see why a batch did or did
//! not move the contract.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::diff::Diff;
use crate::schema::Schema;
use crate::stats::FieldStats;
use crate::traits::StructuralEq;

/// Which promotion posture a deployment runs. Fixed at startup; the two
/// policies are never composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromotionPolicy {
    /// Rule-based drift detection (the default).
    #[default]
    Drift,
    /// Sample-coverage gating.
    Coverage,
}

/// The outcome of a promotion decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the candidate supersedes the latest registered schema.
    pub promote: bool,
    /// Ordered machine-readable tokens explaining the outcome.
    pub reasons: Vec<String>,
}

impl Decision {
    fn promote(reason: String) -> Self {
        Self {
            promote: true,
            reasons: vec![reason],
        }
    }

    fn keep(reason: String) -> Self {
        Self {
            promote: false,
            reasons: vec![reason],
        }
    }
}

/// Decide whether the candidate schema should become a new registered
/// version.
///
/// The first non-empty sample ever seen promotes unconditionally (reason
/// `no_latest_schema`) under either policy; there is no contract yet to
/// drift from.
pub fn decide(
    policy: PromotionPolicy,
    diff: &Diff,
    candidate: &Schema,
    latest: Option<&Schema>,
    stats: &FieldStats,
    sample_size: usize,
    config: &Config,
) -> Decision {
    let Some(latest) = latest else {
        return Decision::promote("no_latest_schema".into());
    };

    match policy {
        PromotionPolicy::Drift => decide_drift(diff, sample_size, config),
        PromotionPolicy::Coverage => decide_coverage(candidate, latest, stats, config),
    }
}

/// Rule-based drift decision. Rules run in a fixed order and short-circuit
/// on the first that fires; within a rule, fields are visited in
/// lexicographic order so the firing field is reproducible.
fn decide_drift(diff: &Diff, sample_size: usize, config: &Config) -> Decision {
    // 1) A historically common field is gone.
    for (field, info) in &diff.removed {
        if let Some(prev_pct) = info.prev_presence_pct {
            if prev_pct >= config.removed_major_prev_pct {
                return Decision::promote(format!("removed_common_field:{field}"));
            }
        }
    }

    // 2) A new field showed up in a meaningful share of the sample. The
    // count test backs up the percentage test so tiny samples still fire.
    if sample_size > 0 {
        let present_floor = ((config.added_major_pct * sample_size as f64) as usize).max(1);
        for (field, info) in &diff.added {
            if info.present_pct >= config.added_major_pct || info.present >= present_floor {
                return Decision::promote(format!("added_common_field:{field}"));
            }
        }
    }

    // 3) A field's observations are now dominated by a different type.
    for (field, info) in &diff.changed {
        if let Some(new_dom_pct) = info.new_dom_pct {
            if new_dom_pct >= config.type_shift_major_pct {
                return Decision::promote(format!("type_shift:{field}"));
            }
        }
    }

    Decision::keep("no_major_drift".into())
}

/// Coverage decision: promote iff the candidate differs from the latest
/// schema and the share of candidate properties well-supported by the
/// sample clears the bar.
fn decide_coverage(
    candidate: &Schema,
    latest: &Schema,
    stats: &FieldStats,
    config: &Config,
) -> Decision {
    if latest.structural_eq(candidate) {
        return Decision::keep("schemas_equal".into());
    }

    let total = candidate.properties.len().max(1);
    let covered = candidate
        .properties
        .keys()
        .filter(|field| {
            stats
                .get(*field)
                .is_some_and(|stat| stat.present_pct >= config.promote_pct)
        })
        .count();
    let coverage = covered as f64 / total as f64;

    if coverage >= config.promote_pct {
        Decision::promote(format!("coverage_ok({coverage:.2})"))
    } else {
        Decision::keep(format!("coverage_fail({coverage:.2})"))
    }
}
