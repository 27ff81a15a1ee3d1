//! Structural comparison between a candidate schema and the last registered
//! one.
//!
//! The output is deliberately richer than a set-difference: every entry
//! carries the presence or type metadata the promotion policy needs, so the
//! policy can stay a pure function over this value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::schema::{PropertyDef, Schema};
use crate::stats::FieldStats;

/// A field that exists in the candidate but not in the old schema.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AddedField {
    /// How many sample documents carried the field.
    pub present: usize,
    /// Share of the sample carrying the field.
    pub present_pct: f64,
}

/// A field the old schema had that the candidate no longer shows.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RemovedField {
    /// Historical presence share from the latest registered record, when
    /// that record tracked the field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_presence_pct: Option<f64>,
}

/// A field present on both sides whose property definition changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedField {
    /// The definition in the old schema.
    pub old: PropertyDef,
    /// The definition in the candidate.
    pub new: PropertyDef,
    /// Share of the field's current observations held by its dominant type;
    /// absent when the sample carried no type observations for the field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_dom_pct: Option<f64>,
}

/// The full difference between two schemas, keyed by field name.
///
/// All three maps are ordered, so iterating a diff (and therefore every
/// decision derived from one) is deterministic.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Diff {
    /// Fields new in the candidate.
    pub added: BTreeMap<String, AddedField>,
    /// Fields the candidate dropped.
    pub removed: BTreeMap<String, RemovedField>,
    /// Fields whose definitions differ.
    pub changed: BTreeMap<String, ChangedField>,
}

impl Diff {
    /// `true` when the two schemas did not differ at all.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Compare the latest registered schema against a freshly inferred candidate.
///
/// With no (or an empty) old schema every candidate property counts as
/// added. Otherwise properties are matched by name: new names are added,
/// vanished names are removed (annotated with their historical presence from
/// `latest_stats` when available), and names whose definitions differ
/// structurally are changed, annotated with the dominant share of the
/// field's current type observations.
pub fn compute_diff(
    old: Option<&Schema>,
    new: &Schema,
    stats: &FieldStats,
    latest_stats: Option<&FieldStats>,
) -> Diff {
    let mut diff = Diff::default();

    let old = match old {
        Some(schema) if !schema.properties.is_empty() => schema,
        _ => {
            // Everything added.
            for name in new.properties.keys() {
                diff.added.insert(name.clone(), added_entry(name, stats));
            }
            return diff;
        }
    };

    for (name, def) in &new.properties {
        match old.properties.get(name) {
            None => {
                diff.added.insert(name.clone(), added_entry(name, stats));
            }
            Some(old_def) if old_def != def => {
                diff.changed.insert(
                    name.clone(),
                    ChangedField {
                        old: old_def.clone(),
                        new: def.clone(),
                        new_dom_pct: stats.get(name).and_then(|stat| stat.dominant_share()),
                    },
                );
            }
            Some(_) => {}
        }
    }

    for name in old.properties.keys() {
        if !new.properties.contains_key(name) {
            diff.removed.insert(
                name.clone(),
                RemovedField {
                    prev_presence_pct: latest_stats
                        .and_then(|stats| stats.get(name))
                        .map(|stat| stat.present_pct),
                },
            );
        }
    }

    diff
}

fn added_entry(name: &str, stats: &FieldStats) -> AddedField {
    match stats.get(name) {
        Some(stat) => AddedField {
            present: stat.present,
            present_pct: stat.present_pct,
        },
        None => AddedField::default(),
    }
}
