//! Per-field accumulation state and the finalized sample statistics.
//!
//! Observations are gathered one value at a time through [Aggregate] and can
//! be merged across independently-analyzed chunks through [Coalesce]; the
//! finalized [FieldStats] map is what travels with a schema into the registry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::schema::TypeTag;
use crate::traits::{Aggregate, Coalesce};

//
// Counter
//

/// As simple as an aggregator can be, counts the aggregated values.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Counter(pub usize);
impl<T: ?Sized> Aggregate<T> for Counter {
    fn aggregate(&mut self, _value: &'_ T) {
        self.0 += 1;
    }
}
impl Coalesce for Counter {
    fn coalesce(&mut self, other: Self) {
        self.0 += other.0;
    }
}

//
// CountingSet
//

/// Keeps track of the inserted values and how many times they have occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountingSet<T: Ord>(pub BTreeMap<T, usize>);
impl<T: Clone + Ord> CountingSet<T> {
    /// Adds a value to the set or increases its counter if it already exists.
    pub fn insert(&mut self, key: &T) {
        match self.0.get_mut(key) {
            Some(count) => *count += 1,
            None => {
                self.0.insert(key.clone(), 1);
            }
        };
    }
    /// Returns `true` if no value has been inserted yet.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    /// Sum of all counts inside.
    pub fn total(&self) -> usize {
        self.0.values().sum()
    }
}
impl<T: Ord> Coalesce for CountingSet<T> {
    fn coalesce(&mut self, other: Self) {
        for (key, count) in other.0 {
            *self.0.entry(key).or_insert(0) += count;
        }
    }
}
impl<T: Ord> Default for CountingSet<T> {
    // To avoid imposing T: Default
    fn default() -> Self {
        Self(Default::default())
    }
}

//
// Field observations
//

/// The accumulation state for one field while a sample is being analyzed:
/// how often the key appeared and with which value types.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldObservations {
    /// How many sample documents carried the key.
    pub present: Counter,
    /// Observed value tags with their occurrence counts.
    pub types: CountingSet<TypeTag>,
}
impl Aggregate<TypeTag> for FieldObservations {
    fn aggregate(&mut self, tag: &TypeTag) {
        self.present.aggregate(tag);
        self.types.insert(tag);
    }
}
impl Coalesce for FieldObservations {
    fn coalesce(&mut self, other: Self) {
        self.present.coalesce(other.present);
        self.types.coalesce(other.types);
    }
}

/// Observation state for every field seen across a sample.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SampleObservations(pub BTreeMap<String, FieldObservations>);

impl SampleObservations {
    /// Record that `key` appeared once with a value of the given tag.
    pub fn record(&mut self, key: &str, tag: TypeTag) {
        self.0.entry(key.to_owned()).or_default().aggregate(&tag);
    }

    /// Close the books: turn raw counts into per-field statistics relative
    /// to the sample size. An empty sample divides by one so percentages
    /// stay well-defined.
    pub fn finalize(self, sample_size: usize) -> FieldStats {
        let total = sample_size.max(1);
        self.0
            .into_iter()
            .map(|(name, observations)| {
                let present = observations.present.0;
                (
                    name,
                    FieldStat {
                        present,
                        present_pct: present as f64 / total as f64,
                        type_counts: observations.types.0,
                    },
                )
            })
            .collect()
    }
}
impl Coalesce for SampleObservations {
    fn coalesce(&mut self, other: Self) {
        self.0.coalesce(other.0);
    }
}

//
// Finalized statistics
//

/// Per-field statistics over one sample.
///
/// Invariant: the type counts sum to `present`, and `present_pct` lies in
/// `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldStat {
    /// Count of sample documents containing the key.
    pub present: usize,
    /// `present / sample_size`.
    pub present_pct: f64,
    /// How many observations fell on each value tag.
    pub type_counts: BTreeMap<TypeTag, usize>,
}

impl FieldStat {
    /// The share of this field's observations held by its most common tag,
    /// or [None] when no type observations exist.
    pub fn dominant_share(&self) -> Option<f64> {
        let total: usize = self.type_counts.values().sum();
        let max = self.type_counts.values().max()?;
        (total > 0).then(|| *max as f64 / total as f64)
    }
}

/// Finalized statistics for every field of a sample, keyed by field name.
pub type FieldStats = BTreeMap<String, FieldStat>;
