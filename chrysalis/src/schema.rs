//! The structural schema model: canonical, order-insensitive, byte-stable.

use std::collections::BTreeSet;
use std::fmt;

use ordermap::{OrderMap, map::Entry};
use serde::{Deserialize, Serialize};

use crate::{Coalesce, StructuralEq};

/// The canonical tag assigned to every value a document can carry.
///
/// `Integer` is deliberately distinct from `Number`: an identifier column
/// silently turning into floats is exactly the kind of drift the pipeline
/// exists to notice. Booleans are never numeric.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    /// An explicit null value.
    Null,
    /// `true` or `false`.
    Boolean,
    /// A whole number (including whole numbers outside the f64-safe range).
    Integer,
    /// A floating point number. `3.0` stays a number, it does not fold into
    /// [TypeTag::Integer].
    Number,
    /// A textual value.
    String,
    /// A nested key→value mapping.
    Object,
    /// A sequence of values.
    Array,
    /// Reserved for value sources that are not representable as JSON.
    Unknown,
}

impl TypeTag {
    /// The lowercase name used in serialized schemas and reason tokens.
    pub fn as_str(self) -> &'static str {
        match self {
            TypeTag::Null => "null",
            TypeTag::Boolean => "boolean",
            TypeTag::Integer => "integer",
            TypeTag::Number => "number",
            TypeTag::String => "string",
            TypeTag::Object => "object",
            TypeTag::Array => "array",
            TypeTag::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of tags a property has been observed with.
///
/// Serialized the way registry consumers expect a `type` key to look: a bare
/// tag when only one type was ever seen, a sorted list otherwise. An empty
/// set means the property carries no type constraint at all.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeSet(BTreeSet<TypeTag>);

impl TypeSet {
    /// A set with no constraint; accepts any value during validation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one more observed tag.
    pub fn insert(&mut self, tag: TypeTag) {
        self.0.insert(tag);
    }

    /// Whether `tag` is one of the accepted types.
    pub fn contains(&self, tag: TypeTag) -> bool {
        self.0.contains(&tag)
    }

    /// `true` when no tag has been recorded (no constraint).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of distinct tags recorded.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The sole accepted tag, when the set is a singleton.
    pub fn single(&self) -> Option<TypeTag> {
        if self.0.len() == 1 {
            self.0.iter().next().copied()
        } else {
            None
        }
    }

    /// Iterate the accepted tags in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = TypeTag> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<TypeTag> for TypeSet {
    fn from_iter<I: IntoIterator<Item = TypeTag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Coalesce for TypeSet {
    fn coalesce(&mut self, other: Self) {
        self.0.extend(other.0);
    }
}

impl Serialize for TypeSet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self.single() {
            Some(tag) => tag.serialize(serializer),
            None => serializer.collect_seq(self.0.iter()),
        }
    }
}

impl<'de> Deserialize<'de> for TypeSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            One(TypeTag),
            Many(BTreeSet<TypeTag>),
        }
        Ok(match Repr::deserialize(deserializer)? {
            Repr::One(tag) => TypeSet(BTreeSet::from([tag])),
            Repr::Many(tags) => TypeSet(tags),
        })
    }
}

/// The structural description of a single top-level property.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PropertyDef {
    /// The accepted tags; empty means unconstrained.
    #[serde(rename = "type", default, skip_serializing_if = "TypeSet::is_empty")]
    pub types: TypeSet,
}

impl PropertyDef {
    /// A definition accepting exactly one tag.
    pub fn single(tag: TypeTag) -> Self {
        Self {
            types: TypeSet::from_iter([tag]),
        }
    }

    /// A definition accepting any of the given tags.
    pub fn any_of<I: IntoIterator<Item = TypeTag>>(tags: I) -> Self {
        Self {
            types: TypeSet::from_iter(tags),
        }
    }
}

impl Coalesce for PropertyDef {
    fn coalesce(&mut self, other: Self) {
        self.types.coalesce(other.types);
    }
}

/// A structural schema: the union of every property a sample has shown,
/// plus an optional explicit list of required fields.
///
/// Equality is defined on the canonical form (properties sorted
/// lexicographically, type sets sorted), so two schemas inferred from the
/// same fields in any key order compare byte-for-byte equal once serialized.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    /// Property definitions keyed by field name.
    pub properties: OrderMap<String, PropertyDef>,
    /// Fields a document must carry to be valid, when stated explicitly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

impl Schema {
    /// Sorts the properties by field name (using [String::cmp]).
    pub fn sort_properties(&mut self) {
        self.properties.sort_keys();
    }

    /// The canonical serialized form used for byte-stable equality.
    ///
    /// Serializing a [Schema] cannot fail (all keys are strings, all leaves
    /// are enums), so the empty fallback is unreachable in practice.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut canonical = self.clone();
        canonical.sort_properties();
        serde_json::to_vec(&canonical).unwrap_or_default()
    }
}

impl StructuralEq for Schema {
    fn structural_eq(&self, other: &Self) -> bool {
        self.canonical_bytes() == other.canonical_bytes()
    }
}

impl Coalesce for Schema {
    fn coalesce(&mut self, other: Self) {
        for (name, def) in other.properties {
            match self.properties.entry(name) {
                Entry::Occupied(mut entry) => {
                    entry.get_mut().coalesce(def);
                }
                Entry::Vacant(entry) => {
                    entry.insert(def);
                }
            }
        }
    }
}
