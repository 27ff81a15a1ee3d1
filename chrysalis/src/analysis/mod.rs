/*!
This module holds the analysis logic: classifying individual values and
reducing a document sample to a structural schema plus per-field statistics.

The analysis is deliberately shallow-but-honest. Every document contributes
one observation per top-level key; a nested object or array contributes its
tag to the top-level property (so `{"a": {"b": 1}}` and `{"a": [1]}` merge
into a property accepting both `object` and `array`) without recursing into
a deep sub-schema. That keeps the canonical form small and byte-stable while
still catching the type drift that matters at the contract boundary.

Merging follows the same shape as the per-value aggregation: each document
folds into the growing [Schema] through [Coalesce], and observation maps
from independently-analyzed chunks can be merged the same way.
*/

use serde_json::Value;

use crate::schema::{PropertyDef, Schema, TypeTag};
use crate::stats::{FieldStats, SampleObservations};
use crate::traits::Coalesce;

/// Classify a value into its canonical [TypeTag].
///
/// Pure and total: booleans are matched before numbers so they can never
/// come out numeric, and a whole-valued float (`3.0`) stays
/// [TypeTag::Number] because the wire format said so.
///
/// ```
/// # use chrysalis::{classify, TypeTag};
/// # use serde_json::json;
/// assert_eq!(classify(&json!(true)), TypeTag::Boolean);
/// assert_eq!(classify(&json!(3)), TypeTag::Integer);
/// assert_eq!(classify(&json!(3.0)), TypeTag::Number);
/// ```
pub fn classify(value: &Value) -> TypeTag {
    match value {
        Value::Null => TypeTag::Null,
        Value::Bool(_) => TypeTag::Boolean,
        Value::Number(number) => {
            if number.is_i64() || number.is_u64() {
                TypeTag::Integer
            } else {
                TypeTag::Number
            }
        }
        Value::String(_) => TypeTag::String,
        Value::Object(_) => TypeTag::Object,
        Value::Array(_) => TypeTag::Array,
    }
}

/// Reduce a sample of documents to a candidate [Schema] and its
/// [FieldStats].
///
/// The schema's property set is the union of every key observed across the
/// sample, each property's type set the union of the tags seen for that
/// key. Properties come out sorted lexicographically so the serialized form
/// is canonical. Sample entries that are not objects contribute nothing;
/// they are caught later, at validation time.
pub fn infer_from_sample(sample: &[Value]) -> (Schema, FieldStats) {
    let mut schema = Schema::default();
    let mut observations = SampleObservations::default();

    for document in sample {
        let Value::Object(fields) = document else {
            continue;
        };

        let mut document_schema = Schema::default();
        for (key, value) in fields {
            let tag = classify(value);
            observations.record(key, tag);
            document_schema
                .properties
                .entry(key.clone())
                .or_insert_with(PropertyDef::default)
                .types
                .insert(tag);
        }
        schema.coalesce(document_schema);
    }

    schema.sort_properties();
    (schema, observations.finalize(sample.len()))
}
