//! Per-document validation against a governing schema.
//!
//! [validate] is a pure function of the document, the schema, the optional
//! historical field statistics and the threshold configuration. It never
//! consults the registry and never mutates its inputs, which is what makes
//! the whole accept/deflect path of the pipeline replayable.

use std::fmt;

use serde_json::Value;

use crate::analysis::classify;
use crate::config::Config;
use crate::schema::{PropertyDef, Schema, TypeTag};
use crate::stats::FieldStats;

/// How strictly required fields are derived. Fixed per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Required fields come from the schema's explicit list when present,
    /// otherwise from historical presence statistics.
    #[default]
    Strict,
    /// Required fields come only from the schema's explicit list.
    Lenient,
}

/// A machine-readable reason a document was deflected.
///
/// The [fmt::Display] form is the exact token written to the dead-letter
/// queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The document is not a key→value mapping.
    NotAnObject,
    /// A required field is missing. `explicit` records whether the
    /// requirement came from the schema's own list or was derived from
    /// historical presence.
    MissingRequired {
        /// The missing field.
        field: String,
        /// Source of the requirement; changes the emitted token.
        explicit: bool,
    },
    /// A field's value is not compatible with its property definition.
    TypeMismatch {
        /// The offending field.
        field: String,
        /// The expected tag, when the definition pins down exactly one.
        expected: Option<TypeTag>,
    },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NotAnObject => f.write_str("not_an_object"),
            RejectReason::MissingRequired {
                field,
                explicit: true,
            } => write!(f, "missing_required_field:{field}"),
            RejectReason::MissingRequired {
                field,
                explicit: false,
            } => write!(f, "missing_required:{field}"),
            RejectReason::TypeMismatch {
                field,
                expected: Some(tag),
            } => write!(f, "type_mismatch:{field}:expected_{tag}"),
            RejectReason::TypeMismatch {
                field,
                expected: None,
            } => write!(f, "type_mismatch:{field}"),
        }
    }
}

/// Check one document against a governing schema.
///
/// Returns `Ok(())` for an acceptable document and the first
/// [RejectReason] encountered otherwise: required fields are checked before
/// types, both in lexicographic-ish schema order, so the failure a document
/// reports is deterministic.
pub fn validate(
    document: &Value,
    schema: &Schema,
    stats: Option<&FieldStats>,
    mode: ValidationMode,
    config: &Config,
) -> Result<(), RejectReason> {
    let Value::Object(fields) = document else {
        return Err(RejectReason::NotAnObject);
    };

    // 1) Required fields.
    match (&schema.required, mode) {
        (Some(required), _) => {
            for field in required {
                if !fields.contains_key(field) {
                    return Err(RejectReason::MissingRequired {
                        field: field.clone(),
                        explicit: true,
                    });
                }
            }
        }
        (None, ValidationMode::Strict) => {
            if let Some(stats) = stats {
                for (field, stat) in stats {
                    if stat.present_pct >= config.required_pct && !fields.contains_key(field) {
                        return Err(RejectReason::MissingRequired {
                            field: field.clone(),
                            explicit: false,
                        });
                    }
                }
            }
        }
        (None, ValidationMode::Lenient) => {}
    }

    // 2) Type compatibility for every field the schema knows about.
    for (field, value) in fields {
        if let Some(def) = schema.properties.get(field) {
            if !is_compatible(value, def, config) {
                return Err(RejectReason::TypeMismatch {
                    field: field.clone(),
                    expected: def.types.single(),
                });
            }
        }
    }

    Ok(())
}

/// Whether a value satisfies a property definition.
///
/// A single disjoint match over the classified tag: direct membership
/// first, then the numeric bridges (`integer` always satisfies `number`, an
/// integral `number` satisfies an `integer`-only definition), then the
/// optional promotions (numbers into `string`, numeric strings into
/// `number`). Booleans get no bridge anywhere.
fn is_compatible(value: &Value, def: &PropertyDef, config: &Config) -> bool {
    if def.types.is_empty() {
        return true;
    }

    let tag = classify(value);
    if def.types.contains(tag) {
        return true;
    }

    match tag {
        TypeTag::Integer => {
            def.types.contains(TypeTag::Number)
                || (config.allow_type_promotion && def.types.contains(TypeTag::String))
        }
        TypeTag::Number => {
            (is_integral(value) && def.types.contains(TypeTag::Integer))
                || (config.allow_type_promotion && def.types.contains(TypeTag::String))
        }
        TypeTag::String => {
            config.allow_type_promotion
                && def.types.contains(TypeTag::Number)
                && parses_as_finite_number(value)
        }
        _ => false,
    }
}

/// `true` for a float that is mathematically a whole number, like `3.0`.
fn is_integral(value: &Value) -> bool {
    value
        .as_f64()
        .is_some_and(|float| float.is_finite() && float.fract() == 0.0)
}

/// `true` for a string that parses as a finite decimal.
fn parses_as_finite_number(value: &Value) -> bool {
    value
        .as_str()
        .and_then(|text| text.trim().parse::<f64>().ok())
        .is_some_and(f64::is_finite)
}
