//! A module holding the crate's public traits.

/**
This trait defines a way to merge two instances of the same type.

It is how per-document observations become a batch-level picture: each
document contributes a tiny schema and a handful of field observations, and
the accumulator absorbs them one at a time.

```
# use chrysalis::{Schema, PropertyDef, TypeTag, Coalesce};
#
let mut merged = Schema::default();

let mut first = Schema::default();
first.properties.insert("id".into(), PropertyDef::single(TypeTag::Integer));

let mut second = Schema::default();
second.properties.insert("id".into(), PropertyDef::single(TypeTag::String));

merged.coalesce(first);
merged.coalesce(second);

assert_eq!(
    merged.properties["id"],
    PropertyDef::any_of([TypeTag::Integer, TypeTag::String]),
);
```
*/
pub trait Coalesce: Sized {
    /// Merge `other` into `self`.
    fn coalesce(&mut self, other: Self);
}
impl Coalesce for () {
    fn coalesce(&mut self, _other: Self) {}
}
impl<K: Ord, V: Coalesce> Coalesce for std::collections::BTreeMap<K, V> {
    fn coalesce(&mut self, other: Self) {
        for (key, value) in other {
            match self.entry(key) {
                std::collections::btree_map::Entry::Occupied(mut entry) => {
                    entry.get_mut().coalesce(value);
                }
                std::collections::btree_map::Entry::Vacant(entry) => {
                    entry.insert(value);
                }
            }
        }
    }
}

/// This trait defines an interface used for types that need to receive values
/// one at a time to record something about them.
///
/// V is ?[Sized] to allow aggregating over unsized borrows.
pub trait Aggregate<V: ?Sized> {
    /// Run the internal logic on value
    fn aggregate(&mut self, value: &'_ V);
}
impl<T: ?Sized> Aggregate<T> for () {
    fn aggregate(&mut self, _value: &'_ T) {}
}

/// This trait checks whether the shape of two objects is the same.
/// The goal is to determine whether two representations are equivalent.
///
/// Example: two schemas inferred from differently-ordered documents are
///  structurally equivalent even though their field order differed on input.
///
/// Notes:
///  - sample-dependent metadata should be ignored.
///  - comparison happens on the canonical form, so key order is irrelevant.
///
/// This trait closely mirrors [PartialEq].
pub trait StructuralEq<Rhs: ?Sized = Self> {
    /// Returns `true` if `self` and `other` share the same structure.
    fn structural_eq(&self, other: &Rhs) -> bool;

    /// Returns `true` if `self` and `other` DO NOT share the same structure.
    fn structural_ne(&self, other: &Rhs) -> bool {
        !self.structural_eq(other)
    }
}
impl<T: StructuralEq> StructuralEq for Option<T> {
    fn structural_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(s), Some(o)) => s.structural_eq(o),
            (Some(_), None) | (None, Some(_)) => false,
            (None, None) => true,
        }
    }
}
