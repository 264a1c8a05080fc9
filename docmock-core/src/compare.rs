//! MongoDB-style value ordering and equality.
//!
//! Values of different BSON types order by a fixed type rank
//! (`null < numbers < strings < objects < arrays < binary < ObjectId < booleans <
//! dates < timestamps < regexes`); values of the same type order naturally. A
//! missing field sorts with `null` but is never *equal* to `null`.

use std::cmp::Ordering;

use bson::Bson;

/// Returns the sort rank of a value's type. `None` stands for a missing field.
pub fn type_rank(value: Option<&Bson>) -> u8 {
    match value {
        Some(Bson::MinKey) => 0,
        None | Some(Bson::Null) | Some(Bson::Undefined) => 1,
        Some(Bson::Int32(_)) | Some(Bson::Int64(_)) | Some(Bson::Double(_)) | Some(Bson::Decimal128(_)) => 2,
        Some(Bson::String(_)) | Some(Bson::Symbol(_)) => 3,
        Some(Bson::Document(_)) => 4,
        Some(Bson::Array(_)) => 5,
        Some(Bson::Binary(_)) => 6,
        Some(Bson::ObjectId(_)) => 7,
        Some(Bson::Boolean(_)) => 8,
        Some(Bson::DateTime(_)) => 9,
        Some(Bson::Timestamp(_)) => 10,
        Some(Bson::RegularExpression(_)) => 11,
        Some(Bson::DbPointer(_)) => 12,
        Some(Bson::JavaScriptCode(_)) | Some(Bson::JavaScriptCodeWithScope(_)) => 13,
        Some(Bson::MaxKey) => 14,
    }
}

/// Returns the value as a float if it is numeric.
pub fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(*v as f64),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some(*v as i64),
        Bson::Int64(v) => Some(*v),
        _ => None,
    }
}

/// Totally orders two (possibly missing) values.
pub fn compare_values(left: Option<&Bson>, right: Option<&Bson>) -> Ordering {
    let by_rank = type_rank(left).cmp(&type_rank(right));
    if by_rank != Ordering::Equal {
        return by_rank;
    }

    match (left, right) {
        (Some(left), Some(right)) => compare_same_rank(left, right),
        _ => Ordering::Equal,
    }
}

fn compare_same_rank(left: &Bson, right: &Bson) -> Ordering {
    match (left, right) {
        (Bson::String(a), Bson::String(b)) => a.cmp(b),
        (Bson::Symbol(a), Bson::Symbol(b)) => a.cmp(b),
        (Bson::String(a), Bson::Symbol(b)) | (Bson::Symbol(a), Bson::String(b)) => a.cmp(b),
        (Bson::Document(a), Bson::Document(b)) => {
            for ((left_key, left_value), (right_key, right_value)) in a.iter().zip(b.iter()) {
                let ordering = left_key
                    .cmp(right_key)
                    .then_with(|| compare_values(Some(left_value), Some(right_value)));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            a.len().cmp(&b.len())
        }
        (Bson::Array(a), Bson::Array(b)) => {
            for (left_item, right_item) in a.iter().zip(b.iter()) {
                let ordering = compare_values(Some(left_item), Some(right_item));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            a.len().cmp(&b.len())
        }
        (Bson::Binary(a), Bson::Binary(b)) => a.bytes.cmp(&b.bytes),
        (Bson::ObjectId(a), Bson::ObjectId(b)) => a.cmp(b),
        (Bson::Boolean(a), Bson::Boolean(b)) => a.cmp(b),
        (Bson::DateTime(a), Bson::DateTime(b)) => a.cmp(b),
        (Bson::Timestamp(a), Bson::Timestamp(b)) => (a.time, a.increment).cmp(&(b.time, b.increment)),
        (Bson::RegularExpression(a), Bson::RegularExpression(b)) => a
            .pattern
            .as_str()
            .cmp(b.pattern.as_str())
            .then_with(|| a.options.as_str().cmp(b.options.as_str())),
        (a, b) => match (as_i64(a), as_i64(b)) {
            (Some(a), Some(b)) => a.cmp(&b),
            // Decimal128 and NaN compare equal to everything numeric
            _ => match (as_f64(a), as_f64(b)) {
                (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            },
        },
    }
}

/// Returns `true` if both values are present and compare equal.
///
/// Numbers compare by value across integer and float types.
pub fn values_equal(left: &Bson, right: &Bson) -> bool {
    match (left, right) {
        (Bson::Null, Bson::Null) | (Bson::Undefined, Bson::Undefined) => true,
        (Bson::Null, Bson::Undefined) | (Bson::Undefined, Bson::Null) => false,
        (Bson::Decimal128(a), Bson::Decimal128(b)) => a == b,
        (Bson::Document(a), Bson::Document(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .zip(b.iter())
                    .all(|((left_key, left_value), (right_key, right_value))| {
                        left_key == right_key && values_equal(left_value, right_value)
                    })
        }
        (Bson::Array(a), Bson::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y))
        }
        _ => type_rank(Some(left)) == type_rank(Some(right))
            && compare_same_rank(left, right) == Ordering::Equal,
    }
}

/// Equality over possibly missing values: two missing values are equal, a missing
/// value never equals a present one (not even `null`).
pub fn optional_values_equal(left: Option<&Bson>, right: Option<&Bson>) -> bool {
    match (left, right) {
        (None, None) => true,
        (Some(a), Some(b)) => values_equal(a, b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId, DateTime};
    use proptest::prelude::*;

    #[test]
    fn cross_type_values_order_by_rank() {
        let ordered = vec![
            Bson::Null,
            Bson::Int32(42),
            Bson::String("foo".into()),
            Bson::Document(doc! { "a": 1 }),
            Bson::Array(vec![Bson::Int32(1)]),
            Bson::ObjectId(ObjectId::new()),
            Bson::Boolean(true),
            Bson::DateTime(DateTime::now()),
        ];

        for pair in ordered.windows(2) {
            assert_eq!(compare_values(Some(&pair[0]), Some(&pair[1])), Ordering::Less);
        }
    }

    #[test]
    fn missing_sorts_with_null_but_is_not_equal() {
        assert_eq!(compare_values(None, Some(&Bson::Null)), Ordering::Equal);
        assert!(!optional_values_equal(None, Some(&Bson::Null)));
        assert!(optional_values_equal(None, None));
    }

    #[test]
    fn numbers_compare_across_widths() {
        assert!(values_equal(&Bson::Int32(1), &Bson::Double(1.0)));
        assert!(values_equal(&Bson::Int64(7), &Bson::Int32(7)));
        assert_eq!(compare_values(Some(&Bson::Double(1.5)), Some(&Bson::Int64(2))), Ordering::Less);
    }

    #[test]
    fn documents_compare_field_by_field() {
        let a = Bson::Document(doc! { "a": 1, "b": 2 });
        let b = Bson::Document(doc! { "a": 1, "b": 3 });

        assert_eq!(compare_values(Some(&a), Some(&b)), Ordering::Less);
        assert!(!values_equal(&a, &b));
        assert!(values_equal(&a, &Bson::Document(doc! { "a": 1.0, "b": 2 })));
    }

    fn scalar() -> impl Strategy<Value = Bson> {
        prop_oneof![
            Just(Bson::Null),
            any::<i32>().prop_map(Bson::Int32),
            any::<i64>().prop_map(Bson::Int64),
            (-1.0e9..1.0e9f64).prop_map(Bson::Double),
            "[a-z]{0,6}".prop_map(Bson::String),
            any::<bool>().prop_map(Bson::Boolean),
        ]
    }

    proptest! {
        #[test]
        fn ordering_is_antisymmetric(a in scalar(), b in scalar()) {
            prop_assert_eq!(
                compare_values(Some(&a), Some(&b)),
                compare_values(Some(&b), Some(&a)).reverse()
            );
        }

        #[test]
        fn equal_values_compare_equal(a in scalar(), b in scalar()) {
            if values_equal(&a, &b) {
                prop_assert_eq!(compare_values(Some(&a), Some(&b)), Ordering::Equal);
            }
        }
    }
}
