//! Query document evaluation for in-memory document filtering.
//!
//! This module provides [`MatchEvaluator`], the default [`PredicateEvaluator`]. It
//! understands the common subset of MongoDB's query language: implicit equality,
//! dot paths that fan out over arrays, comparison and membership operators, regular
//! expressions, array operators and the logical combinators.

use std::cmp::Ordering;

use bson::{Bson, Document};
use regex::{Regex, RegexBuilder};

use docmock_core::{
    compare::{as_f64, compare_values, type_rank, values_equal},
    document::is_operator,
    error::{DocMockError, DocMockResult},
    query::PredicateEvaluator,
};

/// The default predicate evaluator.
///
/// # Example
///
/// ```ignore
/// use docmock_memory::MatchEvaluator;
/// use docmock_core::query::PredicateEvaluator;
///
/// let query = doc! { "age": { "$gte": 18 }, "tags": "admin" };
/// let user = doc! { "age": 30, "tags": ["admin", "ops"] };
/// assert!(MatchEvaluator.matches(&query, &user)?);
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct MatchEvaluator;

impl PredicateEvaluator for MatchEvaluator {
    fn matches(&self, query: &Document, document: &Document) -> DocMockResult<bool> {
        DocumentEvaluator::new(document).evaluate(query)
    }
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&self, query: &Document) -> DocMockResult<bool> {
        for (key, condition) in query {
            let matched = match key.as_str() {
                "$and" => self.visit_and(clauses(key, condition)?)?,
                "$or" => self.visit_or(clauses(key, condition)?)?,
                "$nor" => !self.visit_or(clauses(key, condition)?)?,
                "$comment" => true,
                operator if is_operator(operator) => {
                    return Err(DocMockError::NotSupported(format!("query operator {operator}")));
                }
                path => self.visit_field(path, condition)?,
            };

            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_and(&self, clauses: Vec<&Document>) -> DocMockResult<bool> {
        for clause in clauses {
            if !self.evaluate(clause)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&self, clauses: Vec<&Document>) -> DocMockResult<bool> {
        for clause in clauses {
            if self.evaluate(clause)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_field(&self, path: &str, condition: &Bson) -> DocMockResult<bool> {
        let values = resolve(self.document, path);

        match condition {
            Bson::Document(operators) if operators.keys().next().is_some_and(|key| is_operator(key)) => {
                evaluate_operators(&values, operators)
            }
            target => Ok(equals_any(&values, target)),
        }
    }
}

fn clauses<'q>(operator: &str, value: &'q Bson) -> DocMockResult<Vec<&'q Document>> {
    let invalid = || DocMockError::InvalidArgument(format!("{operator} needs an array of documents"));

    match value {
        Bson::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| item.as_document().ok_or_else(invalid))
            .collect(),
        _ => Err(invalid()),
    }
}

/// Collects the values a dot path reaches. Arrays met along the way fan out over
/// their elements; an empty result means the field is missing.
fn resolve<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let parts = path.split('.').collect::<Vec<_>>();
    let mut found = Vec::new();

    if let Some(value) = document.get(parts[0]) {
        descend(value, &parts[1..], &mut found);
    }

    found
}

fn descend<'a>(value: &'a Bson, parts: &[&str], found: &mut Vec<&'a Bson>) {
    let Some((head, rest)) = parts.split_first() else {
        found.push(value);
        return;
    };

    match value {
        Bson::Document(doc) => {
            if let Some(child) = doc.get(*head) {
                descend(child, rest, found);
            }
        }
        Bson::Array(items) => {
            if let Some(item) = head.parse::<usize>().ok().and_then(|index| items.get(index)) {
                descend(item, rest, found);
            }

            for item in items.iter().filter(|item| matches!(item, Bson::Document(_))) {
                descend(item, parts, found);
            }
        }
        _ => {}
    }
}

/// Each value, followed by its elements if it is an array.
fn expand<'a>(values: &[&'a Bson]) -> Vec<&'a Bson> {
    let mut expanded = Vec::with_capacity(values.len());

    for value in values {
        expanded.push(*value);
        if let Bson::Array(items) = value {
            expanded.extend(items.iter());
        }
    }

    expanded
}

fn equals_any(values: &[&Bson], target: &Bson) -> bool {
    match target {
        Bson::Null => values.is_empty() || expand(values).iter().any(|value| matches!(value, Bson::Null)),
        Bson::RegularExpression(regex) => match build_regex(regex.pattern.as_str(), regex.options.as_str()) {
            Ok(regex) => matches_regex(values, &regex),
            Err(_) => false,
        },
        target => expand(values).iter().any(|value| values_equal(value, target)),
    }
}

fn evaluate_operators(values: &[&Bson], operators: &Document) -> DocMockResult<bool> {
    for (operator, argument) in operators {
        let matched = match operator.as_str() {
            "$eq" => equals_any(values, argument),
            "$ne" => !equals_any(values, argument),
            "$gt" => compare_any(values, argument, |ordering| ordering == Ordering::Greater),
            "$gte" => compare_any(values, argument, |ordering| ordering != Ordering::Less),
            "$lt" => compare_any(values, argument, |ordering| ordering == Ordering::Less),
            "$lte" => compare_any(values, argument, |ordering| ordering != Ordering::Greater),
            "$in" => in_any(values, array_argument(operator, argument)?),
            "$nin" => !in_any(values, array_argument(operator, argument)?),
            "$exists" => !values.is_empty() == truthy(argument),
            "$regex" => {
                let options = operators.get_str("$options").unwrap_or_default();
                match argument {
                    Bson::String(pattern) => matches_regex(values, &build_regex(pattern, options)?),
                    Bson::RegularExpression(regex) => {
                        let options = if options.is_empty() { regex.options.as_str() } else { options };
                        matches_regex(values, &build_regex(regex.pattern.as_str(), options)?)
                    }
                    other => {
                        return Err(DocMockError::InvalidArgument(format!("$regex needs a string, got {other}")));
                    }
                }
            }
            "$options" => true,
            "$size" => {
                let size = as_f64(argument)
                    .ok_or_else(|| DocMockError::InvalidArgument("$size needs a number".into()))?;
                values
                    .iter()
                    .any(|value| matches!(value, Bson::Array(items) if items.len() as f64 == size))
            }
            "$all" => {
                let required = array_argument(operator, argument)?;
                !required.is_empty() && required.iter().all(|item| equals_any(values, item))
            }
            "$elemMatch" => {
                let spec = argument
                    .as_document()
                    .ok_or_else(|| DocMockError::InvalidArgument("$elemMatch needs a document".into()))?;
                elem_match(values, spec)?
            }
            "$not" => match argument {
                Bson::Document(inner) => !evaluate_operators(values, inner)?,
                Bson::RegularExpression(regex) => {
                    !matches_regex(values, &build_regex(regex.pattern.as_str(), regex.options.as_str())?)
                }
                other => return Err(DocMockError::InvalidArgument(format!("$not needs a document, got {other}"))),
            },
            "$mod" => {
                let (divisor, remainder) = mod_argument(argument)?;
                expand(values)
                    .iter()
                    .filter_map(|value| as_f64(value))
                    .any(|number| (number as i64) % divisor == remainder)
            }
            unknown => return Err(DocMockError::NotSupported(format!("query operator {unknown}"))),
        };

        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Returns `true` if an array element satisfies a `$pull` style condition: an
/// operator document, a sub-query on document elements, or a plain value.
pub(crate) fn element_matches(element: &Bson, condition: &Bson) -> DocMockResult<bool> {
    match condition {
        Bson::Document(spec) if spec.keys().next().is_some_and(|key| is_operator(key)) => {
            evaluate_operators(&[element], spec)
        }
        Bson::Document(spec) => match element {
            Bson::Document(document) => DocumentEvaluator::new(document).evaluate(spec),
            _ => Ok(false),
        },
        target => Ok(values_equal(element, target)),
    }
}

/// Ordered comparison only applies between values of the same type bracket.
fn compare_any(values: &[&Bson], target: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    expand(values).iter().any(|value| {
        type_rank(Some(value)) == type_rank(Some(target)) && accept(compare_values(Some(value), Some(target)))
    })
}

fn in_any(values: &[&Bson], candidates: &[Bson]) -> bool {
    candidates.iter().any(|candidate| equals_any(values, candidate))
}

fn elem_match(values: &[&Bson], spec: &Document) -> DocMockResult<bool> {
    let on_values = spec
        .keys()
        .next()
        .is_some_and(|key| is_operator(key) && !matches!(key.as_str(), "$and" | "$or" | "$nor"));

    for value in values {
        let Bson::Array(items) = value else { continue };

        for item in items {
            let matched = match item {
                Bson::Document(element) if !on_values => DocumentEvaluator::new(element).evaluate(spec)?,
                element if on_values => evaluate_operators(&[element], spec)?,
                _ => false,
            };

            if matched {
                return Ok(true);
            }
        }
    }

    Ok(false)
}

fn array_argument<'q>(operator: &str, argument: &'q Bson) -> DocMockResult<&'q [Bson]> {
    match argument {
        Bson::Array(items) => Ok(items),
        _ => Err(DocMockError::InvalidArgument(format!("{operator} needs an array"))),
    }
}

fn mod_argument(argument: &Bson) -> DocMockResult<(i64, i64)> {
    let invalid = || DocMockError::InvalidArgument("$mod needs [divisor, remainder]".into());

    match argument {
        Bson::Array(items) if items.len() == 2 => {
            let divisor = as_f64(&items[0]).ok_or_else(invalid)? as i64;
            let remainder = as_f64(&items[1]).ok_or_else(invalid)? as i64;
            if divisor == 0 {
                return Err(invalid());
            }
            Ok((divisor, remainder))
        }
        _ => Err(invalid()),
    }
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(flag) => *flag,
        Bson::Null | Bson::Undefined => false,
        other => as_f64(other).is_none_or(|number| number != 0.0),
    }
}

fn build_regex(pattern: &str, options: &str) -> DocMockResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .ignore_whitespace(options.contains('x'))
        .build()
        .map_err(|err| DocMockError::InvalidArgument(format!("invalid regular expression /{pattern}/: {err}")))
}

fn matches_regex(values: &[&Bson], regex: &Regex) -> bool {
    expand(values).iter().any(|value| match value {
        Bson::String(text) | Bson::Symbol(text) => regex.is_match(text),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn matches(query: Document, document: Document) -> bool {
        MatchEvaluator.matches(&query, &document).unwrap()
    }

    #[test]
    fn implicit_equality_reaches_into_arrays() {
        assert!(matches(doc! { "tags": "b" }, doc! { "tags": ["a", "b"] }));
        assert!(matches(doc! { "tags": ["a", "b"] }, doc! { "tags": ["a", "b"] }));
        assert!(!matches(doc! { "tags": "c" }, doc! { "tags": ["a", "b"] }));
    }

    #[test]
    fn null_matches_missing_fields() {
        assert!(matches(doc! { "a": Bson::Null }, doc! { "b": 1 }));
        assert!(matches(doc! { "a": Bson::Null }, doc! { "a": Bson::Null }));
        assert!(!matches(doc! { "a": Bson::Null }, doc! { "a": 0 }));
    }

    #[test]
    fn dot_paths_fan_out_over_array_elements() {
        let order = doc! { "items": [ { "sku": "x", "qty": 1 }, { "sku": "y", "qty": 5 } ] };

        assert!(matches(doc! { "items.sku": "y" }, order.clone()));
        assert!(matches(doc! { "items.1.qty": 5 }, order.clone()));
        assert!(matches(doc! { "items.qty": { "$gt": 4 } }, order.clone()));
        assert!(!matches(doc! { "items.sku": "z" }, order));
    }

    #[test]
    fn comparisons_stay_within_a_type() {
        assert!(matches(doc! { "n": { "$gt": 1 } }, doc! { "n": 2.5 }));
        assert!(!matches(doc! { "n": { "$gt": 1 } }, doc! { "n": "2" }));
        assert!(matches(doc! { "n": { "$gte": 2, "$lt": 3 } }, doc! { "n": 2_i64 }));
    }

    #[test]
    fn membership_and_existence() {
        assert!(matches(doc! { "a": { "$in": [1, 2] } }, doc! { "a": 2 }));
        assert!(matches(doc! { "a": { "$nin": [1, 2] } }, doc! { "a": 3 }));
        assert!(matches(doc! { "a": { "$exists": false } }, doc! { "b": 1 }));
        assert!(matches(doc! { "a": { "$ne": 1 } }, doc! { "b": 1 }));
    }

    #[test]
    fn regex_with_options() {
        assert!(matches(doc! { "name": { "$regex": "^al", "$options": "i" } }, doc! { "name": "Alice" }));
        assert!(!matches(doc! { "name": { "$regex": "^al" } }, doc! { "name": "Alice" }));
    }

    #[test]
    fn array_operators() {
        let doc = doc! { "tags": ["a", "b", "c"], "scores": [ { "v": 3 }, { "v": 9 } ] };

        assert!(matches(doc! { "tags": { "$size": 3 } }, doc.clone()));
        assert!(matches(doc! { "tags": { "$all": ["a", "c"] } }, doc.clone()));
        assert!(matches(doc! { "scores": { "$elemMatch": { "v": { "$gt": 8 } } } }, doc.clone()));
        assert!(!matches(doc! { "scores": { "$elemMatch": { "v": { "$gt": 9 } } } }, doc));
    }

    #[test]
    fn logical_combinators() {
        let doc = doc! { "a": 1, "b": 2 };

        assert!(matches(doc! { "$or": [ { "a": 5 }, { "b": 2 } ] }, doc.clone()));
        assert!(matches(doc! { "$and": [ { "a": 1 }, { "b": 2 } ] }, doc.clone()));
        assert!(!matches(doc! { "$nor": [ { "a": 1 } ] }, doc.clone()));
        assert!(matches(doc! { "a": { "$not": { "$gt": 3 } } }, doc.clone()));
        assert!(matches(doc! { "a": { "$mod": [2, 1] } }, doc));
    }

    #[test]
    fn unknown_operators_are_not_supported() {
        let err = MatchEvaluator.matches(&doc! { "$where": "true" }, &doc! {}).unwrap_err();
        assert!(matches!(err, DocMockError::NotSupported(_)));

        let err = MatchEvaluator.matches(&doc! { "a": { "$near": [0, 0] } }, &doc! { "a": 1 }).unwrap_err();
        assert!(matches!(err, DocMockError::NotSupported(_)));
    }
}
