//! Update operator application.
//!
//! [`OperatorUpdater`] is the default [`UpdateSynthesizer`]. It derives the next
//! state of a document from either a replacement document or a set of update
//! operators, and rejects specifications a MongoDB server would reject: operators
//! mixed with plain fields, two operators touching the same path, arithmetic on
//! non-numeric values and changes to `_id`.

use std::cmp::Ordering;

use bson::{Bson, Document, Timestamp};

use docmock_core::{
    compare::{as_f64, compare_values, optional_values_equal, values_equal},
    document::{DocumentExt, ID_FIELD, is_operator},
    error::{DocMockError, DocMockResult},
    update::{UpdateMode, UpdateSynthesizer, is_operator_update},
};

use crate::evaluator::element_matches;

/// The default update synthesizer.
///
/// Supported operators: `$set`, `$unset`, `$inc`, `$mul`, `$min`, `$max`, `$rename`,
/// `$push` (with `$each`, `$slice` and `$position`), `$addToSet` (with `$each`),
/// `$pull`, `$pop`, `$currentDate` and `$setOnInsert`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OperatorUpdater;

impl UpdateSynthesizer for OperatorUpdater {
    fn apply(&self, document: &Document, update: &Document, mode: UpdateMode) -> DocMockResult<Document> {
        let updated = if is_operator_update(update) {
            apply_operators(document, update, mode)?
        } else {
            replace(document, update)?
        };

        if document.contains_key(ID_FIELD) && !optional_values_equal(document.id(), updated.id()) {
            return Err(DocMockError::InvalidState(
                "the (immutable) field '_id' was found to have been altered".into(),
            ));
        }

        Ok(updated)
    }
}

fn replace(document: &Document, replacement: &Document) -> DocMockResult<Document> {
    if let Some(operator) = replacement.keys().find(|key| is_operator(key)) {
        return Err(DocMockError::InvalidState(format!(
            "replacement document can not contain the operator {operator}"
        )));
    }

    let mut replaced = Document::new();
    if let Some(id) = replacement.id().or(document.id()) {
        replaced.insert(ID_FIELD, id.clone());
    }
    for (key, value) in replacement.iter().filter(|(key, _)| key.as_str() != ID_FIELD) {
        replaced.insert(key.clone(), value.clone());
    }

    Ok(replaced)
}

fn apply_operators(document: &Document, update: &Document, mode: UpdateMode) -> DocMockResult<Document> {
    let mut updated = document.clone();
    let mut touched = TouchedPaths::default();

    for (operator, fields) in update {
        let fields = match fields {
            Bson::Document(fields) => fields,
            _ if !is_operator(operator) => {
                return Err(DocMockError::InvalidState(format!(
                    "cannot mix update operators with the plain field '{operator}'"
                )));
            }
            other => {
                return Err(DocMockError::InvalidState(format!("{operator} needs a document, got {other}")));
            }
        };

        if operator == "$setOnInsert" && mode == UpdateMode::Matched {
            continue;
        }

        for (path, argument) in fields {
            touched.claim(path)?;

            match operator.as_str() {
                "$set" | "$setOnInsert" => updated.set_path(path, argument.clone())?,
                "$unset" => {
                    updated.remove_path(path);
                }
                "$inc" => {
                    let next = arithmetic(updated.get_path(path), argument, Arithmetic::Add, path)?;
                    updated.set_path(path, next)?;
                }
                "$mul" => {
                    let next = arithmetic(updated.get_path(path), argument, Arithmetic::Multiply, path)?;
                    updated.set_path(path, next)?;
                }
                "$min" | "$max" => {
                    let wanted = if operator == "$min" { Ordering::Less } else { Ordering::Greater };
                    let current = updated.get_path(path);
                    if current.is_none() || compare_values(Some(argument), current) == wanted {
                        updated.set_path(path, argument.clone())?;
                    }
                }
                "$rename" => {
                    let target = argument.as_str().ok_or_else(|| {
                        DocMockError::InvalidState(format!("$rename target for '{path}' must be a string"))
                    })?;
                    touched.claim(target)?;
                    if let Some(value) = updated.remove_path(path) {
                        updated.set_path(target, value)?;
                    }
                }
                "$push" => push(&mut updated, path, argument)?,
                "$addToSet" => add_to_set(&mut updated, path, argument)?,
                "$pull" => pull(&mut updated, path, argument)?,
                "$pop" => pop(&mut updated, path, argument)?,
                "$currentDate" => updated.set_path(path, current_date(argument)?)?,
                unknown if is_operator(unknown) => {
                    return Err(DocMockError::NotSupported(format!("update operator {unknown}")));
                }
                plain => {
                    return Err(DocMockError::InvalidState(format!(
                        "cannot mix update operators with the plain field '{plain}'"
                    )));
                }
            }
        }
    }

    Ok(updated)
}

/// Paths already modified by the update. Two operators may not touch the same path
/// or a path and one of its ancestors.
#[derive(Default)]
struct TouchedPaths(Vec<String>);

impl TouchedPaths {
    fn claim(&mut self, path: &str) -> DocMockResult<()> {
        let overlaps = |other: &String| {
            other == path
                || other.strip_prefix(path).is_some_and(|rest| rest.starts_with('.'))
                || path.strip_prefix(other.as_str()).is_some_and(|rest| rest.starts_with('.'))
        };

        if let Some(existing) = self.0.iter().find(|other| overlaps(other)) {
            return Err(DocMockError::InvalidState(format!(
                "updating the path '{path}' would create a conflict at '{existing}'"
            )));
        }

        self.0.push(path.to_string());
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Arithmetic {
    Add,
    Multiply,
}

impl Arithmetic {
    fn ints(self, a: i64, b: i64) -> Option<i64> {
        match self {
            Arithmetic::Add => a.checked_add(b),
            Arithmetic::Multiply => a.checked_mul(b),
        }
    }

    fn floats(self, a: f64, b: f64) -> f64 {
        match self {
            Arithmetic::Add => a + b,
            Arithmetic::Multiply => a * b,
        }
    }
}

/// Applies `$inc`/`$mul`. 32-bit results that overflow widen to 64 bits, 64-bit
/// results that overflow widen to doubles.
fn arithmetic(current: Option<&Bson>, operand: &Bson, op: Arithmetic, path: &str) -> DocMockResult<Bson> {
    let Some(factor) = as_f64(operand) else {
        return Err(DocMockError::InvalidState(format!(
            "cannot increment with non-numeric argument {{ {path}: {operand} }}"
        )));
    };

    let current = match current {
        Some(value) => value.clone(),
        None => match op {
            Arithmetic::Add => Bson::Int32(0),
            Arithmetic::Multiply => match operand {
                Bson::Double(_) => Bson::Double(0.0),
                Bson::Int64(_) => Bson::Int64(0),
                _ => Bson::Int32(0),
            },
        },
    };

    let result = match (&current, operand) {
        (Bson::Int32(a), Bson::Int32(b)) => match op.ints(*a as i64, *b as i64) {
            Some(value) => i32::try_from(value).map(Bson::Int32).unwrap_or(Bson::Int64(value)),
            None => Bson::Double(op.floats(*a as f64, *b as f64)),
        },
        (Bson::Int32(_) | Bson::Int64(_), Bson::Int32(_) | Bson::Int64(_)) => {
            let (a, b) = (integer(&current), integer(operand));
            match op.ints(a, b) {
                Some(value) => Bson::Int64(value),
                None => Bson::Double(op.floats(a as f64, b as f64)),
            }
        }
        (Bson::Int32(a), _) => Bson::Double(op.floats(*a as f64, factor)),
        (Bson::Int64(a), _) => Bson::Double(op.floats(*a as f64, factor)),
        (Bson::Double(a), _) => Bson::Double(op.floats(*a, factor)),
        (other, _) => {
            return Err(DocMockError::InvalidState(format!(
                "cannot apply arithmetic to '{path}' with non-numeric value {other}"
            )));
        }
    };

    Ok(result)
}

fn integer(value: &Bson) -> i64 {
    match value {
        Bson::Int32(value) => *value as i64,
        Bson::Int64(value) => *value,
        _ => 0,
    }
}

fn array_at<'d>(document: &'d mut Document, path: &str) -> DocMockResult<&'d mut Vec<Bson>> {
    if document.get_path(path).is_none() {
        document.set_path(path, Bson::Array(Vec::new()))?;
    }

    match path_mut(document, path) {
        Some(Bson::Array(items)) => Ok(items),
        Some(other) => Err(DocMockError::InvalidState(format!(
            "the field '{path}' must be an array but is of type {:?}",
            other.element_type()
        ))),
        None => Err(DocMockError::InvalidState(format!("cannot resolve the field '{path}'"))),
    }
}

fn path_mut<'d>(document: &'d mut Document, path: &str) -> Option<&'d mut Bson> {
    let mut parts = path.split('.');
    let mut current = document.get_mut(parts.next()?)?;

    for part in parts {
        current = match current {
            Bson::Document(doc) => doc.get_mut(part)?,
            Bson::Array(items) => items.get_mut(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Splits a `$push`/`$addToSet` argument into the values to add and its modifiers.
fn each_values(argument: &Bson) -> DocMockResult<(Vec<Bson>, Option<&Document>)> {
    match argument {
        Bson::Document(modifiers) if modifiers.contains_key("$each") => match modifiers.get("$each") {
            Some(Bson::Array(values)) => Ok((values.clone(), Some(modifiers))),
            _ => Err(DocMockError::InvalidState("$each needs an array".into())),
        },
        value => Ok((vec![value.clone()], None)),
    }
}

fn push(document: &mut Document, path: &str, argument: &Bson) -> DocMockResult<()> {
    let (values, modifiers) = each_values(argument)?;
    let items = array_at(document, path)?;

    let position = modifiers
        .and_then(|modifiers| modifiers.get("$position"))
        .and_then(as_f64)
        .map(|position| {
            if position < 0.0 {
                items.len().saturating_sub(position.abs() as usize)
            } else {
                (position as usize).min(items.len())
            }
        })
        .unwrap_or(items.len());

    items.splice(position..position, values);

    if let Some(slice) = modifiers.and_then(|modifiers| modifiers.get("$slice")).and_then(as_f64) {
        let slice = slice as i64;
        if slice >= 0 {
            items.truncate(slice as usize);
        } else {
            let keep = slice.unsigned_abs() as usize;
            let drop = items.len().saturating_sub(keep);
            items.drain(..drop);
        }
    }

    Ok(())
}

fn add_to_set(document: &mut Document, path: &str, argument: &Bson) -> DocMockResult<()> {
    let (values, _) = each_values(argument)?;
    let items = array_at(document, path)?;

    for value in values {
        if !items.iter().any(|item| values_equal(item, &value)) {
            items.push(value);
        }
    }

    Ok(())
}

fn pull(document: &mut Document, path: &str, condition: &Bson) -> DocMockResult<()> {
    let Some(Bson::Array(items)) = path_mut(document, path) else {
        return Ok(());
    };

    let mut kept = Vec::with_capacity(items.len());
    for item in items.drain(..) {
        if !element_matches(&item, condition)? {
            kept.push(item);
        }
    }
    *items = kept;

    Ok(())
}

fn pop(document: &mut Document, path: &str, argument: &Bson) -> DocMockResult<()> {
    let from_front = match as_f64(argument) {
        Some(direction) if direction == -1.0 => true,
        Some(direction) if direction == 1.0 => false,
        _ => return Err(DocMockError::InvalidState(format!("$pop on '{path}' needs 1 or -1"))),
    };

    match path_mut(document, path) {
        Some(Bson::Array(items)) if !items.is_empty() => {
            if from_front {
                items.remove(0);
            } else {
                items.pop();
            }
            Ok(())
        }
        Some(Bson::Array(_)) | None => Ok(()),
        Some(_) => Err(DocMockError::InvalidState(format!("$pop on '{path}' needs an array"))),
    }
}

fn current_date(argument: &Bson) -> DocMockResult<Bson> {
    let now = chrono::Utc::now();

    match argument {
        Bson::Boolean(true) => Ok(Bson::DateTime(bson::DateTime::from_chrono(now))),
        Bson::Document(spec) => match spec.get_str("$type") {
            Ok("date") => Ok(Bson::DateTime(bson::DateTime::from_chrono(now))),
            Ok("timestamp") => Ok(Bson::Timestamp(Timestamp { time: now.timestamp() as u32, increment: 1 })),
            _ => Err(DocMockError::InvalidState("$currentDate $type must be 'date' or 'timestamp'".into())),
        },
        other => Err(DocMockError::InvalidState(format!("$currentDate needs true or a $type document, got {other}"))),
    }
}
