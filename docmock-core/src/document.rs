//! Document helpers: dot-path access and typed conversion.
//!
//! Stored documents are plain [`bson::Document`] values. This module adds the few
//! operations the engine needs on top of them: reading, writing and removing values
//! addressed by dot paths (`"address.city"`, `"items.0.sku"`), and converting typed
//! Serde values to and from documents.

use bson::{Bson, Document, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::{DocMockError, DocMockResult};

/// The name of the primary key field every stored document carries.
pub const ID_FIELD: &str = "_id";

/// The most `null` elements a positional write may pad an array with.
pub const MAX_ARRAY_PADDING: usize = 1_500_000;

/// Returns `true` if the key names an operator (`$set`, `$and`, ...).
pub fn is_operator(key: &str) -> bool {
    key.starts_with('$')
}

/// Extension trait providing path access on BSON documents.
///
/// Paths are split on `.`; a numeric segment addresses an array element when the
/// value at that level is an array.
pub trait DocumentExt {
    /// Returns the document's `_id`, if it has one.
    fn id(&self) -> Option<&Bson>;

    /// Returns the value at `path`, if every segment resolves.
    fn get_path(&self, path: &str) -> Option<&Bson>;

    /// Writes `value` at `path`, creating intermediate documents as needed.
    ///
    /// # Errors
    ///
    /// Returns [`DocMockError::InvalidState`] if an intermediate segment holds a scalar,
    /// a non-numeric segment addresses an array, or an index lies more than
    /// [`MAX_ARRAY_PADDING`] elements past the end of an array.
    fn set_path(&mut self, path: &str, value: Bson) -> DocMockResult<()>;

    /// Removes the value at `path` and returns it.
    ///
    /// Array elements are nulled rather than removed so that sibling positions are kept.
    fn remove_path(&mut self, path: &str) -> Option<Bson>;
}

impl DocumentExt for Document {
    fn id(&self) -> Option<&Bson> {
        self.get(ID_FIELD)
    }

    fn get_path(&self, path: &str) -> Option<&Bson> {
        let mut parts = path.split('.');
        let mut current = self.get(parts.next()?)?;

        for part in parts {
            current = match current {
                Bson::Document(doc) => doc.get(part)?,
                Bson::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }

        Some(current)
    }

    fn set_path(&mut self, path: &str, value: Bson) -> DocMockResult<()> {
        let parts = path.split('.').collect::<Vec<_>>();
        set_in_document(self, &parts, value, path)
    }

    fn remove_path(&mut self, path: &str) -> Option<Bson> {
        let parts = path.split('.').collect::<Vec<_>>();
        remove_in_document(self, &parts)
    }
}

fn set_in_document(doc: &mut Document, parts: &[&str], value: Bson, path: &str) -> DocMockResult<()> {
    let (head, rest) = match parts.split_first() {
        Some(split) => split,
        None => return Err(DocMockError::InvalidArgument("empty field path".into())),
    };

    if rest.is_empty() {
        doc.insert(head.to_string(), value);
        return Ok(());
    }

    let child = doc.entry(head.to_string()).or_insert(Bson::Null);
    if matches!(child, Bson::Null) {
        *child = Bson::Document(Document::new());
    }

    set_in_value(child, rest, value, path)
}

fn set_in_value(target: &mut Bson, parts: &[&str], value: Bson, path: &str) -> DocMockResult<()> {
    match target {
        Bson::Document(doc) => set_in_document(doc, parts, value, path),
        Bson::Array(items) => {
            let index = parts[0].parse::<usize>().map_err(|_| {
                DocMockError::InvalidState(format!("cannot use the part '{}' of '{path}' to traverse an array", parts[0]))
            })?;

            if items.len() <= index {
                let padding = index - items.len();
                if padding > MAX_ARRAY_PADDING {
                    return Err(DocMockError::InvalidState(format!(
                        "can't backfill '{path}' with more than {MAX_ARRAY_PADDING} elements"
                    )));
                }
                items.resize(index + 1, Bson::Null);
            }

            if parts.len() == 1 {
                items[index] = value;
                return Ok(());
            }

            if items[index] == Bson::Null {
                items[index] = Bson::Document(Document::new());
            }

            set_in_value(&mut items[index], &parts[1..], value, path)
        }
        other => Err(DocMockError::InvalidState(format!(
            "cannot create field '{}' in element {other}", parts[0]
        ))),
    }
}

fn remove_in_document(doc: &mut Document, parts: &[&str]) -> Option<Bson> {
    let (head, rest) = parts.split_first()?;

    if rest.is_empty() {
        return doc.remove(*head);
    }

    match doc.get_mut(*head)? {
        Bson::Document(child) => remove_in_document(child, rest),
        Bson::Array(items) => remove_in_array(items, rest),
        _ => None,
    }
}

fn remove_in_array(items: &mut [Bson], parts: &[&str]) -> Option<Bson> {
    let index = parts[0].parse::<usize>().ok()?;
    let item = items.get_mut(index)?;

    if parts.len() == 1 {
        return Some(std::mem::replace(item, Bson::Null));
    }

    match item {
        Bson::Document(child) => remove_in_document(child, &parts[1..]),
        Bson::Array(nested) => remove_in_array(nested, &parts[1..]),
        _ => None,
    }
}

/// Converts a typed value into a document.
///
/// # Errors
///
/// Returns an error if serialization fails or the value does not serialize to a document.
pub fn to_document<T: Serialize>(value: &T) -> DocMockResult<Document> {
    match serialize_to_bson(value)? {
        Bson::Document(doc) => Ok(doc),
        other => Err(DocMockError::Serialization(format!("expected a document, got {other}"))),
    }
}

/// Creates a typed value from a document.
///
/// # Errors
///
/// Returns an error if deserialization fails or the structure is invalid.
pub fn from_document<T: DeserializeOwned>(doc: Document) -> DocMockResult<T> {
    Ok(deserialize_from_bson(Bson::Document(doc))?)
}
