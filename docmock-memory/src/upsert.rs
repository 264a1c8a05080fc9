//! Building the document an upsert inserts.
//!
//! The literal fields of the filter seed the document: plain `field: value` pairs and
//! `$eq` conditions are copied, `$and` clauses are flattened into the seed, and
//! `$or`/`$nor` clauses are dropped because they do not pin a single value. The update
//! is then applied on top, with `$setOnInsert` active.

use bson::{Bson, Document};

use docmock_core::{
    document::{DocumentExt, ID_FIELD, is_operator},
    error::DocMockResult,
    update::{UpdateMode, is_operator_update, unset_paths},
};

use crate::{client::Engine, store::with_id};

/// Returns the document to insert when `filter` matched nothing, with `_id` first.
///
/// The identifier comes from the filter if it pins one, then from the update, and is
/// generated otherwise.
pub(crate) fn seed_document(filter: &Document, update: &Document, engine: &Engine) -> DocMockResult<Document> {
    let mut seed = Document::new();
    collect_literals(filter, &mut seed)?;

    let mut document = if is_operator_update(update) {
        let mut applied = engine.updater.apply(&seed, update, UpdateMode::Insert)?;
        for path in unset_paths(update) {
            applied.remove_path(&path);
        }
        applied
    } else {
        let mut merged = seed;
        let filter_id = merged.get(ID_FIELD).cloned();
        deep_merge(&mut merged, update);
        if let Some(id) = filter_id {
            merged.insert(ID_FIELD, id);
        }
        merged
    };

    if matches!(document.get(ID_FIELD), Some(Bson::Null)) {
        document.remove(ID_FIELD);
    }

    Ok(with_id(document, engine.ids.as_ref()))
}

fn collect_literals(filter: &Document, seed: &mut Document) -> DocMockResult<()> {
    for (key, condition) in filter {
        match key.as_str() {
            "$and" => {
                for clause in condition.as_array().into_iter().flatten() {
                    if let Some(clause) = clause.as_document() {
                        collect_literals(clause, seed)?;
                    }
                }
            }
            operator if is_operator(operator) => {}
            path => match condition {
                Bson::Document(operators) if operators.keys().next().is_some_and(|key| is_operator(key)) => {
                    if let Some(value) = operators.get("$eq") {
                        seed.set_path(path, value.clone())?;
                    }
                }
                value => seed.set_path(path, value.clone())?,
            },
        }
    }

    Ok(())
}

/// Merges `source` into `target`; nested documents merge key by key, anything else
/// is overwritten.
fn deep_merge(target: &mut Document, source: &Document) {
    for (key, value) in source {
        match (target.get_mut(key), value) {
            (Some(Bson::Document(existing)), Bson::Document(incoming)) => deep_merge(existing, incoming),
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}
