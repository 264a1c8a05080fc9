//! Write operations.
//!
//! Each function runs synchronously against the locked database state. Uniqueness is
//! checked and the mutation committed in the same step. Inserts commit until the
//! first conflict; updates commit all of their matches or none.

use bson::{Bson, Document};
use tracing::trace;

use docmock_core::{
    compare::optional_values_equal,
    document::{DocumentExt, ID_FIELD},
    error::{DocMockError, DocMockResult},
    options::{FindOneAndUpdateOptions, IndexOptions, ReturnDocument, UpdateOptions},
    results::{DeleteResult, FindAndModifyResult, InsertManyResult, LastErrorObject, UpdateResult, WriteSummary},
    update::{UpdateMode, is_operator_update, unset_paths},
};

use crate::{
    client::Engine,
    cursor::Projection,
    database::{DatabaseState, SYSTEM_INDEXES},
    upsert::seed_document,
};

/// Inserts `documents` in order. The database is marked for persistence even when
/// the batch stops at a conflict, because the documents before it stay committed.
pub(crate) fn insert(
    state: &mut DatabaseState,
    engine: &Engine,
    collection: &str,
    documents: Vec<Document>,
) -> DocMockResult<InsertManyResult> {
    if documents.is_empty() {
        return Err(DocMockError::InvalidArgument("insert requires at least one document".into()));
    }

    if collection == SYSTEM_INDEXES {
        return insert_index_descriptors(state, documents);
    }

    let (store, indexes) = state.store_mut(collection);
    let outcome = store.insert_many(documents, indexes, engine.ids.as_ref());
    state.mark_dirty();

    if let Some(err) = outcome.error {
        return Err(err);
    }

    let inserted_count = outcome.inserted.len() as u64;
    let inserted_ids = outcome
        .inserted
        .iter()
        .enumerate()
        .filter_map(|(position, document)| document.id().map(|id| (position, id.clone())))
        .collect();

    Ok(InsertManyResult {
        inserted_count,
        inserted_ids,
        ops: outcome.inserted,
        result: WriteSummary::ok(inserted_count),
    })
}

/// Treats each document as an index descriptor (`{ key, ns, name, unique, v, dropDups }`)
/// and declares it.
fn insert_index_descriptors(state: &mut DatabaseState, descriptors: Vec<Document>) -> DocMockResult<InsertManyResult> {
    let prefix = format!("{}.", state.name());
    let mut result = InsertManyResult::default();

    for (position, descriptor) in descriptors.into_iter().enumerate() {
        let key = descriptor
            .get_document("key")
            .map_err(|_| DocMockError::InvalidArgument("index descriptor requires a 'key' document".into()))?
            .clone();

        let collection = descriptor
            .get_str("ns")
            .ok()
            .and_then(|namespace| namespace.strip_prefix(&prefix))
            .filter(|collection| !collection.is_empty())
            .ok_or_else(|| {
                DocMockError::InvalidArgument(format!("index descriptor 'ns' must name a collection in {}", state.name()))
            })?
            .to_string();

        let options = IndexOptions {
            name: descriptor.get_str("name").ok().map(str::to_string),
            unique: descriptor.get_bool("unique").unwrap_or(false),
            version: descriptor.get("v").and_then(|version| match version {
                Bson::Int32(version) => Some(*version),
                Bson::Int64(version) => i32::try_from(*version).ok(),
                Bson::Double(version) => Some(*version as i32),
                _ => None,
            }),
            drop_dups: descriptor.get_bool("dropDups").unwrap_or(false),
        };

        state.create_index(&collection, key, &options)?;

        result.inserted_count += 1;
        if let Some(id) = descriptor.id() {
            result.inserted_ids.insert(position, id.clone());
        }
        result.ops.push(descriptor);
    }

    result.result = WriteSummary::ok(result.inserted_count);
    Ok(result)
}

/// Updates the first match, or every match with `multi`, inserting a synthesized
/// document when nothing matches and `upsert` is set.
pub(crate) fn update(
    state: &mut DatabaseState,
    engine: &Engine,
    collection: &str,
    filter: &Document,
    update: &Document,
    options: UpdateOptions,
) -> DocMockResult<UpdateResult> {
    if options.multi && !is_operator_update(update) {
        return Err(DocMockError::InvalidArgument(
            "multi update only works with $ operators".into(),
        ));
    }

    let mut positions = engine.evaluator.filter(filter, state.documents(collection))?;
    if !options.multi {
        positions.truncate(1);
    }

    if positions.is_empty() {
        if options.upsert {
            return upsert(state, engine, collection, filter, update);
        }
        return Ok(UpdateResult { result: WriteSummary::modified(0, 0), ..UpdateResult::default() });
    }

    let unset = unset_paths(update);
    let documents = state.documents(collection);
    let mut candidates = Vec::with_capacity(positions.len());
    let mut modified_count = 0;

    for position in &positions {
        let Some(current) = documents.get(*position) else {
            continue;
        };

        let mut candidate = engine.updater.apply(current, update, UpdateMode::Matched)?;
        for path in &unset {
            candidate.remove_path(path);
        }

        if !optional_values_equal(current.id(), candidate.id()) {
            return Err(DocMockError::InvalidState(format!(
                "the (immutable) field '{ID_FIELD}' was found to have been altered"
            )));
        }

        if candidate != *current {
            modified_count += 1;
        }
        candidates.push(candidate);
    }

    let matched_count = positions.len() as u64;
    let (store, indexes) = state.store_mut(collection);
    store.mutate_in_place(&positions, candidates, indexes)?;

    trace!(target: "docmock::write", collection, matched_count, modified_count, "Updated documents");

    if modified_count > 0 {
        state.mark_dirty();
    }

    Ok(UpdateResult {
        matched_count,
        modified_count,
        result: WriteSummary::modified(matched_count, modified_count),
        ..UpdateResult::default()
    })
}

fn upsert(
    state: &mut DatabaseState,
    engine: &Engine,
    collection: &str,
    filter: &Document,
    update: &Document,
) -> DocMockResult<UpdateResult> {
    let document = seed_document(filter, update, engine)?;

    let (store, indexes) = state.store_mut(collection);
    let outcome = store.insert_many(vec![document], indexes, engine.ids.as_ref());
    state.mark_dirty();

    if let Some(err) = outcome.error {
        return Err(err);
    }

    let upserted_id = outcome.inserted.first().and_then(DocumentExt::id).cloned();
    trace!(target: "docmock::write", collection, id = ?upserted_id, "Upserted document");

    Ok(UpdateResult {
        upserted_count: 1,
        upserted_id,
        ops: outcome.inserted,
        result: WriteSummary::modified(1, 0),
        ..UpdateResult::default()
    })
}

/// Removes the first match, or every match.
pub(crate) fn delete(
    state: &mut DatabaseState,
    engine: &Engine,
    collection: &str,
    filter: &Document,
    single: bool,
) -> DocMockResult<DeleteResult> {
    if !state.is_materialized(collection) {
        return Ok(DeleteResult { result: WriteSummary::ok(0), ..DeleteResult::default() });
    }

    let (store, _) = state.store_mut(collection);
    let removed = store.delete_matching(filter, single, engine.evaluator.as_ref())?;

    if !removed.is_empty() {
        state.mark_dirty();
    }

    let deleted_count = removed.len() as u64;
    Ok(DeleteResult {
        deleted_count,
        ops: removed,
        result: WriteSummary::ok(deleted_count),
    })
}

/// Updates the first match and returns its pre- or post-image.
pub(crate) fn find_one_and_update(
    state: &mut DatabaseState,
    engine: &Engine,
    collection: &str,
    filter: &Document,
    update: &Document,
    options: &FindOneAndUpdateOptions,
) -> DocMockResult<FindAndModifyResult> {
    let projection = match &options.projection {
        Some(spec) => Projection::parse(spec)?,
        None => None,
    };

    let position = engine.evaluator.filter(filter, state.documents(collection))?.first().copied();
    let before = position.and_then(|position| state.documents(collection).get(position).cloned());

    let result = self::update(
        state,
        engine,
        collection,
        filter,
        update,
        UpdateOptions { upsert: options.upsert, multi: false },
    )?;

    let after = match position {
        Some(position) => state.documents(collection).get(position).cloned(),
        None => result.ops.first().cloned(),
    };

    let last_error_object = LastErrorObject {
        n: u64::from(before.is_some() || result.upserted_id.is_some()),
        updated_existing: before.is_some(),
        upserted: result.upserted_id,
    };

    let value = match options.return_document {
        ReturnDocument::Before => before,
        ReturnDocument::After => after,
    };

    Ok(FindAndModifyResult {
        ok: 1,
        value: match (value, projection) {
            (Some(document), Some(projection)) => Some(projection.apply(document)),
            (value, _) => value,
        },
        last_error_object,
    })
}
