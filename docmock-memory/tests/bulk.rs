mod common;

use bson::{Bson, doc};

use docmock_core::{error::DocMockError, options::{IndexOptions, WriteModel}};
use docmock_memory::{BulkOperation, Collection};

use common::collection;

async fn seeded() -> Collection {
    let c = collection("bulk").await;
    c.create_index(doc! { "k": 1 }, IndexOptions::unique()).await.unwrap();
    c.insert(vec![
        doc! { "_id": 1, "k": "a" },
        doc! { "_id": 2, "k": "b" },
        doc! { "_id": 3, "tag": "c" },
    ])
    .await
    .unwrap();
    c
}

/// insert, then an updateOne that collides on `k`, then a removeOne of the tagged document.
fn stage_failing_batch(bulk: &mut BulkOperation) {
    bulk.insert(doc! { "_id": 4, "k": "new" });
    bulk.find(doc! { "_id": 1 }).update_one(doc! { "$set": { "k": "b" } });
    bulk.find(doc! { "tag": "c" }).remove_one();
}

#[tokio::test]
async fn ordered_bulk_stops_at_the_failing_operation() {
    let c = seeded().await;

    let mut bulk = c.initialize_ordered_bulk_op();
    stage_failing_batch(&mut bulk);
    assert!(bulk.is_ordered());
    assert_eq!(bulk.len(), 3);

    let err = bulk.execute().await.unwrap_err();
    assert_eq!(
        err,
        DocMockError::DuplicateKey { namespace: "db.bulk".into(), index_name: "k_1".into(), index: 1 }
    );

    assert!(c.find_one(doc! { "_id": 4 }).await.unwrap().is_some());
    assert!(c.find_one(doc! { "tag": "c" }).await.unwrap().is_some());
    assert_eq!(c.find_one(doc! { "_id": 1 }).await.unwrap(), Some(doc! { "_id": 1, "k": "a" }));
}

#[tokio::test]
async fn unordered_bulk_runs_every_operation_despite_a_failure() {
    let c = seeded().await;

    let mut bulk = c.initialize_unordered_bulk_op();
    stage_failing_batch(&mut bulk);

    let err = bulk.execute().await.unwrap_err();
    assert!(matches!(err, DocMockError::DuplicateKey { index: 1, .. }));

    assert!(c.find_one(doc! { "_id": 4 }).await.unwrap().is_some());
    assert!(c.find_one(doc! { "tag": "c" }).await.unwrap().is_none());
    assert_eq!(c.count(doc! {}).await.unwrap(), 3);
}

#[tokio::test]
async fn ordered_bulk_aggregates_counts() {
    let c = seeded().await;

    let mut bulk = c.initialize_ordered_bulk_op();
    bulk.insert(doc! { "k": "x" }).insert(doc! { "k": "y" });
    bulk.find(doc! { "k": { "$in": ["a", "b"] } }).update(doc! { "$set": { "seen": true } });
    bulk.find(doc! { "k": "z" }).upsert().update_one(doc! { "$set": { "fresh": true } });
    bulk.find(doc! { "tag": "c" }).remove();

    let result = bulk.execute().await.unwrap();
    assert_eq!(result.inserted_count, 2);
    assert_eq!(result.matched_count, 2);
    assert_eq!(result.modified_count, 2);
    assert_eq!(result.upserted_count, 1);
    assert_eq!(result.deleted_count, 1);
    assert_eq!(result.upserted_ids.keys().copied().collect::<Vec<_>>(), vec![3]);
    assert_eq!(result.ops.len(), 3);
    assert_eq!(result.result.n, 6);

    let fresh = c.find_one(doc! { "k": "z" }).await.unwrap().unwrap();
    assert!(fresh.get_bool("fresh").unwrap());
}

#[tokio::test]
async fn removals_requery_at_execution_time() {
    let c = seeded().await;

    let mut bulk = c.initialize_unordered_bulk_op();
    bulk.find(doc! { "k": { "$exists": true } }).remove_one();
    bulk.find(doc! { "k": { "$exists": true } }).remove_one();
    bulk.find(doc! { "k": { "$exists": true } }).remove_one();

    let result = bulk.execute().await.unwrap();
    assert_eq!(result.deleted_count, 2);
    assert_eq!(c.count(doc! {}).await.unwrap(), 1);
}

#[tokio::test]
async fn unsupported_builder_calls_fail_when_staged() {
    let c = seeded().await;

    let mut bulk = c.initialize_ordered_bulk_op();
    bulk.insert(doc! { "_id": 20, "k": "staged" });
    let err = bulk.find(doc! { "_id": 1 }).replace_one(doc! { "k": "q" }).unwrap_err();
    assert!(matches!(err, DocMockError::NotSupported(_)));
    assert_eq!(bulk.len(), 1);
    assert_eq!(c.count(doc! {}).await.unwrap(), 3);

    let mut bulk = c.initialize_unordered_bulk_op();
    bulk.insert(doc! { "_id": 21, "k": "staged" });
    assert!(matches!(
        bulk.find(doc! { "_id": 1 }).collation(doc! { "locale": "en" }),
        Err(DocMockError::NotSupported(_))
    ));
    assert!(matches!(
        bulk.find(doc! { "_id": 1 }).array_filters(Vec::new()),
        Err(DocMockError::NotSupported(_))
    ));
    assert_eq!(bulk.len(), 1);
    drop(bulk);

    assert_eq!(c.count(doc! {}).await.unwrap(), 3);
    assert_eq!(c.find_one(doc! { "_id": 1 }).await.unwrap(), Some(doc! { "_id": 1, "k": "a" }));
}

#[tokio::test]
async fn empty_bulk_is_rejected() {
    let c = seeded().await;

    assert!(c.initialize_ordered_bulk_op().is_empty());
    let err = c.initialize_ordered_bulk_op().execute().await.unwrap_err();
    assert!(matches!(err, DocMockError::InvalidArgument(_)));

    let err = c.bulk_write(Vec::new()).await.unwrap_err();
    assert!(matches!(err, DocMockError::InvalidArgument(_)));
}

#[tokio::test]
async fn bulk_write_dispatches_every_model() {
    let c = seeded().await;

    let result = c
        .bulk_write(vec![
            WriteModel::InsertOne { document: doc! { "_id": 10, "k": "j" } },
            WriteModel::UpdateOne { filter: doc! { "_id": 1 }, update: doc! { "$set": { "x": 1 } }, upsert: false },
            WriteModel::UpdateMany { filter: doc! { "k": "nobody" }, update: doc! { "$set": { "x": 1 } }, upsert: false },
            WriteModel::ReplaceOne { filter: doc! { "_id": 11 }, replacement: doc! { "k": "r" }, upsert: true },
            WriteModel::DeleteOne { filter: doc! { "tag": "c" } },
            WriteModel::DeleteMany { filter: doc! { "k": "nobody" } },
        ])
        .await
        .unwrap();

    assert_eq!(result.inserted_count, 1);
    assert_eq!(result.matched_count, 1);
    assert_eq!(result.modified_count, 1);
    assert_eq!(result.upserted_count, 1);
    assert_eq!(result.deleted_count, 1);
    assert_eq!(result.upserted_ids.get(&3), Some(&Bson::Int32(11)));
    assert_eq!(c.find_one(doc! { "_id": 11 }).await.unwrap(), Some(doc! { "_id": 11, "k": "r" }));
}

#[tokio::test]
async fn bulk_write_reports_the_failing_model_position() {
    let c = seeded().await;

    let err = c
        .bulk_write(vec![
            WriteModel::DeleteOne { filter: doc! { "tag": "c" } },
            WriteModel::InsertOne { document: doc! { "k": "a" } },
        ])
        .await
        .unwrap_err();

    assert!(matches!(err, DocMockError::DuplicateKey { index: 1, .. }));
    assert_eq!(c.count(doc! { "tag": "c" }).await.unwrap(), 0);
}
