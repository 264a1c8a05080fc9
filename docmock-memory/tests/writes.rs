mod common;

use bson::{Bson, doc, oid::ObjectId};
use serde::{Deserialize, Serialize};

use docmock_core::{
    error::DocMockError,
    options::{FindOneAndUpdateOptions, IndexOptions, RemoveOptions, ReturnDocument, UpdateOptions},
    results::WriteSummary,
};

use common::{collection, init_tracing};

#[tokio::test]
async fn unique_index_stops_the_batch_at_the_duplicate() {
    init_tracing();
    let c = collection("c").await;
    c.create_index(doc! { "test": 1 }, IndexOptions::unique()).await.unwrap();

    let err = c
        .insert(vec![
            doc! { "test": 333 },
            doc! { "test": 444 },
            doc! { "test": 555, "baz": 1 },
            doc! { "test": 555, "baz": 2 },
        ])
        .await
        .unwrap_err();

    assert_eq!(
        err,
        DocMockError::DuplicateKey { namespace: "db.c".into(), index_name: "test_1".into(), index: 3 }
    );
    assert_eq!(err.code(), Some(11000));

    let stored = c.find(doc! {}).to_array().await.unwrap();
    let tests = stored.iter().map(|d| d.get_i32("test").unwrap()).collect::<Vec<_>>();
    assert_eq!(tests, vec![333, 444, 555]);
    assert_eq!(stored[2].get_i32("baz").unwrap(), 1);
}

#[tokio::test]
async fn insert_commits_exactly_the_documents_before_the_first_conflict() {
    for k in 1..=5usize {
        let c = collection("c").await;
        c.create_index(doc! { "key": 1 }, IndexOptions::unique()).await.unwrap();
        c.insert_one(doc! { "key": "taken" }).await.unwrap();

        let batch = (1..=6usize)
            .map(|n| if n == k { doc! { "key": "taken" } } else { doc! { "key": n as i64 } })
            .collect::<Vec<_>>();

        let err = c.insert_many(batch).await.unwrap_err();
        assert!(matches!(err, DocMockError::DuplicateKey { index, .. } if index == k - 1));
        assert_eq!(c.count(doc! {}).await.unwrap(), k as u64);
    }
}

#[tokio::test]
async fn missing_fields_collide_only_with_missing_fields() {
    let c = collection("c").await;
    c.create_index(doc! { "email": 1 }, IndexOptions::unique()).await.unwrap();

    c.insert_one(doc! { "name": "no email" }).await.unwrap();
    c.insert_one(doc! { "email": Bson::Null }).await.unwrap();

    let err = c.insert_one(doc! { "name": "also no email" }).await.unwrap_err();
    assert!(err.is_duplicate_key());
}

#[tokio::test]
async fn upsert_builds_the_document_from_filter_and_replacement() {
    let c = collection("c").await;

    let result = c
        .update(doc! { "test": 1 }, doc! { "test": 1, "bar": "none" }, UpdateOptions::upsert())
        .await
        .unwrap();

    assert_eq!(result.upserted_count, 1);
    assert_eq!(result.matched_count, 0);
    assert_eq!(result.result, WriteSummary::modified(1, 0));

    let stored = c.find(doc! {}).to_array().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert!(matches!(stored[0].get("_id"), Some(Bson::ObjectId(_))));
    assert_eq!(Some(stored[0].get("_id").unwrap()), result.upserted_id.as_ref());
    assert_eq!(stored[0].get_i32("test").unwrap(), 1);
    assert_eq!(stored[0].get_str("bar").unwrap(), "none");
    assert_eq!(stored[0].len(), 3);
}

#[tokio::test]
async fn upsert_flattens_and_but_not_or() {
    let c = collection("c").await;

    c.update_one(
        doc! { "$and": [ { "a": 1 }, { "b": { "$eq": 2 } } ], "$or": [ { "x": 1 }, { "x": 2 } ] },
        doc! { "$set": { "c": 3 }, "$setOnInsert": { "created": true } },
        UpdateOptions::upsert(),
    )
    .await
    .unwrap();

    let stored = c.find_one(doc! {}).await.unwrap().unwrap();
    assert_eq!(stored.get_i32("a").unwrap(), 1);
    assert_eq!(stored.get_i32("b").unwrap(), 2);
    assert_eq!(stored.get_i32("c").unwrap(), 3);
    assert!(stored.get_bool("created").unwrap());
    assert!(stored.get("x").is_none());

    // A matched update ignores $setOnInsert.
    c.update_one(doc! { "a": 1 }, doc! { "$setOnInsert": { "created": false } }, UpdateOptions::upsert())
        .await
        .unwrap();
    assert!(c.find_one(doc! {}).await.unwrap().unwrap().get_bool("created").unwrap());
}

#[tokio::test]
async fn update_many_is_all_or_nothing_on_conflict() {
    let c = collection("c").await;
    c.create_index(doc! { "slot": 1 }, IndexOptions::unique()).await.unwrap();
    c.insert(vec![doc! { "_id": 1, "slot": 1 }, doc! { "_id": 2, "slot": 2 }, doc! { "_id": 3, "slot": 3 }])
        .await
        .unwrap();

    let err = c
        .update_many(doc! { "slot": { "$gte": 2 } }, doc! { "$set": { "slot": 1 } }, UpdateOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_duplicate_key());

    let slots = c
        .find(doc! {})
        .to_array()
        .await
        .unwrap()
        .iter()
        .map(|d| d.get_i32("slot").unwrap())
        .collect::<Vec<_>>();
    assert_eq!(slots, vec![1, 2, 3]);

    // Swapping through a free value succeeds.
    let result = c
        .update_many(doc! { "slot": { "$gte": 2 } }, doc! { "$inc": { "slot": 10 } }, UpdateOptions::default())
        .await
        .unwrap();
    assert_eq!((result.matched_count, result.modified_count), (2, 2));
}

#[tokio::test]
async fn unset_removes_fields_after_the_merge() {
    let c = collection("c").await;
    c.insert_one(doc! { "_id": 1, "a": 1, "b": { "c": 1, "d": 2 } }).await.unwrap();

    c.update_one(doc! { "_id": 1 }, doc! { "$unset": { "a": "", "b.c": 1 } }, UpdateOptions::default())
        .await
        .unwrap();

    assert_eq!(c.find_one(doc! { "_id": 1 }).await.unwrap(), Some(doc! { "_id": 1, "b": { "d": 2 } }));
}

#[tokio::test]
async fn update_operator_errors_reach_the_caller() {
    let c = collection("c").await;
    c.insert_one(doc! { "_id": 1, "name": "x" }).await.unwrap();

    let err = c
        .update_one(doc! {}, doc! { "$inc": { "name": 1 } }, UpdateOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DocMockError::InvalidState(_)));

    let err = c
        .update_one(doc! {}, doc! { "$bit": { "n": { "and": 1 } } }, UpdateOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DocMockError::NotSupported(_)));

    let err = c
        .replace_one(doc! {}, doc! { "$set": { "a": 1 } }, UpdateOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DocMockError::InvalidArgument(_)));

    let err = c.find_one(doc! { "name": { "$where": "true" } }).await.unwrap_err();
    assert!(matches!(err, DocMockError::NotSupported(_)));
}

#[tokio::test]
async fn positional_set_far_past_the_array_end_is_rejected() {
    let c = collection("c").await;
    c.insert_one(doc! { "_id": 1, "a": [] }).await.unwrap();

    for path in ["a.18446744073709551615", "a.4294967296"] {
        let err = c
            .update(doc! { "_id": 1 }, doc! { "$set": { path: 1 } }, UpdateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DocMockError::InvalidState(_)));
    }

    assert_eq!(c.find_one(doc! { "_id": 1 }).await.unwrap(), Some(doc! { "_id": 1, "a": [] }));
}

#[tokio::test]
async fn find_one_returns_an_independent_copy() {
    let c = collection("c").await;
    let original = doc! { "_id": 7, "nested": { "list": [1, 2, 3] } };

    let inserted = c.insert_one(original.clone()).await.unwrap();
    assert_eq!(inserted.inserted_id, Bson::Int32(7));
    assert_eq!(inserted.ops, vec![original.clone()]);

    let mut found = c.find_one(doc! { "_id": 7 }).await.unwrap().unwrap();
    assert_eq!(found, original);

    found.insert("nested", "changed");
    assert_eq!(c.find_one(doc! { "_id": 7 }).await.unwrap().unwrap(), original);
}

#[tokio::test]
async fn generated_ids_are_object_ids_placed_first() {
    let c = collection("c").await;
    let result = c.insert_many(vec![doc! { "a": 1 }, doc! { "a": 2 }]).await.unwrap();

    assert_eq!(result.inserted_count, 2);
    let first = result.inserted_ids[&0].as_object_id().unwrap();
    let second = result.inserted_ids[&1].as_object_id().unwrap();
    assert_ne!(first, second);
    assert_eq!(result.ops[0].keys().next().map(String::as_str), Some("_id"));
}

#[tokio::test]
async fn index_declaration_is_idempotent() {
    let c = collection("c").await;

    let first = c.create_index(doc! { "email": 1, "tenant": -1 }, IndexOptions::unique()).await.unwrap();
    let second = c.create_index(doc! { "email": 1, "tenant": -1 }, IndexOptions::unique()).await.unwrap();
    let by_name = c
        .create_index(doc! { "other": 1 }, IndexOptions::default().with_name("email_1_tenant_-1"))
        .await
        .unwrap();

    assert_eq!(first, "email_1_tenant_-1");
    assert_eq!(first, second);
    assert_eq!(first, by_name);

    let indexes = c.index_information().await.unwrap();
    assert_eq!(indexes.len(), 2);
    assert!(indexes.iter().any(|index| index.is_primary()));
    assert!(indexes.iter().all(|index| index.ns == "db.c"));
}

#[tokio::test]
async fn unsupported_index_options_fail_without_scheduling() {
    let c = collection("c").await;

    let err = c
        .create_index(doc! { "a": 1 }, IndexOptions { version: Some(2), ..IndexOptions::default() })
        .await
        .unwrap_err();
    assert!(matches!(err, DocMockError::NotSupported(_)));

    let err = c
        .create_index(doc! { "a": 1 }, IndexOptions { drop_dups: true, ..IndexOptions::default() })
        .await
        .unwrap_err();
    assert!(matches!(err, DocMockError::NotSupported(_)));
}

#[tokio::test]
async fn duplicate_id_is_rejected_by_the_primary_index() {
    let c = collection("c").await;
    c.insert_one(doc! { "_id": "a" }).await.unwrap();

    let err = c.insert_one(doc! { "_id": "a", "x": 1 }).await.unwrap_err();
    assert_eq!(
        err,
        DocMockError::DuplicateKey { namespace: "db.c".into(), index_name: "_id_".into(), index: 0 }
    );
}

#[tokio::test]
async fn delete_and_remove() {
    let c = collection("c").await;
    c.insert(vec![doc! { "_id": 1, "k": "a" }, doc! { "_id": 2, "k": "a" }, doc! { "_id": 3, "k": "b" }])
        .await
        .unwrap();

    let one = c.delete_one(doc! { "k": "a" }).await.unwrap();
    assert_eq!(one.deleted_count, 1);
    assert_eq!(one.ops, vec![doc! { "_id": 1, "k": "a" }]);

    let none = c.remove(doc! { "k": "zzz" }, RemoveOptions::default()).await.unwrap();
    assert_eq!(none.deleted_count, 0);

    let many = c.delete_many(doc! {}).await.unwrap();
    assert_eq!(many.deleted_count, 2);
    assert_eq!(c.estimated_document_count().await.unwrap(), 0);
}

#[tokio::test]
async fn save_replaces_or_inserts_by_id() {
    let c = collection("c").await;

    let inserted = c.save(doc! { "name": "first" }).await.unwrap();
    assert_eq!(inserted.upserted_count, 1);
    let id = inserted.upserted_id.unwrap();

    let replaced = c.save(doc! { "_id": id.clone(), "name": "second" }).await.unwrap();
    assert_eq!((replaced.matched_count, replaced.modified_count, replaced.upserted_count), (1, 1, 0));

    assert_eq!(c.find_one(doc! {}).await.unwrap(), Some(doc! { "_id": id, "name": "second" }));
    assert_eq!(c.count_documents(doc! {}).await.unwrap(), 1);
}

#[tokio::test]
async fn find_one_and_update_envelopes() {
    let c = collection("c").await;
    c.insert_one(doc! { "_id": 1, "n": 1, "secret": true }).await.unwrap();

    let after = c
        .find_one_and_update(
            doc! { "_id": 1 },
            doc! { "$inc": { "n": 1 } },
            FindOneAndUpdateOptions { projection: Some(doc! { "secret": 0 }), ..Default::default() },
        )
        .await
        .unwrap();
    assert_eq!(after.ok, 1);
    assert_eq!(after.value, Some(doc! { "_id": 1, "n": 2 }));
    assert!(after.last_error_object.updated_existing);
    assert_eq!(after.last_error_object.n, 1);

    let before = c
        .find_one_and_update(
            doc! { "_id": 1 },
            doc! { "$inc": { "n": 1 } },
            FindOneAndUpdateOptions { return_document: ReturnDocument::Before, ..Default::default() },
        )
        .await
        .unwrap();
    assert_eq!(before.value.unwrap().get_i32("n").unwrap(), 2);

    let upserted = c
        .find_one_and_update(
            doc! { "_id": 2 },
            doc! { "$set": { "n": 10 } },
            FindOneAndUpdateOptions { upsert: true, ..Default::default() },
        )
        .await
        .unwrap();
    assert!(!upserted.last_error_object.updated_existing);
    assert_eq!(upserted.last_error_object.upserted, Some(Bson::Int32(2)));
    assert_eq!(upserted.value, Some(doc! { "_id": 2, "n": 10 }));
}

#[tokio::test]
async fn system_indexes_inserts_declare_indexes() {
    let client = common::client().await;
    let db = client.db("db").unwrap();

    db.collection("system.indexes")
        .unwrap()
        .insert_one(doc! { "v": 1, "key": { "email": 1 }, "ns": "db.users", "name": "email_1", "unique": true })
        .await
        .unwrap();

    let users = db.collection("users").unwrap();
    users.insert_one(doc! { "email": "a@example.com" }).await.unwrap();
    assert!(users.insert_one(doc! { "email": "a@example.com" }).await.unwrap_err().is_duplicate_key());
    assert!(!db.collection_names().await.unwrap().contains(&"system.indexes".to_string()));
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    name: String,
    age: i32,
}

#[tokio::test]
async fn typed_collections_convert_at_the_boundary() {
    let users = collection("users").await.with_type::<User>();

    let result = users.insert_one(&User { id: None, name: "Alice".into(), age: 31 }).await.unwrap();
    users
        .insert_many(&[User { id: None, name: "Bob".into(), age: 27 }])
        .await
        .unwrap();

    let alice = users.find_one(doc! { "name": "Alice" }).await.unwrap().unwrap();
    assert_eq!(alice.id, result.inserted_id.as_object_id());
    assert_eq!(alice.age, 31);

    let adults = users.find(doc! { "age": { "$gte": 18 } }).await.unwrap();
    assert_eq!(adults.len(), 2);
}
