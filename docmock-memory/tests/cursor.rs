mod common;

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use bson::{Bson, DateTime, Document, Regex, doc};
use futures::TryStreamExt;

use docmock_core::{error::DocMockError, options::FindOptions};
use docmock_memory::CursorState;

use common::collection;

async fn numbered(count: i32) -> docmock_memory::Collection {
    let c = collection("numbers").await;
    c.insert((0..count).map(|n| doc! { "n": n }).collect()).await.unwrap();
    c
}

fn values(documents: &[Document]) -> Vec<i32> {
    documents.iter().map(|d| d.get_i32("n").unwrap()).collect()
}

#[tokio::test]
async fn sorts_mixed_types_in_type_rank_order() {
    let c = collection("mixed").await;
    c.insert(vec![
        doc! { "tag": "regex", "v": Regex { pattern: "foo".to_string().try_into().unwrap(), options: String::new().try_into().unwrap() } },
        doc! { "tag": "date", "v": DateTime::now() },
        doc! { "tag": "bool", "v": true },
        doc! { "tag": "array", "v": [1] },
        doc! { "tag": "object", "v": { "a": 1 } },
        doc! { "tag": "string", "v": "foo" },
        doc! { "tag": "number", "v": 42 },
        doc! { "tag": "null", "v": Bson::Null },
    ])
    .await
    .unwrap();

    let mut cursor = c.find(doc! {});
    cursor.sort(doc! { "v": 1 }).unwrap();

    let tags = cursor
        .to_array()
        .await
        .unwrap()
        .iter()
        .map(|d| d.get_str("tag").unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(tags, vec!["null", "number", "string", "object", "array", "bool", "date", "regex"]);
}

#[tokio::test]
async fn windowed_count_follows_skip_and_limit() {
    let c = numbered(10).await;

    let mut cursor = c.find(doc! {});
    cursor.skip(3).unwrap().limit(4).unwrap();
    assert_eq!(cursor.count(true).await.unwrap(), 4);
    assert_eq!(cursor.count(false).await.unwrap(), 10);
    assert_eq!(cursor.size().await.unwrap(), 4);

    let mut cursor = c.find(doc! {});
    cursor.skip(8).unwrap().limit(4).unwrap();
    assert_eq!(cursor.count(true).await.unwrap(), 2);

    let mut cursor = c.find(doc! {});
    cursor.skip(12).unwrap();
    assert_eq!(cursor.count(true).await.unwrap(), 0);
    assert!(cursor.to_array().await.unwrap().is_empty());
}

#[tokio::test]
async fn counting_does_not_move_the_cursor() {
    let c = numbered(3).await;
    let mut cursor = c.find(doc! {});

    assert_eq!(cursor.next().await.unwrap().unwrap().get_i32("n").unwrap(), 0);
    assert_eq!(cursor.count(false).await.unwrap(), 3);
    assert_eq!(cursor.next().await.unwrap().unwrap().get_i32("n").unwrap(), 1);
}

#[tokio::test]
async fn next_walks_the_window_then_returns_none() {
    let c = numbered(5).await;
    let mut cursor = c.find(doc! { "n": { "$gte": 1 } });
    cursor.sort(doc! { "n": -1 }).unwrap().limit(2).unwrap();

    assert_eq!(cursor.state(), CursorState::Init);
    assert_eq!(cursor.next().await.unwrap().unwrap().get_i32("n").unwrap(), 4);
    assert_eq!(cursor.state(), CursorState::Open);
    assert_eq!(cursor.next().await.unwrap().unwrap().get_i32("n").unwrap(), 3);
    assert_eq!(cursor.next().await.unwrap(), None);
    assert_eq!(cursor.next().await.unwrap(), None);
}

#[tokio::test]
async fn configuring_an_open_cursor_is_an_invalid_state() {
    let c = numbered(2).await;
    let mut cursor = c.find(doc! {});
    cursor.next().await.unwrap();

    assert!(matches!(cursor.sort(doc! { "n": 1 }), Err(DocMockError::InvalidState(_))));
    assert!(matches!(cursor.skip(1), Err(DocMockError::InvalidState(_))));
    assert!(matches!(cursor.limit(1), Err(DocMockError::InvalidState(_))));
    assert!(matches!(cursor.project(doc! { "n": 1 }), Err(DocMockError::InvalidState(_))));
    assert!(matches!(cursor.map(|d| d), Err(DocMockError::InvalidState(_))));

    cursor.rewind();
    cursor.limit(1).unwrap();
    assert_eq!(cursor.to_array().await.unwrap().len(), 1);
}

#[tokio::test]
async fn to_array_closes_the_cursor_and_notifies_once() {
    let c = numbered(3).await;
    let closed = Arc::new(AtomicUsize::new(0));

    let mut cursor = c.find(doc! {});
    let counter = Arc::clone(&closed);
    cursor.on_close(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(values(&cursor.to_array().await.unwrap()), vec![0, 1, 2]);
    assert!(cursor.is_closed());

    cursor.close();
    assert_eq!(closed.load(Ordering::SeqCst), 1);
    assert!(cursor.to_array().await.unwrap().is_empty());
    assert_eq!(cursor.next().await.unwrap(), None);
}

#[tokio::test]
async fn map_and_projection_apply_in_pipeline_order() {
    let c = numbered(4).await;

    let mut cursor = c.find(doc! {});
    cursor
        .map(|mut d| {
            let n = d.get_i32("n").unwrap_or_default();
            d.insert("double", n * 2);
            d
        })
        .unwrap()
        .skip(1)
        .unwrap()
        .project(doc! { "double": 1, "_id": 0 })
        .unwrap();

    assert_eq!(
        cursor.to_array().await.unwrap(),
        vec![doc! { "double": 2 }, doc! { "double": 4 }, doc! { "double": 6 }]
    );
}

#[tokio::test]
async fn results_are_copies_of_stored_documents() {
    let c = numbered(1).await;

    let mut first = c.find(doc! {}).to_array().await.unwrap();
    first[0].insert("n", 100);

    assert_eq!(values(&c.find(doc! {}).to_array().await.unwrap()), vec![0]);
}

#[tokio::test]
async fn find_with_applies_options() {
    let c = numbered(6).await;

    let mut cursor = c
        .find_with(
            doc! { "n": { "$in": [1, 2, 3, 4] } },
            FindOptions::new().with_sort(doc! { "n": -1 }).with_skip(1).with_limit(2),
        )
        .unwrap();
    assert_eq!(values(&cursor.to_array().await.unwrap()), vec![3, 2]);

    let err = c
        .find_with(doc! {}, FindOptions::new().with_projection(doc! { "a": 1, "b": 0 }))
        .unwrap_err();
    assert!(matches!(err, DocMockError::InvalidArgument(_)));

    let first = c
        .find_one_with(doc! {}, FindOptions::new().with_sort(doc! { "n": -1 }).with_projection(doc! { "_id": 0 }))
        .await
        .unwrap();
    assert_eq!(first, Some(doc! { "n": 5 }));
}

#[tokio::test]
async fn cursors_stream_and_iterate() {
    let c = numbered(4).await;

    let streamed = c.find(doc! { "n": { "$lt": 3 } }).into_stream().try_collect::<Vec<_>>().await.unwrap();
    assert_eq!(values(&streamed), vec![0, 1, 2]);

    let mut seen = Vec::new();
    c.find(doc! {}).for_each(|d| seen.push(d)).await.unwrap();
    assert_eq!(values(&seen), vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn limit_zero_returns_everything() {
    let c = numbered(3).await;
    let mut cursor = c.find(doc! {});
    cursor.limit(0).unwrap();

    assert_eq!(cursor.to_array().await.unwrap().len(), 3);
}
