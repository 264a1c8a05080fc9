#![allow(dead_code)]

use std::time::Duration;

use docmock_memory::{Collection, MockClient};

pub async fn client() -> MockClient {
    MockClient::builder().max_delay(Duration::ZERO).build().await.unwrap()
}

pub async fn collection(name: &str) -> Collection {
    client().await.db("db").unwrap().collection(name).unwrap()
}

/// Installs a test-writer subscriber so `RUST_LOG=docmock=trace` shows engine events.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
