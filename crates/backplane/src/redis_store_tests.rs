// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn open_rejects_malformed_url() {
    assert!(matches!(RedisListStore::open("not a url"), Err(StoreError::Invalid(_))));
}

#[test]
fn open_accepts_redis_url_without_connecting() {
    // No server is running; open only parses the URL.
    assert!(RedisListStore::open("redis://127.0.0.1:6379").is_ok());
}

#[tokio::test]
async fn disconnect_without_connection_is_a_noop() {
    let store = RedisListStore::open("redis://127.0.0.1:6379").unwrap();
    store.disconnect().await.unwrap();
}
