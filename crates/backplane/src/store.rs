// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The list-store seam over the backplane.

use crate::error::StoreError;
use async_trait::async_trait;
use std::time::Duration;

/// Primitive list operations the backplane must provide.
///
/// Method semantics follow the Redis commands they map to (RPUSH, LMOVE,
/// BLMOVE, LREM, LLEN, LRANGE). The single non-negotiable requirement is
/// that [`move_head`](ListStore::move_head) is atomic with respect to the
/// store: an entry is never observable in both lists, nor in neither, at
/// any point during the move.
#[async_trait]
pub trait ListStore: Send + Sync + 'static {
    /// Append a value to the tail of `list`.
    async fn push_tail(&self, list: &str, value: &str) -> Result<(), StoreError>;

    /// Atomically move the head of `src` to the head of `dst`.
    ///
    /// Returns the moved value, or `None` when `src` is empty.
    async fn move_head(&self, src: &str, dst: &str) -> Result<Option<String>, StoreError>;

    /// As [`move_head`](ListStore::move_head), but blocks until an entry
    /// arrives or `timeout` elapses. `None` means the timeout expired.
    async fn blocking_move_head(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> Result<Option<String>, StoreError>;

    /// Remove occurrences of `value` from `list`, returning how many were
    /// removed. `count > 0` scans from the head, `count < 0` from the
    /// tail, `count == 0` removes every occurrence.
    async fn remove(&self, list: &str, count: i64, value: &str) -> Result<u64, StoreError>;

    /// Length of `list`; a missing list has length zero.
    async fn len(&self, list: &str) -> Result<u64, StoreError>;

    /// Inclusive range of `list`, with Redis index semantics (negative
    /// indices count from the tail).
    async fn range(&self, list: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError>;

    /// Forcibly close the transport. Pending blocking calls fail with
    /// [`StoreError::ConnectionClosed`]; the next operation reconnects.
    async fn disconnect(&self) -> Result<(), StoreError>;
}
