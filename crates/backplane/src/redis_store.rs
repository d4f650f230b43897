// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redis-backed list store.
//!
//! LMOVE/BLMOVE supply the atomic list-move primitive; everything else is
//! a thin command mapping. The connection manager is held behind a mutex
//! so `disconnect` can drop it, which is how a cancelled dequeue forcibly
//! unblocks the server side. An in-flight BLMOVE that completes on the
//! server during the disconnect leaves its entry in the dequeue list,
//! where the external recovery sweep finds it.

use crate::error::StoreError;
use crate::store::ListStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use std::time::Duration;

/// [`ListStore`] over a Redis server.
pub struct RedisListStore {
    client: redis::Client,
    manager: Mutex<Option<ConnectionManager>>,
}

impl RedisListStore {
    /// Create a store for the given Redis URL. Connection establishment
    /// is deferred to the first operation.
    pub fn open(url: &str) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(url).map_err(|e| StoreError::Invalid(e.to_string()))?;
        Ok(Self { client, manager: Mutex::new(None) })
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        if let Some(manager) = self.manager.lock().clone() {
            return Ok(manager);
        }
        let manager = self
            .client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError::Transient(e.to_string()))?;
        *self.manager.lock() = Some(manager.clone());
        Ok(manager)
    }

    fn map_err(e: redis::RedisError) -> StoreError {
        if e.is_connection_dropped() || e.is_io_error() {
            StoreError::ConnectionClosed
        } else {
            StoreError::Transient(e.to_string())
        }
    }
}

#[async_trait]
impl ListStore for RedisListStore {
    async fn push_tail(&self, list: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        redis::cmd("RPUSH")
            .arg(list)
            .arg(value)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(Self::map_err)
    }

    async fn move_head(&self, src: &str, dst: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection().await?;
        redis::cmd("LMOVE")
            .arg(src)
            .arg(dst)
            .arg("LEFT")
            .arg("LEFT")
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)
    }

    async fn blocking_move_head(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection().await?;
        redis::cmd("BLMOVE")
            .arg(src)
            .arg(dst)
            .arg("LEFT")
            .arg("LEFT")
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)
    }

    async fn remove(&self, list: &str, count: i64, value: &str) -> Result<u64, StoreError> {
        let mut conn = self.connection().await?;
        redis::cmd("LREM")
            .arg(list)
            .arg(count)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)
    }

    async fn len(&self, list: &str) -> Result<u64, StoreError> {
        let mut conn = self.connection().await?;
        redis::cmd("LLEN").arg(list).query_async(&mut conn).await.map_err(Self::map_err)
    }

    async fn range(&self, list: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connection().await?;
        redis::cmd("LRANGE")
            .arg(list)
            .arg(start)
            .arg(stop)
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)
    }

    async fn disconnect(&self) -> Result<(), StoreError> {
        self.manager.lock().take();
        Ok(())
    }
}

#[cfg(test)]
#[path = "redis_store_tests.rs"]
mod tests;
