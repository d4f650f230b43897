// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory list store used by tests and single-process deployments.

use crate::error::StoreError;
use crate::store::ListStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Default)]
struct State {
    lists: HashMap<String, VecDeque<String>>,
    closed: bool,
}

/// [`ListStore`] backed by process memory.
///
/// Blocking moves wait on a [`Notify`] that fires on every push and on
/// [`disconnect`](ListStore::disconnect). Clones share the same lists.
#[derive(Clone, Default)]
pub struct MemoryListStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    changed: Notify,
}

impl MemoryListStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconnect if a previous disconnect left the transport closed.
    fn reopen(&self) {
        let mut state = self.inner.state.lock();
        state.closed = false;
    }

    fn move_head_locked(state: &mut State, src: &str, dst: &str) -> Option<String> {
        let value = state.lists.get_mut(src)?.pop_front()?;
        if state.lists.get(src).is_some_and(|l| l.is_empty()) {
            state.lists.remove(src);
        }
        state.lists.entry(dst.to_string()).or_default().push_front(value.clone());
        Some(value)
    }
}

#[async_trait]
impl ListStore for MemoryListStore {
    async fn push_tail(&self, list: &str, value: &str) -> Result<(), StoreError> {
        self.reopen();
        {
            let mut state = self.inner.state.lock();
            state.lists.entry(list.to_string()).or_default().push_back(value.to_string());
        }
        self.inner.changed.notify_waiters();
        Ok(())
    }

    async fn move_head(&self, src: &str, dst: &str) -> Result<Option<String>, StoreError> {
        self.reopen();
        let mut state = self.inner.state.lock();
        Ok(Self::move_head_locked(&mut state, src, dst))
    }

    async fn blocking_move_head(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> Result<Option<String>, StoreError> {
        self.reopen();
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.inner.changed.notified();
            tokio::pin!(notified);
            // Register for wakeups before checking so a push between the
            // check and the await cannot be missed.
            notified.as_mut().enable();
            {
                let mut state = self.inner.state.lock();
                if state.closed {
                    return Err(StoreError::ConnectionClosed);
                }
                if let Some(value) = Self::move_head_locked(&mut state, src, dst) {
                    return Ok(Some(value));
                }
            }
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return Ok(None);
            };
            if tokio::time::timeout(remaining, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn remove(&self, list: &str, count: i64, value: &str) -> Result<u64, StoreError> {
        self.reopen();
        let mut state = self.inner.state.lock();
        let Some(entries) = state.lists.get_mut(list) else {
            return Ok(0);
        };
        let limit = if count == 0 { usize::MAX } else { count.unsigned_abs() as usize };
        let mut removed = 0u64;
        if count < 0 {
            // Scan from the tail.
            let mut idx = entries.len();
            while idx > 0 && (removed as usize) < limit {
                idx -= 1;
                if entries[idx] == value {
                    entries.remove(idx);
                    removed += 1;
                }
            }
        } else {
            let mut idx = 0;
            while idx < entries.len() && (removed as usize) < limit {
                if entries[idx] == value {
                    entries.remove(idx);
                    removed += 1;
                } else {
                    idx += 1;
                }
            }
        }
        if entries.is_empty() {
            state.lists.remove(list);
        }
        Ok(removed)
    }

    async fn len(&self, list: &str) -> Result<u64, StoreError> {
        self.reopen();
        let state = self.inner.state.lock();
        Ok(state.lists.get(list).map_or(0, |l| l.len() as u64))
    }

    async fn range(&self, list: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError> {
        self.reopen();
        let state = self.inner.state.lock();
        let Some(entries) = state.lists.get(list) else {
            return Ok(Vec::new());
        };
        let len = entries.len() as i64;
        let normalize = |idx: i64| -> i64 {
            if idx < 0 {
                (len + idx).max(0)
            } else {
                idx
            }
        };
        let start = normalize(start);
        let stop = normalize(stop).min(len - 1);
        if start > stop || start >= len {
            return Ok(Vec::new());
        }
        Ok(entries.iter().skip(start as usize).take((stop - start + 1) as usize).cloned().collect())
    }

    async fn disconnect(&self) -> Result<(), StoreError> {
        {
            let mut state = self.inner.state.lock();
            state.closed = true;
        }
        self.inner.changed.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
