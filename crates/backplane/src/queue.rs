// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The distributed work queue.
//!
//! Two lists per logical queue: the pending list `Q` and the in-flight
//! sibling `Q_dequeue`. A dequeue is a single atomic move between them,
//! so every taken entry is in exactly one of {`Q`, `Q_dequeue`,
//! committed-to-pipeline} at all times. Entries stranded in the dequeue
//! list by a crashed worker are reachable by name for the external
//! recovery sweep.

use crate::error::{QueueError, StoreError};
use crate::store::ListStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Suffix of the in-flight sibling list. Reserved: queue names must not
/// end with it.
pub const DEQUEUE_SUFFIX: &str = "_dequeue";

/// Page size for [`WorkQueue::visit`] iteration.
pub const VISIT_PAGE_SIZE: usize = 10_000;

/// Delay before retrying a transient store failure.
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// A FIFO work queue with an in-flight dequeue list, over a [`ListStore`].
///
/// Values are opaque strings; callers encode their entries (the pipeline
/// stores queue entries as JSON).
pub struct WorkQueue<S> {
    store: Arc<S>,
    name: String,
    dequeue_name: String,
}

impl<S> Clone for WorkQueue<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            name: self.name.clone(),
            dequeue_name: self.dequeue_name.clone(),
        }
    }
}

impl<S: ListStore> WorkQueue<S> {
    pub fn new(store: Arc<S>, name: impl Into<String>) -> Self {
        let name = name.into();
        let dequeue_name = format!("{name}{DEQUEUE_SUFFIX}");
        Self { store, name, dequeue_name }
    }

    /// The pending list name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The in-flight sibling list name, inspectable by the recovery sweep.
    pub fn dequeue_name(&self) -> &str {
        &self.dequeue_name
    }

    /// Append a value to the tail of the pending list.
    pub async fn push(&self, value: &str) -> Result<(), QueueError> {
        self.push_with_priority(value, 1.0).await
    }

    /// As [`push`](WorkQueue::push). The priority is accepted for call
    /// compatibility with score-ordered queue variants and ignored by
    /// this FIFO variant.
    pub async fn push_with_priority(&self, value: &str, _priority: f64) -> Result<(), QueueError> {
        Ok(self.store.push_tail(&self.name, value).await?)
    }

    /// Atomically move the head of the pending list to the head of the
    /// dequeue list. Returns `None` when the pending list is empty.
    ///
    /// A caller whose token is already cancelled fails with
    /// [`QueueError::Cancelled`] before any entry is moved.
    pub async fn nonblocking_dequeue(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, QueueError> {
        if cancel.is_cancelled() {
            return Err(QueueError::Cancelled);
        }
        Ok(self.store.move_head(&self.name, &self.dequeue_name).await?)
    }

    /// As [`nonblocking_dequeue`](WorkQueue::nonblocking_dequeue), but
    /// waits up to `timeout` for an entry. Expiry returns `None`.
    ///
    /// Cancellation forcibly disconnects the transport so a server-side
    /// blocking pop cannot hold the entry hostage; a disconnect failure is
    /// logged and suppressed, `Cancelled` stays the primary error. A reply
    /// that is already available when cancellation fires is delivered (the
    /// token remains cancelled for the caller to observe). Transient store
    /// failures are retried with a reconnect inside the timeout budget.
    pub async fn dequeue(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, QueueError> {
        if timeout.is_zero() {
            return self.nonblocking_dequeue(cancel).await;
        }
        if cancel.is_cancelled() {
            return Err(QueueError::Cancelled);
        }
        let deadline = Instant::now() + timeout;
        loop {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return Ok(None);
            };
            let blocking = self.store.blocking_move_head(&self.name, &self.dequeue_name, remaining);
            tokio::pin!(blocking);
            tokio::select! {
                // A reply that races a pending cancel wins.
                biased;
                result = &mut blocking => match result {
                    Ok(value) => return Ok(value),
                    Err(e @ StoreError::Invalid(_)) => return Err(e.into()),
                    Err(e) => {
                        // ConnectionClosed during a cancel is the cancel.
                        if cancel.is_cancelled() {
                            return Err(QueueError::Cancelled);
                        }
                        warn!(queue = %self.name, error = %e, "dequeue failed, retrying");
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                },
                _ = cancel.cancelled() => {
                    if let Err(e) = self.store.disconnect().await {
                        // Suppressed: cancellation stays the primary error.
                        warn!(queue = %self.name, error = %e, "disconnect after cancel failed");
                    }
                    return Err(QueueError::Cancelled);
                }
            }
        }
    }

    /// Acknowledge a previously dequeued value by removing one occurrence
    /// from the dequeue list, scanning from the tail. Returns whether an
    /// occurrence was removed.
    pub async fn remove_from_dequeue(&self, value: &str) -> Result<bool, QueueError> {
        Ok(self.store.remove(&self.dequeue_name, -1, value).await? > 0)
    }

    /// Remove every occurrence of `value` from the pending list.
    pub async fn remove_all(&self, value: &str) -> Result<bool, QueueError> {
        Ok(self.store.remove(&self.name, 0, value).await? > 0)
    }

    /// Length of the pending list.
    pub async fn size(&self) -> Result<u64, QueueError> {
        Ok(self.store.len(&self.name).await?)
    }

    /// Visit every entry of the pending list in order.
    ///
    /// Iterates by pages of [`VISIT_PAGE_SIZE`]; the cursor advances by
    /// the size of the last returned page. The iteration is not a
    /// snapshot: concurrent mutation can skip or repeat entries.
    pub async fn visit(&self, visitor: &mut dyn FnMut(&str)) -> Result<(), QueueError> {
        self.visit_list(&self.name, visitor).await
    }

    /// As [`visit`](WorkQueue::visit), over the dequeue list.
    pub async fn visit_dequeue(&self, visitor: &mut dyn FnMut(&str)) -> Result<(), QueueError> {
        self.visit_list(&self.dequeue_name, visitor).await
    }

    async fn visit_list(
        &self,
        list: &str,
        visitor: &mut dyn FnMut(&str),
    ) -> Result<(), QueueError> {
        let page_size = VISIT_PAGE_SIZE as i64;
        let mut index = 0i64;
        loop {
            let page = self.store.range(list, index, index + page_size - 1).await?;
            for value in &page {
                visitor(value);
            }
            if (page.len() as i64) < page_size {
                return Ok(());
            }
            index += page.len() as i64;
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
