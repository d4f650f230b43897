// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test collaborators: a queue-backed [`WorkerContext`] stub.

use crate::error::StageError;
use crate::poller::Poller;
use crate::worker_context::{ActionResult, MatchListener, WorkerContext};
use async_trait::async_trait;
use parking_lot::Mutex;
use pw_backplane::{MemoryListStore, QueueError, WorkQueue};
use pw_core::{Digest, ExecutionStage, FakeClock, Operation, QueueEntry};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A [`WorkerContext`] wired to an in-memory [`WorkQueue`].
///
/// Matching dequeues JSON-encoded entries; acknowledgement removes them
/// from the dequeue list. Every collaborator call is recorded for
/// assertions, and the execute/fetch hooks can be scripted to fail or
/// stall.
pub struct QueueWorkerContext {
    name: String,
    queue: WorkQueue<MemoryListStore>,
    clock: FakeClock,
    dequeue_timeout: Duration,
    poller_period: Duration,
    cancel: CancellationToken,
    /// Every operation snapshot sent to the backplane, in order.
    pub operations: Mutex<Vec<Operation>>,
    /// Total liveness ticks across all pollers.
    pub polls: Arc<AtomicUsize>,
    pub fetched: Mutex<Vec<String>>,
    pub executed: Mutex<Vec<String>>,
    pub reported: Mutex<Vec<(String, ActionResult)>>,
    /// When set, `execute_action` fails with a transient error.
    pub fail_execute: AtomicBool,
    /// Artificial execution latency, for saturation tests.
    pub execute_delay: Mutex<Duration>,
}

impl QueueWorkerContext {
    pub fn new(name: &str, store: Arc<MemoryListStore>, queue_name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            queue: WorkQueue::new(store, queue_name),
            clock: FakeClock::new(),
            dequeue_timeout: Duration::from_millis(100),
            poller_period: Duration::from_millis(50),
            cancel: CancellationToken::new(),
            operations: Mutex::new(Vec::new()),
            polls: Arc::new(AtomicUsize::new(0)),
            fetched: Mutex::new(Vec::new()),
            executed: Mutex::new(Vec::new()),
            reported: Mutex::new(Vec::new()),
            fail_execute: AtomicBool::new(false),
            execute_delay: Mutex::new(Duration::ZERO),
        })
    }

    pub fn queue(&self) -> &WorkQueue<MemoryListStore> {
        &self.queue
    }

    pub fn clock(&self) -> FakeClock {
        self.clock.clone()
    }

    /// Unblock a match currently waiting on the queue.
    pub fn stop_matching(&self) {
        self.cancel.cancel();
    }

    /// Push an entry onto the pending list the way the server would.
    pub async fn enqueue(&self, entry: &QueueEntry) {
        #[allow(clippy::unwrap_used)]
        let raw = entry.to_json().unwrap();
        #[allow(clippy::unwrap_used)]
        self.queue.push(&raw).await.unwrap();
    }
}

/// Build a queue entry with the given operation name.
pub fn test_entry(operation_name: &str) -> QueueEntry {
    let mut entry = QueueEntry {
        action_digest: Digest::new(format!("action-{operation_name}"), 64),
        queued_operation_digest: Digest::new(format!("queued-{operation_name}"), 128),
        ..Default::default()
    };
    entry.execute_entry.operation_name = operation_name.to_string();
    entry.execute_entry.stdout_stream_name = format!("{operation_name}/streams/stdout");
    entry.execute_entry.stderr_stream_name = format!("{operation_name}/streams/stderr");
    entry.execute_entry.queued_at_ms = 500_000;
    entry
}

#[async_trait]
impl WorkerContext for QueueWorkerContext {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_entry(&self, listener: &mut dyn MatchListener) -> Result<(), StageError> {
        listener.on_wait_start();
        let raw = self.queue.dequeue(self.dequeue_timeout, &self.cancel).await;
        listener.on_wait_end();
        match raw {
            Ok(Some(raw)) => match QueueEntry::from_json(&raw) {
                Ok(entry) => {
                    listener.on_entry(Some(entry)).await?;
                    Ok(())
                }
                Err(e) => {
                    listener.on_error(StageError::Fatal(e.to_string()));
                    Ok(())
                }
            },
            Ok(None) => {
                listener.on_entry(None).await?;
                Ok(())
            }
            Err(QueueError::Cancelled) => Err(StageError::Cancelled),
            Err(e) => {
                listener.on_error(e.into());
                Ok(())
            }
        }
    }

    fn create_poller(&self, _stage_name: &str, _entry: &QueueEntry, stage: ExecutionStage) -> Poller {
        let polls = Arc::clone(&self.polls);
        Poller::start(self.poller_period, stage, move |_stage| {
            polls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(true)
        })
    }

    async fn put_operation(&self, operation: &Operation) -> Result<bool, StageError> {
        self.operations.lock().push(operation.clone());
        Ok(true)
    }

    async fn fetch_inputs(&self, entry: &QueueEntry) -> Result<(), StageError> {
        self.fetched.lock().push(entry.operation_name().to_string());
        Ok(())
    }

    async fn execute_action(&self, entry: &QueueEntry) -> Result<ActionResult, StageError> {
        let delay = *self.execute_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_execute.load(Ordering::SeqCst) {
            return Err(StageError::Transient("scripted execution failure".to_string()));
        }
        self.executed.lock().push(entry.operation_name().to_string());
        Ok(ActionResult {
            exit_code: 0,
            stdout_digest: Some(Digest::new(format!("stdout-{}", entry.operation_name()), 8)),
            stderr_digest: None,
        })
    }

    async fn report_result(
        &self,
        entry: &QueueEntry,
        result: &ActionResult,
    ) -> Result<(), StageError> {
        self.reported.lock().push((entry.operation_name().to_string(), result.clone()));
        Ok(())
    }

    async fn ack(&self, entry: &QueueEntry) -> Result<bool, StageError> {
        let raw = entry.to_json().map_err(|e| StageError::Fatal(e.to_string()))?;
        Ok(self.queue.remove_from_dequeue(&raw).await?)
    }
}
