// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The seam between the pipeline and the rest of the worker.
//!
//! Everything the pipeline needs from its host (matching against the
//! distributed queue, poller construction, operation reporting, CAS
//! traffic) arrives through [`WorkerContext`]. The pipeline owns no
//! durable state of its own.

use crate::error::StageError;
use crate::poller::Poller;
use async_trait::async_trait;
use pw_core::{Digest, ExecutionStage, Operation, QueueEntry};
use serde::{Deserialize, Serialize};

/// Outcome of executing one action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub exit_code: i32,
    #[serde(default)]
    pub stdout_digest: Option<Digest>,
    #[serde(default)]
    pub stderr_digest: Option<Digest>,
}

/// Receiver for one match attempt.
///
/// `on_entry` is reentrant into the pipeline: the match stage's listener
/// forwards the operation downstream from inside the callback and may
/// block there until the successor stage accepts.
#[async_trait]
pub trait MatchListener: Send {
    /// The matcher is about to block waiting for an entry.
    fn on_wait_start(&mut self);

    /// The matcher stopped waiting (an entry arrived or the wait ended).
    fn on_wait_end(&mut self);

    /// Deliver the match result. `None` means nothing was available.
    /// Returns whether the listener committed to the entry; on `false`
    /// the matcher may re-queue or drop the attempt.
    async fn on_entry(&mut self, entry: Option<QueueEntry>) -> Result<bool, StageError>;

    /// Surface a matcher failure to the stage.
    fn on_error(&mut self, error: StageError);
}

/// Host services the pipeline depends on.
#[async_trait]
pub trait WorkerContext: Send + Sync + 'static {
    /// Stable worker identifier.
    fn name(&self) -> &str;

    /// Block until one queue entry is matched and delivered to
    /// `listener`, or until the worker is shutting down.
    async fn match_entry(&self, listener: &mut dyn MatchListener) -> Result<(), StageError>;

    /// Build a poller for a held entry, already ACTIVE at `stage`.
    fn create_poller(&self, stage_name: &str, entry: &QueueEntry, stage: ExecutionStage) -> Poller;

    /// Best-effort operation state update to the backplane. Returns
    /// whether the backplane accepted it.
    async fn put_operation(&self, operation: &Operation) -> Result<bool, StageError>;

    /// Materialize the action's inputs before execution.
    async fn fetch_inputs(&self, entry: &QueueEntry) -> Result<(), StageError>;

    /// Run the action to completion.
    async fn execute_action(&self, entry: &QueueEntry) -> Result<ActionResult, StageError>;

    /// Upload outputs and publish the result.
    async fn report_result(&self, entry: &QueueEntry, result: &ActionResult)
        -> Result<(), StageError>;

    /// Acknowledge the entry: remove it from the in-flight dequeue list.
    /// Returns whether an occurrence was removed.
    async fn ack(&self, entry: &QueueEntry) -> Result<bool, StageError>;
}
