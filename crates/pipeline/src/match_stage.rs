// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The entry stage: pull one queue entry, seed the operation context,
//! hand it downstream.
//!
//! Capacity on the successor is claimed before matching, so a matched
//! entry is never stuck without a slot to land in. When the
//! graceful-shutdown latch is set, iterations become no-ops and nothing
//! further is consumed from the queue.

use crate::context::{OperationContext, OperationContextBuilder};
use crate::driver::ShutdownLatch;
use crate::error::StageError;
use crate::stage::{ErrorReport, StageClaim, StageHandle};
use crate::worker_context::{MatchListener, WorkerContext};
use async_trait::async_trait;
use pw_core::{Clock, ExecutionStage, Operation, QueueEntry};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Delay between iterations while the shutdown latch is set.
const LATCHED_IDLE: Duration = Duration::from_millis(50);

/// Backoff after a transient iteration failure.
const FAILURE_BACKOFF: Duration = Duration::from_millis(100);

pub struct MatchStage<C: Clock> {
    worker_context: Arc<dyn WorkerContext>,
    clock: C,
    output: StageHandle,
    errors: mpsc::Sender<ErrorReport>,
    shutdown: ShutdownLatch,
    cancel: CancellationToken,
}

impl<C: Clock> MatchStage<C> {
    pub fn new(
        worker_context: Arc<dyn WorkerContext>,
        clock: C,
        output: StageHandle,
        errors: mpsc::Sender<ErrorReport>,
        shutdown: ShutdownLatch,
        cancel: CancellationToken,
    ) -> Self {
        Self { worker_context, clock, output, errors, shutdown, cancel }
    }

    /// Loop iterations until cancelled, terminated downstream, or a fatal
    /// failure. Dropping the stage afterwards closes the successor's
    /// input, which is what lets the rest of the pipeline drain.
    pub async fn run(self) {
        info!(stage = "match", worker = self.worker_context.name(), "stage started");
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            match self.iterate().await {
                Ok(()) => {}
                Err(StageError::Cancelled) | Err(StageError::Terminated) => break,
                Err(e @ StageError::Fatal(_)) => {
                    // Unrecoverable to the driver.
                    error!(stage = "match", error = %e, "fatal failure, aborting stage");
                    break;
                }
                Err(e) => {
                    warn!(stage = "match", error = %e, "iteration failed");
                    tokio::select! {
                        _ = tokio::time::sleep(FAILURE_BACKOFF) => {}
                        _ = self.cancel.cancelled() => break,
                    }
                }
            }
        }
        info!(stage = "match", "stage stopped");
    }

    /// One match attempt.
    ///
    /// Claims the successor first; a refused claim means the pipeline is
    /// terminating. An unmatched attempt releases the claim when the
    /// listener drops.
    pub async fn iterate(&self) -> Result<(), StageError> {
        if self.shutdown.is_set() {
            tokio::select! {
                _ = tokio::time::sleep(LATCHED_IDLE) => return Ok(()),
                _ = self.cancel.cancelled() => return Err(StageError::Cancelled),
            }
        }
        let started = Instant::now();
        let ctx = OperationContextBuilder::new().freeze();
        let claim = self.output.claim(&ctx, &self.cancel).await?;

        let mut listener = MatchStageListener {
            stage: self,
            claim: Some(claim),
            builder: Some(ctx.thaw()),
            matched: false,
            error: None,
            wait_start: None,
            waited: Duration::ZERO,
        };
        self.worker_context.match_entry(&mut listener).await?;
        if let Some(error) = listener.error.take() {
            return Err(error);
        }
        if listener.matched {
            debug!(
                stage = "match",
                waited_ms = listener.waited.as_millis() as u64,
                total_ms = started.elapsed().as_millis() as u64,
                "matched and forwarded"
            );
        }
        Ok(())
    }
}

struct MatchStageListener<'a, C: Clock> {
    stage: &'a MatchStage<C>,
    claim: Option<StageClaim>,
    builder: Option<OperationContextBuilder>,
    matched: bool,
    error: Option<StageError>,
    wait_start: Option<Instant>,
    waited: Duration,
}

impl<C: Clock> MatchStageListener<'_, C> {
    /// The entry is ours: report it queued under this worker, pause the
    /// poller for the handoff, and transfer the context downstream.
    async fn on_operation_polled(
        &mut self,
        builder: OperationContextBuilder,
    ) -> Result<(), StageError> {
        let ctx = builder.freeze();
        self.put_operation_best_effort(&ctx).await;
        if let Some(poller) = ctx.poller() {
            poller.pause();
        }
        let Some(claim) = self.claim.take() else {
            // Cannot forward: redirect to the error sink and re-raise.
            let operation = ctx.operation().name.clone();
            let error = StageError::Fatal("match forwarded without a held claim".to_string());
            let _ = self
                .stage
                .errors
                .send(ErrorReport {
                    stage: "match",
                    operation,
                    error: StageError::Fatal("match forwarded without a held claim".to_string()),
                    context: Some(ctx),
                })
                .await;
            return Err(error);
        };
        claim.put(ctx);
        Ok(())
    }

    async fn put_operation_best_effort(&self, ctx: &OperationContext) {
        let snapshot = ctx.operation_snapshot();
        match self.stage.worker_context.put_operation(&snapshot).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(operation = %snapshot.name, "backplane refused operation update");
            }
            Err(e) => {
                warn!(operation = %snapshot.name, error = %e, "operation update failed");
            }
        }
    }
}

#[async_trait]
impl<C: Clock> MatchListener for MatchStageListener<'_, C> {
    fn on_wait_start(&mut self) {
        self.wait_start = Some(Instant::now());
    }

    fn on_wait_end(&mut self) {
        if let Some(started) = self.wait_start.take() {
            self.waited += started.elapsed();
        }
    }

    async fn on_entry(&mut self, entry: Option<QueueEntry>) -> Result<bool, StageError> {
        let Some(entry) = entry else {
            // No match; the unused claim releases with the listener.
            return Ok(false);
        };
        let Some(mut builder) = self.builder.take() else {
            return Err(StageError::Fatal("match listener delivered twice".to_string()));
        };

        builder.set_operation(Operation::named(entry.operation_name()));
        {
            let metadata = builder.metadata_mut();
            metadata.worker = self.stage.worker_context.name().to_string();
            metadata.stage = ExecutionStage::Queued;
            metadata.action_digest = entry.action_digest.clone();
            metadata.queued_operation_digest = entry.queued_operation_digest.clone();
            metadata.queued_at_ms = entry.execute_entry.queued_at_ms;
            metadata.worker_start_at_ms = self.stage.clock.epoch_ms();
            metadata.stdout_stream_name = entry.execute_entry.stdout_stream_name.clone();
            metadata.stderr_stream_name = entry.execute_entry.stderr_stream_name.clone();
        }

        let poller =
            self.stage.worker_context.create_poller("match", &entry, ExecutionStage::Queued);
        builder.install_poller(poller)?;
        builder.set_queue_entry(entry);

        self.on_operation_polled(builder).await?;
        self.matched = true;
        Ok(true)
    }

    fn on_error(&mut self, error: StageError) {
        self.error = Some(error);
    }
}

#[cfg(test)]
#[path = "match_stage_tests.rs"]
mod tests;
