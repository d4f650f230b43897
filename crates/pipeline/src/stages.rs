// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stage handlers downstream of match: input fetch, execute, report.

use crate::context::{OperationContext, OperationContextBuilder};
use crate::error::StageError;
use crate::stage::StageHandler;
use crate::worker_context::WorkerContext;
use async_trait::async_trait;
use pw_core::{Clock, ExecutionStage, QueueEntry};
use std::sync::Arc;
use tracing::{debug, warn};

fn require_entry(builder: &OperationContextBuilder) -> Result<QueueEntry, StageError> {
    builder
        .queue_entry()
        .cloned()
        .ok_or_else(|| StageError::Fatal("operation context has no queue entry".to_string()))
}

/// Materializes the action's inputs.
pub struct InputFetchHandler<C: Clock> {
    worker_context: Arc<dyn WorkerContext>,
    clock: C,
}

impl<C: Clock> InputFetchHandler<C> {
    pub fn new(worker_context: Arc<dyn WorkerContext>, clock: C) -> Self {
        Self { worker_context, clock }
    }
}

#[async_trait]
impl<C: Clock> StageHandler for InputFetchHandler<C> {
    fn name(&self) -> &'static str {
        "input-fetch"
    }

    async fn handle(&self, ctx: OperationContext) -> Result<OperationContext, StageError> {
        let mut builder = ctx.thaw();
        let entry = require_entry(&builder)?;
        if let Some(poller) = builder.poller() {
            poller.resume(ExecutionStage::Queued);
        }
        builder.metadata_mut().input_fetch_start_at_ms = self.clock.epoch_ms();
        let fetched = self.worker_context.fetch_inputs(&entry).await;
        builder.metadata_mut().input_fetch_completed_at_ms = self.clock.epoch_ms();
        if let Some(poller) = builder.poller() {
            poller.pause();
        }
        fetched?;
        debug!(operation = %entry.operation_name(), "inputs fetched");
        Ok(builder.freeze())
    }
}

/// Runs the action. Superscalar: each operation claims as many slots as
/// the cores it requests.
pub struct ExecuteHandler<C: Clock> {
    worker_context: Arc<dyn WorkerContext>,
    clock: C,
    width: u32,
}

impl<C: Clock> ExecuteHandler<C> {
    pub fn new(worker_context: Arc<dyn WorkerContext>, clock: C, width: u32) -> Self {
        Self { worker_context, clock, width: width.max(1) }
    }
}

#[async_trait]
impl<C: Clock> StageHandler for ExecuteHandler<C> {
    fn name(&self) -> &'static str {
        "execute"
    }

    /// The entry's `min-cores` platform property, clamped to the stage
    /// width so one action can never demand more than the stage has.
    fn claims_required(&self, ctx: &OperationContext) -> u32 {
        ctx.queue_entry()
            .and_then(|e| e.platform.min_cores())
            .unwrap_or(1)
            .clamp(1, self.width)
    }

    async fn handle(&self, ctx: OperationContext) -> Result<OperationContext, StageError> {
        let mut builder = ctx.thaw();
        let entry = require_entry(&builder)?;
        if let Some(poller) = builder.poller() {
            poller.resume(ExecutionStage::Executing);
        }
        builder.metadata_mut().stage = ExecutionStage::Executing;
        builder.metadata_mut().execution_start_at_ms = self.clock.epoch_ms();
        let result = self.worker_context.execute_action(&entry).await;
        builder.metadata_mut().execution_completed_at_ms = self.clock.epoch_ms();
        if let Some(poller) = builder.poller() {
            poller.pause();
        }
        let result = result?;
        debug!(
            operation = %entry.operation_name(),
            exit_code = result.exit_code,
            "action executed"
        );
        builder.set_action_result(result);
        Ok(builder.freeze())
    }
}

/// Terminal stage: uploads the result, closes out the operation, and
/// acknowledges the queue entry.
pub struct ReportHandler<C: Clock> {
    worker_context: Arc<dyn WorkerContext>,
    clock: C,
}

impl<C: Clock> ReportHandler<C> {
    pub fn new(worker_context: Arc<dyn WorkerContext>, clock: C) -> Self {
        Self { worker_context, clock }
    }
}

#[async_trait]
impl<C: Clock> StageHandler for ReportHandler<C> {
    fn name(&self) -> &'static str {
        "report"
    }

    async fn handle(&self, ctx: OperationContext) -> Result<OperationContext, StageError> {
        let mut builder = ctx.thaw();
        let entry = require_entry(&builder)?;
        let result = builder
            .action_result()
            .cloned()
            .ok_or_else(|| StageError::Fatal("operation context has no action result".to_string()))?;
        if let Some(poller) = builder.poller() {
            poller.resume(ExecutionStage::Executing);
        }
        builder.metadata_mut().output_upload_start_at_ms = self.clock.epoch_ms();
        let reported = self.worker_context.report_result(&entry, &result).await;
        builder.metadata_mut().output_upload_completed_at_ms = self.clock.epoch_ms();
        reported?;

        {
            let metadata = builder.metadata_mut();
            metadata.stage = ExecutionStage::Completed;
            metadata.worker_completed_at_ms = self.clock.epoch_ms();
        }
        builder.operation_mut().done = true;

        // The entry is durably committed; acknowledge and stop keeping it
        // alive. The poller must be gone before the ack, or a tick could
        // re-assert an entry the queue no longer tracks.
        if let Some(poller) = builder.poller() {
            poller.terminate();
        }
        match self.worker_context.ack(&entry).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(operation = %entry.operation_name(), "entry already absent at ack");
            }
            Err(e) => {
                warn!(operation = %entry.operation_name(), error = %e, "ack failed");
            }
        }

        let ctx = builder.freeze();
        // Final operation state is best-effort, like every other update.
        let snapshot = ctx.operation_snapshot();
        match self.worker_context.put_operation(&snapshot).await {
            Ok(true) => {}
            Ok(false) => warn!(operation = %snapshot.name, "backplane refused final update"),
            Err(e) => warn!(operation = %snapshot.name, error = %e, "final update failed"),
        }
        debug!(operation = %snapshot.name, "operation reported");
        Ok(ctx)
    }
}

#[cfg(test)]
#[path = "stages_tests.rs"]
mod tests;
