// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline driver: composes the stage chain and owns its lifecycle.
//!
//! Shutdown sequencing: set the latch on the match stage so nothing new
//! is consumed, stop the match task, and let the closing of each input
//! slot cascade down the chain until in-flight work drains. Stages that
//! outlive the drain deadline are interrupted.

use crate::config::WorkerConfig;
use crate::match_stage::MatchStage;
use crate::stage::{spawn_stage, stage_channel, ErrorReport, StageHandle};
use crate::stages::{ExecuteHandler, InputFetchHandler, ReportHandler};
use crate::worker_context::WorkerContext;
use pw_core::Clock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("stage '{0}' panicked")]
    StagePanicked(&'static str),
}

/// The graceful-shutdown latch on the match stage.
///
/// Setting it makes match iterations no-ops; in-flight work downstream
/// keeps draining.
#[derive(Clone, Default)]
pub struct ShutdownLatch {
    flag: Arc<AtomicBool>,
}

impl ShutdownLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Capacity of the error-sink channel shared by all stages.
const ERROR_SINK_CAPACITY: usize = 16;

/// A running worker pipeline: match → input fetch → execute → report.
pub struct Pipeline {
    match_task: JoinHandle<()>,
    match_cancel: CancellationToken,
    stage_tasks: Vec<(&'static str, JoinHandle<()>)>,
    shutdown: ShutdownLatch,
    interrupt: CancellationToken,
    errors: mpsc::Receiver<ErrorReport>,
    execute: StageHandle,
}

impl Pipeline {
    /// Wire the stage chain and launch one task per stage.
    pub fn start<C: Clock>(
        worker_context: Arc<dyn WorkerContext>,
        clock: C,
        config: &WorkerConfig,
    ) -> Self {
        let interrupt = CancellationToken::new();
        let match_cancel = interrupt.child_token();
        let shutdown = ShutdownLatch::new();
        if config.graceful_shutdown {
            shutdown.set();
        }
        let (errors_tx, errors_rx) = mpsc::channel(ERROR_SINK_CAPACITY);

        let report: Arc<dyn crate::stage::StageHandler> =
            Arc::new(ReportHandler::new(Arc::clone(&worker_context), clock.clone()));
        let (report_handle, report_input) = stage_channel(report, config.report_width);

        let execute: Arc<dyn crate::stage::StageHandler> = Arc::new(ExecuteHandler::new(
            Arc::clone(&worker_context),
            clock.clone(),
            config.execute_width,
        ));
        let (execute_handle, execute_input) = stage_channel(execute, config.execute_width);

        let input_fetch: Arc<dyn crate::stage::StageHandler> =
            Arc::new(InputFetchHandler::new(Arc::clone(&worker_context), clock.clone()));
        let (input_fetch_handle, input_fetch_input) =
            stage_channel(input_fetch, config.input_fetch_width);

        let stage_tasks = vec![
            (
                "input-fetch",
                spawn_stage(
                    input_fetch_input,
                    Some(execute_handle.clone()),
                    errors_tx.clone(),
                    interrupt.child_token(),
                ),
            ),
            (
                "execute",
                spawn_stage(
                    execute_input,
                    Some(report_handle),
                    errors_tx.clone(),
                    interrupt.child_token(),
                ),
            ),
            ("report", spawn_stage(report_input, None, errors_tx.clone(), interrupt.child_token())),
        ];

        let match_stage = MatchStage::new(
            worker_context,
            clock,
            input_fetch_handle,
            errors_tx,
            shutdown.clone(),
            match_cancel.clone(),
        );
        let match_task = tokio::spawn(match_stage.run());

        info!(worker = %config.name, "pipeline started");
        Pipeline {
            match_task,
            match_cancel,
            stage_tasks,
            shutdown,
            interrupt,
            errors: errors_rx,
            execute: execute_handle,
        }
    }

    /// The match stage's graceful-shutdown latch.
    pub fn shutdown_latch(&self) -> ShutdownLatch {
        self.shutdown.clone()
    }

    /// The execute stage's upstream surface, exposed for saturation
    /// checks (`admission().is_full()`).
    pub fn execute_stage(&self) -> &StageHandle {
        &self.execute
    }

    /// Receive contexts routed to the error sink.
    pub async fn next_error(&mut self) -> Option<ErrorReport> {
        self.errors.recv().await
    }

    /// Interrupt every stage without waiting for drain.
    pub fn interrupt_all(&self) {
        self.interrupt.cancel();
    }

    /// Stop ingestion, drain in-flight work, then interrupt whatever is
    /// left past `drain_deadline`. Joins every stage task before
    /// returning.
    pub async fn shutdown(self, drain_deadline: Duration) -> Result<(), PipelineError> {
        let Pipeline { match_task, match_cancel, stage_tasks, shutdown, interrupt, errors, execute } =
            self;
        info!("pipeline shutting down");
        shutdown.set();
        match_cancel.cancel();
        let mut panicked: Option<&'static str> = None;
        if let Err(e) = match_task.await {
            if e.is_panic() {
                panicked = Some("match");
            }
        }
        // The match stage held the only sender into input-fetch; with it
        // gone, each stage's input closes once its predecessor drains.
        drop(execute);
        drop(errors);

        let deadline = tokio::time::Instant::now() + drain_deadline;
        let mut interrupted = false;
        for (name, mut task) in stage_tasks {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let joined = match tokio::time::timeout(remaining, &mut task).await {
                Ok(result) => result,
                Err(_) => {
                    if !interrupted {
                        warn!("drain deadline exceeded, interrupting remaining stages");
                        interrupt.cancel();
                        interrupted = true;
                    }
                    // The interrupt unwinds cooperatively; abort is the
                    // backstop for a handler stuck in an opaque await.
                    match tokio::time::timeout(Duration::from_secs(1), &mut task).await {
                        Ok(result) => result,
                        Err(_) => {
                            task.abort();
                            task.await
                        }
                    }
                }
            };
            if let Err(e) = joined {
                if e.is_panic() {
                    panicked = Some(name);
                }
            }
        }
        match panicked {
            Some(name) => Err(PipelineError::StagePanicked(name)),
            None => {
                info!("pipeline stopped");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;
