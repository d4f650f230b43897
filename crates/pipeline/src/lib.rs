// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pw-pipeline: the superscalar worker execution pipeline.
//!
//! Queued actions flow through ordered stages (match → input fetch →
//! execute → report). Each stage owns a bounded handoff slot and a task;
//! superscalar stages additionally bound in-flight operations with an
//! admission controller whose slot claims roll back on cancellation.
//! Stage capacity flows forward then backward: the downstream stage is
//! claimed before the upstream stage finalizes a transfer, and an unused
//! claim releases on drop.

pub mod admission;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod match_stage;
pub mod poller;
pub mod stage;
pub mod stages;
pub mod worker_context;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use admission::{Admission, AdmissionClaim};
pub use config::{ConfigError, PollerConfig, QueueConfig, WorkerConfig};
pub use context::{OperationContext, OperationContextBuilder};
pub use driver::{Pipeline, PipelineError, ShutdownLatch};
pub use error::StageError;
pub use match_stage::MatchStage;
pub use poller::{Poller, PollerState};
pub use stage::{
    spawn_stage, stage_channel, ErrorReport, StageClaim, StageHandle, StageHandler, StageInput,
};
pub use stages::{ExecuteHandler, InputFetchHandler, ReportHandler};
pub use worker_context::{ActionResult, MatchListener, WorkerContext};
