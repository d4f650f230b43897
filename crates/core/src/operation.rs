// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operation descriptor and executed-action metadata.

use crate::digest::Digest;
use crate::stage::ExecutionStage;
use crate::worker::WorkerId;
use serde::{Deserialize, Serialize};

/// Timestamps and attribution accumulated while a worker holds an action.
///
/// Stages fill this in incrementally: match seeds attribution and queue
/// timing, input fetch and execute stamp their own windows, report closes
/// it out. All timestamps are epoch milliseconds; zero means "not reached".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutedActionMetadata {
    /// Worker that performed (or is performing) the execution.
    #[serde(default)]
    pub worker: String,
    #[serde(default)]
    pub action_digest: Digest,
    /// Digest of the queued-operation blob this attempt was matched from.
    #[serde(default)]
    pub queued_operation_digest: Digest,
    #[serde(default)]
    pub stage: ExecutionStage,
    #[serde(default)]
    pub queued_at_ms: u64,
    #[serde(default)]
    pub worker_start_at_ms: u64,
    #[serde(default)]
    pub worker_completed_at_ms: u64,
    #[serde(default)]
    pub input_fetch_start_at_ms: u64,
    #[serde(default)]
    pub input_fetch_completed_at_ms: u64,
    #[serde(default)]
    pub execution_start_at_ms: u64,
    #[serde(default)]
    pub execution_completed_at_ms: u64,
    #[serde(default)]
    pub output_upload_start_at_ms: u64,
    #[serde(default)]
    pub output_upload_completed_at_ms: u64,
    /// Stream names clients follow for live output.
    #[serde(default)]
    pub stdout_stream_name: String,
    #[serde(default)]
    pub stderr_stream_name: String,
}

impl ExecutedActionMetadata {
    pub fn for_worker(worker: &WorkerId) -> Self {
        Self { worker: worker.as_str().to_string(), ..Default::default() }
    }
}

/// A long-running server-side handle identifying one execution attempt.
///
/// The payload the server attaches (action result, status details) is
/// opaque to the worker core; only the name, done flag, and metadata are
/// interpreted here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub metadata: ExecutedActionMetadata,
    /// Terminal error message, when the attempt failed.
    #[serde(default)]
    pub error: Option<String>,
}

impl Operation {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }
}

#[cfg(test)]
#[path = "operation_tests.rs"]
mod tests;
