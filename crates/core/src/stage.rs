// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution stage of an operation as reported to the backplane.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an operation currently sits in its lifecycle.
///
/// Mirrors the Remote Execution API stage enum. The worker pipeline only
/// ever asserts `Queued`, `Executing`, and `Completed`; the others exist so
/// round-trips through the backplane are lossless.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStage {
    #[default]
    Unknown,
    CacheCheck,
    Queued,
    Executing,
    Completed,
}

impl fmt::Display for ExecutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionStage::Unknown => "unknown",
            ExecutionStage::CacheCheck => "cache_check",
            ExecutionStage::Queued => "queued",
            ExecutionStage::Executing => "executing",
            ExecutionStage::Completed => "completed",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
#[path = "stage_tests.rs"]
mod tests;
