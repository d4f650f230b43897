// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue entry types: the work items that travel through the backplane lists.

use crate::digest::Digest;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors decoding a queue entry off the wire.
#[derive(Debug, Error)]
pub enum EntryError {
    #[error("invalid queue entry payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Client-supplied request attribution, carried through unmodified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetadata {
    #[serde(default)]
    pub tool_name: String,
    #[serde(default)]
    pub tool_version: String,
    #[serde(default)]
    pub tool_invocation_id: String,
    #[serde(default)]
    pub correlated_invocations_id: String,
}

/// One platform requirement: a name/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformProperty {
    pub name: String,
    pub value: String,
}

/// Platform requirements for an action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    #[serde(default)]
    pub properties: Vec<PlatformProperty>,
}

impl Platform {
    /// Look up a property value by name.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.iter().find(|p| p.name == name).map(|p| p.value.as_str())
    }

    /// The `min-cores` property parsed as a core count, if present and valid.
    pub fn min_cores(&self) -> Option<u32> {
        self.property("min-cores").and_then(|v| v.parse().ok())
    }
}

/// The execute request attached to a queue entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteEntry {
    /// Long-running operation name this entry executes under.
    pub operation_name: String,
    /// Stream name the action's stdout is published to.
    #[serde(default)]
    pub stdout_stream_name: String,
    /// Stream name the action's stderr is published to.
    #[serde(default)]
    pub stderr_stream_name: String,
    #[serde(default)]
    pub request_metadata: RequestMetadata,
    /// When the server queued the operation, epoch milliseconds.
    #[serde(default)]
    pub queued_at_ms: u64,
}

/// A dequeued work item: everything a worker needs to run one action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub execute_entry: ExecuteEntry,
    /// Digest of the action to execute.
    pub action_digest: Digest,
    /// Digest of the queued-operation blob in the CAS.
    pub queued_operation_digest: Digest,
    #[serde(default)]
    pub platform: Platform,
}

impl QueueEntry {
    /// Encode for storage in a backplane list.
    pub fn to_json(&self) -> Result<String, EntryError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a backplane list value.
    pub fn from_json(raw: &str) -> Result<Self, EntryError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn operation_name(&self) -> &str {
        &self.execute_entry.operation_name
    }
}

#[cfg(test)]
#[path = "entry_tests.rs"]
mod tests;
