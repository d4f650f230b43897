// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-operation pipeline context.
//!
//! The context travels the pipeline frozen; the stage currently holding
//! an operation thaws it, mutates, and freezes again before the handoff.
//! The mutable phase is therefore never aliased across tasks.

use crate::error::StageError;
use crate::poller::Poller;
use crate::worker_context::ActionResult;
use pw_core::{ExecutedActionMetadata, Operation, QueueEntry};

/// Mutable phase of an operation context, owned by exactly one stage.
#[derive(Default)]
pub struct OperationContextBuilder {
    operation: Operation,
    metadata: ExecutedActionMetadata,
    queue_entry: Option<QueueEntry>,
    poller: Option<Poller>,
    action_result: Option<ActionResult>,
}

impl OperationContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_operation(&mut self, operation: Operation) {
        self.operation = operation;
    }

    pub fn operation_mut(&mut self) -> &mut Operation {
        &mut self.operation
    }

    pub fn metadata_mut(&mut self) -> &mut ExecutedActionMetadata {
        &mut self.metadata
    }

    pub fn set_queue_entry(&mut self, entry: QueueEntry) {
        self.queue_entry = Some(entry);
    }

    pub fn set_action_result(&mut self, result: ActionResult) {
        self.action_result = Some(result);
    }

    /// Install the liveness poller. At most one poller may ever be
    /// installed; a second installation is an invariant breach.
    pub fn install_poller(&mut self, poller: Poller) -> Result<(), StageError> {
        if self.poller.is_some() {
            return Err(StageError::Fatal("poller already installed".to_string()));
        }
        self.poller = Some(poller);
        Ok(())
    }

    pub fn poller(&self) -> Option<&Poller> {
        self.poller.as_ref()
    }

    pub fn queue_entry(&self) -> Option<&QueueEntry> {
        self.queue_entry.as_ref()
    }

    pub fn action_result(&self) -> Option<&ActionResult> {
        self.action_result.as_ref()
    }

    /// End the mutable phase; the result is what crosses stage
    /// boundaries.
    pub fn freeze(self) -> OperationContext {
        OperationContext {
            operation: self.operation,
            metadata: self.metadata,
            queue_entry: self.queue_entry,
            poller: self.poller,
            action_result: self.action_result,
        }
    }
}

/// Immutable handoff value between stages.
///
/// After MatchStage the queue entry is always present and the poller is
/// installed; both hold until the report stage terminates the poller and
/// drops the context.
pub struct OperationContext {
    operation: Operation,
    metadata: ExecutedActionMetadata,
    queue_entry: Option<QueueEntry>,
    poller: Option<Poller>,
    action_result: Option<ActionResult>,
}

impl OperationContext {
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn metadata(&self) -> &ExecutedActionMetadata {
        &self.metadata
    }

    pub fn queue_entry(&self) -> Option<&QueueEntry> {
        self.queue_entry.as_ref()
    }

    pub fn poller(&self) -> Option<&Poller> {
        self.poller.as_ref()
    }

    pub fn action_result(&self) -> Option<&ActionResult> {
        self.action_result.as_ref()
    }

    /// The operation with current metadata merged, as reported to the
    /// backplane.
    pub fn operation_snapshot(&self) -> Operation {
        let mut operation = self.operation.clone();
        operation.metadata = self.metadata.clone();
        operation
    }

    /// Resume the mutable phase. The caller is the sole owner.
    pub fn thaw(self) -> OperationContextBuilder {
        OperationContextBuilder {
            operation: self.operation,
            metadata: self.metadata,
            queue_entry: self.queue_entry,
            poller: self.poller,
            action_result: self.action_result,
        }
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
