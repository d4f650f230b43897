// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backplane error types.

use thiserror::Error;

/// Errors surfaced by a [`crate::ListStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The transport was forcibly closed, usually by a cancellation path.
    #[error("backplane connection closed")]
    ConnectionClosed,

    /// Transport-level failure; the operation may succeed on retry after
    /// a reconnect.
    #[error("transient backplane error: {0}")]
    Transient(String),

    /// The store rejected the request itself; retrying will not help.
    #[error("backplane request failed: {0}")]
    Invalid(String),
}

/// Errors surfaced by [`crate::WorkQueue`] operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The caller was cancelled while the operation was pending.
    #[error("queue operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QueueError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, QueueError::Cancelled)
    }
}
