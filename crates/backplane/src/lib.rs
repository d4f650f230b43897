// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pw-backplane: the shared-store seam and the distributed work queue.
//!
//! The backplane is an opaque list store (Redis-compatible) holding one
//! pending list per logical queue plus an in-flight `_dequeue` sibling.
//! [`WorkQueue`] layers at-least-once dequeue semantics on top of the
//! store's atomic list-move primitive.

pub mod error;
pub mod memory;
pub mod queue;
pub mod redis_store;
pub mod store;

pub use error::{QueueError, StoreError};
pub use memory::MemoryListStore;
pub use queue::{WorkQueue, DEQUEUE_SUFFIX, VISIT_PAGE_SIZE};
pub use redis_store::RedisListStore;
pub use store::ListStore;
