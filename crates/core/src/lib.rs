// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pw-core: data model for the piecework execution worker.
//!
//! Value types shared by the backplane and the pipeline: digests, queue
//! entries, operations, execution stages, worker identity, and the clock
//! abstraction used to stamp execution metadata.

pub mod clock;
pub mod digest;
pub mod entry;
pub mod operation;
pub mod stage;
pub mod worker;

pub use clock::{Clock, FakeClock, SystemClock};
pub use digest::Digest;
pub use entry::{EntryError, ExecuteEntry, Platform, PlatformProperty, QueueEntry, RequestMetadata};
pub use operation::{ExecutedActionMetadata, Operation};
pub use stage::ExecutionStage;
pub use worker::WorkerId;
