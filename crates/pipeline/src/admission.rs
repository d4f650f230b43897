// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admission control for superscalar stages.
//!
//! A stage of width N admits each operation only after claiming k slots,
//! 1 ≤ k (typically the core count the action requests). Slots are
//! acquired one at a time; a cancellation mid-acquisition rolls back every
//! slot taken by that call, so the held-claim count returns to its
//! pre-call value.

use crate::error::StageError;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Slot accounting for one superscalar stage.
pub struct Admission {
    width: u32,
    claimed: Mutex<u32>,
    /// Signalled when a slot is released.
    released: Notify,
    /// Signalled when the last free slot is claimed.
    filled: Notify,
}

impl Admission {
    pub fn new(width: u32) -> Arc<Self> {
        Arc::new(Self {
            width: width.max(1),
            claimed: Mutex::new(0),
            released: Notify::new(),
            filled: Notify::new(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// Slots currently held across all outstanding operations.
    pub fn claimed(&self) -> u32 {
        *self.claimed.lock()
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed() > 0
    }

    pub fn is_full(&self) -> bool {
        self.claimed() == self.width
    }

    /// Claim `count` slots, blocking while the stage is saturated.
    ///
    /// Slots are acquired one by one. If `cancel` fires mid-acquisition,
    /// every slot already acquired by this call is released before
    /// `Cancelled` is returned. A `count` larger than the stage width
    /// never completes and is only exited through cancellation.
    pub async fn claim(
        self: &Arc<Self>,
        count: u32,
        cancel: &CancellationToken,
    ) -> Result<AdmissionClaim, StageError> {
        let count = count.max(1);
        let mut acquired = 0u32;
        while acquired < count {
            let notified = self.released.notified();
            tokio::pin!(notified);
            // Register before checking so a release between the check and
            // the await cannot be missed.
            notified.as_mut().enable();
            let took = {
                let mut claimed = self.claimed.lock();
                if *claimed < self.width {
                    *claimed += 1;
                    acquired += 1;
                    Some(*claimed == self.width)
                } else {
                    None
                }
            };
            match took {
                Some(true) => self.filled.notify_waiters(),
                Some(false) => {}
                None => {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            self.release(acquired);
                            return Err(StageError::Cancelled);
                        }
                        _ = &mut notified => {}
                    }
                }
            }
        }
        Ok(AdmissionClaim { admission: Arc::clone(self), count })
    }

    /// Wait until every slot is held. Prefer this notification over
    /// polling [`is_full`](Admission::is_full) in a loop; the polling
    /// variant remains valid as a fallback.
    pub async fn wait_until_full(&self) {
        loop {
            let notified = self.filled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_full() {
                return;
            }
            notified.await;
        }
    }

    fn release(&self, count: u32) {
        if count == 0 {
            return;
        }
        {
            let mut claimed = self.claimed.lock();
            *claimed = claimed.saturating_sub(count);
        }
        self.released.notify_waiters();
    }
}

/// Slots held on behalf of one operation; released on drop.
pub struct AdmissionClaim {
    admission: Arc<Admission>,
    count: u32,
}

impl AdmissionClaim {
    pub fn count(&self) -> u32 {
        self.count
    }
}

impl Drop for AdmissionClaim {
    fn drop(&mut self) {
        self.admission.release(self.count);
    }
}

#[cfg(test)]
#[path = "admission_tests.rs"]
mod tests;
