// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Liveness poller: periodic re-assertion that a held entry is still live.

use parking_lot::Mutex;
use pw_core::ExecutionStage;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Lifecycle of a [`Poller`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Active,
    Paused,
    Terminated,
}

struct Inner {
    state: PollerState,
    stage: ExecutionStage,
}

struct Shared {
    inner: Mutex<Inner>,
    cancel: CancellationToken,
}

/// Periodic keep-alive for one held queue entry.
///
/// While ACTIVE, each tick re-asserts the entry's current execution stage
/// with the backplane; a tick returning `false` terminates the poller
/// (the entry is no longer ours to keep alive). `pause` stops ticks at a
/// stage handoff; `resume` re-activates at the next stage. Dropping the
/// poller terminates it.
pub struct Poller {
    shared: Arc<Shared>,
}

impl Poller {
    /// Spawn a poller ticking every `period`, starting ACTIVE at `stage`.
    ///
    /// Keep `period` at or below half the backplane's liveness window.
    pub fn start<F, Fut>(period: Duration, stage: ExecutionStage, tick: F) -> Self
    where
        F: Fn(ExecutionStage) -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send,
    {
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner { state: PollerState::Active, stage }),
            cancel: CancellationToken::new(),
        });
        let task_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first interval tick fires immediately; skip it so the
            // first re-assertion lands one period after installation.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = task_shared.cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }
                let (state, stage) = {
                    let inner = task_shared.inner.lock();
                    (inner.state, inner.stage)
                };
                match state {
                    PollerState::Terminated => break,
                    PollerState::Paused => continue,
                    PollerState::Active => {
                        if !tick(stage).await {
                            debug!(stage = %stage, "poll rejected, terminating poller");
                            task_shared.inner.lock().state = PollerState::Terminated;
                            break;
                        }
                    }
                }
            }
        });
        Self { shared }
    }

    pub fn state(&self) -> PollerState {
        self.shared.inner.lock().state
    }

    /// Stop ticking without releasing the poller; `resume` may follow.
    pub fn pause(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.state == PollerState::Active {
            inner.state = PollerState::Paused;
        }
    }

    /// Re-activate at a new execution stage.
    pub fn resume(&self, stage: ExecutionStage) {
        let mut inner = self.shared.inner.lock();
        if inner.state != PollerState::Terminated {
            inner.state = PollerState::Active;
            inner.stage = stage;
        }
    }

    /// Release the poller; no further ticks will run.
    pub fn terminate(&self) {
        self.shared.inner.lock().state = PollerState::Terminated;
        self.shared.cancel.cancel();
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
#[path = "poller_tests.rs"]
mod tests;
