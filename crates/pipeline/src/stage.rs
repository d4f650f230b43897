// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stage machinery: bounded handoff slots, claims, and the take loop.
//!
//! A stage is a capability set rather than a class hierarchy: upstream
//! sees a [`StageHandle`] (claim, then put-or-drop), the stage itself is
//! a task draining its input slot in arrival order. Scalar stages have a
//! one-deep slot; superscalar stages run one task per admitted operation,
//! bounded by an [`Admission`] controller.

use crate::admission::{Admission, AdmissionClaim};
use crate::context::OperationContext;
use crate::error::StageError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Stage-specific work, plugged into the shared take loop.
#[async_trait]
pub trait StageHandler: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Slots this operation needs on the stage. Only consulted for
    /// superscalar stages.
    fn claims_required(&self, _ctx: &OperationContext) -> u32 {
        1
    }

    async fn handle(&self, ctx: OperationContext) -> Result<OperationContext, StageError>;
}

/// A context in transit, carrying the slots claimed on the receiving
/// stage. The slots release when the receiving stage finishes the
/// operation.
pub(crate) struct Handoff {
    pub(crate) ctx: OperationContext,
    pub(crate) slots: Option<AdmissionClaim>,
}

/// An operation routed to the error sink instead of downstream.
pub struct ErrorReport {
    pub stage: &'static str,
    pub operation: String,
    pub error: StageError,
    /// Present when the context survived the failure (e.g. the successor
    /// refused the transfer). A dropped context terminates its poller and
    /// leaves the entry to the recovery sweep.
    pub context: Option<OperationContext>,
}

/// Upstream-facing surface of a stage.
#[derive(Clone)]
pub struct StageHandle {
    handler: Arc<dyn StageHandler>,
    tx: mpsc::Sender<Handoff>,
    admission: Option<Arc<Admission>>,
}

/// Receiving end of a stage's input slot, consumed by [`spawn_stage`].
pub struct StageInput {
    handler: Arc<dyn StageHandler>,
    rx: mpsc::Receiver<Handoff>,
    admission: Option<Arc<Admission>>,
}

/// Build the handoff slot for a stage of the given width.
///
/// Width 1 yields a scalar stage (a one-deep slot, work processed
/// inline); larger widths add admission control and per-operation tasks.
pub fn stage_channel(handler: Arc<dyn StageHandler>, width: u32) -> (StageHandle, StageInput) {
    let admission = (width > 1).then(|| Admission::new(width));
    let (tx, rx) = mpsc::channel(width.max(1) as usize);
    (
        StageHandle { handler: Arc::clone(&handler), tx, admission: admission.clone() },
        StageInput { handler, rx, admission },
    )
}

impl StageHandle {
    pub fn name(&self) -> &'static str {
        self.handler.name()
    }

    /// The stage's admission controller, when it is superscalar.
    pub fn admission(&self) -> Option<&Arc<Admission>> {
        self.admission.as_ref()
    }

    /// Block until the stage can accept `ctx`, claiming the slots its
    /// handler requires. Fails with `Terminated` when the stage is gone
    /// and `Cancelled` when `cancel` fires first; a cancellation during
    /// a multi-slot acquisition rolls the partial claim back.
    pub async fn claim(
        &self,
        ctx: &OperationContext,
        cancel: &CancellationToken,
    ) -> Result<StageClaim, StageError> {
        let slots = match &self.admission {
            Some(admission) => {
                let required = self.handler.claims_required(ctx);
                Some(admission.claim(required, cancel).await?)
            }
            None => None,
        };
        let permit = tokio::select! {
            biased;
            permit = self.tx.clone().reserve_owned() => {
                permit.map_err(|_| StageError::Terminated)?
            }
            _ = cancel.cancelled() => return Err(StageError::Cancelled),
        };
        Ok(StageClaim { permit, slots })
    }
}

/// A granted claim on a stage's capacity.
///
/// Consumed by exactly one of [`put`](StageClaim::put) (ownership moves
/// downstream) or drop (the claim is released). Double-release cannot be
/// expressed.
pub struct StageClaim {
    permit: mpsc::OwnedPermit<Handoff>,
    slots: Option<AdmissionClaim>,
}

impl StageClaim {
    /// Deposit a context into the claimed slot. Never blocks.
    pub fn put(self, ctx: OperationContext) {
        self.permit.send(Handoff { ctx, slots: self.slots });
    }
}

/// Launch the stage's take loop.
pub fn spawn_stage(
    input: StageInput,
    output: Option<StageHandle>,
    errors: mpsc::Sender<ErrorReport>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_stage(input, output, errors, cancel))
}

async fn run_stage(
    mut input: StageInput,
    output: Option<StageHandle>,
    errors: mpsc::Sender<ErrorReport>,
    cancel: CancellationToken,
) {
    let name = input.handler.name();
    info!(stage = name, superscalar = input.admission.is_some(), "stage started");
    if input.admission.is_some() {
        let mut tasks = JoinSet::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                handoff = input.rx.recv() => match handoff {
                    Some(handoff) => {
                        let handler = Arc::clone(&input.handler);
                        let output = output.clone();
                        let errors = errors.clone();
                        let cancel = cancel.clone();
                        tasks.spawn(async move {
                            process(handler, handoff, output.as_ref(), &errors, &cancel).await;
                        });
                    }
                    None => break,
                },
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }
        // Drain in-flight operations; a hard interrupt aborts them when
        // the stage task itself is aborted (JoinSet aborts on drop).
        if !cancel.is_cancelled() {
            while tasks.join_next().await.is_some() {}
        }
    } else {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                handoff = input.rx.recv() => match handoff {
                    Some(handoff) => {
                        process(Arc::clone(&input.handler), handoff, output.as_ref(), &errors, &cancel)
                            .await;
                    }
                    None => break,
                },
            }
        }
    }
    info!(stage = name, "stage stopped");
}

/// One operation through one stage: run the handler, forward downstream,
/// release this stage's slots.
async fn process(
    handler: Arc<dyn StageHandler>,
    handoff: Handoff,
    output: Option<&StageHandle>,
    errors: &mpsc::Sender<ErrorReport>,
    cancel: &CancellationToken,
) {
    let Handoff { ctx, slots } = handoff;
    let stage = handler.name();
    let operation = ctx.operation().name.clone();
    match handler.handle(ctx).await {
        Ok(ctx) => {
            if let Some(output) = output {
                match output.claim(&ctx, cancel).await {
                    Ok(claim) => claim.put(ctx),
                    Err(error) => {
                        // Forward failure: the context goes to the error
                        // sink, never back onto the input.
                        warn!(stage, operation = %operation, error = %error, "forward failed");
                        let _ = errors
                            .send(ErrorReport { stage, operation, error, context: Some(ctx) })
                            .await;
                    }
                }
            }
        }
        Err(error) => {
            if error.is_cancelled() {
                debug!(stage, operation = %operation, "operation cancelled");
            } else {
                warn!(stage, operation = %operation, error = %error, "stage handler failed");
            }
            let _ = errors.send(ErrorReport { stage, operation, error, context: None }).await;
        }
    }
    drop(slots);
}

#[cfg(test)]
#[path = "stage_tests.rs"]
mod tests;
