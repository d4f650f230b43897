// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::poller::PollerState;
use crate::test_support::{test_entry, QueueWorkerContext};
use crate::worker_context::ActionResult;
use pw_backplane::MemoryListStore;
use pw_core::{FakeClock, Operation, PlatformProperty};
use std::sync::atomic::Ordering;
use tokio_util::sync::CancellationToken;
use yare::parameterized;

fn fixture() -> (Arc<QueueWorkerContext>, FakeClock) {
    let store = Arc::new(MemoryListStore::new());
    let context = QueueWorkerContext::new("worker-b", store, "work");
    let clock = context.clock();
    (context, clock)
}

/// A context as it leaves the match stage: entry, paused poller, seeded
/// operation.
fn matched_ctx(context: &Arc<QueueWorkerContext>, entry: QueueEntry) -> OperationContext {
    let mut builder = OperationContextBuilder::new();
    builder.set_operation(Operation::named(entry.operation_name()));
    let poller = context.create_poller("match", &entry, ExecutionStage::Queued);
    poller.pause();
    builder.install_poller(poller).unwrap();
    builder.set_queue_entry(entry);
    builder.freeze()
}

#[tokio::test]
async fn input_fetch_stamps_window_and_delegates() {
    let (context, clock) = fixture();
    clock.set_epoch_ms(1_000);
    let handler = InputFetchHandler::new(Arc::clone(&context) as Arc<dyn WorkerContext>, clock);
    let ctx = matched_ctx(&context, test_entry("op-1"));

    let ctx = handler.handle(ctx).await.unwrap();
    assert_eq!(ctx.metadata().input_fetch_start_at_ms, 1_000);
    assert_eq!(ctx.metadata().input_fetch_completed_at_ms, 1_000);
    assert_eq!(*context.fetched.lock(), vec!["op-1"]);
    // Poller paused again for the next handoff.
    assert_eq!(ctx.poller().map(|p| p.state()), Some(PollerState::Paused));
}

#[tokio::test]
async fn execute_runs_action_and_stores_result() {
    let (context, clock) = fixture();
    clock.set_epoch_ms(2_000);
    let handler =
        ExecuteHandler::new(Arc::clone(&context) as Arc<dyn WorkerContext>, clock.clone(), 4);
    let ctx = matched_ctx(&context, test_entry("op-2"));

    let ctx = handler.handle(ctx).await.unwrap();
    assert_eq!(ctx.metadata().stage, ExecutionStage::Executing);
    assert_eq!(ctx.metadata().execution_start_at_ms, 2_000);
    assert_eq!(*context.executed.lock(), vec!["op-2"]);
    let result = ctx.action_result().unwrap();
    assert_eq!(result.exit_code, 0);
}

#[tokio::test]
async fn execute_failure_propagates_after_stamping() {
    let (context, clock) = fixture();
    let handler =
        ExecuteHandler::new(Arc::clone(&context) as Arc<dyn WorkerContext>, clock, 4);
    context.fail_execute.store(true, Ordering::SeqCst);
    let ctx = matched_ctx(&context, test_entry("op-3"));

    let result = handler.handle(ctx).await;
    assert!(matches!(result, Err(StageError::Transient(_))));
    assert!(context.executed.lock().is_empty());
}

#[parameterized(
    absent = { None, 1 },
    one = { Some("1"), 1 },
    half = { Some("2"), 2 },
    full = { Some("4"), 4 },
    oversubscribed = { Some("16"), 4 },
    garbage = { Some("all"), 1 },
)]
fn execute_claims_follow_min_cores(min_cores: Option<&str>, expected: u32) {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
    runtime.block_on(async move {
        let (context, clock) = fixture();
        let handler =
            ExecuteHandler::new(Arc::clone(&context) as Arc<dyn WorkerContext>, clock, 4);
        let mut entry = test_entry("op-4");
        if let Some(value) = min_cores {
            entry
                .platform
                .properties
                .push(PlatformProperty { name: "min-cores".into(), value: value.into() });
        }
        let ctx = matched_ctx(&context, entry);
        assert_eq!(handler.claims_required(&ctx), expected);
    });
}

#[tokio::test]
async fn report_completes_acks_and_terminates_poller() {
    let (context, clock) = fixture();
    clock.set_epoch_ms(3_000);
    let entry = test_entry("op-5");
    // The entry sits in the dequeue list, as after a real match.
    context.enqueue(&entry).await;
    let no_cancel = CancellationToken::new();
    context.queue().nonblocking_dequeue(&no_cancel).await.unwrap();

    let handler = ReportHandler::new(Arc::clone(&context) as Arc<dyn WorkerContext>, clock);
    let mut builder = matched_ctx(&context, entry).thaw();
    builder.set_action_result(ActionResult { exit_code: 0, ..Default::default() });
    let ctx = handler.handle(builder.freeze()).await.unwrap();

    assert!(ctx.operation().done);
    assert_eq!(ctx.metadata().stage, ExecutionStage::Completed);
    assert_eq!(ctx.metadata().worker_completed_at_ms, 3_000);
    assert_eq!(ctx.poller().map(|p| p.state()), Some(PollerState::Terminated));
    assert_eq!(context.reported.lock().len(), 1);

    // Acked: the dequeue list is empty.
    let mut inflight = Vec::new();
    context.queue().visit_dequeue(&mut |v| inflight.push(v.to_string())).await.unwrap();
    assert!(inflight.is_empty());

    // Final best-effort update carries the completed operation.
    let operations = context.operations.lock();
    let last = operations.last().unwrap();
    assert!(last.done);
    assert_eq!(last.metadata.stage, ExecutionStage::Completed);
}

#[tokio::test]
async fn report_without_result_is_fatal() {
    let (context, clock) = fixture();
    let handler = ReportHandler::new(Arc::clone(&context) as Arc<dyn WorkerContext>, clock);
    let ctx = matched_ctx(&context, test_entry("op-6"));
    let result = handler.handle(ctx).await;
    assert!(matches!(result, Err(StageError::Fatal(_))));
}

#[tokio::test]
async fn missing_queue_entry_is_fatal() {
    let (context, clock) = fixture();
    let handler = InputFetchHandler::new(Arc::clone(&context) as Arc<dyn WorkerContext>, clock);
    let ctx = OperationContextBuilder::new().freeze();
    let result = handler.handle(ctx).await;
    assert!(matches!(result, Err(StageError::Fatal(_))));
}
