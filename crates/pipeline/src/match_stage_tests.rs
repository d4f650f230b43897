// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::poller::PollerState;
use crate::stage::{spawn_stage, stage_channel, StageHandler};
use crate::test_support::{test_entry, QueueWorkerContext};
use parking_lot::Mutex;
use pw_backplane::MemoryListStore;
use pw_core::{ExecutedActionMetadata, FakeClock, Operation};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What the downstream stage observed of a forwarded context.
struct Captured {
    operation: Operation,
    metadata: ExecutedActionMetadata,
    has_entry: bool,
    poller_state: Option<PollerState>,
}

struct CaptureHandler {
    received: Mutex<Vec<Captured>>,
}

#[async_trait]
impl StageHandler for CaptureHandler {
    fn name(&self) -> &'static str {
        "capture"
    }

    async fn handle(&self, ctx: OperationContext) -> Result<OperationContext, StageError> {
        self.received.lock().push(Captured {
            operation: ctx.operation().clone(),
            metadata: ctx.metadata().clone(),
            has_entry: ctx.queue_entry().is_some(),
            poller_state: ctx.poller().map(|p| p.state()),
        });
        Ok(ctx)
    }
}

struct Fixture {
    context: Arc<QueueWorkerContext>,
    stage: MatchStage<FakeClock>,
    captured: Arc<CaptureHandler>,
    downstream: JoinHandle<()>,
    downstream_handle: crate::stage::StageHandle,
    errors: mpsc::Receiver<crate::stage::ErrorReport>,
    shutdown: ShutdownLatch,
    cancel: CancellationToken,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryListStore::new());
    let context = QueueWorkerContext::new("worker-a", store, "work");
    let captured = Arc::new(CaptureHandler { received: Mutex::new(Vec::new()) });
    let (handle, input) = stage_channel(Arc::clone(&captured) as Arc<dyn StageHandler>, 1);
    let (errors_tx, errors_rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let downstream = spawn_stage(input, None, errors_tx.clone(), cancel.clone());
    let shutdown = ShutdownLatch::new();
    let stage = MatchStage::new(
        Arc::clone(&context) as Arc<dyn WorkerContext>,
        context.clock(),
        handle.clone(),
        errors_tx,
        shutdown.clone(),
        cancel.clone(),
    );
    Fixture {
        context,
        stage,
        captured,
        downstream,
        downstream_handle: handle,
        errors: errors_rx,
        shutdown,
        cancel,
    }
}

async fn wait_for_capture(captured: &CaptureHandler) -> Captured {
    for _ in 0..100 {
        if let Some(c) = captured.received.lock().pop() {
            return c;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("downstream never received a context");
}

#[tokio::test]
async fn match_seeds_metadata_and_forwards() {
    let f = fixture();
    f.context.clock().set_epoch_ms(700_000);
    f.context.enqueue(&test_entry("op-7")).await;

    f.stage.iterate().await.unwrap();
    let captured = wait_for_capture(&f.captured).await;

    assert_eq!(captured.operation.name, "op-7");
    assert!(captured.has_entry);
    assert_eq!(captured.metadata.worker, "worker-a");
    assert_eq!(captured.metadata.stage, ExecutionStage::Queued);
    assert_eq!(captured.metadata.queued_operation_digest.hash, "queued-op-7");
    assert_eq!(captured.metadata.action_digest.hash, "action-op-7");
    assert_eq!(captured.metadata.queued_at_ms, 500_000);
    assert_eq!(captured.metadata.worker_start_at_ms, 700_000);
    assert_eq!(captured.metadata.stdout_stream_name, "op-7/streams/stdout");
    // Paused for the handoff, not terminated.
    assert_eq!(captured.poller_state, Some(PollerState::Paused));
}

#[tokio::test]
async fn match_reports_queued_operation_to_backplane() {
    let f = fixture();
    f.context.enqueue(&test_entry("op-9")).await;
    f.stage.iterate().await.unwrap();
    wait_for_capture(&f.captured).await;

    let operations = f.context.operations.lock();
    assert_eq!(operations.len(), 1);
    assert_eq!(operations[0].name, "op-9");
    assert_eq!(operations[0].metadata.stage, ExecutionStage::Queued);
    assert!(!operations[0].done);
}

#[tokio::test]
async fn matched_entry_stays_in_dequeue_list_until_acked() {
    let f = fixture();
    f.context.enqueue(&test_entry("op-1")).await;
    f.stage.iterate().await.unwrap();
    wait_for_capture(&f.captured).await;

    assert_eq!(f.context.queue().size().await.unwrap(), 0);
    let mut inflight = Vec::new();
    f.context.queue().visit_dequeue(&mut |v| inflight.push(v.to_string())).await.unwrap();
    assert_eq!(inflight.len(), 1);
}

#[tokio::test]
async fn latched_iterate_consumes_nothing() {
    let f = fixture();
    f.context.enqueue(&test_entry("op-1")).await;
    f.context.enqueue(&test_entry("op-2")).await;
    f.shutdown.set();

    let deadline = std::time::Instant::now() + Duration::from_millis(100);
    while std::time::Instant::now() < deadline {
        f.stage.iterate().await.unwrap();
    }

    assert_eq!(f.context.queue().size().await.unwrap(), 2);
    assert!(f.captured.received.lock().is_empty());
    assert!(f.context.operations.lock().is_empty());
}

#[tokio::test]
async fn unmatched_iterate_releases_downstream_claim() {
    let mut f = fixture();
    // Empty queue: the dequeue times out, on_entry(None) declines.
    f.stage.iterate().await.unwrap();
    assert!(f.captured.received.lock().is_empty());

    // The slot claimed before matching is free again.
    let ctx = crate::context::OperationContextBuilder::new().freeze();
    let no_cancel = CancellationToken::new();
    let claim = tokio::time::timeout(
        Duration::from_millis(200),
        f.downstream_handle.claim(&ctx, &no_cancel),
    )
    .await
    .unwrap()
    .unwrap();
    drop(claim);
    assert!(f.errors.try_recv().is_err());
}

#[tokio::test]
async fn cancelled_match_stops_the_run_loop() {
    let f = fixture();
    let cancel = f.cancel.clone();
    let stop_matching = Arc::clone(&f.context);
    let task = tokio::spawn(f.stage.run());
    tokio::time::sleep(Duration::from_millis(30)).await;
    cancel.cancel();
    stop_matching.stop_matching();
    tokio::time::timeout(Duration::from_millis(500), task).await.unwrap().unwrap();
    drop(f.downstream);
}
