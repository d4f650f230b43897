// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use parking_lot::Mutex as PlMutex;
use std::sync::atomic::{AtomicUsize, Ordering};

fn counting_poller(period: Duration) -> (Poller, Arc<AtomicUsize>, Arc<PlMutex<Vec<ExecutionStage>>>) {
    let ticks = Arc::new(AtomicUsize::new(0));
    let stages = Arc::new(PlMutex::new(Vec::new()));
    let poller = {
        let ticks = Arc::clone(&ticks);
        let stages = Arc::clone(&stages);
        Poller::start(period, ExecutionStage::Queued, move |stage| {
            ticks.fetch_add(1, Ordering::SeqCst);
            stages.lock().push(stage);
            std::future::ready(true)
        })
    };
    (poller, ticks, stages)
}

#[tokio::test]
async fn ticks_while_active() {
    let (poller, ticks, stages) = counting_poller(Duration::from_millis(10));
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(ticks.load(Ordering::SeqCst) >= 2);
    assert!(stages.lock().iter().all(|s| *s == ExecutionStage::Queued));
    assert_eq!(poller.state(), PollerState::Active);
}

#[tokio::test]
async fn pause_stops_ticks_and_resume_changes_stage() {
    let (poller, ticks, stages) = counting_poller(Duration::from_millis(10));
    poller.pause();
    assert_eq!(poller.state(), PollerState::Paused);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let while_paused = ticks.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(ticks.load(Ordering::SeqCst), while_paused);

    poller.resume(ExecutionStage::Executing);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(ticks.load(Ordering::SeqCst) > while_paused);
    assert_eq!(stages.lock().last().copied(), Some(ExecutionStage::Executing));
}

#[tokio::test]
async fn terminate_is_final() {
    let (poller, ticks, _stages) = counting_poller(Duration::from_millis(10));
    poller.terminate();
    assert_eq!(poller.state(), PollerState::Terminated);
    let at_terminate = ticks.load(Ordering::SeqCst);
    poller.resume(ExecutionStage::Executing);
    assert_eq!(poller.state(), PollerState::Terminated);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(ticks.load(Ordering::SeqCst), at_terminate);
}

#[tokio::test]
async fn rejected_poll_terminates() {
    let poller = Poller::start(Duration::from_millis(10), ExecutionStage::Queued, |_| {
        std::future::ready(false)
    });
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(poller.state(), PollerState::Terminated);
}
