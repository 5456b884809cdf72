//! IV. Connectivity tests.
//!
//! Rules covered:
//! - 21. Losing connectivity mid-pass stops between records and suspends
//! - 22. A drain started while offline suspends without sending
//! - 23. Restoring connectivity resumes from the head of the store
//! - 24. Any trigger resumes a suspended coordinator
//! - 25. Shutdown stops the connectivity listener

use super::harness::{recoverable, wait_until, TestHarness};
use crate::{Connectivity, CoordinatorState, StopReason};
use std::time::Duration;

/// Rule 21: Loss mid-pass
#[tokio::test]
async fn rule_21_connectivity_loss_suspends() {
    let harness = TestHarness::new();
    harness.seed("custom.a");
    harness.seed("custom.b");
    harness.seed("custom.c");

    let connectivity = harness.connectivity.clone();
    harness.sender.on_send(move |index, _| {
        if index == 0 {
            connectivity.set(Connectivity::Unavailable);
        }
    });

    let report = harness.pipeline.flush_and_wait().await.unwrap();

    assert_eq!(report.stop, StopReason::ConnectivityLost);
    assert_eq!(report.delivered, 1);
    assert_eq!(harness.pipeline.state(), CoordinatorState::Suspended);
    assert_eq!(harness.pending_len(), 2);
    assert!(harness.pending().iter().all(|record| record.retry_count() == 0));
    assert_eq!(harness.budget.released(), 1);
}

/// Rule 22: Offline at start
#[tokio::test]
async fn rule_22_offline_drain_sends_nothing() {
    let harness = TestHarness::new();
    harness.seed("custom.a");
    harness.connectivity.set(Connectivity::Unavailable);

    let report = harness.pipeline.flush_and_wait().await.unwrap();

    assert_eq!(report.stop, StopReason::ConnectivityLost);
    assert_eq!(harness.sender.sent_count(), 0);
    assert_eq!(harness.pipeline.state(), CoordinatorState::Suspended);
}

/// Rule 23: Resume on restore
#[tokio::test]
async fn rule_23_restore_resumes_drain() {
    let harness = TestHarness::new();
    harness.pipeline.start();

    // A failed attempt leaves a retried record at the head.
    harness.sender.queue_response(recoverable());
    harness.seed("custom.head");
    harness.seed("custom.tail");

    let connectivity = harness.connectivity.clone();
    harness.sender.on_send(move |index, _| {
        if index == 0 {
            connectivity.set(Connectivity::Unavailable);
        }
    });
    let report = harness.pipeline.flush_and_wait().await.unwrap();
    assert_eq!(report.retried, 1);
    assert_eq!(harness.pipeline.state(), CoordinatorState::Suspended);

    harness.sender.on_send(|_, _| {});
    harness.connectivity.set(Connectivity::Available);

    assert!(wait_until(|| harness.pending_len() == 0).await);
    assert!(wait_until(|| harness.pipeline.state() == CoordinatorState::Idle).await);
    assert_eq!(
        harness.sender.sent_types(),
        vec!["custom.head", "custom.head", "custom.tail"]
    );
    assert_eq!(harness.sender.sent()[1].retry_count(), 1);

    harness.pipeline.shutdown().await;
}

/// Rule 24: Manual trigger resumes
#[tokio::test]
async fn rule_24_manual_flush_resumes_suspended() {
    let harness = TestHarness::new();
    harness.seed("custom.a");
    harness.connectivity.set(Connectivity::Unavailable);
    harness.pipeline.flush_and_wait().await.unwrap();
    assert_eq!(harness.pipeline.state(), CoordinatorState::Suspended);

    // Connectivity came back without a listener running.
    harness.connectivity.set(Connectivity::Available);
    let report = harness.pipeline.flush_and_wait().await.unwrap();

    assert_eq!(report.delivered, 1);
    assert_eq!(harness.pipeline.state(), CoordinatorState::Idle);
}

/// Rule 25: Shutdown
#[tokio::test]
async fn rule_25_shutdown_stops_listener() {
    let harness = TestHarness::new();
    harness.pipeline.start();
    harness.pipeline.shutdown().await;

    harness.seed("custom.a");
    harness.connectivity.set(Connectivity::Unavailable);
    harness.connectivity.set(Connectivity::Available);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(harness.sender.sent_count(), 0);
    assert_eq!(harness.pending_len(), 1);
}
