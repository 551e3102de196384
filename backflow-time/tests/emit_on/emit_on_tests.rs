// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// SPDX-License-Identifier: MIT OR Apache-2.0

use backflow_core::{FlowError, Publisher};
use backflow_stream::sources::{from_iter, range};
use backflow_test_utils::{ManualPublisher, ManualScheduler, TestSubscriber};
use backflow_time::prelude::*;

#[test]
fn test_emit_on_delivers_only_when_scheduler_runs() -> anyhow::Result<()> {
    // Arrange
    let scheduler = ManualScheduler::new();
    let subscriber = TestSubscriber::<i32>::unbounded();

    // Act
    from_iter(vec![1, 2, 3])
        .emit_on(scheduler.clone(), 8)
        .subscribe(subscriber.clone());

    // Assert
    assert_eq!(subscriber.item_count(), 0);
    assert_eq!(scheduler.pending_count(), 1);

    // Act
    scheduler.run_due();

    // Assert
    subscriber.assert_values(&[1, 2, 3]);
    subscriber.assert_complete();

    Ok(())
}

#[test]
fn test_emit_on_honors_demand_across_tasks() -> anyhow::Result<()> {
    // Arrange
    let scheduler = ManualScheduler::new();
    let subscriber = TestSubscriber::<i64>::new(1);
    range(0, 3)
        .emit_on(scheduler.clone(), 8)
        .subscribe(subscriber.clone());

    // Act
    scheduler.run_due();

    // Assert
    subscriber.assert_values(&[0]);

    // Act
    subscriber.request(1);

    // Assert
    subscriber.assert_values(&[0]);

    // Act
    scheduler.run_due();

    // Assert
    subscriber.assert_values(&[0, 1]);
    subscriber.assert_not_terminated();

    // Act
    subscriber.request(1);
    scheduler.run_due();

    // Assert
    subscriber.assert_values(&[0, 1, 2]);
    subscriber.assert_complete();

    Ok(())
}

#[test]
fn test_emit_on_prefetches_and_replenishes_upstream() -> anyhow::Result<()> {
    // Arrange
    let scheduler = ManualScheduler::new();
    let source = ManualPublisher::<i32>::new();
    let subscriber = TestSubscriber::<i32>::unbounded();
    source
        .clone()
        .emit_on(scheduler.clone(), 4)
        .subscribe(subscriber.clone());

    // Assert
    assert_eq!(source.requested(), 4);

    // Act
    for item in 0..4 {
        source.emit(item);
    }
    scheduler.run_due();

    // Assert
    subscriber.assert_values(&[0, 1, 2, 3]);
    assert_eq!(source.requested(), 4 + 3);

    Ok(())
}

#[test]
fn test_emit_on_delivers_error_after_queued_items() -> anyhow::Result<()> {
    // Arrange
    let scheduler = ManualScheduler::new();
    let source = ManualPublisher::<i32>::new();
    let subscriber = TestSubscriber::<i32>::unbounded();
    source
        .clone()
        .emit_on(scheduler.clone(), 8)
        .subscribe(subscriber.clone());

    // Act
    source.emit(1);
    source.error(FlowError::stream_error("late"));
    scheduler.run_due();

    // Assert
    subscriber.assert_values(&[1]);
    assert_eq!(subscriber.assert_error().to_string(), "Stream error: late");

    Ok(())
}

#[test]
fn test_emit_on_cancel_releases_pending_task() -> anyhow::Result<()> {
    // Arrange
    let scheduler = ManualScheduler::new();
    let source = ManualPublisher::<i32>::new();
    let subscriber = TestSubscriber::<i32>::unbounded();
    source
        .clone()
        .emit_on(scheduler.clone(), 8)
        .subscribe(subscriber.clone());
    source.emit(1);

    // Act
    subscriber.cancel();
    scheduler.run_due();

    // Assert
    assert_eq!(scheduler.pending_count(), 0);
    assert!(source.is_cancelled());
    assert_eq!(subscriber.item_count(), 0);
    assert!(!subscriber.is_terminated());

    Ok(())
}

#[test]
#[should_panic(expected = "prefetch must be positive")]
fn test_emit_on_rejects_zero_prefetch() {
    let _ = range(0, 1).emit_on(ManualScheduler::new(), 0);
}
