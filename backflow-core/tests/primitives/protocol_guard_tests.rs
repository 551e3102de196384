// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::support::{CountingSubscription, Recorder};
use backflow_core::{FlowError, Offer, ProtocolGuard, Subscriber, Subscription};
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[test]
fn test_guard_drops_items_beyond_demand() -> anyhow::Result<()> {
    // Arrange
    let recorder = Arc::new(Recorder::default());
    let guard = ProtocolGuard::<i32>::new(recorder.clone());
    let upstream = Arc::new(CountingSubscription::default());
    guard.clone().on_subscribe(upstream.clone());

    // Act
    recorder.request(2);
    for i in 1..=5 {
        guard.on_next(i);
    }

    // Assert
    assert_eq!(upstream.requested(), 2);
    assert_eq!(recorder.items(), vec![1, 2]);
    Ok(())
}

#[test]
fn test_guard_forwards_single_terminal() -> anyhow::Result<()> {
    // Arrange
    let recorder = Arc::new(Recorder::default());
    let guard = ProtocolGuard::<i32>::new(recorder.clone());
    guard
        .clone()
        .on_subscribe(Arc::new(CountingSubscription::default()));
    recorder.request(10);

    // Act
    guard.on_complete();
    guard.on_error(FlowError::stream_error("late"));
    guard.on_next(1);
    guard.on_complete();

    // Assert
    assert!(recorder.completed.load(Ordering::SeqCst));
    assert!(recorder.errors.lock().is_empty());
    assert!(recorder.items().is_empty());
    Ok(())
}

#[test]
fn test_guard_cancels_duplicate_subscription() -> anyhow::Result<()> {
    // Arrange
    let recorder = Arc::new(Recorder::default());
    let guard = ProtocolGuard::<i32>::new(recorder.clone());
    let first = Arc::new(CountingSubscription::default());
    let second = Arc::new(CountingSubscription::default());

    // Act
    guard.clone().on_subscribe(first.clone());
    guard.clone().on_subscribe(second.clone());

    // Assert
    assert_eq!(recorder.subscribes.load(Ordering::SeqCst), 1);
    assert_eq!(first.cancels(), 0);
    assert_eq!(second.cancels(), 1);
    Ok(())
}

#[test]
fn test_guard_refunds_filtered_offers() -> anyhow::Result<()> {
    // Arrange
    let recorder = Arc::new(Recorder {
        filter_odd: true,
        ..Recorder::default()
    });
    let guard = ProtocolGuard::<i32>::new(recorder.clone());
    guard
        .clone()
        .on_subscribe(Arc::new(CountingSubscription::default()));
    recorder.request(2);

    // Act
    let offers: Vec<Offer> = (1..=5).map(|i| guard.try_on_next(i)).collect();

    // Assert
    assert_eq!(
        offers,
        vec![
            Offer::Filtered,
            Offer::Delivered,
            Offer::Filtered,
            Offer::Delivered,
            Offer::Delivered
        ]
    );
    assert_eq!(recorder.items(), vec![2, 4]);
    Ok(())
}

#[test]
fn test_guard_reports_dropped_offers_as_consumed() -> anyhow::Result<()> {
    // Arrange
    let recorder = Arc::new(Recorder::default());
    let guard = ProtocolGuard::<i32>::new(recorder.clone());
    guard
        .clone()
        .on_subscribe(Arc::new(CountingSubscription::default()));
    recorder.request(1);

    // Act
    let within = guard.try_on_next(1);
    let beyond = guard.try_on_next(2);
    guard.cancel();
    let after_cancel = guard.try_on_next(3);

    // Assert
    assert_eq!(within, Offer::Delivered);
    assert_eq!(beyond, Offer::Delivered);
    assert_eq!(after_cancel, Offer::Delivered);
    assert_eq!(recorder.items(), vec![1]);
    Ok(())
}

#[test]
fn test_guard_drops_signals_after_cancel() -> anyhow::Result<()> {
    // Arrange
    let recorder = Arc::new(Recorder::default());
    let guard = ProtocolGuard::<i32>::new(recorder.clone());
    let upstream = Arc::new(CountingSubscription::default());
    guard.clone().on_subscribe(upstream.clone());
    recorder.request(5);

    // Act
    guard.cancel();
    guard.cancel();
    guard.on_next(1);
    guard.on_complete();

    // Assert
    assert_eq!(upstream.cancels(), 1);
    assert!(recorder.items().is_empty());
    assert!(!recorder.completed.load(Ordering::SeqCst));
    Ok(())
}

#[test]
fn test_guard_ignores_zero_request() -> anyhow::Result<()> {
    // Arrange
    let recorder = Arc::new(Recorder::default());
    let guard = ProtocolGuard::<i32>::new(recorder.clone());
    let upstream = Arc::new(CountingSubscription::default());
    guard.clone().on_subscribe(upstream.clone());

    // Act
    recorder.request(0);
    guard.on_next(1);

    // Assert
    assert_eq!(upstream.requested(), 0);
    assert!(recorder.items().is_empty());
    Ok(())
}

#[test]
fn test_guard_handshakes_before_early_terminal() -> anyhow::Result<()> {
    // Arrange
    let recorder = Arc::new(Recorder::default());
    let guard = ProtocolGuard::<i32>::new(recorder.clone());

    // Act
    guard.on_error(FlowError::stream_error("no handshake"));

    // Assert
    assert_eq!(recorder.subscribes.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.errors.lock().len(), 1);
    Ok(())
}
