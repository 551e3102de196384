// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// SPDX-License-Identifier: MIT OR Apache-2.0

use backflow_core::{FlowError, Publisher};
use backflow_stream::prelude::*;
use backflow_test_utils::{ScriptedPublisher, TestSubscriber};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn test_retry_survives_many_synchronous_failures() -> anyhow::Result<()> {
    // Arrange
    let source = ScriptedPublisher::failing_times(10_000, vec![7]);
    let subscriber = TestSubscriber::<i32>::unbounded();

    // Act
    source.clone().retry(10_000).subscribe(subscriber.clone());

    // Assert
    subscriber.assert_values(&[7]);
    subscriber.assert_complete();
    assert_eq!(source.subscribe_count(), 10_001);

    Ok(())
}

#[test]
fn test_retry_gives_up_after_budget() -> anyhow::Result<()> {
    // Arrange
    let source = ScriptedPublisher::failing_times(3, vec![7]);
    let subscriber = TestSubscriber::<i32>::unbounded();

    // Act
    source.clone().retry(2).subscribe(subscriber.clone());

    // Assert
    assert_eq!(subscriber.item_count(), 0);
    assert_eq!(
        subscriber.assert_error().to_string(),
        "Stream error: attempt 2 failed"
    );
    assert_eq!(source.subscribe_count(), 3);

    Ok(())
}

#[test]
fn test_retry_budget_is_per_subscriber() -> anyhow::Result<()> {
    // Arrange
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let retried = defer(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(fail::<i32>(FlowError::stream_error("always")))
    })
    .retry(2);
    let first = TestSubscriber::<i32>::unbounded();
    let second = TestSubscriber::<i32>::unbounded();

    // Act
    retried.subscribe(first.clone());
    retried.subscribe(second.clone());

    // Assert
    first.assert_error();
    second.assert_error();
    assert_eq!(attempts.load(Ordering::SeqCst), 6);

    Ok(())
}

#[test]
fn test_retry_zero_forwards_first_error() -> anyhow::Result<()> {
    // Arrange
    let source = ScriptedPublisher::failing_times(1, vec![1]);
    let subscriber = TestSubscriber::<i32>::unbounded();

    // Act
    source.clone().retry(0).subscribe(subscriber.clone());

    // Assert
    subscriber.assert_error();
    assert_eq!(source.subscribe_count(), 1);

    Ok(())
}
