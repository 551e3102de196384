// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// SPDX-License-Identifier: MIT OR Apache-2.0

use backflow_core::{FlowError, Publisher};
use backflow_stream::sources::{defer, from_iter};
use backflow_test_utils::TestSubscriber;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn test_defer_builds_a_fresh_source_per_subscriber() -> anyhow::Result<()> {
    // Arrange
    let built = Arc::new(AtomicUsize::new(0));
    let counter = built.clone();
    let source = defer(move || {
        let generation = counter.fetch_add(1, Ordering::SeqCst);
        Ok(from_iter(vec![generation]))
    });
    let first = TestSubscriber::<usize>::unbounded();
    let second = TestSubscriber::<usize>::unbounded();

    // Act
    source.subscribe(first.clone());
    source.subscribe(second.clone());

    // Assert
    assert_eq!(built.load(Ordering::SeqCst), 2);
    first.assert_values(&[0]);
    second.assert_values(&[1]);
    first.assert_complete();
    second.assert_complete();

    Ok(())
}

#[test]
fn test_defer_factory_error_fails_the_subscriber() -> anyhow::Result<()> {
    // Arrange
    let source = defer(|| -> backflow_core::Result<backflow_stream::sources::FromIter<Vec<i32>>> {
        Err(FlowError::stream_error("factory"))
    });
    let subscriber = TestSubscriber::<i32>::unbounded();

    // Act
    source.subscribe(subscriber.clone());

    // Assert
    assert_eq!(subscriber.subscribe_count(), 1);
    assert!(matches!(
        subscriber.assert_error(),
        FlowError::StreamError { ref context } if context == "factory"
    ));

    Ok(())
}
