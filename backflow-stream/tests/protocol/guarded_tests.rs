// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// SPDX-License-Identifier: MIT OR Apache-2.0

use backflow_core::Publisher;
use backflow_stream::prelude::*;
use backflow_test_utils::{MisbehavingPublisher, TestSubscriber};

#[test]
fn test_guarded_enforces_protocol_on_misbehaving_publisher() -> anyhow::Result<()> {
    // Arrange
    let source = MisbehavingPublisher::new(vec![1, 2, 3]);
    let subscriber = TestSubscriber::<i32>::new(2);

    // Act
    source.clone().guarded().subscribe(subscriber.clone());

    // Assert
    assert_eq!(subscriber.subscribe_count(), 1);
    subscriber.assert_values(&[1, 2]);
    subscriber.assert_complete();
    assert_eq!(subscriber.terminal_count(), 1);
    assert!(source.duplicate_cancelled());

    Ok(())
}

#[test]
fn test_guarded_source_feeds_operators_safely() -> anyhow::Result<()> {
    // Arrange
    let source = MisbehavingPublisher::new(vec![1, 2, 3, 4]);
    let subscriber = TestSubscriber::<Vec<i32>>::unbounded();

    // Act
    source
        .clone()
        .guarded()
        .buffer_until(|x: &i32| Ok(*x % 2 == 0))
        .subscribe(subscriber.clone());

    // Assert
    subscriber.assert_values(&[vec![1, 2], vec![3, 4]]);
    assert_eq!(subscriber.terminal_count(), 1);

    Ok(())
}

#[test]
fn test_guarded_passes_well_behaved_publisher_through() -> anyhow::Result<()> {
    // Arrange
    let subscriber = TestSubscriber::<i64>::new(3);

    // Act
    range(0, 5).guarded().subscribe(subscriber.clone());
    subscriber.request(2);

    // Assert
    subscriber.assert_values(&[0, 1, 2, 3, 4]);
    subscriber.assert_complete();

    Ok(())
}
