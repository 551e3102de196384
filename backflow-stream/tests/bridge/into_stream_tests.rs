// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// SPDX-License-Identifier: MIT OR Apache-2.0

use backflow_core::{FlowError, StreamItem};
use backflow_stream::prelude::*;
use backflow_test_utils::ManualPublisher;
use futures::executor::block_on;
use futures::StreamExt;
use std::thread;
use std::time::Duration;

#[test]
fn test_into_stream_yields_every_item_then_ends() -> anyhow::Result<()> {
    // Arrange
    let stream = range(0, 100).into_stream(8);

    // Act
    let items: Vec<i64> = block_on(stream.map(StreamItem::unwrap).collect());

    // Assert
    assert_eq!(items, (0..100).collect::<Vec<_>>());

    Ok(())
}

#[test]
fn test_error_is_yielded_once_before_end() -> anyhow::Result<()> {
    // Arrange
    let source = ManualPublisher::<i32>::new();
    let mut stream = source.clone().into_stream(4);
    source.emit(1);
    source.error(FlowError::stream_error("boom"));

    // Act
    let first = block_on(stream.next());
    let second = block_on(stream.next());
    let third = block_on(stream.next());

    // Assert
    assert_eq!(first, Some(StreamItem::Value(1)));
    assert!(matches!(second, Some(StreamItem::Error(_))));
    assert!(third.is_none());

    Ok(())
}

#[test]
fn test_stream_requests_prefetch_and_replenishes() -> anyhow::Result<()> {
    // Arrange
    let source = ManualPublisher::<i32>::new();
    let mut stream = source.clone().into_stream(4);
    let initial = source.requested();
    for item in 0..3 {
        source.emit(item);
    }

    // Act
    for _ in 0..3 {
        block_on(stream.next());
    }

    // Assert
    assert_eq!(initial, 4);
    assert_eq!(source.requested(), 7);

    Ok(())
}

#[test]
fn test_dropping_stream_cancels_subscription() -> anyhow::Result<()> {
    // Arrange
    let source = ManualPublisher::<i32>::new();
    let stream = source.clone().into_stream(4);

    // Act
    drop(stream);

    // Assert
    assert!(source.is_cancelled());

    Ok(())
}

#[test]
fn test_overflowing_publisher_surfaces_protocol_violation() -> anyhow::Result<()> {
    // Arrange
    let source = ManualPublisher::<i32>::new();
    let stream = source.clone().into_stream(2);
    for item in 0..3 {
        source.emit(item);
    }

    // Act
    let items: Vec<StreamItem<i32>> = block_on(stream.collect());

    // Assert
    assert!(source.is_cancelled());
    assert_eq!(items.len(), 3);
    assert!(items[2].is_error());

    Ok(())
}

#[tokio::test]
async fn test_stream_wakes_on_items_from_another_thread() -> anyhow::Result<()> {
    // Arrange
    let source = ManualPublisher::<i32>::new();
    let mut stream = source.clone().into_stream(16);
    let producer = source.clone();

    // Act
    let handle = thread::spawn(move || {
        for item in 0..5 {
            thread::sleep(Duration::from_millis(5));
            producer.emit(item);
        }
        producer.complete();
    });
    let mut received = Vec::new();
    while let Some(item) = stream.next().await {
        received.push(item.unwrap());
    }
    handle.join().map_err(|_| anyhow::anyhow!("producer panicked"))?;

    // Assert
    assert_eq!(received, vec![0, 1, 2, 3, 4]);

    Ok(())
}
