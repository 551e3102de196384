// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// SPDX-License-Identifier: MIT OR Apache-2.0

use backflow_core::{FlowError, Publisher};
use backflow_stream::prelude::*;
use backflow_test_utils::{ManualPublisher, TestSubscriber};

#[test]
fn test_buffer_while_starts_new_chunk_when_predicate_fails() -> anyhow::Result<()> {
    // Arrange
    let chunks = TestSubscriber::<Vec<i32>>::unbounded();

    // Act
    from_iter(vec![1, 2, 3, 4, 5])
        .buffer_while(|x: &i32| Ok(*x != 3))
        .subscribe(chunks.clone());

    // Assert
    chunks.assert_values(&[vec![1, 2], vec![3, 4, 5]]);
    chunks.assert_complete();

    Ok(())
}

#[test]
fn test_buffer_until_includes_boundary_in_closed_chunk() -> anyhow::Result<()> {
    // Arrange
    let chunks = TestSubscriber::<Vec<i32>>::unbounded();

    // Act
    from_iter(vec![1, 2, 3, 4, 5])
        .buffer_until(|x: &i32| Ok(*x == 3))
        .subscribe(chunks.clone());

    // Assert
    chunks.assert_values(&[vec![1, 2, 3], vec![4, 5]]);
    chunks.assert_complete();

    Ok(())
}

#[test]
fn test_buffer_split_drops_boundary_item() -> anyhow::Result<()> {
    // Arrange
    let chunks = TestSubscriber::<Vec<i32>>::unbounded();

    // Act
    from_iter(vec![1, 2, 3, 4, 5])
        .buffer_split(|x: &i32| Ok(*x == 3))
        .subscribe(chunks.clone());

    // Assert
    chunks.assert_values(&[vec![1, 2], vec![4, 5]]);
    chunks.assert_complete();

    Ok(())
}

#[test]
fn test_buffer_split_emits_empty_chunk_between_consecutive_boundaries() -> anyhow::Result<()> {
    // Arrange
    let chunks = TestSubscriber::<Vec<i32>>::unbounded();

    // Act
    from_iter(vec![1, 0, 0, 2])
        .buffer_split(|x: &i32| Ok(*x == 0))
        .subscribe(chunks.clone());

    // Assert
    chunks.assert_values(&[vec![1], vec![], vec![2]]);
    chunks.assert_complete();

    Ok(())
}

#[test]
fn test_buffer_before_mode_keeps_leading_boundary_in_first_chunk() -> anyhow::Result<()> {
    // Arrange
    let chunks = TestSubscriber::<Vec<i32>>::unbounded();

    // Act
    from_iter(vec![3, 1, 3])
        .buffer_when(|x: &i32| Ok(*x == 3), BoundaryMode::Before, BufferConfig::new())
        .subscribe(chunks.clone());

    // Assert
    chunks.assert_values(&[vec![3, 1], vec![3]]);
    chunks.assert_complete();

    Ok(())
}

#[test]
fn test_buffer_trailing_chunk_waits_for_demand() -> anyhow::Result<()> {
    // Arrange
    let source = ManualPublisher::<i32>::new();
    let chunks = TestSubscriber::<Vec<i32>>::new(1);
    source
        .clone()
        .buffer_until(|x: &i32| Ok(*x == 3))
        .subscribe(chunks.clone());

    // Act
    source.emit(1);
    source.emit(3);
    source.emit(4);
    source.complete();

    // Assert
    chunks.assert_values(&[vec![1, 3]]);
    chunks.assert_not_terminated();

    // Act
    chunks.request(1);

    // Assert
    chunks.assert_values(&[vec![1, 3], vec![4]]);
    chunks.assert_complete();

    Ok(())
}

#[test]
fn test_buffer_requests_replacement_for_absorbed_items() -> anyhow::Result<()> {
    // Arrange
    let source = ManualPublisher::<i32>::new();
    let chunks = TestSubscriber::<Vec<i32>>::new(2);
    source
        .clone()
        .buffer_until(|x: &i32| Ok(*x % 3 == 0))
        .subscribe(chunks.clone());

    // Act
    source.emit(1);
    source.emit(2);
    source.emit(3);

    // Assert
    assert_eq!(source.requested(), 4);
    chunks.assert_values(&[vec![1, 2, 3]]);

    Ok(())
}

#[test]
fn test_buffer_predicate_error_cancels_upstream_and_drops_partial_chunk() -> anyhow::Result<()> {
    // Arrange
    let source = ManualPublisher::<i32>::new();
    let chunks = TestSubscriber::<Vec<i32>>::unbounded();
    source
        .clone()
        .buffer_until(|x: &i32| {
            if *x < 0 {
                Err(FlowError::stream_error("negative"))
            } else {
                Ok(*x == 10)
            }
        })
        .subscribe(chunks.clone());

    // Act
    source.emit(1);
    source.emit(-1);
    source.emit(10);
    source.complete();

    // Assert
    assert!(source.is_cancelled());
    assert_eq!(chunks.item_count(), 0);
    assert_eq!(chunks.assert_error().to_string(), "Stream error: negative");

    Ok(())
}

#[test]
fn test_buffer_upstream_error_discards_partial_chunk() -> anyhow::Result<()> {
    // Arrange
    let source = ManualPublisher::<i32>::new();
    let chunks = TestSubscriber::<Vec<i32>>::unbounded();
    source
        .clone()
        .buffer_until(|x: &i32| Ok(*x == 2))
        .subscribe(chunks.clone());

    // Act
    source.emit(1);
    source.emit(2);
    source.emit(3);
    source.error(FlowError::stream_error("upstream"));

    // Assert
    chunks.assert_values(&[vec![1, 2]]);
    chunks.assert_error();
    assert!(!source.is_cancelled());

    Ok(())
}

#[test]
#[should_panic(expected = "capacity_hint")]
fn test_buffer_when_rejects_oversized_capacity_hint() {
    let _ = range(0, 1).buffer_when(
        |x: &i64| Ok(*x == 0),
        BoundaryMode::After,
        BufferConfig::new().with_capacity_hint(backflow_stream::config::MAX_CHUNK_CAPACITY + 1),
    );
}
