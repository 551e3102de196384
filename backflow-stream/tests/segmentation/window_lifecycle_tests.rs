// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// SPDX-License-Identifier: MIT OR Apache-2.0

use backflow_core::{FlowError, Publisher};
use backflow_stream::prelude::*;
use backflow_test_utils::{ManualPublisher, TestSubscriber};

#[test]
fn test_outer_cancel_keeps_open_segment_alive() -> anyhow::Result<()> {
    // Arrange
    let source = ManualPublisher::<i32>::new();
    let windows = TestSubscriber::<Segment<i32>>::unbounded();
    source
        .clone()
        .window_until(|x: &i32| Ok(*x == 3))
        .subscribe(windows.clone());
    source.emit(1);
    let segment = windows.take_values().remove(0);
    let items = TestSubscriber::<i32>::unbounded();
    segment.subscribe(items.clone());

    // Act
    windows.cancel();
    source.emit(2);

    // Assert
    assert!(!source.is_cancelled());
    items.assert_values(&[1, 2]);
    items.assert_not_terminated();

    // Act
    source.emit(3);

    // Assert
    items.assert_values(&[1, 2, 3]);
    items.assert_complete();
    assert!(source.is_cancelled());

    Ok(())
}

#[test]
fn test_items_after_outer_cancel_do_not_open_segments() -> anyhow::Result<()> {
    // Arrange
    let source = ManualPublisher::<i32>::new();
    let windows = TestSubscriber::<Segment<i32>>::unbounded();
    source
        .clone()
        .window_split(|x: &i32| Ok(*x == 0))
        .subscribe(windows.clone());
    source.emit(1);

    // Act
    windows.cancel();
    source.emit(0);
    source.emit(2);

    // Assert
    assert_eq!(windows.item_count(), 1);
    assert!(source.is_cancelled());

    Ok(())
}

#[test]
fn test_cancelling_every_segment_and_outer_cancels_upstream() -> anyhow::Result<()> {
    // Arrange
    let source = ManualPublisher::<i32>::new();
    let windows = TestSubscriber::<Segment<i32>>::unbounded();
    source
        .clone()
        .window_until(|x: &i32| Ok(*x == 3))
        .subscribe(windows.clone());
    source.emit(1);
    let segment = windows.take_values().remove(0);
    let items = TestSubscriber::<i32>::unbounded();
    segment.subscribe(items.clone());

    // Act
    items.cancel();

    // Assert
    assert!(!source.is_cancelled());

    // Act
    windows.cancel();

    // Assert
    assert!(source.is_cancelled());
    assert_eq!(source.cancel_count(), 1);

    Ok(())
}

#[test]
fn test_predicate_error_fails_segment_and_outer() -> anyhow::Result<()> {
    // Arrange
    let source = ManualPublisher::<i32>::new();
    let windows = TestSubscriber::<Segment<i32>>::unbounded();
    source
        .clone()
        .window_until(|x: &i32| {
            if *x == 2 {
                Err(FlowError::stream_error("bad boundary"))
            } else {
                Ok(false)
            }
        })
        .subscribe(windows.clone());

    // Act
    source.emit(1);
    source.emit(2);
    source.emit(3);

    // Assert
    assert!(source.is_cancelled());
    let error = windows.assert_error();
    assert!(matches!(error, FlowError::StreamError { .. }));
    let segment = windows.take_values().remove(0);
    let items = TestSubscriber::<i32>::unbounded();
    segment.subscribe(items.clone());
    items.assert_values(&[1]);
    assert_eq!(items.assert_error().to_string(), "Stream error: bad boundary");

    Ok(())
}

#[derive(Debug)]
struct Boom;

impl std::fmt::Display for Boom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "boom")
    }
}

impl std::error::Error for Boom {}

#[test]
fn test_predicate_user_error_keeps_its_class_in_segment_and_outer() -> anyhow::Result<()> {
    // Arrange
    let source = ManualPublisher::<i32>::new();
    let windows = TestSubscriber::<Segment<i32>>::unbounded();
    source
        .clone()
        .window_until(|x: &i32| {
            if *x == 2 {
                Err(FlowError::user_error(Boom))
            } else {
                Ok(false)
            }
        })
        .subscribe(windows.clone());

    // Act
    source.emit(1);
    source.emit(2);

    // Assert
    let outer = windows.assert_error();
    assert!(outer.is_user_error());
    let segment = windows.take_values().remove(0);
    let items = TestSubscriber::<i32>::unbounded();
    segment.subscribe(items.clone());
    items.assert_values(&[1]);
    let inner = items.assert_error();
    assert!(inner.is_user_error());
    assert_eq!(inner.to_string(), "User error: boom");

    Ok(())
}

#[test]
fn test_upstream_error_reaches_open_segment_and_outer() -> anyhow::Result<()> {
    // Arrange
    let source = ManualPublisher::<i32>::new();
    let windows = TestSubscriber::<Segment<i32>>::unbounded();
    source
        .clone()
        .window_until(|x: &i32| Ok(*x == 3))
        .subscribe(windows.clone());
    source.emit(1);

    // Act
    source.error(FlowError::stream_error("upstream"));

    // Assert
    windows.assert_error();
    let segment = windows.take_values().remove(0);
    let items = TestSubscriber::<i32>::unbounded();
    segment.subscribe(items.clone());
    items.assert_values(&[1]);
    items.assert_error();

    Ok(())
}

#[test]
fn test_segment_accepts_a_single_subscriber() -> anyhow::Result<()> {
    // Arrange
    let windows = TestSubscriber::<Segment<i32>>::unbounded();
    from_iter(vec![1, 2])
        .window_until(|_: &i32| Ok(false))
        .subscribe(windows.clone());
    let segment = windows.take_values().remove(0);
    let first = TestSubscriber::<i32>::unbounded();
    let second = TestSubscriber::<i32>::unbounded();

    // Act
    segment.subscribe(first.clone());
    segment.subscribe(second.clone());

    // Assert
    first.assert_values(&[1, 2]);
    first.assert_complete();
    assert!(second.assert_error().is_misuse());

    Ok(())
}

#[test]
fn test_segment_respects_its_own_demand() -> anyhow::Result<()> {
    // Arrange
    let windows = TestSubscriber::<Segment<i32>>::unbounded();
    from_iter(vec![1, 2, 3])
        .window_until(|_: &i32| Ok(false))
        .subscribe(windows.clone());
    let segment = windows.take_values().remove(0);
    let items = TestSubscriber::<i32>::new(1);

    // Act
    segment.subscribe(items.clone());

    // Assert
    items.assert_values(&[1]);
    assert_eq!(segment.buffered(), 2);

    // Act
    items.request(5);

    // Assert
    items.assert_values(&[1, 2, 3]);
    items.assert_complete();

    Ok(())
}
