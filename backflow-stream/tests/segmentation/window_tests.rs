// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::support::segment_contents;
use backflow_core::{Offer, Publisher};
use backflow_stream::prelude::*;
use backflow_stream::WindowConfig;
use backflow_test_utils::{ManualPublisher, TestSubscriber};

#[test]
fn test_window_until_closes_after_boundary_item() -> anyhow::Result<()> {
    // Arrange
    let windows = TestSubscriber::<Segment<i32>>::unbounded();

    // Act
    from_iter(vec![1, 2, 3, 4, 5])
        .window_until(|x: &i32| Ok(*x == 3))
        .subscribe(windows.clone());

    // Assert
    windows.assert_complete();
    assert_eq!(segment_contents(&windows), vec![vec![1, 2, 3], vec![4, 5]]);

    Ok(())
}

#[test]
fn test_window_before_mode_starts_next_segment_with_boundary_item() -> anyhow::Result<()> {
    // Arrange
    let windows = TestSubscriber::<Segment<i32>>::unbounded();

    // Act
    from_iter(vec![1, 2, 3, 4, 5])
        .window_when(|x: &i32| Ok(*x == 3), BoundaryMode::Before, WindowConfig::new())
        .subscribe(windows.clone());

    // Assert
    windows.assert_complete();
    assert_eq!(segment_contents(&windows), vec![vec![1, 2], vec![3, 4, 5]]);

    Ok(())
}

#[test]
fn test_window_while_opens_segment_when_predicate_fails() -> anyhow::Result<()> {
    // Arrange
    let windows = TestSubscriber::<Segment<i32>>::unbounded();

    // Act
    from_iter(vec![1, 2, 3, 4, 5])
        .window_while(|x: &i32| Ok(*x != 3))
        .subscribe(windows.clone());

    // Assert
    windows.assert_complete();
    assert_eq!(segment_contents(&windows), vec![vec![1, 2], vec![3, 4, 5]]);

    Ok(())
}

#[test]
fn test_window_split_drops_boundary_item() -> anyhow::Result<()> {
    // Arrange
    let windows = TestSubscriber::<Segment<i32>>::unbounded();

    // Act
    from_iter(vec![1, 2, 3, 4, 5])
        .window_split(|x: &i32| Ok(*x == 3))
        .subscribe(windows.clone());

    // Assert
    windows.assert_complete();
    assert_eq!(segment_contents(&windows), vec![vec![1, 2], vec![4, 5]]);

    Ok(())
}

#[test]
fn test_window_before_mode_never_emits_empty_leading_segment() -> anyhow::Result<()> {
    // Arrange
    let windows = TestSubscriber::<Segment<i32>>::unbounded();

    // Act
    from_iter(vec![3, 3, 3])
        .window_when(|x: &i32| Ok(*x == 3), BoundaryMode::Before, WindowConfig::new())
        .subscribe(windows.clone());

    // Assert
    windows.assert_complete();
    assert_eq!(segment_contents(&windows), vec![vec![3], vec![3], vec![3]]);

    Ok(())
}

#[test]
fn test_window_on_empty_source_emits_no_segment() -> anyhow::Result<()> {
    // Arrange
    let windows = TestSubscriber::<Segment<i32>>::unbounded();

    // Act
    empty::<i32>()
        .window_until(|x: &i32| Ok(*x == 3))
        .subscribe(windows.clone());

    // Assert
    assert_eq!(windows.item_count(), 0);
    windows.assert_complete();

    Ok(())
}

#[test]
fn test_window_final_lookahead_waits_for_outer_demand() -> anyhow::Result<()> {
    // Arrange
    let source = ManualPublisher::<i32>::new();
    let windows = TestSubscriber::<Segment<i32>>::new(1);
    source
        .clone()
        .window_when(|x: &i32| Ok(*x == 3), BoundaryMode::Before, WindowConfig::new())
        .subscribe(windows.clone());

    // Act
    source.emit(1);
    source.emit(3);
    source.complete();

    // Assert
    assert_eq!(windows.item_count(), 1);
    windows.assert_not_terminated();

    // Act
    windows.request(1);

    // Assert
    windows.assert_complete();
    assert_eq!(segment_contents(&windows), vec![vec![1], vec![3]]);

    Ok(())
}

#[test]
fn test_window_reports_filtered_for_items_joining_open_segment() -> anyhow::Result<()> {
    // Arrange
    let source = ManualPublisher::<i32>::new();
    let windows = TestSubscriber::<Segment<i32>>::unbounded();
    source
        .clone()
        .window_until(|x: &i32| Ok(*x == 2))
        .subscribe(windows.clone());

    // Act
    let opening = source.offer(1);
    let closing = source.offer(2);
    let reopening = source.offer(3);

    // Assert
    assert_eq!(opening, Some(Offer::Delivered));
    assert_eq!(closing, Some(Offer::Filtered));
    assert_eq!(reopening, Some(Offer::Delivered));

    Ok(())
}

#[test]
fn test_window_replenishes_upstream_for_items_not_opening_a_segment() -> anyhow::Result<()> {
    // Arrange
    let source = ManualPublisher::<i32>::new();
    let windows = TestSubscriber::<Segment<i32>>::new(1);
    source
        .clone()
        .window_until(|x: &i32| Ok(*x == 9))
        .subscribe(windows.clone());
    let initial = source.requested();

    // Act
    source.emit(1);
    source.emit(2);
    source.emit(3);

    // Assert
    assert_eq!(initial, 1);
    assert_eq!(source.requested(), 3);
    assert_eq!(windows.item_count(), 1);

    Ok(())
}
