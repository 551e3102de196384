// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// SPDX-License-Identifier: MIT OR Apache-2.0

use backflow_core::Publisher;
use backflow_stream::prelude::*;
use backflow_test_utils::TestSubscriber;

#[test]
fn test_composed_pipeline_never_exceeds_demand() -> anyhow::Result<()> {
    for requested in 1..=8_u64 {
        // Arrange
        let subscriber = TestSubscriber::<Vec<i64>>::new(requested);

        // Act
        range(0, 50)
            .flat_map(|x: i64| Ok(from_iter(vec![x, x])))
            .buffer_until(|x: &i64| Ok(*x % 3 == 0))
            .subscribe(subscriber.clone());

        // Assert
        assert_eq!(subscriber.item_count() as u64, requested);
        subscriber.assert_not_terminated();
    }

    Ok(())
}

#[test]
fn test_round_robin_merge_feeds_aggregation() -> anyhow::Result<()> {
    // Arrange
    let subscriber = TestSubscriber::<i64>::with_request_per_item(1, 1);

    // Act
    range(0, 1_000)
        .flat_map_with_config(
            |x: i64| Ok(range(x * 10, 10)),
            FlatMapConfig::round_robin().with_max_concurrency(4),
        )
        .max()
        .subscribe(subscriber.clone());

    // Assert
    subscriber.assert_values(&[9_999]);
    subscriber.assert_complete();

    Ok(())
}

#[test]
fn test_window_segments_count_against_outer_demand() -> anyhow::Result<()> {
    // Arrange
    let windows = TestSubscriber::<Segment<i64>>::new(2);

    // Act
    range(0, 20)
        .window_until(|x: &i64| Ok(*x % 5 == 4))
        .subscribe(windows.clone());

    // Assert
    assert_eq!(windows.item_count(), 2);
    windows.assert_not_terminated();

    // Act
    windows.request(10);

    // Assert
    assert_eq!(windows.item_count(), 4);
    windows.assert_complete();

    Ok(())
}
