// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// SPDX-License-Identifier: MIT OR Apache-2.0

use backflow_core::{FlowError, Publisher};
use backflow_stream::prelude::*;
use backflow_test_utils::{ManualPublisher, TestSubscriber};
use std::sync::Arc;

#[test]
fn test_inner_error_cancels_siblings_and_upstream() -> anyhow::Result<()> {
    // Arrange
    let source = ManualPublisher::<usize>::new();
    let inners: Vec<Arc<ManualPublisher<i32>>> = (0..2).map(|_| ManualPublisher::new()).collect();
    let mapped = inners.clone();
    let subscriber = TestSubscriber::<i32>::unbounded();
    source
        .clone()
        .flat_map(move |index: usize| Ok(mapped[index].clone()))
        .subscribe(subscriber.clone());
    source.emit(0);
    source.emit(1);
    inners[0].emit(5);

    // Act
    inners[1].error(FlowError::stream_error("inner"));
    inners[0].emit(6);

    // Assert
    subscriber.assert_values(&[5]);
    assert_eq!(subscriber.assert_error().to_string(), "Stream error: inner");
    assert!(inners[0].is_cancelled());
    assert!(source.is_cancelled());

    Ok(())
}

#[test]
fn test_upstream_error_fails_fast() -> anyhow::Result<()> {
    // Arrange
    let source = ManualPublisher::<usize>::new();
    let inner = ManualPublisher::<i32>::new();
    let mapped = inner.clone();
    let subscriber = TestSubscriber::<i32>::unbounded();
    source
        .clone()
        .flat_map(move |_: usize| Ok(mapped.clone()))
        .subscribe(subscriber.clone());
    source.emit(0);

    // Act
    source.error(FlowError::stream_error("upstream"));

    // Assert
    subscriber.assert_error();
    assert!(inner.is_cancelled());

    Ok(())
}

#[test]
fn test_mapper_error_cancels_upstream() -> anyhow::Result<()> {
    // Arrange
    let source = ManualPublisher::<i32>::new();
    let subscriber = TestSubscriber::<i32>::unbounded();
    source
        .clone()
        .flat_map(|x: i32| {
            if x == 1 {
                Err(FlowError::stream_error("mapper"))
            } else {
                Ok(just(x))
            }
        })
        .subscribe(subscriber.clone());

    // Act
    source.emit(0);
    source.emit(1);
    source.emit(2);

    // Assert
    subscriber.assert_values(&[0]);
    assert_eq!(subscriber.assert_error().to_string(), "Stream error: mapper");
    assert!(source.is_cancelled());

    Ok(())
}

#[test]
fn test_delay_error_collects_every_failure() -> anyhow::Result<()> {
    // Arrange
    let subscriber = TestSubscriber::<i32>::unbounded();

    // Act
    from_iter(vec![0, 1, 2])
        .flat_map_with_config(
            |x: i32| {
                Ok(match x {
                    1 => from_iter(vec![10]).boxed(),
                    _ => fail(FlowError::stream_error(format!("inner {x}"))).boxed(),
                })
            },
            FlatMapConfig::delay_errors(),
        )
        .subscribe(subscriber.clone());

    // Assert
    subscriber.assert_values(&[10]);
    let error = subscriber.assert_error();
    assert!(matches!(error, FlowError::Composite { count: 2, .. }));
    let messages: Vec<String> = error.errors().iter().map(ToString::to_string).collect();
    assert_eq!(messages, vec!["Stream error: inner 0", "Stream error: inner 2"]);

    Ok(())
}

#[test]
fn test_delay_error_with_single_failure_is_not_composite() -> anyhow::Result<()> {
    // Arrange
    let subscriber = TestSubscriber::<i32>::unbounded();

    // Act
    from_iter(vec![0, 1])
        .flat_map_with_config(
            |x: i32| {
                Ok(match x {
                    0 => fail(FlowError::stream_error("only")).boxed(),
                    _ => from_iter(vec![1, 2]).boxed(),
                })
            },
            FlatMapConfig::delay_errors(),
        )
        .subscribe(subscriber.clone());

    // Assert
    subscriber.assert_values(&[1, 2]);
    assert!(matches!(
        subscriber.assert_error(),
        FlowError::StreamError { .. }
    ));

    Ok(())
}

#[test]
fn test_misbehaving_inner_is_reported_as_protocol_violation() -> anyhow::Result<()> {
    // Arrange
    let source = ManualPublisher::<usize>::new();
    let inner = ManualPublisher::<i32>::new();
    let mapped = inner.clone();
    let subscriber = TestSubscriber::<i32>::new(0);
    source
        .clone()
        .flat_map_with_config(
            move |_: usize| Ok(mapped.clone()),
            FlatMapConfig::new().with_prefetch(2),
        )
        .subscribe(subscriber.clone());
    source.emit(0);

    // Act
    inner.emit(1);
    inner.emit(2);
    inner.emit(3);

    // Assert
    assert!(inner.is_cancelled());
    assert!(subscriber.assert_error().is_misuse());

    Ok(())
}

#[test]
#[should_panic(expected = "max_concurrency")]
fn test_zero_concurrency_is_rejected() {
    let _ = range(0, 1).flat_map_with_config(
        |x: i64| Ok(just(x)),
        FlatMapConfig::new().with_max_concurrency(0),
    );
}
