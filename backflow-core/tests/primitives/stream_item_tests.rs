// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// SPDX-License-Identifier: MIT OR Apache-2.0

use backflow_core::{FlowError, StreamItem};

#[test]
fn test_stream_item_value_accessors() {
    let item: StreamItem<i32> = StreamItem::Value(42);
    assert!(item.is_value());
    assert!(!item.is_error());
    assert_eq!(item.map(|v| v * 2).ok(), Some(84));
}

#[test]
fn test_stream_item_error_accessors() {
    let item: StreamItem<i32> = StreamItem::Error(FlowError::stream_error("boom"));
    assert!(item.is_error());
    assert!(matches!(
        item.err(),
        Some(FlowError::StreamError { context }) if context == "boom"
    ));
}

#[test]
fn test_stream_item_errors_never_compare_equal() {
    let a: StreamItem<i32> = StreamItem::Error(FlowError::stream_error("x"));
    let b: StreamItem<i32> = StreamItem::Error(FlowError::stream_error("x"));
    assert_ne!(a, b);
    assert_eq!(StreamItem::Value(1), StreamItem::Value(1));
}

#[test]
fn test_stream_item_result_conversions() {
    let item: StreamItem<i32> = Ok(7).into();
    let back: Result<i32, FlowError> = item.into();
    assert_eq!(back.ok(), Some(7));

    let failed: StreamItem<i32> = Err(FlowError::stream_error("nope")).into();
    assert!(failed.is_error());
}

#[test]
#[should_panic(expected = "called `StreamItem::unwrap()` on an `Error` value")]
fn test_stream_item_unwrap_panics_on_error() {
    let item: StreamItem<i32> = StreamItem::Error(FlowError::stream_error("x"));
    let _ = item.unwrap();
}
