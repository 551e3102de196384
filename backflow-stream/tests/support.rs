// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// SPDX-License-Identifier: MIT OR Apache-2.0

use backflow_core::Publisher;
use backflow_stream::Segment;
use backflow_test_utils::TestSubscriber;

/// Subscribes to every segment received so far and collects what each one holds.
pub fn segment_contents<T: Send + 'static>(windows: &TestSubscriber<Segment<T>>) -> Vec<Vec<T>> {
    windows
        .take_values()
        .into_iter()
        .map(|segment| {
            let items = TestSubscriber::<T>::unbounded();
            segment.subscribe(items.clone());
            items.take_values()
        })
        .collect()
}
