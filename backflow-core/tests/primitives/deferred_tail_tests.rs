// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// SPDX-License-Identifier: MIT OR Apache-2.0

use backflow_core::DeferredTail;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;

#[test]
fn test_tail_waits_for_demand() {
    let tail = DeferredTail::new();
    let emitted = Mutex::new(Vec::new());

    tail.complete(Some(9), |v| emitted.lock().push(v));
    assert!(emitted.lock().is_empty());

    tail.request(1, |v| emitted.lock().push(v));
    assert_eq!(*emitted.lock(), vec![Some(9)]);
    assert!(tail.is_finished());
}

#[test]
fn test_tail_emits_immediately_with_leftover_demand() {
    let tail = DeferredTail::new();
    let emitted = Mutex::new(Vec::new());

    tail.request(3, |v| emitted.lock().push(v));
    tail.produced(2);
    tail.complete(Some("last"), |v| emitted.lock().push(v));

    assert_eq!(*emitted.lock(), vec![Some("last")]);
}

#[test]
fn test_tail_without_value_finishes_without_demand() {
    let tail: DeferredTail<i32> = DeferredTail::new();
    let emitted = Mutex::new(Vec::new());

    tail.complete(None, |v| emitted.lock().push(v));

    assert_eq!(*emitted.lock(), vec![None]);
}

#[test]
fn test_tail_consumed_demand_holds_value_back() {
    let tail = DeferredTail::new();
    let emitted = Mutex::new(Vec::new());

    tail.request(2, |v| emitted.lock().push(v));
    tail.produced(2);
    tail.complete(Some(1), |v| emitted.lock().push(v));

    assert!(emitted.lock().is_empty());
}

#[test]
fn test_cancelled_tail_never_finishes() {
    let tail = DeferredTail::new();
    let emitted = Mutex::new(Vec::new());

    tail.cancel();
    tail.complete(Some(1), |v| emitted.lock().push(v));
    tail.request(1, |v| emitted.lock().push(v));

    assert!(emitted.lock().is_empty());
}

#[test]
fn test_racing_request_and_complete_finish_once() {
    for _ in 0..200 {
        let tail = Arc::new(DeferredTail::new());
        let emitted = Arc::new(Mutex::new(Vec::new()));

        let requester = {
            let tail = tail.clone();
            let emitted = emitted.clone();
            thread::spawn(move || tail.request(1, |v| emitted.lock().push(v)))
        };
        tail.complete(Some(5), |v| emitted.lock().push(v));
        requester.join().unwrap();

        assert_eq!(*emitted.lock(), vec![Some(5)]);
    }
}
