// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// SPDX-License-Identifier: MIT OR Apache-2.0

use backflow_core::Scheduler;
use backflow_stream::prelude::*;
use backflow_time::prelude::*;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

#[tokio::test(start_paused = true)]
async fn test_scheduled_task_runs_after_delay() -> anyhow::Result<()> {
    // Arrange
    let scheduler = TokioScheduler::new();
    let fired = Arc::new(AtomicBool::new(false));
    let flag = fired.clone();

    // Act
    scheduler.schedule_once(
        Duration::from_millis(100),
        Box::new(move || flag.store(true, Ordering::SeqCst)),
    );
    sleep(Duration::from_millis(50)).await;
    let early = fired.load(Ordering::SeqCst);
    sleep(Duration::from_millis(100)).await;

    // Assert
    assert!(!early);
    assert!(fired.load(Ordering::SeqCst));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_task_never_runs() -> anyhow::Result<()> {
    // Arrange
    let scheduler = TokioScheduler::new();
    let fired = Arc::new(AtomicBool::new(false));
    let flag = fired.clone();
    let task = scheduler.schedule_once(
        Duration::from_millis(100),
        Box::new(move || flag.store(true, Ordering::SeqCst)),
    );

    // Act
    let cancelled = task.cancel();
    sleep(Duration::from_millis(200)).await;

    // Assert
    assert!(cancelled);
    assert!(task.is_cancelled());
    assert!(!fired.load(Ordering::SeqCst));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_spanout_paces_stream_on_tokio_clock() -> anyhow::Result<()> {
    // Arrange
    let started = Instant::now();
    let stream = range(0, 3)
        .spanout(
            Duration::ZERO,
            Duration::from_millis(100),
            TokioScheduler::new(),
            false,
        )
        .to_stream();

    // Act
    let items: Vec<_> = stream.collect().await;

    // Assert
    assert_eq!(
        items,
        vec![
            StreamItem::Value(0),
            StreamItem::Value(1),
            StreamItem::Value(2)
        ]
    );
    assert!(started.elapsed() >= Duration::from_millis(200));

    Ok(())
}
