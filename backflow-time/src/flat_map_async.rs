// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Bounded merge whose output is delivered from a scheduler.
//!
//! The merge itself is [`FlatMap`]; its output is then moved onto the
//! scheduler with [`emit_on`](crate::EmitOnExt::emit_on), prefetching as many
//! items as the merge prefetches per inner publisher.
//!
//! ```
//! use backflow_core::Publisher;
//! use backflow_stream::sources::{from_iter, range};
//! use backflow_test_utils::{ManualScheduler, TestSubscriber};
//! use backflow_time::prelude::*;
//!
//! let scheduler = ManualScheduler::new();
//! let subscriber = TestSubscriber::<i64>::unbounded();
//! range(1, 2)
//!     .flat_map_async(|x: i64| Ok(from_iter(vec![x, x * 10])), scheduler.clone())
//!     .subscribe(subscriber.clone());
//!
//! scheduler.run_due();
//! subscriber.assert_values(&[1, 10, 2, 20]);
//! subscriber.assert_complete();
//! ```

use crate::emit_on::{EmitOn, EmitOnExt};
use backflow_core::{Publisher, Result, Scheduler};
use backflow_stream::{FlatMap, FlatMapConfig, FlatMapExt};

/// Extension trait providing the scheduler-driven merge.
pub trait FlatMapAsyncExt<T>: Publisher<T> + Sized
where
    T: Send + 'static,
{
    /// Merges depth-first, up to 32 inner publishers at a time, emitting on
    /// `scheduler`.
    fn flat_map_async<R, Q, F, S>(self, mapper: F, scheduler: S) -> EmitOn<FlatMap<Self, T, R>, S>
    where
        R: Send + 'static,
        Q: Publisher<R> + 'static,
        F: Fn(T) -> Result<Q> + Send + Sync + 'static,
        S: Scheduler;

    /// Merges as configured, emitting on `scheduler`.
    ///
    /// # Panics
    ///
    /// Panics if `config` does not validate.
    fn flat_map_async_with_config<R, Q, F, S>(
        self,
        mapper: F,
        scheduler: S,
        config: FlatMapConfig,
    ) -> EmitOn<FlatMap<Self, T, R>, S>
    where
        R: Send + 'static,
        Q: Publisher<R> + 'static,
        F: Fn(T) -> Result<Q> + Send + Sync + 'static,
        S: Scheduler;
}

impl<P, T> FlatMapAsyncExt<T> for P
where
    P: Publisher<T>,
    T: Send + 'static,
{
    fn flat_map_async<R, Q, F, S>(self, mapper: F, scheduler: S) -> EmitOn<FlatMap<Self, T, R>, S>
    where
        R: Send + 'static,
        Q: Publisher<R> + 'static,
        F: Fn(T) -> Result<Q> + Send + Sync + 'static,
        S: Scheduler,
    {
        self.flat_map_async_with_config(mapper, scheduler, FlatMapConfig::sync())
    }

    fn flat_map_async_with_config<R, Q, F, S>(
        self,
        mapper: F,
        scheduler: S,
        config: FlatMapConfig,
    ) -> EmitOn<FlatMap<Self, T, R>, S>
    where
        R: Send + 'static,
        Q: Publisher<R> + 'static,
        F: Fn(T) -> Result<Q> + Send + Sync + 'static,
        S: Scheduler,
    {
        self.flat_map_with_config(mapper, config)
            .emit_on(scheduler, config.prefetch())
    }
}
