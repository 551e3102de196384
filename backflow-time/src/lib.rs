// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Timer-driven operators for Backflow publishers.
//!
//! Operators in this crate never sleep or read the system clock themselves.
//! They take a [`Scheduler`](backflow_core::Scheduler) that supplies the
//! current instant and runs delayed tasks, so tests drive them with a virtual
//! clock and production code plugs in a runtime timer.
//!
//! # Overview
//!
//! - **[`SpanoutExt`]** - `.spanout(initial, between, scheduler, delay_error)` spaces emissions apart
//! - **[`DebounceFirstExt`]** - `.debounce_first(timeout, scheduler)` keeps the first item of each burst
//! - **[`EmitOnExt`]** - `.emit_on(scheduler, prefetch)` delivers signals from scheduler tasks
//! - **[`FlatMapAsyncExt`]** - `.flat_map_async(mapper, scheduler)` bounded merge emitting on a scheduler
//!
//! # Runtime Support
//!
//! - `runtime-tokio` (default) - [`TokioScheduler`](runtimes::TokioScheduler) over tokio timers
//!
//! # Example
//!
//! ```rust,no_run
//! use backflow_core::Publisher;
//! use backflow_stream::prelude::*;
//! use backflow_time::prelude::*;
//! use backflow_time::runtimes::TokioScheduler;
//! use futures::StreamExt;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let scheduler = TokioScheduler::new();
//! let mut paced = range(0, 5)
//!     .spanout(Duration::ZERO, Duration::from_millis(100), scheduler, false)
//!     .to_stream();
//!
//! while let Some(item) = paced.next().await {
//!     println!("{:?}", item.ok());
//! }
//! # }
//! ```

#![allow(clippy::multiple_crate_versions, clippy::doc_markdown)]

#[macro_use]
mod logging;

pub mod debounce_first;
pub mod emit_on;
pub mod flat_map_async;
pub mod prelude;
pub mod runtimes;
pub mod spanout;

pub use debounce_first::{DebounceFirst, DebounceFirstExt};
pub use emit_on::{EmitOn, EmitOnExt};
pub use flat_map_async::FlatMapAsyncExt;
pub use spanout::{Spanout, SpanoutExt};
