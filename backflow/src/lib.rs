// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! # Backflow
//!
//! Demand-driven reactive streams. A subscriber states how many items it is
//! ready for and a publisher never sends more; cancellation travels upstream
//! and each subscription ends with at most one terminal signal.
//!
//! ## Overview
//!
//! This crate bundles the workspace behind a single dependency:
//!
//! - [`backflow_core`]: the protocol traits, demand arithmetic, the drain
//!   serializer and the [`Scheduler`] abstraction
//! - [`backflow_stream`]: sources and operators (windows, buffers,
//!   `flat_map`, `map_async`, retry, min/max) plus the bridge to `futures::Stream`
//! - [`backflow_time`]: `spanout`, `debounce_first`, `emit_on`, `flat_map_async`
//!   and the tokio scheduler
//!
//! ## Quick Start
//!
//! ```rust
//! use backflow::prelude::*;
//! use futures::StreamExt;
//!
//! # futures::executor::block_on(async {
//! let chunks: Vec<Vec<i64>> = range(1, 9)
//!     .flat_map(|x: i64| Ok(just(x * 10)))
//!     .buffer_split(|x: &i64| Ok(*x % 30 == 0))
//!     .to_stream()
//!     .map(StreamItem::unwrap)
//!     .collect()
//!     .await;
//!
//! assert_eq!(chunks, vec![vec![10, 20], vec![40, 50], vec![70, 80]]);
//! # });
//! ```
//!
//! Timer-driven operators take their scheduler as an argument; with the
//! `runtime-tokio` feature (on by default) [`TokioScheduler`] drives them from
//! a tokio runtime.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub use backflow_core::{
    Flow, FlowError, Offer, Publisher, Scheduler, StreamItem, Subscriber, Subscription,
};
pub use backflow_error::Result;
pub use backflow_stream::{BoundaryMode, Segment, SubscriberStream};
#[cfg(feature = "runtime-tokio")]
pub use backflow_time::runtimes::TokioScheduler;

pub use backflow_stream as stream;
pub use backflow_time as time;

/// Prelude module for convenient imports
pub mod prelude {
    pub use backflow_core::{Flow, FlowError, Offer, Publisher, Scheduler, StreamItem};
    pub use backflow_stream::prelude::*;
    pub use backflow_time::prelude::*;
}
