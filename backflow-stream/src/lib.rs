// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Backpressure-aware stream operators.
//!
//! Every operator in this crate is a [`Publisher`](backflow_core::Publisher)
//! that wraps an upstream publisher and speaks the demand-driven protocol of
//! [`backflow_core`] on both sides: it never emits more than its subscriber
//! requested, delivers exactly one terminal signal, and stops promptly when
//! cancelled.
//!
//! # Operator Categories
//!
//! ### Sources
//!
//! - **[`from_iter`](sources::from_iter)**, **[`range`](sources::range)**,
//!   **[`just`](sources::just)**, **[`empty`](sources::empty)**,
//!   **[`fail`](sources::fail)**, **[`defer`](sources::defer)**
//!
//! ### Segmentation
//!
//! - **[`window_while`](WindowExt::window_while)** / **[`window_until`](WindowExt::window_until)** /
//!   **[`window_split`](WindowExt::window_split)**: split into [`Segment`] publishers
//! - **[`buffer_while`](BufferExt::buffer_while)** / **[`buffer_until`](BufferExt::buffer_until)** /
//!   **[`buffer_split`](BufferExt::buffer_split)**: split into `Vec` chunks
//!
//! ### Merging
//!
//! - **[`flat_map`](FlatMapExt::flat_map)**: bounded-concurrency merge of inner publishers
//! - **[`switch_flat_map`](FlatMapExt::switch_flat_map)**: keep only the newest inner publishers
//! - **[`flat_map_with`](FlatMapExt::flat_map_with)**: merge and combine with the outer item
//! - **[`map_async`](MapAsyncExt::map_async)** / **[`map_async_with`](MapAsyncExt::map_async_with)**:
//!   first item of one inner publisher at a time, in upstream order
//! - **[`filter_async`](MapAsyncExt::filter_async)**: keep items an inner publisher approves
//!
//! ### Error Handling
//!
//! - **[`retry_while`](RetryExt::retry_while)** / **[`retry`](RetryExt::retry)**: resubscribe on approved errors
//!
//! ### Aggregation
//!
//! - **[`min`](MinMaxExt::min)** / **[`max`](MinMaxExt::max)** and their `_by` variants
//!
//! ### Bridging
//!
//! - **[`into_stream`](IntoStreamExt::into_stream)**: consume a publisher as a `futures::Stream`
//! - **[`guarded`](PublisherExt::guarded)**: enforce the protocol on an untrusted publisher
//!
//! # Example
//!
//! ```
//! use backflow_core::Publisher;
//! use backflow_stream::prelude::*;
//! use backflow_test_utils::TestSubscriber;
//!
//! let subscriber = TestSubscriber::<Vec<i64>>::unbounded();
//! range(1, 6)
//!     .flat_map(|x: i64| Ok(from_iter(vec![x; 2])))
//!     .buffer_until(|x: &i64| Ok(*x % 2 == 0))
//!     .subscribe(subscriber.clone());
//!
//! subscriber.assert_values(&[
//!     vec![1, 1, 2],
//!     vec![2],
//!     vec![3, 3, 4],
//!     vec![4],
//!     vec![5, 5, 6],
//!     vec![6],
//! ]);
//! ```

#![allow(clippy::multiple_crate_versions, clippy::doc_markdown)]

#[macro_use]
mod logging;

pub mod boundary;
pub mod buffer;
pub mod config;
pub mod flat_map;
pub mod into_stream;
pub mod map_async;
pub mod min_max;
pub mod prelude;
pub mod publisher_ext;
pub mod retry;
pub mod sources;
pub mod unicast_processor;
pub mod window;

pub use boundary::{Boundary, BoundaryMode};
pub use buffer::{Buffer, BufferExt};
pub use config::{BufferConfig, DrainOrder, FlatMapConfig, Overflow, WindowConfig};
pub use flat_map::{FlatMap, FlatMapExt, Mapper};
pub use into_stream::{IntoStreamExt, SubscriberStream};
pub use map_async::{MapAsync, MapAsyncExt};
pub use min_max::{MinMax, MinMaxExt};
pub use publisher_ext::{Guarded, PublisherExt};
pub use retry::{Retry, RetryExt, RetryPredicate};
pub use unicast_processor::{Segment, UnicastProcessor};
pub use window::{Window, WindowExt};
