// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Prelude module re-exporting the operator traits, sources and common types.
//!
//! ```
//! use backflow_stream::prelude::*;
//!
//! let _windows = range(0, 10).window_split(|x: &i64| Ok(*x % 3 == 0));
//! ```

pub use crate::boundary::BoundaryMode;
pub use crate::buffer::BufferExt;
pub use crate::config::{BufferConfig, DrainOrder, FlatMapConfig, Overflow, WindowConfig};
pub use crate::flat_map::FlatMapExt;
pub use crate::into_stream::IntoStreamExt;
pub use crate::map_async::MapAsyncExt;
pub use crate::min_max::MinMaxExt;
pub use crate::publisher_ext::PublisherExt;
pub use crate::retry::RetryExt;
pub use crate::sources::{defer, empty, fail, from_iter, just, range};
pub use crate::unicast_processor::Segment;
pub use crate::window::WindowExt;
pub use backflow_core::{Flow, FlowError, Publisher, StreamItem};
