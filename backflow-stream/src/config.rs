// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Validated configuration for the segmentation and merge engines.
//!
//! Every config is a plain `Copy` value with `const` builders, so presets can
//! live in constants:
//!
//! ```
//! use backflow_stream::config::{DrainOrder, FlatMapConfig};
//!
//! const FAIR: FlatMapConfig = FlatMapConfig::new()
//!     .with_max_concurrency(4)
//!     .with_drain_order(DrainOrder::RoundRobin);
//!
//! assert!(FAIR.validate().is_ok());
//! assert_eq!(FAIR.prefetch(), 128);
//! ```

use backflow_error::{FlowError, Result};

/// Default buffer capacity hint for segments and inner sequences.
pub const DEFAULT_BUFFER_SIZE: usize = 128;

/// Default number of concurrently active inner sequences.
pub const DEFAULT_MAX_CONCURRENCY: usize = 32;

/// Default initial capacity of a buffered chunk.
pub const DEFAULT_CHUNK_CAPACITY: usize = 16;

/// Largest accepted chunk capacity hint. Every chunk preallocates this much.
pub const MAX_CHUNK_CAPACITY: usize = 1 << 16;

/// Configuration for window operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    buffer_size: usize,
}

impl WindowConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Capacity hint for each segment's item buffer.
    #[must_use]
    pub const fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    #[must_use]
    pub const fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// # Errors
    ///
    /// Returns [`FlowError::InvalidArgument`] if `buffer_size` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(FlowError::invalid_argument("buffer_size", "must be positive"));
        }
        Ok(())
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for buffer operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferConfig {
    capacity_hint: usize,
}

impl BufferConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            capacity_hint: DEFAULT_CHUNK_CAPACITY,
        }
    }

    /// Initial capacity of every emitted chunk.
    #[must_use]
    pub const fn capacity_hint(&self) -> usize {
        self.capacity_hint
    }

    #[must_use]
    pub const fn with_capacity_hint(mut self, capacity_hint: usize) -> Self {
        self.capacity_hint = capacity_hint;
        self
    }

    /// A zero hint is valid and allocates lazily.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidArgument`] if `capacity_hint` exceeds
    /// [`MAX_CHUNK_CAPACITY`].
    pub fn validate(&self) -> Result<()> {
        if self.capacity_hint > MAX_CHUNK_CAPACITY {
            return Err(FlowError::invalid_argument(
                "capacity_hint",
                format!("must not exceed {MAX_CHUNK_CAPACITY}"),
            ));
        }
        Ok(())
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Order in which the merge engine drains its active inner sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainOrder {
    /// Drain one inner sequence as far as demand allows before moving on.
    #[default]
    DepthFirst,
    /// Take one item from each active inner sequence per pass.
    RoundRobin,
}

/// What the merge engine does with an upstream item when every slot is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overflow {
    /// Hold the item and stop requesting from upstream until a slot frees up.
    #[default]
    Backpressure,
    /// Cancel the oldest active inner sequence and give its slot to the item.
    SwitchOldest,
}

/// Configuration for the bounded merge engine behind `flat_map`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatMapConfig {
    max_concurrency: usize,
    prefetch: usize,
    drain_order: DrainOrder,
    delay_error: bool,
    overflow: Overflow,
}

impl FlatMapConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            prefetch: DEFAULT_BUFFER_SIZE,
            drain_order: DrainOrder::DepthFirst,
            delay_error: false,
            overflow: Overflow::Backpressure,
        }
    }

    /// Depth-first merge of up to 32 synchronous inner sequences.
    #[must_use]
    pub const fn sync() -> Self {
        Self::new()
    }

    /// Like [`sync`](Self::sync) but draining inner sequences round-robin.
    #[must_use]
    pub const fn round_robin() -> Self {
        Self::new().with_drain_order(DrainOrder::RoundRobin)
    }

    /// Keeps at most `max_active` inner sequences, evicting the oldest.
    #[must_use]
    pub const fn switching(max_active: usize) -> Self {
        Self::new()
            .with_max_concurrency(max_active)
            .with_overflow(Overflow::SwitchOldest)
    }

    /// Defers every error until all sequences have finished.
    #[must_use]
    pub const fn delay_errors() -> Self {
        Self::new().with_delay_error(true)
    }

    #[must_use]
    pub const fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    #[must_use]
    pub const fn prefetch(&self) -> usize {
        self.prefetch
    }

    #[must_use]
    pub const fn drain_order(&self) -> DrainOrder {
        self.drain_order
    }

    #[must_use]
    pub const fn delay_error(&self) -> bool {
        self.delay_error
    }

    #[must_use]
    pub const fn overflow(&self) -> Overflow {
        self.overflow
    }

    /// Number of consumed items after which an inner sequence is asked for more.
    #[must_use]
    pub const fn replenish_threshold(&self) -> usize {
        self.prefetch - self.prefetch / 4
    }

    #[must_use]
    pub const fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    #[must_use]
    pub const fn with_prefetch(mut self, prefetch: usize) -> Self {
        self.prefetch = prefetch;
        self
    }

    #[must_use]
    pub const fn with_drain_order(mut self, drain_order: DrainOrder) -> Self {
        self.drain_order = drain_order;
        self
    }

    #[must_use]
    pub const fn with_delay_error(mut self, delay_error: bool) -> Self {
        self.delay_error = delay_error;
        self
    }

    #[must_use]
    pub const fn with_overflow(mut self, overflow: Overflow) -> Self {
        self.overflow = overflow;
        self
    }

    /// # Errors
    ///
    /// Returns [`FlowError::InvalidArgument`] if `max_concurrency` or
    /// `prefetch` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(FlowError::invalid_argument(
                "max_concurrency",
                "must be positive",
            ));
        }
        if self.prefetch == 0 {
            return Err(FlowError::invalid_argument("prefetch", "must be positive"));
        }
        Ok(())
    }
}

impl Default for FlatMapConfig {
    fn default() -> Self {
        Self::new()
    }
}
