// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Demand accounting for backpressure.
//!
//! Outstanding demand is a single `u64` where [`UNBOUNDED`] (`u64::MAX`) means
//! the consumer accepts any number of items. Additions saturate into
//! `UNBOUNDED` and once unbounded the counter never decreases.

use crate::logging::warn;
use std::sync::atomic::{AtomicU64, Ordering};

/// Demand value meaning "no limit".
pub const UNBOUNDED: u64 = u64::MAX;

/// Adds two demand amounts, saturating into [`UNBOUNDED`].
#[must_use]
pub const fn add_cap(current: u64, n: u64) -> u64 {
    current.saturating_add(n)
}

/// Checks a `request(n)` argument.
///
/// Returns `false` for zero, which callers must ignore.
#[must_use]
pub fn validate(n: u64) -> bool {
    if n == 0 {
        warn!("request(0) ignored: demand must be positive");
        return false;
    }
    true
}

/// Atomic outstanding-demand counter.
#[derive(Debug, Default)]
pub struct Demand {
    requested: AtomicU64,
}

impl Demand {
    /// Creates a counter with no outstanding demand.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            requested: AtomicU64::new(0),
        }
    }

    /// Current outstanding demand.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.requested.load(Ordering::Acquire)
    }

    /// Returns `true` if the counter has become unbounded.
    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        self.get() == UNBOUNDED
    }

    /// Adds `n` to the outstanding demand and returns the previous value.
    pub fn add(&self, n: u64) -> u64 {
        let mut current = self.requested.load(Ordering::Acquire);
        loop {
            if current == UNBOUNDED {
                return UNBOUNDED;
            }
            let next = add_cap(current, n);
            match self.requested.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(previous) => return previous,
                Err(actual) => current = actual,
            }
        }
    }

    /// Records `n` delivered items and returns the remaining demand.
    ///
    /// Unbounded demand is left untouched. Delivering more than was requested
    /// is an operator bug; the counter is clamped at zero.
    pub fn produced(&self, n: u64) -> u64 {
        let mut current = self.requested.load(Ordering::Acquire);
        loop {
            if current == UNBOUNDED {
                return UNBOUNDED;
            }
            let next = current.checked_sub(n).unwrap_or_else(|| {
                warn!("produced {} items with only {} requested", n, current);
                0
            });
            match self.requested.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    /// Takes one unit of demand if any is outstanding.
    pub fn try_consume(&self) -> bool {
        let mut current = self.requested.load(Ordering::Acquire);
        loop {
            if current == UNBOUNDED {
                return true;
            }
            if current == 0 {
                return false;
            }
            match self.requested.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}
