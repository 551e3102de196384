// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! A lock-free cell holding at most one value.
//!
//! Operators keep their per-link state (the open segment, a look-ahead item,
//! a pending chunk, a stored error) in an [`AtomicSlot`]. Values move in and
//! out by ownership, so no reader ever holds a guard across a call into
//! another operator.
//!
//! ```
//! use backflow_core::AtomicSlot;
//!
//! let slot = AtomicSlot::new();
//! assert_eq!(slot.put(1), None);
//! assert_eq!(slot.put(2), Some(1));
//! assert_eq!(slot.take(), Some(2));
//! assert!(slot.is_empty());
//! ```

use concurrent_queue::ConcurrentQueue;
use std::fmt;

/// Single-value cell backed by a one-element lock-free queue.
pub struct AtomicSlot<T> {
    cell: ConcurrentQueue<T>,
}

impl<T> AtomicSlot<T> {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cell: ConcurrentQueue::bounded(1),
        }
    }

    /// Creates a slot already holding `value`.
    #[must_use]
    pub fn with(value: T) -> Self {
        let slot = Self::new();
        slot.put(value);
        slot
    }

    /// Stores `value`, returning the value it displaced.
    pub fn put(&self, value: T) -> Option<T> {
        // The queue is never closed, so the only outcome is a displacement.
        self.cell.force_push(value).ok().flatten()
    }

    /// Removes and returns the stored value.
    pub fn take(&self) -> Option<T> {
        self.cell.pop().ok()
    }

    /// Drops the stored value, if any.
    pub fn clear(&self) {
        let _ = self.cell.pop();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cell.is_empty()
    }
}

impl<T> Default for AtomicSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for AtomicSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicSlot")
            .field("occupied", &!self.cell.is_empty())
            .finish()
    }
}
