// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Upstream handle slot with a sticky cancelled state.

use crate::logging::{debug, warn};
use crate::protocol::Subscription;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

const EMPTY: u8 = 0;
const SETTING: u8 = 1;
const ACTIVE: u8 = 2;
const CANCELLED: u8 = 3;

/// Holds the upstream [`Subscription`] of an operator.
///
/// The cell is assigned once. Once cancelled it stays cancelled: a handle set
/// afterwards is cancelled on arrival, and `request` becomes a no-op. All
/// transitions are single atomic operations on the state word.
pub struct SubscriptionCell {
    state: AtomicU8,
    handle: OnceLock<Arc<dyn Subscription>>,
}

impl SubscriptionCell {
    /// Creates an empty cell.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            handle: OnceLock::new(),
        }
    }

    /// Stores the first handle.
    ///
    /// Returns `false` (and cancels `subscription`) if the cell was already
    /// set or cancelled.
    pub fn set_once(&self, subscription: Arc<dyn Subscription>) -> bool {
        match self
            .state
            .compare_exchange(EMPTY, SETTING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                // Only the thread that won EMPTY -> SETTING initializes the lock.
                let _ = self.handle.set(subscription);
                if self
                    .state
                    .compare_exchange(SETTING, ACTIVE, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    debug!("cancelled while the subscription was being stored");
                    self.cancel_handle();
                }
                true
            }
            Err(CANCELLED) => {
                debug!("subscription arrived after cancel");
                subscription.cancel();
                false
            }
            Err(_) => {
                warn!("on_subscribe called twice, cancelling the extra subscription");
                subscription.cancel();
                false
            }
        }
    }

    /// Returns the current handle, if any.
    #[must_use]
    pub fn get(&self) -> Option<Arc<dyn Subscription>> {
        if self.state.load(Ordering::Acquire) != ACTIVE {
            return None;
        }
        self.handle.get().cloned()
    }

    /// Forwards `request(n)` to the current handle.
    pub fn request(&self, n: u64) {
        if self.state.load(Ordering::Acquire) != ACTIVE {
            return;
        }
        if let Some(subscription) = self.handle.get() {
            subscription.request(n);
        }
    }

    /// Cancels the current handle and marks the cell cancelled.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn cancel(&self) -> bool {
        match self.state.swap(CANCELLED, Ordering::AcqRel) {
            ACTIVE => {
                self.cancel_handle();
                true
            }
            // A setter in progress sees the cancel and cancels its own handle.
            EMPTY | SETTING => true,
            _ => false,
        }
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }

    fn cancel_handle(&self) {
        if let Some(subscription) = self.handle.get() {
            subscription.cancel();
        }
    }
}

impl Default for SubscriptionCell {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SubscriptionCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state.load(Ordering::Relaxed) {
            EMPTY => "empty",
            SETTING | ACTIVE => "active",
            _ => "cancelled",
        };
        f.debug_struct("SubscriptionCell").field("state", &state).finish()
    }
}
