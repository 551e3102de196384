// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

#![allow(clippy::multiple_crate_versions, clippy::doc_markdown)]
//! Protocol and concurrency primitives for Backflow operators.
//!
//! This crate defines the push-based backpressure protocol every Backflow
//! operator speaks ([`Publisher`], [`Subscriber`], [`Subscription`]) and the
//! small set of lock-free building blocks operators are assembled from:
//!
//! - [`AtomicSlot`] holds one value that moves in and out by ownership.
//! - [`DrainSerializer`] collapses re-entrant and concurrent emission attempts
//!   into a single serialized loop.
//! - [`Demand`] tracks requested-but-undelivered items with saturating
//!   arithmetic (`u64::MAX` means unbounded).
//! - [`SubscriptionCell`] and [`SubscriptionArbiter`] hold upstream handles with
//!   a sticky cancelled state.
//! - [`DeferredTail`] emits a final value once downstream demand allows it.
//! - [`ProtocolGuard`] shields a consumer from a misbehaving producer.
//! - [`Scheduler`] is the injected timer capability used by timed operators.

mod logging;

pub mod atomic_slot;
pub mod cancellation_token;
pub mod deferred_tail;
pub mod demand;
pub mod drain;
pub mod protocol;
pub mod protocol_guard;
pub mod scheduler;
pub mod stream_item;
pub mod subscription_arbiter;
pub mod subscription_cell;

pub use self::atomic_slot::AtomicSlot;
pub use self::cancellation_token::CancellationToken;
pub use self::deferred_tail::DeferredTail;
pub use self::demand::{Demand, UNBOUNDED};
pub use self::drain::DrainSerializer;
pub use self::protocol::{Flow, Offer, Publisher, Subscriber, Subscription};
pub use self::protocol_guard::ProtocolGuard;
pub use self::scheduler::{ScheduledTask, Scheduler};
pub use self::stream_item::StreamItem;
pub use self::subscription_arbiter::SubscriptionArbiter;
pub use self::subscription_cell::SubscriptionCell;
pub use backflow_error::{FlowError, IntoFlowError, Result, ResultExt};
