// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Test utilities and fixtures for Backflow operators.
//!
//! Operator tests are synchronous by default: publishers emit on the caller's
//! thread, so a test drives demand and observes the result without an
//! executor. The types here cover both ends of an operator under test:
//!
//! - [`TestSubscriber`] records every signal and lets the test request and
//!   cancel.
//! - [`ManualPublisher`] is pushed by the test and records the demand and
//!   cancellation it receives.
//! - [`ScriptedPublisher`] replays scripted runs per subscription, for retry
//!   and resubscription tests.
//! - [`MisbehavingPublisher`] violates the protocol on purpose.
//! - [`ManualScheduler`] is a virtual clock for timer-driven operators.
//!
//! # Example
//!
//! ```rust
//! use backflow_core::Publisher;
//! use backflow_test_utils::{Script, ScriptedPublisher, TestSubscriber};
//!
//! let source = ScriptedPublisher::new(vec![Script::completing(vec![1, 2, 3])]);
//! let subscriber = TestSubscriber::<i32>::new(2);
//! source.subscribe(subscriber.clone());
//!
//! subscriber.assert_values(&[1, 2]);
//! subscriber.request(1);
//! subscriber.assert_values(&[1, 2, 3]);
//! subscriber.assert_complete();
//! ```

#![allow(clippy::multiple_crate_versions, clippy::doc_markdown)]
pub mod manual_publisher;
pub mod manual_scheduler;
pub mod misbehaving_publisher;
pub mod scripted_publisher;
pub mod test_subscriber;

pub use manual_publisher::ManualPublisher;
pub use manual_scheduler::{ManualScheduler, VirtualInstant};
pub use misbehaving_publisher::MisbehavingPublisher;
pub use scripted_publisher::{Ending, Script, ScriptedPublisher};
pub use test_subscriber::TestSubscriber;
