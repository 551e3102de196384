// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// SPDX-License-Identifier: MIT OR Apache-2.0

#[cfg(all(feature = "runtime-tokio", not(target_arch = "wasm32")))]
pub use tokio_impl::tokio_implementation::TokioScheduler;

#[cfg(all(feature = "runtime-tokio", not(target_arch = "wasm32")))]
mod tokio_impl;
