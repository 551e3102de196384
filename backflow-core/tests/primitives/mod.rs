// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod deferred_tail_tests;
pub mod protocol_guard_tests;
pub mod stream_item_tests;
