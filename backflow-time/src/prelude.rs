// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

pub use crate::debounce_first::DebounceFirstExt;
pub use crate::emit_on::EmitOnExt;
pub use crate::flat_map_async::FlatMapAsyncExt;
pub use crate::spanout::SpanoutExt;
pub use backflow_core::Scheduler;

#[cfg(all(feature = "runtime-tokio", not(target_arch = "wasm32")))]
pub use crate::runtimes::TokioScheduler;
