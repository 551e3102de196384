// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// SPDX-License-Identifier: MIT OR Apache-2.0

#[cfg(all(feature = "runtime-tokio", not(target_arch = "wasm32")))]
pub mod tokio_implementation {
    use backflow_core::scheduler::Task;
    use backflow_core::{CancellationToken, ScheduledTask, Scheduler};
    use std::time::Duration;
    use tokio::runtime::Handle;
    use tokio::time::{sleep, Instant};

    /// [`Scheduler`] backed by tokio timers.
    ///
    /// Every scheduled task is a spawned tokio task that sleeps, then runs the
    /// work unless its token was cancelled first. Cancelling also aborts the
    /// sleep, so abandoned timers do not linger.
    ///
    /// The scheduler remembers the runtime it was created on and can be handed
    /// to code running on other threads.
    #[derive(Clone, Debug)]
    pub struct TokioScheduler {
        handle: Handle,
    }

    impl TokioScheduler {
        /// Captures the runtime of the calling context.
        ///
        /// # Panics
        ///
        /// Panics when called outside a tokio runtime.
        #[must_use]
        pub fn new() -> Self {
            Self {
                handle: Handle::current(),
            }
        }

        /// Uses an explicit runtime handle.
        #[must_use]
        pub const fn with_handle(handle: Handle) -> Self {
            Self { handle }
        }
    }

    impl Default for TokioScheduler {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Scheduler for TokioScheduler {
        type Instant = Instant;

        fn now(&self) -> Instant {
            Instant::now()
        }

        fn schedule_once(&self, delay: Duration, task: Task) -> ScheduledTask {
            let token = CancellationToken::new();
            let watched = token.clone();
            self.handle.spawn(async move {
                tokio::select! {
                    () = sleep(delay) => {
                        if !watched.is_cancelled() {
                            task();
                        }
                    }
                    () = watched.cancelled() => {}
                }
            });
            ScheduledTask::new(token)
        }
    }
}
