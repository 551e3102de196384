// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Boundary handling shared by the window and buffer operators.

use backflow_core::Result;
use std::sync::Arc;

/// Where the item that triggers a boundary ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryMode {
    /// The triggering item starts the next segment.
    Before,
    /// The triggering item is the last item of the closing segment.
    After,
    /// The triggering item belongs to neither segment and is dropped.
    Split,
}

/// A fallible boundary test, shared across subscriptions.
pub type Boundary<T> = Arc<dyn Fn(&T) -> Result<bool> + Send + Sync>;

pub(crate) fn boundary<T, F>(predicate: F) -> Boundary<T>
where
    F: Fn(&T) -> Result<bool> + Send + Sync + 'static,
{
    Arc::new(predicate)
}

/// Turns a "keep going while true" predicate into a boundary test.
pub(crate) fn negated<T, F>(predicate: F) -> Boundary<T>
where
    F: Fn(&T) -> Result<bool> + Send + Sync + 'static,
{
    Arc::new(move |item: &T| predicate(item).map(|keep| !keep))
}
