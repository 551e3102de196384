// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use backflow_core::{Flow, ProtocolGuard, Publisher, Subscriber};
use std::marker::PhantomData;
use std::sync::Arc;

/// Operators that apply to every publisher regardless of its item type.
pub trait PublisherExt<T>: Publisher<T> + Sized + 'static {
    /// Erases the concrete publisher type.
    fn boxed(self) -> Flow<T> {
        Arc::new(self)
    }

    /// Shields subscribers from a publisher that may break the protocol.
    ///
    /// Duplicate handshakes, items beyond demand and signals after a terminal
    /// signal are dropped instead of forwarded.
    fn guarded(self) -> Guarded<Self, T> {
        Guarded {
            source: self,
            _item: PhantomData,
        }
    }
}

impl<P: Publisher<T> + 'static, T> PublisherExt<T> for P {}

/// Publisher returned by [`PublisherExt::guarded`].
pub struct Guarded<P, T> {
    source: P,
    _item: PhantomData<fn() -> T>,
}

impl<P, T> Publisher<T> for Guarded<P, T>
where
    P: Publisher<T>,
    T: Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        self.source.subscribe(ProtocolGuard::new(subscriber));
    }
}
