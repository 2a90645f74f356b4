#![forbid(unsafe_code)]

//! Read-and-subscribe access shared by boxes and derivations.

use crate::subscription::Subscription;

/// A value that can be read on demand and observed for changes.
///
/// Implemented by [`StateBox`](crate::StateBox) and
/// [`Derived`](crate::Derived), so derivations and component hooks accept
/// either as their source.
pub trait Readable<T> {
    /// Current value (a defensive copy for boxes, a fresh projection for
    /// derivations).
    fn get(&self) -> T;

    /// Register a listener called with every notified value.
    fn subscribe(&self, listener: impl Fn(&T) + 'static) -> Subscription;
}
