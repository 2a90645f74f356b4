#![forbid(unsafe_code)]

//! Read-only projections of a box.
//!
//! # Design
//!
//! [`Derived<T>`] pairs a source ([`Readable`]) with a projection function
//! fixed at construction. Reads are pull-based: every [`get()`](Derived::get)
//! evaluates `projection(source.get())`, so a read never lags the source.
//! Notifications are push-based: the derivation subscribes to its source
//! eagerly, at construction, and every source notification is projected once
//! and forwarded to the derivation's own listeners. Nothing is cached or
//! deduplicated.
//!
//! A derivation has no `set`, `update`, or `reset`; derived state cannot
//! drift from its source.
//!
//! # Invariants
//!
//! 1. `get()` equals `projection(source.get())` at the moment of the call.
//! 2. Each source notification produces exactly one derived notification
//!    while the derivation is live.
//! 3. After [`dispose()`](Derived::dispose), or once the last handle is
//!    dropped, the source no longer holds the forwarding listener.
//!
//! # Failure Modes
//!
//! - **Projection panics in `get()`**: unwinds to the `get()` caller.
//! - **Projection panics during forwarding**: unwinds through the source's
//!   notification to the caller of the source mutation (fail-fast).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::listeners::ListenerList;
use crate::readable::Readable;
use crate::subscription::Subscription;

struct DerivedInner<T> {
    /// Pulls the current source value and projects it.
    compute: Box<dyn Fn() -> T>,
    listeners: Rc<ListenerList<T>>,
    /// Forwarding listener on the source; `None` once disposed.
    forward: RefCell<Option<Subscription>>,
}

/// A read-only value projected from another box or derivation.
///
/// Cloning a `Derived` creates a new handle to the **same** derivation.
///
/// # Example
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use statebox_core::StateBox;
///
/// #[derive(Clone)]
/// struct Counter {
///     count: i32,
/// }
///
/// let source = StateBox::new(Counter { count: 0 });
/// let count = source.derive(|c| c.count);
///
/// let last = Rc::new(Cell::new(-1));
/// let last_in_listener = Rc::clone(&last);
/// let _sub = count.subscribe(move |n| last_in_listener.set(*n));
///
/// source.replace(Counter { count: 5 });
/// assert_eq!(last.get(), 5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Derived<T> {
    inner: Rc<DerivedInner<T>>,
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> fmt::Debug for Derived<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Derived")
            .field("disposed", &self.is_disposed())
            .field("subscriber_count", &self.inner.listeners.len())
            .finish()
    }
}

/// Create a derivation of `source` through `projection`.
///
/// Subscribes to `source` immediately, even before the derivation has any
/// listener of its own.
pub fn derive<S, T, R>(source: &R, projection: impl Fn(&S) -> T + 'static) -> Derived<T>
where
    R: Readable<S> + Clone + 'static,
    S: 'static,
    T: 'static,
{
    let projection: Rc<dyn Fn(&S) -> T> = Rc::new(projection);

    let pull_source = source.clone();
    let pull_projection = Rc::clone(&projection);
    let inner = Rc::new(DerivedInner {
        compute: Box::new(move || pull_projection(&pull_source.get())),
        listeners: ListenerList::new(),
        forward: RefCell::new(None),
    });

    // Weak: the source must not keep the derivation alive.
    let weak_inner = Rc::downgrade(&inner);
    let forward = source.subscribe(move |value: &S| {
        if let Some(inner) = weak_inner.upgrade() {
            let projected = projection(value);
            inner.listeners.notify(&projected);
        }
    });
    *inner.forward.borrow_mut() = Some(forward);

    Derived { inner }
}

impl<T: 'static> Derived<T> {
    /// Project the source's current value.
    #[must_use]
    pub fn get(&self) -> T {
        (self.inner.compute)()
    }

    /// Register a listener for derived values.
    pub fn subscribe(&self, listener: impl Fn(&T) + 'static) -> Subscription {
        self.inner.listeners.add(Box::new(listener))
    }

    /// Number of active listeners on this derivation.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// Derivation of this derivation.
    pub fn map<U: 'static>(&self, projection: impl Fn(&T) -> U + 'static) -> Derived<U> {
        derive(self, projection)
    }

    /// Release the forwarding listener on the source. Idempotent.
    ///
    /// `get()` keeps working afterwards; listeners are no longer notified.
    pub fn dispose(&self) {
        let forward = self.inner.forward.borrow_mut().take();
        if let Some(forward) = forward {
            debug!(listener = %forward.id(), "derived: disposed");
            forward.unsubscribe();
        }
    }

    /// Whether [`dispose()`](Self::dispose) has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.forward.borrow().is_none()
    }
}

impl<T: 'static> Readable<T> for Derived<T> {
    fn get(&self) -> T {
        Derived::get(self)
    }

    fn subscribe(&self, listener: impl Fn(&T) + 'static) -> Subscription {
        Derived::subscribe(self, listener)
    }
}
