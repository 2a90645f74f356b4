#![forbid(unsafe_code)]

//! Observable state box with defensive copies, reset, and change notification.
//!
//! # Design
//!
//! [`StateBox<T, C>`] owns one value of type `T` in shared, reference-counted
//! storage (`Rc<..>` with a `RefCell` around the value). Cloning the handle
//! shares the value and the listener list. Every accepted mutation stores the
//! new value, bumps the version, and synchronously notifies every listener in
//! registration order before the mutating call returns. There is no equality
//! short-circuit: a mutation that produces an identical value still notifies.
//!
//! Values never leave the box by reference. `get()`, the draft handed to
//! `set()`/`update()`, and the value passed to listeners are all copies made
//! by the box's [`CopyPolicy`] (`C`, [`Shallow`] by default).
//!
//! # Performance
//!
//! | Operation     | Complexity                         |
//! |---------------|------------------------------------|
//! | `get()`       | one copy of `T`                    |
//! | `set()`       | two copies of `T` + O(S) listeners |
//! | `subscribe()` | O(1) amortized                     |
//! | `with()`      | O(1), no copy                      |
//!
//! # Failure Modes
//!
//! - **Re-entrant mutation**: a listener may call `set()` on the box that is
//!   notifying it. The nested notification runs to completion first; later
//!   listeners of the outer dispatch then receive the older value. A listener
//!   that always mutates its own box recurses without bound; avoiding that is
//!   the caller's job.
//! - **Mutation inside `with()`**: panics (the value is borrowed).
//! - **Panicking listener**: unwinds to the caller of the mutating operation.
//!   The value is already committed; listeners after the panicking one are not
//!   called for that notification.
//! - **Single thread**: `StateBox` is `!Send`. Use [`SyncBox`](crate::SyncBox)
//!   to share state across threads.

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace};

use crate::config::BoxConfig;
use crate::copy::{CopyPolicy, Shallow};
use crate::derived::{Derived, derive};
use crate::error::BoxError;
use crate::listeners::ListenerList;
use crate::merge::Merge;
use crate::readable::Readable;
use crate::subscription::Subscription;

#[cfg(feature = "deep-copy")]
use crate::copy::Deep;

/// Process-unique identifier of a box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoxId(u64);

impl BoxId {
    /// Allocate a fresh id.
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BoxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Box({})", self.0)
    }
}

pub(crate) struct BoxState<T> {
    pub(crate) value: T,
    /// Construction snapshot; `None` when the box was built without reset.
    pub(crate) initial: Option<T>,
    pub(crate) version: u64,
}

struct BoxInner<T, C> {
    id: BoxId,
    state: RefCell<BoxState<T>>,
    listeners: Rc<ListenerList<T>>,
    config: BoxConfig,
    _policy: PhantomData<fn() -> C>,
}

/// A shared, observable value.
///
/// # Example
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use statebox_core::StateBox;
///
/// let counter = StateBox::new(0);
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let seen_in_listener = Rc::clone(&seen);
/// let _sub = counter.subscribe(move |n| seen_in_listener.borrow_mut().push(*n));
///
/// counter.set(|n| n + 1);
/// counter.set(|n| n * 10);
/// assert_eq!(*seen.borrow(), vec![1, 10]);
/// ```
///
/// Listeners and mutators must be callable; anything else is rejected at
/// compile time:
///
/// ```compile_fail
/// use statebox_core::StateBox;
///
/// let counter = StateBox::new(0);
/// let _sub = counter.subscribe(42);
/// ```
///
/// ```compile_fail
/// use statebox_core::StateBox;
///
/// let counter = StateBox::new(0);
/// counter.set(7);
/// ```
pub struct StateBox<T, C = Shallow> {
    inner: Rc<BoxInner<T, C>>,
}

impl<T, C> Clone for StateBox<T, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T, C> fmt::Debug for StateBox<T, C>
where
    T: fmt::Debug + 'static,
    C: CopyPolicy<T>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("StateBox");
        s.field("id", &self.inner.id)
            .field("label", &self.inner.config.label)
            .field("policy", &C::name());
        match self.inner.state.try_borrow() {
            Ok(state) => s
                .field("value", &state.value)
                .field("version", &state.version),
            Err(_) => s.field("value", &"<borrowed>"),
        };
        s.field("subscriber_count", &self.inner.listeners.len())
            .finish()
    }
}

impl<T: Clone + 'static> StateBox<T, Shallow> {
    /// Create a resettable box with the default (shallow) copy policy.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::with_config(value, BoxConfig::default())
    }

    /// Create a box with the default copy policy and custom configuration.
    #[must_use]
    pub fn with_config(value: T, config: BoxConfig) -> Self {
        Self::build(value, config)
    }
}

#[cfg(feature = "deep-copy")]
impl<T> StateBox<T, Deep>
where
    T: Clone + serde::Serialize + serde::de::DeserializeOwned + 'static,
{
    /// Create a resettable box whose copies are full JSON round trips.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::Copy`] if `value` does not survive the round trip.
    pub fn deep(value: T) -> Result<Self, BoxError> {
        Self::deep_with_config(value, BoxConfig::default())
    }

    /// Deep-copy box with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::Copy`] if `value` does not survive the round trip.
    pub fn deep_with_config(value: T, config: BoxConfig) -> Result<Self, BoxError> {
        Self::with_policy(value, config)
    }
}

impl<T: 'static, C: CopyPolicy<T>> StateBox<T, C> {
    /// Create a box with an explicit copy policy.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::Copy`] if the policy's [`CopyPolicy::check`]
    /// rejects `value`.
    pub fn with_policy(value: T, config: BoxConfig) -> Result<Self, BoxError> {
        C::check(&value)?;
        Ok(Self::build(value, config))
    }

    fn build(value: T, config: BoxConfig) -> Self {
        let initial = config.retain_initial.then(|| C::copy(&value));
        let id = BoxId::next();
        debug!(
            box_id = id.raw(),
            label = config.display_label(),
            policy = C::name(),
            resettable = initial.is_some(),
            "state box: created"
        );
        Self {
            inner: Rc::new(BoxInner {
                id,
                state: RefCell::new(BoxState {
                    value,
                    initial,
                    version: 0,
                }),
                listeners: ListenerList::new(),
                config,
                _policy: PhantomData,
            }),
        }
    }

    /// A copy of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        C::copy(&self.inner.state.borrow().value)
    }

    /// Read the current value by reference without copying.
    ///
    /// # Panics
    ///
    /// Panics if `f` mutates this box.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.state.borrow().value)
    }

    /// Functional update: `mutator` receives a copy of the current value and
    /// returns the new one, which is stored and broadcast.
    pub fn set(&self, mutator: impl FnOnce(T) -> T) {
        let next = mutator(self.get());
        self.commit(next, "set");
    }

    /// Store `value` as-is and notify.
    pub fn replace(&self, value: T) {
        self.commit(value, "replace");
    }

    /// In-place update: `updater` mutates a copy of the current value; the
    /// copy becomes the new value once `updater` returns.
    pub fn update(&self, updater: impl FnOnce(&mut T)) {
        let mut draft = self.get();
        updater(&mut draft);
        self.commit(draft, "update");
    }

    /// Shallow-merge `patch` into the current value and notify.
    ///
    /// # Errors
    ///
    /// Propagates the [`Merge`] error (e.g. [`BoxError::InvalidArgument`] for
    /// a JSON value that is not an object). On error nothing changes and no
    /// listener is called.
    pub fn merge(&self, patch: T::Patch) -> Result<(), BoxError>
    where
        T: Merge,
    {
        let mut draft = self.get();
        draft.merge(patch)?;
        self.commit(draft, "merge");
        Ok(())
    }

    /// Register `listener`; it is called with every newly accepted value.
    pub fn subscribe(&self, listener: impl Fn(&T) + 'static) -> Subscription {
        let sub = self.inner.listeners.add(Box::new(listener));
        trace!(
            box_id = self.inner.id.raw(),
            label = self.inner.config.display_label(),
            listener = %sub.id(),
            "state box: subscribe"
        );
        sub
    }

    /// Restore the construction value and notify with it. Listeners stay
    /// registered.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::ResetUnavailable`] if the box was configured
    /// without an initial snapshot.
    pub fn reset(&self) -> Result<(), BoxError> {
        let snapshot = match &self.inner.state.borrow().initial {
            Some(initial) => C::copy(initial),
            None => return Err(BoxError::ResetUnavailable),
        };
        debug!(
            box_id = self.inner.id.raw(),
            label = self.inner.config.display_label(),
            "state box: reset"
        );
        self.commit(snapshot, "reset");
        Ok(())
    }

    /// Read-only projection of this box. See [`Derived`].
    pub fn derive<U: 'static>(&self, projection: impl Fn(&T) -> U + 'static) -> Derived<U> {
        derive(self, projection)
    }

    /// Number of accepted mutations since construction.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.state.borrow().version
    }

    /// Number of active listeners.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// Whether `reset()` is available.
    #[must_use]
    pub fn can_reset(&self) -> bool {
        self.inner.state.borrow().initial.is_some()
    }

    /// Identity of the underlying box (shared by all clones).
    #[must_use]
    pub fn id(&self) -> BoxId {
        self.inner.id
    }

    /// Configured label, if any.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.inner.config.label.as_deref()
    }

    /// Whether two handles refer to the same box.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn commit(&self, next: T, op: &'static str) {
        let version = {
            let mut state = self.inner.state.borrow_mut();
            state.value = next;
            state.version += 1;
            state.version
        };
        let snapshot = self.get();
        trace!(
            box_id = self.inner.id.raw(),
            label = self.inner.config.display_label(),
            op,
            version,
            listeners = self.inner.listeners.len(),
            "state box: commit"
        );
        self.inner.listeners.notify(&snapshot);
    }
}

impl<T: 'static, C: CopyPolicy<T>> Readable<T> for StateBox<T, C> {
    fn get(&self) -> T {
        StateBox::get(self)
    }

    fn subscribe(&self, listener: impl Fn(&T) + 'static) -> Subscription {
        StateBox::subscribe(self, listener)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
