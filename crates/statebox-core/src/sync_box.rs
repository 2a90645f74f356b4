#![forbid(unsafe_code)]

//! Thread-safe box for state shared across threads.
//!
//! # Design
//!
//! [`SyncBox<T>`] keeps the value and the listener list behind two
//! `parking_lot` mutexes inside an `Arc`. Mutators run while the value lock is
//! held, so a `set()` is an atomic read-modify-write with respect to other
//! threads. Listeners always run after every lock has been released, so a
//! listener may read or mutate the box that is notifying it.
//!
//! # Failure Modes
//!
//! - **Mutator touching its own box**: deadlocks (the value lock is not
//!   re-entrant). Read what you need before calling `set()`.
//! - **Concurrent writers**: each commit notifies with its own value, but the
//!   order in which two threads' notifications reach a listener is not
//!   defined; an older value may arrive last. Listeners registered with
//!   [`subscribe_versioned`](SyncBox::subscribe_versioned) receive the version
//!   each value was committed at and can drop anything older than what they
//!   already hold.
//! - **Panicking listener**: unwinds to the mutating caller; the value stays
//!   committed.

use std::convert::Infallible;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::BoxConfig;
use crate::error::BoxError;
use crate::merge::Merge;
use crate::state_box::{BoxId, BoxState};
use crate::subscription::ListenerId;

type SyncCallback<T> = Box<dyn Fn(&T, u64) + Send + Sync>;

struct SyncListener<T> {
    id: ListenerId,
    active: AtomicBool,
    callback: SyncCallback<T>,
}

struct SyncInner<T> {
    id: BoxId,
    state: Mutex<BoxState<T>>,
    listeners: Mutex<Vec<Arc<SyncListener<T>>>>,
    next_listener: AtomicU64,
    config: BoxConfig,
}

/// A shared, observable value usable from many threads.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicI64, Ordering};
/// use std::thread;
/// use statebox_core::SyncBox;
///
/// let total = SyncBox::new(0i64);
/// let last = Arc::new(AtomicI64::new(0));
/// let last_in_listener = Arc::clone(&last);
/// let _sub = total.subscribe(move |n| last_in_listener.store(*n, Ordering::SeqCst));
///
/// let handles: Vec<_> = (0..4)
///     .map(|_| {
///         let total = total.clone();
///         thread::spawn(move || {
///             for _ in 0..100 {
///                 total.set(|n| n + 1);
///             }
///         })
///     })
///     .collect();
/// for handle in handles {
///     handle.join().unwrap();
/// }
/// assert_eq!(total.get(), 400);
/// assert_eq!(total.version(), 400);
/// ```
pub struct SyncBox<T> {
    inner: Arc<SyncInner<T>>,
}

impl<T> Clone for SyncBox<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for SyncBox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("SyncBox");
        s.field("id", &self.inner.id)
            .field("label", &self.inner.config.label);
        match self.inner.state.try_lock() {
            Some(state) => s
                .field("value", &state.value)
                .field("version", &state.version),
            None => s.field("value", &"<locked>"),
        };
        s.finish_non_exhaustive()
    }
}

impl<T: Clone + Send + 'static> SyncBox<T> {
    /// Create a resettable box.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::with_config(value, BoxConfig::default())
    }

    /// Create a box with custom configuration.
    #[must_use]
    pub fn with_config(value: T, config: BoxConfig) -> Self {
        let initial = config.retain_initial.then(|| value.clone());
        let id = BoxId::next();
        debug!(
            box_id = id.raw(),
            label = config.display_label(),
            resettable = initial.is_some(),
            "sync box: created"
        );
        Self {
            inner: Arc::new(SyncInner {
                id,
                state: Mutex::new(BoxState {
                    value,
                    initial,
                    version: 0,
                }),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
                config,
            }),
        }
    }

    /// A copy of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.state.lock().value.clone()
    }

    /// Functional update under the value lock.
    ///
    /// `mutator` must not access this box.
    pub fn set(&self, mutator: impl FnOnce(T) -> T) {
        let result = self.commit_with("set", |state| {
            state.value = mutator(state.value.clone());
            Ok::<(), Infallible>(())
        });
        match result {
            Ok(()) => {}
            Err(never) => match never {},
        }
    }

    /// Store `value` as-is and notify.
    pub fn replace(&self, value: T) {
        self.set(move |_| value);
    }

    /// In-place update of a copy under the value lock.
    ///
    /// `updater` must not access this box.
    pub fn update(&self, updater: impl FnOnce(&mut T)) {
        self.set(move |mut draft| {
            updater(&mut draft);
            draft
        });
    }

    /// Shallow-merge `patch` into the current value and notify.
    ///
    /// # Errors
    ///
    /// Propagates the [`Merge`] error; nothing changes on error.
    pub fn merge(&self, patch: T::Patch) -> Result<(), BoxError>
    where
        T: Merge,
    {
        self.commit_with("merge", |state| {
            let mut draft = state.value.clone();
            draft.merge(patch)?;
            state.value = draft;
            Ok(())
        })
    }

    /// Restore the construction value and notify with it.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::ResetUnavailable`] if the box keeps no snapshot.
    pub fn reset(&self) -> Result<(), BoxError> {
        self.commit_with("reset", |state| match &state.initial {
            Some(initial) => {
                state.value = initial.clone();
                Ok(())
            }
            None => Err(BoxError::ResetUnavailable),
        })
    }

    /// Register `listener`; it is called with every newly accepted value.
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> SyncSubscription {
        self.subscribe_versioned(move |value, _version| listener(value))
    }

    /// Register `listener`; it is called with every newly accepted value and
    /// the version that value was committed at.
    ///
    /// Versions delivered to one listener are not monotonic when several
    /// threads write concurrently.
    ///
    /// ```
    /// use std::sync::Arc;
    /// use parking_lot::Mutex;
    /// use statebox_core::SyncBox;
    ///
    /// let status = SyncBox::new("idle");
    /// let latest = Arc::new(Mutex::new((0u64, "idle")));
    /// let latest_in_listener = Arc::clone(&latest);
    /// let _sub = status.subscribe_versioned(move |value, version| {
    ///     let mut latest = latest_in_listener.lock();
    ///     if version > latest.0 {
    ///         *latest = (version, *value);
    ///     }
    /// });
    ///
    /// status.replace("busy");
    /// assert_eq!(*latest.lock(), (1, "busy"));
    /// ```
    pub fn subscribe_versioned(
        &self,
        listener: impl Fn(&T, u64) + Send + Sync + 'static,
    ) -> SyncSubscription {
        let id = ListenerId::new(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        let listener = Arc::new(SyncListener {
            id,
            active: AtomicBool::new(true),
            callback: Box::new(listener),
        });
        let weak_listener = Arc::downgrade(&listener);
        self.inner.listeners.lock().push(listener);
        trace!(
            box_id = self.inner.id.raw(),
            label = self.inner.config.display_label(),
            listener = %id,
            "sync box: subscribe"
        );

        let weak_inner: Weak<SyncInner<T>> = Arc::downgrade(&self.inner);
        SyncSubscription {
            id,
            release: Mutex::new(Some(Box::new(move || {
                if let Some(listener) = weak_listener.upgrade() {
                    listener.active.store(false, Ordering::SeqCst);
                }
                if let Some(inner) = weak_inner.upgrade() {
                    inner.listeners.lock().retain(|l| l.id != id);
                }
            }))),
        }
    }

    /// Number of accepted mutations since construction.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.state.lock().version
    }

    /// Number of active listeners.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Whether `reset()` is available.
    #[must_use]
    pub fn can_reset(&self) -> bool {
        self.inner.state.lock().initial.is_some()
    }

    /// Identity of the underlying box.
    #[must_use]
    pub fn id(&self) -> BoxId {
        self.inner.id
    }

    /// Apply `apply` under the value lock; on success bump the version and
    /// notify outside every lock.
    fn commit_with<E>(
        &self,
        op: &'static str,
        apply: impl FnOnce(&mut BoxState<T>) -> Result<(), E>,
    ) -> Result<(), E> {
        let (snapshot, version) = {
            let mut state = self.inner.state.lock();
            apply(&mut *state)?;
            state.version += 1;
            (state.value.clone(), state.version)
        };
        let listeners: Vec<Arc<SyncListener<T>>> = self.inner.listeners.lock().clone();
        trace!(
            box_id = self.inner.id.raw(),
            label = self.inner.config.display_label(),
            op,
            version,
            listeners = listeners.len(),
            "sync box: commit"
        );
        for listener in &listeners {
            if listener.active.load(Ordering::SeqCst) {
                (listener.callback)(&snapshot, version);
            }
        }
        Ok(())
    }
}

/// Unsubscribe handle for a [`SyncBox`] listener.
///
/// Same contract as [`Subscription`](crate::Subscription), but `Send + Sync`.
#[must_use = "dropping a SyncSubscription unsubscribes the listener"]
pub struct SyncSubscription {
    id: ListenerId,
    release: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl SyncSubscription {
    /// Id of the registration this handle controls.
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Whether this handle still holds its registration.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.release.lock().is_some()
    }

    /// Remove the listener. Idempotent.
    pub fn unsubscribe(&self) {
        let release = self.release.lock().take();
        if let Some(release) = release {
            release();
        }
    }

    /// Give up the handle without unsubscribing.
    pub fn detach(self) {
        self.release.lock().take();
    }
}

impl Drop for SyncSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for SyncSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncSubscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::thread;

    type Log = Arc<Mutex<Vec<String>>>;

    fn named(log: &Log, name: &'static str) -> impl Fn(&i32) + Send + Sync + 'static {
        let log = Arc::clone(log);
        move |v: &i32| log.lock().push(format!("{name}{v}"))
    }

    fn recorder<T: Clone + Send + 'static>(
        source: &SyncBox<T>,
    ) -> (Arc<Mutex<Vec<T>>>, SyncSubscription) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = Arc::clone(&log);
        let sub = source.subscribe(move |v: &T| log_clone.lock().push(v.clone()));
        (log, sub)
    }

    #[test]
    fn set_and_notify() {
        let b = SyncBox::new(0);
        let (log, _sub) = recorder(&b);
        b.set(|n| n + 1);
        b.set(|n| n * 10);
        assert_eq!(*log.lock(), vec![1, 10]);
        assert_eq!(b.version(), 2);
    }

    #[test]
    fn update_replace_reset() {
        let b = SyncBox::new(vec![1]);
        b.update(|v| v.push(2));
        assert_eq!(b.get(), vec![1, 2]);
        b.replace(vec![]);
        assert!(b.get().is_empty());
        b.reset().unwrap();
        assert_eq!(b.get(), vec![1]);
        assert_eq!(b.version(), 3);
    }

    #[test]
    fn reset_unavailable() {
        let b = SyncBox::with_config(1, BoxConfig::new().without_reset());
        let (log, _sub) = recorder(&b);
        assert!(!b.can_reset());
        assert_eq!(b.reset(), Err(BoxError::ResetUnavailable));
        assert!(log.lock().is_empty());
        assert_eq!(b.version(), 0);
    }

    #[test]
    fn merge_keys() {
        let b = SyncBox::new(BTreeMap::from([("name", "Foo")]));
        b.merge(BTreeMap::from([("name", "Bar")])).unwrap();
        assert_eq!(b.get(), BTreeMap::from([("name", "Bar")]));
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let b = SyncBox::new(0);
        let (log, sub) = recorder(&b);
        let (other, _other_sub) = recorder(&b);
        b.set(|n| n + 1);
        sub.unsubscribe();
        sub.unsubscribe();
        b.set(|n| n + 1);
        assert_eq!(*log.lock(), vec![1]);
        assert_eq!(*other.lock(), vec![1, 2]);
        assert_eq!(b.subscriber_count(), 1);
    }

    #[test]
    fn listener_may_reenter() {
        let b = SyncBox::new(0);
        let writer = b.clone();
        let _clamp = b.subscribe(move |n: &i32| {
            if *n > 10 {
                writer.replace(10);
            }
        });
        b.replace(50);
        assert_eq!(b.get(), 10);
    }

    #[test]
    fn concurrent_increments_are_atomic() {
        let b = SyncBox::new(0usize);
        let notified = Arc::new(AtomicUsize::new(0));
        let notified_clone = Arc::clone(&notified);
        let _sub = b.subscribe(move |_| {
            notified_clone.fetch_add(1, Ordering::SeqCst);
        });

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let b = b.clone();
                thread::spawn(move || {
                    for _ in 0..250 {
                        b.set(|n| n + 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(b.get(), 2000);
        assert_eq!(b.version(), 2000);
        assert_eq!(notified.load(Ordering::SeqCst), 2000);
    }

    #[test]
    fn unsubscribe_later_listener_mid_dispatch() {
        let b = SyncBox::new(0);
        let log: Log = Arc::default();
        let victim: Arc<Mutex<Option<SyncSubscription>>> = Arc::default();

        let victim_in_a = Arc::clone(&victim);
        let log_a = Arc::clone(&log);
        let _a = b.subscribe(move |v: &i32| {
            log_a.lock().push(format!("a{v}"));
            if let Some(sub) = victim_in_a.lock().as_ref() {
                sub.unsubscribe();
            }
        });
        *victim.lock() = Some(b.subscribe(named(&log, "b")));
        let _c = b.subscribe(named(&log, "c"));

        b.replace(1);
        // b was removed before its turn.
        assert_eq!(*log.lock(), vec!["a1", "c1"]);
        assert_eq!(b.subscriber_count(), 2);
    }

    #[test]
    fn unsubscribe_self_mid_dispatch() {
        let b = SyncBox::new(0);
        let log: Log = Arc::default();
        let own: Arc<Mutex<Option<SyncSubscription>>> = Arc::default();

        let own_in_cb = Arc::clone(&own);
        let log_a = Arc::clone(&log);
        *own.lock() = Some(b.subscribe(move |v: &i32| {
            log_a.lock().push(format!("a{v}"));
            if let Some(sub) = own_in_cb.lock().as_ref() {
                sub.unsubscribe();
            }
        }));
        let _b = b.subscribe(named(&log, "b"));

        b.replace(1);
        b.replace(2);
        assert_eq!(*log.lock(), vec!["a1", "b1", "b2"]);
        assert!(!own.lock().as_ref().is_some_and(SyncSubscription::is_active));
    }

    #[test]
    fn same_callback_twice_is_two_entries() {
        let b = SyncBox::new(0);
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let callback: Arc<dyn Fn(&i32) + Send + Sync> = Arc::new(move |_: &i32| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        let first = b.subscribe({
            let callback = Arc::clone(&callback);
            move |v: &i32| callback(v)
        });
        let second = b.subscribe({
            let callback = Arc::clone(&callback);
            move |v: &i32| callback(v)
        });
        assert_ne!(first.id(), second.id());

        b.replace(1);
        assert_eq!(count.load(Ordering::SeqCst), 2);

        first.unsubscribe();
        b.replace(2);
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(b.subscriber_count(), 1);
        assert!(second.is_active());
    }

    #[test]
    fn versioned_listener_sees_commit_versions() {
        let b = SyncBox::new(0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let _sub = b.subscribe_versioned(move |v: &i32, version| {
            seen_clone.lock().push((version, *v));
        });
        b.set(|n| n + 5);
        b.update(|n| *n *= 2);
        b.reset().unwrap();
        assert_eq!(*seen.lock(), vec![(1, 5), (2, 10), (3, 0)]);
    }

    #[test]
    fn versioned_listener_can_discard_late_older_value() {
        let b = SyncBox::new(0);
        let latest = Arc::new(Mutex::new((0u64, 0)));
        let last_delivered = Arc::new(Mutex::new(0));
        let (entered_tx, entered_rx) = mpsc::channel::<()>();
        let (resume_tx, resume_rx) = mpsc::channel::<()>();
        let entered_tx = Mutex::new(entered_tx);
        let resume_rx = Mutex::new(resume_rx);

        let latest_clone = Arc::clone(&latest);
        let last_clone = Arc::clone(&last_delivered);
        let _sub = b.subscribe_versioned(move |v: &i32, version| {
            if *v == 1 {
                // Hold the dispatch of the first commit until the second one
                // has been delivered.
                entered_tx.lock().send(()).unwrap();
                resume_rx.lock().recv().unwrap();
            }
            *last_clone.lock() = *v;
            let mut latest = latest_clone.lock();
            if version > latest.0 {
                *latest = (version, *v);
            }
        });

        let writer = b.clone();
        let first = thread::spawn(move || writer.replace(1));
        entered_rx.recv().unwrap();
        b.replace(2);
        resume_tx.send(()).unwrap();
        first.join().unwrap();

        assert_eq!(b.get(), 2);
        assert_eq!(b.version(), 2);
        // The raw delivery order ends on the older value...
        assert_eq!(*last_delivered.lock(), 1);
        // ...but the version lets the listener keep the current one.
        assert_eq!(*latest.lock(), (2, 2));
    }

    #[test]
    fn subscription_is_send() {
        fn assert_send_sync<X: Send + Sync>() {}
        assert_send_sync::<SyncSubscription>();
        assert_send_sync::<SyncBox<Vec<u8>>>();
    }

    #[test]
    fn debug_format() {
        let b = SyncBox::with_config(5, BoxConfig::new().with_label("five"));
        let dbg = format!("{b:?}");
        assert!(dbg.contains("SyncBox"));
        assert!(dbg.contains("five"));
        assert!(dbg.contains('5'));
    }
}
