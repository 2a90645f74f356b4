#![forbid(unsafe_code)]

//! Unsubscribe handles.

use std::cell::RefCell;
use std::fmt;

/// Identifier of one registration in a listener list.
///
/// Ids increase monotonically per list; the same callback registered twice
/// gets two ids and two independent handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({})", self.0)
    }
}

/// Handle returned by `subscribe()`.
///
/// [`unsubscribe()`](Self::unsubscribe) removes the listener and may be called
/// any number of times; only the first call has an effect. Dropping the handle
/// unsubscribes as well, so a consumer that goes away cannot keep receiving
/// notifications. Use [`detach()`](Self::detach) to keep the listener for the
/// whole lifetime of its source.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: ListenerId,
    release: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl Subscription {
    pub(crate) fn new(id: ListenerId, release: Box<dyn FnOnce()>) -> Self {
        Self {
            id,
            release: RefCell::new(Some(release)),
        }
    }

    /// Id of the registration this handle controls.
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Whether this handle still holds its registration.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.release.borrow().is_some()
    }

    /// Remove the listener. Safe to call during a notification in progress:
    /// the listener is skipped if its turn in that dispatch has not come yet.
    pub fn unsubscribe(&self) {
        let release = self.release.borrow_mut().take();
        if let Some(release) = release {
            release();
        }
    }

    /// Give up the handle without unsubscribing.
    pub fn detach(self) {
        self.release.borrow_mut().take();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
