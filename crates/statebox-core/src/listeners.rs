#![forbid(unsafe_code)]

//! Ordered listener list shared by boxes and derivations.
//!
//! # Invariants
//!
//! 1. Listeners are invoked in registration order.
//! 2. A dispatch calls each listener that was registered when the dispatch
//!    started and is still active when its turn comes, exactly once.
//! 3. Listeners registered during a dispatch are first called by the next one.
//! 4. No borrow of the list is held while a callback runs, so callbacks may
//!    subscribe, unsubscribe, or trigger a nested dispatch.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::subscription::{ListenerId, Subscription};

struct Listener<T> {
    id: ListenerId,
    active: Cell<bool>,
    callback: Box<dyn Fn(&T)>,
}

pub(crate) struct ListenerList<T> {
    next_id: Cell<u64>,
    entries: RefCell<Vec<Rc<Listener<T>>>>,
    /// Set when an unsubscribe could not remove its entry immediately.
    needs_prune: Cell<bool>,
}

impl<T: 'static> ListenerList<T> {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self {
            next_id: Cell::new(0),
            entries: RefCell::new(Vec::new()),
            needs_prune: Cell::new(false),
        })
    }

    /// Append a listener and return its unsubscribe handle.
    pub(crate) fn add(self: &Rc<Self>, callback: Box<dyn Fn(&T)>) -> Subscription {
        let id = ListenerId::new(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);

        let listener = Rc::new(Listener {
            id,
            active: Cell::new(true),
            callback,
        });
        let weak_listener = Rc::downgrade(&listener);
        {
            let mut entries = self.entries.borrow_mut();
            if self.needs_prune.replace(false) {
                entries.retain(|l| l.active.get());
            }
            entries.push(listener);
        }

        let weak_list: Weak<Self> = Rc::downgrade(self);
        Subscription::new(
            id,
            Box::new(move || {
                if let Some(listener) = weak_listener.upgrade() {
                    listener.active.set(false);
                }
                if let Some(list) = weak_list.upgrade() {
                    list.remove(id);
                }
            }),
        )
    }

    fn remove(&self, id: ListenerId) {
        trace!(listener = %id, "listener removed");
        match self.entries.try_borrow_mut() {
            Ok(mut entries) => entries.retain(|l| l.id != id),
            // The entry is already inactive; drop it after the current access.
            Err(_) => self.needs_prune.set(true),
        }
    }

    /// Number of active registrations.
    pub(crate) fn len(&self) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|l| l.active.get())
            .count()
    }

    /// Invoke every active listener with `value`.
    pub(crate) fn notify(&self, value: &T) {
        let snapshot: Vec<Rc<Listener<T>>> = self.entries.borrow().clone();
        for listener in &snapshot {
            if listener.active.get() {
                (listener.callback)(value);
            }
        }
        if self.needs_prune.get() {
            if let Ok(mut entries) = self.entries.try_borrow_mut() {
                entries.retain(|l| l.active.get());
                self.needs_prune.set(false);
            }
        }
    }
}
