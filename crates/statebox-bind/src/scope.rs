#![forbid(unsafe_code)]

//! Component scopes and render-time hooks.
//!
//! # Design
//!
//! A [`ComponentScope`] stands for one mounted component. Each call to
//! [`render`](ComponentScope::render) hands the render closure a
//! [`RenderCx`] whose hooks (`use_box`, `use_derived_box`, `use_derived`,
//! `use_form`) are identified by call position, as in hook-based UI
//! frameworks. On the first render a hook reads its initial local state and
//! subscribes exactly once; on later renders the same position returns the
//! local state the subscription has been keeping current, without touching
//! the subscription.
//!
//! Every notification writes the new value into the hook's local state, marks
//! the scope dirty, and calls [`RenderHost::request_render`].
//!
//! # Invariants
//!
//! 1. A hook subscribes at most once per mount.
//! 2. [`unmount`](ComponentScope::unmount) (or drop) releases every hook
//!    subscription exactly once; after that no notification reaches the host.
//! 3. Hooks must be called in the same order and number on every render;
//!    violations surface as [`BindError::HookMismatch`] or
//!    [`BindError::HookCountChanged`] instead of silently crossing state.
//!
//! # Failure Modes
//!
//! - **First render fails**: every hook mounted during that render is
//!   released, so the next render mounts from scratch. This holds for an
//!   `Err` from the render closure and for a panic unwinding out of it (for
//!   example from a derivation's projection).
//! - **Host re-renders synchronously from `request_render`**: not supported;
//!   the nested `render` runs while the outer one is still in progress and
//!   reports [`BindError::HookCountChanged`]. Hosts should queue the request.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use statebox_core::{CopyPolicy, Derived, Fields, StateBox, Subscription};
use tracing::{debug, trace};

use crate::error::BindError;
use crate::form::FormBinding;
use crate::host::RenderHost;

/// Process-unique identifier of a component scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scope({})", self.0)
    }
}

/// State owned by one hook position.
struct Slot {
    hook: &'static str,
    /// `Rc<RefCell<T>>` holding the hook's local state.
    state: Rc<dyn Any>,
    /// Keeps a derivation created by the hook alive for the mount.
    keep_alive: Option<Box<dyn Any>>,
    subscription: Subscription,
}

/// What a hook creates on the first render.
struct Mounted<T> {
    state: Rc<RefCell<T>>,
    subscription: Subscription,
    keep_alive: Option<Box<dyn Any>>,
}

/// Marks the scope dirty and forwards a re-render request to the host.
#[derive(Clone)]
struct Trigger {
    scope: ScopeId,
    dirty: Rc<Cell<bool>>,
    host: Rc<dyn RenderHost>,
}

impl Trigger {
    fn fire(&self) {
        trace!(scope = %self.scope, "component: render requested");
        self.dirty.set(true);
        self.host.request_render();
    }
}

/// One mounted component and the hook state it owns.
///
/// # Example
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use statebox_bind::ComponentScope;
/// use statebox_core::StateBox;
///
/// let counter = StateBox::new(0);
/// let requests = Rc::new(Cell::new(0));
/// let requests_in_host = Rc::clone(&requests);
/// let scope = ComponentScope::new(move || requests_in_host.set(requests_in_host.get() + 1));
///
/// let shown = scope.render(|cx| cx.use_box(&counter)).unwrap();
/// assert_eq!(shown, 0);
///
/// counter.set(|n| n + 1);
/// assert_eq!(requests.get(), 1);
/// assert_eq!(scope.render(|cx| cx.use_box(&counter)).unwrap(), 1);
///
/// scope.unmount();
/// assert_eq!(counter.subscriber_count(), 0);
/// ```
pub struct ComponentScope {
    id: ScopeId,
    host: Rc<dyn RenderHost>,
    slots: RefCell<Vec<Slot>>,
    dirty: Rc<Cell<bool>>,
    mounted: Cell<bool>,
    rendered: Cell<bool>,
}

impl ComponentScope {
    /// Mount a component that asks `host` for re-renders.
    pub fn new(host: impl RenderHost + 'static) -> Self {
        let id = ScopeId::next();
        debug!(scope = %id, "component: mounted");
        Self {
            id,
            host: Rc::new(host),
            slots: RefCell::new(Vec::new()),
            dirty: Rc::new(Cell::new(false)),
            mounted: Cell::new(true),
            rendered: Cell::new(false),
        }
    }

    /// Run one render pass.
    ///
    /// Clears the dirty flag before calling `f`.
    ///
    /// # Errors
    ///
    /// - [`BindError::Unmounted`] after [`unmount`](Self::unmount).
    /// - [`BindError::HookMismatch`] / [`BindError::HookCountChanged`] if the
    ///   hook sequence differs from the first render.
    /// - Any error returned by `f`.
    pub fn render<R>(
        &self,
        f: impl FnOnce(&mut RenderCx<'_>) -> Result<R, BindError>,
    ) -> Result<R, BindError> {
        if !self.mounted.get() {
            return Err(BindError::Unmounted);
        }
        let first = !self.rendered.get();
        self.dirty.set(false);

        let mut guard = FirstRenderGuard {
            scope: self,
            armed: first,
        };
        let mut cx = RenderCx {
            scope: self,
            cursor: 0,
            first,
        };
        let result = f(&mut cx);
        let called = cx.cursor;
        guard.armed = false;

        let result = result.and_then(|out| {
            let expected = self.slots.borrow().len();
            if called == expected {
                Ok(out)
            } else {
                Err(BindError::HookCountChanged {
                    expected,
                    found: called,
                })
            }
        });

        if first {
            match &result {
                Ok(_) => {
                    self.rendered.set(true);
                    debug!(scope = %self.id, hooks = called, "component: first render");
                }
                Err(err) => {
                    debug!(scope = %self.id, error = %err, "component: first render failed");
                    self.release_slots();
                }
            }
        }
        result
    }

    /// Release every hook subscription. Idempotent; also runs on drop.
    pub fn unmount(&self) {
        if !self.mounted.replace(false) {
            return;
        }
        let released = self.release_slots();
        debug!(scope = %self.id, released, "component: unmounted");
    }

    fn release_slots(&self) -> usize {
        let slots = std::mem::take(&mut *self.slots.borrow_mut());
        let count = slots.len();
        for slot in slots {
            trace!(
                scope = %self.id,
                hook = slot.hook,
                listener = %slot.subscription.id(),
                "component: release"
            );
            slot.subscription.unsubscribe();
            drop(slot.keep_alive);
        }
        count
    }

    /// Whether the scope still holds its subscriptions.
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.mounted.get()
    }

    /// Whether a notification arrived since the last render started.
    #[must_use]
    pub fn needs_render(&self) -> bool {
        self.dirty.get()
    }

    /// Number of hooks mounted by the first render.
    #[must_use]
    pub fn hook_count(&self) -> usize {
        self.slots.borrow().len()
    }

    /// Scope id.
    #[must_use]
    pub fn id(&self) -> ScopeId {
        self.id
    }

    fn trigger(&self) -> Trigger {
        Trigger {
            scope: self.id,
            dirty: Rc::clone(&self.dirty),
            host: Rc::clone(&self.host),
        }
    }
}

impl Drop for ComponentScope {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl fmt::Debug for ComponentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentScope")
            .field("id", &self.id)
            .field("mounted", &self.mounted.get())
            .field("dirty", &self.dirty.get())
            .field("hooks", &self.slots.borrow().len())
            .finish()
    }
}

/// Releases the hooks of a first render that unwinds out of the render
/// closure.
struct FirstRenderGuard<'a> {
    scope: &'a ComponentScope,
    armed: bool,
}

impl Drop for FirstRenderGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let released = self.scope.release_slots();
            debug!(scope = %self.scope.id, released, "component: first render panicked");
        }
    }
}

/// Hook context for one render pass.
pub struct RenderCx<'a> {
    scope: &'a ComponentScope,
    cursor: usize,
    first: bool,
}

impl RenderCx<'_> {
    /// Current value of `source`, kept in component-local state.
    ///
    /// # Errors
    ///
    /// [`BindError::HookMismatch`] if this position held a different hook on
    /// the first render.
    pub fn use_box<T, C>(&mut self, source: &StateBox<T, C>) -> Result<T, BindError>
    where
        T: Clone + 'static,
        C: CopyPolicy<T>,
    {
        self.hook("use_box", |trigger| mount_box(source, trigger))
    }

    /// `projection(source.get())`, updated from a derivation of `source`.
    ///
    /// The projection of the first render is kept for the whole mount; the
    /// argument is ignored on later renders.
    ///
    /// # Errors
    ///
    /// [`BindError::HookMismatch`] if this position held a different hook on
    /// the first render.
    pub fn use_derived_box<S, T, C>(
        &mut self,
        source: &StateBox<S, C>,
        projection: impl Fn(&S) -> T + 'static,
    ) -> Result<T, BindError>
    where
        S: 'static,
        T: Clone + 'static,
        C: CopyPolicy<S>,
    {
        self.hook("use_derived_box", |trigger| {
            let derived = source.derive(projection);
            let mut mounted = mount_derived(&derived, trigger);
            mounted.keep_alive = Some(Box::new(derived));
            mounted
        })
    }

    /// Current value of an existing derivation, kept in local state.
    ///
    /// # Errors
    ///
    /// [`BindError::HookMismatch`] if this position held a different hook on
    /// the first render.
    pub fn use_derived<T>(&mut self, derived: &Derived<T>) -> Result<T, BindError>
    where
        T: Clone + 'static,
    {
        self.hook("use_derived", |trigger| {
            let mut mounted = mount_derived(derived, trigger);
            mounted.keep_alive = Some(Box::new(derived.clone()));
            mounted
        })
    }

    /// Form binding over `source`; field values come from local state.
    ///
    /// # Errors
    ///
    /// [`BindError::HookMismatch`] if this position held a different hook on
    /// the first render.
    pub fn use_form<T, C>(
        &mut self,
        source: &StateBox<T, C>,
    ) -> Result<FormBinding<T, C>, BindError>
    where
        T: Fields + Clone + 'static,
        C: CopyPolicy<T>,
    {
        let snapshot = self.hook("use_form", |trigger| mount_box(source, trigger))?;
        Ok(FormBinding::with_snapshot(source, snapshot))
    }

    /// Claim the next hook position.
    ///
    /// `mount` runs on the first render only; afterwards the local state it
    /// created is returned.
    fn hook<T, M>(&mut self, hook: &'static str, mount: M) -> Result<T, BindError>
    where
        T: Clone + 'static,
        M: FnOnce(Trigger) -> Mounted<T>,
    {
        let index = self.cursor;
        self.cursor += 1;
        let scope = self.scope;

        if self.first {
            let mounted = mount(scope.trigger());
            let value = mounted.state.borrow().clone();
            trace!(
                scope = %scope.id,
                hook,
                index,
                listener = %mounted.subscription.id(),
                "component: hook mounted"
            );
            scope.slots.borrow_mut().push(Slot {
                hook,
                state: mounted.state,
                keep_alive: mounted.keep_alive,
                subscription: mounted.subscription,
            });
            return Ok(value);
        }

        let slots = scope.slots.borrow();
        let Some(slot) = slots.get(index) else {
            return Err(BindError::HookCountChanged {
                expected: slots.len(),
                found: index + 1,
            });
        };
        if slot.hook != hook {
            return Err(BindError::HookMismatch { index });
        }
        let state = Rc::clone(&slot.state)
            .downcast::<RefCell<T>>()
            .map_err(|_| BindError::HookMismatch { index })?;
        let value = state.borrow().clone();
        Ok(value)
    }
}

impl fmt::Debug for RenderCx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderCx")
            .field("scope", &self.scope.id)
            .field("cursor", &self.cursor)
            .field("first", &self.first)
            .finish()
    }
}

fn mount_box<T, C>(source: &StateBox<T, C>, trigger: Trigger) -> Mounted<T>
where
    T: Clone + 'static,
    C: CopyPolicy<T>,
{
    let state = Rc::new(RefCell::new(source.get()));
    let local = Rc::clone(&state);
    let subscription = source.subscribe(move |value: &T| {
        *local.borrow_mut() = value.clone();
        trigger.fire();
    });
    Mounted {
        state,
        subscription,
        keep_alive: None,
    }
}

fn mount_derived<T: Clone + 'static>(derived: &Derived<T>, trigger: Trigger) -> Mounted<T> {
    let state = Rc::new(RefCell::new(derived.get()));
    let local = Rc::clone(&state);
    let subscription = derived.subscribe(move |value: &T| {
        *local.borrow_mut() = value.clone();
        trigger.fire();
    });
    Mounted {
        state,
        subscription,
        keep_alive: None,
    }
}
