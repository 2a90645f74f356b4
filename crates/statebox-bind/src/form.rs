#![forbid(unsafe_code)]

//! Per-field bindings over record-shaped box state.
//!
//! A [`FormBinding`] is a composition of `get`, `merge`, and the box's own
//! notification: [`register`](FormBinding::register) reads one field from a
//! snapshot, and [`FieldBinding::on_change`] shallow-merges `{key: value}`
//! into the box, which notifies every subscriber (including the component
//! that rendered the form).
//!
//! ```
//! use std::collections::BTreeMap;
//! use statebox_bind::FormBinding;
//! use statebox_core::StateBox;
//!
//! let login = StateBox::new(BTreeMap::from([
//!     ("email".to_string(), String::new()),
//!     ("password".to_string(), String::new()),
//! ]));
//!
//! let form = FormBinding::new(&login);
//! let email = form.register("email");
//! assert_eq!(email.value(), Some(&String::new()));
//!
//! email.on_change("me@example.com".to_string()).unwrap();
//! assert_eq!(login.get()["email"], "me@example.com");
//! assert_eq!(login.get()["password"], "");
//! ```

use std::fmt;

use statebox_core::{BoxError, CopyPolicy, Fields, Shallow, StateBox};
use tracing::trace;

/// Field access for one render of a form.
pub struct FormBinding<T: Fields, C = Shallow> {
    source: StateBox<T, C>,
    snapshot: T,
}

impl<T, C> FormBinding<T, C>
where
    T: Fields + 'static,
    C: CopyPolicy<T>,
{
    /// Bind `source`, reading field values from its current value.
    #[must_use]
    pub fn new(source: &StateBox<T, C>) -> Self {
        Self {
            snapshot: source.get(),
            source: source.clone(),
        }
    }

    pub(crate) fn with_snapshot(source: &StateBox<T, C>, snapshot: T) -> Self {
        Self {
            source: source.clone(),
            snapshot,
        }
    }

    /// Value and change handler for `key`.
    #[must_use]
    pub fn register(&self, key: &str) -> FieldBinding<T, C> {
        FieldBinding {
            key: key.to_string(),
            value: self.snapshot.field(key),
            source: self.source.clone(),
        }
    }

    /// The value the fields were read from.
    #[must_use]
    pub fn snapshot(&self) -> &T {
        &self.snapshot
    }
}

impl<T: Fields, C> fmt::Debug for FormBinding<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormBinding").finish_non_exhaustive()
    }
}

/// One registered field: its value at render time plus a change handler.
pub struct FieldBinding<T: Fields, C = Shallow> {
    key: String,
    value: Option<T::Field>,
    source: StateBox<T, C>,
}

impl<T, C> FieldBinding<T, C>
where
    T: Fields + 'static,
    C: CopyPolicy<T>,
{
    /// Field key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Field value when the form was rendered; `None` if the key is absent.
    #[must_use]
    pub fn value(&self) -> Option<&T::Field> {
        self.value.as_ref()
    }

    /// Write `value` into the field and notify the box's subscribers.
    ///
    /// # Errors
    ///
    /// Propagates the merge error of the underlying box; on error the box is
    /// unchanged.
    pub fn on_change(&self, value: T::Field) -> Result<(), BoxError> {
        trace!(field = %self.key, box_id = self.source.id().raw(), "form: field changed");
        self.source.merge(T::field_patch(&self.key, value))
    }
}

impl<T: Fields, C> fmt::Debug for FieldBinding<T, C>
where
    T::Field: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldBinding")
            .field("key", &self.key)
            .field("value", &self.value)
            .finish()
    }
}
