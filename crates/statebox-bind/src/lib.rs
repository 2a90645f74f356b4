#![forbid(unsafe_code)]

//! Component bindings for statebox.
//!
//! # Role in statebox
//! `statebox-bind` connects boxes to a component-based renderer. It owns no
//! state engine of its own: every hook is `get` at mount, one `subscribe` for
//! the lifetime of the mount, and one release at unmount.
//!
//! # Primary responsibilities
//! - **ComponentScope**: one mounted component; releases its subscriptions
//!   exactly once on unmount or drop.
//! - **RenderCx**: position-keyed hooks (`use_box`, `use_derived_box`,
//!   `use_derived`, `use_form`).
//! - **FormBinding**: `register(key)` pairs a field value with an
//!   `on_change` that shallow-merges the new value into the box.
//! - **RenderHost**: the renderer's side of the contract, a single
//!   `request_render` callback.

pub mod error;
pub mod form;
pub mod host;
pub mod scope;

pub use error::BindError;
pub use form::{FieldBinding, FormBinding};
pub use host::RenderHost;
pub use scope::{ComponentScope, RenderCx, ScopeId};
