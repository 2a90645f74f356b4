#![forbid(unsafe_code)]

//! Minimal observable state for component-based UIs.
//!
//! A [`StateBox`] holds one value and notifies its subscribers synchronously
//! on every accepted mutation. [`Derived`] projects a box read-only, and
//! [`ComponentScope`] binds boxes to a renderer through position-keyed hooks.
//!
//! This crate re-exports the public API of `statebox-core` and
//! `statebox-bind`; most users only need the [`prelude`].
//!
//! ```
//! use statebox::prelude::*;
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Counter {
//!     count: i32,
//! }
//!
//! let counter = StateBox::new(Counter { count: 0 });
//! let doubled = counter.derive(|c| c.count * 2);
//!
//! counter.set(|c| Counter { count: c.count + 1 });
//! counter.update(|c| c.count += 1);
//! assert_eq!(counter.get(), Counter { count: 2 });
//! assert_eq!(doubled.get(), 4);
//!
//! counter.reset().unwrap();
//! assert_eq!(doubled.get(), 0);
//! ```
//!
//! # Feature Flags
//!
//! | Feature     | Effect |
//! |-------------|--------|
//! | `json`      | `Merge` / `Fields` for `serde_json::Value` state |
//! | `deep-copy` | `StateBox::deep` with a serialization round-trip copy policy |

pub use statebox_bind::{
    BindError, ComponentScope, FieldBinding, FormBinding, RenderCx, RenderHost, ScopeId,
};
#[cfg(feature = "deep-copy")]
pub use statebox_core::{Deep, deep_copy};
pub use statebox_core::{
    BoxConfig, BoxError, BoxId, CopyPolicy, Derived, Fields, ListenerId, Merge, Readable,
    Shallow, StateBox, Subscription, SyncBox, SyncSubscription, derive,
};

/// Everything needed to create, derive, and bind boxes.
pub mod prelude {
    pub use crate::{
        BindError, BoxConfig, BoxError, ComponentScope, Derived, FormBinding, Readable, StateBox,
        Subscription, SyncBox, derive,
    };
}
