#![forbid(unsafe_code)]

//! Core: observable state boxes, derivations, and copy policies.
//!
//! # Role in statebox
//! `statebox-core` owns the state engine. Everything else (component hooks,
//! form binding) is a consumer of the contract defined here.
//!
//! # Primary responsibilities
//! - **StateBox**: one shared value plus an ordered listener list; every
//!   accepted mutation (`set`, `update`, `replace`, `merge`, `reset`) is
//!   broadcast synchronously before the call returns.
//! - **Derived**: read-only projection of a box, pull-based for reads and
//!   push-based for notifications.
//! - **CopyPolicy**: defensive copies on the way in and out (`Shallow` by
//!   default, `Deep` behind the `deep-copy` feature).
//! - **SyncBox**: the same contract behind a mutex for cross-thread state.
//!
//! # Invariants
//!
//! 1. `get()` never hands out a reference into the stored value.
//! 2. After an accepted mutation every current listener is called exactly
//!    once, in subscription order, before the mutating call returns.
//! 3. A listener removed mid-notification is skipped if its turn has not come.
//! 4. `Derived::get()` always equals `projection(source.get())`.
//!
//! # Example
//!
//! ```
//! use statebox_core::StateBox;
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Counter {
//!     count: i32,
//! }
//!
//! let counter = StateBox::new(Counter { count: 0 });
//! counter.set(|s| Counter { count: s.count + 1 });
//! counter.set(|s| Counter { count: s.count + 1 });
//! assert_eq!(counter.get(), Counter { count: 2 });
//!
//! counter.reset().unwrap();
//! assert_eq!(counter.get().count, 0);
//! ```

pub mod config;
pub mod copy;
pub mod derived;
pub mod error;
mod listeners;
pub mod merge;
pub mod readable;
pub mod state_box;
pub mod subscription;
pub mod sync_box;

pub use config::BoxConfig;
#[cfg(feature = "deep-copy")]
pub use copy::{Deep, deep_copy};
pub use copy::{CopyPolicy, Shallow};
pub use derived::{Derived, derive};
pub use error::BoxError;
pub use merge::{Fields, Merge};
pub use readable::Readable;
pub use state_box::{BoxId, StateBox};
pub use subscription::{ListenerId, Subscription};
pub use sync_box::{SyncBox, SyncSubscription};
