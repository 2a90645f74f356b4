#![forbid(unsafe_code)]

//! Defensive copy policies.
//!
//! Every value that leaves a box (`get()`, the draft handed to `set()` and
//! `update()`, the value passed to listeners) is produced by the box's
//! [`CopyPolicy`], so callers never hold a handle into the stored value.
//!
//! # Guarantees
//!
//! - [`Shallow`] (the default) delegates to `Clone`. Owned data is duplicated,
//!   but shared handles inside the value (`Rc`, `Arc`, another box) are
//!   duplicated by reference: nested shared substructures still alias the
//!   stored value. The guarantee is one level of sharing, no more.
//! - [`Deep`] (feature `deep-copy`) round-trips the value through
//!   `serde_json`, which breaks every internal share. Types that are not
//!   `Serialize + DeserializeOwned` are rejected at compile time; values that
//!   fail the round trip at runtime (non-string map keys, non-finite floats)
//!   are rejected by [`StateBox::deep`](crate::StateBox::deep).
//!
//! The two policies are never mixed within one box: the policy is a type
//! parameter fixed at construction.

use crate::error::BoxError;

/// Strategy a box uses to produce defensive copies of its value.
pub trait CopyPolicy<T>: 'static {
    /// Produce an independent copy of `value`.
    fn copy(value: &T) -> T;

    /// Verify that `value` can be copied faithfully. Called once, when a box
    /// is constructed.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::Copy`] if the policy cannot copy `value`.
    fn check(_value: &T) -> Result<(), BoxError> {
        Ok(())
    }

    /// Short policy name used in log events and `Debug` output.
    fn name() -> &'static str;
}

/// One-level copy via `Clone`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Shallow;

impl<T: Clone> CopyPolicy<T> for Shallow {
    #[inline]
    fn copy(value: &T) -> T {
        value.clone()
    }

    fn name() -> &'static str {
        "shallow"
    }
}

/// Full copy via a JSON round trip.
#[cfg(feature = "deep-copy")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deep;

#[cfg(feature = "deep-copy")]
impl<T> CopyPolicy<T> for Deep
where
    T: Clone + serde::Serialize + serde::de::DeserializeOwned + 'static,
{
    fn copy(value: &T) -> T {
        match deep_copy(value) {
            Ok(copy) => copy,
            Err(err) => {
                tracing::warn!(error = %err, "deep copy failed, falling back to clone");
                value.clone()
            }
        }
    }

    fn check(value: &T) -> Result<(), BoxError> {
        deep_copy(value).map(|_| ())
    }

    fn name() -> &'static str {
        "deep"
    }
}

/// Deep-copy `value` through a `serde_json` round trip.
///
/// # Errors
///
/// Returns [`BoxError::Copy`] if the value cannot be represented as JSON or
/// the JSON form does not deserialize back into `T`.
#[cfg(feature = "deep-copy")]
pub fn deep_copy<T>(value: &T) -> Result<T, BoxError>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let json = serde_json::to_value(value).map_err(|e| BoxError::Copy(e.to_string()))?;
    serde_json::from_value(json).map_err(|e| BoxError::Copy(e.to_string()))
}
