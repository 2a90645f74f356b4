#![forbid(unsafe_code)]

//! Error type shared by box, derivation, and copy operations.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Non-callable listener/mutator | Rejected by the type system | Does not compile |
//! | Merge into non-object | `merge()` on a scalar JSON value | `InvalidArgument`, no effect |
//! | Reset without snapshot | Box built with `without_reset()` | `ResetUnavailable`, no effect |
//! | Deep copy round trip fails | Value not representable as JSON | `Copy`, no effect |
//!
//! A failed operation never mutates the value, never bumps the version, and
//! never notifies listeners.

use std::fmt;

/// Errors from box operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoxError {
    /// An argument had the right type but an unusable shape, e.g. a merge
    /// patch applied to a value that is not a keyed record.
    InvalidArgument(String),
    /// `reset()` was called on a box that does not retain its initial value.
    ResetUnavailable,
    /// A deep copy could not round-trip the value.
    Copy(String),
}

impl fmt::Display for BoxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::ResetUnavailable => write!(f, "box does not retain an initial value to reset to"),
            Self::Copy(msg) => write!(f, "deep copy failed: {msg}"),
        }
    }
}

impl std::error::Error for BoxError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            BoxError::InvalidArgument("patch is not an object".into()).to_string(),
            "invalid argument: patch is not an object"
        );
        assert!(BoxError::ResetUnavailable.to_string().contains("reset"));
        assert_eq!(
            BoxError::Copy("key must be a string".into()).to_string(),
            "deep copy failed: key must be a string"
        );
    }

    #[test]
    fn is_std_error() {
        let err: Box<dyn std::error::Error> = Box::new(BoxError::ResetUnavailable);
        assert!(err.source().is_none());
    }
}
