#![forbid(unsafe_code)]

//! Errors raised while rendering a bound component.

use std::fmt;

use statebox_core::BoxError;

/// Errors from [`ComponentScope::render`](crate::ComponentScope::render).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    /// The scope was unmounted; its hooks hold no subscriptions anymore.
    Unmounted,
    /// The hook at `index` is not the hook that occupied that position on the
    /// first render.
    HookMismatch { index: usize },
    /// A later render called a different number of hooks than the first.
    HookCountChanged { expected: usize, found: usize },
    /// A box operation inside the render closure failed.
    Box(BoxError),
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unmounted => write!(f, "component scope is unmounted"),
            Self::HookMismatch { index } => {
                write!(f, "hook #{index} differs from the first render")
            }
            Self::HookCountChanged { expected, found } => {
                write!(f, "render called {found} hooks, first render called {expected}")
            }
            Self::Box(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for BindError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Box(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BoxError> for BindError {
    fn from(err: BoxError) -> Self {
        Self::Box(err)
    }
}
