#![forbid(unsafe_code)]

//! Construction-time options for boxes.

/// Configuration for a [`StateBox`](crate::StateBox) or
/// [`SyncBox`](crate::SyncBox).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxConfig {
    /// Name used in log events and `Debug` output.
    pub label: Option<String>,
    /// Keep a snapshot of the construction value so `reset()` works.
    pub retain_initial: bool,
}

impl Default for BoxConfig {
    fn default() -> Self {
        Self {
            label: None,
            retain_initial: true,
        }
    }
}

impl BoxConfig {
    /// Create the default configuration (unlabelled, resettable).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Drop the initial snapshot; `reset()` then fails with
    /// [`BoxError::ResetUnavailable`](crate::BoxError::ResetUnavailable).
    #[must_use]
    pub fn without_reset(mut self) -> Self {
        self.retain_initial = false;
        self
    }

    /// Label for log events, `"<unlabelled>"` when unset.
    #[must_use]
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or("<unlabelled>")
    }
}
