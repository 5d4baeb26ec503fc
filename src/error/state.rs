//! The last classified failure of a scope, as surfaced to the UI.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ErrorKind;

/// Phase of an [`ErrorState`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorPhase<'a> {
    /// No failure is being shown.
    Clear,
    /// A failure is being shown.
    Errored {
        /// Classified kind.
        kind: ErrorKind,
        /// User-facing message.
        message: &'a str,
        /// Automatic retries performed before giving up.
        retry_count: u32,
    },
}

/// Error read model of a scope.
///
/// Cleared state always has `retry_count == 0` and `kind == Unknown`;
/// `clear` replaces the whole value in one assignment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorState {
    /// Whether a failure is being shown.
    pub has_error: bool,
    /// Localized, user-facing message.
    pub message: String,
    /// Classified kind.
    pub kind: ErrorKind,
    /// When the state last changed.
    pub timestamp: DateTime<Utc>,
    /// Automatic retries performed by the current invocation.
    pub retry_count: u32,
}

impl Default for ErrorState {
    fn default() -> Self {
        Self {
            has_error: false,
            message: String::new(),
            kind: ErrorKind::Unknown,
            timestamp: Utc::now(),
            retry_count: 0,
        }
    }
}

impl ErrorState {
    /// Creates a cleared state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure. An existing failure is overwritten; `retry_count`
    /// is kept.
    pub fn set_error(&mut self, message: impl Into<String>, kind: ErrorKind) {
        self.has_error = true;
        self.message = message.into();
        self.kind = kind;
        self.timestamp = Utc::now();
    }

    /// Resets to the cleared state.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Counts one automatic retry. Does not change `has_error`.
    pub fn increment_retry(&mut self) {
        self.retry_count = self.retry_count.saturating_add(1);
    }

    /// Zeroes the retry counter.
    pub fn reset_retry(&mut self) {
        self.retry_count = 0;
    }

    /// Returns the state-machine view of this state.
    pub fn phase(&self) -> ErrorPhase<'_> {
        if self.has_error {
            ErrorPhase::Errored {
                kind: self.kind,
                message: &self.message,
                retry_count: self.retry_count,
            }
        } else {
            ErrorPhase::Clear
        }
    }
}
