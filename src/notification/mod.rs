//! User-visible notifications for terminal fetch failures.
//!
//! Automatic retries are not surfaced here; a notification is emitted only
//! once a retried operation has given up, carrying the localized message and
//! the action the view should offer.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::error::ErrorKind;

/// Action a view offers alongside a notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationAction {
    /// Let the user run the failed operation again.
    Retry,
    /// Send the user to sign in again.
    SignIn,
}

/// A notification about a failed operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    /// An operation failed and may be retried manually.
    Failed {
        /// Classified kind of the failure.
        kind: ErrorKind,
        /// Localized message.
        message: String,
    },

    /// An operation was refused for lack of permission.
    SignInRequired {
        /// Localized message.
        message: String,
    },
}

impl Notification {
    /// Creates the notification matching a classified failure.
    pub fn for_failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        if kind.requires_reauthentication() {
            Self::SignInRequired { message }
        } else {
            Self::Failed { kind, message }
        }
    }

    /// Classified kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Failed { kind, .. } => *kind,
            Self::SignInRequired { .. } => ErrorKind::Permission,
        }
    }

    /// Localized message.
    pub fn message(&self) -> &str {
        match self {
            Self::Failed { message, .. } | Self::SignInRequired { message } => message,
        }
    }

    /// The action the view should offer.
    pub fn action(&self) -> NotificationAction {
        match self {
            Self::Failed { .. } => NotificationAction::Retry,
            Self::SignInRequired { .. } => NotificationAction::SignIn,
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { kind, message } => write!(f, "[{}] {}", kind, message),
            Self::SignInRequired { message } => write!(f, "[sign in] {}", message),
        }
    }
}

/// Sink for notifications. Implemented by the embedding view layer.
pub trait Notifier: Send + Sync {
    /// Shows `notification` to the user.
    fn notify(&self, notification: Notification);
}

/// Notifier that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        tracing::warn!(kind = %notification.kind(), "{}", notification.message());
    }
}

/// Notifier that keeps notifications in memory until drained.
#[derive(Debug, Clone, Default)]
pub struct CollectingNotifier {
    received: Arc<Mutex<Vec<Notification>>>,
}

impl CollectingNotifier {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns everything collected so far.
    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.received.lock().unwrap_or_else(|p| p.into_inner()))
    }

    /// Number of notifications waiting.
    pub fn len(&self) -> usize {
        self.received.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Returns true if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, notification: Notification) {
        self.received
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(notification);
    }
}
