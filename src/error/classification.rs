//! Failure classification for the retry layer.
//!
//! A caught failure is mapped to one [`ErrorKind`]. The kind drives both the
//! user-facing message and whether the retry layer attempts the operation
//! again: only [`ErrorKind::Network`] is retried by default, and
//! [`ErrorKind::Permission`] asks for re-authentication instead.

use std::fmt;
use std::io;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::detector::NetworkSignalDetector;
use crate::connectivity::{AlwaysOnline, Connectivity};

/// The category a failure is classified into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Transport-level failure: abort, timeout, refused connection, offline host.
    Network,
    /// Malformed or rejected request (HTTP 4xx other than 401/403).
    Data,
    /// Missing or insufficient credentials (HTTP 401/403).
    Permission,
    /// Backend failure (HTTP 5xx).
    Server,
    /// Nothing recognizable.
    #[default]
    Unknown,
}

impl ErrorKind {
    /// All kinds, in classification priority order.
    pub const ALL: [ErrorKind; 5] = [
        ErrorKind::Network,
        ErrorKind::Permission,
        ErrorKind::Data,
        ErrorKind::Server,
        ErrorKind::Unknown,
    ];

    /// Returns true if failures of this kind are retried by default.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Network)
    }

    /// Returns true if the user should be prompted to sign in again.
    pub fn requires_reauthentication(self) -> bool {
        matches!(self, ErrorKind::Permission)
    }

    /// Lowercase name used in translation keys and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Data => "data",
            ErrorKind::Permission => "permission",
            ErrorKind::Server => "server",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signals a failure may carry for classification.
///
/// Every accessor is optional; a type that exposes nothing classifies as
/// [`ErrorKind::Unknown`] (or `Network` while the host is offline).
pub trait FailureDetails {
    /// Machine-readable error code, e.g. `ECONNABORTED`.
    fn code(&self) -> Option<&str> {
        None
    }

    /// HTTP-like status code.
    fn status(&self) -> Option<u16> {
        None
    }

    /// Human-readable message.
    fn message(&self) -> Option<&str> {
        None
    }

    /// Error name, e.g. `AbortError`.
    fn name(&self) -> Option<&str> {
        None
    }
}

impl<T: FailureDetails + ?Sized> FailureDetails for Arc<T> {
    fn code(&self) -> Option<&str> {
        (**self).code()
    }
    fn status(&self) -> Option<u16> {
        (**self).status()
    }
    fn message(&self) -> Option<&str> {
        (**self).message()
    }
    fn name(&self) -> Option<&str> {
        (**self).name()
    }
}

/// A failure reported by a data fetch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Error)]
#[error("{}", self.describe())]
pub struct Failure {
    /// Machine-readable error code.
    pub code: Option<String>,
    /// HTTP-like status code.
    pub status: Option<u16>,
    /// Human-readable message.
    pub message: Option<String>,
    /// Error name.
    pub name: Option<String>,
}

impl Failure {
    /// A failure carrying only an HTTP-like status.
    pub fn http(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// A failure carrying only a message.
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// A transport failure tagged with the generic network code.
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            code: Some(NETWORK_ERROR_CODE.to_string()),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// A request that was aborted before completing.
    pub fn aborted() -> Self {
        Self {
            name: Some("AbortError".to_string()),
            message: Some("The operation was aborted".to_string()),
            ..Self::default()
        }
    }

    /// A request that exceeded its transport timeout.
    pub fn timeout() -> Self {
        Self {
            name: Some("TimeoutError".to_string()),
            message: Some("The operation timed out".to_string()),
            ..Self::default()
        }
    }

    /// Sets the error code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Sets the status.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the error name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    fn describe(&self) -> String {
        match (&self.message, self.status) {
            (Some(message), Some(status)) => format!("{} (status {})", message, status),
            (Some(message), None) => message.clone(),
            (None, Some(status)) => format!("request failed with status {}", status),
            (None, None) => match (&self.name, &self.code) {
                (Some(name), _) => name.clone(),
                (None, Some(code)) => code.clone(),
                (None, None) => "unknown failure".to_string(),
            },
        }
    }
}

impl FailureDetails for Failure {
    fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
    fn status(&self) -> Option<u16> {
        self.status
    }
    fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Socket-level I/O errors surface as network codes.
impl FailureDetails for io::Error {
    fn code(&self) -> Option<&str> {
        match self.kind() {
            io::ErrorKind::ConnectionRefused => Some("ECONNREFUSED"),
            io::ErrorKind::ConnectionReset => Some("ECONNRESET"),
            io::ErrorKind::ConnectionAborted => Some("ECONNABORTED"),
            io::ErrorKind::TimedOut => Some("ETIMEDOUT"),
            io::ErrorKind::NotConnected => Some("ENOTCONN"),
            _ => None,
        }
    }
}

const NETWORK_ERROR_CODE: &str = "NETWORK_ERROR";

const NETWORK_CODES: &[&str] = &[
    NETWORK_ERROR_CODE,
    "ERR_NETWORK",
    "ECONNABORTED",
    "ECONNREFUSED",
    "ECONNRESET",
    "ETIMEDOUT",
    "ENOTCONN",
];

const NETWORK_NAMES: &[&str] = &["AbortError", "TimeoutError", "NetworkError"];

/// Maps failures to an [`ErrorKind`].
///
/// Classification is total and side-effect free. The first matching rule wins:
/// network signal, then 401/403, then other 4xx, then 5xx, else unknown.
#[derive(Clone)]
pub struct ErrorClassifier {
    detector: Arc<NetworkSignalDetector>,
    connectivity: Arc<dyn Connectivity>,
}

impl fmt::Debug for ErrorClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorClassifier")
            .field("online", &self.connectivity.is_online())
            .finish()
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorClassifier {
    /// Creates a classifier that assumes the host is always online.
    pub fn new() -> Self {
        Self::with_connectivity(Arc::new(AlwaysOnline))
    }

    /// Creates a classifier that consults `connectivity` for the offline signal.
    pub fn with_connectivity(connectivity: Arc<dyn Connectivity>) -> Self {
        Self {
            detector: Arc::new(NetworkSignalDetector::new()),
            connectivity,
        }
    }

    /// Classifies a failure.
    pub fn classify(&self, failure: &dyn FailureDetails) -> ErrorKind {
        if self.is_network_failure(failure) {
            return ErrorKind::Network;
        }

        match failure.status() {
            Some(401) | Some(403) => ErrorKind::Permission,
            Some(status) if (400..500).contains(&status) => ErrorKind::Data,
            Some(status) if status >= 500 => ErrorKind::Server,
            _ => ErrorKind::Unknown,
        }
    }

    fn is_network_failure(&self, failure: &dyn FailureDetails) -> bool {
        if failure
            .name()
            .is_some_and(|name| NETWORK_NAMES.contains(&name))
        {
            return true;
        }
        if failure
            .code()
            .is_some_and(|code| NETWORK_CODES.iter().any(|c| c.eq_ignore_ascii_case(code)))
        {
            return true;
        }
        if failure
            .message()
            .is_some_and(|message| self.detector.matches(message))
        {
            return true;
        }
        !self.connectivity.is_online()
    }
}
