//! Failure classification and the error read model.
//!
//! Failures from data fetches are classified into a small fixed set of
//! [`ErrorKind`]s; the last terminal failure of a scope is kept in an
//! [`ErrorState`] that views render and users can dismiss.

pub mod classification;
pub mod detector;
pub mod state;

pub use classification::{ErrorClassifier, ErrorKind, Failure, FailureDetails};
pub use detector::{NetworkSignalDetector, SignalPattern};
pub use state::{ErrorPhase, ErrorState};
