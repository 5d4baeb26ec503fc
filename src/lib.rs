//! Resilient View - failure handling for data-driven views
//!
//! Classifies failed fetches, retries them with bounded exponential backoff,
//! keeps a per-view error and loading read model, and debounces bursts of
//! reactive updates. Everything a view acquires lives in a
//! [`ResilienceScope`] and is cancelled when the scope is torn down.

pub mod config;
pub mod connectivity;
pub mod error;
pub mod i18n;
pub mod loading;
pub mod logging;
pub mod notification;
pub mod reactive;
pub mod retry;
pub mod schedule;
pub mod scope;

pub use config::{ConfigError, ResilienceConfig};
pub use connectivity::{AlwaysOnline, Connectivity, OnlineStatus};
pub use error::{ErrorClassifier, ErrorKind, ErrorState, Failure, FailureDetails};
pub use i18n::{CatalogTranslator, MessageCatalog, Translator};
pub use loading::{LoadingAggregator, LoadingGuard};
pub use notification::{Notification, Notifier};
pub use reactive::{debounced_watch, Subject, Subscription, WatchHandle, WatchOptions};
pub use retry::{CancelSignal, Cancelled, RetryOptions, RetryPolicy, RetryingInvoker};
pub use schedule::{Debounced, PriorityScheduler, Throttled, UpdatePriority};
pub use scope::{ResilienceScope, ScopeBuilder};
