//! Bounded retry with exponential backoff and jitter.
//!
//! [`RetryPolicy`] describes how often and how patiently an operation is
//! retried; [`RetryingInvoker`] runs an operation under a policy and records
//! the terminal outcome in the scope's error state.

pub mod cancel;
pub mod invoker;
pub mod jitter;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub use cancel::{CancelSignal, Cancelled};
pub use invoker::RetryingInvoker;
pub use jitter::JitterRng;

use crate::error::{ErrorKind, FailureDetails};

/// Decides whether a failed attempt is retried.
///
/// Receives the failure and its classified kind.
pub type RetryPredicate = Arc<dyn Fn(&dyn FailureDetails, ErrorKind) -> bool + Send + Sync>;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
/// Default backoff multiplier.
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Configuration for one retried invocation.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `0` means a single attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Multiplier applied per retry, at least `1.0`.
    pub backoff_factor: f64,
    /// Scale each delay by a random factor in `[0.5, 1.0]`.
    pub jitter: bool,
    should_retry: Option<RetryPredicate>,
    seed: Option<u64>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("backoff_factor", &self.backoff_factor)
            .field("jitter", &self.jitter)
            .field("custom_should_retry", &self.should_retry.is_some())
            .field("seed", &self.seed)
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            jitter: true,
            should_retry: None,
            seed: None,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the given retry count and base delay.
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            ..Self::default()
        }
    }

    /// Sets the backoff factor. Values below `1.0` are raised to `1.0`.
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = if factor.is_finite() { factor.max(1.0) } else { 1.0 };
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Replaces the retry predicate.
    pub fn with_should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&dyn FailureDetails, ErrorKind) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Some(Arc::new(predicate));
        self
    }

    pub(crate) fn with_predicate(mut self, predicate: Option<RetryPredicate>) -> Self {
        if predicate.is_some() {
            self.should_retry = predicate;
        }
        self
    }

    /// Seeds the jitter generator for reproducible delays.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether a failure of `kind` is retried. Defaults to network failures only.
    pub fn should_retry(&self, failure: &dyn FailureDetails, kind: ErrorKind) -> bool {
        match &self.should_retry {
            Some(predicate) => predicate(failure, kind),
            None => kind.is_retryable(),
        }
    }

    /// Un-jittered delay after the failed attempt `attempt` (0-based):
    /// `base_delay * backoff_factor^attempt`.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let nanos = self.base_delay.as_nanos() as f64 * self.backoff_factor.powi(exponent);
        nanos_to_duration(nanos)
    }

    /// Delay after the failed attempt `attempt`, jittered if enabled.
    pub fn delay_for(&self, attempt: u32, rng: &mut JitterRng) -> Duration {
        let delay = self.base_delay_for(attempt);
        if self.jitter {
            nanos_to_duration(delay.as_nanos() as f64 * rng.factor())
        } else {
            delay
        }
    }

    /// Jitter generator for one invocation.
    pub fn rng(&self) -> JitterRng {
        match self.seed {
            Some(seed) => JitterRng::new(seed),
            None => JitterRng::from_clock(),
        }
    }
}

fn nanos_to_duration(nanos: f64) -> Duration {
    if !nanos.is_finite() || nanos >= u64::MAX as f64 {
        return Duration::from_nanos(u64::MAX);
    }
    Duration::from_nanos(nanos.max(0.0).round() as u64)
}

/// Per-call knobs for the scope-level `with_retry` operations.
///
/// Unset fields fall back to the scope's configured defaults.
#[derive(Clone)]
pub struct RetryOptions {
    /// Backoff multiplier override.
    pub backoff_factor: Option<f64>,
    /// Jitter override.
    pub jitter: Option<bool>,
    /// Retry predicate override.
    pub should_retry: Option<RetryPredicate>,
    /// Message shown instead of the classified one on terminal failure.
    pub message: Option<String>,
    /// Emit a user-visible notification on terminal failure.
    pub notify: bool,
    /// Jitter seed.
    pub seed: Option<u64>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            backoff_factor: None,
            jitter: None,
            should_retry: None,
            message: None,
            notify: true,
            seed: None,
        }
    }
}

impl fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("backoff_factor", &self.backoff_factor)
            .field("jitter", &self.jitter)
            .field("custom_should_retry", &self.should_retry.is_some())
            .field("message", &self.message)
            .field("notify", &self.notify)
            .field("seed", &self.seed)
            .finish()
    }
}

impl RetryOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the backoff factor.
    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = Some(factor);
        self
    }

    /// Enables or disables jitter.
    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Sets the retry predicate.
    pub fn should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&dyn FailureDetails, ErrorKind) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Some(Arc::new(predicate));
        self
    }

    /// Sets the terminal failure message.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Enables or disables the terminal notification.
    pub fn notify(mut self, notify: bool) -> Self {
        self.notify = notify;
        self
    }

    /// Seeds the jitter generator.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Builds the policy for one call, filling gaps from `defaults`.
    pub fn to_policy(&self, max_retries: u32, base_delay: Duration, defaults: &RetryPolicy) -> RetryPolicy {
        let mut policy = RetryPolicy::new(max_retries, base_delay)
            .with_backoff_factor(self.backoff_factor.unwrap_or(defaults.backoff_factor))
            .with_jitter(self.jitter.unwrap_or(defaults.jitter))
            .with_predicate(defaults.should_retry.clone())
            .with_predicate(self.should_retry.clone());
        policy.seed = self.seed.or(defaults.seed);
        policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Failure;

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.base_delay, Duration::from_millis(1000));
        assert_eq!(policy.backoff_factor, 2.0);
        assert!(policy.jitter);
    }

    #[test]
    fn test_exponential_delay_without_jitter() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100)).with_jitter(false);
        assert_eq!(policy.base_delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.base_delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.base_delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.base_delay_for(3), Duration::from_millis(800));

        let mut rng = policy.rng();
        assert_eq!(policy.delay_for(2, &mut rng), Duration::from_millis(400));
    }

    #[test]
    fn test_custom_factor() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1500))
            .with_backoff_factor(3.0)
            .with_jitter(false);
        assert_eq!(policy.base_delay_for(2), Duration::from_millis(13_500));
    }

    #[test]
    fn test_factor_below_one_is_clamped() {
        let policy = RetryPolicy::default().with_backoff_factor(0.5);
        assert_eq!(policy.backoff_factor, 1.0);
        assert_eq!(policy.base_delay_for(4), policy.base_delay);
    }

    #[test]
    fn test_jittered_delay_bounds() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100));
        let mut rng = policy.rng();
        for attempt in 0..4 {
            let full = policy.base_delay_for(attempt);
            for _ in 0..500 {
                let delay = policy.delay_for(attempt, &mut rng);
                assert!(delay <= full, "{:?} > {:?}", delay, full);
                assert!(delay >= full / 2, "{:?} < half of {:?}", delay, full);
            }
        }
    }

    #[test]
    fn test_seeded_jitter_is_reproducible() {
        let policy = RetryPolicy::new(3, Duration::from_millis(250)).with_seed(7);
        let mut a = policy.rng();
        let mut b = policy.rng();
        for attempt in 0..3 {
            assert_eq!(policy.delay_for(attempt, &mut a), policy.delay_for(attempt, &mut b));
        }
    }

    #[test]
    fn test_huge_exponent_saturates() {
        let policy = RetryPolicy::new(u32::MAX, Duration::from_secs(1)).with_jitter(false);
        assert_eq!(policy.base_delay_for(10_000), Duration::from_nanos(u64::MAX));
    }

    #[test]
    fn test_default_predicate_retries_network_only() {
        let policy = RetryPolicy::default();
        let failure = Failure::default();
        assert!(policy.should_retry(&failure, ErrorKind::Network));
        assert!(!policy.should_retry(&failure, ErrorKind::Server));
        assert!(!policy.should_retry(&failure, ErrorKind::Permission));
    }

    #[test]
    fn test_custom_predicate() {
        let policy = RetryPolicy::default()
            .with_should_retry(|_, kind| matches!(kind, ErrorKind::Network | ErrorKind::Server));
        assert!(policy.should_retry(&Failure::http(503), ErrorKind::Server));
        assert!(!policy.should_retry(&Failure::http(404), ErrorKind::Data));
    }

    #[test]
    fn test_options_fill_from_defaults() {
        let defaults = RetryPolicy::default().with_backoff_factor(3.0).with_jitter(false);
        let policy = RetryOptions::new().to_policy(1, Duration::from_millis(50), &defaults);
        assert_eq!(policy.max_retries, 1);
        assert_eq!(policy.base_delay, Duration::from_millis(50));
        assert_eq!(policy.backoff_factor, 3.0);
        assert!(!policy.jitter);

        let policy = RetryOptions::new()
            .backoff_factor(1.5)
            .jitter(true)
            .to_policy(1, Duration::from_millis(50), &defaults);
        assert_eq!(policy.backoff_factor, 1.5);
        assert!(policy.jitter);
    }

    #[test]
    fn test_options_predicate_overrides_default() {
        let policy = RetryOptions::new()
            .should_retry(|_, _| false)
            .to_policy(3, Duration::from_millis(10), &RetryPolicy::default());
        assert!(!policy.should_retry(&Failure::network("down"), ErrorKind::Network));
    }
}
