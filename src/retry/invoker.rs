//! Runs a fallible async operation under a [`RetryPolicy`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::cancel::{CancelSignal, Cancelled};
use super::RetryPolicy;
use crate::error::{ErrorClassifier, ErrorKind, ErrorState, FailureDetails};
use crate::i18n::MessageResolver;
use crate::loading::LoadingAggregator;
use crate::notification::{Notification, Notifier, TracingNotifier};
use crate::reactive::Subject;

/// How a terminal failure is reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureReport {
    /// Emit a notification.
    pub notify: bool,
    /// Message used instead of the classified one.
    pub message: Option<String>,
}

impl FailureReport {
    /// Report with a notification and the classified message.
    pub fn notify() -> Self {
        Self {
            notify: true,
            message: None,
        }
    }

    /// Report without a notification.
    pub fn silent() -> Self {
        Self::default()
    }
}

/// Retries operations and records their outcome in a scope's error state.
///
/// Attempts of one invocation are strictly sequential. Each invocation holds
/// one load on the shared [`LoadingAggregator`] from start to finish.
///
/// Once the invoker's [`CancelSignal`] fires, running invocations stop at
/// their next attempt or backoff and new ones do not start. A cancelled
/// invocation leaves the error state alone and returns [`Cancelled`]
/// converted into the caller's error type.
#[derive(Clone)]
pub struct RetryingInvoker {
    errors: Subject<ErrorState>,
    loading: LoadingAggregator,
    classifier: ErrorClassifier,
    messages: MessageResolver,
    notifier: Arc<dyn Notifier>,
    cancel: CancelSignal,
}

impl fmt::Debug for RetryingInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingInvoker")
            .field("classifier", &self.classifier)
            .field("loading", &self.loading)
            .finish_non_exhaustive()
    }
}

impl RetryingInvoker {
    /// Creates an invoker over the given scope state.
    pub fn new(errors: Subject<ErrorState>, loading: LoadingAggregator) -> Self {
        Self {
            errors,
            loading,
            classifier: ErrorClassifier::new(),
            messages: MessageResolver::default(),
            notifier: Arc::new(TracingNotifier),
            cancel: CancelSignal::new(),
        }
    }

    /// Stops invocations when `signal` fires.
    pub fn with_cancel_signal(mut self, signal: CancelSignal) -> Self {
        self.cancel = signal;
        self
    }

    /// Replaces the classifier.
    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Replaces the message resolver.
    pub fn with_messages(mut self, messages: MessageResolver) -> Self {
        self.messages = messages;
        self
    }

    /// Replaces the notifier.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// The classifier in use.
    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    /// Runs `operation` under `policy`, notifying on terminal failure.
    pub async fn invoke<T, E, F, Fut>(&self, operation: F, policy: &RetryPolicy) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: FailureDetails + fmt::Display + From<Cancelled>,
    {
        self.run(operation, policy, &FailureReport::notify()).await
    }

    /// Runs `operation` under `policy`.
    ///
    /// On success the error state is cleared. On terminal failure the last
    /// failure is classified, recorded, optionally notified, and returned.
    pub async fn run<T, E, F, Fut>(
        &self,
        mut operation: F,
        policy: &RetryPolicy,
        report: &FailureReport,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: FailureDetails + fmt::Display + From<Cancelled>,
    {
        if self.cancel.is_cancelled() {
            tracing::debug!("retry: cancelled before the first attempt");
            return Err(E::from(Cancelled));
        }
        let _loading = self.loading.guard();
        let mut rng = policy.rng();
        self.errors.update(ErrorState::reset_retry);

        let mut attempt = 0;
        let last_failure = loop {
            tracing::debug!(attempt, max_retries = policy.max_retries, "retry: attempt");
            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                outcome = operation() => Some(outcome),
            };
            let failure = match outcome {
                None => {
                    tracing::debug!(attempt, "retry: cancelled during attempt");
                    return Err(E::from(Cancelled));
                }
                Some(Ok(value)) => {
                    self.clear_error();
                    return Ok(value);
                }
                Some(Err(failure)) => failure,
            };

            if attempt >= policy.max_retries {
                break failure;
            }
            let kind = self.classifier.classify(&failure);
            if !policy.should_retry(&failure, kind) {
                tracing::debug!(attempt, %kind, "retry: not retryable");
                break failure;
            }

            self.errors.update(ErrorState::increment_retry);
            let delay = policy.delay_for(attempt, &mut rng);
            tracing::debug!(attempt, ?delay, %failure, "retry: backing off");
            let cancelled = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => true,
                _ = tokio::time::sleep(delay) => false,
            };
            if cancelled {
                tracing::debug!(attempt, "retry: cancelled during backoff");
                return Err(E::from(Cancelled));
            }
            attempt += 1;
        };

        self.record_failure(&last_failure, report);
        Err(last_failure)
    }

    /// Resets the error state to clear.
    pub fn clear_error(&self) {
        self.errors.update(|state| {
            if state.has_error || state.retry_count > 0 {
                state.clear();
            }
        });
    }

    /// Classifies and records `failure`, returning its kind.
    pub fn record_failure(&self, failure: &(impl FailureDetails + fmt::Display), report: &FailureReport) -> ErrorKind {
        let kind = self.classifier.classify(failure);
        let message = report
            .message
            .clone()
            .unwrap_or_else(|| self.messages.message_for(kind));

        tracing::warn!(%kind, %failure, "retry: giving up");
        self.errors
            .update(|state| state.set_error(message.clone(), kind));

        if report.notify {
            self.notifier.notify(Notification::for_failure(kind, message));
        }
        kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Failure;
    use crate::notification::CollectingNotifier;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn invoker() -> (RetryingInvoker, Subject<ErrorState>, LoadingAggregator) {
        let errors = Subject::new(ErrorState::new());
        let loading = LoadingAggregator::new();
        (RetryingInvoker::new(errors.clone(), loading.clone()), errors, loading)
    }

    fn policy(max_retries: u32, base_ms: u64) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(base_ms)).with_jitter(false)
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_try() {
        let (invoker, errors, loading) = invoker();
        let result: Result<u32, Failure> = invoker.invoke(|| async { Ok(7) }, &policy(2, 100)).await;

        assert_eq!(result.unwrap(), 7);
        assert!(!errors.get().has_error);
        assert!(!loading.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_single_attempt() {
        let (invoker, errors, _) = invoker();
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();

        let result: Result<(), Failure> = invoker
            .invoke(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(Failure::network("fetch failed")) }
                },
                &policy(0, 100),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
        let state = errors.get();
        assert_eq!(state.kind, ErrorKind::Network);
        assert_eq!(state.retry_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_attempts() {
        let (invoker, _, _) = invoker();
        let start = tokio::time::Instant::now();

        let _: Result<(), Failure> = invoker
            .invoke(|| async { Err(Failure::timeout()) }, &policy(3, 100))
            .await;

        // 100 + 200 + 400
        assert!(start.elapsed() >= Duration::from_millis(700));
        assert!(start.elapsed() < Duration::from_millis(710));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_retryable_short_circuits() {
        let (invoker, errors, _) = invoker();
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();

        let result: Result<(), Failure> = invoker
            .invoke(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(Failure::http(500)) }
                },
                &policy(5, 100),
            )
            .await;

        assert_eq!(result.unwrap_err().status, Some(500));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(errors.get().retry_count, 0);
        assert_eq!(errors.get().kind, ErrorKind::Server);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loading_held_across_retries() {
        let (invoker, _, loading) = invoker();
        let observed = loading.clone();

        let _: Result<(), Failure> = invoker
            .invoke(
                || {
                    assert!(observed.is_loading());
                    async { Err(Failure::aborted()) }
                },
                &policy(2, 10),
            )
            .await;

        assert!(!loading.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_message_override_and_notify() {
        let (invoker, errors, _) = invoker();
        let notifier = CollectingNotifier::new();
        let invoker = invoker.with_notifier(Arc::new(notifier.clone()));

        let report = FailureReport {
            notify: true,
            message: Some("Could not load revenue".to_string()),
        };
        let _: Result<(), Failure> = invoker
            .run(|| async { Err(Failure::http(404)) }, &policy(2, 10), &report)
            .await;

        assert_eq!(errors.get().message, "Could not load revenue");
        let sent = notifier.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind(), ErrorKind::Data);
        assert_eq!(sent[0].message(), "Could not load revenue");
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_report_does_not_notify() {
        let (invoker, errors, _) = invoker();
        let notifier = CollectingNotifier::new();
        let invoker = invoker.with_notifier(Arc::new(notifier.clone()));

        let _: Result<(), Failure> = invoker
            .run(|| async { Err(Failure::http(401)) }, &policy(0, 10), &FailureReport::silent())
            .await;

        assert!(notifier.is_empty());
        assert_eq!(errors.get().kind, ErrorKind::Permission);
        assert!(errors.get().has_error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_invocation_resets_retry_count() {
        let (invoker, errors, _) = invoker();
        let _: Result<(), Failure> = invoker
            .invoke(|| async { Err(Failure::aborted()) }, &policy(2, 10))
            .await;
        assert_eq!(errors.get().retry_count, 2);

        let _: Result<(), Failure> = invoker
            .invoke(|| async { Err(Failure::http(400)) }, &policy(2, 10))
            .await;
        let state = errors.get();
        assert_eq!(state.retry_count, 0);
        assert_eq!(state.kind, ErrorKind::Data);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_stops_without_recording() {
        let (invoker, errors, loading) = invoker();
        let signal = CancelSignal::new();
        let notifier = CollectingNotifier::new();
        let invoker = invoker
            .with_cancel_signal(signal.clone())
            .with_notifier(Arc::new(notifier.clone()));
        let calls = AtomicU32::new(0);

        let trigger = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let result: Result<(), Failure> = invoker
            .invoke(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(Failure::network("fetch failed")) }
                },
                &policy(2, 100),
            )
            .await;

        assert_eq!(result.unwrap_err(), Failure::from(Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(notifier.is_empty());
        assert!(!errors.get().has_error);
        assert!(!loading.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_running_attempt() {
        let (invoker, errors, _) = invoker();
        let signal = CancelSignal::new();
        let invoker = invoker.with_cancel_signal(signal.clone());

        let trigger = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let start = tokio::time::Instant::now();
        let result: Result<u32, Failure> = invoker
            .invoke(
                || async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(1)
                },
                &policy(0, 10),
            )
            .await;

        assert!(result.is_err());
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(!errors.get().has_error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_invoker_does_not_start() {
        let (invoker, _, loading) = invoker();
        let signal = CancelSignal::new();
        signal.cancel();
        let invoker = invoker.with_cancel_signal(signal);
        let calls = AtomicU32::new(0);

        let result: Result<(), std::io::Error> = invoker
            .invoke(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok(()) }
                },
                &policy(2, 10),
            )
            .await;

        assert_eq!(result.unwrap_err().kind(), std::io::ErrorKind::Interrupted);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!loading.is_loading());
    }
}
