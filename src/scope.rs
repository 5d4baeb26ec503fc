//! Per-view resilience scope.
//!
//! A [`ResilienceScope`] bundles the error read model, the loading flag, the
//! retry invoker and the scheduling primitives a single view needs. It owns
//! every timer and watch it hands out; tearing the scope down (explicitly or
//! by dropping it) cancels them all, so no callback runs against a destroyed
//! view.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::ResilienceConfig;
use crate::connectivity::{AlwaysOnline, Connectivity};
use crate::error::{ErrorClassifier, ErrorKind, ErrorState, FailureDetails};
use crate::i18n::{IdentityTranslator, MessageResolver, Translator};
use crate::loading::{LoadingAggregator, LoadingGuard};
use crate::notification::{Notifier, TracingNotifier};
use crate::reactive::{debounced_watch, Subject, Subscription, WatchHandle, WatchOptions};
use crate::retry::invoker::FailureReport;
use crate::retry::{CancelSignal, Cancelled, RetryOptions, RetryPolicy, RetryingInvoker};
use crate::schedule::{PriorityScheduler, ScheduleHandle, UpdatePriority};

type TeardownHook = Box<dyn FnOnce() + Send>;

/// Hooks keyed by registration id, run in registration order.
#[derive(Default)]
struct TeardownHooks {
    next_id: u64,
    hooks: BTreeMap<u64, TeardownHook>,
}

fn lock_hooks(hooks: &Mutex<TeardownHooks>) -> MutexGuard<'_, TeardownHooks> {
    hooks.lock().unwrap_or_else(|p| p.into_inner())
}

/// Builder for [`ResilienceScope`].
pub struct ScopeBuilder {
    config: ResilienceConfig,
    translator: Arc<dyn Translator>,
    notifier: Arc<dyn Notifier>,
    connectivity: Arc<dyn Connectivity>,
}

impl Default for ScopeBuilder {
    fn default() -> Self {
        Self {
            config: ResilienceConfig::default(),
            translator: Arc::new(IdentityTranslator),
            notifier: Arc::new(TracingNotifier),
            connectivity: Arc::new(AlwaysOnline),
        }
    }
}

impl fmt::Debug for ScopeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ScopeBuilder {
    /// Uses `config` for retry defaults, debounce tiers and messages.
    pub fn config(mut self, config: ResilienceConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses `translator` for failure messages.
    pub fn translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = translator;
        self
    }

    /// Sends terminal-failure notifications to `notifier`.
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Uses `connectivity` as the offline signal.
    pub fn connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = connectivity;
        self
    }

    /// Builds the scope.
    pub fn build(self) -> ResilienceScope {
        let errors = Subject::new(ErrorState::new());
        let loading = LoadingAggregator::new();
        let cancel = CancelSignal::new();
        let invoker = RetryingInvoker::new(errors.clone(), loading.clone())
            .with_classifier(ErrorClassifier::with_connectivity(self.connectivity))
            .with_messages(MessageResolver::new(self.config.messages.clone(), self.translator))
            .with_notifier(self.notifier)
            .with_cancel_signal(cancel.clone());

        ResilienceScope {
            errors,
            loading,
            invoker,
            defaults: self.config.retry.to_policy(),
            priority: PriorityScheduler::new(self.config.debounce.to_delays()),
            cancel,
            hooks: Arc::new(Mutex::new(TeardownHooks::default())),
            torn_down: AtomicBool::new(false),
        }
    }
}

/// Resilience state and operations owned by one view.
pub struct ResilienceScope {
    errors: Subject<ErrorState>,
    loading: LoadingAggregator,
    invoker: RetryingInvoker,
    defaults: RetryPolicy,
    priority: PriorityScheduler,
    cancel: CancelSignal,
    hooks: Arc<Mutex<TeardownHooks>>,
    torn_down: AtomicBool,
}

impl Default for ResilienceScope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResilienceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilienceScope")
            .field("errors", &self.errors)
            .field("loading", &self.loading)
            .field("defaults", &self.defaults)
            .field("torn_down", &self.is_torn_down())
            .finish_non_exhaustive()
    }
}

impl ResilienceScope {
    /// Scope with default configuration.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts building a scope.
    pub fn builder() -> ScopeBuilder {
        ScopeBuilder::default()
    }

    // --- errors ---

    /// Snapshot of the error read model.
    pub fn error_state(&self) -> ErrorState {
        self.errors.get()
    }

    /// The error read model as a subject.
    pub fn errors(&self) -> &Subject<ErrorState> {
        &self.errors
    }

    /// Observes changes of the error read model.
    pub fn subscribe_errors<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ErrorState, &ErrorState) + Send + Sync + 'static,
    {
        self.errors.subscribe(listener)
    }

    /// Dismisses the current failure.
    ///
    /// Clearing an already clear state changes nothing, including the
    /// timestamp, and does not notify observers.
    pub fn clear_error(&self) {
        self.invoker.clear_error();
    }

    /// Classifies `failure` with this scope's classifier.
    pub fn classify(&self, failure: &dyn FailureDetails) -> ErrorKind {
        self.invoker.classifier().classify(failure)
    }

    // --- retry ---

    /// Retry defaults from configuration.
    pub fn retry_defaults(&self) -> &RetryPolicy {
        &self.defaults
    }

    /// Runs `operation` with up to `max_retries` retries starting at
    /// `base_delay`. On terminal failure the error state is set, a
    /// notification is sent unless `options.notify` is false, and the last
    /// failure is returned.
    ///
    /// Tearing the scope down stops the invocation at its current attempt
    /// or backoff; it then returns [`Cancelled`] converted into `E` and
    /// records nothing. After teardown the operation is not run at all.
    pub async fn with_retry<T, E, F, Fut>(
        &self,
        operation: F,
        max_retries: u32,
        base_delay: Duration,
        options: RetryOptions,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: FailureDetails + fmt::Display + From<Cancelled>,
    {
        let policy = options.to_policy(max_retries, base_delay, &self.defaults);
        let report = FailureReport {
            notify: options.notify,
            message: options.message,
        };
        self.invoker.run(operation, &policy, &report).await
    }

    /// Like [`ResilienceScope::with_retry`] with the configured defaults.
    pub async fn with_default_retry<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: FailureDetails + fmt::Display + From<Cancelled>,
    {
        self.invoker
            .run(operation, &self.defaults, &FailureReport::notify())
            .await
    }

    /// Runs `operation` under an explicit policy.
    pub async fn with_policy<T, E, F, Fut>(&self, operation: F, policy: &RetryPolicy) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: FailureDetails + fmt::Display + From<Cancelled>,
    {
        self.invoker.invoke(operation, policy).await
    }

    /// Like [`ResilienceScope::with_retry`], but never notifies and returns
    /// `fallback` instead of the failure. The error state is still recorded.
    pub async fn with_retry_safe<T, E, F, Fut>(
        &self,
        operation: F,
        fallback: T,
        max_retries: u32,
        base_delay: Duration,
        options: RetryOptions,
    ) -> T
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: FailureDetails + fmt::Display + From<Cancelled>,
    {
        let policy = options.to_policy(max_retries, base_delay, &self.defaults);
        let report = FailureReport {
            notify: false,
            message: options.message,
        };
        match self.invoker.run(operation, &policy, &report).await {
            Ok(value) => value,
            Err(failure) => {
                tracing::debug!(%failure, "retry: using fallback value");
                fallback
            }
        }
    }

    // --- loading ---

    /// Returns true while any load of this scope is in flight.
    pub fn is_loading(&self) -> bool {
        self.loading.is_loading()
    }

    /// The loading aggregator.
    pub fn loading(&self) -> &LoadingAggregator {
        &self.loading
    }

    /// Marks a manual load as started.
    pub fn start_loading(&self) {
        self.loading.begin();
    }

    /// Marks a manual load as finished.
    pub fn stop_loading(&self) {
        self.loading.end();
    }

    /// Clears the loading flag regardless of outstanding loads.
    pub fn reset_loading(&self) {
        self.loading.reset();
    }

    /// Starts a load that ends when the guard is dropped.
    pub fn loading_guard(&self) -> LoadingGuard {
        self.loading.guard()
    }

    // --- scheduling ---

    /// Debounced watch owned by this scope; stopped on teardown.
    ///
    /// Stopping or dropping the handle earlier releases the scope's
    /// reference to it.
    pub fn debounced_watch<T, F>(
        &self,
        source: &Subject<T>,
        callback: F,
        delay: Duration,
        options: WatchOptions,
    ) -> WatchHandle
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(&T, Option<&T>) + Send + Sync + 'static,
    {
        let handle = debounced_watch(source, callback, delay, options);
        if let Some(id) = self.register_hook(Box::new(handle.stop_hook())) {
            let hooks = Arc::downgrade(&self.hooks);
            handle.on_stop(move || {
                if let Some(hooks) = hooks.upgrade() {
                    lock_hooks(&hooks).hooks.remove(&id);
                }
            });
        }
        handle
    }

    /// Coalesces `callback` into the tier for `priority`. Does nothing once
    /// the scope is torn down.
    pub fn optimized_update<F>(&self, callback: F, priority: UpdatePriority) -> ScheduleHandle
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_torn_down() {
            tracing::debug!(?priority, "scope: update after teardown dropped");
            return ScheduleHandle::inert();
        }
        self.priority.update(callback, priority)
    }

    /// Cancels the pending update of one tier.
    pub fn cancel_update(&self, priority: UpdatePriority) -> bool {
        self.priority.cancel(priority)
    }

    // --- teardown ---

    /// Registers `hook` to run on teardown. Runs it now if the scope is
    /// already torn down.
    pub fn on_teardown<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.register_hook(Box::new(hook));
    }

    fn register_hook(&self, hook: TeardownHook) -> Option<u64> {
        // The flag is read under the registry lock; teardown sets it before
        // taking the hooks, so a hook is either taken or run here.
        let mut registry = lock_hooks(&self.hooks);
        if !self.is_torn_down() {
            let id = registry.next_id;
            registry.next_id += 1;
            registry.hooks.insert(id, hook);
            return Some(id);
        }
        drop(registry);
        hook();
        None
    }

    /// Cancels in-flight retries, every timer and watch of this scope, and
    /// runs teardown hooks. Later calls do nothing.
    pub fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        let hooks = std::mem::take(&mut lock_hooks(&self.hooks).hooks);
        tracing::debug!(hooks = hooks.len(), "scope: teardown");
        for hook in hooks.into_values() {
            hook();
        }
        self.priority.cancel_all();
        self.loading.reset();
    }

    /// Returns true once [`ResilienceScope::teardown`] has run.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }
}

impl Drop for ResilienceScope {
    fn drop(&mut self) {
        self.teardown();
    }
}
