//! Reference-counted loading indicator.
//!
//! Several loads can be in flight at once; the scope shows a single busy flag
//! that stays up until the last of them finishes.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::reactive::{Subject, Subscription};

struct LoadingInner {
    active: usize,
}

/// Counts in-flight loads and publishes `is_loading = active > 0`.
///
/// Clones share the same count.
#[derive(Clone)]
pub struct LoadingAggregator {
    inner: Arc<Mutex<LoadingInner>>,
    loading: Subject<bool>,
}

impl Default for LoadingAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LoadingAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadingAggregator")
            .field("active", &self.active_count())
            .finish()
    }
}

impl LoadingAggregator {
    /// Creates an idle aggregator.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(LoadingInner { active: 0 })),
            loading: Subject::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LoadingInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Marks one load as started.
    pub fn begin(&self) {
        self.mutate(|active| active.saturating_add(1));
    }

    /// Marks one load as finished. Extra calls are clamped at zero.
    pub fn end(&self) {
        self.mutate(|active| {
            if active == 0 {
                tracing::debug!("loading: end() without matching begin()");
            }
            active.saturating_sub(1)
        });
    }

    /// Forces the count to zero.
    pub fn reset(&self) {
        self.mutate(|_| 0);
    }

    /// Starts a load that ends when the returned guard is dropped.
    pub fn guard(&self) -> LoadingGuard {
        self.begin();
        LoadingGuard {
            aggregator: self.clone(),
        }
    }

    /// Number of loads in flight.
    pub fn active_count(&self) -> usize {
        self.lock().active
    }

    /// Returns true while at least one load is in flight.
    pub fn is_loading(&self) -> bool {
        self.active_count() > 0
    }

    /// Observes flips of the busy flag.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&bool, &bool) + Send + Sync + 'static,
    {
        self.loading.subscribe(listener)
    }

    /// The busy flag as a subject, for debounced watches.
    pub fn as_subject(&self) -> &Subject<bool> {
        &self.loading
    }

    // The count changes inside the subject's update so the published flag
    // always matches the latest count, whichever thread got there last.
    // Lock order: subject, then count.
    fn mutate(&self, f: impl FnOnce(usize) -> usize) {
        self.loading.update(|flag| {
            let mut inner = self.lock();
            inner.active = f(inner.active);
            *flag = inner.active > 0;
        });
    }
}

/// Ends one load of its [`LoadingAggregator`] when dropped.
#[must_use = "dropping the guard ends the load immediately"]
pub struct LoadingGuard {
    aggregator: LoadingAggregator,
}

impl LoadingGuard {
    /// Ends the load now.
    pub fn finish(self) {}
}

impl fmt::Debug for LoadingGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadingGuard").finish_non_exhaustive()
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.aggregator.end();
    }
}
