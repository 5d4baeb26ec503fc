//! Trailing-edge debounce on the tokio timer.
//!
//! Each [`DebounceScheduler`] is one registration: at most one timer is armed
//! at a time, and arming a new one aborts the previous one first.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;

/// Identifies one armed timer of a [`DebounceScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleHandle {
    generation: u64,
}

impl ScheduleHandle {
    /// A handle for a timer that was never armed; cancelling it does nothing.
    pub(crate) fn inert() -> Self {
        Self { generation: 0 }
    }
}

#[derive(Default)]
struct DebounceInner {
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

fn lock(inner: &Mutex<DebounceInner>) -> MutexGuard<'_, DebounceInner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Cancellable delayed invocation.
///
/// Dropping the scheduler cancels whatever is pending, so a callback never
/// fires after its owner is gone.
pub struct DebounceScheduler {
    inner: Arc<Mutex<DebounceInner>>,
}

impl Default for DebounceScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DebounceScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebounceScheduler")
            .field("pending", &self.is_pending())
            .finish()
    }
}

impl DebounceScheduler {
    /// Creates a registration with nothing pending.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(DebounceInner::default())),
        }
    }

    /// Arms `callback` to run after `delay`, cancelling any pending one.
    ///
    /// A zero delay still defers the callback to the next scheduler turn.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn schedule<F>(&self, callback: F, delay: Duration) -> ScheduleHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let mut inner = lock(&self.inner);
        if let Some(previous) = inner.pending.take() {
            previous.abort();
            tracing::trace!("debounce: superseded pending invocation");
        }
        inner.generation += 1;
        let generation = inner.generation;

        let shared = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }

            let current = {
                let mut inner = lock(&shared);
                if inner.generation == generation {
                    inner.pending = None;
                    true
                } else {
                    false
                }
            };
            if current {
                callback();
            }
        });
        inner.pending = Some(task);

        ScheduleHandle { generation }
    }

    /// Cancels the timer identified by `handle` if it is still pending.
    ///
    /// Returns false if it already fired or was superseded.
    pub fn cancel(&self, handle: ScheduleHandle) -> bool {
        let mut inner = lock(&self.inner);
        if inner.generation != handle.generation {
            return false;
        }
        Self::abort_pending(&mut inner)
    }

    /// Cancels whatever is pending. Returns true if something was cancelled.
    pub fn cancel_pending(&self) -> bool {
        Self::abort_pending(&mut lock(&self.inner))
    }

    /// Returns true while a timer is armed.
    pub fn is_pending(&self) -> bool {
        lock(&self.inner).pending.is_some()
    }

    fn abort_pending(inner: &mut DebounceInner) -> bool {
        // Bumping the generation also stops a task that already woke up.
        inner.generation += 1;
        match inner.pending.take() {
            Some(task) => {
                task.abort();
                tracing::trace!("debounce: cancelled pending invocation");
                true
            }
            None => false,
        }
    }
}

impl Drop for DebounceScheduler {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

/// Debounced delivery of the most recent value.
///
/// Every [`Debounced::call`] replaces the stored value and restarts the quiet
/// period; the callback receives only the last value of a burst.
pub struct Debounced<T> {
    scheduler: DebounceScheduler,
    latest: Arc<Mutex<Option<T>>>,
    callback: Arc<dyn Fn(T) + Send + Sync>,
    delay: Duration,
}

impl<T> fmt::Debug for Debounced<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debounced")
            .field("delay", &self.delay)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl<T: Send + 'static> Debounced<T> {
    /// Creates a debounced callback with a fixed quiet period.
    pub fn new<F>(callback: F, delay: Duration) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            scheduler: DebounceScheduler::new(),
            latest: Arc::new(Mutex::new(None)),
            callback: Arc::new(callback),
            delay,
        }
    }

    /// Stores `value` and restarts the quiet period.
    pub fn call(&self, value: T) -> ScheduleHandle {
        *self.slot() = Some(value);

        let latest = Arc::clone(&self.latest);
        let callback = Arc::clone(&self.callback);
        self.scheduler.schedule(
            move || {
                let value = latest
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .take();
                if let Some(value) = value {
                    callback(value);
                }
            },
            self.delay,
        )
    }

    /// Delivers the stored value now, if any, and disarms the timer.
    pub fn flush(&self) -> bool {
        self.scheduler.cancel_pending();
        let value = self.slot().take();
        match value {
            Some(value) => {
                (self.callback)(value);
                true
            }
            None => false,
        }
    }

    /// Discards the stored value and disarms the timer.
    pub fn cancel(&self) -> bool {
        self.slot().take();
        self.scheduler.cancel_pending()
    }

    /// Returns true while a delivery is pending.
    pub fn is_pending(&self) -> bool {
        self.scheduler.is_pending()
    }

    /// The quiet period.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    fn slot(&self) -> MutexGuard<'_, Option<T>> {
        self.latest
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        (Arc::clone(&count), count)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let scheduler = DebounceScheduler::new();
        let (count, seen) = counter();
        scheduler.schedule(move || {
            count.fetch_add(1, Ordering::SeqCst);
        }, Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(90)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert!(scheduler.is_pending());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseding_call_wins() {
        let scheduler = DebounceScheduler::new();
        let fired = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let sink = Arc::clone(&fired);
            scheduler.schedule(move || sink.lock().unwrap().push(i), Duration::from_millis(100));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(*fired.lock().unwrap(), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_by_handle() {
        let scheduler = DebounceScheduler::new();
        let (count, seen) = counter();
        let handle = scheduler.schedule(move || {
            count.fetch_add(1, Ordering::SeqCst);
        }, Duration::from_millis(50));

        assert!(scheduler.cancel(handle));
        assert!(!scheduler.cancel(handle));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_handle_does_not_cancel_newer_timer() {
        let scheduler = DebounceScheduler::new();
        let (count, seen) = counter();
        let stale = scheduler.schedule(|| {}, Duration::from_millis(50));
        scheduler.schedule(move || {
            count.fetch_add(1, Ordering::SeqCst);
        }, Duration::from_millis(50));

        assert!(!scheduler.cancel(stale));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending() {
        let (count, seen) = counter();
        {
            let scheduler = DebounceScheduler::new();
            scheduler.schedule(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }, Duration::from_millis(20));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_is_deferred() {
        let scheduler = DebounceScheduler::new();
        let (count, seen) = counter();
        scheduler.schedule(move || {
            count.fetch_add(1, Ordering::SeqCst);
        }, Duration::ZERO);

        assert_eq!(seen.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_delivers_last_value() {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&delivered);
        let debounced = Debounced::new(
            move |v: &'static str| sink.lock().unwrap().push(v),
            Duration::from_millis(100),
        );

        debounced.call("first");
        tokio::time::sleep(Duration::from_millis(10)).await;
        debounced.call("second");
        tokio::time::sleep(Duration::from_millis(10)).await;
        debounced.call("third");
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(*delivered.lock().unwrap(), vec!["third"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_flush_and_cancel() {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&delivered);
        let debounced = Debounced::new(
            move |v: u32| sink.lock().unwrap().push(v),
            Duration::from_millis(100),
        );

        debounced.call(1);
        assert!(debounced.flush());
        assert!(!debounced.flush());

        debounced.call(2);
        assert!(debounced.cancel());
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(*delivered.lock().unwrap(), vec![1]);
    }
}
