//! Leading-edge throttle on top of [`DebounceScheduler`].
//!
//! The first call of a quiet period runs at once and opens a window of
//! `interval`. Calls inside the window only replace a trailing value, which
//! is delivered when the window closes and opens the next window.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use super::debounce::DebounceScheduler;

struct ThrottleState<T> {
    open: bool,
    trailing: Option<T>,
}

struct ThrottleShared<T> {
    state: Mutex<ThrottleState<T>>,
    scheduler: DebounceScheduler,
    callback: Arc<dyn Fn(T) + Send + Sync>,
    interval: Duration,
}

impl<T> ThrottleShared<T> {
    fn state(&self) -> MutexGuard<'_, ThrottleState<T>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn arm<T: Send + 'static>(shared: &Arc<ThrottleShared<T>>) {
    let weak: Weak<ThrottleShared<T>> = Arc::downgrade(shared);
    shared.scheduler.schedule(
        move || {
            if let Some(shared) = weak.upgrade() {
                close_window(&shared);
            }
        },
        shared.interval,
    );
}

fn close_window<T: Send + 'static>(shared: &Arc<ThrottleShared<T>>) {
    let trailing = {
        let mut state = shared.state();
        let trailing = state.trailing.take();
        if trailing.is_none() {
            state.open = false;
        }
        trailing
    };
    if let Some(value) = trailing {
        tracing::trace!("throttle: delivering trailing value");
        arm(shared);
        (shared.callback)(value);
    }
}

/// Runs a callback at most once per `interval`, keeping the latest
/// suppressed value for the end of the window.
///
/// Dropping the throttle discards the trailing value and disarms its timer.
pub struct Throttled<T> {
    shared: Arc<ThrottleShared<T>>,
}

impl<T> fmt::Debug for Throttled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throttled")
            .field("interval", &self.shared.interval)
            .field("open", &self.shared.state().open)
            .finish()
    }
}

impl<T: Send + 'static> Throttled<T> {
    /// Creates a throttle with a fixed window.
    pub fn new<F>(callback: F, interval: Duration) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(ThrottleShared {
                state: Mutex::new(ThrottleState {
                    open: false,
                    trailing: None,
                }),
                scheduler: DebounceScheduler::new(),
                callback: Arc::new(callback),
                interval,
            }),
        }
    }

    /// Delivers `value` now if no window is open and returns true.
    /// Otherwise keeps it as the trailing value and returns false.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn call(&self, value: T) -> bool {
        {
            let mut state = self.shared.state();
            if state.open {
                state.trailing = Some(value);
                return false;
            }
            state.open = true;
        }
        arm(&self.shared);
        (self.shared.callback)(value);
        true
    }

    /// Discards the trailing value and closes the window.
    ///
    /// Returns true if a window was open.
    pub fn cancel(&self) -> bool {
        let was_open = {
            let mut state = self.shared.state();
            state.trailing = None;
            std::mem::replace(&mut state.open, false)
        };
        self.shared.scheduler.cancel_pending();
        was_open
    }

    /// Returns true while calls are being held back.
    pub fn is_open(&self) -> bool {
        self.shared.state().open
    }

    /// The window length.
    pub fn interval(&self) -> Duration {
        self.shared.interval
    }
}
