//! Debounced observation of a [`Subject`].

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{Subject, Subscription};
use crate::schedule::Debounced;

/// Options for [`debounced_watch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Run the callback once with the current value at registration.
    pub immediate: bool,
    /// Also react to in-place [`Subject::modify`] mutations.
    pub deep: bool,
}

impl WatchOptions {
    /// Options with `immediate` set.
    pub fn immediate() -> Self {
        Self {
            immediate: true,
            ..Self::default()
        }
    }

    /// Options with `deep` set.
    pub fn deep() -> Self {
        Self {
            deep: true,
            ..Self::default()
        }
    }
}

struct WatchParts {
    subscription: Subscription,
    cancel: Box<dyn FnOnce() + Send>,
    on_stop: Option<Box<dyn FnOnce() + Send>>,
}

/// Active debounced watch. Dropping or stopping it detaches the listener and
/// discards any pending delivery.
pub struct WatchHandle {
    parts: Arc<Mutex<Option<WatchParts>>>,
}

fn lock(parts: &Mutex<Option<WatchParts>>) -> MutexGuard<'_, Option<WatchParts>> {
    parts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn stop_parts(parts: &Mutex<Option<WatchParts>>) -> bool {
    let taken = lock(parts).take();
    match taken {
        Some(parts) => {
            parts.subscription.unsubscribe();
            (parts.cancel)();
            if let Some(on_stop) = parts.on_stop {
                on_stop();
            }
            true
        }
        None => false,
    }
}

impl WatchHandle {
    /// Stops the watch. Returns false if it was already stopped.
    pub fn stop(&self) -> bool {
        stop_parts(&self.parts)
    }

    /// Returns true until the watch is stopped.
    pub fn is_active(&self) -> bool {
        lock(&self.parts).is_some()
    }

    /// Runs `hook` once the watch stops, however it stops. Runs it now if
    /// the watch is already stopped.
    pub(crate) fn on_stop<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut guard = lock(&self.parts);
        if let Some(parts) = guard.as_mut() {
            parts.on_stop = Some(Box::new(hook));
            return;
        }
        drop(guard);
        hook();
    }

    /// A hook that stops this watch, for teardown registries.
    pub(crate) fn stop_hook(&self) -> impl FnOnce() + Send + 'static {
        let parts = Arc::clone(&self.parts);
        move || {
            stop_parts(&parts);
        }
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Watches `source`, delivering changes to `callback` after `delay` of quiet.
///
/// The callback receives `(new, old)`, where `old` is the value before the
/// first change of the burst. With `immediate`, it also runs right away with
/// the current value and `old = None`.
pub fn debounced_watch<T, F>(
    source: &Subject<T>,
    callback: F,
    delay: Duration,
    options: WatchOptions,
) -> WatchHandle
where
    T: Clone + PartialEq + Send + Sync + 'static,
    F: Fn(&T, Option<&T>) + Send + Sync + 'static,
{
    let callback = Arc::new(callback);
    if options.immediate {
        let current = source.get();
        callback(&current, None);
    }

    let burst_old: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));

    let deliver_old = Arc::clone(&burst_old);
    let debounced = Arc::new(Debounced::new(
        move |new: T| {
            let old = deliver_old
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take();
            callback(&new, old.as_ref());
        },
        delay,
    ));

    let pending = Arc::clone(&debounced);
    let listener = move |new: &T, old: &T| {
        burst_old
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get_or_insert_with(|| old.clone());
        pending.call(new.clone());
    };
    let subscription = if options.deep {
        source.subscribe_deep(listener)
    } else {
        source.subscribe(listener)
    };

    let cancel: Box<dyn FnOnce() + Send> = Box::new(move || {
        debounced.cancel();
    });
    WatchHandle {
        parts: Arc::new(Mutex::new(Some(WatchParts {
            subscription,
            cancel,
            on_stop: None,
        }))),
    }
}
