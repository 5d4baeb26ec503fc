//! Explicit observer registration for view state.
//!
//! A [`Subject`] holds a value and notifies subscribed listeners when it
//! changes. Derived computations subscribe and re-run in their listener, so
//! they stay consistent after every change without implicit dependency
//! tracking.

pub mod watch;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

pub use watch::{debounced_watch, WatchHandle, WatchOptions};

type Listener<T> = Arc<dyn Fn(&T, &T) + Send + Sync>;

struct Registration<T> {
    id: u64,
    deep: bool,
    listener: Listener<T>,
}

struct SubjectInner<T> {
    value: T,
    next_id: u64,
    listeners: Vec<Registration<T>>,
}

/// Observable value shared by clones.
pub struct Subject<T> {
    inner: Arc<Mutex<SubjectInner<T>>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Subject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("Subject")
            .field("value", &inner.value)
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}

impl<T: Default + Clone + PartialEq + Send + 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T: Clone + PartialEq + Send + 'static> Subject<T> {
    /// Creates a subject holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SubjectInner {
                value,
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }

    /// Returns a copy of the current value.
    pub fn get(&self) -> T {
        lock(&self.inner).value.clone()
    }

    /// Reads the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&lock(&self.inner).value)
    }

    /// Replaces the value. Listeners run if the value changed.
    pub fn set(&self, value: T) {
        self.update(|current| *current = value);
    }

    /// Mutates the value in place. All listeners run if the result differs
    /// from the previous value.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let notification = {
            let mut inner = lock(&self.inner);
            let old = inner.value.clone();
            f(&mut inner.value);
            if inner.value == old {
                None
            } else {
                Some((inner.value.clone(), old, inner.listeners_for(false)))
            }
        };
        if let Some((new, old, listeners)) = notification {
            for listener in listeners {
                listener(&new, &old);
            }
        }
    }

    /// Mutates the value in place without comparing. Only deep listeners run.
    pub fn modify(&self, f: impl FnOnce(&mut T)) {
        let (new, old, listeners) = {
            let mut inner = lock(&self.inner);
            let old = inner.value.clone();
            f(&mut inner.value);
            (inner.value.clone(), old, inner.listeners_for(true))
        };
        for listener in listeners {
            listener(&new, &old);
        }
    }

    /// Registers a listener for replacements. Called with `(new, old)`.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T, &T) + Send + Sync + 'static,
    {
        self.register(false, Arc::new(listener))
    }

    /// Registers a listener that also sees in-place [`Subject::modify`] calls.
    pub fn subscribe_deep<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T, &T) + Send + Sync + 'static,
    {
        self.register(true, Arc::new(listener))
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        lock(&self.inner).listeners.len()
    }

    fn register(&self, deep: bool, listener: Listener<T>) -> Subscription {
        let id = {
            let mut inner = lock(&self.inner);
            let id = inner.next_id;
            inner.next_id += 1;
            inner.listeners.push(Registration { id, deep, listener });
            id
        };

        let weak: Weak<Mutex<SubjectInner<T>>> = Arc::downgrade(&self.inner);
        Subscription {
            detach: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    lock(&inner).listeners.retain(|r| r.id != id);
                }
            })),
        }
    }
}

impl<T> SubjectInner<T> {
    fn listeners_for(&self, deep_only: bool) -> Vec<Listener<T>> {
        self.listeners
            .iter()
            .filter(|r| !deep_only || r.deep)
            .map(|r| Arc::clone(&r.listener))
            .collect()
    }
}

/// Handle to a registered listener. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Removes the listener.
    pub fn unsubscribe(mut self) {
        self.detach_now();
    }

    /// Keeps the listener registered for the lifetime of the subject.
    pub fn forget(mut self) {
        self.detach = None;
    }

    fn detach_now(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.detach.is_some())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach_now();
    }
}
