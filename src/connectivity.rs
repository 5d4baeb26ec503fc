//! Online/offline signal from the host environment.

use std::sync::atomic::{AtomicBool, Ordering};

/// Reports whether the host currently has network connectivity.
pub trait Connectivity: Send + Sync {
    /// Returns true while the host is online.
    fn is_online(&self) -> bool;
}

/// Connectivity that never reports offline.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Host-driven online flag.
///
/// The embedding environment calls [`OnlineStatus::set_online`] from its
/// online/offline events.
#[derive(Debug)]
pub struct OnlineStatus {
    online: AtomicBool,
}

impl Default for OnlineStatus {
    fn default() -> Self {
        Self::new(true)
    }
}

impl OnlineStatus {
    /// Creates a status with the given initial value.
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    /// Updates the flag.
    pub fn set_online(&self, online: bool) {
        let was = self.online.swap(online, Ordering::SeqCst);
        if was != online {
            tracing::debug!(online, "connectivity changed");
        }
    }
}

impl Connectivity for OnlineStatus {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_online_status_toggles() {
        let status = OnlineStatus::default();
        assert!(status.is_online());
        status.set_online(false);
        assert!(!status.is_online());
        status.set_online(true);
        assert!(status.is_online());
    }

    #[test]
    fn test_always_online() {
        assert!(AlwaysOnline.is_online());
    }
}
