//! Wake-lock discipline
//!
//! A CPU partial wake lock and a Wi-Fi high-performance lock are held
//! whenever a call is active or an external push woke the process, and
//! released only when no reason remains. The proximity-screen-off lock is
//! call-scoped: it is held exactly while the call reason is present, and
//! only on platforms that report the capability. Acquire and release are
//! idempotent against the tracked held status, so repeated triggers from
//! either side never unbalance the platform locks.

use crate::platform::{WakeLockKind, WakeLockProvider};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Why the process currently needs to stay awake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WakeReason {
    /// A call is active
    Call,
    /// An external push woke the process and work is still pending
    Push,
}

/// Idempotent holder of the CPU, Wi-Fi, and proximity locks
pub struct WakeLocks {
    provider: Arc<dyn WakeLockProvider>,
    reasons: HashSet<WakeReason>,
    cpu_held: bool,
    wifi_held: bool,
    proximity_held: bool,
}

impl WakeLocks {
    /// Create with no locks held
    pub fn new(provider: Arc<dyn WakeLockProvider>) -> Self {
        Self {
            provider,
            reasons: HashSet::new(),
            cpu_held: false,
            wifi_held: false,
            proximity_held: false,
        }
    }

    /// Record a wake reason and make sure the locks are held
    ///
    /// The call reason additionally takes the proximity lock on platforms
    /// that support it, turning the screen off near the ear.
    pub fn acquire_for(&mut self, reason: WakeReason) {
        self.reasons.insert(reason);
        if !self.cpu_held {
            self.provider.acquire(WakeLockKind::Cpu);
            self.cpu_held = true;
            debug!("CPU wake lock acquired");
        }
        if !self.wifi_held {
            self.provider.acquire(WakeLockKind::Wifi);
            self.wifi_held = true;
            debug!("Wi-Fi lock acquired");
        }
        if reason == WakeReason::Call
            && !self.proximity_held
            && self.provider.supports_proximity()
        {
            self.provider.acquire(WakeLockKind::Proximity);
            self.proximity_held = true;
            debug!("proximity lock acquired");
        }
    }

    /// Drop a wake reason; the locks are released once no reason remains
    ///
    /// The proximity lock goes as soon as the call reason goes, even while a
    /// push still holds the CPU and Wi-Fi locks. Releasing an unheld lock or
    /// an unknown reason is a silent no-op.
    pub fn release_for(&mut self, reason: WakeReason) {
        self.reasons.remove(&reason);
        if !self.reasons.contains(&WakeReason::Call) {
            self.release_proximity(false);
        }
        if self.reasons.is_empty() {
            self.release_all(false);
        }
    }

    /// Release everything regardless of remaining reasons (termination path)
    pub fn release_all(&mut self, immediate: bool) {
        self.reasons.clear();
        self.release_proximity(immediate);
        if self.cpu_held {
            self.provider.release(WakeLockKind::Cpu, immediate);
            self.cpu_held = false;
            debug!("CPU wake lock released");
        }
        if self.wifi_held {
            self.provider.release(WakeLockKind::Wifi, immediate);
            self.wifi_held = false;
            debug!("Wi-Fi lock released");
        }
    }

    fn release_proximity(&mut self, immediate: bool) {
        if self.proximity_held {
            self.provider.release(WakeLockKind::Proximity, immediate);
            self.proximity_held = false;
            debug!("proximity lock released");
        }
    }

    /// Whether any lock is currently held
    pub fn is_held(&self) -> bool {
        self.cpu_held || self.wifi_held || self.proximity_held
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::NullWakeLockProvider;
    use parking_lot::Mutex;

    struct CountingProvider {
        acquires: Mutex<u32>,
        releases: Mutex<u32>,
    }

    impl WakeLockProvider for CountingProvider {
        fn supports_proximity(&self) -> bool {
            false
        }
        fn acquire(&self, _kind: WakeLockKind) {
            *self.acquires.lock() += 1;
        }
        fn release(&self, _kind: WakeLockKind, _immediate: bool) {
            *self.releases.lock() += 1;
        }
    }

    #[test]
    fn acquire_release_pairs_are_balanced() {
        let provider = Arc::new(CountingProvider {
            acquires: Mutex::new(0),
            releases: Mutex::new(0),
        });
        let mut locks = WakeLocks::new(provider.clone());

        // N acquires collapse to one platform acquire per lock kind.
        locks.acquire_for(WakeReason::Call);
        locks.acquire_for(WakeReason::Call);
        locks.acquire_for(WakeReason::Push);
        assert!(locks.is_held());
        assert_eq!(*provider.acquires.lock(), 2); // cpu + wifi

        locks.release_for(WakeReason::Push);
        assert!(locks.is_held(), "call reason still pending");

        locks.release_for(WakeReason::Call);
        assert!(!locks.is_held());
        assert_eq!(*provider.releases.lock(), 2);

        // Extra releases on an unheld lock are ignored without error.
        locks.release_for(WakeReason::Call);
        locks.release_all(true);
        assert_eq!(*provider.releases.lock(), 2);
    }

    #[test]
    fn proximity_follows_the_call_reason() {
        struct ProximityProvider {
            acquired: Mutex<Vec<WakeLockKind>>,
            released: Mutex<Vec<WakeLockKind>>,
        }

        impl WakeLockProvider for ProximityProvider {
            fn supports_proximity(&self) -> bool {
                true
            }
            fn acquire(&self, kind: WakeLockKind) {
                self.acquired.lock().push(kind);
            }
            fn release(&self, kind: WakeLockKind, _immediate: bool) {
                self.released.lock().push(kind);
            }
        }

        let provider = Arc::new(ProximityProvider {
            acquired: Mutex::new(Vec::new()),
            released: Mutex::new(Vec::new()),
        });
        let mut locks = WakeLocks::new(provider.clone());

        // A push alone never darkens the screen.
        locks.acquire_for(WakeReason::Push);
        assert!(!provider.acquired.lock().contains(&WakeLockKind::Proximity));

        locks.acquire_for(WakeReason::Call);
        assert!(provider.acquired.lock().contains(&WakeLockKind::Proximity));

        // Call over, push pending: proximity goes, CPU and Wi-Fi stay.
        locks.release_for(WakeReason::Call);
        assert_eq!(*provider.released.lock(), [WakeLockKind::Proximity]);
        assert!(locks.is_held());

        locks.release_for(WakeReason::Push);
        assert!(!locks.is_held());
        assert_eq!(provider.released.lock().len(), 3);
    }

    #[test]
    fn null_provider_reports_no_proximity() {
        let provider = Arc::new(NullWakeLockProvider);
        assert!(!provider.supports_proximity());
        let mut locks = WakeLocks::new(provider);
        locks.acquire_for(WakeReason::Call);
        assert!(locks.is_held());
    }
}
