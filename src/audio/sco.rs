//! Bluetooth SCO negotiation
//!
//! The OS's own SCO state callback is unreliable immediately after a request,
//! so a request is followed by a bounded re-check loop: toggle, wait 200 ms,
//! re-check the observed state, up to 10 attempts, then give up silently.
//! Callers never block on the outcome; on failure audio stays on the previous
//! route.
//!
//! The loop runs as a cancellable task, not a sleeping thread; it is the one
//! place outside the event task that mutates [`super::AudioRouteState`],
//! which is why that state lives behind a mutex.

use super::AudioRouteState;
use crate::platform::AudioPlatform;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Drives the SCO link towards a desired state with bounded retries
pub struct ScoNegotiator {
    platform: Arc<dyn AudioPlatform>,
    route_state: Arc<Mutex<AudioRouteState>>,
    retry_interval: Duration,
    retry_attempts: u32,
    task: Option<JoinHandle<()>>,
}

impl ScoNegotiator {
    /// Create a negotiator with the given retry budget
    pub fn new(
        platform: Arc<dyn AudioPlatform>,
        route_state: Arc<Mutex<AudioRouteState>>,
        retry_interval: Duration,
        retry_attempts: u32,
    ) -> Self {
        Self {
            platform,
            route_state,
            retry_interval,
            retry_attempts,
            task: None,
        }
    }

    /// Bring the SCO link to the desired state
    ///
    /// Short-circuits with zero OS calls when the observed state already
    /// matches. Otherwise cancels any in-flight negotiation and spawns a new
    /// bounded-retry task.
    pub fn ensure(&mut self, enabled: bool) {
        if self.platform.sco_active() == enabled {
            debug!(enabled, "SCO already in requested state");
            self.route_state.lock().sco_connected = enabled;
            return;
        }

        self.cancel();

        let platform = self.platform.clone();
        let route_state = self.route_state.clone();
        let interval = self.retry_interval;
        let attempts = self.retry_attempts;
        self.task = Some(tokio::spawn(async move {
            for attempt in 1..=attempts {
                platform.request_sco(enabled);
                tokio::time::sleep(interval).await;
                if platform.sco_active() == enabled {
                    debug!(enabled, attempt, "SCO reached requested state");
                    route_state.lock().sco_connected = enabled;
                    return;
                }
            }
            // Give up silently: callers must not block on SCO, and the
            // previous route stays in effect.
            warn!(enabled, attempts, "SCO never confirmed, giving up");
        }));
    }

    /// Cancel any in-flight negotiation
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ScoNegotiator {
    fn drop(&mut self) {
        self.cancel();
    }
}
