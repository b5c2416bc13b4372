//! Ringing: tone, vibration, and ring-stream audio focus
//!
//! Start/stop pairs are guarded with held-state booleans so repeated triggers
//! (e.g. duplicate incoming-call callbacks) never double-start the tone or
//! leak an audio-focus grant.

use crate::platform::AudioPlatform;
use std::sync::Arc;
use tracing::{debug, warn};

/// Vibration timing contract: no leading pause, 1 s on, 1 s off, repeated
pub const VIBRATE_PATTERN: [u64; 3] = [0, 1000, 1000];

/// Ringtone + vibration driver
pub struct Ringer {
    platform: Arc<dyn AudioPlatform>,
    ringing: bool,
    focus_held: bool,
}

impl Ringer {
    /// Create a silent ringer over the given platform
    pub fn new(platform: Arc<dyn AudioPlatform>) -> Self {
        Self {
            platform,
            ringing: false,
            focus_held: false,
        }
    }

    /// Start the looping ringtone and vibration
    ///
    /// Idempotent: a second start while ringing is a no-op. Audio focus is
    /// requested at most once and tracked so abandon only happens when held.
    pub fn start(&mut self) {
        if self.ringing {
            debug!("already ringing, ignoring start");
            return;
        }
        if !self.focus_held {
            if self.platform.request_ring_focus() {
                self.focus_held = true;
            } else {
                warn!("ring-stream audio focus denied, ringing without focus");
            }
        }
        self.platform.start_ringtone();
        self.platform.start_vibration(&VIBRATE_PATTERN);
        self.ringing = true;
    }

    /// Stop ringtone and vibration, release focus if held
    pub fn stop(&mut self) {
        if !self.ringing {
            return;
        }
        self.platform.stop_ringtone();
        self.platform.stop_vibration();
        if self.focus_held {
            self.platform.abandon_ring_focus();
            self.focus_held = false;
        }
        self.ringing = false;
    }

    /// Whether the ringer is currently active
    pub fn is_ringing(&self) -> bool {
        self.ringing
    }
}
