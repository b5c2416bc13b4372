//! Volume and microphone model
//!
//! Gains are stored normalized in dB and converted through a piecewise-linear
//! mapping between the UI's 0–100 slider and a ±15 dB range, clamped at both
//! ends. The microphone is tri-state: `On`/`Muted` are user choices, while
//! `Disabled` is a stronger, call-phase-driven override used during the
//! pre-encryption handshake window to guarantee no audio leaks before the
//! secure channel is confirmed.

use serde::{Deserialize, Serialize};

/// Gain range covered by the UI slider
pub const MAX_GAIN_DB: f32 = 15.0;

/// Tri-state microphone status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MicrophoneStatus {
    /// Call-phase override: forced off regardless of the user's choice
    Disabled,
    /// User muted the microphone
    Muted,
    /// Microphone live
    On,
}

/// Map a UI slider position (0–100) to a gain in dB
///
/// Linear in two segments around the 0 dB midpoint at 50, clamped to
/// ±[`MAX_GAIN_DB`].
///
/// ```rust
/// use call_session_core::audio::volume::slider_to_gain_db;
/// assert_eq!(slider_to_gain_db(50), 0.0);
/// assert_eq!(slider_to_gain_db(100), 15.0);
/// assert_eq!(slider_to_gain_db(0), -15.0);
/// assert_eq!(slider_to_gain_db(200), 15.0);
/// ```
pub fn slider_to_gain_db(slider: i32) -> f32 {
    let slider = slider.clamp(0, 100) as f32;
    (slider - 50.0) / 50.0 * MAX_GAIN_DB
}

/// Map a gain in dB back to the UI slider position (0–100), clamped
pub fn gain_db_to_slider(db: f32) -> i32 {
    let db = db.clamp(-MAX_GAIN_DB, MAX_GAIN_DB);
    (db / MAX_GAIN_DB * 50.0 + 50.0).round() as i32
}

/// Stored gain and microphone state for the current call
#[derive(Debug, Clone)]
pub struct VolumeModel {
    playback_gain_db: f32,
    microphone_gain_db: f32,
    /// The user's standing choice, On or Muted
    user_muted: bool,
    /// The call-phase override, set during the pre-encryption window
    disabled: bool,
}

impl VolumeModel {
    /// Neutral gains, microphone on
    pub fn new() -> Self {
        Self {
            playback_gain_db: 0.0,
            microphone_gain_db: 0.0,
            user_muted: false,
            disabled: false,
        }
    }

    /// Set playback gain from the UI slider
    pub fn set_playback_slider(&mut self, slider: i32) {
        self.playback_gain_db = slider_to_gain_db(slider);
    }

    /// Set microphone gain from the UI slider
    pub fn set_microphone_slider(&mut self, slider: i32) {
        self.microphone_gain_db = slider_to_gain_db(slider);
    }

    /// Current playback gain in dB
    pub fn playback_gain_db(&self) -> f32 {
        self.playback_gain_db
    }

    /// Current microphone gain in dB
    pub fn microphone_gain_db(&self) -> f32 {
        self.microphone_gain_db
    }

    /// Record the user's mute choice; ignored while `Disabled` is in force
    /// only in the effective result, the choice itself is remembered
    pub fn set_user_muted(&mut self, muted: bool) {
        self.user_muted = muted;
    }

    /// Apply or lift the call-phase microphone override
    pub fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }

    /// The effective microphone status after applying the override
    pub fn microphone_status(&self) -> MicrophoneStatus {
        if self.disabled {
            MicrophoneStatus::Disabled
        } else if self.user_muted {
            MicrophoneStatus::Muted
        } else {
            MicrophoneStatus::On
        }
    }
}

impl Default for VolumeModel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slider_mapping_is_clamped_and_symmetric() {
        assert_eq!(slider_to_gain_db(-5), -15.0);
        assert_eq!(slider_to_gain_db(105), 15.0);
        assert_eq!(slider_to_gain_db(75), 7.5);
        assert_eq!(gain_db_to_slider(7.5), 75);
        assert_eq!(gain_db_to_slider(-30.0), 0);
        assert_eq!(gain_db_to_slider(0.0), 50);
    }

    #[test]
    fn disabled_overrides_user_choice() {
        let mut v = VolumeModel::new();
        assert_eq!(v.microphone_status(), MicrophoneStatus::On);

        v.set_disabled(true);
        v.set_user_muted(false);
        assert_eq!(v.microphone_status(), MicrophoneStatus::Disabled);

        // Lifting the override restores the remembered user choice.
        v.set_user_muted(true);
        v.set_disabled(false);
        assert_eq!(v.microphone_status(), MicrophoneStatus::Muted);
        v.set_user_muted(false);
        assert_eq!(v.microphone_status(), MicrophoneStatus::On);
    }
}
