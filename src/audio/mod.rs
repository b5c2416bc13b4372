//! Audio routing: output selection, ringing, SCO, GSM interruption
//!
//! Owns the mapping from logical audio intent to hardware state and hides
//! device retry quirks. The route state is shared with the SCO retry task and
//! therefore lives behind a mutex; everything else is touched only from the
//! orchestrator's event task.
//!
//! # Output preference
//!
//! When several outputs become available simultaneously the controller picks
//! wired headset over Bluetooth over speaker over earpiece — except that a
//! manual speaker choice made during an outgoing call is never overridden.

pub mod ringer;
pub mod sco;
pub mod volume;

pub use crate::platform::AudioOutputType;
pub use ringer::Ringer;
pub use sco::ScoNegotiator;
pub use volume::{MicrophoneStatus, VolumeModel};

use crate::engine::EngineControl;
use crate::platform::AudioPlatform;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Current audio-route facts
///
/// Mutated by the event task and by the SCO retry task; always behind the
/// controller's mutex.
#[derive(Debug, Clone)]
pub struct AudioRouteState {
    /// Output currently carrying call audio
    pub current: AudioOutputType,
    /// Outputs currently usable
    pub available: HashSet<AudioOutputType>,
    /// Observed Bluetooth SCO audio connection
    pub sco_connected: bool,
    /// Bluetooth headset profile connectivity
    pub headset_profile_connected: bool,
    /// Whether this controller muted the ring stream for a GSM call
    pub ring_muted_for_gsm: bool,
}

impl AudioRouteState {
    fn new() -> Self {
        let mut available = HashSet::new();
        available.insert(AudioOutputType::Phone);
        Self {
            current: AudioOutputType::Phone,
            available,
            sco_connected: false,
            headset_profile_connected: false,
            ring_muted_for_gsm: false,
        }
    }
}

fn preference_rank(output: AudioOutputType) -> u8 {
    match output {
        AudioOutputType::WiredHeadset => 3,
        AudioOutputType::Bluetooth => 2,
        AudioOutputType::Speaker => 1,
        AudioOutputType::Phone => 0,
    }
}

/// Owns audio-output selection, ringing, and GSM-interruption handling
pub struct AudioRoutingController {
    platform: Arc<dyn AudioPlatform>,
    engine: Arc<dyn EngineControl>,
    state: Arc<Mutex<AudioRouteState>>,
    ringer: Ringer,
    sco: ScoNegotiator,
    volume: VolumeModel,
    /// The current call is outgoing (set per call, cleared on call end)
    outgoing_call: bool,
    /// User explicitly chose the speaker during an outgoing call
    manual_speaker: bool,
}

impl AudioRoutingController {
    /// Create a controller routing to the earpiece
    pub fn new(
        platform: Arc<dyn AudioPlatform>,
        engine: Arc<dyn EngineControl>,
        sco_retry_interval: Duration,
        sco_retry_attempts: u32,
    ) -> Self {
        let state = Arc::new(Mutex::new(AudioRouteState::new()));
        Self {
            ringer: Ringer::new(platform.clone()),
            sco: ScoNegotiator::new(
                platform.clone(),
                state.clone(),
                sco_retry_interval,
                sco_retry_attempts,
            ),
            platform,
            engine,
            state,
            volume: VolumeModel::new(),
            outgoing_call: false,
            manual_speaker: false,
        }
    }

    /// Snapshot of the current route state
    pub fn route_state(&self) -> AudioRouteState {
        self.state.lock().clone()
    }

    /// Route call audio to the requested output
    ///
    /// Bluetooth requires headset-profile connectivity; without it the call
    /// is a warning-level no-op. SCO (de)activation short-circuits when the
    /// observed state already matches and otherwise runs the bounded retry
    /// task; callers never block on it. Returns whether the route actually
    /// changed, so callers broadcast at most once per change.
    pub fn set_route(&mut self, target: AudioOutputType) -> bool {
        if target == AudioOutputType::Bluetooth && !self.state.lock().headset_profile_connected {
            warn!("Bluetooth route requested without a connected headset profile");
            return false;
        }

        info!(target = ?target, "setting audio route");
        self.platform.set_output(target);
        self.sco.ensure(target == AudioOutputType::Bluetooth);
        let previous = {
            let mut state = self.state.lock();
            std::mem::replace(&mut state.current, target)
        };

        if target == AudioOutputType::Speaker && self.outgoing_call {
            self.manual_speaker = true;
        }
        previous != target
    }

    /// Pick the effective output for a candidate, honoring the preference
    /// order and a manual speaker choice
    pub fn select_audio_output(&self, candidate: AudioOutputType) -> AudioOutputType {
        let state = self.state.lock();
        if self.manual_speaker && state.current == AudioOutputType::Speaker {
            return AudioOutputType::Speaker;
        }
        state
            .available
            .iter()
            .copied()
            .chain(std::iter::once(candidate))
            .max_by_key(|o| preference_rank(*o))
            .unwrap_or(candidate)
    }

    /// React to the engine's audio-device-list-changed event
    ///
    /// Returns the effective output if the route changed.
    pub fn on_devices_changed(
        &mut self,
        available: Vec<AudioOutputType>,
        current: AudioOutputType,
    ) -> Option<AudioOutputType> {
        {
            let mut state = self.state.lock();
            state.available = available.into_iter().collect();
            state.available.insert(AudioOutputType::Phone);
        }
        let effective = self.select_audio_output(current);
        if effective != self.state.lock().current {
            self.set_route(effective);
            Some(effective)
        } else {
            None
        }
    }

    /// Wired headset plugged or unplugged
    pub fn on_wired_headset(&mut self, plugged: bool) -> Option<AudioOutputType> {
        let mut available: Vec<AudioOutputType> = {
            let state = self.state.lock();
            state.available.iter().copied().collect()
        };
        if plugged {
            if !available.contains(&AudioOutputType::WiredHeadset) {
                available.push(AudioOutputType::WiredHeadset);
            }
        } else {
            available.retain(|o| *o != AudioOutputType::WiredHeadset);
        }
        let fallback = if plugged {
            AudioOutputType::WiredHeadset
        } else {
            AudioOutputType::Phone
        };
        self.on_devices_changed(available, fallback)
    }

    /// Bluetooth headset profile connected or disconnected
    pub fn on_headset_profile(&mut self, connected: bool) -> Option<AudioOutputType> {
        self.state.lock().headset_profile_connected = connected;
        let mut available: Vec<AudioOutputType> = {
            let state = self.state.lock();
            state.available.iter().copied().collect()
        };
        if connected {
            if !available.contains(&AudioOutputType::Bluetooth) {
                available.push(AudioOutputType::Bluetooth);
            }
        } else {
            available.retain(|o| *o != AudioOutputType::Bluetooth);
            self.sco.ensure(false);
        }
        let fallback = if connected {
            AudioOutputType::Bluetooth
        } else {
            AudioOutputType::Phone
        };
        self.on_devices_changed(available, fallback)
    }

    /// Bluetooth adapter turned on or off
    pub fn on_bluetooth_adapter(&mut self, enabled: bool) -> Option<AudioOutputType> {
        if !enabled {
            // Losing the adapter implies losing the profile.
            self.on_headset_profile(false)
        } else {
            None
        }
    }

    /// Observed SCO audio state changed
    pub fn on_sco_audio_state(&mut self, connected: bool) {
        debug!(connected, "SCO audio state reported by host");
        self.state.lock().sco_connected = connected;
    }

    /// Start ringing (tone + vibration + ring focus); double-start guarded
    pub fn start_ringing(&mut self) {
        self.ringer.start();
    }

    /// Stop ringing
    pub fn stop_ringing(&mut self) {
        self.ringer.stop();
    }

    /// Whether the ringer is active
    pub fn is_ringing(&self) -> bool {
        self.ringer.is_ringing()
    }

    /// Handle a native GSM call interrupting (or releasing) the hardware
    ///
    /// While a GSM call is active and a VoIP call is ongoing, the ring stream
    /// is muted (recording that it needs unmuting) and the interruption tone
    /// plays in place of normal audio. On GSM-idle the stream is unmuted only
    /// if this controller muted it, and the paused VoIP call resumes.
    /// Idempotent across repeated events in either direction.
    pub async fn on_gsm_call(&mut self, active: bool, voip_call_active: bool) {
        if active {
            let should_mute = voip_call_active && !self.state.lock().ring_muted_for_gsm;
            if !should_mute {
                return;
            }
            info!("GSM call active during VoIP call, muting and pausing");
            self.state.lock().ring_muted_for_gsm = true;
            self.platform.set_ring_muted(true);
            self.platform.start_interruption_tone();
            self.engine.pause_call().await;
        } else {
            let was_muted = self.state.lock().ring_muted_for_gsm;
            if !was_muted {
                // Never blindly unmute: someone else may own the mute.
                return;
            }
            info!("GSM call ended, restoring VoIP audio");
            self.state.lock().ring_muted_for_gsm = false;
            self.platform.stop_interruption_tone();
            self.platform.set_ring_muted(false);
            self.engine.resume_call().await;
        }
    }

    /// Record the direction of the current call
    pub fn on_call_started(&mut self, outgoing: bool) {
        self.outgoing_call = outgoing;
        self.manual_speaker = false;
    }

    /// Reset per-call route decisions
    pub fn on_call_ended(&mut self) {
        self.stop_ringing();
        self.sco.ensure(false);
        self.outgoing_call = false;
        self.manual_speaker = false;
        self.set_microphone_disabled(false);
    }

    /// Cancel background work; part of the termination protocol
    pub fn shutdown(&mut self) {
        self.stop_ringing();
        self.sco.cancel();
    }

    /// Set playback volume from the UI slider and apply it
    pub fn set_playback_slider(&mut self, slider: i32) {
        self.volume.set_playback_slider(slider);
        self.platform.set_playback_gain_db(self.volume.playback_gain_db());
    }

    /// Set microphone volume from the UI slider and apply it
    pub fn set_microphone_slider(&mut self, slider: i32) {
        self.volume.set_microphone_slider(slider);
        self.platform
            .set_microphone_gain_db(self.volume.microphone_gain_db());
    }

    /// Record the user's mute choice and apply the effective status
    pub fn set_user_muted(&mut self, muted: bool) {
        self.volume.set_user_muted(muted);
        self.apply_microphone_status();
    }

    /// Apply or lift the call-phase microphone override
    ///
    /// Set during the pre-encryption handshake window so no audio leaks
    /// before the secure channel is confirmed.
    pub fn set_microphone_disabled(&mut self, disabled: bool) {
        self.volume.set_disabled(disabled);
        self.apply_microphone_status();
    }

    /// Effective microphone status
    pub fn microphone_status(&self) -> MicrophoneStatus {
        self.volume.microphone_status()
    }

    fn apply_microphone_status(&self) {
        let muted = self.volume.microphone_status() != MicrophoneStatus::On;
        self.platform.set_microphone_muted(muted);
    }
}
