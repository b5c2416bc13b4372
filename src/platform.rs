//! Host-platform capability seams
//!
//! This crate never talks to OS audio, vibration, or power facilities
//! directly; it drives them through the traits here. Platform crates (or the
//! mock implementations in the tests) provide the actual hardware access.

use serde::{Deserialize, Serialize};

/// Logical audio output routes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AudioOutputType {
    /// Built-in earpiece
    Phone,
    /// Wired headset
    WiredHeadset,
    /// Loudspeaker
    Speaker,
    /// Bluetooth SCO link
    Bluetooth,
}

/// Native telephony call state reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NativeCallState {
    Idle,
    Ringing,
    OffHook,
}

impl NativeCallState {
    /// Whether a native GSM call currently occupies the audio hardware
    pub fn is_active(&self) -> bool {
        !matches!(self, NativeCallState::Idle)
    }
}

/// OS-level audio facilities the routing controller drives
///
/// All methods are thin, synchronous wrappers around platform calls; none may
/// block. State-returning methods report the *observed* hardware state, which
/// for Bluetooth SCO can lag behind requests (hence the retry loop in
/// [`crate::audio::sco`]).
pub trait AudioPlatform: Send + Sync {
    /// Route call audio to the given output
    fn set_output(&self, output: AudioOutputType);

    /// Request the SCO link on or off; completion is asynchronous and
    /// unreliable, observe via [`AudioPlatform::sco_active`]
    fn request_sco(&self, enabled: bool);

    /// Observed SCO audio state
    fn sco_active(&self) -> bool;

    /// Mute or unmute the ring stream
    fn set_ring_muted(&self, muted: bool);

    /// Acquire transient audio focus on the ring stream; `true` if granted
    fn request_ring_focus(&self) -> bool;

    /// Release previously granted ring-stream focus
    fn abandon_ring_focus(&self);

    /// Start the looping ringtone
    fn start_ringtone(&self);

    /// Stop the ringtone
    fn stop_ringtone(&self);

    /// Start vibrating with the given pattern (leading pause, then on/off
    /// millisecond pairs), repeated until stopped
    fn start_vibration(&self, pattern: &[u64]);

    /// Stop vibrating
    fn stop_vibration(&self);

    /// Play the GSM-interruption tone in place of normal call audio
    fn start_interruption_tone(&self);

    /// Stop the interruption tone
    fn stop_interruption_tone(&self);

    /// Apply a playback gain in dB
    fn set_playback_gain_db(&self, db: f32);

    /// Apply a microphone gain in dB
    fn set_microphone_gain_db(&self, db: f32);

    /// Hard-mute the microphone at the platform level
    fn set_microphone_muted(&self, muted: bool);
}

/// Kinds of wake locks the orchestrator holds during calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WakeLockKind {
    /// CPU partial wake lock
    Cpu,
    /// Wi-Fi high-performance lock
    Wifi,
    /// Proximity-screen-off lock; availability is capability-checked
    Proximity,
}

/// Capability-checked wake-lock access
///
/// One provider per lock kind, selected once at startup; a platform without a
/// given capability supplies [`NullWakeLockProvider`]. No runtime probing.
pub trait WakeLockProvider: Send + Sync {
    /// Whether the proximity lock is supported at all
    fn supports_proximity(&self) -> bool;

    /// Acquire the lock
    fn acquire(&self, kind: WakeLockKind);

    /// Release the lock; `immediate` skips any platform-side grace period
    fn release(&self, kind: WakeLockKind, immediate: bool);
}

/// Fallback provider for platforms without wake-lock support
#[derive(Debug, Default)]
pub struct NullWakeLockProvider;

impl WakeLockProvider for NullWakeLockProvider {
    fn supports_proximity(&self) -> bool {
        false
    }

    fn acquire(&self, _kind: WakeLockKind) {}

    fn release(&self, _kind: WakeLockKind, _immediate: bool) {}
}
