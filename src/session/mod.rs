//! Call-session data model
//!
//! One logical call, owned by the [`state_machine::CallSessionStateMachine`]
//! and mutated exclusively by the engine-event pipeline on the orchestrator's
//! event task. The session is created empty at process start, reset to empty
//! when the engine signals a brand-new call, and never deleted.
//!
//! # Invariants
//!
//! - The end reason, once set to a non-`None` value, is never overwritten
//!   until the session resets.
//! - The GUI call state is a pure function of (previous GUI state, new engine
//!   state, end reason, video flag) — never of wall-clock time except for
//!   start-time bookkeeping.
//! - A "new call started" transition resets every field except the remote
//!   identity being assigned.

pub mod state_machine;

pub use state_machine::CallSessionStateMachine;

use crate::engine::EngineCallState;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Coarse, user-facing phase of a call
///
/// Derived from the finer normalized engine states; consumed by UI and
/// notification renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GuiCallState {
    /// No information yet, or a malformed engine callback degraded here
    Unknown,
    /// A call has just started and is reaching the signaling server
    ConnectingToServer,
    /// Outgoing call is being routed towards the contact
    WaitingForContact,
    /// Outgoing call is ringing at the remote end
    Ringing,
    /// Media is connected but the secure channel is not confirmed yet
    Encrypting,
    /// Encrypted media is flowing
    Talking,
    /// The call has ended
    Ended,
}

impl GuiCallState {
    /// Whether a call is in progress from the user's point of view
    pub fn is_active(&self) -> bool {
        !matches!(self, GuiCallState::Unknown | GuiCallState::Ended)
    }
}

/// Why a call ended
///
/// Purely informational: drives notification text only, never control flow
/// beyond display. Write-once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallEndReason {
    /// No end reason recorded (the session default)
    None,
    /// The remote side declined the call
    Declined,
    /// The remote side is not reachable
    RemoteOffline,
    /// Media negotiation failed, e.g. a video call to an audio-only client
    UnsupportedMedia,
    /// The remote side is busy
    Busy,
    /// The connection attempt to the signaling server silently stalled
    ServerConnectionTimeout,
}

/// Call quality bucket with an "unknown" bottom value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkQuality {
    /// Not enough samples yet
    Unknown,
    Good,
    Average,
    Poor,
    VeryPoor,
}

impl NetworkQuality {
    /// Bucket a 0.0..=5.0 engine quality rating
    pub fn from_rating(rating: f32) -> Self {
        if rating < 0.0 {
            NetworkQuality::Unknown
        } else if rating >= 4.0 {
            NetworkQuality::Good
        } else if rating >= 3.0 {
            NetworkQuality::Average
        } else if rating >= 2.0 {
            NetworkQuality::Poor
        } else {
            NetworkQuality::VeryPoor
        }
    }
}

/// Video sub-state derived from local/remote video flags and connectivity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoState {
    /// No video on either side
    Off,
    /// Local side asked to enable video, waiting for the remote answer
    Requesting,
    /// Remote side asked to enable video, waiting for the local answer
    RemoteRequested,
    /// The remote side accepted our video request
    Accepted,
    /// The remote side answered our video request without video
    Denied,
    /// Both sides enabled video; waiting for a usable media path
    Initializing,
    /// Video is flowing
    Playing,
}

/// One logical call
///
/// Fields are only read through the state machine's accessors; mutation goes
/// through [`CallSessionStateMachine`] so the invariants above hold.
#[derive(Debug, Clone)]
pub struct CallSession {
    /// Remote identity (opaque string id)
    pub remote_id: String,
    /// Last normalized engine call state
    pub engine_state: EngineCallState,
    /// Derived GUI call state
    pub gui_state: GuiCallState,
    /// Call-end reason, write-once-non-None
    pub end_reason: CallEndReason,
    /// Authentication token of the encrypted channel, if any
    pub auth_token: Option<String>,
    /// Whether the authentication token was verified by the user before
    pub auth_token_verified: bool,
    /// Last reported quality bucket
    pub quality: NetworkQuality,
    /// Monotonic call start; `None` = unset
    pub call_start: Option<Instant>,
    /// Local side requested video
    pub video_requested: bool,
    /// Video is enabled on this call
    pub video_enabled: bool,
    /// Derived video sub-state
    pub video_state: VideoState,
}

impl CallSession {
    /// Create the empty session that exists from process start
    pub fn empty() -> Self {
        Self {
            remote_id: String::new(),
            engine_state: EngineCallState::Idle,
            gui_state: GuiCallState::Unknown,
            end_reason: CallEndReason::None,
            auth_token: None,
            auth_token_verified: false,
            quality: NetworkQuality::Unknown,
            call_start: None,
            video_requested: false,
            video_enabled: false,
            video_state: VideoState::Off,
        }
    }

    /// Reset every field except the remote identity being assigned
    ///
    /// This is the "new call started" transition of the data model.
    pub(crate) fn reset_for_new_call(&mut self, remote_id: &str) {
        let id = remote_id.to_string();
        *self = Self::empty();
        self.remote_id = id;
    }

    /// Seconds since call start, if the call has started
    pub fn duration_secs(&self) -> Option<u64> {
        self.call_start.map(|s| s.elapsed().as_secs())
    }
}

impl Default for CallSession {
    fn default() -> Self {
        Self::empty()
    }
}
