//! Engine-event adapter
//!
//! Translates engine-specific call/registration/video callbacks into the
//! stable, engine-agnostic vocabulary used by the rest of the crate, and
//! papers over engine quirks:
//!
//! - The underlying engine emits several distinct terminal codes (`End`,
//!   `Error`, `Released`) that are behaviorally identical to callers; once no
//!   active calls remain they collapse to a single [`EngineCallState::CallEnded`].
//! - The engine may auto-apply a remote media update before the next
//!   scheduling point, so producing [`VideoState::RemoteRequested`] defers the
//!   engine's automatic acceptance synchronously, before the adapter returns.
//!
//! The adapter is the only component that sees raw engine states; everything
//! downstream works on [`EngineCallState`] and its predicates.

use crate::error::CoreResult;
use crate::session::VideoState;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Call state exactly as reported by the VoIP engine
///
/// This is the engine's own vocabulary; nothing outside this module should
/// match on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RawCallState {
    Idle,
    IncomingReceived,
    IncomingEarlyMedia,
    OutgoingInit,
    OutgoingProgress,
    OutgoingRinging,
    OutgoingEarlyMedia,
    Connected,
    StreamsRunning,
    Pausing,
    Paused,
    Resuming,
    PausedByRemote,
    Updating,
    UpdatedByRemote,
    Referred,
    Error,
    End,
    Released,
}

impl RawCallState {
    /// The terminal/error family the engine reports interchangeably
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            RawCallState::Error | RawCallState::End | RawCallState::Released
        )
    }
}

/// Normalized, engine-agnostic call state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineCallState {
    /// No call was ever started on this session
    Idle,
    /// An incoming call was received
    IncomingCall,
    /// An outgoing call was just initiated
    OutgoingInit,
    /// Outgoing call is progressing towards the remote end
    OutgoingConnecting,
    /// Outgoing call is ringing remotely
    OutgoingRinging,
    /// Media path connected, encryption handshake pending
    Connected,
    /// Media streams are running
    Talking,
    /// Call paused locally
    Paused,
    /// Call paused by the remote side
    PausedByRemote,
    /// Call resuming from pause
    Resuming,
    /// One of the terminal engine codes while other calls remain active
    Ending,
    /// The call ended and no active calls remain (collapsed terminal value)
    CallEnded,
}

impl EngineCallState {
    /// A brand-new call just started (incoming or outgoing)
    pub fn is_new_call_just_started(&self) -> bool {
        matches!(
            self,
            EngineCallState::IncomingCall | EngineCallState::OutgoingInit
        )
    }

    /// The possible call-ended family
    pub fn is_possible_call_ended(&self) -> bool {
        matches!(
            self,
            EngineCallState::CallEnded | EngineCallState::Ending
        )
    }

    /// Outgoing call still being routed
    pub fn is_outgoing_connecting(&self) -> bool {
        matches!(self, EngineCallState::OutgoingConnecting)
    }

    /// Outgoing call ringing remotely
    pub fn is_outgoing_ringing(&self) -> bool {
        matches!(self, EngineCallState::OutgoingRinging)
    }

    /// Connected but the secure channel is not confirmed yet
    pub fn is_before_encryption(&self) -> bool {
        matches!(self, EngineCallState::Connected)
    }

    /// Stable running state with media flowing
    pub fn is_talking(&self) -> bool {
        matches!(self, EngineCallState::Talking)
    }
}

/// Normalized registration state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistrationState {
    /// No registration attempted yet
    None,
    /// REGISTER in flight
    InProgress,
    /// Registered with the signaling server
    Ok,
    /// Registration failed
    Failed,
    /// Registration was cleared (unregistered)
    Cleared,
}

/// ICE connectivity state of the media path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IceState {
    NotActivated,
    InProgress,
    Connected,
    Completed,
    Failed,
}

impl IceState {
    /// Whether a usable media path has been confirmed
    pub fn is_established(&self) -> bool {
        matches!(self, IceState::Connected | IceState::Completed)
    }
}

/// Media stream kind for statistics callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamType {
    Audio,
    Video,
}

/// Typed events published by the engine onto the orchestrator's channel
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Registration state changed
    RegistrationStateChanged { state: RegistrationState },
    /// Call state changed
    CallStateChanged {
        /// Remote identity (may be empty on some terminal callbacks)
        remote_id: String,
        /// Raw engine state
        state: RawCallState,
        /// Whether any calls remain active after this change
        has_active_calls: bool,
        /// End reason derived from the engine's reason code
        end_reason: crate::session::CallEndReason,
        /// Whether video is enabled on this call
        video_enabled: bool,
        /// Whether the remote side has video enabled
        remote_video_enabled: bool,
        /// Human-readable engine message, for logs only
        message: String,
    },
    /// Periodic call statistics sample
    CallStatsUpdated {
        stream: StreamType,
        details: crate::quality::CallConnectionDetails,
        /// Call duration as reported by the engine, in seconds
        duration_secs: u64,
    },
    /// Encryption handshake completed or changed
    CallEncryptionChanged {
        token: Option<String>,
        verified: bool,
    },
    /// The set of usable audio devices changed
    AudioDevicesChanged {
        available: Vec<crate::audio::AudioOutputType>,
        current: crate::audio::AudioOutputType,
    },
}

/// Control surface of the external VoIP engine
///
/// The media plane is entirely the engine's business; this trait is the narrow
/// seam the orchestrator drives it through. Implementations must be cheap to
/// call from the event task.
#[async_trait::async_trait]
pub trait EngineControl: Send + Sync {
    /// Pump the engine's internal callbacks; scheduled every ~20 ms from the
    /// event loop and must never be starved
    async fn iterate(&self);

    /// Register with the signaling server
    async fn register(&self, account_id: &str, password_hash: &str, domain: &str) -> CoreResult<()>;

    /// Refresh the current registration (keep-alive)
    async fn refresh_registration(&self) -> CoreResult<()>;

    /// Request unregistration; completion is reported through
    /// [`EngineEvent::RegistrationStateChanged`] with [`RegistrationState::Cleared`]
    async fn unregister(&self) -> CoreResult<()>;

    /// Release all engine resources; final step of the termination protocol
    async fn release(&self);

    /// Pause the current call (GSM interruption)
    async fn pause_call(&self);

    /// Resume a previously paused call
    async fn resume_call(&self);

    /// Ask the remote side to enable video on the current call
    async fn request_video(&self);

    /// Accept or decline a pending remote media update
    async fn accept_video_update(&self, accept: bool);

    /// Suspend the engine's automatic media-update acceptance
    ///
    /// Must take effect synchronously: the engine may auto-apply the update
    /// before the next scheduling point, so this cannot be queued.
    fn defer_media_update(&self);

    /// Whether the engine currently holds a connection to the signaling server
    fn is_connected_to_server(&self) -> bool;
}

/// Translates raw engine callbacks into the normalized vocabulary
pub struct EngineEventAdapter {
    engine: Arc<dyn EngineControl>,
}

impl EngineEventAdapter {
    /// Create an adapter over the given engine control seam
    pub fn new(engine: Arc<dyn EngineControl>) -> Self {
        Self { engine }
    }

    /// Normalize a raw engine call state
    ///
    /// The terminal family collapses to [`EngineCallState::CallEnded`] once no
    /// active calls remain; otherwise states pass through to their normalized
    /// equivalent.
    pub fn normalize_call_state(
        &self,
        raw: RawCallState,
        has_active_calls: bool,
    ) -> EngineCallState {
        if raw.is_terminal() {
            return if has_active_calls {
                EngineCallState::Ending
            } else {
                EngineCallState::CallEnded
            };
        }
        match raw {
            RawCallState::Idle => EngineCallState::Idle,
            RawCallState::IncomingReceived | RawCallState::IncomingEarlyMedia => {
                EngineCallState::IncomingCall
            }
            RawCallState::OutgoingInit => EngineCallState::OutgoingInit,
            RawCallState::OutgoingProgress | RawCallState::OutgoingEarlyMedia => {
                EngineCallState::OutgoingConnecting
            }
            RawCallState::OutgoingRinging => EngineCallState::OutgoingRinging,
            RawCallState::Connected => EngineCallState::Connected,
            RawCallState::StreamsRunning
            | RawCallState::Updating
            | RawCallState::UpdatedByRemote
            | RawCallState::Referred => EngineCallState::Talking,
            RawCallState::Pausing | RawCallState::Paused => EngineCallState::Paused,
            RawCallState::PausedByRemote => EngineCallState::PausedByRemote,
            RawCallState::Resuming => EngineCallState::Resuming,
            // Terminal states handled above
            RawCallState::Error | RawCallState::End | RawCallState::Released => {
                EngineCallState::CallEnded
            }
        }
    }

    /// Derive the video sub-state from the current flags
    ///
    /// Policy (of the two historical variants): "playing" is detected from ICE
    /// connectivity, not bandwidth. While both sides have video enabled and
    /// the call is not ending, the state is `Playing` once a usable media path
    /// is confirmed (or was already `Playing`), `Initializing` before that.
    ///
    /// Producing [`VideoState::RemoteRequested`] suspends the engine's
    /// automatic media-update acceptance before this function returns.
    pub fn derive_video_state(
        &self,
        prev: VideoState,
        engine_state: EngineCallState,
        local_video_enabled: bool,
        remote_video_enabled: bool,
        connectivity_established: bool,
    ) -> VideoState {
        let next = if local_video_enabled
            && remote_video_enabled
            && !engine_state.is_possible_call_ended()
        {
            if prev == VideoState::Playing || connectivity_established {
                VideoState::Playing
            } else {
                VideoState::Initializing
            }
        } else if prev == VideoState::Requesting && engine_state.is_talking() {
            // The remote answer to our request: their video flag decides.
            if remote_video_enabled {
                VideoState::Accepted
            } else {
                VideoState::Denied
            }
        } else if remote_video_enabled && !local_video_enabled {
            VideoState::RemoteRequested
        } else if prev == VideoState::Requesting {
            VideoState::Requesting
        } else {
            VideoState::Off
        };

        if next == VideoState::RemoteRequested && prev != VideoState::RemoteRequested {
            // The engine may auto-accept the update before the next iterate
            // tick, so this has to happen synchronously, not via the channel.
            self.engine.defer_media_update();
            debug!("remote video request: deferred automatic media update");
        }

        next
    }
}
