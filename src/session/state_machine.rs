//! The authoritative call-lifecycle state machine
//!
//! Consumes normalized engine states and produces the GUI-facing call state
//! plus the bookkeeping (start time, end reason, encryption token) that UI and
//! notifications render from. All mutation happens on the orchestrator's event
//! task; no locking here.
//!
//! # Transition overview
//!
//! ```text
//!                 new call just started
//!  Unknown ───────────────────────────────► ConnectingToServer
//!                                                │ outgoing progressing
//!                                                ▼
//!                                          WaitingForContact
//!                                                │ remote ringing
//!                                                ▼
//!                                             Ringing
//!                                                │ media connected
//!                                                ▼
//!                                            Encrypting
//!                                                │ encryption confirmed
//!                                                ▼ (update_call_encryption)
//!                                             Talking
//!      any state ── terminal engine state ──► Ended
//! ```
//!
//! The `Encrypting → Talking` edge is driven by [`update_call_encryption`],
//! not by engine call states.
//!
//! [`update_call_encryption`]: CallSessionStateMachine::update_call_encryption

use super::{CallEndReason, CallSession, GuiCallState, NetworkQuality, VideoState};
use crate::engine::EngineCallState;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Tolerance below which a decreasing derived start time is ignored
///
/// The derived call-start time may only move earlier, never later, so a
/// displayed duration counter never jumps backward; sub-tolerance wobble from
/// engine timing is not worth a session mutation.
const START_TIME_TOLERANCE: Duration = Duration::from_millis(500);

/// The authoritative call-lifecycle state machine
///
/// Wraps the single [`CallSession`] and enforces its invariants. Every
/// `update*` operation returns whether anything observable changed so the
/// caller can suppress redundant broadcasts.
#[derive(Debug)]
pub struct CallSessionStateMachine {
    session: CallSession,
}

impl CallSessionStateMachine {
    /// Create the machine with the empty session that exists at process start
    pub fn new() -> Self {
        Self {
            session: CallSession::empty(),
        }
    }

    /// Read-only view of the session
    pub fn session(&self) -> &CallSession {
        &self.session
    }

    /// Current GUI-facing state
    pub fn gui_state(&self) -> GuiCallState {
        self.session.gui_state
    }

    /// Whether the session never left the idle state
    ///
    /// Callers use this to suppress broadcasting placeholder sessions.
    pub fn is_empty(&self) -> bool {
        self.session.engine_state == EngineCallState::Idle
    }

    /// Apply a normalized engine call-state change
    ///
    /// Returns `true` if anything observable changed. Idempotent: applying
    /// the same input twice changes state only on the first application.
    ///
    /// Malformed input (an empty remote id with a non-idle state) is logged
    /// as an invariant violation but does not fail; the machine degrades to
    /// best effort rather than crashing the event loop.
    pub fn update(
        &mut self,
        remote_id: &str,
        engine_state: EngineCallState,
        end_reason: CallEndReason,
        video_enabled: bool,
    ) -> bool {
        // End reason is write-once until the session resets.
        let mut reason_recorded = false;
        if end_reason != CallEndReason::None && self.session.end_reason == CallEndReason::None {
            debug!(reason = ?end_reason, "recording call end reason");
            self.session.end_reason = end_reason;
            reason_recorded = true;
        }

        if !reason_recorded
            && remote_id == self.session.remote_id
            && engine_state == self.session.engine_state
            && video_enabled == self.session.video_enabled
        {
            return false;
        }

        if remote_id.is_empty() && engine_state != EngineCallState::Idle {
            error!(
                state = ?engine_state,
                "invariant violation: non-idle engine state without a remote id"
            );
            // Degrade to best effort: keep processing with the empty id.
        }

        let previous_gui = self.session.gui_state;

        if engine_state.is_new_call_just_started() {
            // Entry action of the lifecycle: everything except the newly
            // assigned remote identity resets.
            self.session.reset_for_new_call(remote_id);
        } else {
            self.session.remote_id = remote_id.to_string();
        }

        self.session.engine_state = engine_state;
        self.session.video_enabled = video_enabled;

        let new_gui = if engine_state.is_new_call_just_started() {
            GuiCallState::ConnectingToServer
        } else if engine_state.is_possible_call_ended() {
            GuiCallState::Ended
        } else if engine_state.is_outgoing_connecting() {
            GuiCallState::WaitingForContact
        } else if engine_state.is_outgoing_ringing() {
            GuiCallState::Ringing
        } else if engine_state.is_before_encryption() {
            GuiCallState::Encrypting
        } else {
            // Notably Talking: the Encrypting -> Talking edge belongs to
            // update_call_encryption, not to engine call states.
            previous_gui
        };

        if new_gui != previous_gui {
            self.session.gui_state = new_gui;
            if new_gui == GuiCallState::Ended {
                self.session.call_start = None;
            } else {
                self.session.call_start = Some(Instant::now());
            }
            info!(
                remote_id = %self.session.remote_id,
                from = ?previous_gui,
                to = ?new_gui,
                engine_state = ?engine_state,
                "call state changed"
            );
        }

        true
    }

    /// Apply an encryption handshake result
    ///
    /// No-op if the token and verified flag are unchanged. While in
    /// `Encrypting`, a handshake result advances the call to `Talking`.
    pub fn update_call_encryption(&mut self, token: Option<String>, verified: bool) -> bool {
        if token == self.session.auth_token && verified == self.session.auth_token_verified {
            return false;
        }

        if self.session.gui_state == GuiCallState::Encrypting {
            info!(verified = verified, "encryption established, call is live");
            self.session.gui_state = GuiCallState::Talking;
        }
        self.session.auth_token = token;
        self.session.auth_token_verified = verified;
        true
    }

    /// Apply a call-statistics sample
    ///
    /// Accepted if the quality bucket changed or the derived call-start time
    /// decreases by at least the 500 ms tolerance. The start time only ever
    /// moves earlier, so a displayed duration counter never jumps backward.
    pub fn update_call_stats(&mut self, quality: NetworkQuality, duration_secs: u64) -> bool {
        let derived_start = match Instant::now().checked_sub(Duration::from_secs(duration_secs)) {
            Some(t) => t,
            None => {
                // Engine reported a duration reaching before the monotonic
                // clock's origin; nothing sane to derive from it.
                debug!(duration_secs, "ignoring stats sample with unrepresentable duration");
                return false;
            }
        };

        let start_moves_earlier = match self.session.call_start {
            None => true,
            Some(current) => derived_start + START_TIME_TOLERANCE < current,
        };

        if quality == self.session.quality && !start_moves_earlier {
            return false;
        }

        self.session.quality = quality;
        if start_moves_earlier {
            self.session.call_start = Some(match self.session.call_start {
                Some(current) => current.min(derived_start),
                None => derived_start,
            });
        }
        true
    }

    /// Store the video sub-state derived by the adapter
    pub fn update_video_state(&mut self, state: VideoState) -> bool {
        if state == self.session.video_state {
            return false;
        }
        debug!(from = ?self.session.video_state, to = ?state, "video state changed");
        self.session.video_state = state;
        true
    }

    /// Record an explicit local "enable video" request
    ///
    /// The only edge out of `Off` into `Requesting`.
    pub fn request_video(&mut self) -> bool {
        if self.session.video_state != VideoState::Off {
            return false;
        }
        self.session.video_state = VideoState::Requesting;
        self.session.video_requested = true;
        true
    }
}

impl Default for CallSessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: CallEndReason = CallEndReason::None;

    #[test]
    fn outgoing_call_lifecycle() {
        let mut m = CallSessionStateMachine::new();
        assert!(m.is_empty());

        assert!(m.update("X", EngineCallState::OutgoingInit, NONE, false));
        assert_eq!(m.gui_state(), GuiCallState::ConnectingToServer);
        assert!(m.session().call_start.is_some());
        assert_eq!(m.session().end_reason, CallEndReason::None);
        assert!(!m.is_empty());

        assert!(m.update("X", EngineCallState::OutgoingRinging, NONE, false));
        assert_eq!(m.gui_state(), GuiCallState::Ringing);

        assert!(m.update("X", EngineCallState::Connected, NONE, false));
        assert_eq!(m.gui_state(), GuiCallState::Encrypting);

        assert!(m.update_call_encryption(Some("magic words".into()), false));
        assert_eq!(m.gui_state(), GuiCallState::Talking);

        assert!(m.update("X", EngineCallState::CallEnded, CallEndReason::Busy, false));
        assert_eq!(m.gui_state(), GuiCallState::Ended);
        assert_eq!(m.session().end_reason, CallEndReason::Busy);
        assert!(m.session().call_start.is_none());
    }

    #[test]
    fn update_is_idempotent() {
        let mut m = CallSessionStateMachine::new();
        assert!(m.update("X", EngineCallState::OutgoingInit, NONE, false));
        assert!(!m.update("X", EngineCallState::OutgoingInit, NONE, false));
        assert!(m.update("X", EngineCallState::OutgoingRinging, NONE, false));
        assert!(!m.update("X", EngineCallState::OutgoingRinging, NONE, false));
    }

    #[test]
    fn end_reason_is_write_once() {
        let mut m = CallSessionStateMachine::new();
        m.update("X", EngineCallState::OutgoingInit, NONE, false);
        m.update("X", EngineCallState::Connected, CallEndReason::Declined, false);
        assert_eq!(m.session().end_reason, CallEndReason::Declined);

        // A later reason must not overwrite the recorded one.
        m.update("X", EngineCallState::CallEnded, CallEndReason::Busy, false);
        assert_eq!(m.session().end_reason, CallEndReason::Declined);

        // A new call resets the reason.
        m.update("Y", EngineCallState::IncomingCall, NONE, false);
        assert_eq!(m.session().end_reason, CallEndReason::None);
        assert_eq!(m.session().remote_id, "Y");
    }

    #[test]
    fn new_call_resets_everything_but_remote_id() {
        let mut m = CallSessionStateMachine::new();
        m.update("X", EngineCallState::OutgoingInit, NONE, false);
        m.update("X", EngineCallState::Connected, NONE, false);
        m.update_call_encryption(Some("tok".into()), true);
        m.update_call_stats(NetworkQuality::Poor, 10);
        m.update("X", EngineCallState::CallEnded, CallEndReason::Declined, false);

        m.update("Y", EngineCallState::IncomingCall, NONE, false);
        let s = m.session();
        assert_eq!(s.remote_id, "Y");
        assert_eq!(s.gui_state, GuiCallState::ConnectingToServer);
        assert_eq!(s.auth_token, None);
        assert!(!s.auth_token_verified);
        assert_eq!(s.quality, NetworkQuality::Unknown);
        assert_eq!(s.end_reason, CallEndReason::None);
        assert_eq!(s.video_state, VideoState::Off);
    }

    #[test]
    fn encryption_update_is_idempotent_and_only_advances_encrypting() {
        let mut m = CallSessionStateMachine::new();
        m.update("X", EngineCallState::OutgoingInit, NONE, false);

        // Not encrypting yet: token stored, state unchanged.
        assert!(m.update_call_encryption(Some("tok".into()), false));
        assert_eq!(m.gui_state(), GuiCallState::ConnectingToServer);

        assert!(!m.update_call_encryption(Some("tok".into()), false));
    }

    #[test]
    fn stats_accept_on_quality_change_only() {
        let mut m = CallSessionStateMachine::new();
        m.update("X", EngineCallState::Connected, NONE, false);

        assert!(m.update_call_stats(NetworkQuality::Good, 0));
        // Same quality, same duration: below the 500 ms tolerance.
        assert!(!m.update_call_stats(NetworkQuality::Good, 0));
        assert!(m.update_call_stats(NetworkQuality::Average, 0));
    }

    #[test]
    fn start_time_only_moves_earlier() {
        let mut m = CallSessionStateMachine::new();
        m.update("X", EngineCallState::Connected, NONE, false);
        let initial = m.session().call_start.unwrap();

        // Engine says the call has been running 5 s: start moves earlier.
        assert!(m.update_call_stats(NetworkQuality::Good, 5));
        let moved = m.session().call_start.unwrap();
        assert!(moved < initial);

        // A shorter duration would move the start later: rejected.
        assert!(!m.update_call_stats(NetworkQuality::Good, 1));
        assert_eq!(m.session().call_start.unwrap(), moved);
    }

    #[tracing_test::traced_test]
    #[test]
    fn empty_id_anomaly_is_logged_not_fatal() {
        let mut m = CallSessionStateMachine::new();
        assert!(m.update("", EngineCallState::Connected, NONE, false));
        assert_eq!(m.gui_state(), GuiCallState::Encrypting);
        assert!(logs_contain("invariant violation"));
    }

    #[test]
    fn video_request_only_from_off() {
        let mut m = CallSessionStateMachine::new();
        assert!(m.request_video());
        assert_eq!(m.session().video_state, VideoState::Requesting);
        assert!(!m.request_video());
    }

    #[test]
    fn talking_survives_paused_states() {
        let mut m = CallSessionStateMachine::new();
        m.update("X", EngineCallState::Connected, NONE, false);
        m.update_call_encryption(Some("tok".into()), true);
        assert_eq!(m.gui_state(), GuiCallState::Talking);

        // Paused / resumed engine states do not change the GUI phase.
        m.update("X", EngineCallState::Paused, NONE, false);
        assert_eq!(m.gui_state(), GuiCallState::Talking);
        m.update("X", EngineCallState::Talking, NONE, false);
        assert_eq!(m.gui_state(), GuiCallState::Talking);
    }
}
