//! Process-lifecycle orchestration
//!
//! The orchestrator owns the single serialized event loop that every state
//! mutation in this crate happens on. External sources (the VoIP engine, host
//! telephony, connectivity, audio hardware) publish typed events onto one
//! channel through a cloneable [`EventBus`] handle and are never processed in
//! place; UI commands travel the same way. The loop also drives the recurring
//! work the protocol needs:
//!
//! - the engine iterate pump every ~20 ms (the only place the engine's
//!   internal callbacks run; never starved),
//! - keep-alive re-registration every ~10 min against host-OS idle teardown,
//! - an idle-connection check every ~20 s while no call is ongoing,
//! - the graceful-then-forced termination protocol with its 5 s fallback.
//!
//! # Lifecycle states
//!
//! `Offline / Connecting / Online / OngoingCall / Error`, derived purely from
//! (registration result, active call present).

pub mod wake;

pub use wake::{WakeLocks, WakeReason};

use crate::audio::{AudioOutputType, AudioRoutingController};
use crate::config::CoreConfig;
use crate::engine::{
    EngineControl, EngineEvent, EngineEventAdapter, RegistrationState,
};
use crate::events::{CallStatusInfo, CoreEvent, EventEmitter, StatusInfo};
use crate::platform::{AudioPlatform, NativeCallState, WakeLockProvider};
use crate::quality::NetworkQualityMonitor;
use crate::retry::{with_backoff, Backoff};
use crate::session::{CallEndReason, CallSessionStateMachine, GuiCallState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Process lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceLifecycleState {
    /// Not registered and not trying
    Offline,
    /// Registration in flight
    Connecting,
    /// Registered, no call
    Online,
    /// A call is active
    OngoingCall,
    /// Registration failed; recoverable by re-registration
    Error,
}

fn derive_lifecycle(
    registration: RegistrationState,
    call_active: bool,
) -> ServiceLifecycleState {
    if call_active {
        return ServiceLifecycleState::OngoingCall;
    }
    match registration {
        RegistrationState::None | RegistrationState::Cleared => ServiceLifecycleState::Offline,
        RegistrationState::InProgress => ServiceLifecycleState::Connecting,
        RegistrationState::Ok => ServiceLifecycleState::Online,
        RegistrationState::Failed => ServiceLifecycleState::Error,
    }
}

/// Commands from the application layer, serialized onto the event loop
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Route call audio to the given output
    SetAudioRoute(AudioOutputType),
    /// Playback volume from the UI slider (0–100)
    SetPlaybackVolume(i32),
    /// Microphone volume from the UI slider (0–100)
    SetMicrophoneVolume(i32),
    /// User mute choice
    SetMicrophoneMuted(bool),
    /// Explicit local "enable video" request
    RequestVideo,
    /// Answer a pending remote video request
    AcceptVideoRequest(bool),
    /// Start the termination protocol
    Terminate,
}

/// Typed inbound events feeding the serialized loop
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// Event from the VoIP engine
    Engine(EngineEvent),
    /// Native telephony call state changed
    NativeCallStateChanged(NativeCallState),
    /// Host network connectivity changed
    NetworkConnectivityChanged { connected: bool },
    /// Wired headset plugged or unplugged
    WiredHeadset { plugged: bool },
    /// Bluetooth adapter turned on or off
    BluetoothAdapter { enabled: bool },
    /// Bluetooth headset profile connected or disconnected
    BluetoothHeadsetProfile { connected: bool },
    /// Bluetooth SCO audio state changed
    BluetoothScoAudio { connected: bool },
    /// An external push woke the process
    PushWakeup,
    /// The work triggered by the push completed
    PushHandled,
    /// A spawned keep-alive refresh finished; fed back by the orchestrator
    /// itself so the retry sleeps never run on the loop
    KeepAliveFinished { ok: bool },
    /// Application command
    Command(CoreCommand),
}

/// Cloneable publisher handle onto the orchestrator's channel
///
/// This is what replaces platform broadcast receivers: each external source
/// holds a bus handle and publishes typed events; processing always happens
/// on the loop.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<InboundEvent>,
}

impl EventBus {
    /// Publish an event; dropped with a log line if the loop has stopped
    pub fn publish(&self, event: InboundEvent) {
        if self.tx.send(event).is_err() {
            debug!("event dropped, orchestrator loop has stopped");
        }
    }
}

/// The top-level orchestrator
///
/// Construction wires every component to one explicitly passed context
/// (engine seam, audio platform, wake-lock provider, config); there is no
/// process-global state anywhere in the crate.
pub struct ServiceOrchestrator {
    config: CoreConfig,
    engine: Arc<dyn EngineControl>,
    adapter: EngineEventAdapter,
    session: CallSessionStateMachine,
    audio: AudioRoutingController,
    quality: NetworkQualityMonitor,
    wake: WakeLocks,
    emitter: Arc<EventEmitter>,

    registration: RegistrationState,
    /// When the registration state last changed; grants a stalled connect
    /// attempt one idle-check interval of grace before it is timed out
    registration_since: Option<tokio::time::Instant>,
    keep_alive_in_flight: bool,
    lifecycle: ServiceLifecycleState,
    remote_video_enabled: bool,
    connectivity_established: bool,

    going_down: bool,
    teardown_done: bool,
    finished: bool,
    graceful_deadline: Option<tokio::time::Instant>,

    rx: mpsc::UnboundedReceiver<InboundEvent>,
    bus: EventBus,
}

impl ServiceOrchestrator {
    /// Wire up the orchestrator and its components
    pub fn new(
        config: CoreConfig,
        engine: Arc<dyn EngineControl>,
        audio_platform: Arc<dyn AudioPlatform>,
        wake_provider: Arc<dyn WakeLockProvider>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let audio = AudioRoutingController::new(
            audio_platform,
            engine.clone(),
            config.sco_retry_interval,
            config.sco_retry_attempts,
        );
        Self {
            adapter: EngineEventAdapter::new(engine.clone()),
            session: CallSessionStateMachine::new(),
            audio,
            quality: NetworkQualityMonitor::new(),
            wake: WakeLocks::new(wake_provider),
            emitter: Arc::new(EventEmitter::new()),
            engine,
            config,
            registration: RegistrationState::None,
            registration_since: None,
            keep_alive_in_flight: false,
            lifecycle: ServiceLifecycleState::Offline,
            remote_video_enabled: false,
            connectivity_established: false,
            going_down: false,
            teardown_done: false,
            finished: false,
            graceful_deadline: None,
            rx,
            bus: EventBus { tx },
        }
    }

    /// Publisher handle for external event sources
    pub fn event_bus(&self) -> EventBus {
        self.bus.clone()
    }

    /// The notification emitter external collaborators subscribe to
    pub fn emitter(&self) -> Arc<EventEmitter> {
        self.emitter.clone()
    }

    /// Current lifecycle state (for late subscribers pulling on attach)
    pub fn lifecycle(&self) -> ServiceLifecycleState {
        self.lifecycle
    }

    /// Snapshot of the current call (for late subscribers pulling on attach)
    pub fn call_status(&self) -> CallStatusInfo {
        let s = self.session.session();
        CallStatusInfo {
            remote_id: s.remote_id.clone(),
            gui_state: s.gui_state,
            end_reason: s.end_reason,
            auth_token: s.auth_token.clone(),
            auth_token_verified: s.auth_token_verified,
            duration_secs: s.duration_secs(),
            timestamp: chrono::Utc::now(),
        }
    }

    /// Run the serialized event loop until the termination protocol completes
    ///
    /// Registers with the signaling server on entry, then multiplexes inbound
    /// events with the recurring timers. All timers die together with the
    /// loop, so nothing can fire after teardown released the engine.
    pub async fn run(mut self) {
        info!(user_agent = %self.config.user_agent, "starting service orchestrator");
        self.connect_to_server().await;

        let start = tokio::time::Instant::now();
        let mut iterate = tokio::time::interval(self.config.iterate_interval);
        let mut keep_alive = tokio::time::interval_at(
            start + self.config.keep_alive_interval,
            self.config.keep_alive_interval,
        );
        let mut idle_check = tokio::time::interval_at(
            start + self.config.idle_check_interval,
            self.config.idle_check_interval,
        );

        loop {
            let deadline = self.graceful_deadline;
            tokio::select! {
                _ = iterate.tick() => {
                    self.engine.iterate().await;
                }
                _ = keep_alive.tick() => {
                    self.keep_alive();
                }
                _ = idle_check.tick() => {
                    self.check_idle_connection().await;
                }
                _ = async {
                    match deadline {
                        Some(d) => tokio::time::sleep_until(d).await,
                        None => futures::future::pending().await,
                    }
                } => {
                    warn!("graceful unregister deadline expired, forcing teardown");
                    self.finish_teardown().await;
                }
                event = self.rx.recv() => match event {
                    Some(event) => self.dispatch(event).await,
                    None => break,
                }
            }
            if self.finished {
                break;
            }
        }
        info!("orchestrator loop stopped");
    }

    async fn dispatch(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::Engine(e) => self.on_engine_event(e).await,
            InboundEvent::NativeCallStateChanged(state) => {
                let voip_active = self.session.gui_state().is_active();
                self.audio.on_gsm_call(state.is_active(), voip_active).await;
            }
            InboundEvent::NetworkConnectivityChanged { connected } => {
                info!(connected, "network connectivity changed");
                if connected && self.registration != RegistrationState::Ok && !self.going_down {
                    self.connect_to_server().await;
                }
            }
            InboundEvent::WiredHeadset { plugged } => {
                if self.audio.on_wired_headset(plugged).is_some() {
                    self.emit_audio_output();
                }
            }
            InboundEvent::BluetoothAdapter { enabled } => {
                if self.audio.on_bluetooth_adapter(enabled).is_some() {
                    self.emit_audio_output();
                }
            }
            InboundEvent::BluetoothHeadsetProfile { connected } => {
                if self.audio.on_headset_profile(connected).is_some() {
                    self.emit_audio_output();
                }
            }
            InboundEvent::BluetoothScoAudio { connected } => {
                self.audio.on_sco_audio_state(connected);
            }
            InboundEvent::PushWakeup => {
                self.wake.acquire_for(WakeReason::Push);
                if self.registration != RegistrationState::Ok && !self.going_down {
                    self.connect_to_server().await;
                }
            }
            InboundEvent::PushHandled => {
                self.wake.release_for(WakeReason::Push);
            }
            InboundEvent::KeepAliveFinished { ok } => {
                self.keep_alive_in_flight = false;
                if !ok && !self.going_down {
                    error!("keep-alive re-registration failed");
                    self.registration = RegistrationState::Failed;
                    self.registration_since = Some(tokio::time::Instant::now());
                    self.update_lifecycle();
                }
            }
            InboundEvent::Command(cmd) => self.on_command(cmd).await,
        }
    }

    async fn on_command(&mut self, cmd: CoreCommand) {
        match cmd {
            CoreCommand::SetAudioRoute(output) => {
                if self.audio.set_route(output) {
                    self.emit_audio_output();
                }
            }
            CoreCommand::SetPlaybackVolume(slider) => self.audio.set_playback_slider(slider),
            CoreCommand::SetMicrophoneVolume(slider) => self.audio.set_microphone_slider(slider),
            CoreCommand::SetMicrophoneMuted(muted) => self.audio.set_user_muted(muted),
            CoreCommand::RequestVideo => {
                if self.session.request_video() {
                    self.engine.request_video().await;
                    self.emitter.emit(CoreEvent::VideoStateChanged(
                        self.session.session().video_state,
                    ));
                }
            }
            CoreCommand::AcceptVideoRequest(accept) => {
                self.engine.accept_video_update(accept).await;
            }
            CoreCommand::Terminate => self.begin_termination().await,
        }
    }

    async fn on_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::RegistrationStateChanged { state } => {
                debug!(state = ?state, "registration state changed");
                self.registration = state;
                self.registration_since = Some(tokio::time::Instant::now());
                if self.going_down
                    && matches!(state, RegistrationState::Cleared | RegistrationState::Failed)
                {
                    self.finish_teardown().await;
                    return;
                }
                self.update_lifecycle();
            }
            EngineEvent::CallStateChanged {
                remote_id,
                state,
                has_active_calls,
                end_reason,
                video_enabled,
                remote_video_enabled,
                message,
            } => {
                let normalized = self.adapter.normalize_call_state(state, has_active_calls);
                debug!(
                    remote_id = %remote_id,
                    raw = ?state,
                    normalized = ?normalized,
                    message = %message,
                    "engine call state changed"
                );
                self.remote_video_enabled = remote_video_enabled;

                if normalized.is_new_call_just_started() {
                    self.quality.reset();
                    self.connectivity_established = false;
                    self.audio.on_call_started(
                        normalized == crate::engine::EngineCallState::OutgoingInit,
                    );
                    self.wake.acquire_for(WakeReason::Call);
                    // No audio may leak before the secure channel is
                    // confirmed; lifted when encryption is reported.
                    self.audio.set_microphone_disabled(true);
                    if normalized == crate::engine::EngineCallState::IncomingCall {
                        self.audio.start_ringing();
                    }
                }

                let changed =
                    self.session
                        .update(&remote_id, normalized, end_reason, video_enabled);

                self.refresh_video_state();

                if changed && !self.session.is_empty() {
                    match self.session.gui_state() {
                        GuiCallState::Ended => {
                            self.audio.on_call_ended();
                            self.wake.release_for(WakeReason::Call);
                        }
                        GuiCallState::Encrypting => {
                            // The remote side answered; ringing is over.
                            self.audio.stop_ringing();
                        }
                        _ => {}
                    }
                    self.emit_call_state();
                    self.update_lifecycle();
                }
            }
            EngineEvent::CallStatsUpdated {
                stream,
                details,
                duration_secs,
            } => {
                debug!(stream = ?stream, "call statistics sample");
                self.connectivity_established = details.ice_state.is_established();
                if self
                    .session
                    .update_call_stats(details.quality, duration_secs)
                {
                    self.emit_call_state();
                }
                if self.quality.observe(details.clone()) {
                    self.emitter
                        .emit(CoreEvent::CallConnectionDetailsChanged(details));
                }
                self.refresh_video_state();
            }
            EngineEvent::CallEncryptionChanged { token, verified } => {
                if self.session.update_call_encryption(token, verified) {
                    // Secure channel confirmed: lift the handshake-window
                    // microphone override.
                    self.audio.set_microphone_disabled(false);
                    self.emit_call_state();
                }
            }
            EngineEvent::AudioDevicesChanged { available, current } => {
                if self.audio.on_devices_changed(available, current).is_some() {
                    self.emit_audio_output();
                }
            }
        }
    }

    /// Re-derive the video sub-state from the current flags
    fn refresh_video_state(&mut self) {
        let s = self.session.session();
        let next = self.adapter.derive_video_state(
            s.video_state,
            s.engine_state,
            s.video_enabled,
            self.remote_video_enabled,
            self.connectivity_established,
        );
        if self.session.update_video_state(next) {
            self.emitter.emit(CoreEvent::VideoStateChanged(next));
        }
    }

    async fn connect_to_server(&mut self) {
        let creds = self.config.credentials.clone();
        self.registration = RegistrationState::InProgress;
        self.registration_since = Some(tokio::time::Instant::now());
        self.update_lifecycle();
        if let Err(e) = self
            .engine
            .register(&creds.account_id, &creds.password_hash, &creds.domain)
            .await
        {
            error!(error = %e, "registration request failed");
            self.registration = RegistrationState::Failed;
            self.update_lifecycle();
        }
        // Success is reported asynchronously via RegistrationStateChanged.
    }

    /// Kick off a keep-alive refresh on its own task
    ///
    /// The refresh retries with backoff, which can take seconds; running it
    /// inline would stall the iterate pump, so the outcome comes back as
    /// [`InboundEvent::KeepAliveFinished`] instead.
    fn keep_alive(&mut self) {
        if self.going_down
            || self.keep_alive_in_flight
            || self.registration != RegistrationState::Ok
        {
            return;
        }
        debug!("keep-alive re-registration");
        self.keep_alive_in_flight = true;
        let engine = self.engine.clone();
        let bus = self.bus.clone();
        tokio::spawn(async move {
            let result = with_backoff("keep_alive_reregister", Backoff::registration(), || {
                let engine = engine.clone();
                async move { engine.refresh_registration().await }
            })
            .await;
            bus.publish(InboundEvent::KeepAliveFinished {
                ok: result.is_ok(),
            });
        });
    }

    /// Guard against a silently dead signaling connection
    ///
    /// Covers both a connection lost after a successful registration and a
    /// connect attempt that stalled without ever reporting a result; the
    /// latter gets one full check interval of grace before it counts.
    async fn check_idle_connection(&mut self) {
        if self.going_down || self.lifecycle == ServiceLifecycleState::OngoingCall {
            return;
        }
        if self.engine.is_connected_to_server() {
            return;
        }
        let unreachable = match self.registration {
            RegistrationState::Ok => true,
            RegistrationState::InProgress => self
                .registration_since
                .is_some_and(|since| since.elapsed() >= self.config.idle_check_interval),
            _ => false,
        };
        if unreachable {
            warn!(registration = ?self.registration, "signaling connection unreachable, terminating");
            if !self.session.is_empty() {
                let remote_id = self.session.session().remote_id.clone();
                let video = self.session.session().video_enabled;
                self.session.update(
                    &remote_id,
                    crate::engine::EngineCallState::CallEnded,
                    CallEndReason::ServerConnectionTimeout,
                    video,
                );
                self.emit_call_state();
            }
            self.begin_termination().await;
        }
    }

    /// Phase 1 of the termination protocol: mark going-down, request a
    /// graceful unregister, and arm the fallback deadline
    async fn begin_termination(&mut self) {
        if self.going_down {
            return;
        }
        info!("termination requested");
        self.going_down = true;
        self.audio.shutdown();

        if self.registration == RegistrationState::Ok {
            if let Err(e) = self.engine.unregister().await {
                warn!(error = %e, "unregister request failed, forcing teardown");
                self.finish_teardown().await;
                return;
            }
            self.graceful_deadline = Some(
                tokio::time::Instant::now() + self.config.graceful_unregister_timeout,
            );
        } else {
            self.finish_teardown().await;
        }
    }

    /// Phase 2: exactly-once final teardown
    ///
    /// Reached from unregister confirmation or from the fallback deadline,
    /// whichever fires first; the idempotency flag makes the second path a
    /// no-op. Stopping the loop drops every pending timer together with it.
    async fn finish_teardown(&mut self) {
        if self.teardown_done {
            return;
        }
        self.teardown_done = true;
        self.graceful_deadline = None;

        self.wake.release_all(true);
        self.engine.release().await;
        self.emitter.emit(CoreEvent::ServiceFinished);
        self.finished = true;
        info!("teardown complete");
    }

    fn update_lifecycle(&mut self) {
        let call_active = !self.session.is_empty() && self.session.gui_state().is_active();
        let next = derive_lifecycle(self.registration, call_active);
        if next != self.lifecycle {
            info!(from = ?self.lifecycle, to = ?next, "lifecycle state changed");
            self.lifecycle = next;
            self.emitter.emit(CoreEvent::StatusChanged(StatusInfo {
                state: next,
                timestamp: chrono::Utc::now(),
            }));
        }
    }

    fn emit_call_state(&self) {
        if self.session.is_empty() {
            // Placeholder sessions are not broadcast.
            return;
        }
        self.emitter
            .emit(CoreEvent::CallStateChanged(self.call_status()));
    }

    fn emit_audio_output(&self) {
        let state = self.audio.route_state();
        let mut available: Vec<AudioOutputType> = state.available.into_iter().collect();
        available.sort();
        self.emitter.emit(CoreEvent::AudioOutputChanged {
            current: state.current,
            available,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_derivation() {
        use RegistrationState::*;
        assert_eq!(derive_lifecycle(None, false), ServiceLifecycleState::Offline);
        assert_eq!(derive_lifecycle(Cleared, false), ServiceLifecycleState::Offline);
        assert_eq!(
            derive_lifecycle(InProgress, false),
            ServiceLifecycleState::Connecting
        );
        assert_eq!(derive_lifecycle(Ok, false), ServiceLifecycleState::Online);
        assert_eq!(derive_lifecycle(Failed, false), ServiceLifecycleState::Error);
        // An active call dominates the registration result.
        assert_eq!(
            derive_lifecycle(Ok, true),
            ServiceLifecycleState::OngoingCall
        );
        assert_eq!(
            derive_lifecycle(Failed, true),
            ServiceLifecycleState::OngoingCall
        );
    }
}
