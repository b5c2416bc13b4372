//! Shared test doubles for the integration tests
//!
//! Every platform/engine call is counted so tests can assert on the exact OS
//! traffic a scenario produces, not just the end state.

#![allow(dead_code)]

use call_session_core::engine::EngineControl;
use call_session_core::error::{CoreError, CoreResult};
use call_session_core::events::{CoreEvent, CoreEventHandler};
use call_session_core::platform::{
    AudioOutputType, AudioPlatform, WakeLockKind, WakeLockProvider,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Once;

/// Install a log subscriber honoring `RUST_LOG`, once per test binary
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Counting [`AudioPlatform`] double; observed SCO state is test-controlled
#[derive(Default)]
pub struct MockAudioPlatform {
    pub outputs: Mutex<Vec<AudioOutputType>>,
    pub sco_requests: AtomicU32,
    pub sco_active: AtomicBool,
    pub ring_mutes: Mutex<Vec<bool>>,
    pub focus_requests: AtomicU32,
    pub focus_abandons: AtomicU32,
    pub ringtone_starts: AtomicU32,
    pub ringtone_stops: AtomicU32,
    pub vibration_starts: AtomicU32,
    pub vibration_stops: AtomicU32,
    pub interruption_starts: AtomicU32,
    pub interruption_stops: AtomicU32,
    pub playback_gain: Mutex<Option<f32>>,
    pub microphone_gain: Mutex<Option<f32>>,
    pub microphone_mutes: Mutex<Vec<bool>>,
}

impl AudioPlatform for MockAudioPlatform {
    fn set_output(&self, output: AudioOutputType) {
        self.outputs.lock().push(output);
    }

    fn request_sco(&self, _enabled: bool) {
        self.sco_requests.fetch_add(1, Ordering::SeqCst);
    }

    fn sco_active(&self) -> bool {
        self.sco_active.load(Ordering::SeqCst)
    }

    fn set_ring_muted(&self, muted: bool) {
        self.ring_mutes.lock().push(muted);
    }

    fn request_ring_focus(&self) -> bool {
        self.focus_requests.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn abandon_ring_focus(&self) {
        self.focus_abandons.fetch_add(1, Ordering::SeqCst);
    }

    fn start_ringtone(&self) {
        self.ringtone_starts.fetch_add(1, Ordering::SeqCst);
    }

    fn stop_ringtone(&self) {
        self.ringtone_stops.fetch_add(1, Ordering::SeqCst);
    }

    fn start_vibration(&self, _pattern: &[u64]) {
        self.vibration_starts.fetch_add(1, Ordering::SeqCst);
    }

    fn stop_vibration(&self) {
        self.vibration_stops.fetch_add(1, Ordering::SeqCst);
    }

    fn start_interruption_tone(&self) {
        self.interruption_starts.fetch_add(1, Ordering::SeqCst);
    }

    fn stop_interruption_tone(&self) {
        self.interruption_stops.fetch_add(1, Ordering::SeqCst);
    }

    fn set_playback_gain_db(&self, db: f32) {
        *self.playback_gain.lock() = Some(db);
    }

    fn set_microphone_gain_db(&self, db: f32) {
        *self.microphone_gain.lock() = Some(db);
    }

    fn set_microphone_muted(&self, muted: bool) {
        self.microphone_mutes.lock().push(muted);
    }
}

/// Counting [`EngineControl`] double
#[derive(Default)]
pub struct MockEngine {
    pub iterates: AtomicU32,
    pub registers: AtomicU32,
    pub refreshes: AtomicU32,
    pub unregisters: AtomicU32,
    pub releases: AtomicU32,
    pub pauses: AtomicU32,
    pub resumes: AtomicU32,
    pub video_requests: AtomicU32,
    pub video_accepts: Mutex<Vec<bool>>,
    pub defers: AtomicU32,
    pub connected: AtomicBool,
    pub refresh_fails: AtomicBool,
}

#[async_trait::async_trait]
impl EngineControl for MockEngine {
    async fn iterate(&self) {
        self.iterates.fetch_add(1, Ordering::SeqCst);
    }

    async fn register(&self, _: &str, _: &str, _: &str) -> CoreResult<()> {
        self.registers.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn refresh_registration(&self) -> CoreResult<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.refresh_fails.load(Ordering::SeqCst) {
            return Err(CoreError::registration_failed("refresh rejected"));
        }
        Ok(())
    }

    async fn unregister(&self) -> CoreResult<()> {
        self.unregisters.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }

    async fn pause_call(&self) {
        self.pauses.fetch_add(1, Ordering::SeqCst);
    }

    async fn resume_call(&self) {
        self.resumes.fetch_add(1, Ordering::SeqCst);
    }

    async fn request_video(&self) {
        self.video_requests.fetch_add(1, Ordering::SeqCst);
    }

    async fn accept_video_update(&self, accept: bool) {
        self.video_accepts.lock().push(accept);
    }

    fn defer_media_update(&self) {
        self.defers.fetch_add(1, Ordering::SeqCst);
    }

    fn is_connected_to_server(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Counting [`WakeLockProvider`] double
#[derive(Default)]
pub struct CountingWakeLockProvider {
    pub acquires: Mutex<Vec<WakeLockKind>>,
    pub releases: Mutex<Vec<(WakeLockKind, bool)>>,
}

impl WakeLockProvider for CountingWakeLockProvider {
    fn supports_proximity(&self) -> bool {
        false
    }

    fn acquire(&self, kind: WakeLockKind) {
        self.acquires.lock().push(kind);
    }

    fn release(&self, kind: WakeLockKind, immediate: bool) {
        self.releases.lock().push((kind, immediate));
    }
}

/// Handler that records every event it receives
#[derive(Default)]
pub struct CollectingHandler {
    pub events: Mutex<Vec<CoreEvent>>,
}

#[async_trait::async_trait]
impl CoreEventHandler for CollectingHandler {
    async fn on_core_event(&self, event: CoreEvent) {
        self.events.lock().push(event);
    }
}
