//! # Call Session Core
//!
//! Engine-agnostic call-session orchestration for a mobile VoIP client.
//!
//! This crate sits between an external VoIP engine (which owns signaling and
//! media) and an application layer (which renders UI and supplies platform
//! services). It owns the authoritative call-session model and every decision
//! around it:
//!
//! - **Call session state machine**: normalized engine states folded into a
//!   small GUI-facing vocabulary, with write-once end reasons, per-call reset,
//!   and a monotonic call-start-time guard
//! - **Engine event adapter**: translates raw engine callbacks, collapses the
//!   engine's interchangeable terminal codes, and defers automatic media
//!   updates synchronously when the remote side requests video
//! - **Audio routing**: output selection by preference with manual-speaker
//!   override, Bluetooth SCO negotiation with bounded retry, ringtone and
//!   vibration control, GSM-interruption handling, volume/mute mapping
//! - **Service orchestration**: one serialized event loop multiplexing all
//!   external sources with the iterate pump, keep-alive re-registration,
//!   idle-connection checks, wake locks, and a graceful-then-forced
//!   termination protocol
//! - **Network quality monitoring**: change-filtered connection details with
//!   exactly-once end-of-call reporting
//!
//! # Architecture
//!
//! Everything runs on the orchestrator's event task. External sources publish
//! typed events through a cloneable [`orchestrator::EventBus`]; outbound
//! notifications go through the [`events::EventEmitter`] to registered
//! handlers. The engine is reached only through the [`engine::EngineControl`]
//! seam and the host platform only through [`platform::AudioPlatform`] and
//! [`platform::WakeLockProvider`], so the whole crate runs against test
//! doubles.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use call_session_core::config::{CoreConfig, Credentials};
//! use call_session_core::orchestrator::{CoreCommand, InboundEvent, ServiceOrchestrator};
//! use call_session_core::platform::NullWakeLockProvider;
//! use std::sync::Arc;
//!
//! # async fn run(engine: Arc<dyn call_session_core::engine::EngineControl>,
//! #              audio: Arc<dyn call_session_core::platform::AudioPlatform>) {
//! let config = CoreConfig::new(Credentials {
//!     account_id: "alice".into(),
//!     password_hash: "…".into(),
//!     domain: "sip.example.org".into(),
//! });
//!
//! let orchestrator =
//!     ServiceOrchestrator::new(config, engine, audio, Arc::new(NullWakeLockProvider));
//! let bus = orchestrator.event_bus();
//!
//! let handle = tokio::spawn(orchestrator.run());
//!
//! // ... later, from anywhere:
//! bus.publish(InboundEvent::Command(CoreCommand::Terminate));
//! handle.await.unwrap();
//! # }
//! ```

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod platform;
pub mod quality;
pub mod retry;
pub mod session;

// Re-export the types applications touch most.
pub use config::{CoreConfig, Credentials};
pub use engine::{EngineCallState, EngineControl, EngineEvent, RawCallState, RegistrationState};
pub use error::{CoreError, CoreResult};
pub use events::{CoreEvent, CoreEventHandler, EventEmitter, EventSubscription};
pub use orchestrator::{
    CoreCommand, EventBus, InboundEvent, ServiceLifecycleState, ServiceOrchestrator,
};
pub use platform::{AudioOutputType, AudioPlatform, NativeCallState, WakeLockProvider};
pub use quality::CallConnectionDetails;
pub use session::{CallEndReason, GuiCallState, NetworkQuality, VideoState};
