//! Outbound notifications to external collaborators (UI, notification renderer)
//!
//! Each notification is a typed event broadcast to all current subscribers.
//! Delivery is fire-and-forget, at-most-once per state change: events are
//! never queued or replayed for late subscribers — a late subscriber pulls the
//! current state from the orchestrator's accessors on attach.
//!
//! # Usage Examples
//!
//! ```rust
//! use call_session_core::events::{CoreEventHandler, CallStatusInfo, StatusInfo};
//! use async_trait::async_trait;
//!
//! struct UiBridge;
//!
//! #[async_trait]
//! impl CoreEventHandler for UiBridge {
//!     async fn on_call_state_changed(&self, info: CallStatusInfo) {
//!         println!("call with {} is now {:?}", info.remote_id, info.gui_state);
//!     }
//!
//!     async fn on_status_changed(&self, info: StatusInfo) {
//!         println!("service is {:?}", info.state);
//!     }
//! }
//! ```

use crate::audio::AudioOutputType;
use crate::orchestrator::ServiceLifecycleState;
use crate::quality::CallConnectionDetails;
use crate::session::{CallEndReason, GuiCallState, VideoState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Service lifecycle change payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    /// New lifecycle state
    pub state: ServiceLifecycleState,
    /// When the change occurred
    pub timestamp: DateTime<Utc>,
}

/// Call-state change payload
///
/// Serializable: notification renderers on the other side of an IPC boundary
/// consume these as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallStatusInfo {
    /// Remote identity of the call
    pub remote_id: String,
    /// New GUI-facing call state
    pub gui_state: GuiCallState,
    /// Recorded end reason (informational, drives notification text only)
    pub end_reason: CallEndReason,
    /// Authentication token of the encrypted channel, if established
    pub auth_token: Option<String>,
    /// Whether the token was verified before
    pub auth_token_verified: bool,
    /// Call duration in seconds, if the call has started
    pub duration_secs: Option<u64>,
    /// When the change occurred
    pub timestamp: DateTime<Utc>,
}

/// Discriminant used for subscription filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreEventKind {
    StatusChanged,
    CallStateChanged,
    CallConnectionDetailsChanged,
    VideoStateChanged,
    AudioOutputChanged,
    ServiceFinished,
}

/// Notifications produced by the orchestration core
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// Service lifecycle state changed
    StatusChanged(StatusInfo),
    /// The authoritative call state changed
    CallStateChanged(CallStatusInfo),
    /// Connection-quality details changed for the current call
    CallConnectionDetailsChanged(CallConnectionDetails),
    /// The video sub-state changed
    VideoStateChanged(VideoState),
    /// The effective audio output changed
    AudioOutputChanged {
        current: AudioOutputType,
        available: Vec<AudioOutputType>,
    },
    /// The service finished its termination protocol
    ServiceFinished,
}

impl CoreEvent {
    /// The filterable kind of this event
    pub fn kind(&self) -> CoreEventKind {
        match self {
            CoreEvent::StatusChanged(_) => CoreEventKind::StatusChanged,
            CoreEvent::CallStateChanged(_) => CoreEventKind::CallStateChanged,
            CoreEvent::CallConnectionDetailsChanged(_) => {
                CoreEventKind::CallConnectionDetailsChanged
            }
            CoreEvent::VideoStateChanged(_) => CoreEventKind::VideoStateChanged,
            CoreEvent::AudioOutputChanged { .. } => CoreEventKind::AudioOutputChanged,
            CoreEvent::ServiceFinished => CoreEventKind::ServiceFinished,
        }
    }
}

/// Handler for core notifications
///
/// All hooks default to doing nothing, so a subscriber implements only what
/// it renders. The unified [`on_core_event`] dispatcher rarely needs
/// overriding.
///
/// [`on_core_event`]: CoreEventHandler::on_core_event
#[async_trait]
pub trait CoreEventHandler: Send + Sync {
    /// Service lifecycle state changed
    async fn on_status_changed(&self, _info: StatusInfo) {}

    /// The authoritative call state changed
    async fn on_call_state_changed(&self, _info: CallStatusInfo) {}

    /// Connection-quality details changed
    async fn on_connection_details_changed(&self, _details: CallConnectionDetails) {}

    /// The video sub-state changed
    async fn on_video_state_changed(&self, _state: VideoState) {}

    /// The effective audio output changed
    async fn on_audio_output_changed(
        &self,
        _current: AudioOutputType,
        _available: Vec<AudioOutputType>,
    ) {
    }

    /// The service finished its termination protocol
    async fn on_service_finished(&self) {}

    /// Unified dispatcher
    async fn on_core_event(&self, event: CoreEvent) {
        match event {
            CoreEvent::StatusChanged(info) => self.on_status_changed(info).await,
            CoreEvent::CallStateChanged(info) => self.on_call_state_changed(info).await,
            CoreEvent::CallConnectionDetailsChanged(details) => {
                self.on_connection_details_changed(details).await
            }
            CoreEvent::VideoStateChanged(state) => self.on_video_state_changed(state).await,
            CoreEvent::AudioOutputChanged { current, available } => {
                self.on_audio_output_changed(current, available).await
            }
            CoreEvent::ServiceFinished => self.on_service_finished().await,
        }
    }
}

/// A handler registered with the emitter, optionally filtered by event kind
pub struct EventSubscription {
    handler: Arc<dyn CoreEventHandler>,
    kinds: Option<HashSet<CoreEventKind>>,
    id: uuid::Uuid,
}

impl EventSubscription {
    /// Subscribe to every event kind
    pub fn all_events(handler: Arc<dyn CoreEventHandler>) -> Self {
        Self {
            handler,
            kinds: None,
            id: uuid::Uuid::new_v4(),
        }
    }

    /// Subscribe to a specific set of event kinds
    pub fn for_kinds(handler: Arc<dyn CoreEventHandler>, kinds: HashSet<CoreEventKind>) -> Self {
        Self {
            handler,
            kinds: Some(kinds),
            id: uuid::Uuid::new_v4(),
        }
    }

    /// The subscription id used to unsubscribe
    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    /// Whether this subscription wants the given event
    pub fn should_receive(&self, event: &CoreEvent) -> bool {
        match &self.kinds {
            Some(kinds) => kinds.contains(&event.kind()),
            None => true,
        }
    }
}

impl Clone for EventSubscription {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            kinds: self.kinds.clone(),
            id: self.id,
        }
    }
}

/// Broadcasts core events to all matching subscriptions
pub struct EventEmitter {
    subscriptions: std::sync::RwLock<Vec<EventSubscription>>,
}

impl EventEmitter {
    /// Create an emitter with no subscriptions
    pub fn new() -> Self {
        Self {
            subscriptions: std::sync::RwLock::new(Vec::new()),
        }
    }

    /// Register a subscription; returns its id
    pub fn subscribe(&self, subscription: EventSubscription) -> uuid::Uuid {
        let id = subscription.id();
        self.subscriptions.write().unwrap().push(subscription);
        id
    }

    /// Remove a subscription; `true` if it existed
    pub fn unsubscribe(&self, subscription_id: uuid::Uuid) -> bool {
        let mut subscriptions = self.subscriptions.write().unwrap();
        if let Some(pos) = subscriptions.iter().position(|s| s.id() == subscription_id) {
            subscriptions.remove(pos);
            true
        } else {
            false
        }
    }

    /// Number of active subscriptions
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().unwrap().len()
    }

    /// Deliver an event to all matching subscriptions
    ///
    /// Fire-and-forget: each delivery runs on its own task and failures are
    /// logged, never propagated. Nothing is queued for future subscribers.
    pub fn emit(&self, event: CoreEvent) {
        let subscriptions = self.subscriptions.read().unwrap().clone();
        for subscription in subscriptions {
            if !subscription.should_receive(&event) {
                continue;
            }
            let event = event.clone();
            let handler = subscription.handler.clone();
            tokio::spawn(async move {
                handler.on_core_event(event).await;
            });
        }
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct CountingHandler {
        calls: AtomicUsize,
        notify: Notify,
    }

    impl CountingHandler {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                notify: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl CoreEventHandler for CountingHandler {
        async fn on_service_finished(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.notify.notify_one();
        }
    }

    #[tokio::test]
    async fn delivers_to_matching_subscribers_only() {
        let emitter = EventEmitter::new();
        let all = Arc::new(CountingHandler::new());
        let filtered = Arc::new(CountingHandler::new());

        emitter.subscribe(EventSubscription::all_events(all.clone()));
        let mut kinds = HashSet::new();
        kinds.insert(CoreEventKind::StatusChanged);
        emitter.subscribe(EventSubscription::for_kinds(filtered.clone(), kinds));

        emitter.emit(CoreEvent::ServiceFinished);
        all.notify.notified().await;

        assert_eq!(all.calls.load(Ordering::SeqCst), 1);
        assert_eq!(filtered.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let emitter = EventEmitter::new();
        let handler = Arc::new(CountingHandler::new());
        let id = emitter.subscribe(EventSubscription::all_events(handler.clone()));
        assert_eq!(emitter.subscription_count(), 1);

        assert!(emitter.unsubscribe(id));
        assert!(!emitter.unsubscribe(id));
        assert_eq!(emitter.subscription_count(), 0);

        emitter.emit(CoreEvent::ServiceFinished);
        tokio::task::yield_now().await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn call_status_round_trips_through_json() {
        let info = CallStatusInfo {
            remote_id: "bob".into(),
            gui_state: GuiCallState::Talking,
            end_reason: CallEndReason::None,
            auth_token: Some("sas".into()),
            auth_token_verified: true,
            duration_secs: Some(42),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&info).unwrap();
        let back: CallStatusInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back.remote_id, info.remote_id);
        assert_eq!(back.gui_state, info.gui_state);
        assert_eq!(back.duration_secs, Some(42));
    }
}
