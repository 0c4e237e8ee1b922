//! State publication for presentation layers.
//!
//! Lanes write through the [`StateHub`]; observers either read the latest
//! [`SessionSnapshot`] from a watch channel or follow the [`SessionEvent`]
//! stream on a broadcast channel. Both are eventually consistent with the
//! lanes.

use crate::errors::SessionError;
use crate::transport::{LayerData, StatsReport};
use crate::types::{CaptureState, MediaEnableState, MediaKind, PublisherState, Role, SubscriberState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

const EVENT_CAPACITY: usize = 256;

/// Immutable view of everything a presentation layer shows.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SessionSnapshot {
    pub capture: CaptureState,
    pub publisher: PublisherState,
    pub subscriber: SubscriberState,
    pub media: MediaEnableState,
    /// Latest human readable error, if any.
    pub alert: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub enum SessionEvent {
    CaptureChanged {
        now: CaptureState,
        was: CaptureState,
    },
    PublisherChanged {
        now: PublisherState,
        was: PublisherState,
    },
    SubscriberChanged {
        now: SubscriberState,
        was: SubscriberState,
    },
    MediaChanged {
        role: Role,
        kind: MediaKind,
        enabled: bool,
    },
    Alert {
        message: String,
        at: DateTime<Utc>,
    },
    /// A track should be attached to (or re-attached to) its renderer.
    RenderRequested {
        role: Role,
        kind: MediaKind,
        track_id: String,
    },
    ViewerCount {
        role: Role,
        count: u32,
    },
    SourceActivity {
        role: Role,
        active: bool,
        stream_id: Option<String>,
        source_id: Option<String>,
    },
    Stats {
        role: Role,
        report: StatsReport,
    },
    Layers {
        mid: String,
        active: Vec<LayerData>,
        inactive: Vec<LayerData>,
    },
    Vad {
        mid: String,
        source_id: Option<String>,
    },
    SignalingError {
        role: Role,
        message: String,
    },
}

/// Shared writer side of the snapshot and event channels.
#[derive(Clone)]
pub struct StateHub {
    state: Arc<watch::Sender<SessionSnapshot>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for StateHub {
    fn default() -> Self {
        Self::new()
    }
}

impl StateHub {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(state),
            events,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn emit(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    pub fn set_capture(&self, now: CaptureState, tag: &str) -> CaptureState {
        let mut was = now;
        self.state.send_if_modified(|snapshot| {
            was = snapshot.capture;
            snapshot.capture = now;
            was != now
        });
        if was != now {
            log::info!("[State][Capture]{} Now: {:?} Was: {:?}", tag, now, was);
            self.emit(SessionEvent::CaptureChanged { now, was });
        }
        was
    }

    pub fn set_publisher(&self, now: PublisherState, tag: &str) -> PublisherState {
        let mut was = now;
        self.state.send_if_modified(|snapshot| {
            was = snapshot.publisher;
            snapshot.publisher = now;
            was != now
        });
        if was != now {
            log::info!("[State][Pub]{} Now: {:?} Was: {:?}", tag, now, was);
            self.emit(SessionEvent::PublisherChanged { now, was });
        }
        was
    }

    pub fn set_subscriber(&self, now: SubscriberState, tag: &str) -> SubscriberState {
        let mut was = now;
        self.state.send_if_modified(|snapshot| {
            was = snapshot.subscriber;
            snapshot.subscriber = now;
            was != now
        });
        if was != now {
            log::info!("[State][Sub]{} Now: {:?} Was: {:?}", tag, now, was);
            self.emit(SessionEvent::SubscriberChanged { now, was });
        }
        was
    }

    pub fn media(&self, role: Role, kind: MediaKind) -> bool {
        self.state.borrow().media.get(role, kind)
    }

    pub fn set_media(&self, role: Role, kind: MediaKind, enabled: bool) {
        let changed = self.state.send_if_modified(|snapshot| {
            let changed = snapshot.media.get(role, kind) != enabled;
            snapshot.media.set(role, kind, enabled);
            changed
        });
        if changed {
            log::info!(
                "[State][Media] {} {} enabled: {}",
                role.as_str(),
                kind.as_str(),
                enabled
            );
            self.emit(SessionEvent::MediaChanged {
                role,
                kind,
                enabled,
            });
        }
    }

    /// Publish a message on the alert channel.
    pub fn alert(&self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("[Alert] {}", message);
        let text = message.clone();
        self.state.send_modify(|snapshot| snapshot.alert = Some(text));
        self.emit(SessionEvent::Alert {
            message,
            at: Utc::now(),
        });
    }

    /// Log a failed lane task and alert about it when it is user facing.
    pub fn report(&self, tag: &str, error: &SessionError) {
        if error.is_user_facing() {
            self.alert(format!("[{}] {}", tag, error));
        } else {
            log::debug!("[{}] {}", tag, error);
        }
    }
}
