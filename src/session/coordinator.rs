//! Public entry point: an explicitly constructed, explicitly owned session.

use super::lane::{Lane, Ticket};
use super::observer::{SessionEvent, SessionSnapshot, StateHub};
use super::publish::PublishSide;
use super::subscribe::SubscribeSide;
use super::Shared;
use crate::config::SessionConfig;
use crate::credentials::{CredentialSource, CredentialStore, KeyValueStore};
use crate::errors::SessionError;
use crate::media::{MediaBackend, MediaRegistry};
use crate::transport::TransportFactory;
use crate::types::{Category, MediaKind, Role};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// Coordinates capture, publishing and subscribing.
///
/// Every operation is queued onto the lane owning the state it changes and
/// returns a [`Ticket`]. Failures are logged, published on the alert channel
/// and returned through the ticket; dropping a ticket is fine.
pub struct SessionCoordinator {
    shared: Arc<Shared>,
    publish: Lane<PublishSide>,
    subscribe: Lane<SubscribeSide>,
}

impl SessionCoordinator {
    pub fn new(
        config: SessionConfig,
        backend: Arc<dyn MediaBackend>,
        transport: Arc<dyn TransportFactory>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, SessionError> {
        config.validate().map_err(SessionError::Config)?;

        let registry = Arc::new(MediaRegistry::new(backend, store.clone()));
        let credentials = Arc::new(CredentialStore::new(config.credentials.clone(), store));
        let shared = Arc::new(Shared {
            config,
            registry,
            credentials,
            transport,
            hub: StateHub::new(),
        });

        let publish = {
            let shared = shared.clone();
            Lane::spawn_with("publish", move |lane| PublishSide::new(shared, lane))?
        };
        let subscribe = {
            let shared = shared.clone();
            Lane::spawn_with("subscribe", move |lane| SubscribeSide::new(shared, lane))?
        };

        log::info!(
            "Session ready. Camera: {} Capability: {} Codecs: {}/{}",
            shared.registry.video_source_name(),
            shared.registry.capability_name(),
            shared.registry.codec_name(MediaKind::Audio),
            shared.registry.codec_name(MediaKind::Video)
        );

        Ok(Self {
            shared,
            publish,
            subscribe,
        })
    }

    fn on_publish<T, F>(&self, tag: &'static str, task: F) -> Ticket<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PublishSide) -> Result<T, SessionError> + Send + 'static,
    {
        log::debug!("[Pub] Queueing {}", tag);
        let hub = self.shared.hub.clone();
        self.publish.handle().submit(move |side| {
            let result = task(side);
            if let Err(e) = &result {
                hub.report(tag, e);
            }
            result
        })
    }

    fn on_subscribe<T, F>(&self, tag: &'static str, task: F) -> Ticket<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SubscribeSide) -> Result<T, SessionError> + Send + 'static,
    {
        log::debug!("[Sub] Queueing {}", tag);
        let hub = self.shared.hub.clone();
        self.subscribe.handle().submit(move |side| {
            let result = task(side);
            if let Err(e) = &result {
                hub.report(tag, e);
            }
            result
        })
    }

    // Observation

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.hub.snapshot()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.hub.watch()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.hub.events()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub fn registry(&self) -> &MediaRegistry {
        &self.shared.registry
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.shared.credentials
    }

    /// Apply credentials for the next connect, optionally saving them.
    pub fn apply_credentials(
        &self,
        source: &dyn CredentialSource,
        save: bool,
    ) -> Result<(), SessionError> {
        self.shared.credentials.apply(source, save)
    }

    /// Re-read every device and codec list, clamping stale selections.
    ///
    /// Selections in use stay on their device until it is released.
    pub fn refresh_devices(&self) {
        for category in Category::ALL {
            self.shared.registry.refresh(category);
        }
    }

    // Capture

    pub fn start_capture(&self) -> Ticket<()> {
        self.on_publish("Capture][Start", |side| side.start_capture())
    }

    pub fn stop_capture(&self) -> Ticket<()> {
        self.on_publish("Capture][Stop", |side| side.stop_capture())
    }

    pub fn start_capture_video(&self) -> Ticket<()> {
        self.on_publish("Video][Capture", |side| side.start_capture_video())
    }

    pub fn stop_capture_video(&self) -> Ticket<()> {
        self.on_publish("Video][Capture][Stop", |side| side.stop_capture_video())
    }

    pub fn start_capture_audio(&self) -> Ticket<()> {
        self.on_publish("Audio][Capture", |side| side.start_capture_audio())
    }

    pub fn stop_capture_audio(&self) -> Ticket<()> {
        self.on_publish("Audio][Capture][Stop", |side| side.stop_capture_audio())
    }

    // Publish

    pub fn connect_publisher(&self) -> Ticket<()> {
        self.on_publish("Pub][Con", |side| side.connect())
    }

    pub fn start_publish(&self) -> Ticket<()> {
        self.on_publish("Pub][Start", |side| side.start_publish())
    }

    pub fn stop_publish(&self) -> Ticket<()> {
        self.on_publish("Pub][Stop", |side| side.stop_publish())
    }

    pub fn disconnect_publisher(&self) -> Ticket<()> {
        self.on_publish("Pub][Con][X", |side| side.disconnect())
    }

    /// Stop publishing, then stop capturing, as two consecutive publish-lane tasks.
    pub fn stop_publish_and_capture(&self) -> Ticket<()> {
        let _ = self.stop_publish();
        self.stop_capture()
    }

    pub fn refresh_pub_video(&self) -> Ticket<()> {
        self.on_publish("Video][Refresh", |side| side.refresh_pub_video())
    }

    // Selection

    pub fn switch_video_source(&self, ascending: bool) -> Ticket<usize> {
        self.on_publish("Video][Source][Switch", move |side| {
            side.switch_video_source(ascending)
        })
    }

    pub fn toggle_video_source(&self, ascending: bool) -> Ticket<usize> {
        self.on_publish("Video][Source][Toggle", move |side| {
            side.toggle_video_source(ascending)
        })
    }

    pub fn toggle_capability(&self, ascending: bool) -> Ticket<usize> {
        self.on_publish("Capability][Toggle", move |side| {
            side.toggle_capability(ascending)
        })
    }

    pub fn switch_audio_source(&self, ascending: bool) -> Ticket<usize> {
        self.on_publish("Audio][Source][Switch", move |side| {
            side.switch_audio_source(ascending)
        })
    }

    pub fn switch_codec(&self, kind: MediaKind, ascending: bool) -> Ticket<usize> {
        self.on_publish("Codec][Switch", move |side| side.switch_codec(kind, ascending))
    }

    pub fn switch_audio_playback(&self, ascending: bool) -> Ticket<usize> {
        self.on_subscribe("Audio][Playback][Switch", move |side| {
            side.switch_audio_playback(ascending)
        })
    }

    // Tracks

    /// Mute or unmute a track; the ticket yields the confirmed enabled state.
    pub fn toggle_media(&self, role: Role, kind: MediaKind) -> Ticket<bool> {
        match role {
            Role::Publisher => self.on_publish("Pub][Media", move |side| side.toggle_media(kind)),
            Role::Subscriber => {
                self.on_subscribe("Sub][Media", move |side| side.toggle_media(kind))
            }
        }
    }

    pub fn set_remote_audio_volume(&self, volume: f64) -> Ticket<()> {
        self.on_subscribe("Sub][Volume", move |side| {
            side.set_remote_audio_volume(volume)
        })
    }

    // Subscribe

    pub fn connect_subscriber(&self) -> Ticket<()> {
        self.on_subscribe("Sub][Con", |side| side.connect())
    }

    pub fn start_subscribe(&self) -> Ticket<()> {
        self.on_subscribe("Sub][Start", |side| side.start_subscribe())
    }

    pub fn stop_subscribe(&self) -> Ticket<()> {
        self.on_subscribe("Sub][Stop", |side| side.stop_subscribe())
    }

    pub fn disconnect_subscriber(&self) -> Ticket<()> {
        self.on_subscribe("Sub][Con][X", |side| side.disconnect())
    }

    /// Finish queued work and stop both lanes. Later operations resolve to
    /// `LaneClosed`.
    pub fn shutdown(&mut self) {
        if self.publish.is_running() || self.subscribe.is_running() {
            log::info!("Shutting down session lanes");
        }
        self.publish.shutdown();
        self.subscribe.shutdown();
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
