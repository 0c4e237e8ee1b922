//! Subscribe-lane state: the subscriber connection and the remote tracks.

use super::lane::LaneHandle;
use super::observer::SessionEvent;
use super::Shared;
use crate::errors::SessionError;
use crate::media::MediaTrack;
use crate::transport::{ClientOptions, Subscriber, SubscriberEvent, SubscriberListener};
use crate::types::{Category, MediaKind, Role, SubscriberState};
use std::sync::Arc;

pub struct SubscribeSide {
    shared: Arc<Shared>,
    lane: LaneHandle<SubscribeSide>,
    state: SubscriberState,
    subscriber: Option<Box<dyn Subscriber>>,
    generation: u64,
    audio_track: Option<Arc<dyn MediaTrack>>,
    video_track: Option<Arc<dyn MediaTrack>>,
}

impl SubscribeSide {
    pub(crate) fn new(shared: Arc<Shared>, lane: LaneHandle<SubscribeSide>) -> Self {
        Self {
            shared,
            lane,
            state: SubscriberState::Disconnected,
            subscriber: None,
            generation: 0,
            audio_track: None,
            video_track: None,
        }
    }

    pub fn subscriber_state(&self) -> SubscriberState {
        self.state
    }

    fn set_state(&mut self, now: SubscriberState, tag: &str) {
        self.state = now;
        self.shared.hub.set_subscriber(now, tag);
    }

    fn ensure_subscriber(&mut self) -> Result<(), SessionError> {
        if self.subscriber.is_some() {
            return Ok(());
        }
        self.generation += 1;
        let generation = self.generation;
        let lane = self.lane.clone();
        let listener = SubscriberListener::new(move |event| {
            lane.enqueue(move |side: &mut SubscribeSide| side.on_event(generation, event));
        });
        self.subscriber = Some(self.shared.transport.create_subscriber(listener)?);
        log::debug!("[Sub] Created subscriber #{}", generation);
        Ok(())
    }

    fn subscriber_connected(&self) -> bool {
        self.subscriber.as_ref().map_or(false, |s| s.is_connected())
    }

    /// Connect the subscriber. A no-op when already connecting or connected.
    pub fn connect(&mut self) -> Result<(), SessionError> {
        match self.state {
            SubscriberState::Connecting
            | SubscriberState::Connected
            | SubscriberState::Subscribing => {
                log::info!("[Sub][Con] Not connecting as already {:?}", self.state);
                return Ok(());
            }
            SubscriberState::Disconnected => {}
        }
        if let Some(subscriber) = self.subscriber.as_ref() {
            if subscriber.is_subscribed() || subscriber.is_connected() {
                log::info!("[Sub][Con] Not connecting as subscriber is already connected");
                return Ok(());
            }
        }

        let credentials = self.shared.credentials.applied();
        credentials.validate_for_subscribe()?;
        self.ensure_subscriber()?;

        let options = ClientOptions {
            stereo: self.shared.config.media.stereo,
            ..ClientOptions::default()
        };
        let accepted = match self.subscriber.as_mut() {
            Some(subscriber) => {
                subscriber.set_options(&options);
                subscriber.set_credentials(&credentials);
                self.state = SubscriberState::Connecting;
                self.shared
                    .hub
                    .set_subscriber(SubscriberState::Connecting, "[Con]");
                subscriber.connect()
            }
            None => false,
        };

        if !accepted {
            self.set_state(SubscriberState::Disconnected, "[Con][Error]");
            return Err(SessionError::TransportFailure(
                "Could not connect subscriber".to_string(),
            ));
        }
        log::info!(
            "[Sub][Con] Connecting account {} stream {}...",
            credentials.account_id,
            credentials.sub_stream_name
        );
        Ok(())
    }

    pub fn start_subscribe(&mut self) -> Result<(), SessionError> {
        if self.state == SubscriberState::Subscribing {
            log::info!("[Sub][Start] Not subscribing as already subscribing");
            return Ok(());
        }
        if self.state != SubscriberState::Connected {
            return Err(SessionError::InvalidTransition(format!(
                "Unable to subscribe while {:?}",
                self.state
            )));
        }
        if !self.subscriber_connected() {
            self.set_state(SubscriberState::Disconnected, "[Start][Error]");
            return Err(SessionError::InvalidTransition(
                "Subscriber is not connected".to_string(),
            ));
        }

        let registry = self.shared.registry.clone();
        match registry.selected_playback() {
            Some(device) => match device.init_playback() {
                Ok(()) => log::info!("[Sub][Start] Playing audio on {}", device.name()),
                Err(e) => log::warn!("[Sub][Start] Playback {} failed: {}", device.name(), e),
            },
            None => log::warn!("[Sub][Start] No audio playback device available"),
        }

        if let Some(subscriber) = self.subscriber.as_mut() {
            subscriber.subscribe()?;
        }
        registry.set_active(Category::AudioPlayback, true);
        log::info!("[Sub][Start] Trying...");
        Ok(())
    }

    /// Unsubscribe and disconnect. Warns and does nothing unless subscribing.
    pub fn stop_subscribe(&mut self) -> Result<(), SessionError> {
        if self.state != SubscriberState::Subscribing {
            log::warn!(
                "[Sub][Stop] Not stopping as we are not subscribing, state is {:?}",
                self.state
            );
            return Ok(());
        }

        if let Some(subscriber) = self.subscriber.as_mut() {
            subscriber.unsubscribe();
        }
        self.shared
            .hub
            .set_media(Role::Subscriber, MediaKind::Audio, false);
        self.shared
            .hub
            .set_media(Role::Subscriber, MediaKind::Video, false);
        self.set_state(SubscriberState::Connected, "[Stop]");
        log::info!("[Sub][Stop] Stopped subscribe and going to disconnect...");
        self.release_subscriber();
        Ok(())
    }

    pub fn disconnect(&mut self) -> Result<(), SessionError> {
        if self.state == SubscriberState::Subscribing {
            return self.stop_subscribe();
        }
        if self.subscriber.is_none() && self.state == SubscriberState::Disconnected {
            log::info!("[Sub][Con][X] Not connected, nothing to disconnect");
            return Ok(());
        }
        self.release_subscriber();
        Ok(())
    }

    fn release_subscriber(&mut self) {
        if let Some(subscriber) = self.subscriber.as_mut() {
            if subscriber.is_connected() {
                subscriber.disconnect();
            } else {
                log::debug!("[Sub][Con][X] Subscriber was not connected");
            }
        }
        self.set_state(SubscriberState::Disconnected, "[Con][X]");
        // Remote tracks go only after the connection is down.
        self.clear_tracks();
        self.subscriber = None;
        self.shared
            .registry
            .set_active(Category::AudioPlayback, false);
    }

    fn clear_tracks(&mut self) {
        self.audio_track = None;
        self.video_track = None;
        self.shared
            .hub
            .set_media(Role::Subscriber, MediaKind::Audio, false);
        self.shared
            .hub
            .set_media(Role::Subscriber, MediaKind::Video, false);
    }

    // Events

    pub(crate) fn on_event(&mut self, generation: u64, event: SubscriberEvent) {
        if generation != self.generation || self.subscriber.is_none() {
            log::debug!(
                "[Sub][Ltn] Dropping {} from released subscriber #{}",
                event.name(),
                generation
            );
            return;
        }

        let hub = self.shared.hub.clone();
        let result = match event {
            SubscriberEvent::Connected => self.on_connected(),
            SubscriberEvent::ConnectionError { status, reason } => {
                self.set_state(SubscriberState::Disconnected, "[Ltn][Con][Error]");
                Err(SessionError::TransportFailure(format!(
                    "Failed to connect as {}! Status: {}",
                    reason, status
                )))
            }
            SubscriberEvent::Subscribed => self.on_subscribed(),
            SubscriberEvent::SubscribedError(error) => self.on_subscribed_error(&error),
            SubscriberEvent::Stopped => self.on_stopped(),
            SubscriberEvent::Disconnected => {
                self.set_state(SubscriberState::Disconnected, "[Ltn][Con][X]");
                self.clear_tracks();
                self.shared
                    .registry
                    .set_active(Category::AudioPlayback, false);
                Ok(())
            }
            SubscriberEvent::AudioTrack {
                track,
                transceiver_id,
            } => self.on_track(MediaKind::Audio, track, transceiver_id),
            SubscriberEvent::VideoTrack {
                track,
                transceiver_id,
            } => self.on_track(MediaKind::Video, track, transceiver_id),
            SubscriberEvent::SignalingError(message) => {
                hub.emit(SessionEvent::SignalingError {
                    role: Role::Subscriber,
                    message,
                });
                Ok(())
            }
            SubscriberEvent::Stats(report) => {
                hub.emit(SessionEvent::Stats {
                    role: Role::Subscriber,
                    report,
                });
                Ok(())
            }
            SubscriberEvent::Active {
                stream_id,
                tracks,
                source_id,
            } => {
                log::info!(
                    "[Sub][Ltn] Stream {} active with tracks {:?}",
                    stream_id,
                    tracks
                );
                hub.emit(SessionEvent::SourceActivity {
                    role: Role::Subscriber,
                    active: true,
                    stream_id: Some(stream_id),
                    source_id,
                });
                Ok(())
            }
            SubscriberEvent::Inactive {
                stream_id,
                source_id,
            } => {
                hub.emit(SessionEvent::SourceActivity {
                    role: Role::Subscriber,
                    active: false,
                    stream_id: Some(stream_id),
                    source_id,
                });
                Ok(())
            }
            SubscriberEvent::Layers {
                mid,
                active,
                inactive,
            } => {
                hub.emit(SessionEvent::Layers {
                    mid,
                    active,
                    inactive,
                });
                Ok(())
            }
            SubscriberEvent::Vad { mid, source_id } => {
                hub.emit(SessionEvent::Vad { mid, source_id });
                Ok(())
            }
            SubscriberEvent::ViewerCount(count) => {
                hub.emit(SessionEvent::ViewerCount {
                    role: Role::Subscriber,
                    count,
                });
                Ok(())
            }
        };
        if let Err(e) = result {
            hub.report("Sub][Ltn", &e);
        }
    }

    fn on_connected(&mut self) -> Result<(), SessionError> {
        if self.state != SubscriberState::Connecting {
            log::warn!("[Sub][Ltn][Con] Connected while {:?}, ignoring", self.state);
            return Ok(());
        }
        self.set_state(SubscriberState::Connected, "[Ltn][Con]");
        if self.shared.config.session.auto_subscribe_on_connect {
            log::info!("[Sub][Ltn][Con] Trying to subscribe...");
            self.start_subscribe()?;
        }
        Ok(())
    }

    fn on_subscribed(&mut self) -> Result<(), SessionError> {
        if self.state != SubscriberState::Connected {
            log::warn!("[Sub][Ltn] Subscribed reported while {:?}, ignoring", self.state);
            return Ok(());
        }
        self.set_state(SubscriberState::Subscribing, "[Ltn]");
        Ok(())
    }

    fn on_subscribed_error(&mut self, error: &str) -> Result<(), SessionError> {
        self.shared
            .registry
            .set_active(Category::AudioPlayback, false);
        if self.state == SubscriberState::Subscribing {
            self.set_state(SubscriberState::Connected, "[Ltn][Error]");
        }
        Err(SessionError::TransportFailure(format!(
            "Failed to subscribe: {}",
            error
        )))
    }

    fn on_stopped(&mut self) -> Result<(), SessionError> {
        if self.state == SubscriberState::Subscribing {
            self.set_state(SubscriberState::Connected, "[Ltn][Stop]");
        }
        self.clear_tracks();
        Ok(())
    }

    fn on_track(
        &mut self,
        kind: MediaKind,
        track: Arc<dyn MediaTrack>,
        transceiver_id: Option<String>,
    ) -> Result<(), SessionError> {
        log::info!(
            "[Sub][Track] {} track {} on transceiver {:?}",
            kind.as_str(),
            track.id(),
            transceiver_id
        );
        let enabled = track.is_enabled();
        let track_id = track.id();
        match kind {
            MediaKind::Audio => self.audio_track = Some(track),
            MediaKind::Video => self.video_track = Some(track),
        }
        self.shared.hub.set_media(Role::Subscriber, kind, enabled);
        self.shared.hub.emit(SessionEvent::RenderRequested {
            role: Role::Subscriber,
            kind,
            track_id,
        });
        Ok(())
    }

    // Tracks and playback

    /// Flip the enabled state of a subscribed track; returns the confirmed state.
    pub fn toggle_media(&mut self, kind: MediaKind) -> Result<bool, SessionError> {
        let track = match kind {
            MediaKind::Audio => self.audio_track.as_ref(),
            MediaKind::Video => self.video_track.as_ref(),
        }
        .ok_or_else(|| {
            SessionError::ResourceUnavailable(format!("No subscribed {} track", kind.as_str()))
        })?;

        let requested = !self.shared.hub.media(Role::Subscriber, kind);
        let confirmed = track.set_enabled(requested);
        self.shared.hub.set_media(Role::Subscriber, kind, confirmed);
        Ok(confirmed)
    }

    pub fn set_remote_audio_volume(&mut self, volume: f64) -> Result<(), SessionError> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(SessionError::InvalidArgument(format!(
                "Volume {} is outside 0.0..=1.0",
                volume
            )));
        }
        let track = match (self.state, self.audio_track.as_ref()) {
            (SubscriberState::Subscribing, Some(track)) => track,
            _ => {
                return Err(SessionError::ResourceUnavailable(
                    "Can't set audio volume without a subscribed audio track".to_string(),
                ))
            }
        };
        track.set_volume(volume)?;
        log::info!("[Sub][Audio] Volume set to {}", volume);
        Ok(())
    }

    /// Select the next playback device. Refused while subscribing.
    pub fn switch_audio_playback(&mut self, ascending: bool) -> Result<usize, SessionError> {
        if self.state == SubscriberState::Subscribing {
            return Err(SessionError::ResourceBusy(
                "Unable to change audio playback while subscribing".to_string(),
            ));
        }
        self.shared
            .registry
            .select_next(Category::AudioPlayback, ascending)
    }
}
