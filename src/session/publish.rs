//! Publish-lane state: capture, the publisher connection and device switching.
//!
//! Everything in here runs on the publish lane, so the fields need no locking.
//! Events from the publisher arrive as separate lane tasks through
//! [`PublishSide::on_event`].

use super::lane::LaneHandle;
use super::observer::SessionEvent;
use super::Shared;
use crate::errors::SessionError;
use crate::media::{source_label, CaptureSource, MediaTrack};
use crate::transport::{ClientOptions, Publisher, PublisherEvent, PublisherListener};
use crate::types::{CaptureState, Category, MediaKind, PublisherState, Role};
use std::sync::Arc;

pub struct PublishSide {
    shared: Arc<Shared>,
    lane: LaneHandle<PublishSide>,
    capture: CaptureState,
    state: PublisherState,
    publisher: Option<Box<dyn Publisher>>,
    /// Bumped for every publisher created; events tagged with an older value
    /// come from a released publisher.
    generation: u64,
    audio_source: Option<Arc<dyn CaptureSource>>,
    video_source: Option<Arc<dyn CaptureSource>>,
    audio_track: Option<Arc<dyn MediaTrack>>,
    video_track: Option<Arc<dyn MediaTrack>>,
    options: ClientOptions,
    republish_pending: bool,
}

impl PublishSide {
    pub(crate) fn new(shared: Arc<Shared>, lane: LaneHandle<PublishSide>) -> Self {
        let options = ClientOptions {
            audio_codec: Some(shared.config.media.default_audio_codec.clone()),
            video_codec: Some(shared.config.media.default_video_codec.clone()),
            stereo: shared.config.media.stereo,
        };
        Self {
            shared,
            lane,
            capture: CaptureState::NotCaptured,
            state: PublisherState::Disconnected,
            publisher: None,
            generation: 0,
            audio_source: None,
            video_source: None,
            audio_track: None,
            video_track: None,
            options,
            republish_pending: false,
        }
    }

    pub fn capture_state(&self) -> CaptureState {
        self.capture
    }

    pub fn publisher_state(&self) -> PublisherState {
        self.state
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    fn set_capture(&mut self, now: CaptureState, tag: &str) {
        self.capture = now;
        self.shared.hub.set_capture(now, tag);
    }

    fn set_state(&mut self, now: PublisherState, tag: &str) {
        self.state = now;
        self.shared.hub.set_publisher(now, tag);
    }

    // Capture

    /// Start both audio and video capture.
    ///
    /// An audio failure is reported but does not stop video capture; the
    /// result is the video outcome.
    pub fn start_capture(&mut self) -> Result<(), SessionError> {
        if let Err(e) = self.start_capture_audio() {
            self.shared.hub.report("Capture][Audio", &e);
        }
        self.start_capture_video()
    }

    pub fn stop_capture(&mut self) -> Result<(), SessionError> {
        self.stop_capture_video()?;
        self.stop_capture_audio()
    }

    pub fn start_capture_video(&mut self) -> Result<(), SessionError> {
        if self.capture != CaptureState::NotCaptured {
            return Err(SessionError::InvalidTransition(format!(
                "Unable to start video capture while {:?}",
                self.capture
            )));
        }

        self.set_capture(CaptureState::TryCapture, "[Video][Capture]");
        let (source, track) = match self.acquire_video() {
            Ok(acquired) => acquired,
            Err(e) => {
                self.set_capture(CaptureState::NotCaptured, "[Video][Capture][Rollback]");
                return Err(e);
            }
        };

        let registry = &self.shared.registry;
        registry.set_active(Category::VideoSource, true);
        registry.set_active(Category::Capability, true);
        log::info!(
            "[Video][Capture] Capturing on {}",
            source_label(source.as_ref(), true)
        );

        self.video_source = Some(source);
        self.video_track = Some(track.clone());
        self.set_capture(CaptureState::IsCaptured, "[Video][Capture]");
        self.shared
            .hub
            .set_media(Role::Publisher, MediaKind::Video, track.is_enabled());
        self.shared.hub.emit(SessionEvent::RenderRequested {
            role: Role::Publisher,
            kind: MediaKind::Video,
            track_id: track.id(),
        });
        Ok(())
    }

    fn acquire_video(&self) -> Result<(Arc<dyn CaptureSource>, Arc<dyn MediaTrack>), SessionError> {
        let registry = &self.shared.registry;
        let source = registry.selected_video_source().ok_or_else(|| {
            SessionError::ResourceUnavailable("No video source available".to_string())
        })?;
        let capability = registry.selected_capability().ok_or_else(|| {
            SessionError::ResourceUnavailable(format!(
                "No capability available for {}",
                source.name()
            ))
        })?;
        source.set_capability(&capability)?;
        log::debug!("[Video][Capture] Capability set to {}", capability);
        let track = source.start_capture()?;
        Ok((source, track))
    }

    pub fn stop_capture_video(&mut self) -> Result<(), SessionError> {
        let Some(source) = self.video_source.take() else {
            log::info!("[Video][Capture][Stop] Not capturing, nothing to stop");
            return Ok(());
        };

        source.stop_capture();
        let registry = &self.shared.registry;
        registry.set_active(Category::VideoSource, false);
        registry.set_active(Category::Capability, false);
        // The track goes only after its source has stopped.
        self.video_track = None;
        self.set_capture(CaptureState::NotCaptured, "[Video][Capture][Stop]");
        self.shared
            .hub
            .set_media(Role::Publisher, MediaKind::Video, false);
        Ok(())
    }

    pub fn start_capture_audio(&mut self) -> Result<(), SessionError> {
        if self.audio_track.is_some() {
            return Err(SessionError::InvalidTransition(
                "Audio is already captured".to_string(),
            ));
        }

        let source = self.shared.registry.selected_audio_source().ok_or_else(|| {
            SessionError::ResourceUnavailable("No audio source available".to_string())
        })?;
        let track = source.start_capture()?;
        self.shared.registry.set_active(Category::AudioSource, true);
        log::info!(
            "[Audio][Capture] Capturing on {}",
            source_label(source.as_ref(), true)
        );

        self.audio_source = Some(source);
        self.audio_track = Some(track.clone());
        self.shared
            .hub
            .set_media(Role::Publisher, MediaKind::Audio, track.is_enabled());
        Ok(())
    }

    pub fn stop_capture_audio(&mut self) -> Result<(), SessionError> {
        let Some(source) = self.audio_source.take() else {
            log::info!("[Audio][Capture][Stop] Not capturing, nothing to stop");
            return Ok(());
        };

        source.stop_capture();
        self.shared.registry.set_active(Category::AudioSource, false);
        self.audio_track = None;
        self.shared
            .hub
            .set_media(Role::Publisher, MediaKind::Audio, false);
        Ok(())
    }

    // Connection

    fn ensure_publisher(&mut self) -> Result<(), SessionError> {
        if self.publisher.is_some() {
            return Ok(());
        }
        self.generation += 1;
        let generation = self.generation;
        let lane = self.lane.clone();
        let listener = PublisherListener::new(move |event| {
            lane.enqueue(move |side: &mut PublishSide| side.on_event(generation, event));
        });
        self.publisher = Some(self.shared.transport.create_publisher(listener)?);
        log::debug!("[Pub] Created publisher #{}", generation);
        Ok(())
    }

    fn publisher_connected(&self) -> bool {
        self.publisher.as_ref().map_or(false, |p| p.is_connected())
    }

    /// Connect the publisher. A no-op when already connecting or connected.
    pub fn connect(&mut self) -> Result<(), SessionError> {
        match self.state {
            PublisherState::Connecting | PublisherState::Connected | PublisherState::Publishing => {
                log::info!("[Pub][Con] Not connecting as already {:?}", self.state);
                return Ok(());
            }
            PublisherState::Disconnected => {}
        }
        if self.publisher_connected() {
            log::info!("[Pub][Con] Not connecting as publisher is already connected");
            return Ok(());
        }

        let credentials = self.shared.credentials.applied();
        credentials.validate_for_publish()?;
        self.ensure_publisher()?;

        let options = self.options.clone();
        let accepted = match self.publisher.as_mut() {
            Some(publisher) => {
                publisher.set_options(&options);
                publisher.set_credentials(&credentials);
                self.state = PublisherState::Connecting;
                self.shared
                    .hub
                    .set_publisher(PublisherState::Connecting, "[Con]");
                publisher.connect()
            }
            None => false,
        };

        if !accepted {
            self.republish_pending = false;
            self.set_state(PublisherState::Disconnected, "[Con][Error]");
            return Err(SessionError::TransportFailure(
                "Could not connect publisher".to_string(),
            ));
        }
        log::info!(
            "[Pub][Con] Connecting stream {}...",
            credentials.pub_stream_name
        );
        Ok(())
    }

    /// Add the captured tracks to the publisher and start publishing.
    pub fn start_publish(&mut self) -> Result<(), SessionError> {
        if self.state == PublisherState::Publishing {
            log::info!("[Pub][Start] Not publishing as already publishing");
            return Ok(());
        }
        if self.state != PublisherState::Connected {
            return Err(SessionError::InvalidTransition(format!(
                "Unable to publish while {:?}",
                self.state
            )));
        }
        if !self.publisher_connected() {
            self.set_state(PublisherState::Disconnected, "[Start][Error]");
            return Err(SessionError::InvalidTransition(
                "Publisher is not connected".to_string(),
            ));
        }
        if self.audio_track.is_none() && self.video_track.is_none() {
            return Err(SessionError::InvalidTransition(
                "Neither audio nor video is captured".to_string(),
            ));
        }

        let shared = self.shared.clone();
        let codecs = shared
            .registry
            .publish_codecs(&shared.config.media, &shared.config.codec_policy);
        self.options.audio_codec = Some(codecs.audio);
        self.options.video_codec = Some(codecs.video);

        let tracks: Vec<Arc<dyn MediaTrack>> = self
            .audio_track
            .iter()
            .chain(self.video_track.iter())
            .cloned()
            .collect();
        let options = self.options.clone();
        let Some(publisher) = self.publisher.as_mut() else {
            return Err(SessionError::InvalidTransition(
                "Publisher is not available".to_string(),
            ));
        };
        for track in tracks {
            log::debug!("[Pub][Start] Adding {} track {}", track.kind().as_str(), track.id());
            publisher.add_track(track);
        }
        publisher.set_options(&options);
        publisher.publish()?;

        shared.registry.set_active(Category::AudioCodec, true);
        shared.registry.set_active(Category::VideoCodec, true);
        log::info!("[Pub][Start] Trying...");
        Ok(())
    }

    /// Unpublish and disconnect. Warns and does nothing unless publishing.
    pub fn stop_publish(&mut self) -> Result<(), SessionError> {
        if self.state != PublisherState::Publishing {
            log::warn!(
                "[Pub][Stop] Not stopping as we are not publishing, state is {:?}",
                self.state
            );
            return Ok(());
        }

        if let Some(publisher) = self.publisher.as_mut() {
            publisher.unpublish();
        }
        self.set_codecs_active(false);
        self.set_state(PublisherState::Connected, "[Stop]");
        log::info!("[Pub][Stop] Stopped publish and going to disconnect...");
        self.release_publisher();
        Ok(())
    }

    /// Disconnect whatever connection exists, stopping publish first if needed.
    pub fn disconnect(&mut self) -> Result<(), SessionError> {
        if self.state == PublisherState::Publishing {
            return self.stop_publish();
        }
        if self.publisher.is_none() && self.state == PublisherState::Disconnected {
            log::info!("[Pub][Con][X] Not connected, nothing to disconnect");
            return Ok(());
        }
        self.republish_pending = false;
        self.release_publisher();
        Ok(())
    }

    fn release_publisher(&mut self) {
        if let Some(publisher) = self.publisher.as_mut() {
            if publisher.is_connected() {
                publisher.disconnect();
            } else {
                log::debug!("[Pub][Con][X] Publisher was not connected");
            }
        }
        self.set_state(PublisherState::Disconnected, "[Con][X]");
        self.options.video_codec = Some(self.shared.config.media.default_video_codec.clone());
        self.publisher = None;
    }

    fn set_codecs_active(&self, active: bool) {
        self.shared.registry.set_active(Category::AudioCodec, active);
        self.shared.registry.set_active(Category::VideoCodec, active);
    }

    // Events

    pub(crate) fn on_event(&mut self, generation: u64, event: PublisherEvent) {
        if generation != self.generation || self.publisher.is_none() {
            log::debug!(
                "[Pub][Ltn] Dropping {} from released publisher #{}",
                event.name(),
                generation
            );
            return;
        }

        let hub = self.shared.hub.clone();
        let result = match event {
            PublisherEvent::Connected => self.on_connected(),
            PublisherEvent::ConnectionError { status, reason } => {
                self.on_connection_error(status, &reason)
            }
            PublisherEvent::Publishing => self.on_publishing(),
            PublisherEvent::PublishingError(error) => self.on_publishing_error(&error),
            PublisherEvent::Disconnected => self.on_disconnected(),
            PublisherEvent::SignalingError(message) => {
                hub.emit(SessionEvent::SignalingError {
                    role: Role::Publisher,
                    message,
                });
                Ok(())
            }
            PublisherEvent::Stats(report) => {
                hub.emit(SessionEvent::Stats {
                    role: Role::Publisher,
                    report,
                });
                Ok(())
            }
            PublisherEvent::ViewerCount(count) => {
                hub.emit(SessionEvent::ViewerCount {
                    role: Role::Publisher,
                    count,
                });
                Ok(())
            }
            PublisherEvent::Active => {
                hub.emit(activity(true));
                Ok(())
            }
            PublisherEvent::Inactive => {
                hub.emit(activity(false));
                Ok(())
            }
        };
        if let Err(e) = result {
            hub.report("Pub][Ltn", &e);
        }
    }

    fn on_connected(&mut self) -> Result<(), SessionError> {
        if self.state != PublisherState::Connecting {
            // A late event after an explicit disconnect.
            log::warn!("[Pub][Ltn][Con] Connected while {:?}, ignoring", self.state);
            return Ok(());
        }
        self.set_state(PublisherState::Connected, "[Ltn][Con]");

        let republish = std::mem::take(&mut self.republish_pending);
        if self.shared.config.session.auto_publish_on_connect || republish {
            log::info!("[Pub][Ltn][Con] Trying to publish...");
            self.start_publish()?;
        }
        Ok(())
    }

    fn on_connection_error(&mut self, status: i32, reason: &str) -> Result<(), SessionError> {
        self.republish_pending = false;
        self.set_codecs_active(false);
        self.set_state(PublisherState::Disconnected, "[Ltn][Con][Error]");
        Err(SessionError::TransportFailure(format!(
            "Failed to connect as {}! Status: {}",
            reason, status
        )))
    }

    fn on_publishing(&mut self) -> Result<(), SessionError> {
        if self.state != PublisherState::Connected {
            log::warn!("[Pub][Ltn] Publishing reported while {:?}, ignoring", self.state);
            return Ok(());
        }
        self.set_state(PublisherState::Publishing, "[Ltn]");
        Ok(())
    }

    fn on_publishing_error(&mut self, error: &str) -> Result<(), SessionError> {
        self.set_codecs_active(false);
        if self.state == PublisherState::Publishing {
            self.set_state(PublisherState::Connected, "[Ltn][Error]");
        }
        Err(SessionError::TransportFailure(format!(
            "Failed to publish: {}",
            error
        )))
    }

    fn on_disconnected(&mut self) -> Result<(), SessionError> {
        self.set_codecs_active(false);
        self.republish_pending = false;
        self.set_state(PublisherState::Disconnected, "[Ltn][Con][X]");
        self.options.video_codec = Some(self.shared.config.media.default_video_codec.clone());
        Ok(())
    }

    // Selection and switching

    /// Move to the next camera, restarting capture and publish around it.
    pub fn switch_video_source(&mut self, ascending: bool) -> Result<usize, SessionError> {
        if self.capture == CaptureState::TryCapture {
            return Err(SessionError::InvalidTransition(
                "Unable to switch camera while it is trying to capture".to_string(),
            ));
        }
        match self.state {
            PublisherState::Connecting => {
                return Err(SessionError::InvalidTransition(
                    "Unable to switch camera while publisher is connecting".to_string(),
                ))
            }
            PublisherState::Connected => {
                return Err(SessionError::InvalidTransition(
                    "Unable to switch camera while publisher is starting or stopping".to_string(),
                ))
            }
            PublisherState::Disconnected | PublisherState::Publishing => {}
        }

        let was_publishing = self.state == PublisherState::Publishing;
        if was_publishing {
            log::info!("[Video][Source][Switch] Stopping publish first...");
            self.stop_publish()?;
        }

        self.stop_capture_video()?;
        let registry = self.shared.registry.clone();
        let next = registry.next_index(Category::VideoSource, ascending)?;
        registry.set_selected_index(Category::VideoSource, next)?;
        log::info!(
            "[Video][Source][Switch] Starting capture on {} ({})",
            registry.video_source_name(),
            next
        );
        self.start_capture_video()?;

        if was_publishing {
            log::info!("[Video][Source][Switch] Was publishing, connecting again...");
            self.republish_pending = true;
            if let Err(e) = self.connect() {
                self.republish_pending = false;
                return Err(e);
            }
        }
        Ok(next)
    }

    /// Select the next camera for the next capture. Refused while capturing.
    pub fn toggle_video_source(&mut self, ascending: bool) -> Result<usize, SessionError> {
        self.shared
            .registry
            .select_next(Category::VideoSource, ascending)
    }

    /// Select the next capability for the next capture. Refused while capturing.
    pub fn toggle_capability(&mut self, ascending: bool) -> Result<usize, SessionError> {
        self.shared
            .registry
            .select_next(Category::Capability, ascending)
    }

    /// Select the next microphone. Refused while audio is captured.
    pub fn switch_audio_source(&mut self, ascending: bool) -> Result<usize, SessionError> {
        self.shared
            .registry
            .select_next(Category::AudioSource, ascending)
    }

    /// Select the next codec of `kind`. Refused while publishing.
    pub fn switch_codec(&mut self, kind: MediaKind, ascending: bool) -> Result<usize, SessionError> {
        let category = match kind {
            MediaKind::Audio => Category::AudioCodec,
            MediaKind::Video => Category::VideoCodec,
        };
        if self.state == PublisherState::Publishing {
            return Err(SessionError::ResourceBusy(format!(
                "Unable to change {} while publishing",
                category
            )));
        }
        self.shared.registry.select_next(category, ascending)
    }

    // Tracks

    /// Flip the enabled state of a published track; returns the confirmed state.
    pub fn toggle_media(&mut self, kind: MediaKind) -> Result<bool, SessionError> {
        let track = match kind {
            MediaKind::Audio => self.audio_track.as_ref(),
            MediaKind::Video => self.video_track.as_ref(),
        }
        .ok_or_else(|| {
            SessionError::ResourceUnavailable(format!("No published {} track", kind.as_str()))
        })?;

        let requested = !self.shared.hub.media(Role::Publisher, kind);
        let confirmed = track.set_enabled(requested);
        if confirmed != requested {
            log::warn!(
                "[Pub][Media] {} track stayed {}",
                kind.as_str(),
                if confirmed { "enabled" } else { "disabled" }
            );
        }
        self.shared.hub.set_media(Role::Publisher, kind, confirmed);
        Ok(confirmed)
    }

    /// Ask the presentation layer to attach the published video again.
    pub fn refresh_pub_video(&mut self) -> Result<(), SessionError> {
        let track = self.video_track.as_ref().ok_or_else(|| {
            SessionError::ResourceUnavailable("No published video track to refresh".to_string())
        })?;
        self.shared.hub.emit(SessionEvent::RenderRequested {
            role: Role::Publisher,
            kind: MediaKind::Video,
            track_id: track.id(),
        });
        Ok(())
    }
}

fn activity(active: bool) -> SessionEvent {
    SessionEvent::SourceActivity {
        role: Role::Publisher,
        active,
        stream_id: None,
        source_id: None,
    }
}
