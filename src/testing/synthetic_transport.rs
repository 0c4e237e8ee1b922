//! A transport that records every call and can play the server's part.
//!
//! With `auto_events` on, connect/publish/subscribe answer immediately with
//! the matching success event, the way a healthy server would. With it off,
//! tests drive the conversation themselves through `emit_publisher` and
//! `emit_subscriber`.

use super::synthetic_media::SyntheticTrack;
use crate::credentials::CredentialSet;
use crate::errors::SessionError;
use crate::media::MediaTrack;
use crate::transport::{
    ClientOptions, Publisher, PublisherEvent, PublisherListener, Subscriber, SubscriberEvent,
    SubscriberListener, TransportFactory,
};
use crate::types::{MediaKind, Role};
use std::sync::{Arc, Mutex, MutexGuard};

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Create(Role),
    Connect(Role),
    Disconnect(Role),
    SetCredentials(Role),
    SetOptions {
        role: Role,
        audio_codec: Option<String>,
        video_codec: Option<String>,
    },
    AddTrack(MediaKind),
    Publish,
    Unpublish,
    Subscribe,
    Unsubscribe,
}

/// Knobs controlling how the synthetic server answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Behavior {
    pub auto_events: bool,
    pub fail_connect: bool,
    pub reject_publish: bool,
    pub remote_tracks: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            auto_events: true,
            fail_connect: false,
            reject_publish: false,
            remote_tracks: true,
        }
    }
}

#[derive(Default)]
struct Link {
    connected: bool,
    active: bool,
}

#[derive(Default)]
struct Inner {
    calls: Vec<TransportCall>,
    behavior: Behavior,
    pub_link: Link,
    sub_link: Link,
    pub_listener: Option<PublisherListener>,
    sub_listener: Option<SubscriberListener>,
    remote_audio: Option<Arc<SyntheticTrack>>,
    remote_video: Option<Arc<SyntheticTrack>>,
}

/// Shared recorder behind the factory and every client it creates.
#[derive(Clone, Default)]
pub struct SyntheticTransport {
    inner: Arc<Mutex<Inner>>,
}

impl SyntheticTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: Behavior) -> Self {
        let transport = Self::default();
        transport.set_behavior(behavior);
        transport
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        self.lock().behavior = behavior;
    }

    pub fn behavior(&self) -> Behavior {
        self.lock().behavior
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.lock().calls.clone()
    }

    pub fn count(&self, call: &TransportCall) -> usize {
        self.lock().calls.iter().filter(|c| *c == call).count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Remote tracks handed out by the most recent subscribe.
    pub fn remote_tracks(&self) -> (Option<Arc<SyntheticTrack>>, Option<Arc<SyntheticTrack>>) {
        let inner = self.lock();
        (inner.remote_audio.clone(), inner.remote_video.clone())
    }

    fn record(&self, call: TransportCall) {
        log::trace!("[Synthetic] {:?}", call);
        self.lock().calls.push(call);
    }

    /// Deliver `event` to the current publisher's listener, as the server would.
    pub fn emit_publisher(&self, event: PublisherEvent) -> bool {
        let listener = {
            let mut inner = self.lock();
            match &event {
                PublisherEvent::Connected => inner.pub_link.connected = true,
                PublisherEvent::Publishing => inner.pub_link.active = true,
                PublisherEvent::PublishingError(_) => inner.pub_link.active = false,
                PublisherEvent::Disconnected | PublisherEvent::ConnectionError { .. } => {
                    inner.pub_link = Link::default()
                }
                _ => {}
            }
            inner.pub_listener.clone()
        };
        // Listeners are called without the lock held.
        match listener {
            Some(listener) => {
                listener.notify(event);
                true
            }
            None => false,
        }
    }

    /// Deliver `event` to the current subscriber's listener, as the server would.
    pub fn emit_subscriber(&self, event: SubscriberEvent) -> bool {
        let listener = {
            let mut inner = self.lock();
            match &event {
                SubscriberEvent::Connected => inner.sub_link.connected = true,
                SubscriberEvent::Subscribed => inner.sub_link.active = true,
                SubscriberEvent::SubscribedError(_) | SubscriberEvent::Stopped => {
                    inner.sub_link.active = false
                }
                SubscriberEvent::Disconnected | SubscriberEvent::ConnectionError { .. } => {
                    inner.sub_link = Link::default()
                }
                _ => {}
            }
            inner.sub_listener.clone()
        };
        match listener {
            Some(listener) => {
                listener.notify(event);
                true
            }
            None => false,
        }
    }

    /// Hand the subscriber a fresh pair of remote tracks.
    pub fn emit_remote_tracks(&self) {
        let audio = Arc::new(SyntheticTrack::new(MediaKind::Audio));
        let video = Arc::new(SyntheticTrack::new(MediaKind::Video));
        {
            let mut inner = self.lock();
            inner.remote_audio = Some(audio.clone());
            inner.remote_video = Some(video.clone());
        }
        self.emit_subscriber(SubscriberEvent::AudioTrack {
            track: audio,
            transceiver_id: Some("0".to_string()),
        });
        self.emit_subscriber(SubscriberEvent::VideoTrack {
            track: video,
            transceiver_id: Some("1".to_string()),
        });
    }
}

impl TransportFactory for SyntheticTransport {
    fn create_publisher(
        &self,
        listener: PublisherListener,
    ) -> Result<Box<dyn Publisher>, SessionError> {
        {
            let mut inner = self.lock();
            inner.pub_link = Link::default();
            inner.pub_listener = Some(listener);
        }
        self.record(TransportCall::Create(Role::Publisher));
        Ok(Box::new(SyntheticPublisher {
            transport: self.clone(),
        }))
    }

    fn create_subscriber(
        &self,
        listener: SubscriberListener,
    ) -> Result<Box<dyn Subscriber>, SessionError> {
        {
            let mut inner = self.lock();
            inner.sub_link = Link::default();
            inner.sub_listener = Some(listener);
        }
        self.record(TransportCall::Create(Role::Subscriber));
        Ok(Box::new(SyntheticSubscriber {
            transport: self.clone(),
        }))
    }
}

struct SyntheticPublisher {
    transport: SyntheticTransport,
}

impl Publisher for SyntheticPublisher {
    fn connect(&mut self) -> bool {
        self.transport.record(TransportCall::Connect(Role::Publisher));
        let behavior = self.transport.behavior();
        if behavior.fail_connect {
            return false;
        }
        if behavior.auto_events {
            self.transport.emit_publisher(PublisherEvent::Connected);
        }
        true
    }

    fn disconnect(&mut self) {
        self.transport
            .record(TransportCall::Disconnect(Role::Publisher));
        if self.transport.behavior().auto_events {
            self.transport.emit_publisher(PublisherEvent::Disconnected);
        } else {
            self.transport.lock().pub_link = Link::default();
        }
    }

    fn publish(&mut self) -> Result<(), SessionError> {
        self.transport.record(TransportCall::Publish);
        if !self.is_connected() {
            return Err(SessionError::TransportFailure(
                "publisher is not connected".to_string(),
            ));
        }
        let behavior = self.transport.behavior();
        if behavior.auto_events {
            if behavior.reject_publish {
                self.transport.emit_publisher(PublisherEvent::PublishingError(
                    "stream rejected".to_string(),
                ));
            } else {
                self.transport.emit_publisher(PublisherEvent::Publishing);
            }
        }
        Ok(())
    }

    fn unpublish(&mut self) {
        self.transport.record(TransportCall::Unpublish);
        self.transport.lock().pub_link.active = false;
    }

    fn set_credentials(&mut self, _credentials: &CredentialSet) {
        self.transport
            .record(TransportCall::SetCredentials(Role::Publisher));
    }

    fn set_options(&mut self, options: &ClientOptions) {
        self.transport.record(TransportCall::SetOptions {
            role: Role::Publisher,
            audio_codec: options.audio_codec.clone(),
            video_codec: options.video_codec.clone(),
        });
    }

    fn add_track(&mut self, track: Arc<dyn MediaTrack>) {
        self.transport.record(TransportCall::AddTrack(track.kind()));
    }

    fn is_connected(&self) -> bool {
        self.transport.lock().pub_link.connected
    }

    fn is_publishing(&self) -> bool {
        self.transport.lock().pub_link.active
    }
}

struct SyntheticSubscriber {
    transport: SyntheticTransport,
}

impl Subscriber for SyntheticSubscriber {
    fn connect(&mut self) -> bool {
        self.transport
            .record(TransportCall::Connect(Role::Subscriber));
        let behavior = self.transport.behavior();
        if behavior.fail_connect {
            return false;
        }
        if behavior.auto_events {
            self.transport.emit_subscriber(SubscriberEvent::Connected);
        }
        true
    }

    fn disconnect(&mut self) {
        self.transport
            .record(TransportCall::Disconnect(Role::Subscriber));
        if self.transport.behavior().auto_events {
            self.transport.emit_subscriber(SubscriberEvent::Disconnected);
        } else {
            self.transport.lock().sub_link = Link::default();
        }
    }

    fn subscribe(&mut self) -> Result<(), SessionError> {
        self.transport.record(TransportCall::Subscribe);
        if !self.is_connected() {
            return Err(SessionError::TransportFailure(
                "subscriber is not connected".to_string(),
            ));
        }
        let behavior = self.transport.behavior();
        if behavior.auto_events {
            self.transport.emit_subscriber(SubscriberEvent::Subscribed);
            if behavior.remote_tracks {
                self.transport.emit_remote_tracks();
            }
        }
        Ok(())
    }

    fn unsubscribe(&mut self) {
        self.transport.record(TransportCall::Unsubscribe);
        self.transport.lock().sub_link.active = false;
    }

    fn set_credentials(&mut self, _credentials: &CredentialSet) {
        self.transport
            .record(TransportCall::SetCredentials(Role::Subscriber));
    }

    fn set_options(&mut self, options: &ClientOptions) {
        self.transport.record(TransportCall::SetOptions {
            role: Role::Subscriber,
            audio_codec: options.audio_codec.clone(),
            video_codec: options.video_codec.clone(),
        });
    }

    fn is_connected(&self) -> bool {
        self.transport.lock().sub_link.connected
    }

    fn is_subscribed(&self) -> bool {
        self.transport.lock().sub_link.active
    }
}
