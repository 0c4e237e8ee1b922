//! Boundary to the streaming SDK.
//!
//! Publishers and subscribers are created through a [`TransportFactory`] and
//! report progress asynchronously through the listener they were created with.
//! Their methods only start work; completion arrives later as an event.

pub mod events;
pub mod listener;

pub use events::{LayerData, PublisherEvent, StatsReport, SubscriberEvent};
pub use listener::{PublisherListener, SubscriberListener};

use crate::credentials::CredentialSet;
use crate::errors::SessionError;
use crate::media::MediaTrack;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Options handed to a publisher or subscriber before it connects.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClientOptions {
    pub audio_codec: Option<String>,
    pub video_codec: Option<String>,
    pub stereo: bool,
}

/// Publishing side of the SDK.
pub trait Publisher: Send {
    /// Start connecting. `false` means the request was rejected outright.
    fn connect(&mut self) -> bool;
    fn disconnect(&mut self);
    fn publish(&mut self) -> Result<(), SessionError>;
    fn unpublish(&mut self);
    fn set_credentials(&mut self, credentials: &CredentialSet);
    fn set_options(&mut self, options: &ClientOptions);
    fn add_track(&mut self, track: Arc<dyn MediaTrack>);
    fn is_connected(&self) -> bool;
    fn is_publishing(&self) -> bool;
}

/// Subscribing side of the SDK.
pub trait Subscriber: Send {
    /// Start connecting. `false` means the request was rejected outright.
    fn connect(&mut self) -> bool;
    fn disconnect(&mut self);
    fn subscribe(&mut self) -> Result<(), SessionError>;
    fn unsubscribe(&mut self);
    fn set_credentials(&mut self, credentials: &CredentialSet);
    fn set_options(&mut self, options: &ClientOptions);
    fn is_connected(&self) -> bool;
    fn is_subscribed(&self) -> bool;
}

/// Creates SDK clients bound to a listener.
pub trait TransportFactory: Send + Sync {
    fn create_publisher(
        &self,
        listener: PublisherListener,
    ) -> Result<Box<dyn Publisher>, SessionError>;
    fn create_subscriber(
        &self,
        listener: SubscriberListener,
    ) -> Result<Box<dyn Subscriber>, SessionError>;
}
