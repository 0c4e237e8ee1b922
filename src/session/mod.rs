//! The session coordinator and its two lanes.
//!
//! Publish-side work (capture, publisher connection, device switching) runs on
//! the publish lane; subscribe-side work on the subscribe lane. Both lanes
//! share the registry, the credentials and the [`StateHub`] through [`Shared`].

pub mod coordinator;
pub mod lane;
pub mod observer;
pub mod publish;
pub mod subscribe;

pub use coordinator::SessionCoordinator;
pub use lane::{Lane, LaneHandle, Ticket};
pub use observer::{SessionEvent, SessionSnapshot, StateHub};
pub use publish::PublishSide;
pub use subscribe::SubscribeSide;

use crate::config::SessionConfig;
use crate::credentials::CredentialStore;
use crate::media::MediaRegistry;
use crate::transport::TransportFactory;
use std::sync::Arc;

/// Collaborators both lanes read from.
pub(crate) struct Shared {
    pub config: SessionConfig,
    pub registry: Arc<MediaRegistry>,
    pub credentials: Arc<CredentialStore>,
    pub transport: Arc<dyn TransportFactory>,
    pub hub: StateHub,
}
