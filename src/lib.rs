//! castlane: publish/subscribe session coordination for WebRTC streaming clients
//!
//! This crate holds the client-side core of a live streaming app: it captures
//! local audio and video, publishes them through a transport, subscribes to a
//! remote stream, and keeps three state machines consistent while devices,
//! codecs and credentials change underneath them.
//!
//! # Features
//! - Two serialized lanes (publish and subscribe) owning all mutable session state
//! - Capture, publisher and subscriber state machines with observable snapshots
//! - Device, capability, codec and playback selection with persisted indices
//! - Credential sources (defaults, saved, applied, UI buffer) with persistence
//! - Pluggable media backend and transport traits, plus synthetic versions for tests
//!
//! # Usage
//! ```rust,no_run
//! use castlane::testing::{SyntheticBackend, SyntheticTransport};
//! use castlane::{MemoryStore, SessionConfig, SessionCoordinator};
//! use std::sync::Arc;
//!
//! let session = SessionCoordinator::new(
//!     SessionConfig::default(),
//!     Arc::new(SyntheticBackend::new()),
//!     Arc::new(SyntheticTransport::new()),
//!     Arc::new(MemoryStore::new()),
//! )?;
//! session.start_capture().wait_blocking()?;
//! println!("{:?}", session.snapshot().capture);
//! # Ok::<(), castlane::SessionError>(())
//! ```
pub mod config;
pub mod credentials;
pub mod cycler;
pub mod errors;
pub mod media;
pub mod session;
pub mod transport;
pub mod types;

// Testing utilities - synthetic devices and transport for offline sessions
pub mod testing;

// Re-exports for convenience
pub use config::SessionConfig;
pub use credentials::{
    CredentialField, CredentialSet, CredentialSource, CredentialStore, FileStore, KeyValueStore,
    MemoryStore, SourceType,
};
pub use errors::SessionError;
pub use media::{AudioPlayback, CaptureSource, MediaBackend, MediaRegistry, MediaTrack};
pub use session::{SessionCoordinator, SessionEvent, SessionSnapshot, Ticket};
pub use transport::{Publisher, Subscriber, TransportFactory};
pub use types::{
    CaptureState, Category, MediaEnableState, MediaKind, PublisherState, Role, SubscriberState,
    VideoCapability,
};

/// Initialize logging for the session core
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "castlane=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}
