//! Testing utilities for castlane
//!
//! Synthetic media devices and a recording transport, so sessions can be
//! driven end to end without cameras or a streaming server.

pub mod synthetic_media;
pub mod synthetic_transport;

pub use synthetic_media::{SyntheticBackend, SyntheticPlayback, SyntheticSource, SyntheticTrack};
pub use synthetic_transport::{Behavior, SyntheticTransport, TransportCall};
