//! Capture devices, tracks, playback devices and the registry selecting among them.
//!
//! The traits here are the boundary to whatever actually owns cameras,
//! microphones and speakers. The crate never touches hardware itself; the
//! [`testing`](crate::testing) module provides synthetic implementations.

pub mod registry;

pub use registry::{adjust_video_codec, MediaRegistry, PublishCodecs};

use crate::errors::SessionError;
use crate::types::{MediaKind, VideoCapability};
use std::fmt;
use std::sync::Arc;

/// A flowing audio or video stream, local or remote.
pub trait MediaTrack: Send + Sync {
    fn id(&self) -> String;
    fn kind(&self) -> MediaKind;
    /// Request the track to be enabled or disabled.
    ///
    /// Returns the enabled state the track reports after the call, which is
    /// what callers must record.
    fn set_enabled(&self, enabled: bool) -> bool;
    fn is_enabled(&self) -> bool;
    /// Playback volume in `[0.0, 1.0]`. Only meaningful for audio tracks.
    fn set_volume(&self, volume: f64) -> Result<(), SessionError>;
}

/// A camera or microphone that can produce a [`MediaTrack`].
pub trait CaptureSource: Send + Sync {
    fn name(&self) -> String;
    fn unique_id(&self) -> String;
    fn kind(&self) -> MediaKind;
    /// Backend-specific type label, e.g. "camera" or "microphone".
    fn type_str(&self) -> String;
    /// Capabilities offered by this source. Empty for audio sources.
    fn capabilities(&self) -> Vec<VideoCapability>;
    fn set_capability(&self, capability: &VideoCapability) -> Result<(), SessionError>;
    fn start_capture(&self) -> Result<Arc<dyn MediaTrack>, SessionError>;
    fn stop_capture(&self);
    fn is_capturing(&self) -> bool;
}

/// A speaker or headset remote audio is played on.
pub trait AudioPlayback: Send + Sync {
    fn name(&self) -> String;
    fn unique_id(&self) -> String;
    fn init_playback(&self) -> Result<(), SessionError>;
}

/// Enumerates what the platform currently offers.
pub trait MediaBackend: Send + Sync {
    fn audio_sources(&self) -> Vec<Arc<dyn CaptureSource>>;
    fn video_sources(&self) -> Vec<Arc<dyn CaptureSource>>;
    fn audio_codecs(&self) -> Vec<String>;
    fn video_codecs(&self) -> Vec<String>;
    fn playback_devices(&self) -> Vec<Arc<dyn AudioPlayback>>;
}

impl fmt::Debug for dyn MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Human readable label of a capture source.
pub fn source_label(source: &dyn CaptureSource, long_form: bool) -> String {
    if long_form {
        format!(
            "{} ({}), id: {}",
            source.name(),
            source.type_str(),
            source.unique_id()
        )
    } else {
        source.name()
    }
}
