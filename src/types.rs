//! Core value types shared by every castlane module.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Local capture lifecycle. Transitions are linear:
/// `NotCaptured -> TryCapture -> IsCaptured -> NotCaptured`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CaptureState {
    #[default]
    NotCaptured,
    TryCapture,
    IsCaptured,
}

/// Publisher connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PublisherState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Publishing,
}

/// Subscriber connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SubscriberState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Subscribing,
}

/// Which side of the session an operation or track belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Publisher,
    Subscriber,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Publisher => "publisher",
            Role::Subscriber => "subscriber",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

/// Confirmed enabled/muted state of the four tracks.
///
/// A flag only changes after the underlying track acknowledged the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MediaEnableState {
    pub pub_audio_enabled: bool,
    pub pub_video_enabled: bool,
    pub sub_audio_enabled: bool,
    pub sub_video_enabled: bool,
}

impl MediaEnableState {
    pub fn get(&self, role: Role, kind: MediaKind) -> bool {
        match (role, kind) {
            (Role::Publisher, MediaKind::Audio) => self.pub_audio_enabled,
            (Role::Publisher, MediaKind::Video) => self.pub_video_enabled,
            (Role::Subscriber, MediaKind::Audio) => self.sub_audio_enabled,
            (Role::Subscriber, MediaKind::Video) => self.sub_video_enabled,
        }
    }

    pub fn set(&mut self, role: Role, kind: MediaKind, enabled: bool) {
        match (role, kind) {
            (Role::Publisher, MediaKind::Audio) => self.pub_audio_enabled = enabled,
            (Role::Publisher, MediaKind::Video) => self.pub_video_enabled = enabled,
            (Role::Subscriber, MediaKind::Audio) => self.sub_audio_enabled = enabled,
            (Role::Subscriber, MediaKind::Video) => self.sub_video_enabled = enabled,
        }
    }
}

/// Resource categories managed by the [`MediaRegistry`](crate::media::MediaRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    AudioSource,
    VideoSource,
    Capability,
    AudioCodec,
    VideoCodec,
    AudioPlayback,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::AudioSource,
        Category::VideoSource,
        Category::Capability,
        Category::AudioCodec,
        Category::VideoCodec,
        Category::AudioPlayback,
    ];

    /// Persistence key of the selected index for this category.
    pub fn index_key(&self) -> &'static str {
        match self {
            Category::AudioSource => "AUDIO_SOURCE_INDEX",
            Category::VideoSource => "VIDEO_SOURCE_INDEX",
            Category::Capability => "CAPABILITY_INDEX",
            Category::AudioCodec => "AUDIO_CODEC_INDEX",
            Category::VideoCodec => "VIDEO_CODEC_INDEX",
            Category::AudioPlayback => "AUDIO_PLAYBACK_INDEX",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::AudioSource => "audio source",
            Category::VideoSource => "video source",
            Category::Capability => "video capability",
            Category::AudioCodec => "audio codec",
            Category::VideoCodec => "video codec",
            Category::AudioPlayback => "audio playback",
        }
    }

    pub(crate) fn slot(&self) -> usize {
        match self {
            Category::AudioSource => 0,
            Category::VideoSource => 1,
            Category::Capability => 2,
            Category::AudioCodec => 3,
            Category::VideoCodec => 4,
            Category::AudioPlayback => 5,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolution / frame-rate / pixel-format combination offered by a video source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoCapability {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub pixel_format: String,
}

impl VideoCapability {
    pub fn new(width: u32, height: u32, fps: u32, pixel_format: impl Into<String>) -> Self {
        Self {
            width,
            height,
            fps,
            pixel_format: pixel_format.into(),
        }
    }

    pub fn hd() -> Self {
        Self::new(1280, 720, 30, "NV12")
    }

    pub fn full_hd() -> Self {
        Self::new(1920, 1080, 30, "NV12")
    }
}

impl fmt::Display for VideoCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} fps:{} PixelFormat:{}",
            self.width, self.height, self.fps, self.pixel_format
        )
    }
}
