use crate::media::MediaTrack;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A flat statistics sample reported by a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    pub timestamp: DateTime<Utc>,
    pub metrics: BTreeMap<String, f64>,
}

impl StatsReport {
    pub fn new() -> Self {
        Self {
            timestamp: Utc::now(),
            metrics: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    pub fn summary(&self) -> String {
        let parts: Vec<String> = self
            .metrics
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        format!("[{}] {}", self.timestamp.format("%H:%M:%S"), parts.join(" "))
    }
}

impl Default for StatsReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Simulcast/SVC layer description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerData {
    pub encoding_id: String,
    pub spatial_layer_id: Option<u32>,
    pub temporal_layer_id: Option<u32>,
}

/// Notifications a publisher emits.
#[derive(Debug, Clone)]
pub enum PublisherEvent {
    Connected,
    ConnectionError { status: i32, reason: String },
    Publishing,
    PublishingError(String),
    Disconnected,
    SignalingError(String),
    Stats(StatsReport),
    ViewerCount(u32),
    /// The first viewer started watching.
    Active,
    /// The last viewer left.
    Inactive,
}

impl PublisherEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PublisherEvent::Connected => "connected",
            PublisherEvent::ConnectionError { .. } => "connection_error",
            PublisherEvent::Publishing => "publishing",
            PublisherEvent::PublishingError(_) => "publishing_error",
            PublisherEvent::Disconnected => "disconnected",
            PublisherEvent::SignalingError(_) => "signaling_error",
            PublisherEvent::Stats(_) => "stats",
            PublisherEvent::ViewerCount(_) => "viewer_count",
            PublisherEvent::Active => "active",
            PublisherEvent::Inactive => "inactive",
        }
    }
}

/// Notifications a subscriber emits.
#[derive(Debug, Clone)]
pub enum SubscriberEvent {
    Connected,
    ConnectionError {
        status: i32,
        reason: String,
    },
    Subscribed,
    SubscribedError(String),
    Stopped,
    Disconnected,
    SignalingError(String),
    Stats(StatsReport),
    AudioTrack {
        track: Arc<dyn MediaTrack>,
        transceiver_id: Option<String>,
    },
    VideoTrack {
        track: Arc<dyn MediaTrack>,
        transceiver_id: Option<String>,
    },
    Active {
        stream_id: String,
        tracks: Vec<String>,
        source_id: Option<String>,
    },
    Inactive {
        stream_id: String,
        source_id: Option<String>,
    },
    Layers {
        mid: String,
        active: Vec<LayerData>,
        inactive: Vec<LayerData>,
    },
    Vad {
        mid: String,
        source_id: Option<String>,
    },
    ViewerCount(u32),
}

impl SubscriberEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SubscriberEvent::Connected => "connected",
            SubscriberEvent::ConnectionError { .. } => "connection_error",
            SubscriberEvent::Subscribed => "subscribed",
            SubscriberEvent::SubscribedError(_) => "subscribed_error",
            SubscriberEvent::Stopped => "stopped",
            SubscriberEvent::Disconnected => "disconnected",
            SubscriberEvent::SignalingError(_) => "signaling_error",
            SubscriberEvent::Stats(_) => "stats",
            SubscriberEvent::AudioTrack { .. } => "audio_track",
            SubscriberEvent::VideoTrack { .. } => "video_track",
            SubscriberEvent::Active { .. } => "active",
            SubscriberEvent::Inactive { .. } => "inactive",
            SubscriberEvent::Layers { .. } => "layers",
            SubscriberEvent::Vad { .. } => "vad",
            SubscriberEvent::ViewerCount(_) => "viewer_count",
        }
    }
}
