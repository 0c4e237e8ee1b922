//! In-memory cameras, microphones, tracks and speakers.
//!
//! Every device records how it was used so tests can assert on it, and can be
//! told to misbehave (refuse capture, refuse a mute).

use crate::errors::SessionError;
use crate::media::{AudioPlayback, CaptureSource, MediaBackend, MediaTrack};
use crate::types::{MediaKind, VideoCapability};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// A track whose enabled flag lives in memory.
#[derive(Debug)]
pub struct SyntheticTrack {
    id: String,
    kind: MediaKind,
    enabled: AtomicBool,
    refuse_toggle: AtomicBool,
    volume_bits: AtomicU64,
}

impl SyntheticTrack {
    pub fn new(kind: MediaKind) -> Self {
        Self {
            id: format!("{}-{}", kind.as_str(), Uuid::new_v4()),
            kind,
            enabled: AtomicBool::new(true),
            refuse_toggle: AtomicBool::new(false),
            volume_bits: AtomicU64::new(1.0f64.to_bits()),
        }
    }

    /// Make `set_enabled` ignore requests and keep the current state.
    pub fn refuse_toggle(&self, refuse: bool) {
        self.refuse_toggle.store(refuse, Ordering::SeqCst);
    }

    pub fn volume(&self) -> f64 {
        f64::from_bits(self.volume_bits.load(Ordering::SeqCst))
    }
}

impl MediaTrack for SyntheticTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn set_enabled(&self, enabled: bool) -> bool {
        if !self.refuse_toggle.load(Ordering::SeqCst) {
            self.enabled.store(enabled, Ordering::SeqCst);
        }
        self.enabled.load(Ordering::SeqCst)
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_volume(&self, volume: f64) -> Result<(), SessionError> {
        if self.kind != MediaKind::Audio {
            return Err(SessionError::InvalidArgument(
                "Volume only applies to audio tracks".to_string(),
            ));
        }
        self.volume_bits.store(volume.to_bits(), Ordering::SeqCst);
        Ok(())
    }
}

/// A camera or microphone.
pub struct SyntheticSource {
    name: String,
    unique_id: String,
    kind: MediaKind,
    capabilities: Vec<VideoCapability>,
    selected: Mutex<Option<VideoCapability>>,
    capturing: AtomicBool,
    fail_capture: AtomicBool,
    starts: AtomicUsize,
    stops: AtomicUsize,
    last_track: Mutex<Option<Arc<SyntheticTrack>>>,
}

impl SyntheticSource {
    fn new(name: &str, kind: MediaKind, capabilities: Vec<VideoCapability>) -> Self {
        Self {
            name: name.to_string(),
            unique_id: Uuid::new_v4().to_string(),
            kind,
            capabilities,
            selected: Mutex::new(None),
            capturing: AtomicBool::new(false),
            fail_capture: AtomicBool::new(false),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            last_track: Mutex::new(None),
        }
    }

    pub fn camera(name: &str, capabilities: Vec<VideoCapability>) -> Arc<Self> {
        Arc::new(Self::new(name, MediaKind::Video, capabilities))
    }

    pub fn microphone(name: &str) -> Arc<Self> {
        Arc::new(Self::new(name, MediaKind::Audio, Vec::new()))
    }

    /// Make the next `start_capture` calls fail.
    pub fn fail_capture(&self, fail: bool) {
        self.fail_capture.store(fail, Ordering::SeqCst);
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn selected_capability(&self) -> Option<VideoCapability> {
        self.selected.lock().ok()?.clone()
    }

    /// The track handed out by the most recent capture.
    pub fn last_track(&self) -> Option<Arc<SyntheticTrack>> {
        self.last_track.lock().ok()?.clone()
    }
}

impl CaptureSource for SyntheticSource {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn unique_id(&self) -> String {
        self.unique_id.clone()
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn type_str(&self) -> String {
        match self.kind {
            MediaKind::Audio => "synthetic microphone".to_string(),
            MediaKind::Video => "synthetic camera".to_string(),
        }
    }

    fn capabilities(&self) -> Vec<VideoCapability> {
        self.capabilities.clone()
    }

    fn set_capability(&self, capability: &VideoCapability) -> Result<(), SessionError> {
        if !self.capabilities.contains(capability) {
            return Err(SessionError::InvalidArgument(format!(
                "{} does not offer {}",
                self.name, capability
            )));
        }
        let mut selected = self
            .selected
            .lock()
            .map_err(|_| SessionError::Device("capability lock poisoned".to_string()))?;
        *selected = Some(capability.clone());
        Ok(())
    }

    fn start_capture(&self) -> Result<Arc<dyn MediaTrack>, SessionError> {
        if self.fail_capture.load(Ordering::SeqCst) {
            return Err(SessionError::Device(format!(
                "{} refused to start capturing",
                self.name
            )));
        }
        self.capturing.store(true, Ordering::SeqCst);
        self.starts.fetch_add(1, Ordering::SeqCst);

        let track = Arc::new(SyntheticTrack::new(self.kind));
        if let Ok(mut last) = self.last_track.lock() {
            *last = Some(track.clone());
        }
        Ok(track)
    }

    fn stop_capture(&self) {
        self.capturing.store(false, Ordering::SeqCst);
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }
}

/// A speaker.
pub struct SyntheticPlayback {
    name: String,
    unique_id: String,
    inits: AtomicUsize,
}

impl SyntheticPlayback {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            unique_id: Uuid::new_v4().to_string(),
            inits: AtomicUsize::new(0),
        })
    }

    pub fn init_count(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }
}

impl AudioPlayback for SyntheticPlayback {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn unique_id(&self) -> String {
        self.unique_id.clone()
    }

    fn init_playback(&self) -> Result<(), SessionError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct Devices {
    audio_sources: Vec<Arc<SyntheticSource>>,
    video_sources: Vec<Arc<SyntheticSource>>,
    audio_codecs: Vec<String>,
    video_codecs: Vec<String>,
    playback: Vec<Arc<SyntheticPlayback>>,
}

/// A backend whose device lists can be swapped at any time to simulate hot-plug.
#[derive(Default)]
pub struct SyntheticBackend {
    devices: Mutex<Devices>,
}

impl SyntheticBackend {
    /// Two microphones, three cameras, a few codecs and two speakers.
    pub fn new() -> Self {
        let backend = Self::empty();
        backend.set_audio_sources(vec![
            SyntheticSource::microphone("Built-in Microphone"),
            SyntheticSource::microphone("Headset Microphone"),
        ]);
        backend.set_video_sources(vec![
            SyntheticSource::camera(
                "Front Camera",
                vec![
                    VideoCapability::new(640, 480, 30, "NV12"),
                    VideoCapability::hd(),
                    VideoCapability::full_hd(),
                ],
            ),
            SyntheticSource::camera(
                "Back Camera",
                vec![
                    VideoCapability::hd(),
                    VideoCapability::full_hd(),
                    VideoCapability::new(1920, 1440, 30, "NV12"),
                    VideoCapability::new(3264, 2448, 30, "NV12"),
                ],
            ),
            SyntheticSource::camera("External Camera", vec![VideoCapability::hd()]),
        ]);
        backend.set_audio_codecs(&["OPUS", "MULTIOPUS"]);
        backend.set_video_codecs(&["VP8", "VP9", "H264", "AV1"]);
        backend.set_playback_devices(vec![
            SyntheticPlayback::new("Speaker"),
            SyntheticPlayback::new("Headphones"),
        ]);
        backend
    }

    /// No devices and no codecs at all.
    pub fn empty() -> Self {
        Self::default()
    }

    fn with_devices<R>(&self, f: impl FnOnce(&mut Devices) -> R) -> R {
        let mut devices = self
            .devices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut devices)
    }

    pub fn set_audio_sources(&self, sources: Vec<Arc<SyntheticSource>>) {
        self.with_devices(|d| d.audio_sources = sources);
    }

    pub fn set_video_sources(&self, sources: Vec<Arc<SyntheticSource>>) {
        self.with_devices(|d| d.video_sources = sources);
    }

    pub fn set_audio_codecs(&self, codecs: &[&str]) {
        let codecs = codecs.iter().map(|c| c.to_string()).collect();
        self.with_devices(|d| d.audio_codecs = codecs);
    }

    pub fn set_video_codecs(&self, codecs: &[&str]) {
        let codecs = codecs.iter().map(|c| c.to_string()).collect();
        self.with_devices(|d| d.video_codecs = codecs);
    }

    pub fn set_playback_devices(&self, devices: Vec<Arc<SyntheticPlayback>>) {
        self.with_devices(|d| d.playback = devices);
    }

    pub fn camera(&self, index: usize) -> Option<Arc<SyntheticSource>> {
        self.with_devices(|d| d.video_sources.get(index).cloned())
    }

    pub fn microphone(&self, index: usize) -> Option<Arc<SyntheticSource>> {
        self.with_devices(|d| d.audio_sources.get(index).cloned())
    }

    pub fn speaker(&self, index: usize) -> Option<Arc<SyntheticPlayback>> {
        self.with_devices(|d| d.playback.get(index).cloned())
    }
}

impl MediaBackend for SyntheticBackend {
    fn audio_sources(&self) -> Vec<Arc<dyn CaptureSource>> {
        self.with_devices(|d| {
            d.audio_sources
                .iter()
                .map(|s| s.clone() as Arc<dyn CaptureSource>)
                .collect()
        })
    }

    fn video_sources(&self) -> Vec<Arc<dyn CaptureSource>> {
        self.with_devices(|d| {
            d.video_sources
                .iter()
                .map(|s| s.clone() as Arc<dyn CaptureSource>)
                .collect()
        })
    }

    fn audio_codecs(&self) -> Vec<String> {
        self.with_devices(|d| d.audio_codecs.clone())
    }

    fn video_codecs(&self) -> Vec<String> {
        self.with_devices(|d| d.video_codecs.clone())
    }

    fn playback_devices(&self) -> Vec<Arc<dyn AudioPlayback>> {
        self.with_devices(|d| {
            d.playback
                .iter()
                .map(|p| p.clone() as Arc<dyn AudioPlayback>)
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refused_toggle_keeps_state() {
        let track = SyntheticTrack::new(MediaKind::Audio);
        assert!(!track.set_enabled(false));
        track.refuse_toggle(true);
        assert!(!track.set_enabled(true));
        assert!(!track.is_enabled());
    }

    #[test]
    fn test_source_counts_and_failure() {
        let cam = SyntheticSource::camera("cam", vec![VideoCapability::hd()]);
        cam.start_capture().unwrap();
        cam.stop_capture();
        cam.fail_capture(true);
        assert!(cam.start_capture().is_err());
        assert_eq!(cam.start_count(), 1);
        assert_eq!(cam.stop_count(), 1);
        assert!(cam.set_capability(&VideoCapability::full_hd()).is_err());
    }

    #[test]
    fn test_default_backend_lists() {
        let backend = SyntheticBackend::new();
        assert_eq!(backend.video_sources().len(), 3);
        assert_eq!(backend.audio_codecs(), vec!["OPUS", "MULTIOPUS"]);
        assert!(backend.camera(3).is_none());
    }
}
