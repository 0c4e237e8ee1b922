//! Device, capability, codec and playback selection.
//!
//! Lists are fetched from the [`MediaBackend`] on first use and cached until a
//! refresh is requested. Each category has one selected index, persisted in the
//! key-value store, and an "active" flag set while the selected resource is in
//! use. Selections can not change while their category is active.

use super::{source_label, AudioPlayback, CaptureSource, MediaBackend};
use crate::config::{CodecPolicy, MediaConfig};
use crate::credentials::{KeyValueStore, StoreValue};
use crate::cycler;
use crate::errors::SessionError;
use crate::types::{Category, MediaKind, VideoCapability};
use std::sync::{Arc, Mutex, MutexGuard};

const NONE: &str = "None";

/// Codecs to put into the publish options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishCodecs {
    pub audio: String,
    pub video: String,
}

/// Effective video codec for `preferred` at the given capability.
///
/// The constrained codec is swapped once both dimensions reach the policy
/// threshold: `at_threshold_codec` at exactly the threshold, and
/// `above_threshold_codec` beyond it.
pub fn adjust_video_codec(
    preferred: &str,
    capability: Option<&VideoCapability>,
    policy: &CodecPolicy,
) -> String {
    if preferred != policy.constrained_codec {
        log::debug!("Setting {} as preferred video codec", preferred);
        return preferred.to_string();
    }

    let Some(cap) = capability else {
        return preferred.to_string();
    };

    let [width, height] = policy.threshold;
    if cap.width < width || cap.height < height {
        return preferred.to_string();
    }

    let codec = if cap.width == width && cap.height == height {
        &policy.at_threshold_codec
    } else {
        &policy.above_threshold_codec
    };
    log::info!(
        "Using {} instead of {} as capability {} is not lower than {}x{}",
        codec,
        preferred,
        cap,
        width,
        height
    );
    codec.clone()
}

#[derive(Default, Clone)]
struct Inner {
    audio_sources: Option<Vec<Arc<dyn CaptureSource>>>,
    video_sources: Option<Vec<Arc<dyn CaptureSource>>>,
    capabilities: Option<Vec<VideoCapability>>,
    audio_codecs: Option<Vec<String>>,
    video_codecs: Option<Vec<String>>,
    playback: Option<Vec<Arc<dyn AudioPlayback>>>,
    indices: [usize; 6],
    active: [bool; 6],
    // Refreshes held back until the selection is released.
    pending: [bool; 6],
}

impl Inner {
    fn len(&self, category: Category) -> usize {
        match category {
            Category::AudioSource => self.audio_sources.as_ref().map_or(0, Vec::len),
            Category::VideoSource => self.video_sources.as_ref().map_or(0, Vec::len),
            Category::Capability => self.capabilities.as_ref().map_or(0, Vec::len),
            Category::AudioCodec => self.audio_codecs.as_ref().map_or(0, Vec::len),
            Category::VideoCodec => self.video_codecs.as_ref().map_or(0, Vec::len),
            Category::AudioPlayback => self.playback.as_ref().map_or(0, Vec::len),
        }
    }

    fn index(&self, category: Category) -> usize {
        self.indices[category.slot()]
    }

    /// The camera and its capability are in use as one unit.
    fn in_use(&self, category: Category) -> bool {
        match category {
            Category::VideoSource | Category::Capability => {
                self.active[Category::VideoSource.slot()]
                    || self.active[Category::Capability.slot()]
            }
            _ => self.active[category.slot()],
        }
    }

    /// Stable identity of the entry at `index`, used to find it again in a fresh list.
    fn identity(&self, category: Category, index: usize) -> Option<String> {
        match category {
            Category::AudioSource => {
                self.audio_sources.as_ref()?.get(index).map(|s| s.unique_id())
            }
            Category::VideoSource => {
                self.video_sources.as_ref()?.get(index).map(|s| s.unique_id())
            }
            Category::Capability => {
                self.capabilities.as_ref()?.get(index).map(|c| c.to_string())
            }
            Category::AudioCodec => self.audio_codecs.as_ref()?.get(index).cloned(),
            Category::VideoCodec => self.video_codecs.as_ref()?.get(index).cloned(),
            Category::AudioPlayback => self.playback.as_ref()?.get(index).map(|d| d.unique_id()),
        }
    }

    fn position(&self, category: Category, identity: &str) -> Option<usize> {
        (0..self.len(category))
            .find(|&i| self.identity(category, i).as_deref() == Some(identity))
    }

    fn video_source(&self) -> Option<Arc<dyn CaptureSource>> {
        self.video_sources
            .as_ref()?
            .get(self.index(Category::VideoSource))
            .cloned()
    }
}

/// Thread-safe registry of selectable media resources.
pub struct MediaRegistry {
    backend: Arc<dyn MediaBackend>,
    store: Arc<dyn KeyValueStore>,
    inner: Mutex<Inner>,
}

impl MediaRegistry {
    /// Build the registry, restoring saved selections and clamping them to the
    /// lists currently offered by the backend.
    pub fn new(backend: Arc<dyn MediaBackend>, store: Arc<dyn KeyValueStore>) -> Self {
        let mut inner = Inner::default();
        for category in Category::ALL {
            if let Some(saved) = store.get_int(category.index_key()) {
                inner.indices[category.slot()] = usize::try_from(saved).unwrap_or(0);
            }
        }

        let registry = Self {
            backend,
            store,
            inner: Mutex::new(inner),
        };
        {
            let mut inner = registry.lock();
            for category in Category::ALL {
                registry.load(&mut inner, category, false);
                registry.clamp(&mut inner, category);
            }
        }
        registry
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn load(&self, inner: &mut Inner, category: Category, refresh: bool) {
        match category {
            Category::AudioSource => {
                if refresh || inner.audio_sources.is_none() {
                    inner.audio_sources = Some(self.backend.audio_sources());
                }
            }
            Category::VideoSource => {
                if refresh || inner.video_sources.is_none() {
                    inner.video_sources = Some(self.backend.video_sources());
                    if !inner.in_use(Category::Capability) {
                        inner.capabilities = None;
                    }
                }
            }
            Category::Capability => {
                if inner.video_sources.is_none() {
                    self.load(inner, Category::VideoSource, false);
                }
                if refresh || inner.capabilities.is_none() {
                    let caps = inner
                        .video_source()
                        .map(|source| source.capabilities())
                        .unwrap_or_default();
                    inner.capabilities = Some(caps);
                }
            }
            Category::AudioCodec => {
                if refresh || inner.audio_codecs.is_none() {
                    inner.audio_codecs = Some(self.backend.audio_codecs());
                }
            }
            Category::VideoCodec => {
                if refresh || inner.video_codecs.is_none() {
                    inner.video_codecs = Some(self.backend.video_codecs());
                }
            }
            Category::AudioPlayback => {
                if refresh || inner.playback.is_none() {
                    inner.playback = Some(self.backend.playback_devices());
                }
            }
        }
        log::debug!("{} list size: {}", category, inner.len(category));
    }

    fn clamp(&self, inner: &mut Inner, category: Category) {
        let len = inner.len(category);
        let current = inner.index(category);
        if len > 0 && current >= len {
            if let Err(e) = self.set_index_locked(inner, category, current) {
                log::warn!("Could not clamp {} index {}: {}", category, current, e);
            }
        }
    }

    fn set_index_locked(
        &self,
        inner: &mut Inner,
        category: Category,
        new_index: usize,
    ) -> Result<usize, SessionError> {
        if inner.active[category.slot()] {
            log::warn!(
                "NOT setting {} index to {} as it is currently in use",
                category,
                new_index
            );
            return Err(SessionError::ResourceBusy(format!(
                "Unable to change {} while it is in use",
                category
            )));
        }

        self.load(inner, category, false);
        let len = inner.len(category);
        if len > 0 && new_index >= len {
            log::warn!(
                "Stale {} index {} for list of size {}, clamping to {}",
                category,
                new_index,
                len,
                len - 1
            );
            return self.set_index_locked(inner, category, len - 1);
        }

        let was = inner.index(category);
        inner.indices[category.slot()] = new_index;
        self.persist(category, new_index);
        log::info!("{} index Now: {} Was: {}", category, new_index, was);

        if category == Category::VideoSource {
            inner.capabilities = None;
            self.load(inner, Category::Capability, false);
            let cap_index = inner.index(Category::Capability);
            self.set_index_locked(inner, Category::Capability, cap_index)?;
        }

        Ok(new_index)
    }

    fn persist(&self, category: Category, index: usize) {
        if let Err(e) = self
            .store
            .set_value(category.index_key(), StoreValue::Int(index as i64))
        {
            log::warn!("Failed to save {} index: {}", category, e);
        }
    }

    /// Select `new_index` in `category` and persist it.
    ///
    /// Refused with `ResourceBusy` while the category is active. Indices past
    /// the end of a non-empty list are clamped to its last entry.
    pub fn set_selected_index(
        &self,
        category: Category,
        new_index: usize,
    ) -> Result<usize, SessionError> {
        let mut inner = self.lock();
        self.set_index_locked(&mut inner, category, new_index)
    }

    pub fn selected_index(&self, category: Category) -> usize {
        self.lock().index(category)
    }

    /// Index the selection of `category` would move to.
    pub fn next_index(&self, category: Category, ascending: bool) -> Result<usize, SessionError> {
        let mut inner = self.lock();
        self.load(&mut inner, category, false);
        let len = inner.len(category);
        if len == 0 {
            return Err(SessionError::ResourceUnavailable(format!(
                "No {} available",
                category
            )));
        }
        let current = inner.index(category).min(len - 1);
        cycler::next_index(len, current, ascending)
    }

    /// Move the selection of `category` one step and persist it.
    pub fn select_next(&self, category: Category, ascending: bool) -> Result<usize, SessionError> {
        let next = self.next_index(category, ascending)?;
        self.set_selected_index(category, next)
    }

    /// Fetch a fresh list for `category` and clamp its selection.
    ///
    /// While the selection is in use it stays on the same resource: the index
    /// follows that resource into the fresh list, or the refresh waits until
    /// the resource is released. Capabilities are never recomputed in use.
    pub fn refresh(&self, category: Category) {
        let mut inner = self.lock();
        self.refresh_locked(&mut inner, category);
    }

    fn refresh_locked(&self, inner: &mut Inner, category: Category) {
        if inner.in_use(category) {
            self.refresh_in_use(inner, category);
            return;
        }
        inner.pending[category.slot()] = false;
        self.load(inner, category, true);
        self.clamp(inner, category);
        if category == Category::VideoSource {
            inner.pending[Category::Capability.slot()] = false;
            self.load(inner, Category::Capability, false);
            self.clamp(inner, Category::Capability);
        }
    }

    fn refresh_in_use(&self, inner: &mut Inner, category: Category) {
        let index = inner.index(category);
        let selected = match inner.identity(category, index) {
            Some(selected) if category != Category::Capability => selected,
            _ => {
                log::debug!("{} in use, refresh postponed", category);
                inner.pending[category.slot()] = true;
                return;
            }
        };

        let previous = inner.clone();
        self.load(inner, category, true);
        match inner.position(category, &selected) {
            Some(position) => {
                if position != index {
                    inner.indices[category.slot()] = position;
                    self.persist(category, position);
                    log::info!(
                        "{} in use moved Now: {} Was: {}",
                        category,
                        position,
                        index
                    );
                }
            }
            None => {
                log::warn!(
                    "{} in use is no longer listed, refresh postponed until it is released",
                    category
                );
                *inner = previous;
                inner.pending[category.slot()] = true;
            }
        }
    }

    pub fn list_len(&self, category: Category) -> usize {
        let mut inner = self.lock();
        self.load(&mut inner, category, false);
        inner.len(category)
    }

    pub fn set_active(&self, category: Category, active: bool) {
        let mut inner = self.lock();
        let was = inner.active[category.slot()];
        inner.active[category.slot()] = active;
        if was != active {
            log::debug!("{} active Now: {} Was: {}", category, active, was);
        }
        if !active {
            for postponed in Category::ALL {
                if inner.pending[postponed.slot()] && !inner.in_use(postponed) {
                    log::debug!("Running postponed {} refresh", postponed);
                    self.refresh_locked(&mut inner, postponed);
                }
            }
        }
    }

    pub fn is_active(&self, category: Category) -> bool {
        self.lock().active[category.slot()]
    }

    pub fn audio_sources(&self, refresh: bool) -> Vec<Arc<dyn CaptureSource>> {
        if refresh {
            self.refresh(Category::AudioSource);
        }
        let mut inner = self.lock();
        self.load(&mut inner, Category::AudioSource, false);
        inner.audio_sources.clone().unwrap_or_default()
    }

    pub fn video_sources(&self, refresh: bool) -> Vec<Arc<dyn CaptureSource>> {
        if refresh {
            self.refresh(Category::VideoSource);
        }
        let mut inner = self.lock();
        self.load(&mut inner, Category::VideoSource, false);
        inner.video_sources.clone().unwrap_or_default()
    }

    /// Capabilities of the selected video source.
    pub fn capabilities(&self) -> Vec<VideoCapability> {
        let mut inner = self.lock();
        self.load(&mut inner, Category::Capability, false);
        inner.capabilities.clone().unwrap_or_default()
    }

    pub fn codecs(&self, kind: MediaKind, refresh: bool) -> Vec<String> {
        let category = codec_category(kind);
        if refresh {
            self.refresh(category);
        }
        let mut inner = self.lock();
        self.load(&mut inner, category, false);
        let list = match kind {
            MediaKind::Audio => &inner.audio_codecs,
            MediaKind::Video => &inner.video_codecs,
        };
        list.clone().unwrap_or_default()
    }

    pub fn playback_devices(&self, refresh: bool) -> Vec<Arc<dyn AudioPlayback>> {
        if refresh {
            self.refresh(Category::AudioPlayback);
        }
        let mut inner = self.lock();
        self.load(&mut inner, Category::AudioPlayback, false);
        inner.playback.clone().unwrap_or_default()
    }

    pub fn selected_audio_source(&self) -> Option<Arc<dyn CaptureSource>> {
        let mut inner = self.lock();
        self.load(&mut inner, Category::AudioSource, false);
        let index = inner.index(Category::AudioSource);
        inner.audio_sources.as_ref()?.get(index).cloned()
    }

    pub fn selected_video_source(&self) -> Option<Arc<dyn CaptureSource>> {
        let mut inner = self.lock();
        self.load(&mut inner, Category::VideoSource, false);
        inner.video_source()
    }

    pub fn selected_capability(&self) -> Option<VideoCapability> {
        let mut inner = self.lock();
        self.load(&mut inner, Category::Capability, false);
        let index = inner.index(Category::Capability);
        inner.capabilities.as_ref()?.get(index).cloned()
    }

    pub fn selected_codec(&self, kind: MediaKind) -> Option<String> {
        let category = codec_category(kind);
        let mut inner = self.lock();
        self.load(&mut inner, category, false);
        let index = inner.index(category);
        let list = match kind {
            MediaKind::Audio => inner.audio_codecs.as_ref(),
            MediaKind::Video => inner.video_codecs.as_ref(),
        };
        list?.get(index).cloned()
    }

    pub fn selected_playback(&self) -> Option<Arc<dyn AudioPlayback>> {
        let mut inner = self.lock();
        self.load(&mut inner, Category::AudioPlayback, false);
        let index = inner.index(Category::AudioPlayback);
        inner.playback.as_ref()?.get(index).cloned()
    }

    pub fn audio_source_name(&self) -> String {
        self.selected_audio_source()
            .map(|source| source_label(source.as_ref(), false))
            .unwrap_or_else(|| NONE.to_string())
    }

    pub fn video_source_name(&self) -> String {
        self.selected_video_source()
            .map(|source| source_label(source.as_ref(), false))
            .unwrap_or_else(|| NONE.to_string())
    }

    pub fn capability_name(&self) -> String {
        self.selected_capability()
            .map(|cap| cap.to_string())
            .unwrap_or_else(|| NONE.to_string())
    }

    pub fn codec_name(&self, kind: MediaKind) -> String {
        self.selected_codec(kind)
            .unwrap_or_else(|| NONE.to_string())
    }

    pub fn playback_name(&self) -> String {
        self.selected_playback()
            .map(|device| device.name())
            .unwrap_or_else(|| NONE.to_string())
    }

    /// Codecs for a publish attempt, with the high-resolution override applied.
    ///
    /// The override only affects the returned value; the stored selection is
    /// left alone.
    pub fn publish_codecs(&self, media: &MediaConfig, policy: &CodecPolicy) -> PublishCodecs {
        let audio = self
            .selected_codec(MediaKind::Audio)
            .unwrap_or_else(|| media.default_audio_codec.clone());
        let preferred = self
            .selected_codec(MediaKind::Video)
            .unwrap_or_else(|| media.default_video_codec.clone());
        let capability = self.selected_capability();
        let video = adjust_video_codec(&preferred, capability.as_ref(), policy);
        log::info!("Publish codecs: {}/{}", audio, video);
        PublishCodecs { audio, video }
    }
}

fn codec_category(kind: MediaKind) -> Category {
    match kind {
        MediaKind::Audio => Category::AudioCodec,
        MediaKind::Video => Category::VideoCodec,
    }
}
