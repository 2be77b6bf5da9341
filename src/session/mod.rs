//! Single-owner arbitration of the external media session.
//!
//! The arbiter holds the one `PlaybackMetadata` slot. Creation events from any instance
//! take ownership; every other event is applied only when it comes from the current owner.

pub mod metadata;
pub mod projection;

use log::debug;

use crate::artwork::{ArtworkRequest, Cover};
use crate::shortcut::ShortcutId;
use metadata::{ActionCapabilities, PlaybackMetadata, TrackInfo};
use projection::ExternalSession;

/// Page-originated session events, already converted to host units.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Create(TrackInfo),
    Destroy,
    Play,
    Buffering,
    Playing { current_time_ms: u64, duration_ms: u64 },
    RateChange { current_time_ms: u64, rate: f32 },
    SeekTo { current_time_ms: u64 },
    Pause { current_time_ms: u64 },
    CapabilitiesChanged,
    MetadataUpdate(TrackInfo),
}

impl SessionEvent {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::Destroy => "destroy",
            Self::Play => "play",
            Self::Buffering => "buffering",
            Self::Playing { .. } => "playing",
            Self::RateChange { .. } => "ratechange",
            Self::SeekTo { .. } => "seekto",
            Self::Pause { .. } => "pause",
            Self::CapabilitiesChanged => "capabilities",
            Self::MetadataUpdate(_) => "metadata",
        }
    }
}

/// What the caller must do to reconcile presentation after an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtworkChange {
    Unchanged,
    Resolve(Option<String>),
}

/// Result of applying one event to the slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Dropped by the ownership guard, or no session to apply it to.
    Ignored,
    /// Slot changed; the session must be rebuilt and republished.
    Updated { artwork: ArtworkChange },
    /// Slot is now empty.
    Released { owner_id: ShortcutId },
}

struct ActiveSession {
    metadata: PlaybackMetadata,
    artwork_request: Option<ArtworkRequest>,
}

impl ActiveSession {
    fn cancel_artwork(&mut self) {
        if let Some(request) = self.artwork_request.take() {
            request.cancel();
        }
    }
}

/// Holder of the single playback metadata slot.
#[derive(Default)]
pub struct SessionArbiter {
    slot: Option<ActiveSession>,
}

impl SessionArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner_id(&self) -> Option<&str> {
        self.slot
            .as_ref()
            .map(|active| active.metadata.owner_id.as_str())
    }

    pub fn is_owner(&self, id: &str) -> bool {
        self.owner_id() == Some(id)
    }

    pub fn metadata(&self) -> Option<&PlaybackMetadata> {
        self.slot.as_ref().map(|active| &active.metadata)
    }

    pub fn has_pending_artwork(&self) -> bool {
        self.slot
            .as_ref()
            .is_some_and(|active| active.artwork_request.is_some())
    }

    /// Applies `event` from instance `source`. `capabilities` are the handlers `source`
    /// has registered so far.
    pub fn apply(
        &mut self,
        source: &str,
        capabilities: ActionCapabilities,
        event: SessionEvent,
    ) -> Transition {
        if let SessionEvent::Create(track) = event {
            return self.create(source, capabilities, track);
        }

        if !self.is_owner(source) {
            debug!(
                "SessionArbiter: dropped '{}' from non-owner '{}' (owner={:?})",
                event.label(),
                source,
                self.owner_id()
            );
            return Transition::Ignored;
        }

        if event == SessionEvent::Destroy {
            return match self.teardown() {
                Some(owner_id) => Transition::Released { owner_id },
                None => Transition::Ignored,
            };
        }

        let Some(active) = self.slot.as_mut() else {
            return Transition::Ignored;
        };
        let metadata = &mut active.metadata;
        let mut artwork = ArtworkChange::Unchanged;
        match event {
            SessionEvent::Play => metadata.is_playing = true,
            SessionEvent::Buffering => metadata.is_buffering = true,
            SessionEvent::Playing {
                current_time_ms,
                duration_ms,
            } => {
                metadata.current_time_ms = current_time_ms;
                metadata.duration_ms = duration_ms;
                metadata.is_playing = true;
                metadata.is_buffering = false;
            }
            SessionEvent::RateChange {
                current_time_ms,
                rate,
            } => {
                metadata.current_time_ms = current_time_ms;
                metadata.playback_rate = rate;
            }
            SessionEvent::SeekTo { current_time_ms } => {
                metadata.current_time_ms = current_time_ms;
            }
            SessionEvent::Pause { current_time_ms } => {
                metadata.current_time_ms = current_time_ms;
                metadata.is_playing = false;
            }
            SessionEvent::CapabilitiesChanged => {
                metadata.prev_capable = capabilities.previous_track;
                metadata.next_capable = capabilities.next_track;
            }
            SessionEvent::MetadataUpdate(track) => {
                metadata.title = track.title;
                metadata.artist = track.artist;
                metadata.album = track.album;
                if metadata.artwork_url != track.artwork_url {
                    metadata.artwork_url = track.artwork_url.clone();
                    artwork = ArtworkChange::Resolve(track.artwork_url);
                }
            }
            SessionEvent::Create(_) | SessionEvent::Destroy => {}
        }
        Transition::Updated { artwork }
    }

    fn create(
        &mut self,
        source: &str,
        capabilities: ActionCapabilities,
        track: TrackInfo,
    ) -> Transition {
        if let Some(previous) = self.slot.as_mut() {
            if previous.metadata.owner_id != source {
                debug!(
                    "SessionArbiter: ownership moves from '{}' to '{}'",
                    previous.metadata.owner_id, source
                );
            }
            previous.cancel_artwork();
        }

        let mut metadata = PlaybackMetadata::created(source, &track, capabilities);
        let artwork = match track.artwork_url {
            Some(url) => {
                metadata.artwork_url = Some(url.clone());
                ArtworkChange::Resolve(Some(url))
            }
            None => ArtworkChange::Unchanged,
        };
        self.slot = Some(ActiveSession {
            metadata,
            artwork_request: None,
        });
        Transition::Updated { artwork }
    }

    /// Empties the slot, cancelling any in-flight artwork. Returns the former owner.
    pub fn teardown(&mut self) -> Option<ShortcutId> {
        let mut active = self.slot.take()?;
        active.cancel_artwork();
        Some(active.metadata.owner_id)
    }

    pub fn teardown_if_owner(&mut self, id: &str) -> bool {
        if !self.is_owner(id) {
            return false;
        }
        self.teardown().is_some()
    }

    /// Records `request` as the slot's only in-flight artwork resolution.
    pub fn track_artwork_request(&mut self, request: ArtworkRequest) {
        match self.slot.as_mut() {
            Some(active) => {
                active.cancel_artwork();
                active.artwork_request = Some(request);
            }
            None => request.cancel(),
        }
    }

    /// Drops the cover immediately (no artwork URL).
    pub fn clear_cover(&mut self) {
        if let Some(active) = self.slot.as_mut() {
            active.cancel_artwork();
            active.metadata.resolved_cover = None;
        }
    }

    /// Applies a completed resolution. Returns false when `generation` has been superseded,
    /// cancelled, or belongs to a different owner.
    pub fn apply_cover(&mut self, owner_id: &str, generation: u64, cover: Option<Cover>) -> bool {
        let Some(active) = self.slot.as_mut() else {
            return false;
        };
        if active.metadata.owner_id != owner_id {
            return false;
        }
        let current = active
            .artwork_request
            .as_ref()
            .is_some_and(|request| request.generation() == generation && !request.is_cancelled());
        if !current {
            return false;
        }
        active.artwork_request = None;
        active.metadata.resolved_cover = cover;
        true
    }

    pub fn project(&self, end_session_label: &str) -> Option<ExternalSession> {
        self.metadata()
            .map(|metadata| ExternalSession::build(metadata, end_session_label))
    }
}
