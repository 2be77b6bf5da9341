//! The single playback-metadata slot model.

use crate::artwork::Cover;
use crate::shortcut::ShortcutId;

/// Page-side action names the host mirrors into session capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaAction {
    PreviousTrack,
    NextTrack,
}

impl MediaAction {
    pub const PREVIOUS_TRACK: &'static str = "previoustrack";
    pub const NEXT_TRACK: &'static str = "nexttrack";

    /// Parses a media-session action name. Unrecognized names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            Self::PREVIOUS_TRACK => Some(Self::PreviousTrack),
            Self::NEXT_TRACK => Some(Self::NextTrack),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::PreviousTrack => Self::PREVIOUS_TRACK,
            Self::NextTrack => Self::NEXT_TRACK,
        }
    }
}

/// Track-navigation handlers a page has registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionCapabilities {
    pub previous_track: bool,
    pub next_track: bool,
}

impl ActionCapabilities {
    pub fn set(&mut self, action: MediaAction, enabled: bool) {
        match action {
            MediaAction::PreviousTrack => self.previous_track = enabled,
            MediaAction::NextTrack => self.next_track = enabled,
        }
    }
}

/// Display fields reported by a page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackInfo {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub artwork_url: Option<String>,
}

/// Live playback state of the session owner.
#[derive(Debug, Clone)]
pub struct PlaybackMetadata {
    pub owner_id: ShortcutId,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub prev_capable: bool,
    pub next_capable: bool,
    pub is_playing: bool,
    pub is_buffering: bool,
    pub current_time_ms: u64,
    pub duration_ms: u64,
    pub playback_rate: f32,
    pub artwork_url: Option<String>,
    pub resolved_cover: Option<Cover>,
}

impl PlaybackMetadata {
    /// Metadata for a freshly created session. A page only announces media once it plays,
    /// so the session starts out playing. The artwork URL is left unset until resolution
    /// is requested.
    pub fn created(
        owner_id: impl Into<String>,
        track: &TrackInfo,
        capabilities: ActionCapabilities,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            title: track.title.clone(),
            artist: track.artist.clone(),
            album: track.album.clone(),
            prev_capable: capabilities.previous_track,
            next_capable: capabilities.next_track,
            is_playing: true,
            is_buffering: false,
            current_time_ms: 0,
            duration_ms: 0,
            playback_rate: 1.0,
            artwork_url: None,
            resolved_cover: None,
        }
    }
}

/// Converts a page time value in seconds to whole milliseconds.
pub fn page_seconds_to_ms(seconds: f64) -> u64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    (seconds * 1000.0) as u64
}

/// Converts host milliseconds to the page's time unit.
pub fn ms_to_page_seconds(position_ms: u64) -> f64 {
    position_ms as f64 / 1000.0
}
