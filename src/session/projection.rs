//! OS-facing projection of the playback metadata slot.
//!
//! An `ExternalSession` is rebuilt from scratch on every accepted event; nothing here is
//! mutated in place.

use crate::artwork::Cover;
use crate::session::metadata::PlaybackMetadata;
use crate::shortcut::ShortcutId;

/// Identifier of the custom action that ends the background media session.
pub const END_SESSION_ACTION: &str = "end_media_session";

/// Playback state enum presented to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Buffering,
    Playing,
    Paused,
}

/// Transport capability bitset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionActions(u32);

impl SessionActions {
    pub const PLAY: Self = Self(1 << 0);
    pub const PAUSE: Self = Self(1 << 1);
    pub const PLAY_PAUSE: Self = Self(1 << 2);
    pub const SKIP_TO_PREVIOUS: Self = Self(1 << 3);
    pub const SKIP_TO_NEXT: Self = Self(1 << 4);
    pub const SEEK_TO: Self = Self(1 << 5);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for SessionActions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Non-standard action shown next to the transport buttons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomAction {
    pub action: String,
    pub label: String,
}

/// Display metadata for the platform session.
#[derive(Debug, Clone)]
pub struct SessionMetadata {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration_ms: u64,
    pub cover: Option<Cover>,
}

/// Position/state snapshot for the platform session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub position_ms: u64,
    pub rate: f32,
}

/// Full OS-facing media session.
#[derive(Debug, Clone)]
pub struct ExternalSession {
    pub owner_id: ShortcutId,
    pub metadata: SessionMetadata,
    pub playback: PlaybackSnapshot,
    pub actions: SessionActions,
    pub custom_actions: Vec<CustomAction>,
}

impl ExternalSession {
    pub fn build(metadata: &PlaybackMetadata, end_session_label: &str) -> Self {
        Self {
            owner_id: metadata.owner_id.clone(),
            metadata: SessionMetadata {
                title: metadata.title.clone(),
                artist: metadata.artist.clone(),
                album: metadata.album.clone(),
                duration_ms: metadata.duration_ms,
                cover: metadata.resolved_cover.clone(),
            },
            playback: PlaybackSnapshot {
                state: playback_state(metadata),
                position_ms: metadata.current_time_ms,
                rate: metadata.playback_rate,
            },
            actions: session_actions(metadata),
            custom_actions: vec![CustomAction {
                action: END_SESSION_ACTION.to_string(),
                label: end_session_label.to_string(),
            }],
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playback.state != PlaybackState::Paused
    }
}

pub fn playback_state(metadata: &PlaybackMetadata) -> PlaybackState {
    if metadata.is_playing && metadata.is_buffering {
        PlaybackState::Buffering
    } else if metadata.is_playing {
        PlaybackState::Playing
    } else {
        PlaybackState::Paused
    }
}

pub fn session_actions(metadata: &PlaybackMetadata) -> SessionActions {
    let mut actions = SessionActions::PLAY | SessionActions::PAUSE | SessionActions::PLAY_PAUSE;
    if metadata.duration_ms > 0 || metadata.prev_capable {
        actions.insert(SessionActions::SKIP_TO_PREVIOUS);
    }
    if metadata.duration_ms > 0 {
        actions.insert(SessionActions::SEEK_TO);
    }
    if metadata.next_capable {
        actions.insert(SessionActions::SKIP_TO_NEXT);
    }
    actions
}
