//! Inbound bridge surface: the object a page's instrumentation script calls into.
//!
//! One bridge exists per content instance. Calls may arrive from any thread; the bridge
//! only converts page units and forwards to the coordinator, which serializes them.

use std::sync::Weak;

use log::debug;
use uuid::Uuid;

use crate::session::metadata::{page_seconds_to_ms, MediaAction, TrackInfo};
use crate::session::SessionEvent;
use crate::shortcut::ShortcutId;

/// Identifies one incarnation of a content instance. A recreated instance with the same
/// shortcut id gets a new token, so a destroyed page's bridge can never speak for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceOrigin {
    pub shortcut_id: ShortcutId,
    pub instance_token: Uuid,
}

impl InstanceOrigin {
    pub fn new(shortcut_id: impl Into<String>) -> Self {
        Self {
            shortcut_id: shortcut_id.into(),
            instance_token: Uuid::new_v4(),
        }
    }
}

/// Bridge call after unit conversion and action-name parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    Session(SessionEvent),
    ActionHandler { action: MediaAction, enabled: bool },
}

/// Receiver of bridge traffic; implemented by the coordinator.
pub trait SessionEventSink: Send + Sync {
    fn is_background_capable(&self, origin: &InstanceOrigin) -> bool;
    fn submit(&self, origin: &InstanceOrigin, event: BridgeEvent);
}

/// Per-instance bridge handed to the page engine.
#[derive(Clone)]
pub struct MediaSessionBridge {
    origin: InstanceOrigin,
    sink: Weak<dyn SessionEventSink>,
}

impl MediaSessionBridge {
    pub fn new(origin: InstanceOrigin, sink: Weak<dyn SessionEventSink>) -> Self {
        Self { origin, sink }
    }

    pub fn origin(&self) -> &InstanceOrigin {
        &self.origin
    }

    fn submit(&self, event: BridgeEvent) {
        match self.sink.upgrade() {
            Some(sink) => sink.submit(&self.origin, event),
            None => debug!(
                "MediaSessionBridge: coordinator gone, dropping event from '{}'",
                self.origin.shortcut_id
            ),
        }
    }

    fn submit_session(&self, event: SessionEvent) {
        self.submit(BridgeEvent::Session(event));
    }

    /// Whether the page runs as a background instance. The instrumentation script does not
    /// install itself otherwise.
    pub fn is_background_capable(&self) -> bool {
        self.sink
            .upgrade()
            .is_some_and(|sink| sink.is_background_capable(&self.origin))
    }

    pub fn on_create(
        &self,
        title: &str,
        artist: &str,
        album: Option<&str>,
        artwork_url: Option<&str>,
    ) {
        self.submit_session(SessionEvent::Create(track_info(
            title,
            artist,
            album,
            artwork_url,
        )));
    }

    pub fn on_destroy(&self) {
        self.submit_session(SessionEvent::Destroy);
    }

    pub fn on_play(&self) {
        self.submit_session(SessionEvent::Play);
    }

    pub fn on_buffering(&self) {
        self.submit_session(SessionEvent::Buffering);
    }

    pub fn on_playing(&self, current_time_secs: f64, duration_secs: f64) {
        self.submit_session(SessionEvent::Playing {
            current_time_ms: page_seconds_to_ms(current_time_secs),
            duration_ms: page_seconds_to_ms(duration_secs),
        });
    }

    pub fn on_rate_change(&self, current_time_secs: f64, playback_rate: f64) {
        let rate = if playback_rate.is_finite() {
            playback_rate as f32
        } else {
            1.0
        };
        self.submit_session(SessionEvent::RateChange {
            current_time_ms: page_seconds_to_ms(current_time_secs),
            rate,
        });
    }

    pub fn on_seek_to(&self, current_time_secs: f64) {
        self.submit_session(SessionEvent::SeekTo {
            current_time_ms: page_seconds_to_ms(current_time_secs),
        });
    }

    pub fn on_pause(&self, current_time_secs: f64) {
        self.submit_session(SessionEvent::Pause {
            current_time_ms: page_seconds_to_ms(current_time_secs),
        });
    }

    pub fn on_set_action_handler(&self, action: &str, enabled: bool) {
        let Some(action) = MediaAction::from_name(action) else {
            debug!(
                "MediaSessionBridge: ignoring action handler '{}' from '{}'",
                action, self.origin.shortcut_id
            );
            return;
        };
        self.submit(BridgeEvent::ActionHandler { action, enabled });
    }

    pub fn on_metadata_update(
        &self,
        title: &str,
        artist: &str,
        album: Option<&str>,
        artwork_url: Option<&str>,
    ) {
        self.submit_session(SessionEvent::MetadataUpdate(track_info(
            title,
            artist,
            album,
            artwork_url,
        )));
    }
}

fn track_info(
    title: &str,
    artist: &str,
    album: Option<&str>,
    artwork_url: Option<&str>,
) -> TrackInfo {
    TrackInfo {
        title: title.to_string(),
        artist: artist.to_string(),
        album: album.map(ToString::to_string),
        artwork_url: artwork_url
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(ToString::to_string),
    }
}
