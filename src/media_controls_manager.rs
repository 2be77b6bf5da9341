//! OS media controls bridge (MPRIS/SMTC/Now Playing).
//!
//! This manager mirrors the published external media session onto platform media control
//! integrations via `souvlaki`, and turns platform control events into transport commands
//! on the event bus.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{info, warn};
use souvlaki::{
    MediaControlEvent, MediaControls, MediaMetadata, MediaPlayback, MediaPosition,
    PlatformConfig, SeekDirection,
};
use tokio::sync::broadcast::{Receiver, Sender};

use crate::config::MediaControlsConfig;
use crate::protocol::{Message, SessionMessage, TransportCommand};
use crate::session::projection::{ExternalSession, PlaybackState, SessionActions};
use crate::shortcut::ShortcutId;

const SEEK_STEP_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, Default)]
struct ControlState {
    has_session: bool,
    is_playing: bool,
    position_ms: u64,
    duration_ms: u64,
    actions: SessionActions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlaybackPublishState {
    Stopped,
    Paused { position_ms: u64 },
    Playing { position_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MetadataSignature {
    owner_id: ShortcutId,
    title: String,
    artist: String,
    album: Option<String>,
    cover_url: Option<String>,
    duration_ms: u64,
}

impl MetadataSignature {
    fn from_session(session: &ExternalSession) -> Self {
        Self {
            owner_id: session.owner_id.clone(),
            title: session.metadata.title.clone(),
            artist: session.metadata.artist.clone(),
            album: session.metadata.album.clone(),
            cover_url: session
                .metadata
                .cover
                .as_ref()
                .map(|cover| cover.source_url().to_string()),
            duration_ms: session.metadata.duration_ms,
        }
    }
}

/// Handles OS media control events and publishes the active media session.
pub struct MediaControlsManager {
    bus_consumer: Receiver<Message>,
    control_state: Arc<Mutex<ControlState>>,
    controls: Option<MediaControls>,
    current_metadata: Option<MetadataSignature>,
    last_published_playback: Option<PlaybackPublishState>,
    last_published_metadata: Option<Option<MetadataSignature>>,
}

impl MediaControlsManager {
    /// Creates a manager and attempts to initialize platform media controls.
    pub fn new(
        config: &MediaControlsConfig,
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
    ) -> Self {
        let control_state = Arc::new(Mutex::new(ControlState::default()));
        let controls = Self::create_controls(config, bus_producer, Arc::clone(&control_state));

        Self {
            bus_consumer,
            control_state,
            controls,
            current_metadata: None,
            last_published_playback: None,
            last_published_metadata: None,
        }
    }

    #[cfg(not(target_os = "windows"))]
    fn create_controls(
        config: &MediaControlsConfig,
        bus_producer: Sender<Message>,
        control_state: Arc<Mutex<ControlState>>,
    ) -> Option<MediaControls> {
        let mut controls = match MediaControls::new(PlatformConfig {
            display_name: &config.display_name,
            dbus_name: &config.dbus_name,
            hwnd: None,
        }) {
            Ok(controls) => controls,
            Err(err) => {
                warn!(
                    "MediaControlsManager: failed to create media controls backend: {:?}",
                    err
                );
                return None;
            }
        };

        if let Err(err) = controls.attach(move |event| {
            let snapshot = match control_state.lock() {
                Ok(state) => *state,
                Err(poisoned) => *poisoned.into_inner(),
            };

            if let Some(command) = Self::map_control_event(event, snapshot) {
                let _ = bus_producer.send(Message::Transport(command));
            }
        }) {
            warn!(
                "MediaControlsManager: failed to attach media controls handler: {:?}",
                err
            );
            return None;
        }

        Some(controls)
    }

    #[cfg(target_os = "windows")]
    fn create_controls(
        _config: &MediaControlsConfig,
        _bus_producer: Sender<Message>,
        _control_state: Arc<Mutex<ControlState>>,
    ) -> Option<MediaControls> {
        // Souvlaki requires an HWND on Windows, and this host has no window to offer.
        warn!(
            "MediaControlsManager: Windows media controls are disabled because HWND wiring is not configured"
        );
        None
    }

    fn map_control_event(
        event: MediaControlEvent,
        state: ControlState,
    ) -> Option<TransportCommand> {
        if !state.has_session {
            return None;
        }
        let supports = |action: SessionActions| state.actions.contains(action).then_some(());
        match event {
            MediaControlEvent::Play => {
                supports(SessionActions::PLAY).map(|_| TransportCommand::Play)
            }
            MediaControlEvent::Pause => {
                supports(SessionActions::PAUSE).map(|_| TransportCommand::Pause)
            }
            MediaControlEvent::Toggle => {
                supports(SessionActions::PLAY_PAUSE)?;
                if state.is_playing {
                    Some(TransportCommand::Pause)
                } else {
                    Some(TransportCommand::Play)
                }
            }
            MediaControlEvent::Next => {
                supports(SessionActions::SKIP_TO_NEXT).map(|_| TransportCommand::SkipNext)
            }
            MediaControlEvent::Previous => {
                supports(SessionActions::SKIP_TO_PREVIOUS).map(|_| TransportCommand::SkipPrevious)
            }
            MediaControlEvent::Stop => Some(TransportCommand::EndSession),
            MediaControlEvent::SetPosition(position) => {
                Self::seek_command_from_target_ms(state, position.0.as_millis() as u64)
            }
            MediaControlEvent::SeekBy(direction, delta) => {
                let delta_ms = delta.as_millis() as u64;
                let target_ms = match direction {
                    SeekDirection::Forward => state.position_ms.saturating_add(delta_ms),
                    SeekDirection::Backward => state.position_ms.saturating_sub(delta_ms),
                };
                Self::seek_command_from_target_ms(state, target_ms)
            }
            MediaControlEvent::Seek(direction) => {
                let target_ms = match direction {
                    SeekDirection::Forward => state.position_ms.saturating_add(SEEK_STEP_MS),
                    SeekDirection::Backward => state.position_ms.saturating_sub(SEEK_STEP_MS),
                };
                Self::seek_command_from_target_ms(state, target_ms)
            }
            MediaControlEvent::SetVolume(_)
            | MediaControlEvent::OpenUri(_)
            | MediaControlEvent::Raise
            | MediaControlEvent::Quit => None,
        }
    }

    fn seek_command_from_target_ms(state: ControlState, target_ms: u64) -> Option<TransportCommand> {
        if state.duration_ms == 0 || !state.actions.contains(SessionActions::SEEK_TO) {
            return None;
        }
        Some(TransportCommand::SeekTo {
            position_ms: target_ms.min(state.duration_ms),
        })
    }

    fn update_control_state<F>(&self, update: F)
    where
        F: FnOnce(&mut ControlState),
    {
        match self.control_state.lock() {
            Ok(mut state) => update(&mut state),
            Err(poisoned) => {
                let mut state = poisoned.into_inner();
                update(&mut state);
            }
        }
    }

    fn control_state_snapshot(&self) -> ControlState {
        match self.control_state.lock() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn desired_playback_publish_state(&self) -> PlaybackPublishState {
        let snapshot = self.control_state_snapshot();
        if !snapshot.has_session {
            PlaybackPublishState::Stopped
        } else if snapshot.is_playing {
            PlaybackPublishState::Playing {
                position_ms: snapshot.position_ms,
            }
        } else {
            PlaybackPublishState::Paused {
                position_ms: snapshot.position_ms,
            }
        }
    }

    fn publish_playback_if_needed(&mut self) {
        let desired_state = self.desired_playback_publish_state();
        if self.last_published_playback == Some(desired_state) {
            return;
        }

        let Some(controls) = self.controls.as_mut() else {
            return;
        };

        let progress =
            |position_ms: u64| Some(MediaPosition(Duration::from_millis(position_ms)));
        let playback = match desired_state {
            PlaybackPublishState::Stopped => MediaPlayback::Stopped,
            PlaybackPublishState::Paused { position_ms } => MediaPlayback::Paused {
                progress: progress(position_ms),
            },
            PlaybackPublishState::Playing { position_ms } => MediaPlayback::Playing {
                progress: progress(position_ms),
            },
        };

        if let Err(err) = controls.set_playback(playback) {
            warn!(
                "MediaControlsManager: failed to publish playback state {:?}: {:?}",
                desired_state, err
            );
            return;
        }

        self.last_published_playback = Some(desired_state);
    }

    fn publish_metadata_if_needed(&mut self) {
        if self.last_published_metadata.as_ref() == Some(&self.current_metadata) {
            return;
        }

        let Some(controls) = self.controls.as_mut() else {
            return;
        };

        let publish_result = match self.current_metadata.as_ref() {
            Some(signature) => {
                let duration = (signature.duration_ms > 0)
                    .then(|| Duration::from_millis(signature.duration_ms));
                controls.set_metadata(MediaMetadata {
                    title: Some(signature.title.as_str()),
                    artist: Some(signature.artist.as_str()),
                    album: signature.album.as_deref(),
                    cover_url: signature.cover_url.as_deref(),
                    duration,
                })
            }
            None => controls.set_metadata(MediaMetadata::default()),
        };

        if let Err(err) = publish_result {
            warn!("MediaControlsManager: failed to publish metadata: {:?}", err);
            return;
        }

        self.last_published_metadata = Some(self.current_metadata.clone());
    }

    fn handle_message(&mut self, message: Message) {
        match message {
            Message::Session(SessionMessage::Updated(session)) => {
                self.update_control_state(|state| {
                    state.has_session = true;
                    // Buffering is shown as playing.
                    state.is_playing = session.playback.state != PlaybackState::Paused;
                    state.position_ms = session.playback.position_ms;
                    state.duration_ms = session.metadata.duration_ms;
                    state.actions = session.actions;
                });
                self.current_metadata = Some(MetadataSignature::from_session(&session));
                self.publish_metadata_if_needed();
                self.publish_playback_if_needed();
            }
            Message::Session(SessionMessage::Released { owner_id }) => {
                info!(
                    "MediaControlsManager: session of '{}' released",
                    owner_id
                );
                self.update_control_state(|state| *state = ControlState::default());
                self.current_metadata = None;
                self.publish_playback_if_needed();
                self.publish_metadata_if_needed();
            }
            _ => {}
        }
    }

    /// Starts the blocking manager loop.
    pub fn run(&mut self) {
        info!("MediaControlsManager: started");
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(message) => self.handle_message(message),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("MediaControlsManager: bus lagged by {} messages", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
