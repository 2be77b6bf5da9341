//! Event-bus protocol shared by the coordinator and its presenters.
//!
//! The coordinator publishes session and notification state; platform integrations publish
//! transport commands that the transport router feeds back into the coordinator.

use std::collections::BTreeSet;

use crate::notification::SummaryNotification;
use crate::session::projection::ExternalSession;
use crate::shortcut::ShortcutId;

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone)]
pub enum Message {
    Session(SessionMessage),
    Notification(NotificationMessage),
    Registry(RegistryMessage),
    Transport(TransportCommand),
}

/// External media session lifecycle.
#[derive(Debug, Clone)]
pub enum SessionMessage {
    /// Full rebuilt session; replaces whatever was published before.
    Updated(ExternalSession),
    Released { owner_id: ShortcutId },
}

/// Summary notification lifecycle.
#[derive(Debug, Clone)]
pub enum NotificationMessage {
    ForegroundStarted(SummaryNotification),
    Posted(SummaryNotification),
    /// Foreground indication ended and the notification was removed.
    ForegroundStopped,
}

#[derive(Debug, Clone)]
pub enum RegistryMessage {
    RunningChanged(BTreeSet<ShortcutId>),
    /// Every instance was destroyed and the coordinator accepts no further work.
    ShutDown,
}

/// Transport input from lock screen, notification buttons, or media keys.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportCommand {
    Play,
    Pause,
    /// Resolved to `Play` or `Pause` from the owner's playing state.
    PlayPause,
    SeekTo { position_ms: u64 },
    SkipPrevious,
    SkipNext,
    EndSession,
}
