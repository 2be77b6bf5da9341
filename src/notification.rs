//! Summary notification derived from registry size and the active session.

use log::debug;
use tokio::sync::broadcast::Sender;

use crate::config::NotificationConfig;
use crate::protocol::{Message, NotificationMessage, SessionMessage};
use crate::session::projection::ExternalSession;
use crate::shortcut::ShortcutId;

/// Stable identity every summary is posted under.
pub const SUMMARY_NOTIFICATION_ID: u32 = 1;

/// The one notification shown while background pages run.
#[derive(Debug, Clone)]
pub struct SummaryNotification {
    pub id: u32,
    pub title: String,
    pub text: String,
    pub running_count: usize,
    /// Transport styling; present only while a media session is active.
    pub media_session: Option<ExternalSession>,
}

impl SummaryNotification {
    pub fn has_media_style(&self) -> bool {
        self.media_session.is_some()
    }
}

/// Builds summaries. Holds only texts, no state.
#[derive(Debug, Clone)]
pub struct NotificationPresenter {
    texts: NotificationConfig,
}

impl NotificationPresenter {
    pub fn new(texts: NotificationConfig) -> Self {
        Self { texts }
    }

    pub fn end_session_label(&self) -> &str {
        &self.texts.end_session_label
    }

    pub fn build(
        &self,
        running_count: usize,
        active_session: Option<ExternalSession>,
    ) -> SummaryNotification {
        let content = match running_count {
            1 => &self.texts.content_single,
            _ => &self.texts.content_multiple,
        };
        SummaryNotification {
            id: SUMMARY_NOTIFICATION_ID,
            title: self.texts.title.clone(),
            text: format!("{running_count} {content}"),
            running_count,
            media_session: active_session,
        }
    }
}

/// Platform surface for the summary notification and the external media session.
///
/// Calls arrive while the coordinator's state lock is held, so implementations must not
/// block or call back into the coordinator.
pub trait PresentationHost: Send {
    fn start_foreground(&mut self, notification: &SummaryNotification);
    /// Replaces the notification posted under `notification.id`.
    fn post_notification(&mut self, notification: &SummaryNotification);
    fn stop_foreground(&mut self);
    fn publish_session(&mut self, session: &ExternalSession);
    fn release_session(&mut self, owner_id: &ShortcutId);
}

/// Presentation host that mirrors everything onto the event bus.
pub struct BusPresentationHost {
    bus_producer: Sender<Message>,
}

impl BusPresentationHost {
    pub fn new(bus_producer: Sender<Message>) -> Self {
        Self { bus_producer }
    }

    fn send(&self, message: Message) {
        if self.bus_producer.send(message).is_err() {
            debug!("BusPresentationHost: no bus subscribers");
        }
    }
}

impl PresentationHost for BusPresentationHost {
    fn start_foreground(&mut self, notification: &SummaryNotification) {
        self.send(Message::Notification(
            NotificationMessage::ForegroundStarted(notification.clone()),
        ));
    }

    fn post_notification(&mut self, notification: &SummaryNotification) {
        self.send(Message::Notification(NotificationMessage::Posted(
            notification.clone(),
        )));
    }

    fn stop_foreground(&mut self) {
        self.send(Message::Notification(NotificationMessage::ForegroundStopped));
    }

    fn publish_session(&mut self, session: &ExternalSession) {
        self.send(Message::Session(SessionMessage::Updated(session.clone())));
    }

    fn release_session(&mut self, owner_id: &ShortcutId) {
        self.send(Message::Session(SessionMessage::Released {
            owner_id: owner_id.clone(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::{
        BusPresentationHost, NotificationPresenter, PresentationHost, SUMMARY_NOTIFICATION_ID,
    };
    use crate::config::NotificationConfig;
    use crate::protocol::{Message, NotificationMessage};
    use crate::session::metadata::{ActionCapabilities, PlaybackMetadata, TrackInfo};
    use crate::session::projection::ExternalSession;
    use tokio::sync::broadcast;

    fn presenter() -> NotificationPresenter {
        NotificationPresenter::new(NotificationConfig::default())
    }

    fn session() -> ExternalSession {
        let metadata = PlaybackMetadata::created(
            "radio",
            &TrackInfo {
                title: "Morning".to_string(),
                artist: "radio.example.com".to_string(),
                album: None,
                artwork_url: None,
            },
            ActionCapabilities::default(),
        );
        ExternalSession::build(&metadata, "Close")
    }

    #[test]
    fn test_single_running_page_uses_singular_text() {
        let notification = presenter().build(1, None);
        assert_eq!(notification.id, SUMMARY_NOTIFICATION_ID);
        assert_eq!(notification.title, "Background shortcuts");
        assert_eq!(notification.text, "1 shortcut running in background");
        assert!(!notification.has_media_style());
    }

    #[test]
    fn test_multiple_running_pages_use_plural_text() {
        let notification = presenter().build(3, Some(session()));
        assert_eq!(notification.text, "3 shortcuts running in background");
        assert!(notification.has_media_style());
        assert_eq!(
            notification
                .media_session
                .as_ref()
                .map(|session| session.owner_id.as_str()),
            Some("radio")
        );
    }

    #[test]
    fn test_bus_host_posts_under_stable_identity() {
        let (bus_sender, _) = broadcast::channel(16);
        let mut observer = bus_sender.subscribe();
        let mut host = BusPresentationHost::new(bus_sender.clone());

        host.post_notification(&presenter().build(2, None));
        host.stop_foreground();

        let Message::Notification(NotificationMessage::Posted(posted)) =
            observer.try_recv().expect("posted notification")
        else {
            panic!("unexpected message emitted by presentation host");
        };
        assert_eq!(posted.id, SUMMARY_NOTIFICATION_ID);
        assert!(matches!(
            observer.try_recv(),
            Ok(Message::Notification(NotificationMessage::ForegroundStopped))
        ));
    }
}
