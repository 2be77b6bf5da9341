//! Native implementation of the page-side contract for hosts that drive their own players.
//!
//! `HeadlessMediaPage` tracks media elements and the page's media-session state the same
//! way the injected script does, and reports through the same bridge. Bridge calls and
//! page action handlers always run after the page lock is released.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use log::{debug, info};

use super::{select_artwork, should_rewind_on_previous, PageArtwork, ReverseEntry};
use crate::bridge::MediaSessionBridge;
use crate::page::{PageContext, PageEngineFactory, PageSetup};
use crate::session::metadata::MediaAction;
use crate::shortcut::ShortcutId;

pub type ElementId = u64;
/// Callback registered through `setActionHandler`.
pub type ActionHandler = Arc<dyn Fn() + Send + Sync>;

/// `navigator.mediaSession.metadata` as set by the page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMediaMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub artwork: Vec<PageArtwork>,
}

/// Native media element events.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NativeMediaEvent {
    Play,
    VolumeChange { muted: bool },
    Waiting,
    Playing,
    RateChange { rate: f64 },
    Seeked { time_secs: f64 },
    TimeUpdate { time_secs: f64 },
    DurationChange { duration_secs: f64 },
    Pause,
    Ended,
    Emptied,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaElementState {
    pub muted: bool,
    pub paused: bool,
    pub current_time_secs: f64,
    /// NaN until known; infinite for live streams.
    pub duration_secs: f64,
    pub playback_rate: f64,
}

impl MediaElementState {
    fn new(muted: bool) -> Self {
        Self {
            muted,
            paused: true,
            current_time_secs: 0.0,
            duration_secs: f64::NAN,
            playback_rate: 1.0,
        }
    }

    fn reported_duration(&self) -> f64 {
        if self.duration_secs.is_finite() {
            self.duration_secs
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Description {
    title: String,
    artist: String,
    album: Option<String>,
    artwork_url: Option<String>,
}

enum BridgeCall {
    Create(Description),
    Destroy,
    Play,
    Buffering,
    Playing { current_secs: f64, duration_secs: f64 },
    RateChange { current_secs: f64, rate: f64 },
    SeekTo { current_secs: f64 },
    Pause { current_secs: f64 },
    ActionHandler { action: String, enabled: bool },
    MetadataUpdate(Description),
    RunHandler(ActionHandler),
}

#[derive(Default)]
struct PageState {
    installed: bool,
    destroyed: bool,
    url: Option<String>,
    document_title: String,
    elements: BTreeMap<ElementId, MediaElementState>,
    next_element_id: ElementId,
    tracked: Option<ElementId>,
    suppress_pause: bool,
    metadata: Option<PageMediaMetadata>,
    handlers: HashMap<String, ActionHandler>,
}

impl PageState {
    fn reset_document(&mut self, url: &str, instrumented: bool) {
        *self = Self {
            installed: instrumented,
            url: Some(url.to_string()),
            next_element_id: self.next_element_id,
            ..Self::default()
        };
    }

    fn reporting(&self) -> bool {
        self.installed && !self.destroyed
    }

    fn describe(&self) -> Description {
        let metadata = self.metadata.as_ref();
        Description {
            title: metadata
                .and_then(|metadata| metadata.title.clone())
                .unwrap_or_else(|| self.document_title.clone()),
            artist: metadata
                .and_then(|metadata| metadata.artist.clone())
                .unwrap_or_else(|| host_of(self.url.as_deref().unwrap_or_default()).to_string()),
            album: metadata.and_then(|metadata| metadata.album.clone()),
            artwork_url: metadata
                .and_then(|metadata| select_artwork(&metadata.artwork))
                .map(ToString::to_string),
        }
    }

    fn apply_native(&mut self, id: ElementId, event: NativeMediaEvent) -> Vec<BridgeCall> {
        let Some(element) = self.elements.get_mut(&id) else {
            return Vec::new();
        };
        match event {
            NativeMediaEvent::Play => element.paused = false,
            NativeMediaEvent::VolumeChange { muted } => element.muted = muted,
            NativeMediaEvent::Pause | NativeMediaEvent::Ended => element.paused = true,
            NativeMediaEvent::Seeked { time_secs } | NativeMediaEvent::TimeUpdate { time_secs } => {
                element.current_time_secs = time_secs.max(0.0)
            }
            NativeMediaEvent::RateChange { rate } => element.playback_rate = rate,
            NativeMediaEvent::DurationChange { duration_secs } => {
                element.duration_secs = duration_secs
            }
            NativeMediaEvent::Waiting | NativeMediaEvent::Playing | NativeMediaEvent::Emptied => {}
        }
        let element = *element;

        if !self.reporting() {
            return Vec::new();
        }
        match event {
            NativeMediaEvent::Play => return self.claim(id, true),
            NativeMediaEvent::VolumeChange { .. } => return self.claim(id, false),
            _ => {}
        }
        if self.tracked != Some(id) {
            return Vec::new();
        }
        let current_secs = element.current_time_secs;
        match event {
            NativeMediaEvent::Waiting => vec![BridgeCall::Buffering],
            NativeMediaEvent::Playing => vec![BridgeCall::Playing {
                current_secs,
                duration_secs: element.reported_duration(),
            }],
            NativeMediaEvent::RateChange { rate } => {
                vec![BridgeCall::RateChange { current_secs, rate }]
            }
            NativeMediaEvent::Seeked { .. } => vec![BridgeCall::SeekTo { current_secs }],
            NativeMediaEvent::Pause => {
                if std::mem::take(&mut self.suppress_pause) {
                    Vec::new()
                } else {
                    vec![BridgeCall::Pause { current_secs }]
                }
            }
            NativeMediaEvent::Ended => vec![BridgeCall::Pause { current_secs }],
            NativeMediaEvent::Emptied if self.metadata.is_none() => self.end(),
            _ => Vec::new(),
        }
    }

    /// A `play`/`volumechange` on `id`. An untracked element is claimed only while it is
    /// playing and audible; the previously tracked one is paused without a report.
    fn claim(&mut self, id: ElementId, from_play: bool) -> Vec<BridgeCall> {
        if self.tracked == Some(id) {
            return if from_play {
                vec![BridgeCall::Play]
            } else {
                Vec::new()
            };
        }
        let audible = self
            .elements
            .get(&id)
            .is_some_and(|element| !element.muted && !element.paused);
        if !audible {
            return Vec::new();
        }
        if let Some(previous) = self.tracked.replace(id) {
            if let Some(element) = self.elements.get_mut(&previous) {
                element.paused = true;
            }
        }
        self.suppress_pause = false;
        vec![BridgeCall::Create(self.describe())]
    }

    fn end(&mut self) -> Vec<BridgeCall> {
        if let Some(id) = self.tracked.take() {
            if let Some(element) = self.elements.get_mut(&id) {
                element.paused = true;
            }
        }
        self.suppress_pause = false;
        vec![BridgeCall::Destroy]
    }

    fn reverse(&mut self, entry: ReverseEntry) -> Vec<BridgeCall> {
        let tracked = self
            .tracked
            .and_then(|id| self.elements.get(&id).map(|element| (id, *element)));
        match entry {
            ReverseEntry::Resume => match tracked {
                Some((id, element)) if element.paused => {
                    let mut calls = self.apply_native(id, NativeMediaEvent::Play);
                    calls.extend(self.apply_native(id, NativeMediaEvent::Playing));
                    calls
                }
                _ => Vec::new(),
            },
            ReverseEntry::Pause { emit_event } => match tracked {
                Some((id, element)) if !element.paused => {
                    if !emit_event {
                        self.suppress_pause = true;
                    }
                    self.apply_native(id, NativeMediaEvent::Pause)
                }
                _ => Vec::new(),
            },
            ReverseEntry::Seek { seconds } => match tracked {
                Some((id, _)) => self.apply_native(id, NativeMediaEvent::Seeked { time_secs: seconds }),
                None => Vec::new(),
            },
            ReverseEntry::SkipPrevious => {
                let handler = self
                    .handlers
                    .get(MediaAction::PreviousTrack.name())
                    .cloned();
                if let Some((id, element)) = tracked {
                    if should_rewind_on_previous(
                        element.current_time_secs,
                        element.reported_duration(),
                        handler.is_some(),
                    ) {
                        return self.apply_native(id, NativeMediaEvent::Seeked { time_secs: 0.0 });
                    }
                }
                handler.map(BridgeCall::RunHandler).into_iter().collect()
            }
            ReverseEntry::SkipNext => self
                .handlers
                .get(MediaAction::NextTrack.name())
                .cloned()
                .map(BridgeCall::RunHandler)
                .into_iter()
                .collect(),
            ReverseEntry::End => self.end(),
        }
    }
}

/// Host part of `url`, or the empty string.
fn host_of(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    if host_port.starts_with('[') {
        return host_port
            .split_once(']')
            .map_or(host_port, |(host, _)| &host[1..]);
    }
    host_port.split(':').next().unwrap_or_default()
}

pub struct HeadlessMediaPage {
    bridge: MediaSessionBridge,
    /// Held from computing a batch of bridge calls until it is delivered, so one page's
    /// reports reach the bridge in the order the page produced them. Taken before `state`.
    emission: Mutex<()>,
    state: Mutex<PageState>,
}

impl HeadlessMediaPage {
    pub fn new(bridge: MediaSessionBridge) -> Self {
        Self {
            bridge,
            emission: Mutex::new(()),
            state: Mutex::new(PageState::default()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, PageState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn with_state<F>(&self, apply: F)
    where
        F: FnOnce(&mut PageState) -> Vec<BridgeCall>,
    {
        let handlers = {
            let _emission = match self.emission.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let calls = {
                let mut state = self.lock_state();
                if state.destroyed {
                    return;
                }
                apply(&mut state)
            };
            self.emit(calls)
        };
        // Page handlers may call back into the page.
        for handler in handlers {
            handler();
        }
    }

    /// Delivers `calls` to the bridge and returns the page handlers they asked to run.
    fn emit(&self, calls: Vec<BridgeCall>) -> Vec<ActionHandler> {
        let mut handlers = Vec::new();
        for call in calls {
            match call {
                BridgeCall::Create(description) => self.bridge.on_create(
                    &description.title,
                    &description.artist,
                    description.album.as_deref(),
                    description.artwork_url.as_deref(),
                ),
                BridgeCall::Destroy => self.bridge.on_destroy(),
                BridgeCall::Play => self.bridge.on_play(),
                BridgeCall::Buffering => self.bridge.on_buffering(),
                BridgeCall::Playing {
                    current_secs,
                    duration_secs,
                } => self.bridge.on_playing(current_secs, duration_secs),
                BridgeCall::RateChange { current_secs, rate } => {
                    self.bridge.on_rate_change(current_secs, rate)
                }
                BridgeCall::SeekTo { current_secs } => self.bridge.on_seek_to(current_secs),
                BridgeCall::Pause { current_secs } => self.bridge.on_pause(current_secs),
                BridgeCall::ActionHandler { action, enabled } => {
                    self.bridge.on_set_action_handler(&action, enabled)
                }
                BridgeCall::MetadataUpdate(description) => self.bridge.on_metadata_update(
                    &description.title,
                    &description.artist,
                    description.album.as_deref(),
                    description.artwork_url.as_deref(),
                ),
                BridgeCall::RunHandler(handler) => handlers.push(handler),
            }
        }
        handlers
    }

    pub fn is_instrumented(&self) -> bool {
        let state = self.lock_state();
        state.installed && !state.destroyed
    }

    pub fn is_destroyed(&self) -> bool {
        self.lock_state().destroyed
    }

    pub fn set_document_title(&self, title: &str) {
        self.lock_state().document_title = title.to_string();
    }

    /// Adds a paused media element to the current document.
    pub fn add_element(&self, muted: bool) -> ElementId {
        let mut state = self.lock_state();
        state.next_element_id += 1;
        let id = state.next_element_id;
        state.elements.insert(id, MediaElementState::new(muted));
        id
    }

    pub fn element(&self, id: ElementId) -> Option<MediaElementState> {
        self.lock_state().elements.get(&id).copied()
    }

    pub fn tracked_element(&self) -> Option<ElementId> {
        self.lock_state().tracked
    }

    pub fn dispatch(&self, id: ElementId, event: NativeMediaEvent) {
        self.with_state(|state| state.apply_native(id, event));
    }

    /// Starts playback of `id` the way a page's `play()` does: `play`, then `playing`.
    pub fn play(&self, id: ElementId) {
        self.with_state(|state| {
            let mut calls = state.apply_native(id, NativeMediaEvent::Play);
            calls.extend(state.apply_native(id, NativeMediaEvent::Playing));
            calls
        });
    }

    /// Assigns `navigator.mediaSession.metadata`.
    pub fn set_metadata(&self, metadata: Option<PageMediaMetadata>) {
        self.with_state(|state| {
            if state.metadata == metadata {
                return Vec::new();
            }
            state.metadata = metadata;
            if state.metadata.is_none() || !state.reporting() {
                return Vec::new();
            }
            vec![BridgeCall::MetadataUpdate(state.describe())]
        });
    }

    /// `navigator.mediaSession.setActionHandler(action, handler)`.
    pub fn set_action_handler(&self, action: &str, handler: Option<ActionHandler>) {
        self.with_state(|state| {
            let enabled = handler.is_some();
            match handler {
                Some(handler) => {
                    state.handlers.insert(action.to_string(), handler);
                }
                None => {
                    state.handlers.remove(action);
                }
            }
            if !state.reporting() {
                return Vec::new();
            }
            vec![BridgeCall::ActionHandler {
                action: action.to_string(),
                enabled,
            }]
        });
    }
}

impl PageContext for HeadlessMediaPage {
    fn load_url(&self, url: &str) -> Result<(), String> {
        if self.is_destroyed() {
            return Err("page destroyed".to_string());
        }
        let instrumented = self.bridge.is_background_capable();
        self.lock_state().reset_document(url, instrumented);
        info!(
            "HeadlessMediaPage: '{}' loaded {} (instrumented={})",
            self.bridge.origin().shortcut_id,
            url,
            instrumented
        );
        Ok(())
    }

    fn post_script(&self, script: String) {
        debug!(
            "HeadlessMediaPage: '{}' has no script engine; dropped {} byte script",
            self.bridge.origin().shortcut_id,
            script.len()
        );
    }

    fn invoke_reverse_entry(&self, entry: ReverseEntry) {
        self.with_state(|state| {
            if !state.reporting() {
                return Vec::new();
            }
            state.reverse(entry)
        });
    }

    fn destroy(&self) -> Result<(), String> {
        let mut state = self.lock_state();
        if !state.destroyed {
            state.destroyed = true;
            state.tracked = None;
            state.elements.clear();
            state.handlers.clear();
        }
        Ok(())
    }
}

/// Page engine producing `HeadlessMediaPage`s. Keeps weak handles so callers can drive the
/// pages it created.
#[derive(Default)]
pub struct HeadlessPageFactory {
    pages: Mutex<HashMap<ShortcutId, Weak<HeadlessMediaPage>>>,
}

impl HeadlessPageFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live page for `shortcut_id`, if one exists.
    pub fn page(&self, shortcut_id: &str) -> Option<Arc<HeadlessMediaPage>> {
        let pages = match self.pages.lock() {
            Ok(pages) => pages,
            Err(poisoned) => poisoned.into_inner(),
        };
        pages
            .get(shortcut_id)
            .and_then(Weak::upgrade)
            .filter(|page| !page.is_destroyed())
    }
}

impl PageEngineFactory for HeadlessPageFactory {
    fn create_page(&self, setup: PageSetup) -> Result<Arc<dyn PageContext>, String> {
        debug!(
            "HeadlessPageFactory: '{}' uses native instrumentation ({} byte script unused)",
            setup.shortcut.id,
            setup.instrumentation_script.len()
        );
        let page = Arc::new(HeadlessMediaPage::new(setup.bridge));
        let mut pages = match self.pages.lock() {
            Ok(pages) => pages,
            Err(poisoned) => poisoned.into_inner(),
        };
        pages.retain(|_, page| page.strong_count() > 0);
        pages.insert(setup.shortcut.id, Arc::downgrade(&page));
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::{host_of, HeadlessMediaPage, NativeMediaEvent, PageMediaMetadata};
    use crate::bridge::{BridgeEvent, InstanceOrigin, MediaSessionBridge, SessionEventSink};
    use crate::instrumentation::{PageArtwork, ReverseEntry};
    use crate::page::PageContext;
    use crate::session::metadata::{MediaAction, TrackInfo};
    use crate::session::SessionEvent;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<BridgeEvent>>,
    }

    impl RecordingSink {
        fn take(&self) -> Vec<BridgeEvent> {
            std::mem::take(&mut *self.events.lock().expect("events lock"))
        }
    }

    impl SessionEventSink for RecordingSink {
        fn is_background_capable(&self, _origin: &InstanceOrigin) -> bool {
            true
        }

        fn submit(&self, _origin: &InstanceOrigin, event: BridgeEvent) {
            self.events.lock().expect("events lock").push(event);
        }
    }

    fn loaded_page() -> (Arc<RecordingSink>, HeadlessMediaPage) {
        let sink = Arc::new(RecordingSink::default());
        let dyn_sink: Arc<dyn SessionEventSink> = sink.clone();
        let bridge = MediaSessionBridge::new(InstanceOrigin::new("radio"), Arc::downgrade(&dyn_sink));
        let page = HeadlessMediaPage::new(bridge);
        page.load_url("https://radio.example.com:8443/live?x=1")
            .expect("load");
        page.set_document_title("Radio Live");
        (sink, page)
    }

    fn session(event: SessionEvent) -> BridgeEvent {
        BridgeEvent::Session(event)
    }

    /// Plays a 100 s element positioned at `position_secs` and clears recorded events.
    fn playing_element(
        sink: &RecordingSink,
        page: &HeadlessMediaPage,
        position_secs: f64,
    ) -> super::ElementId {
        let element = page.add_element(false);
        page.dispatch(
            element,
            NativeMediaEvent::DurationChange {
                duration_secs: 100.0,
            },
        );
        page.dispatch(
            element,
            NativeMediaEvent::TimeUpdate {
                time_secs: position_secs,
            },
        );
        page.play(element);
        sink.take();
        element
    }

    #[test]
    fn test_host_of_strips_scheme_port_and_path() {
        assert_eq!(host_of("https://radio.example.com:8443/live?x=1"), "radio.example.com");
        assert_eq!(host_of("http://user@[::1]:80/"), "::1");
        assert_eq!(host_of("radio.example.com/stream"), "radio.example.com");
    }

    #[test]
    fn test_playing_element_is_claimed_with_fallback_titles() {
        let (sink, page) = loaded_page();
        let element = page.add_element(false);
        page.play(element);

        assert_eq!(
            sink.take(),
            vec![
                session(SessionEvent::Create(TrackInfo {
                    title: "Radio Live".to_string(),
                    artist: "radio.example.com".to_string(),
                    album: None,
                    artwork_url: None,
                })),
                session(SessionEvent::Playing {
                    current_time_ms: 0,
                    duration_ms: 0,
                }),
            ]
        );
        assert_eq!(page.tracked_element(), Some(element));
    }

    #[test]
    fn test_muted_element_is_not_claimed_until_unmuted() {
        let (sink, page) = loaded_page();
        let element = page.add_element(true);
        page.play(element);
        assert!(sink.take().is_empty());

        page.dispatch(element, NativeMediaEvent::VolumeChange { muted: false });
        let events = sink.take();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            BridgeEvent::Session(SessionEvent::Create(_))
        ));
    }

    #[test]
    fn test_replaying_tracked_element_reports_play() {
        let (sink, page) = loaded_page();
        let element = playing_element(&sink, &page, 0.0);
        page.dispatch(element, NativeMediaEvent::Pause);
        page.dispatch(element, NativeMediaEvent::Play);

        assert_eq!(
            sink.take(),
            vec![
                session(SessionEvent::Pause { current_time_ms: 0 }),
                session(SessionEvent::Play),
            ]
        );
    }

    #[test]
    fn test_new_claim_silently_pauses_previous_element() {
        let (sink, page) = loaded_page();
        let first = playing_element(&sink, &page, 0.0);
        let second = page.add_element(false);
        page.play(second);

        assert!(page.element(first).expect("first").paused);
        let events = sink.take();
        assert!(events
            .iter()
            .all(|event| !matches!(event, BridgeEvent::Session(SessionEvent::Pause { .. }))));
        assert_eq!(page.tracked_element(), Some(second));

        page.dispatch(first, NativeMediaEvent::Seeked { time_secs: 3.0 });
        assert!(sink.take().is_empty());
    }

    #[test]
    fn test_metadata_supplies_titles_and_artwork() {
        let (sink, page) = loaded_page();
        page.set_metadata(Some(PageMediaMetadata {
            title: Some("Morning Show".to_string()),
            artist: Some("Radio".to_string()),
            album: Some("Live".to_string()),
            artwork: vec![
                PageArtwork::new("https://img/small.png", Some("64x64")),
                PageArtwork::new("https://img/large.png", Some("512x512")),
            ],
        }));

        assert_eq!(
            sink.take(),
            vec![session(SessionEvent::MetadataUpdate(TrackInfo {
                title: "Morning Show".to_string(),
                artist: "Radio".to_string(),
                album: Some("Live".to_string()),
                artwork_url: Some("https://img/large.png".to_string()),
            }))]
        );
    }

    #[test]
    fn test_pause_without_echo_suppresses_only_one_report() {
        let (sink, page) = loaded_page();
        let element = playing_element(&sink, &page, 7.0);

        page.invoke_reverse_entry(ReverseEntry::Pause { emit_event: false });
        assert!(sink.take().is_empty());
        assert!(page.element(element).expect("element").paused);

        page.play(element);
        page.dispatch(element, NativeMediaEvent::Pause);
        let events = sink.take();
        assert_eq!(
            events.last(),
            Some(&session(SessionEvent::Pause {
                current_time_ms: 7_000
            }))
        );
    }

    #[test]
    fn test_skip_previous_rewinds_without_handler() {
        let (sink, page) = loaded_page();
        playing_element(&sink, &page, 5.0);

        page.invoke_reverse_entry(ReverseEntry::SkipPrevious);

        assert_eq!(
            sink.take(),
            vec![session(SessionEvent::SeekTo { current_time_ms: 0 })]
        );
    }

    #[test]
    fn test_skip_previous_early_in_track_invokes_handler() {
        let (sink, page) = loaded_page();
        playing_element(&sink, &page, 2.0);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        page.set_action_handler(
            MediaAction::PreviousTrack.name(),
            Some(Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        );
        sink.take();

        page.invoke_reverse_entry(ReverseEntry::SkipPrevious);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sink.take().is_empty());
    }

    #[test]
    fn test_skip_previous_late_in_track_rewinds_despite_handler() {
        let (sink, page) = loaded_page();
        playing_element(&sink, &page, 30.0);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        page.set_action_handler(
            MediaAction::PreviousTrack.name(),
            Some(Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        );
        sink.take();

        page.invoke_reverse_entry(ReverseEntry::SkipPrevious);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            sink.take(),
            vec![session(SessionEvent::SeekTo { current_time_ms: 0 })]
        );
    }

    #[test]
    fn test_end_entry_stops_media_and_reports_destroy() {
        let (sink, page) = loaded_page();
        let element = playing_element(&sink, &page, 1.0);

        page.invoke_reverse_entry(ReverseEntry::End);

        assert_eq!(sink.take(), vec![session(SessionEvent::Destroy)]);
        assert!(page.element(element).expect("element").paused);
        assert_eq!(page.tracked_element(), None);
    }

    #[test]
    fn test_emptied_ends_session_only_without_page_metadata() {
        let (sink, page) = loaded_page();
        let element = playing_element(&sink, &page, 1.0);
        page.set_metadata(Some(PageMediaMetadata::default()));
        sink.take();

        page.dispatch(element, NativeMediaEvent::Emptied);
        assert!(sink.take().is_empty());

        page.set_metadata(None);
        page.dispatch(element, NativeMediaEvent::Emptied);
        assert_eq!(sink.take(), vec![session(SessionEvent::Destroy)]);
    }

    /// Records events; holds the first `Pause` at delivery until `release` is signalled.
    struct HoldingSink {
        events: Mutex<Vec<BridgeEvent>>,
        holding: AtomicBool,
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl SessionEventSink for HoldingSink {
        fn is_background_capable(&self, _origin: &InstanceOrigin) -> bool {
            true
        }

        fn submit(&self, _origin: &InstanceOrigin, event: BridgeEvent) {
            let is_pause = matches!(event, BridgeEvent::Session(SessionEvent::Pause { .. }));
            if is_pause && self.holding.swap(false, Ordering::SeqCst) {
                self.entered.lock().expect("entered").send(()).expect("test waiting");
                self.release
                    .lock()
                    .expect("release")
                    .recv_timeout(Duration::from_secs(5))
                    .expect("released");
            }
            self.events.lock().expect("events lock").push(event);
        }
    }

    #[test]
    fn test_reports_from_two_threads_keep_page_order() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let sink = Arc::new(HoldingSink {
            events: Mutex::new(Vec::new()),
            holding: AtomicBool::new(false),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        let dyn_sink: Arc<dyn SessionEventSink> = sink.clone();
        let bridge = MediaSessionBridge::new(InstanceOrigin::new("radio"), Arc::downgrade(&dyn_sink));
        let page = Arc::new(HeadlessMediaPage::new(bridge));
        page.load_url("https://radio.example.com/live").expect("load");
        let element = page.add_element(false);
        page.dispatch(
            element,
            NativeMediaEvent::DurationChange {
                duration_secs: 100.0,
            },
        );
        page.dispatch(element, NativeMediaEvent::TimeUpdate { time_secs: 2.0 });
        page.play(element);
        sink.events.lock().expect("events lock").clear();
        sink.holding.store(true, Ordering::SeqCst);

        let pausing_page = Arc::clone(&page);
        let pausing =
            thread::spawn(move || pausing_page.dispatch(element, NativeMediaEvent::Pause));
        entered_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("pause reached the bridge");

        let playing_page = Arc::clone(&page);
        let playing = thread::spawn(move || playing_page.play(element));
        thread::sleep(Duration::from_millis(50));
        release_tx.send(()).expect("sink waiting");
        pausing.join().expect("pausing thread");
        playing.join().expect("playing thread");

        assert!(!page.element(element).expect("element").paused);
        assert_eq!(
            *sink.events.lock().expect("events lock"),
            vec![
                session(SessionEvent::Pause {
                    current_time_ms: 2_000
                }),
                session(SessionEvent::Play),
                session(SessionEvent::Playing {
                    current_time_ms: 2_000,
                    duration_ms: 100_000,
                }),
            ]
        );
    }

    #[test]
    fn test_destroyed_page_is_silent() {
        let (sink, page) = loaded_page();
        let element = page.add_element(false);
        page.destroy().expect("destroy");
        page.destroy().expect("destroy is idempotent");

        page.play(element);
        page.invoke_reverse_entry(ReverseEntry::End);
        assert!(sink.take().is_empty());
        assert!(page.load_url("https://radio.example.com").is_err());
    }
}
