//! Background content coordinator.
//!
//! Owns the instance registry and the single media session slot behind one state lock.
//! Registry mutations, bridge events, artwork completions and transport commands all go
//! through that lock, so presentation always reflects one consistent state. Page calls
//! (load, reverse entries, destroy) are made after the lock is released.

use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};
use tokio::sync::broadcast::{error::RecvError, Sender};

use crate::artwork::{ArtworkFetcher, ArtworkResolver, Cover, HttpArtworkFetcher};
use crate::bridge::{BridgeEvent, InstanceOrigin, MediaSessionBridge, SessionEventSink};
use crate::config::Config;
use crate::error::CoordinatorError;
use crate::instrumentation::{self, ReverseEntry};
use crate::notification::{NotificationPresenter, PresentationHost};
use crate::page::{PageContext, PageEngineFactory, PageSetup};
use crate::protocol::{Message, RegistryMessage, TransportCommand};
use crate::registry::{ContentRegistry, InstanceHandle};
use crate::session::metadata::ms_to_page_seconds;
use crate::session::projection::ExternalSession;
use crate::session::{ArtworkChange, SessionArbiter, SessionEvent, Transition};
use crate::shortcut::{shortcut_listings, BackgroundShortcut, ShortcutId, ShortcutListing};

struct CoordinatorState {
    registry: ContentRegistry,
    session: SessionArbiter,
    artwork: ArtworkResolver,
    presenter: NotificationPresenter,
    host: Box<dyn PresentationHost>,
    bus_producer: Sender<Message>,
    foreground: bool,
    shut_down: bool,
}

impl CoordinatorState {
    fn active_session(&self) -> Option<ExternalSession> {
        self.session.project(self.presenter.end_session_label())
    }

    fn refresh_notification(&mut self) {
        let notification = self
            .presenter
            .build(self.registry.len(), self.active_session());
        self.host.post_notification(&notification);
    }

    fn publish_session(&mut self) {
        if let Some(session) = self.active_session() {
            self.host.publish_session(&session);
        }
    }

    fn publish_running(&self) {
        let message = Message::Registry(RegistryMessage::RunningChanged(
            self.registry.running_ids(),
        ));
        if self.bus_producer.send(message).is_err() {
            debug!("Coordinator: no bus subscribers for registry update");
        }
    }

    fn release_session(&mut self, owner_id: &ShortcutId) {
        info!("Coordinator: media session of '{}' released", owner_id);
        self.host.release_session(owner_id);
    }
}

struct CoordinatorCore {
    state: Mutex<CoordinatorState>,
    factory: Arc<dyn PageEngineFactory>,
    self_ref: Weak<CoordinatorCore>,
}

impl CoordinatorCore {
    fn lock_state(&self) -> MutexGuard<'_, CoordinatorState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn sink(&self) -> Weak<dyn SessionEventSink> {
        self.self_ref.clone()
    }

    fn start_artwork(&self, state: &mut CoordinatorState, owner_id: &str, url: Option<String>) {
        let core = self.self_ref.clone();
        let owner = owner_id.to_string();
        let request = state
            .artwork
            .resolve(url.as_deref(), move |generation, cover| {
                if let Some(core) = core.upgrade() {
                    core.apply_artwork(&owner, generation, cover);
                }
            });
        match request {
            Some(request) => state.session.track_artwork_request(request),
            None => state.session.clear_cover(),
        }
    }

    fn apply_artwork(&self, owner_id: &str, generation: u64, cover: Option<Cover>) {
        let mut state = self.lock_state();
        if !state.session.apply_cover(owner_id, generation, cover) {
            debug!(
                "Coordinator: dropped stale artwork generation {} for '{}'",
                generation, owner_id
            );
            return;
        }
        state.publish_session();
        state.refresh_notification();
    }

    fn route_transport(&self, command: TransportCommand) {
        let (page, entry) = {
            let mut state = self.lock_state();
            let Some(owner_id) = state.session.owner_id().map(ToString::to_string) else {
                debug!("Coordinator: {:?} ignored; no media session", command);
                return;
            };
            let Some(page) = state
                .registry
                .get(&owner_id)
                .map(|instance| Arc::clone(&instance.page))
            else {
                return;
            };
            let is_playing = state
                .session
                .metadata()
                .is_some_and(|metadata| metadata.is_playing);
            let entry = match command {
                TransportCommand::Play => ReverseEntry::Resume,
                TransportCommand::Pause => ReverseEntry::Pause { emit_event: false },
                TransportCommand::PlayPause if is_playing => ReverseEntry::Pause { emit_event: false },
                TransportCommand::PlayPause => ReverseEntry::Resume,
                TransportCommand::SeekTo { position_ms } => ReverseEntry::Seek {
                    seconds: ms_to_page_seconds(position_ms),
                },
                TransportCommand::SkipPrevious => ReverseEntry::SkipPrevious,
                TransportCommand::SkipNext => ReverseEntry::SkipNext,
                TransportCommand::EndSession => ReverseEntry::End,
            };
            if matches!(entry, ReverseEntry::Pause { .. }) {
                // The page will not echo this pause.
                let current_time_ms = state
                    .session
                    .metadata()
                    .map_or(0, |metadata| metadata.current_time_ms);
                let capabilities = state
                    .registry
                    .get(&owner_id)
                    .map(|instance| instance.capabilities)
                    .unwrap_or_default();
                if let Transition::Updated { .. } = state.session.apply(
                    &owner_id,
                    capabilities,
                    SessionEvent::Pause { current_time_ms },
                ) {
                    state.publish_session();
                    state.refresh_notification();
                }
            }
            (page, entry)
        };
        debug!("Coordinator: routing {:?} as {:?}", command, entry);
        page.invoke_reverse_entry(entry);
    }
}

impl SessionEventSink for CoordinatorCore {
    fn is_background_capable(&self, origin: &InstanceOrigin) -> bool {
        let state = self.lock_state();
        !state.shut_down && state.registry.is_live(origin)
    }

    fn submit(&self, origin: &InstanceOrigin, event: BridgeEvent) {
        let mut state = self.lock_state();
        if !state.registry.is_live(origin) {
            debug!(
                "Coordinator: dropped event from retired instance '{}'",
                origin.shortcut_id
            );
            return;
        }

        let (capabilities, event) = match event {
            BridgeEvent::ActionHandler { action, enabled } => (
                state.registry.set_capability(origin, action, enabled),
                SessionEvent::CapabilitiesChanged,
            ),
            BridgeEvent::Session(event) => (state.registry.capabilities(origin), event),
        };

        match state
            .session
            .apply(&origin.shortcut_id, capabilities, event)
        {
            Transition::Ignored => {}
            Transition::Updated { artwork } => {
                if let ArtworkChange::Resolve(url) = artwork {
                    self.start_artwork(&mut state, &origin.shortcut_id, url);
                }
                state.publish_session();
                state.refresh_notification();
            }
            Transition::Released { owner_id } => {
                state.release_session(&owner_id);
                state.refresh_notification();
            }
        }
    }
}

/// Facade over the registry, the session arbiter and presentation.
///
/// Cheap to clone; all clones share one state.
#[derive(Clone)]
pub struct Coordinator {
    core: Arc<CoordinatorCore>,
}

impl Coordinator {
    /// Coordinator downloading artwork over HTTP with the configured limits.
    pub fn new(
        config: &Config,
        factory: Arc<dyn PageEngineFactory>,
        host: Box<dyn PresentationHost>,
        bus_producer: Sender<Message>,
    ) -> Self {
        let fetcher = Arc::new(HttpArtworkFetcher::new(&config.artwork));
        Self::with_artwork_fetcher(config, factory, host, bus_producer, fetcher)
    }

    pub fn with_artwork_fetcher(
        config: &Config,
        factory: Arc<dyn PageEngineFactory>,
        host: Box<dyn PresentationHost>,
        bus_producer: Sender<Message>,
        fetcher: Arc<dyn ArtworkFetcher>,
    ) -> Self {
        let state = CoordinatorState {
            registry: ContentRegistry::new(),
            session: SessionArbiter::new(),
            artwork: ArtworkResolver::new(fetcher, config.artwork.max_edge_px),
            presenter: NotificationPresenter::new(config.notification.clone()),
            host,
            bus_producer,
            foreground: false,
            shut_down: false,
        };
        let core = Arc::new_cyclic(|self_ref| CoordinatorCore {
            state: Mutex::new(state),
            factory,
            self_ref: self_ref.clone(),
        });
        Self { core }
    }

    /// Enters the foreground-service state with an initial summary notification.
    pub fn start_foreground(&self) {
        let mut state = self.core.lock_state();
        if state.shut_down {
            return;
        }
        let notification = state
            .presenter
            .build(state.registry.len(), state.active_session());
        state.host.start_foreground(&notification);
        state.foreground = true;
        info!("Coordinator: foreground started");
    }

    pub fn is_foreground(&self) -> bool {
        self.core.lock_state().foreground
    }

    /// Returns the running instance for `shortcut.id`, creating and loading a page when none
    /// exists.
    pub fn get_or_create(
        &self,
        shortcut: &BackgroundShortcut,
    ) -> Result<InstanceHandle, CoordinatorError> {
        if shortcut.id.trim().is_empty() {
            return Err(CoordinatorError::EmptyShortcutId);
        }

        let (handle, created_page) = {
            let mut state = self.core.lock_state();
            if state.shut_down {
                return Err(CoordinatorError::ShutDown);
            }
            let sink = self.core.sink();
            let factory = Arc::clone(&self.core.factory);
            let registration = state
                .registry
                .get_or_create(shortcut, |origin| {
                    factory.create_page(PageSetup {
                        shortcut: shortcut.clone(),
                        bridge: MediaSessionBridge::new(origin.clone(), sink),
                        instrumentation_script: instrumentation::media_session_script(),
                    })
                })
                .map_err(|reason| {
                    warn!(
                        "Coordinator: failed to create page for '{}': {}",
                        shortcut.id, reason
                    );
                    CoordinatorError::EngineUnavailable {
                        id: shortcut.id.clone(),
                        reason,
                    }
                })?;
            if registration.created_page.is_some() {
                info!(
                    "Coordinator: started '{}' ({} running)",
                    shortcut.id,
                    state.registry.len()
                );
                state.publish_running();
            }
            state.refresh_notification();
            (registration.handle, registration.created_page)
        };

        if let Some(page) = created_page {
            if let Err(err) = page.load_url(&shortcut.url) {
                warn!(
                    "Coordinator: '{}' failed to load {}: {}",
                    shortcut.id, shortcut.url, err
                );
            }
        }
        Ok(handle)
    }

    /// Tears down the instance for `id`. Unknown ids are ignored.
    pub fn destroy(&self, id: &str) {
        let page = {
            let mut state = self.core.lock_state();
            let Some(instance) = state.registry.remove(id) else {
                debug!("Coordinator: destroy of unknown '{}' ignored", id);
                return;
            };
            if state.session.teardown_if_owner(id) {
                state.release_session(&instance.origin.shortcut_id);
            }
            if state.registry.is_empty() {
                state.host.stop_foreground();
                state.foreground = false;
                info!("Coordinator: last instance closed; foreground stopped");
            } else {
                state.refresh_notification();
            }
            state.publish_running();
            instance.page
        };

        destroy_page(id, page.as_ref());
    }

    pub fn running_ids(&self) -> BTreeSet<ShortcutId> {
        self.core.lock_state().registry.running_ids()
    }

    pub fn listings(&self, shortcuts: &[BackgroundShortcut]) -> Vec<ShortcutListing> {
        shortcut_listings(shortcuts, &self.running_ids())
    }

    pub fn owner_id(&self) -> Option<ShortcutId> {
        self.core
            .lock_state()
            .session
            .owner_id()
            .map(ToString::to_string)
    }

    /// The session as currently published, if any.
    pub fn session_snapshot(&self) -> Option<ExternalSession> {
        self.core.lock_state().active_session()
    }

    /// Routes a transport command to the page owning the session. No-op without an owner.
    pub fn route_transport(&self, command: TransportCommand) {
        self.core.route_transport(command);
    }

    /// Destroys every instance and releases all presentation. Failures of one page do not
    /// stop the others from being released. Later calls are no-ops.
    pub fn shutdown_all(&self) {
        let instances = {
            let mut state = self.core.lock_state();
            if state.shut_down {
                return;
            }
            state.shut_down = true;
            if let Some(owner_id) = state.session.teardown() {
                state.release_session(&owner_id);
            }
            let instances = state.registry.drain();
            state.host.stop_foreground();
            state.foreground = false;
            state.publish_running();
            if state
                .bus_producer
                .send(Message::Registry(RegistryMessage::ShutDown))
                .is_err()
            {
                debug!("Coordinator: no bus subscribers for shutdown");
            }
            instances
        };

        info!("Coordinator: shutting down {} instance(s)", instances.len());
        for instance in instances {
            destroy_page(&instance.origin.shortcut_id, instance.page.as_ref());
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.core.lock_state().shut_down
    }

    /// Spawns the thread feeding `Message::Transport` commands from the bus into
    /// `route_transport`. It exits on the shutdown announcement, on the first message after
    /// the coordinator is dropped, or when the bus closes.
    pub fn spawn_transport_router(&self) -> std::io::Result<JoinHandle<()>> {
        let core = Arc::downgrade(&self.core);
        let (mut bus_consumer, shut_down) = {
            let state = self.core.lock_state();
            (state.bus_producer.subscribe(), state.shut_down)
        };
        thread::Builder::new()
            .name("transport-router".to_string())
            .spawn(move || {
                if shut_down {
                    return;
                }
                loop {
                    let message = match bus_consumer.blocking_recv() {
                        Ok(message) => message,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(
                                "Coordinator: transport router lagged; skipped {} message(s)",
                                skipped
                            );
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };
                    let Some(core) = core.upgrade() else {
                        break;
                    };
                    if core.lock_state().shut_down {
                        break;
                    }
                    if let Message::Transport(command) = message {
                        core.route_transport(command);
                    }
                }
            })
    }
}

fn destroy_page(id: &str, page: &dyn PageContext) {
    match panic::catch_unwind(AssertUnwindSafe(|| page.destroy())) {
        Ok(Ok(())) => debug!("Coordinator: destroyed page '{}'", id),
        Ok(Err(err)) => warn!("Coordinator: failed to destroy page '{}': {}", id, err),
        Err(_) => error!("Coordinator: page '{}' panicked while being destroyed", id),
    }
}
