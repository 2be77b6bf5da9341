use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread;

use log::{info, warn};
use tokio::sync::broadcast;

use tabwarden::config::{self, Config};
use tabwarden::console::{self, ConsoleCommand, PageAction};
use tabwarden::instrumentation::headless::{
    HeadlessPageFactory, NativeMediaEvent, PageMediaMetadata,
};
use tabwarden::media_controls_manager::MediaControlsManager;
use tabwarden::notification::BusPresentationHost;
use tabwarden::protocol::Message;
use tabwarden::shortcut::BackgroundShortcut;
use tabwarden::Coordinator;

fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "non-string panic payload".to_string()
}

fn spawn_media_controls(
    config: &Config,
    bus_sender: &broadcast::Sender<Message>,
) -> io::Result<()> {
    let media_controls_config = config.media_controls.clone();
    let bus_receiver = bus_sender.subscribe();
    let bus_producer = bus_sender.clone();
    thread::Builder::new()
        .name("media-controls".to_string())
        .spawn(move || {
            let run_result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let mut media_controls_manager =
                    MediaControlsManager::new(&media_controls_config, bus_receiver, bus_producer);
                media_controls_manager.run();
            }));
            if let Err(payload) = run_result {
                log::error!(
                    "MediaControlsManager thread terminated due to panic: {}",
                    panic_payload_to_string(payload.as_ref())
                );
            }
        })?;
    Ok(())
}

fn find_shortcut<'a>(shortcuts: &'a [BackgroundShortcut], id: &str) -> Option<&'a BackgroundShortcut> {
    shortcuts.iter().find(|shortcut| shortcut.id == id)
}

fn drive_page(factory: &HeadlessPageFactory, id: &str, action: PageAction) {
    let Some(page) = factory.page(id) else {
        warn!("'{}' is not running", id);
        return;
    };
    match action {
        PageAction::Play => {
            let element = page
                .tracked_element()
                .unwrap_or_else(|| page.add_element(false));
            page.play(element);
        }
        PageAction::Pause => match page.tracked_element() {
            Some(element) => page.dispatch(element, NativeMediaEvent::Pause),
            None => warn!("'{}' has no playing media", id),
        },
        PageAction::Title(title) => page.set_metadata(Some(PageMediaMetadata {
            title: Some(title),
            ..PageMediaMetadata::default()
        })),
    }
}

/// Returns false when the console should stop.
fn execute(
    command: ConsoleCommand,
    coordinator: &Coordinator,
    factory: &HeadlessPageFactory,
    shortcuts: &[BackgroundShortcut],
    bus_sender: &broadcast::Sender<Message>,
) -> bool {
    match command {
        ConsoleCommand::List => {
            for listing in coordinator.listings(shortcuts) {
                let marker = if listing.is_running { "*" } else { " " };
                println!("{} {:<16} {}", marker, listing.id, listing.name);
            }
            match coordinator.session_snapshot() {
                Some(session) => println!(
                    "session: {} - {} ({:?} at {} ms)",
                    session.metadata.title,
                    session.metadata.artist,
                    session.playback.state,
                    session.playback.position_ms
                ),
                None => println!("session: none"),
            }
        }
        ConsoleCommand::Open(id) => match find_shortcut(shortcuts, &id) {
            Some(shortcut) => {
                if let Err(err) = coordinator.get_or_create(shortcut) {
                    warn!("Failed to open '{}': {}", id, err);
                }
            }
            None => warn!("No configured shortcut '{}'", id),
        },
        ConsoleCommand::Close(id) => coordinator.destroy(&id),
        ConsoleCommand::Transport(command) => {
            if bus_sender.send(Message::Transport(command)).is_err() {
                warn!("No transport router listening");
            }
        }
        ConsoleCommand::Page { id, action } => drive_page(factory, &id, action),
        ConsoleCommand::Quit => return false,
    }
    true
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config::default_config_path().ok_or("no user config directory")?;
    let config = config::load_or_create_config(&config_path);

    let mut clog = colog::default_builder();
    clog.filter(None, config.logging.level_filter());
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    info!("Using config {}", config_path.display());

    // Bus for communication between components
    let (bus_sender, _) = broadcast::channel(1024);

    if config.media_controls.enabled {
        spawn_media_controls(&config, &bus_sender)?;
    }

    let factory = Arc::new(HeadlessPageFactory::new());
    let coordinator = Coordinator::new(
        &config,
        factory.clone(),
        Box::new(BusPresentationHost::new(bus_sender.clone())),
        bus_sender.clone(),
    );
    coordinator.spawn_transport_router()?;
    coordinator.start_foreground();

    let shortcuts = config.background_shortcuts();
    for shortcut in &shortcuts {
        if let Err(err) = coordinator.get_or_create(shortcut) {
            warn!("Failed to start '{}': {}", shortcut.id, err);
        }
    }

    println!("{}", console::HELP);
    for line in io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match console::parse_command(&line) {
            Ok(command) => {
                if !execute(command, &coordinator, &factory, &shortcuts, &bus_sender) {
                    break;
                }
            }
            Err(err) => println!("{err}\n{}", console::HELP),
        }
    }

    coordinator.shutdown_all();
    Ok(())
}
