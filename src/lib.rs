//! Background content coordinator: keeps several web pages running in the background and
//! exposes one OS-visible media session for whichever page currently owns playback.

pub mod artwork;
pub mod bridge;
pub mod config;
pub mod console;
pub mod coordinator;
pub mod error;
pub mod image_pipeline;
pub mod instrumentation;
pub mod media_controls_manager;
pub mod notification;
pub mod page;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod shortcut;

pub use coordinator::Coordinator;
pub use error::CoordinatorError;
