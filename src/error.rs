use thiserror::Error;

/// Failures surfaced by the coordinator facade.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("shortcut id must not be empty")]
    EmptyShortcutId,
    #[error("page engine unavailable for shortcut '{id}': {reason}")]
    EngineUnavailable { id: String, reason: String },
    #[error("coordinator has been shut down")]
    ShutDown,
}
