//! Seams to the page engine that hosts background content.

use std::sync::Arc;

use crate::bridge::MediaSessionBridge;
use crate::instrumentation::ReverseEntry;
use crate::shortcut::BackgroundShortcut;

/// One live page. Implementations are driven from arbitrary threads and must be thread-safe.
pub trait PageContext: Send + Sync {
    fn load_url(&self, url: &str) -> Result<(), String>;

    /// Queues `script` for evaluation in the page's main context without waiting for it.
    fn post_script(&self, script: String);

    /// Invokes one of the entry points the instrumentation script installed.
    fn invoke_reverse_entry(&self, entry: ReverseEntry) {
        self.post_script(entry.to_script());
    }

    /// Stops all page activity and releases the engine. Must be idempotent.
    fn destroy(&self) -> Result<(), String>;
}

/// Everything a new page needs before its first load.
#[derive(Clone)]
pub struct PageSetup {
    pub shortcut: BackgroundShortcut,
    /// Exposed to the page under `instrumentation::BRIDGE_INTERFACE`.
    pub bridge: MediaSessionBridge,
    /// Installed into every document the page loads.
    pub instrumentation_script: String,
}

/// Creates pages. Called while the coordinator's state lock is held, so implementations must
/// not call into the bridge they are handed.
pub trait PageEngineFactory: Send + Sync {
    fn create_page(&self, setup: PageSetup) -> Result<Arc<dyn PageContext>, String>;
}
