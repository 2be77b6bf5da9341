//! Page-side media instrumentation.
//!
//! The injected script detects media activity inside a page and reports it through the
//! bridge interface; it also installs the reverse entry points the coordinator invokes.
//! `headless` implements the same contract natively.

pub mod headless;

use serde_json::{Number, Value};

/// Global name the page engine exposes the bridge under.
pub const BRIDGE_INTERFACE: &str = "TabwardenMediaSession";
/// Window property marking an installed script. Bump the suffix when the script changes.
pub const INSTALL_GUARD_KEY: &str = "__tabwardenMediaSessionV1";
/// Past this position, "previous" rewinds to the start instead of changing track.
pub const RESTART_THRESHOLD_SECS: f64 = 4.0;
pub const MIN_ARTWORK_WIDTH: u32 = 99;
pub const MAX_ARTWORK_WIDTH: u32 = 999;

const POLYFILL_SOURCE: &str = include_str!("../../assets/media_session_polyfill.js");
const BRIDGE_TEMPLATE: &str = include_str!("../../assets/media_session_bridge.js");

/// Entry points installed into the page and invoked for routed transport commands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReverseEntry {
    Resume,
    /// `emit_event == false` suppresses the page's next pause report.
    Pause { emit_event: bool },
    Seek { seconds: f64 },
    SkipPrevious,
    SkipNext,
    /// Stops the tracked media and reports `onDestroy`.
    End,
}

impl ReverseEntry {
    pub fn entry_name(&self) -> &'static str {
        match self {
            Self::Resume => "__tabwardenResume",
            Self::Pause { .. } => "__tabwardenPause",
            Self::Seek { .. } => "__tabwardenSeek",
            Self::SkipPrevious => "__tabwardenSkipPrevious",
            Self::SkipNext => "__tabwardenSkipNext",
            Self::End => "__tabwardenEnd",
        }
    }

    /// Script invoking this entry. Does nothing in pages without the instrumentation.
    pub fn to_script(&self) -> String {
        let argument = match self {
            Self::Pause { emit_event } => emit_event.to_string(),
            Self::Seek { seconds } => js_number(*seconds),
            _ => String::new(),
        };
        format!(
            "(function(){{var entry=window[{}];if(typeof entry==='function')entry({});}})();",
            js_string(self.entry_name()),
            argument
        )
    }
}

fn js_string(value: &str) -> String {
    Value::from(value).to_string()
}

fn js_number(value: f64) -> String {
    Number::from_f64(value.max(0.0))
        .map(|number| number.to_string())
        .unwrap_or_else(|| "0".to_string())
}

/// Full script injected into every page document: the media-session polyfill followed by
/// the guarded instrumentation.
pub fn media_session_script() -> String {
    let instrumentation = [
        ("__GUARD_KEY__", js_string(INSTALL_GUARD_KEY)),
        ("__BRIDGE_INTERFACE__", js_string(BRIDGE_INTERFACE)),
        ("__RESTART_THRESHOLD_SECS__", js_number(RESTART_THRESHOLD_SECS)),
        ("__MIN_ARTWORK_WIDTH__", MIN_ARTWORK_WIDTH.to_string()),
        ("__MAX_ARTWORK_WIDTH__", MAX_ARTWORK_WIDTH.to_string()),
        ("__PREVIOUS_TRACK__", js_string("previoustrack")),
        ("__NEXT_TRACK__", js_string("nexttrack")),
        (
            "__ENTRY_RESUME__",
            js_string(ReverseEntry::Resume.entry_name()),
        ),
        (
            "__ENTRY_PAUSE__",
            js_string(ReverseEntry::Pause { emit_event: true }.entry_name()),
        ),
        (
            "__ENTRY_SEEK__",
            js_string(ReverseEntry::Seek { seconds: 0.0 }.entry_name()),
        ),
        (
            "__ENTRY_SKIP_PREVIOUS__",
            js_string(ReverseEntry::SkipPrevious.entry_name()),
        ),
        (
            "__ENTRY_SKIP_NEXT__",
            js_string(ReverseEntry::SkipNext.entry_name()),
        ),
        ("__ENTRY_END__", js_string(ReverseEntry::End.entry_name())),
    ]
    .iter()
    .fold(BRIDGE_TEMPLATE.to_string(), |script, (placeholder, value)| {
        script.replace(placeholder, value)
    });
    format!("{POLYFILL_SOURCE}\n{instrumentation}")
}

/// One `MediaMetadata.artwork` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageArtwork {
    pub src: String,
    /// Raw `sizes` attribute, e.g. `"512x512"`.
    pub sizes: Option<String>,
}

impl PageArtwork {
    pub fn new(src: impl Into<String>, sizes: Option<&str>) -> Self {
        Self {
            src: src.into(),
            sizes: sizes.map(ToString::to_string),
        }
    }

    fn width(&self) -> Option<u32> {
        let sizes = self.sizes.as_deref()?;
        sizes.split('x').next()?.trim().parse().ok()
    }
}

/// Picks the widest artwork whose width lies in `[MIN_ARTWORK_WIDTH, MAX_ARTWORK_WIDTH]`.
/// Later entries win ties; entries without a parseable size are skipped.
pub fn select_artwork(items: &[PageArtwork]) -> Option<&str> {
    let mut best_width = MIN_ARTWORK_WIDTH;
    let mut selected = None;
    for item in items {
        let Some(width) = item.width() else {
            continue;
        };
        if width >= best_width && width <= MAX_ARTWORK_WIDTH {
            best_width = width;
            selected = Some(item.src.as_str());
        }
    }
    selected
}

/// Rewind-vs-previous tie-break for `ReverseEntry::SkipPrevious`: rewind whenever the
/// media has a duration and either meaningful time has elapsed or the page registered no
/// previous-track handler.
pub fn should_rewind_on_previous(
    position_secs: f64,
    duration_secs: f64,
    has_previous_handler: bool,
) -> bool {
    duration_secs > 0.0 && (position_secs > RESTART_THRESHOLD_SECS || !has_previous_handler)
}
