//! Background shortcut descriptors and picker listings.

use std::collections::BTreeSet;

/// Opaque identifier of a background-content slot.
pub type ShortcutId = String;

/// A shortcut that may be kept alive as a background page.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct BackgroundShortcut {
    pub id: ShortcutId,
    #[serde(default)]
    pub name: String,
    pub url: String,
}

impl BackgroundShortcut {
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Row shown by a shortcut picker: one configured shortcut plus its running flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutListing {
    pub id: ShortcutId,
    pub name: String,
    pub is_running: bool,
}

/// Joins configured shortcuts with the registry's running set, preserving config order.
pub fn shortcut_listings(
    shortcuts: &[BackgroundShortcut],
    running: &BTreeSet<ShortcutId>,
) -> Vec<ShortcutListing> {
    shortcuts
        .iter()
        .map(|shortcut| ShortcutListing {
            id: shortcut.id.clone(),
            name: shortcut.name.clone(),
            is_running: running.contains(&shortcut.id),
        })
        .collect()
}
