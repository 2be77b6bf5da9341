//! Persistent configuration model, defaults, and loading.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::shortcut::BackgroundShortcut;

const CONFIG_DIR_NAME: &str = "tabwarden";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Summary notification texts.
    pub notification: NotificationConfig,
    #[serde(default)]
    /// Artwork download limits.
    pub artwork: ArtworkConfig,
    #[serde(default)]
    /// Platform media controls integration.
    pub media_controls: MediaControlsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Shortcuts known to the host. Only entries with `background = true` are started
    /// as background pages.
    #[serde(default)]
    pub shortcuts: Vec<ShortcutConfig>,
}

impl Config {
    /// Shortcuts eligible for background operation, in config order.
    pub fn background_shortcuts(&self) -> Vec<BackgroundShortcut> {
        self.shortcuts
            .iter()
            .filter(|shortcut| shortcut.background)
            .map(|shortcut| {
                BackgroundShortcut::new(
                    shortcut.id.clone(),
                    shortcut.name.clone(),
                    shortcut.url.clone(),
                )
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct NotificationConfig {
    #[serde(default = "default_notification_title")]
    pub title: String,
    /// Suffix after the running count when exactly one page runs.
    #[serde(default = "default_content_single")]
    pub content_single: String,
    /// Suffix after the running count otherwise.
    #[serde(default = "default_content_multiple")]
    pub content_multiple: String,
    #[serde(default = "default_end_session_label")]
    pub end_session_label: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: default_notification_title(),
            content_single: default_content_single(),
            content_multiple: default_content_multiple(),
            end_session_label: default_end_session_label(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct ArtworkConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u32,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u32,
    #[serde(default = "default_max_download_bytes")]
    pub max_download_bytes: u64,
    /// Longest edge of the decoded cover handed to the platform.
    #[serde(default = "default_max_edge_px")]
    pub max_edge_px: u32,
}

impl Default for ArtworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            max_download_bytes: default_max_download_bytes(),
            max_edge_px: default_max_edge_px(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct MediaControlsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_display_name")]
    pub display_name: String,
    #[serde(default = "default_dbus_name")]
    pub dbus_name: String,
}

impl Default for MediaControlsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            display_name: default_display_name(),
            dbus_name: default_dbus_name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct LoggingConfig {
    /// One of `off`, `error`, `warn`, `info`, `debug`, `trace`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> log::LevelFilter {
        self.level
            .trim()
            .parse::<log::LevelFilter>()
            .unwrap_or(log::LevelFilter::Info)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct ShortcutConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub background: bool,
}

fn default_true() -> bool {
    true
}

fn default_notification_title() -> String {
    "Background shortcuts".to_string()
}

fn default_content_single() -> String {
    "shortcut running in background".to_string()
}

fn default_content_multiple() -> String {
    "shortcuts running in background".to_string()
}

fn default_end_session_label() -> String {
    "Close".to_string()
}

fn default_connect_timeout_secs() -> u32 {
    5
}

fn default_read_timeout_secs() -> u32 {
    10
}

fn default_max_download_bytes() -> u64 {
    8 * 1024 * 1024
}

fn default_max_edge_px() -> u32 {
    512
}

fn default_display_name() -> String {
    "Tabwarden".to_string()
}

fn default_dbus_name() -> String {
    "tabwarden".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Clamps values that would make the runtime misbehave and drops unusable shortcuts.
pub fn sanitize_config(config: Config) -> Config {
    let mut seen_ids = std::collections::HashSet::new();
    let shortcuts = config
        .shortcuts
        .into_iter()
        .filter(|shortcut| {
            let usable = !shortcut.id.trim().is_empty() && !shortcut.url.trim().is_empty();
            if !usable {
                warn!("Config: ignoring shortcut with empty id or url");
            }
            usable && seen_ids.insert(shortcut.id.clone())
        })
        .collect();

    Config {
        artwork: ArtworkConfig {
            connect_timeout_secs: config.artwork.connect_timeout_secs.clamp(1, 60),
            read_timeout_secs: config.artwork.read_timeout_secs.clamp(1, 120),
            max_download_bytes: config
                .artwork
                .max_download_bytes
                .clamp(64 * 1024, 64 * 1024 * 1024),
            max_edge_px: config.artwork.max_edge_px.clamp(64, 2048),
        },
        shortcuts,
        ..config
    }
}

/// Default location: `<config dir>/tabwarden/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|path| path.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Reads `path`, creating it with defaults when missing. Unreadable or invalid files fall
/// back to defaults without being overwritten.
pub fn load_or_create_config(path: &Path) -> Config {
    if !path.exists() {
        let default_config = sanitize_config(Config::default());
        info!(
            "Config file not found. Creating default config. path={}",
            path.display()
        );
        if let Err(err) = write_config(path, &default_config) {
            warn!("Config: {}", err);
        }
        return default_config;
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            warn!("Config: failed to read {}: {}", path.display(), err);
            return sanitize_config(Config::default());
        }
    };
    match toml::from_str::<Config>(&content) {
        Ok(config) => sanitize_config(config),
        Err(err) => {
            warn!(
                "Config: invalid {}; using defaults: {}",
                path.display(),
                err
            );
            sanitize_config(Config::default())
        }
    }
}

fn write_config(path: &Path, config: &Config) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| {
            format!(
                "failed to create config directory {}: {}",
                parent.display(),
                err
            )
        })?;
    }
    let text = toml::to_string(config).map_err(|err| format!("failed to encode config: {err}"))?;
    std::fs::write(path, text)
        .map_err(|err| format!("failed to write config {}: {}", path.display(), err))
}

#[cfg(test)]
mod tests {
    use super::{load_or_create_config, sanitize_config, Config, ShortcutConfig};

    #[test]
    fn test_default_config_has_expected_values() {
        let config = Config::default();

        assert_eq!(config.notification.title, "Background shortcuts");
        assert_eq!(config.notification.end_session_label, "Close");
        assert_eq!(config.artwork.connect_timeout_secs, 5);
        assert_eq!(config.artwork.read_timeout_secs, 10);
        assert_eq!(config.artwork.max_download_bytes, 8 * 1024 * 1024);
        assert_eq!(config.artwork.max_edge_px, 512);
        assert!(config.media_controls.enabled);
        assert_eq!(config.media_controls.dbus_name, "tabwarden");
        assert_eq!(config.logging.level_filter(), log::LevelFilter::Info);
        assert!(config.shortcuts.is_empty());
    }

    #[test]
    fn test_partial_file_fills_missing_sections_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [artwork]
            max_edge_px = 256

            [[shortcuts]]
            id = "radio"
            url = "https://radio.example.com"
            background = true
            "#,
        )
        .expect("partial config should parse");

        assert_eq!(config.artwork.max_edge_px, 256);
        assert_eq!(config.artwork.read_timeout_secs, 10);
        assert_eq!(config.notification.title, "Background shortcuts");
        assert_eq!(config.shortcuts.len(), 1);
        assert_eq!(config.background_shortcuts()[0].id, "radio");
    }

    #[test]
    fn test_sanitize_clamps_limits_and_drops_bad_shortcuts() {
        let mut config = Config::default();
        config.artwork.connect_timeout_secs = 0;
        config.artwork.max_edge_px = 10_000;
        config.shortcuts = vec![
            ShortcutConfig {
                id: "radio".to_string(),
                name: "Radio".to_string(),
                url: "https://radio.example.com".to_string(),
                background: true,
            },
            ShortcutConfig {
                id: "radio".to_string(),
                name: "Duplicate".to_string(),
                url: "https://other.example.com".to_string(),
                background: true,
            },
            ShortcutConfig {
                id: " ".to_string(),
                name: "Blank".to_string(),
                url: "https://blank.example.com".to_string(),
                background: true,
            },
        ];

        let sanitized = sanitize_config(config);

        assert_eq!(sanitized.artwork.connect_timeout_secs, 1);
        assert_eq!(sanitized.artwork.max_edge_px, 2048);
        assert_eq!(sanitized.shortcuts.len(), 1);
        assert_eq!(sanitized.shortcuts[0].name, "Radio");
    }

    #[test]
    fn test_background_shortcuts_skip_foreground_only_entries() {
        let mut config = Config::default();
        config.shortcuts = vec![
            ShortcutConfig {
                id: "mail".to_string(),
                name: "Mail".to_string(),
                url: "https://mail.example.com".to_string(),
                background: false,
            },
            ShortcutConfig {
                id: "radio".to_string(),
                name: "Radio".to_string(),
                url: "https://radio.example.com".to_string(),
                background: true,
            },
        ];
        let shortcuts = config.background_shortcuts();
        assert_eq!(shortcuts.len(), 1);
        assert_eq!(shortcuts[0].id, "radio");
    }

    #[test]
    fn test_load_creates_missing_file_and_reads_it_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");

        let created = load_or_create_config(&path);
        assert!(path.exists());
        assert_eq!(created, sanitize_config(Config::default()));

        let reloaded = load_or_create_config(&path);
        assert_eq!(reloaded, created);
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is = = not toml").expect("write");

        let config = load_or_create_config(&path);
        assert_eq!(config, sanitize_config(Config::default()));
        let untouched = std::fs::read_to_string(&path).expect("read");
        assert_eq!(untouched, "this is = = not toml");
    }
}
