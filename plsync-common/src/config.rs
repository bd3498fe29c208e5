//! Configuration loading, saving and root folder resolution
//!
//! Everything plsync keeps on disk lives in one root folder:
//! - `plsync.toml` - user configuration ([`TomlConfig`])
//! - `history.json` - previously seen track identities per source
//! - `play_counts.json` - locally tracked play counts
//!
//! Root folder resolution priority order:
//! 1. Command-line argument (highest priority)
//! 2. `PLSYNC_ROOT_FOLDER` environment variable
//! 3. `PLSYNC_ROOT` environment variable
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const CONFIG_FILE_NAME: &str = "plsync.toml";
pub const HISTORY_FILE_NAME: &str = "history.json";
pub const PLAY_COUNTS_FILE_NAME: &str = "play_counts.json";

pub const DEFAULT_TRACK_WINDOW_DAYS: u32 = 7;
pub const DEFAULT_RELEASE_WINDOW_DAYS: u32 = 30;

/// Environment variable holding the provider access token
pub const ACCESS_TOKEN_ENV: &str = "PLSYNC_ACCESS_TOKEN";

const ROOT_FOLDER_ENV: &str = "PLSYNC_ROOT_FOLDER";
const ROOT_ENV: &str = "PLSYNC_ROOT";

/// Logging section of `plsync.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset ("info", "debug", ...)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Contents of `plsync.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Playlists scanned for new tracks, in scan order
    #[serde(default)]
    pub source_playlists: Vec<String>,

    /// Playlist receiving the new tracks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_playlist: Option<String>,

    /// Trailing window (days) scanned in each source playlist
    #[serde(default = "default_track_window_days")]
    pub track_window_days: u32,

    /// Trailing window (days) for followed-artist releases
    #[serde(default = "default_release_window_days")]
    pub release_window_days: u32,

    /// Include followed-artist releases when syncing everything
    #[serde(default = "default_check_artist_releases")]
    pub check_artist_releases: bool,

    /// Provider access token (the environment variable takes precedence)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_track_window_days() -> u32 {
    DEFAULT_TRACK_WINDOW_DAYS
}

fn default_release_window_days() -> u32 {
    DEFAULT_RELEASE_WINDOW_DAYS
}

fn default_check_artist_releases() -> bool {
    true
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            source_playlists: Vec::new(),
            destination_playlist: None,
            track_window_days: DEFAULT_TRACK_WINDOW_DAYS,
            release_window_days: DEFAULT_RELEASE_WINDOW_DAYS,
            check_artist_releases: true,
            access_token: None,
            logging: LoggingConfig::default(),
        }
    }
}

/// Settings for a single sync run
///
/// Built from [`TomlConfig`] once per run and passed to the orchestrator by value,
/// so a config edit between runs never changes a run already in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub sources: Vec<String>,
    pub destination: Option<String>,
    pub track_window_days: u32,
    pub release_window_days: u32,
    pub check_artist_releases: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        TomlConfig::default().sync_settings()
    }
}

impl TomlConfig {
    /// Load and parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid {}: {}", path.display(), e)))
    }

    /// Load a config file, degrading gracefully
    ///
    /// A missing file is created with defaults. An unreadable or invalid file
    /// logs a warning and yields defaults without touching the file.
    pub fn load_or_create(path: &Path) -> Self {
        if !path.exists() {
            let config = Self::default();
            match write_toml_config(&config, path) {
                Ok(()) => info!(path = %path.display(), "Created default configuration file"),
                Err(e) => warn!(path = %path.display(), error = %e, "Could not create configuration file"),
            }
            return config;
        }

        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load configuration, using defaults");
                Self::default()
            }
        }
    }

    /// Snapshot of the settings a sync run needs
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            sources: self.source_playlists.clone(),
            destination: self
                .destination_playlist
                .clone()
                .filter(|d| !d.trim().is_empty()),
            track_window_days: self.track_window_days,
            release_window_days: self.release_window_days,
            check_artist_releases: self.check_artist_releases,
        }
    }

    /// Append a source playlist
    pub fn add_source(&mut self, playlist_id: &str) -> Result<()> {
        let playlist_id = playlist_id.trim();
        if playlist_id.is_empty() {
            return Err(Error::InvalidInput("Playlist ID must not be empty".to_string()));
        }
        if self.source_playlists.iter().any(|p| p == playlist_id) {
            return Err(Error::InvalidInput(format!(
                "Playlist {} is already a source",
                playlist_id
            )));
        }
        self.source_playlists.push(playlist_id.to_string());
        Ok(())
    }

    /// Remove a source playlist by ID or by 1-based position
    ///
    /// Returns the removed playlist ID.
    pub fn remove_source(&mut self, id_or_position: &str) -> Result<String> {
        let key = id_or_position.trim();
        if let Some(index) = self.source_playlists.iter().position(|p| p == key) {
            return Ok(self.source_playlists.remove(index));
        }

        match key.parse::<usize>() {
            Ok(position) if (1..=self.source_playlists.len()).contains(&position) => {
                Ok(self.source_playlists.remove(position - 1))
            }
            Ok(position) => Err(Error::InvalidInput(format!(
                "Position {} out of range (1-{})",
                position,
                self.source_playlists.len()
            ))),
            Err(_) => Err(Error::NotFound(format!("Source playlist {}", key))),
        }
    }

    /// Replace the destination playlist
    pub fn set_destination(&mut self, playlist_id: &str) -> Result<()> {
        let playlist_id = playlist_id.trim();
        if playlist_id.is_empty() {
            return Err(Error::InvalidInput("Playlist ID must not be empty".to_string()));
        }
        self.destination_playlist = Some(playlist_id.to_string());
        Ok(())
    }
}

/// Write a config file atomically (temp file + rename)
///
/// The file may carry an access token, so on Unix it is restricted to 0600
/// from the moment the temp file is created.
pub fn write_toml_config(config: &TomlConfig, target: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize configuration: {}", e)))?;
    write_atomic_with(target, content.as_bytes(), FileAccess::OwnerOnly)
}

/// Write `bytes` to `target` via a sibling temp file and rename
///
/// Readers see either the old or the new content, never a torn write.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    write_atomic_with(target, bytes, FileAccess::Default)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileAccess {
    /// Process umask
    Default,
    /// 0600 on Unix
    OwnerOnly,
}

fn write_atomic_with(target: &Path, bytes: &[u8], access: FileAccess) -> Result<()> {
    use std::io::Write;

    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut temp_name = target
        .file_name()
        .ok_or_else(|| Error::InvalidInput(format!("Not a file path: {}", target.display())))?
        .to_os_string();
    temp_name.push(".tmp");
    let temp_path = target.with_file_name(temp_name);

    // A stale temp file would keep its old mode
    match std::fs::remove_file(&temp_path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        if access == FileAccess::OwnerOnly {
            options.mode(0o600);
        }
    }
    #[cfg(not(unix))]
    let _ = access;

    let written = options
        .open(&temp_path)
        .and_then(|mut file| file.write_all(bytes).and_then(|()| file.sync_all()));
    if let Err(e) = written.and_then(|()| std::fs::rename(&temp_path, target)) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e.into());
    }
    Ok(())
}

/// Resolve the provider access token
///
/// `PLSYNC_ACCESS_TOKEN` wins over the `access_token` config field.
/// Token acquisition and refresh happen outside plsync.
pub fn resolve_access_token(config: &TomlConfig) -> Result<String> {
    if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
        if !token.trim().is_empty() {
            return Ok(token.trim().to_string());
        }
    }

    config
        .access_token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::Config(format!(
                "No access token: set {} or access_token in {}",
                ACCESS_TOKEN_ENV, CONFIG_FILE_NAME
            ))
        })
}

/// Root folder resolution following the documented priority order
#[derive(Debug, Clone, Default)]
pub struct RootFolderResolver {
    cli_override: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Command-line override (priority 1)
    pub fn with_cli_override(mut self, path: Option<PathBuf>) -> Self {
        self.cli_override = path;
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_override {
            return path.clone();
        }

        for var in [ROOT_FOLDER_ENV, ROOT_ENV] {
            if let Ok(path) = std::env::var(var) {
                if !path.trim().is_empty() {
                    return PathBuf::from(path);
                }
            }
        }

        default_root_folder()
    }
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("plsync"))
        .unwrap_or_else(|| PathBuf::from("./plsync_data"))
}

/// Creates the root folder and names the files inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root)?;
            info!(root = %self.root.display(), "Created root folder");
        }
        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    pub fn history_path(&self) -> PathBuf {
        self.root.join(HISTORY_FILE_NAME)
    }

    pub fn play_counts_path(&self) -> PathBuf {
        self.root.join(PLAY_COUNTS_FILE_NAME)
    }
}
