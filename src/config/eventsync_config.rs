//! eventsync configuration file handling
//!
//! Loads and manages the ~/.config/eventsync/config.yaml file.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Base directory for default paths (~/.config/eventsync)
fn config_dir() -> PathBuf {
    // Always use ~/.config for consistency across platforms (macOS, Linux)
    let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(".config");
    path.push("eventsync");
    path
}

/// Redmine connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedmineConfig {
    /// Base URL of the Redmine instance; also the base of event URLs
    pub url: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Tracker names whose issues are events
    #[serde(default = "default_trackers")]
    pub trackers: Vec<String>,

    /// Tracker name of recurring event templates
    #[serde(default = "default_template_tracker")]
    pub template_tracker: String,

    /// Page size for paginated listings
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Also fetch closed issues (cancelled events are usually closed)
    #[serde(default = "default_true")]
    pub include_closed: bool,
}

fn default_api_key_env() -> String {
    "REDMINE_API_KEY".to_string()
}

fn default_trackers() -> Vec<String> {
    vec!["Termin".to_string(), "Termin extern".to_string()]
}

fn default_template_tracker() -> String {
    "Terminvorlage".to_string()
}

fn default_page_size() -> u32 {
    redmine::DEFAULT_PAGE_SIZE
}

fn default_true() -> bool {
    true
}

impl RedmineConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key_env: default_api_key_env(),
            trackers: default_trackers(),
            template_tracker: default_template_tracker(),
            page_size: default_page_size(),
            include_closed: true,
        }
    }

    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }

    /// The tracker names an issue's `Terminart` may select
    ///
    /// The first configured tracker is the internal one, the second the
    /// external one.
    pub fn internal_tracker(&self) -> Option<&str> {
        self.trackers.first().map(String::as_str)
    }

    pub fn external_tracker(&self) -> Option<&str> {
        self.trackers.get(1).map(String::as_str)
    }
}

/// Event database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: config_dir().join("events.db"),
        }
    }
}

/// Checkpoint file settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    pub path: PathBuf,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            path: config_dir().join("checkpoint.json"),
        }
    }
}

/// Project mapping file settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingsConfig {
    pub path: PathBuf,
}

impl Default for MappingsConfig {
    fn default() -> Self {
        Self {
            path: config_dir().join("mappings.yaml"),
        }
    }
}

/// Redmine status labels recognized by the sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusLabels {
    #[serde(default = "default_status_new")]
    pub new: String,

    #[serde(default = "default_status_confirmed")]
    pub confirmed: String,

    #[serde(default = "default_status_cancelled")]
    pub cancelled: String,
}

fn default_status_new() -> String {
    "Neu".to_string()
}

fn default_status_confirmed() -> String {
    "Bestätigt".to_string()
}

fn default_status_cancelled() -> String {
    "Abgesagt".to_string()
}

impl Default for StatusLabels {
    fn default() -> Self {
        Self {
            new: default_status_new(),
            confirmed: default_status_confirmed(),
            cancelled: default_status_cancelled(),
        }
    }
}

/// Values the sync writes into every event it owns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Event store user owning synchronized events
    #[serde(default = "default_sync_user")]
    pub user: String,

    /// Category assigned when an issue names none that resolve
    #[serde(default = "default_category")]
    pub default_category: String,

    /// Location used when an issue has none
    #[serde(default = "default_unknown_location")]
    pub unknown_location: String,

    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Boilerplate written to the remarks of every synchronized event
    #[serde(default = "default_remarks")]
    pub remarks: String,
}

fn default_sync_user() -> String {
    "redmine".to_string()
}

fn default_category() -> String {
    "Schmarnn".to_string()
}

fn default_unknown_location() -> String {
    "unbekannt".to_string()
}

fn default_timezone() -> String {
    "Europe/Berlin".to_string()
}

fn default_remarks() -> String {
    "Hinweis: Event automatisch generiert von eventsync. Bitte nicht verändern, sonst gibt's Ärger!"
        .to_string()
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            user: default_sync_user(),
            default_category: default_category(),
            unknown_location: default_unknown_location(),
            timezone: default_timezone(),
            remarks: default_remarks(),
        }
    }
}

/// Which start dates bound the set of events considered for update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeWindow {
    /// Every synchronized event, regardless of start date
    All,
    /// Events starting on or after the checkpoint's calendar day
    #[default]
    FromCheckpointDay,
}

/// Update scope settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeConfig {
    #[serde(default)]
    pub window: ScopeWindow,

    /// Cancelled events older than this many days drop out of scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_retention_days: Option<u32>,
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Additional log file, truncated at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// eventsync configuration
///
/// Represents the complete ~/.config/eventsync/config.yaml file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSyncConfig {
    pub redmine: RedmineConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    #[serde(default)]
    pub mappings: MappingsConfig,

    #[serde(default)]
    pub statuses: StatusLabels,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub scope: ScopeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EventSyncConfig {
    /// Create a configuration with defaults for everything but the Redmine URL
    pub fn new(redmine_url: impl Into<String>) -> Self {
        Self {
            redmine: RedmineConfig::new(redmine_url),
            database: DatabaseConfig::default(),
            checkpoint: CheckpointConfig::default(),
            mappings: MappingsConfig::default(),
            statuses: StatusLabels::default(),
            sync: SyncSettings::default(),
            scope: ScopeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from the default path (~/.config/eventsync/config.yaml)
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path();
        Self::load(&path)
    }

    /// Load configuration from a specific path
    ///
    /// Relative paths inside the file are resolved against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(crate::EventSyncError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading eventsync configuration");

        let content = fs::read_to_string(path)?;
        let mut config: Self = serde_yaml::from_str(&content)?;

        if let Some(base) = path.parent() {
            config.resolve_relative_paths(base);
        }

        tracing::debug!(
            redmine = %config.redmine.url,
            trackers = config.redmine.trackers.len(),
            database = %config.database.path.display(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Get the default config path (~/.config/eventsync/config.yaml)
    pub fn default_path() -> PathBuf {
        config_dir().join("config.yaml")
    }

    fn resolve_relative_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.database.path);
        resolve(&mut self.checkpoint.path);
        resolve(&mut self.mappings.path);
        if let Some(file) = self.logging.file.as_mut() {
            resolve(file);
        }
    }
}
