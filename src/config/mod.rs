//! Configuration system
//!
//! Loads ~/.config/eventsync/config.yaml with support for:
//! - Redmine connection and tracker selection
//! - Status vocabulary
//! - Sync identity (user, default category, fallback location)
//! - Update scope and cancelled retention
//!
//! The project → group mapping lives in its own file (see [`MappingFile`]).

mod eventsync_config;
mod mappings;
pub mod validation;

pub use eventsync_config::{
    CheckpointConfig, DatabaseConfig, EventSyncConfig, LoggingConfig, MappingsConfig,
    RedmineConfig, ScopeConfig, ScopeWindow, StatusLabels, SyncSettings,
};
pub use mappings::{MappingFile, ProjectMapping};
pub use validation::{validate_config, validate_config_result, ValidationError};
