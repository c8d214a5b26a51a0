//! Configuration validation
//!
//! Validates eventsync configuration for correctness:
//! - Redmine URL is present and uses http(s)
//! - At least one event tracker, no duplicates
//! - Status labels are non-empty and pairwise distinct
//! - Sync identity values are non-empty

use super::eventsync_config::EventSyncConfig;
use crate::EventSyncError;
use std::collections::HashSet;

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub section: Option<String>,
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            section: None,
            field: field.into(),
            message: message.into(),
        }
    }

    fn in_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref section) = self.section {
            write!(f, "{}.{}: {}", section, self.field, self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

/// Upper bound for `scope.cancelled_retention_days` (about a century)
pub const MAX_RETENTION_DAYS: u32 = 36_500;

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Validate an eventsync configuration, collecting every problem
pub fn validate_config(config: &EventSyncConfig) -> ValidationResult {
    let mut errors = Vec::new();

    validate_redmine(config, &mut errors);
    validate_statuses(config, &mut errors);
    validate_sync(config, &mut errors);

    match config.scope.cancelled_retention_days {
        Some(0) => errors.push(
            ValidationError::new(
                "cancelled_retention_days",
                "Must be greater than 0 (omit it to keep cancelled events in scope)",
            )
            .in_section("scope"),
        ),
        Some(days) if days > MAX_RETENTION_DAYS => errors.push(
            ValidationError::new(
                "cancelled_retention_days",
                format!("Must be at most {} days, got {}", MAX_RETENTION_DAYS, days),
            )
            .in_section("scope"),
        ),
        _ => {}
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_redmine(config: &EventSyncConfig, errors: &mut Vec<ValidationError>) {
    let redmine = &config.redmine;

    if redmine.url.trim().is_empty() {
        errors.push(
            ValidationError::new("url", "Redmine URL cannot be empty").in_section("redmine"),
        );
    } else if !redmine.url.starts_with("http://") && !redmine.url.starts_with("https://") {
        errors.push(
            ValidationError::new("url", format!("Invalid Redmine URL: {}", redmine.url))
                .in_section("redmine"),
        );
    }

    if redmine.trackers.is_empty() {
        errors.push(
            ValidationError::new("trackers", "At least one event tracker must be configured")
                .in_section("redmine"),
        );
    }

    let mut seen = HashSet::new();
    for tracker in &redmine.trackers {
        if tracker.trim().is_empty() {
            errors.push(
                ValidationError::new("trackers", "Tracker names cannot be empty")
                    .in_section("redmine"),
            );
        } else if !seen.insert(tracker.as_str()) {
            errors.push(
                ValidationError::new("trackers", format!("Duplicate tracker: {}", tracker))
                    .in_section("redmine"),
            );
        }
    }

    if redmine.page_size == 0 {
        errors.push(
            ValidationError::new("page_size", "Page size must be greater than 0")
                .in_section("redmine"),
        );
    }

    if std::env::var(&redmine.api_key_env).is_err() {
        tracing::warn!(
            env_var = %redmine.api_key_env,
            "Redmine API key variable not set, requests will be anonymous"
        );
    }
}

fn validate_statuses(config: &EventSyncConfig, errors: &mut Vec<ValidationError>) {
    let labels = [
        ("new", &config.statuses.new),
        ("confirmed", &config.statuses.confirmed),
        ("cancelled", &config.statuses.cancelled),
    ];

    let mut seen = HashSet::new();
    for (field, label) in labels {
        let label = label.trim();
        if label.is_empty() {
            errors.push(
                ValidationError::new(field, "Status label cannot be empty").in_section("statuses"),
            );
        } else if !seen.insert(label) {
            errors.push(
                ValidationError::new(field, format!("Duplicate status label: {}", label))
                    .in_section("statuses"),
            );
        }
    }
}

fn validate_sync(config: &EventSyncConfig, errors: &mut Vec<ValidationError>) {
    let sync = &config.sync;

    if sync.user.trim().is_empty() {
        errors.push(ValidationError::new("user", "Sync user cannot be empty").in_section("sync"));
    }
    if sync.default_category.trim().is_empty() {
        errors.push(
            ValidationError::new("default_category", "Default category cannot be empty")
                .in_section("sync"),
        );
    }
    if sync.unknown_location.trim().is_empty() {
        errors.push(
            ValidationError::new("unknown_location", "Fallback location cannot be empty")
                .in_section("sync"),
        );
    }
}

/// Validate configuration and return a Result
pub fn validate_config_result(config: &EventSyncConfig) -> crate::Result<()> {
    validate_config(config).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        EventSyncError::Config(format!(
            "Configuration validation failed:\n  - {}",
            messages.join("\n  - ")
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> EventSyncConfig {
        EventSyncConfig::new("https://redmine.example.org")
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_empty_url() {
        let mut config = valid();
        config.redmine.url = String::new();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("cannot be empty"));
    }

    #[test]
    fn test_non_http_url() {
        let mut config = valid();
        config.redmine.url = "ftp://redmine.example.org".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_reports_all_problems() {
        let mut config = valid();
        config.redmine.trackers.clear();
        config.redmine.page_size = 0;
        config.sync.user = " ".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_duplicate_status_labels() {
        let mut config = valid();
        config.statuses.cancelled = config.statuses.confirmed.clone();

        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.message.contains("Duplicate status label")));
        assert_eq!(errors[0].to_string(), "statuses.cancelled: Duplicate status label: Bestätigt");
    }

    #[test]
    fn test_cancelled_retention_bounds() {
        let mut config = valid();
        config.scope.cancelled_retention_days = Some(MAX_RETENTION_DAYS);
        assert!(validate_config(&config).is_ok());

        config.scope.cancelled_retention_days = Some(100_000_000);
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0]
            .to_string()
            .starts_with("scope.cancelled_retention_days: Must be at most"));

        config.scope.cancelled_retention_days = Some(0);
        assert!(validate_config_result(&config).is_err());
    }

    #[test]
    fn test_duplicate_trackers() {
        let mut config = valid();
        config.redmine.trackers = vec!["Termin".to_string(), "Termin".to_string()];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_config_result_message() {
        let mut config = valid();
        config.redmine.page_size = 0;

        let err = validate_config_result(&config).unwrap_err();
        assert!(err.to_string().contains("redmine.page_size"));
    }
}
