//! Account validation.

use super::model::{AccountConfig, MIN_POLL_INTERVAL_SECS};

/// Validation error for a watched-mailbox configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Server host is empty.
    EmptyHost,
    /// Server port is invalid.
    InvalidPort,
    /// Login name is empty.
    EmptyLogin,
    /// Credential is empty.
    EmptySecret,
    /// Watched folder is empty.
    EmptyFolder,
    /// Notification target is empty.
    EmptyNotifyTarget,
    /// Polling interval is below the minimum.
    PollIntervalTooShort,
}

impl ValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptyHost => "Server host is required",
            Self::InvalidPort => "Server port must be 1-65535",
            Self::EmptyLogin => "Login is required",
            Self::EmptySecret => "Credential is required",
            Self::EmptyFolder => "Folder is required",
            Self::EmptyNotifyTarget => "Notification target is required",
            Self::PollIntervalTooShort => "Polling interval must be at least 30 seconds",
        }
    }

    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyHost => "host",
            Self::InvalidPort => "port",
            Self::EmptyLogin => "login",
            Self::EmptySecret => "secret",
            Self::EmptyFolder => "folder",
            Self::EmptyNotifyTarget => "notify_target",
            Self::PollIntervalTooShort => "poll_interval_seconds",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ValidationError {}

/// Result of validating a configuration.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Validate a watched-mailbox configuration.
///
/// Returns `Ok(())` if valid, or `Err(Vec<ValidationError>)` with all errors.
///
/// # Errors
///
/// Returns a vector of `ValidationError` if any fields are invalid.
pub fn validate_config(config: &AccountConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if config.host.trim().is_empty() {
        errors.push(ValidationError::EmptyHost);
    }
    if config.port == 0 {
        errors.push(ValidationError::InvalidPort);
    }
    if config.login.trim().is_empty() {
        errors.push(ValidationError::EmptyLogin);
    }
    if config.secret.is_empty() {
        errors.push(ValidationError::EmptySecret);
    }
    if config.folder.trim().is_empty() {
        errors.push(ValidationError::EmptyFolder);
    }
    if config.notify_target.trim().is_empty() {
        errors.push(ValidationError::EmptyNotifyTarget);
    }
    if config.poll_interval_seconds < MIN_POLL_INTERVAL_SECS {
        errors.push(ValidationError::PollIntervalTooShort);
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::super::model::Secret;
    use super::*;

    fn valid_config() -> AccountConfig {
        AccountConfig::new(
            "imap.example.com",
            993,
            "user@example.com",
            Secret::from("pw"),
            "chat-1",
        )
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = valid_config();
        config.host = "  ".to_string();
        config.port = 0;
        config.login = String::new();
        config.secret = Secret::default();

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::EmptyHost));
        assert!(errors.contains(&ValidationError::InvalidPort));
        assert!(errors.contains(&ValidationError::EmptyLogin));
        assert!(errors.contains(&ValidationError::EmptySecret));
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_validate_empty_folder() {
        let mut config = valid_config();
        config.folder = String::new();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::EmptyFolder]);
    }

    #[test]
    fn test_validate_empty_notify_target() {
        let mut config = valid_config();
        config.notify_target = String::new();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::EmptyNotifyTarget]);
    }

    #[test]
    fn test_validate_short_interval() {
        let mut config = valid_config();
        config.poll_interval_seconds = 29;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::PollIntervalTooShort]);

        config.poll_interval_seconds = 30;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_error_message_and_field() {
        assert_eq!(ValidationError::EmptyHost.field(), "host");
        assert_eq!(ValidationError::EmptyHost.message(), "Server host is required");
        assert_eq!(
            format!("{}", ValidationError::PollIntervalTooShort),
            "Polling interval must be at least 30 seconds"
        );
    }
}
