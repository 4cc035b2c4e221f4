//! Account model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default folder watched when none is configured.
pub const DEFAULT_FOLDER: &str = "INBOX";

/// Default polling interval in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

/// Minimum polling interval in seconds.
pub const MIN_POLL_INTERVAL_SECS: u64 = 30;

/// Unique identifier for an account owner.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct OwnerId(pub i64);

impl OwnerId {
    /// Create a new owner ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A credential value that never appears in debug output.
///
/// The wrapped string is plaintext in memory; the account store encrypts it
/// before anything touches disk.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Wrap a plaintext credential.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the plaintext value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the credential is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Configuration for one watched mailbox.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    /// IMAP server hostname.
    pub host: String,
    /// IMAP server port.
    pub port: u16,
    /// Login name for authentication.
    pub login: String,
    /// Login credential.
    pub secret: Secret,
    /// Folder to watch.
    pub folder: String,
    /// Seconds between poll cycles.
    pub poll_interval_seconds: u64,
    /// Destination passed to the notifier for matching messages.
    pub notify_target: String,
    /// Only notify when the sender contains this text.
    pub sender_contains: Option<String>,
    /// Only notify when the subject contains this text.
    pub subject_contains: Option<String>,
    /// Only notify when attachment presence matches this flag.
    pub has_attachments: Option<bool>,
    /// Upper edge of the last completed search window.
    pub last_check_time: Option<DateTime<Utc>>,
}

impl AccountConfig {
    /// Create a configuration with default folder, interval and no filters.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        port: u16,
        login: impl Into<String>,
        secret: Secret,
        notify_target: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            login: login.into(),
            secret,
            folder: DEFAULT_FOLDER.to_string(),
            poll_interval_seconds: DEFAULT_POLL_INTERVAL_SECS,
            notify_target: notify_target.into(),
            sender_contains: None,
            subject_contains: None,
            has_attachments: None,
            last_check_time: None,
        }
    }

    /// Apply a partial update, replacing only the fields the patch carries.
    pub fn apply(&mut self, patch: AccountPatch) {
        if let Some(host) = patch.host {
            self.host = host;
        }
        if let Some(port) = patch.port {
            self.port = port;
        }
        if let Some(login) = patch.login {
            self.login = login;
        }
        if let Some(secret) = patch.secret {
            self.secret = secret;
        }
        if let Some(folder) = patch.folder {
            self.folder = folder;
        }
        if let Some(interval) = patch.poll_interval_seconds {
            self.poll_interval_seconds = interval;
        }
        if let Some(target) = patch.notify_target {
            self.notify_target = target;
        }
        if let Some(sender) = patch.sender_contains {
            self.sender_contains = sender;
        }
        if let Some(subject) = patch.subject_contains {
            self.subject_contains = subject;
        }
        if let Some(attachments) = patch.has_attachments {
            self.has_attachments = attachments;
        }
    }
}

/// Partial update for a stored account.
///
/// `None` fields are left untouched. The filter fields are doubly optional
/// so a patch can clear a filter by carrying `Some(None)`.
#[derive(Debug, Clone, Default)]
pub struct AccountPatch {
    /// New server hostname.
    pub host: Option<String>,
    /// New server port.
    pub port: Option<u16>,
    /// New login name.
    pub login: Option<String>,
    /// New login credential.
    pub secret: Option<Secret>,
    /// New watched folder.
    pub folder: Option<String>,
    /// New polling interval in seconds.
    pub poll_interval_seconds: Option<u64>,
    /// New notification destination.
    pub notify_target: Option<String>,
    /// New sender filter.
    pub sender_contains: Option<Option<String>>,
    /// New subject filter.
    pub subject_contains: Option<Option<String>>,
    /// New attachment filter.
    pub has_attachments: Option<Option<bool>>,
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
    use super::*;

    mod owner_id_tests {
        use super::*;

        #[test]
        fn new() {
            let id = OwnerId::new(42);
            assert_eq!(id.0, 42);
        }

        #[test]
        fn display() {
            let id = OwnerId::new(123);
            assert_eq!(format!("{id}"), "123");
        }

        #[test]
        fn equality() {
            let id1 = OwnerId::new(1);
            let id2 = OwnerId::new(1);
            let id3 = OwnerId::new(2);
            assert_eq!(id1, id2);
            assert_ne!(id1, id3);
        }

        #[test]
        fn ordering() {
            assert!(OwnerId::new(1) < OwnerId::new(2));
        }
    }

    mod secret_tests {
        use super::*;

        #[test]
        fn debug_is_redacted() {
            let secret = Secret::new("hunter2");
            assert_eq!(format!("{secret:?}"), "Secret(***)");
        }

        #[test]
        fn expose_returns_plaintext() {
            let secret = Secret::new("hunter2");
            assert_eq!(secret.expose(), "hunter2");
        }

        #[test]
        fn is_empty() {
            assert!(Secret::default().is_empty());
            assert!(!Secret::from("x").is_empty());
        }
    }

    mod account_config_tests {
        use super::*;

        fn config() -> AccountConfig {
            AccountConfig::new(
                "imap.example.com",
                993,
                "user@example.com",
                Secret::from("pw"),
                "chat-1",
            )
        }

        #[test]
        fn new_applies_defaults() {
            let config = config();
            assert_eq!(config.folder, "INBOX");
            assert_eq!(config.poll_interval_seconds, 300);
            assert!(config.sender_contains.is_none());
            assert!(config.subject_contains.is_none());
            assert!(config.has_attachments.is_none());
            assert!(config.last_check_time.is_none());
        }

        #[test]
        fn debug_hides_secret() {
            let rendered = format!("{:?}", config());
            assert!(rendered.contains("Secret(***)"));
            assert!(!rendered.contains("pw"));
        }

        #[test]
        fn apply_replaces_present_fields() {
            let mut config = config();
            config.apply(AccountPatch {
                port: Some(143),
                folder: Some("Archive".to_string()),
                subject_contains: Some(Some("invoice".to_string())),
                ..Default::default()
            });

            assert_eq!(config.port, 143);
            assert_eq!(config.folder, "Archive");
            assert_eq!(config.subject_contains.as_deref(), Some("invoice"));
            // Untouched fields keep their values
            assert_eq!(config.host, "imap.example.com");
            assert_eq!(config.login, "user@example.com");
        }

        #[test]
        fn apply_clears_filter_with_inner_none() {
            let mut config = config();
            config.subject_contains = Some("invoice".to_string());

            config.apply(AccountPatch {
                subject_contains: Some(None),
                ..Default::default()
            });

            assert!(config.subject_contains.is_none());
        }

        #[test]
        fn empty_patch_is_identity() {
            let mut config = config();
            config.apply(AccountPatch::default());
            assert_eq!(config.host, "imap.example.com");
            assert_eq!(config.port, 993);
            assert_eq!(config.poll_interval_seconds, 300);
        }
    }
}
