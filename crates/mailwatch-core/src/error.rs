//! Error types for the core library.

use thiserror::Error;

use crate::account::OwnerId;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Connecting to the mail server failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server rejected the login credentials.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The watched folder could not be selected.
    #[error("Folder selection error: {0}")]
    FolderSelection(String),

    /// A fetched message could not be parsed.
    #[error("Parse error: {0}")]
    Parse(#[from] mailwatch_mime::Error),

    /// Credential encryption or decryption failed.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Reading or writing the account store failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// An account configuration failed validation.
    #[error("Invalid account: {0}")]
    InvalidAccount(String),

    /// No stored account matches the owner and name.
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// The owner has no stored accounts.
    #[error("No accounts configured for owner {0}")]
    NoAccounts(OwnerId),

    /// Delivering a notification failed.
    #[error("Notification error: {0}")]
    Notify(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
