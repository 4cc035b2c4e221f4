//! Account management module.
//!
//! Provides account configuration, validation, credential encryption and
//! durable storage.

mod cipher;
mod model;
mod store;
mod validation;

pub use cipher::{CredentialCipher, MASTER_SECRET_ENV};
pub use model::{
    AccountConfig, AccountPatch, DEFAULT_FOLDER, DEFAULT_POLL_INTERVAL_SECS,
    MIN_POLL_INTERVAL_SECS, OwnerId, Secret,
};
pub use store::{AccountRegistry, AccountStore, LoadReport};
pub use validation::{ValidationError, ValidationResult, validate_config};
