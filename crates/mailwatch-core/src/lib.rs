//! # mailwatch-core
//!
//! Core logic for the `mailwatch` mailbox monitor.
//!
//! This crate provides:
//! - Account configuration and validation, with credentials encrypted at rest
//! - Durable multi-owner account storage (single JSON document, atomic writes)
//! - The poll pipeline: session reuse, circuit breaking, filter matching and
//!   notification dispatch
//! - The polling engine, scheduling one independent monitoring unit per owner

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
mod engine;
mod error;
pub mod time;
pub mod watch;

pub use account::{
    AccountConfig, AccountPatch, AccountRegistry, AccountStore, CredentialCipher, DEFAULT_FOLDER,
    DEFAULT_POLL_INTERVAL_SECS, LoadReport, MASTER_SECRET_ENV, MIN_POLL_INTERVAL_SECS, OwnerId,
    Secret, ValidationError, ValidationResult, validate_config,
};
pub use engine::PollingEngine;
pub use error::{Error, Result};
pub use time::{Clock, SystemClock};
pub use watch::{LoggingNotifier, MailSession, Notifier, SessionFactory, TlsSessionFactory};
