//! Mailbox watching.
//!
//! Provides the per-account machinery one poll cycle runs through: a
//! session slot with circuit breaking, the ingestion pipeline, the mail
//! source traits with their TLS implementation, and the notification
//! capability.

mod notify;
mod pipeline;
mod session;
mod source;

pub use notify::{LoggingNotifier, Notifier};
pub use pipeline::{AccountState, CycleReport, Pipeline};
pub use session::{AccountSession, CircuitBreaker, COOLDOWN_SECS, FAILURE_THRESHOLD};
pub use source::{MailSession, NETWORK_TIMEOUT, SessionFactory, TlsSession, TlsSessionFactory};
