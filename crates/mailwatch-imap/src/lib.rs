//! # mailwatch-imap
//!
//! A small async IMAP client covering exactly what mailbox polling
//! needs: LOGIN, SELECT, SEARCH, FETCH of full messages, NOOP as a
//! liveness probe and LOGOUT. Connections are always TLS via rustls.
//!
//! ## Connection states
//!
//! The library uses the type-state pattern to enforce valid IMAP
//! operations at compile time:
//!
//! ```text
//! ┌─────────────────────┐
//! │   NotAuthenticated  │ ─── login() ───→ Authenticated
//! └─────────────────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │    Authenticated    │ ─── select() ───→ Selected
//! └─────────────────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │      Selected       │ ─── search() / fetch_message()
//! └─────────────────────┘
//! ```
//!
//! Transitions consume the client; `logout()` is valid in every state.
//!
//! ## Quick start
//!
//! ```ignore
//! use mailwatch_imap::{Client, SearchCriteria, connect_tls};
//!
//! #[tokio::main]
//! async fn main() -> mailwatch_imap::Result<()> {
//!     let stream = connect_tls("imap.example.com", 993).await?;
//!     let client = Client::from_stream(stream).await?;
//!     let client = client.login("user@example.com", "password").await?;
//!     let mut client = client.select("INBOX").await?;
//!
//!     let ids = client.search(&SearchCriteria::Unseen).await?;
//!     for id in ids {
//!         if let Some(raw) = client.fetch_message(id).await? {
//!             println!("message {id}: {} bytes", raw.len());
//!         }
//!     }
//!
//!     client.logout().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`command`]: IMAP command builders
//! - [`connection`]: Connection management and type-state client
//! - [`response`]: Response classification helpers

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod response;

pub use command::{Command, SearchCriteria, TagGenerator};
pub use connection::{
    Authenticated, Client, FramedStream, ImapStream, NotAuthenticated, ResponseAccumulator,
    Selected, connect_tls, create_tls_connector,
};
pub use error::{Error, Result};
