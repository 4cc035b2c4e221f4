//! IMAP connection management.
//!
//! This module provides connection handling for IMAP servers, including:
//! - TLS stream setup
//! - Framed I/O for IMAP protocol
//! - Type-state connection wrapper

mod client;
mod framed;
mod stream;

pub use client::{Authenticated, Client, NotAuthenticated, Selected};
pub use framed::{FramedStream, ResponseAccumulator};
pub use stream::{ImapStream, connect_tls, create_tls_connector};
