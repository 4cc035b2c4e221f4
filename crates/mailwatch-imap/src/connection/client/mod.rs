//! Type-state IMAP client connection.
//!
//! Uses the type-state pattern to enforce valid state transitions at
//! compile time:
//!
//! - `NotAuthenticated`: initial state after the greeting
//! - `Authenticated`: after a successful LOGIN
//! - `Selected`: after a successful SELECT
//!
//! Each state only exposes the methods that are valid in that state.
//! Transitions consume the client, so a failed LOGIN or SELECT drops
//! the connection rather than leaving it in an ambiguous state.

#![allow(clippy::missing_errors_doc)]

mod authenticated;
mod not_authenticated;
mod selected;
mod states;

use tokio::io::{AsyncRead, AsyncWrite};

pub use self::states::{Authenticated, NotAuthenticated, Selected};
use super::framed::{FramedStream, ResponseAccumulator};
use crate::command::{Command, TagGenerator};
use crate::response::{self, TaggedStatus};
use crate::{Error, Result};

/// IMAP client connection with type-state.
///
/// The `State` parameter tracks the connection state at compile time and
/// carries any runtime data that belongs to that state.
pub struct Client<S, State> {
    pub(crate) stream: FramedStream<S>,
    pub(crate) tag_gen: TagGenerator,
    pub(crate) state: State,
}

// Manual Debug implementation since FramedStream doesn't implement Debug
impl<S, State: std::fmt::Debug> std::fmt::Debug for Client<S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("tag_gen", &self.tag_gen)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Shared implementation for all states.
impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Sends a NOOP command as a liveness probe.
    ///
    /// An error here means the connection is no longer usable.
    pub async fn noop(&mut self) -> Result<()> {
        let tag = self.tag_gen.next();
        let cmd = Command::Noop.serialize(&tag);
        self.stream.write_command(&cmd).await?;

        let responses = self.read_until_tagged(&tag).await?;
        Self::check_tagged_ok(&responses, &tag)?;

        Ok(())
    }

    /// Gracefully disconnects from the server.
    ///
    /// Valid in any state. Errors after the LOGOUT has been written are
    /// ignored since the connection is being discarded either way.
    pub async fn logout(mut self) -> Result<()> {
        let tag = self.tag_gen.next();
        let cmd = Command::Logout.serialize(&tag);
        self.stream.write_command(&cmd).await?;

        let _ = self.read_until_tagged(&tag).await;
        Ok(())
    }

    /// Reads responses until the tagged completion for `tag` arrives.
    pub(crate) async fn read_until_tagged(&mut self, tag: &str) -> Result<Vec<Vec<u8>>> {
        let mut accumulator = ResponseAccumulator::new(tag);
        accumulator.read_until_tagged(&mut self.stream).await
    }

    /// Checks that the tagged response for `tag` is OK.
    pub(crate) fn check_tagged_ok(responses: &[Vec<u8>], tag: &str) -> Result<()> {
        // The tagged response should be the last one collected.
        for response_bytes in responses.iter().rev() {
            if let Some((status, text)) = response::parse_tagged(response_bytes, tag) {
                return match status {
                    TaggedStatus::Ok => Ok(()),
                    TaggedStatus::No => Err(Error::No(text)),
                    TaggedStatus::Bad => Err(Error::Bad(text)),
                    TaggedStatus::Bye => Err(Error::Bye(text)),
                };
            }
        }

        Err(Error::Protocol("missing tagged response".to_string()))
    }
}
