//! Implementation for the authenticated state.

use tokio::io::{AsyncRead, AsyncWrite};

use super::Client;
use super::states::{Authenticated, Selected};
use crate::Result;
use crate::command::Command;
use crate::response;

impl<S> Client<S, Authenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Selects a mailbox for read-write access.
    ///
    /// Consumes self and returns a selected client on success. The
    /// message count from the untagged EXISTS response is recorded in
    /// the new state.
    pub async fn select(mut self, mailbox: &str) -> Result<Client<S, Selected>> {
        let tag = self.tag_gen.next();
        let cmd = Command::Select {
            mailbox: mailbox.to_string(),
        }
        .serialize(&tag);

        self.stream.write_command(&cmd).await?;

        let responses = self.read_until_tagged(&tag).await?;
        let exists = responses
            .iter()
            .find_map(|r| response::parse_exists(r))
            .unwrap_or(0);
        Self::check_tagged_ok(&responses, &tag)?;
        tracing::debug!(mailbox, exists, "Selected mailbox");

        Ok(Client {
            stream: self.stream,
            tag_gen: self.tag_gen,
            state: Selected {
                mailbox: mailbox.into(),
                exists,
            },
        })
    }
}
