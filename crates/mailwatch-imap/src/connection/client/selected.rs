//! Implementation for the selected state.

use tokio::io::{AsyncRead, AsyncWrite};

use super::Client;
use super::states::Selected;
use crate::Result;
use crate::command::{Command, SearchCriteria};
use crate::response;

impl<S> Client<S, Selected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the name of the selected mailbox.
    #[must_use]
    pub fn mailbox(&self) -> &str {
        self.state.mailbox()
    }

    /// Returns the message count reported at SELECT time.
    #[must_use]
    pub const fn exists(&self) -> u32 {
        self.state.exists()
    }

    /// Searches for messages matching the given criteria.
    ///
    /// Returns the matching message sequence numbers.
    pub async fn search(&mut self, criteria: &SearchCriteria) -> Result<Vec<u32>> {
        let tag = self.tag_gen.next();
        let cmd = Command::Search {
            criteria: criteria.clone(),
        }
        .serialize(&tag);

        self.stream.write_command(&cmd).await?;

        let responses = self.read_until_tagged(&tag).await?;
        let mut ids = Vec::new();
        for response_bytes in &responses {
            if let Some(found) = response::parse_search_ids(response_bytes) {
                ids.extend(found);
            }
        }

        Self::check_tagged_ok(&responses, &tag)?;
        tracing::trace!(matches = ids.len(), "SEARCH complete");
        Ok(ids)
    }

    /// Fetches the full RFC 822 message with the given sequence number.
    ///
    /// Returns `Ok(None)` when the server completes the FETCH without
    /// returning message data, which happens when the message was
    /// expunged between SEARCH and FETCH.
    pub async fn fetch_message(&mut self, seq: u32) -> Result<Option<Vec<u8>>> {
        let tag = self.tag_gen.next();
        let cmd = Command::Fetch { seq }.serialize(&tag);

        self.stream.write_command(&cmd).await?;

        let responses = self.read_until_tagged(&tag).await?;
        let body = responses
            .iter()
            .find_map(|r| response::extract_fetch_literal(r));

        Self::check_tagged_ok(&responses, &tag)?;
        Ok(body)
    }
}
