//! Implementation for the not-authenticated state.

use tokio::io::{AsyncRead, AsyncWrite};

use super::Client;
use super::states::{Authenticated, NotAuthenticated};
use crate::command::{Command, TagGenerator};
use crate::connection::framed::FramedStream;
use crate::response;
use crate::{Error, Result};

impl<S> Client<S, NotAuthenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new client from a connected stream.
    ///
    /// Reads and classifies the server greeting. A `* BYE` greeting means
    /// the server refused the connection before any command was sent.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut framed = FramedStream::new(stream);

        let greeting = framed.read_response().await?;
        if greeting.starts_with(b"* BYE") {
            return Err(Error::Bye(response::trim_line(&greeting[5..])));
        }
        if !greeting.starts_with(b"* OK") && !greeting.starts_with(b"* PREAUTH") {
            return Err(Error::Protocol(format!(
                "unexpected greeting: {}",
                response::trim_line(&greeting)
            )));
        }
        tracing::debug!(greeting = %response::trim_line(&greeting), "Connected");

        Ok(Self {
            stream: framed,
            tag_gen: TagGenerator::default(),
            state: NotAuthenticated,
        })
    }

    /// Authenticates with the server using LOGIN.
    ///
    /// Consumes self and returns an authenticated client on success.
    pub async fn login(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<S, Authenticated>> {
        let tag = self.tag_gen.next();
        let cmd = Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        }
        .serialize(&tag);

        self.stream.write_command(&cmd).await?;

        let responses = self.read_until_tagged(&tag).await?;
        Self::check_tagged_ok(&responses, &tag)?;
        tracing::debug!(username, "Logged in");

        Ok(Client {
            stream: self.stream,
            tag_gen: self.tag_gen,
            state: Authenticated,
        })
    }
}
