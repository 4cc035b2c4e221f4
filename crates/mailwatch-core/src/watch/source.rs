//! Mail sources.
//!
//! The pipeline talks to a mailbox through the [`MailSession`] and
//! [`SessionFactory`] traits. Production uses the TLS IMAP implementation;
//! tests substitute scripted fakes.

use std::future::Future;
use std::time::Duration;

use mailwatch_imap::{Client, ImapStream, SearchCriteria, Selected, connect_tls};
use tokio::time::timeout;
use tracing::debug;

use crate::account::AccountConfig;
use crate::error::{Error, Result};

/// Bound applied around every network operation.
pub const NETWORK_TIMEOUT: Duration = Duration::from_secs(30);

/// An open protocol session on a selected folder.
pub trait MailSession: Send {
    /// Liveness probe.
    fn noop(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Sequence ids matching the criteria.
    fn search(
        &mut self,
        criteria: &SearchCriteria,
    ) -> impl Future<Output = Result<Vec<u32>>> + Send;

    /// Full message content, or `None` when the id vanished between search
    /// and fetch.
    fn fetch(&mut self, seq: u32) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Orderly logout.
    fn logout(self) -> impl Future<Output = Result<()>> + Send;
}

/// Opens sessions for account configurations.
pub trait SessionFactory: Send + Sync {
    /// Session type produced by this factory.
    type Session: MailSession;

    /// Connect, authenticate and select the configured folder.
    fn open(
        &self,
        config: &AccountConfig,
    ) -> impl Future<Output = Result<Self::Session>> + Send;
}

/// Production session over TLS IMAP.
#[derive(Debug)]
pub struct TlsSession {
    client: Client<ImapStream, Selected>,
}

impl MailSession for TlsSession {
    async fn noop(&mut self) -> Result<()> {
        timeout(NETWORK_TIMEOUT, self.client.noop())
            .await
            .map_err(|_| Error::Connection("NOOP timed out".to_string()))?
            .map_err(|e| Error::Connection(e.to_string()))
    }

    async fn search(&mut self, criteria: &SearchCriteria) -> Result<Vec<u32>> {
        timeout(NETWORK_TIMEOUT, self.client.search(criteria))
            .await
            .map_err(|_| Error::Connection("SEARCH timed out".to_string()))?
            .map_err(|e| Error::Connection(e.to_string()))
    }

    async fn fetch(&mut self, seq: u32) -> Result<Option<Vec<u8>>> {
        timeout(NETWORK_TIMEOUT, self.client.fetch_message(seq))
            .await
            .map_err(|_| Error::Connection("FETCH timed out".to_string()))?
            .map_err(|e| Error::Connection(e.to_string()))
    }

    async fn logout(self) -> Result<()> {
        timeout(NETWORK_TIMEOUT, self.client.logout())
            .await
            .map_err(|_| Error::Connection("LOGOUT timed out".to_string()))?
            .map_err(|e| Error::Connection(e.to_string()))
    }
}

/// Factory producing [`TlsSession`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct TlsSessionFactory;

impl SessionFactory for TlsSessionFactory {
    type Session = TlsSession;

    async fn open(&self, config: &AccountConfig) -> Result<TlsSession> {
        let stream = timeout(NETWORK_TIMEOUT, connect_tls(&config.host, config.port))
            .await
            .map_err(|_| Error::Connection(format!("connect to {} timed out", config.host)))?
            .map_err(|e| Error::Connection(e.to_string()))?;

        let client = timeout(NETWORK_TIMEOUT, Client::from_stream(stream))
            .await
            .map_err(|_| Error::Connection("server greeting timed out".to_string()))?
            .map_err(|e| Error::Connection(e.to_string()))?;

        let client = timeout(
            NETWORK_TIMEOUT,
            client.login(&config.login, config.secret.expose()),
        )
        .await
        .map_err(|_| Error::Connection("LOGIN timed out".to_string()))?
        .map_err(|e| Error::Authentication(e.to_string()))?;

        let client = timeout(NETWORK_TIMEOUT, client.select(&config.folder))
            .await
            .map_err(|_| Error::Connection(format!("SELECT {} timed out", config.folder)))?
            .map_err(|e| Error::FolderSelection(e.to_string()))?;

        debug!(host = %config.host, folder = %config.folder, "session established");
        Ok(TlsSession { client })
    }
}
