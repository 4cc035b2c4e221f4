//! Integration tests for the IMAP client.
//!
//! These tests use a mock stream that replays scripted server responses
//! and records every command the client writes, so full poll sessions
//! can be exercised without a real server.

use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use mailwatch_imap::{Client, Error, SearchCriteria};

/// Mock stream that returns predefined responses and captures writes.
struct MockStream {
    /// Responses to return (in order).
    responses: Cursor<Vec<u8>>,
    /// Commands sent by the client, shared so tests can inspect them
    /// after the client has been consumed.
    sent: Arc<Mutex<Vec<u8>>>,
}

impl MockStream {
    fn new(responses: &[u8]) -> (Self, Arc<Mutex<Vec<u8>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let stream = Self {
            responses: Cursor::new(responses.to_vec()),
            sent: Arc::clone(&sent),
        };
        (stream, sent)
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let data = self.responses.get_ref();
        let pos = self.responses.position() as usize;

        if pos >= data.len() {
            return Poll::Ready(Ok(()));
        }

        let remaining = &data[pos..];
        let to_read = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..to_read]);
        self.responses.set_position((pos + to_read) as u64);

        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.sent.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn sent_text(sent: &Arc<Mutex<Vec<u8>>>) -> String {
    String::from_utf8(sent.lock().unwrap().clone()).unwrap()
}

#[tokio::test]
async fn test_greeting_ok() {
    let (stream, _sent) = MockStream::new(b"* OK IMAP4rev1 Service Ready\r\n");
    let client = Client::from_stream(stream).await;
    assert!(client.is_ok());
}

#[tokio::test]
async fn test_greeting_bye() {
    let (stream, _sent) = MockStream::new(b"* BYE too many connections\r\n");
    let err = Client::from_stream(stream).await.unwrap_err();
    assert!(matches!(err, Error::Bye(_)));
}

#[tokio::test]
async fn test_login_success() {
    let script = b"* OK ready\r\n\
                   A0000 OK LOGIN completed\r\n";
    let (stream, sent) = MockStream::new(script);

    let client = Client::from_stream(stream).await.unwrap();
    let client = client.login("user@example.com", "secret").await.unwrap();
    drop(client);

    assert_eq!(sent_text(&sent), "A0000 LOGIN user@example.com secret\r\n");
}

#[tokio::test]
async fn test_login_rejected() {
    let script = b"* OK ready\r\n\
                   A0000 NO [AUTHENTICATIONFAILED] invalid credentials\r\n";
    let (stream, _sent) = MockStream::new(script);

    let client = Client::from_stream(stream).await.unwrap();
    let err = client.login("user@example.com", "wrong").await.unwrap_err();

    match err {
        Error::No(text) => assert!(text.contains("AUTHENTICATIONFAILED")),
        other => panic!("expected NO error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_select_records_exists() {
    let script = b"* OK ready\r\n\
                   A0000 OK LOGIN completed\r\n\
                   * 17 EXISTS\r\n\
                   * 2 RECENT\r\n\
                   A0001 OK [READ-WRITE] SELECT completed\r\n";
    let (stream, _sent) = MockStream::new(script);

    let client = Client::from_stream(stream).await.unwrap();
    let client = client.login("user@example.com", "secret").await.unwrap();
    let client = client.select("INBOX").await.unwrap();

    assert_eq!(client.mailbox(), "INBOX");
    assert_eq!(client.exists(), 17);
}

#[tokio::test]
async fn test_select_unknown_mailbox() {
    let script = b"* OK ready\r\n\
                   A0000 OK LOGIN completed\r\n\
                   A0001 NO no such mailbox\r\n";
    let (stream, _sent) = MockStream::new(script);

    let client = Client::from_stream(stream).await.unwrap();
    let client = client.login("user@example.com", "secret").await.unwrap();
    let err = client.select("Missing").await.unwrap_err();
    assert!(matches!(err, Error::No(_)));
}

#[tokio::test]
async fn test_search_returns_ids() {
    let script = b"* OK ready\r\n\
                   A0000 OK LOGIN completed\r\n\
                   * 5 EXISTS\r\n\
                   A0001 OK SELECT completed\r\n\
                   * SEARCH 2 4 5\r\n\
                   A0002 OK SEARCH completed\r\n";
    let (stream, sent) = MockStream::new(script);

    let client = Client::from_stream(stream).await.unwrap();
    let client = client.login("user@example.com", "secret").await.unwrap();
    let mut client = client.select("INBOX").await.unwrap();

    let criteria = SearchCriteria::And(vec![
        SearchCriteria::Unseen,
        SearchCriteria::Since("10-Jun-2025".to_string()),
    ]);
    let ids = client.search(&criteria).await.unwrap();

    assert_eq!(ids, vec![2, 4, 5]);
    assert!(sent_text(&sent).contains("A0002 SEARCH UNSEEN SINCE 10-Jun-2025\r\n"));
}

#[tokio::test]
async fn test_search_no_matches() {
    let script = b"* OK ready\r\n\
                   A0000 OK LOGIN completed\r\n\
                   A0001 OK SELECT completed\r\n\
                   * SEARCH\r\n\
                   A0002 OK SEARCH completed\r\n";
    let (stream, _sent) = MockStream::new(script);

    let client = Client::from_stream(stream).await.unwrap();
    let client = client.login("user@example.com", "secret").await.unwrap();
    let mut client = client.select("INBOX").await.unwrap();

    let ids = client.search(&SearchCriteria::Unseen).await.unwrap();
    assert!(ids.is_empty());
}

#[tokio::test]
async fn test_fetch_message_literal() {
    let raw = b"Subject: hi\r\n\r\nbody";
    let script = format!(
        "* OK ready\r\n\
         A0000 OK LOGIN completed\r\n\
         A0001 OK SELECT completed\r\n\
         * 3 FETCH (RFC822 {{{}}}\r\n",
        raw.len()
    );
    let mut script = script.into_bytes();
    script.extend_from_slice(raw);
    script.extend_from_slice(b")\r\nA0002 OK FETCH completed\r\n");

    let (stream, sent) = MockStream::new(&script);

    let client = Client::from_stream(stream).await.unwrap();
    let client = client.login("user@example.com", "secret").await.unwrap();
    let mut client = client.select("INBOX").await.unwrap();

    let body = client.fetch_message(3).await.unwrap();
    assert_eq!(body.as_deref(), Some(&raw[..]));
    assert!(sent_text(&sent).contains("A0002 FETCH 3 (RFC822)\r\n"));
}

#[tokio::test]
async fn test_fetch_expunged_message() {
    // Server completes the FETCH without data when the message is gone.
    let script = b"* OK ready\r\n\
                   A0000 OK LOGIN completed\r\n\
                   A0001 OK SELECT completed\r\n\
                   A0002 OK FETCH completed\r\n";
    let (stream, _sent) = MockStream::new(script);

    let client = Client::from_stream(stream).await.unwrap();
    let client = client.login("user@example.com", "secret").await.unwrap();
    let mut client = client.select("INBOX").await.unwrap();

    let body = client.fetch_message(99).await.unwrap();
    assert!(body.is_none());
}

#[tokio::test]
async fn test_noop_and_logout() {
    let script = b"* OK ready\r\n\
                   A0000 OK LOGIN completed\r\n\
                   A0001 OK SELECT completed\r\n\
                   A0002 OK NOOP completed\r\n\
                   * BYE logging out\r\n\
                   A0003 OK LOGOUT completed\r\n";
    let (stream, sent) = MockStream::new(script);

    let client = Client::from_stream(stream).await.unwrap();
    let client = client.login("user@example.com", "secret").await.unwrap();
    let mut client = client.select("INBOX").await.unwrap();

    client.noop().await.unwrap();
    client.logout().await.unwrap();

    let wire = sent_text(&sent);
    assert!(wire.contains("A0002 NOOP\r\n"));
    assert!(wire.ends_with("A0003 LOGOUT\r\n"));
}

#[tokio::test]
async fn test_noop_detects_dead_connection() {
    // Script ends before the NOOP response, simulating a dropped link.
    let script = b"* OK ready\r\n\
                   A0000 OK LOGIN completed\r\n\
                   A0001 OK SELECT completed\r\n";
    let (stream, _sent) = MockStream::new(script);

    let client = Client::from_stream(stream).await.unwrap();
    let client = client.login("user@example.com", "secret").await.unwrap();
    let mut client = client.select("INBOX").await.unwrap();

    let err = client.noop().await.unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}
