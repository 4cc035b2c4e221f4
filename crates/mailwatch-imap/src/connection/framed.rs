//! Framed I/O for the IMAP protocol.
//!
//! IMAP is line-oriented with CRLF terminators, except that a line may
//! announce a literal `{n}\r\n` and continue with n raw bytes. This module
//! provides buffered reading that reassembles complete responses, literals
//! included, and buffered command writing.

#![allow(clippy::missing_errors_doc)]

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::Result;

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum line length to prevent memory exhaustion.
const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Maximum literal size. Caps how large a fetched message may be.
const MAX_LITERAL_SIZE: usize = 32 * 1024 * 1024; // 32 MB

/// Framed connection for the IMAP protocol.
pub struct FramedStream<S> {
    reader: BufReader<S>,
    write_buffer: BytesMut,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new framed stream.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
            write_buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
        }
    }

    /// Reads a complete response, following any embedded literals.
    ///
    /// After a literal the server continues the same logical response on
    /// the next line, so reading loops until a line ends without a
    /// literal announcement.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        let mut response = Vec::new();

        loop {
            let line = self.read_line().await?;
            response.extend_from_slice(&line);

            let Some(literal_len) = parse_literal_length(&line) else {
                break;
            };

            if literal_len > MAX_LITERAL_SIZE {
                return Err(crate::Error::Protocol(format!(
                    "literal too large: {literal_len} bytes (max {MAX_LITERAL_SIZE})"
                )));
            }

            let mut literal = vec![0u8; literal_len];
            self.reader.read_exact(&mut literal).await?;
            response.extend_from_slice(&literal);
        }

        Ok(response)
    }

    /// Reads a single CRLF-terminated line.
    async fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();

        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(crate::Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }

            if let Some(pos) = find_crlf(buf) {
                line.extend_from_slice(&buf[..pos + 2]);
                self.reader.consume(pos + 2);
                break;
            }

            let len = buf.len();
            line.extend_from_slice(buf);
            self.reader.consume(len);

            if line.len() > MAX_LINE_LENGTH {
                return Err(crate::Error::Protocol("line too long".to_string()));
            }
        }

        Ok(line)
    }

    /// Writes a serialized command and flushes the stream.
    pub async fn write_command(&mut self, data: &[u8]) -> Result<()> {
        self.write_buffer.clear();
        self.write_buffer.extend_from_slice(data);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buffer).await?;
        stream.flush().await?;

        Ok(())
    }
}

/// Finds the position of CRLF in a buffer.
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Parses a literal length from the end of a line.
///
/// Matches `{123}\r\n` and the non-synchronizing form `{123+}\r\n`.
fn parse_literal_length(line: &[u8]) -> Option<usize> {
    if !line.ends_with(b"\r\n") {
        return None;
    }

    let line = &line[..line.len() - 2];
    let open = line.iter().rposition(|&b| b == b'{')?;

    if !line.ends_with(b"}") && !line.ends_with(b"+}") {
        return None;
    }

    let num_start = open + 1;
    let num_end = if line.ends_with(b"+}") {
        line.len() - 2
    } else {
        line.len() - 1
    };

    let num_str = std::str::from_utf8(&line[num_start..num_end]).ok()?;
    num_str.parse().ok()
}

/// Accumulates responses until the tagged completion line arrives.
pub struct ResponseAccumulator {
    tag: String,
    responses: Vec<Vec<u8>>,
}

impl ResponseAccumulator {
    /// Creates a new response accumulator for the given tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            responses: Vec::new(),
        }
    }

    /// Reads responses until one starts with our tag followed by a space.
    pub async fn read_until_tagged<S>(
        &mut self,
        framed: &mut FramedStream<S>,
    ) -> Result<Vec<Vec<u8>>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let response = framed.read_response().await?;

            let is_tagged = response
                .get(..self.tag.len())
                .is_some_and(|prefix| prefix == self.tag.as_bytes())
                && response.get(self.tag.len()).is_some_and(|&b| b == b' ');

            self.responses.push(response);

            if is_tagged {
                break;
            }
        }

        Ok(std::mem::take(&mut self.responses))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_find_crlf() {
        assert_eq!(find_crlf(b"a b c\r\n"), Some(5));
        assert_eq!(find_crlf(b"\r\n"), Some(0));
        assert_eq!(find_crlf(b"bare text"), None);
        assert_eq!(find_crlf(b"lf only\n"), None);
        assert_eq!(find_crlf(b"cr only\r"), None);
    }

    #[test]
    fn test_parse_literal_length() {
        assert_eq!(parse_literal_length(b"* 1 FETCH (RFC822 {42}\r\n"), Some(42));
        assert_eq!(parse_literal_length(b"* 1 FETCH (RFC822 {42+}\r\n"), Some(42));
        assert_eq!(parse_literal_length(b"{0}\r\n"), Some(0));
        assert_eq!(parse_literal_length(b"plain line\r\n"), None);
        assert_eq!(parse_literal_length(b"unterminated {42"), None);
        assert_eq!(parse_literal_length(b"not a number {x}\r\n"), None);
    }

    #[tokio::test]
    async fn test_read_simple_line() {
        use tokio_test::io::Builder;

        let mock = Builder::new().read(b"* OK ready\r\n").build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* OK ready\r\n");
    }

    #[tokio::test]
    async fn test_read_with_literal() {
        use tokio_test::io::Builder;

        let mock = Builder::new()
            .read(b"* 3 FETCH (RFC822 {7}\r\n")
            .read(b"message)\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* 3 FETCH (RFC822 {7}\r\nmessage)\r\n");
    }

    #[tokio::test]
    async fn test_write_command() {
        use tokio_test::io::Builder;

        let mock = Builder::new().write(b"A001 NOOP\r\n").build();
        let mut framed = FramedStream::new(mock);

        framed.write_command(b"A001 NOOP\r\n").await.unwrap();
    }

    #[tokio::test]
    async fn test_response_accumulator() {
        use tokio_test::io::Builder;

        let mock = Builder::new()
            .read(b"* SEARCH 2 5\r\n")
            .read(b"* 7 EXISTS\r\n")
            .read(b"A001 OK SEARCH completed\r\n")
            .build();

        let mut framed = FramedStream::new(mock);
        let mut accumulator = ResponseAccumulator::new("A001");

        let responses = accumulator.read_until_tagged(&mut framed).await.unwrap();

        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0], b"* SEARCH 2 5\r\n");
        assert_eq!(responses[1], b"* 7 EXISTS\r\n");
        assert_eq!(responses[2], b"A001 OK SEARCH completed\r\n");
    }

    #[tokio::test]
    async fn test_accumulator_requires_space_after_tag() {
        use tokio_test::io::Builder;

        // A0010 must not terminate the accumulator waiting on A001.
        let mock = Builder::new()
            .read(b"A0010 OK other command\r\n")
            .read(b"A001 OK done\r\n")
            .build();

        let mut framed = FramedStream::new(mock);
        let mut accumulator = ResponseAccumulator::new("A001");

        let responses = accumulator.read_until_tagged(&mut framed).await.unwrap();
        assert_eq!(responses.len(), 2);
    }

    #[tokio::test]
    async fn test_oversized_literal_rejected() {
        use tokio_test::io::Builder;

        let literal_size = MAX_LITERAL_SIZE + 1;
        let header = format!("* 1 FETCH (RFC822 {{{literal_size}}}\r\n");

        let mock = Builder::new().read(header.as_bytes()).build();
        let mut framed = FramedStream::new(mock);

        let result = framed.read_response().await;
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("literal too large")
        );
    }

    #[tokio::test]
    async fn test_line_length_limit() {
        use tokio_test::io::Builder;

        let long_line = "X".repeat(MAX_LINE_LENGTH + 100);
        let mock = Builder::new().read(long_line.as_bytes()).build();
        let mut framed = FramedStream::new(mock);

        let result = framed.read_response().await;
        assert!(result.unwrap_err().to_string().contains("line too long"));
    }
}
