//! Parsed MIME message structure.

use crate::content_type::ContentType;
use crate::encoding::{decode_base64, decode_quoted_printable, decode_text};
use crate::error::{Error, Result};
use crate::header::Headers;

/// How deep nested multiparts are followed before parsing gives up.
const MAX_NESTING_DEPTH: usize = 16;

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit binary.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit, // Default (includes "7bit")
        }
    }
}

/// A leaf part of a parsed message.
///
/// For single-part messages the one leaf carries the message headers
/// themselves.
#[derive(Debug, Clone)]
pub struct Part {
    /// Part headers.
    pub headers: Headers,
    /// Part body (raw bytes, still transfer-encoded).
    pub body: Vec<u8>,
}

impl Part {
    /// Creates a new part.
    #[must_use]
    pub const fn new(headers: Headers, body: Vec<u8>) -> Self {
        Self { headers, body }
    }

    /// Gets the content type.
    ///
    /// # Errors
    ///
    /// Returns an error if the content type header is invalid.
    pub fn content_type(&self) -> Result<ContentType> {
        self.headers
            .get("content-type")
            .map_or_else(|| Ok(ContentType::text_plain()), ContentType::parse)
    }

    /// Gets the transfer encoding.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse)
    }

    /// Whether this part is declared as an attachment.
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        self.headers.get("content-disposition").is_some_and(|value| {
            value
                .split(';')
                .next()
                .is_some_and(|kind| kind.trim().eq_ignore_ascii_case("attachment"))
        })
    }

    /// Decodes the body according to the transfer encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails.
    pub fn decode_body(&self) -> Result<Vec<u8>> {
        match self.transfer_encoding() {
            TransferEncoding::Base64 => {
                let body_str = String::from_utf8_lossy(&self.body);
                // Servers wrap base64 bodies at 76 columns; strip all
                // whitespace before decoding.
                let cleaned: String = body_str.chars().filter(|c| !c.is_whitespace()).collect();
                decode_base64(&cleaned)
            }
            TransferEncoding::QuotedPrintable => {
                decode_quoted_printable(&String::from_utf8_lossy(&self.body))
            }
            _ => Ok(self.body.clone()),
        }
    }

    /// Gets the decoded body as text, honoring the part charset.
    ///
    /// Bytes that do not fit the declared charset are replaced rather
    /// than rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if transfer decoding fails or the content type
    /// header is invalid.
    pub fn text(&self) -> Result<String> {
        let decoded = self.decode_body()?;
        let content_type = self.content_type()?;
        Ok(decode_text(&decoded, content_type.charset()))
    }
}

/// A parsed MIME message.
///
/// `parts` always holds the flattened leaf parts in document order;
/// multipart containers are walked, never stored. A single-part message
/// is normalized to one leaf carrying the message headers.
#[derive(Debug, Clone)]
pub struct Message {
    /// Message headers.
    pub headers: Headers,
    /// Flattened leaf parts.
    pub parts: Vec<Part>,
}

impl Message {
    /// Parses a raw RFC 822 message.
    ///
    /// Headers are split from the body at the first blank line (CRLF or
    /// bare LF), multipart bodies are split on their declared boundary
    /// and nested multiparts are flattened into leaves. A part whose
    /// `Content-Type` header fails to parse is treated as a leaf.
    ///
    /// # Errors
    ///
    /// Returns an error if a multipart declares no boundary or the
    /// nesting is deeper than the supported limit.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let (header_text, body) = split_headers(raw);
        let headers = Headers::parse(&header_text);

        let mut parts = Vec::new();
        collect_leaf_parts(&headers, body, 0, &mut parts)?;

        Ok(Self { headers, parts })
    }

    /// Gets the content type.
    ///
    /// # Errors
    ///
    /// Returns an error if the content type header is invalid.
    pub fn content_type(&self) -> Result<ContentType> {
        self.headers
            .get("content-type")
            .map_or_else(|| Ok(ContentType::text_plain()), ContentType::parse)
    }

    /// Gets the From header.
    #[must_use]
    pub fn from(&self) -> Option<&str> {
        self.headers.get("from")
    }

    /// Gets the To header.
    #[must_use]
    pub fn to(&self) -> Option<&str> {
        self.headers.get("to")
    }

    /// Gets the Subject header.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.headers.get("subject")
    }

    /// Gets the Date header.
    #[must_use]
    pub fn date(&self) -> Option<&str> {
        self.headers.get("date")
    }

    /// Gets the Message-ID header.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.headers.get("message-id")
    }

    /// Gets the text of the first `text/plain` leaf that is not an
    /// attachment, or `None` if the message has no such part.
    ///
    /// # Errors
    ///
    /// Returns an error if the matching part cannot be decoded.
    pub fn plain_text(&self) -> Result<Option<String>> {
        for part in &self.parts {
            if part.is_attachment() {
                continue;
            }
            if part.content_type()?.is("text", "plain") {
                return part.text().map(Some);
            }
        }
        Ok(None)
    }

    /// Gets the text of the first `text/html` leaf that is not an
    /// attachment, or `None` if the message has no such part.
    ///
    /// # Errors
    ///
    /// Returns an error if the matching part cannot be decoded.
    pub fn html_text(&self) -> Result<Option<String>> {
        for part in &self.parts {
            if part.is_attachment() {
                continue;
            }
            if part.content_type()?.is("text", "html") {
                return part.text().map(Some);
            }
        }
        Ok(None)
    }

    /// Counts leaves declared as attachments.
    #[must_use]
    pub fn attachment_count(&self) -> usize {
        self.parts.iter().filter(|p| p.is_attachment()).count()
    }

    /// Whether any leaf is declared as an attachment.
    #[must_use]
    pub fn has_attachments(&self) -> bool {
        self.parts.iter().any(Part::is_attachment)
    }
}

/// Splits raw message bytes into header text and body at the first
/// blank line. Headers are decoded lossily; the body stays as bytes.
fn split_headers(raw: &[u8]) -> (String, &[u8]) {
    let crlf = find_subslice(raw, b"\r\n\r\n").map(|i| (i, i + 4));
    let lf = find_subslice(raw, b"\n\n").map(|i| (i, i + 2));

    let (header_end, body_start) = match (crlf, lf) {
        (Some(c), Some(l)) => {
            if c.0 <= l.0 {
                c
            } else {
                l
            }
        }
        (Some(c), None) => c,
        (None, Some(l)) => l,
        (None, None) => (raw.len(), raw.len()),
    };

    let header_text = String::from_utf8_lossy(&raw[..header_end]).into_owned();
    (header_text, &raw[body_start..])
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Walks one entity, descending into multiparts and pushing leaves.
fn collect_leaf_parts(
    headers: &Headers,
    body: &[u8],
    depth: usize,
    parts: &mut Vec<Part>,
) -> Result<()> {
    if depth > MAX_NESTING_DEPTH {
        return Err(Error::InvalidMultipart(format!(
            "Nesting deeper than {MAX_NESTING_DEPTH} levels"
        )));
    }

    // An unparsable content type makes this entity a leaf; the error
    // resurfaces if the part is actually read.
    let content_type = headers
        .get("content-type")
        .and_then(|raw| ContentType::parse(raw).ok())
        .unwrap_or_else(ContentType::text_plain);

    if content_type.is_multipart() {
        let boundary = content_type.boundary().ok_or(Error::MissingBoundary)?;
        for section in split_multipart(body, boundary) {
            let (header_text, section_body) = split_headers(section);
            let section_headers = Headers::parse(&header_text);
            collect_leaf_parts(&section_headers, section_body, depth + 1, parts)?;
        }
    } else {
        parts.push(Part::new(headers.clone(), body.to_vec()));
    }

    Ok(())
}

/// Splits a multipart body into its sections.
///
/// Content before the first delimiter (preamble) and after the closing
/// delimiter (epilogue) is dropped. An unterminated multipart keeps its
/// open section up to the end of input.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let open = format!("--{boundary}");
    let close = format!("--{boundary}--");

    let mut sections = Vec::new();
    let mut current: Option<usize> = None;
    let mut pos = 0;

    while pos < body.len() {
        let end = body[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(body.len(), |i| pos + i + 1);

        let mut line = &body[pos..end];
        if line.last() == Some(&b'\n') {
            line = &line[..line.len() - 1];
        }
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }

        if line == close.as_bytes() {
            if let Some(start) = current.take() {
                sections.push(trim_delimiter_newline(&body[start..pos]));
            }
            break;
        }
        if line == open.as_bytes() {
            if let Some(start) = current {
                sections.push(trim_delimiter_newline(&body[start..pos]));
            }
            current = Some(end);
        }

        pos = end;
    }

    if let Some(start) = current {
        sections.push(trim_delimiter_newline(&body[start..]));
    }

    sections
}

/// Removes the single line break that belongs to the following
/// delimiter line.
fn trim_delimiter_newline(section: &[u8]) -> &[u8] {
    section
        .strip_suffix(b"\r\n")
        .or_else(|| section.strip_suffix(b"\n"))
        .unwrap_or(section)
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
    fn test_transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse("7bit"), TransferEncoding::SevenBit);
        assert_eq!(TransferEncoding::parse("8bit"), TransferEncoding::EightBit);
        assert_eq!(TransferEncoding::parse("BASE64"), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::parse("quoted-printable"),
            TransferEncoding::QuotedPrintable
        );
        assert_eq!(TransferEncoding::parse("binary"), TransferEncoding::Binary);
        assert_eq!(
            TransferEncoding::parse("x-unknown"),
            TransferEncoding::SevenBit
        );
    }

    #[test]
    fn test_parse_single_part() {
        let raw = b"From: sender@example.com\r\n\
                    To: recipient@example.com\r\n\
                    Subject: Test Message\r\n\
                    Date: Mon, 9 Jun 2025 10:00:00 +0000\r\n\
                    Message-ID: <abc@example.com>\r\n\
                    \r\n\
                    Hello, World!";

        let message = Message::parse(raw).unwrap();
        assert_eq!(message.from(), Some("sender@example.com"));
        assert_eq!(message.to(), Some("recipient@example.com"));
        assert_eq!(message.subject(), Some("Test Message"));
        assert_eq!(message.date(), Some("Mon, 9 Jun 2025 10:00:00 +0000"));
        assert_eq!(message.message_id(), Some("<abc@example.com>"));
        assert_eq!(message.parts.len(), 1);
        assert_eq!(message.plain_text().unwrap().unwrap(), "Hello, World!");
        assert_eq!(message.attachment_count(), 0);
        assert!(!message.has_attachments());
    }

    #[test]
    fn test_parse_lf_line_endings() {
        let raw = b"Subject: unix mail\n\nbody line\n";
        let message = Message::parse(raw).unwrap();
        assert_eq!(message.subject(), Some("unix mail"));
        assert_eq!(message.plain_text().unwrap().unwrap(), "body line\n");
    }

    #[test]
    fn test_parse_no_content_type_defaults_to_plain() {
        let raw = b"Subject: untyped\r\n\r\nplain by default";
        let message = Message::parse(raw).unwrap();
        let ct = message.parts[0].content_type().unwrap();
        assert!(ct.is("text", "plain"));
    }

    #[test]
    fn test_parse_multipart_alternative() {
        let raw = b"From: billing@example.com\r\n\
                    Subject: Monthly Invoice #45\r\n\
                    Content-Type: multipart/alternative; boundary=\"sep\"\r\n\
                    \r\n\
                    This is a multi-part message in MIME format.\r\n\
                    --sep\r\n\
                    Content-Type: text/plain; charset=utf-8\r\n\
                    \r\n\
                    Your invoice is attached.\r\n\
                    --sep\r\n\
                    Content-Type: text/html; charset=utf-8\r\n\
                    \r\n\
                    <p>Your <b>invoice</b> is attached.</p>\r\n\
                    --sep--\r\n\
                    epilogue\r\n";

        let message = Message::parse(raw).unwrap();
        assert_eq!(message.parts.len(), 2);
        assert_eq!(
            message.plain_text().unwrap().unwrap(),
            "Your invoice is attached."
        );
        assert_eq!(
            message.html_text().unwrap().unwrap(),
            "<p>Your <b>invoice</b> is attached.</p>"
        );
        assert_eq!(message.attachment_count(), 0);
    }

    #[test]
    fn test_parse_multipart_with_attachment() {
        let raw = b"Content-Type: multipart/mixed; boundary=outer\r\n\
                    \r\n\
                    --outer\r\n\
                    Content-Type: text/plain\r\n\
                    \r\n\
                    See attachment.\r\n\
                    --outer\r\n\
                    Content-Type: application/pdf\r\n\
                    Content-Disposition: attachment; filename=\"invoice.pdf\"\r\n\
                    Content-Transfer-Encoding: base64\r\n\
                    \r\n\
                    JVBERi0xLjQ=\r\n\
                    --outer--\r\n";

        let message = Message::parse(raw).unwrap();
        assert_eq!(message.parts.len(), 2);
        assert!(message.has_attachments());
        assert_eq!(message.attachment_count(), 1);
        assert_eq!(message.plain_text().unwrap().unwrap(), "See attachment.");
        assert_eq!(
            message.parts[1].decode_body().unwrap(),
            b"%PDF-1.4".to_vec()
        );
    }

    #[test]
    fn test_parse_nested_multipart_flattens_leaves() {
        let raw = b"Content-Type: multipart/mixed; boundary=outer\r\n\
                    \r\n\
                    --outer\r\n\
                    Content-Type: multipart/alternative; boundary=inner\r\n\
                    \r\n\
                    --inner\r\n\
                    Content-Type: text/plain\r\n\
                    \r\n\
                    nested plain\r\n\
                    --inner\r\n\
                    Content-Type: text/html\r\n\
                    \r\n\
                    <p>nested html</p>\r\n\
                    --inner--\r\n\
                    --outer\r\n\
                    Content-Type: image/png\r\n\
                    Content-Disposition: attachment; filename=\"chart.png\"\r\n\
                    \r\n\
                    pngbytes\r\n\
                    --outer--\r\n";

        let message = Message::parse(raw).unwrap();
        assert_eq!(message.parts.len(), 3);
        assert_eq!(message.plain_text().unwrap().unwrap(), "nested plain");
        assert_eq!(message.html_text().unwrap().unwrap(), "<p>nested html</p>");
        assert_eq!(message.attachment_count(), 1);
    }

    #[test]
    fn test_inline_disposition_is_not_attachment() {
        let mut headers = Headers::new();
        headers.add("Content-Disposition", "inline; filename=\"logo.png\"");
        let part = Part::new(headers, Vec::new());
        assert!(!part.is_attachment());

        let mut headers = Headers::new();
        headers.add("Content-Disposition", "Attachment; filename=\"a.txt\"");
        let part = Part::new(headers, Vec::new());
        assert!(part.is_attachment());
    }

    #[test]
    fn test_base64_body_with_line_wrapping() {
        let raw = b"Content-Type: text/plain; charset=utf-8\r\n\
                    Content-Transfer-Encoding: base64\r\n\
                    \r\n\
                    SGVsbG8sIFdv\r\n\
                    cmxkIQ==\r\n";

        let message = Message::parse(raw).unwrap();
        assert_eq!(message.plain_text().unwrap().unwrap(), "Hello, World!");
    }

    #[test]
    fn test_quoted_printable_latin1_body() {
        let raw = b"Content-Type: text/plain; charset=iso-8859-1\r\n\
                    Content-Transfer-Encoding: quoted-printable\r\n\
                    \r\n\
                    caf=E9 premi=E8re";

        let message = Message::parse(raw).unwrap();
        assert_eq!(message.plain_text().unwrap().unwrap(), "caf\u{e9} premi\u{e8}re");
    }

    #[test]
    fn test_html_only_message() {
        let raw = b"Content-Type: text/html\r\n\r\n<p>only html</p>";
        let message = Message::parse(raw).unwrap();
        assert!(message.plain_text().unwrap().is_none());
        assert_eq!(message.html_text().unwrap().unwrap(), "<p>only html</p>");
    }

    #[test]
    fn test_multipart_without_boundary_fails() {
        let raw = b"Content-Type: multipart/mixed\r\n\r\nbody";
        let err = Message::parse(raw).unwrap_err();
        assert!(matches!(err, Error::MissingBoundary));
    }

    #[test]
    fn test_unterminated_multipart_keeps_open_section() {
        let raw = b"Content-Type: multipart/mixed; boundary=sep\r\n\
                    \r\n\
                    --sep\r\n\
                    Content-Type: text/plain\r\n\
                    \r\n\
                    truncated transfer";

        let message = Message::parse(raw).unwrap();
        assert_eq!(message.parts.len(), 1);
        assert_eq!(
            message.plain_text().unwrap().unwrap(),
            "truncated transfer"
        );
    }

    #[test]
    fn test_malformed_content_type_becomes_leaf() {
        let raw = b"Content-Type: broken\r\n\r\nstill readable";
        let message = Message::parse(raw).unwrap();
        assert_eq!(message.parts.len(), 1);
        // Reading the leaf surfaces the content type error.
        assert!(message.parts[0].content_type().is_err());
        assert!(message.plain_text().is_err());
    }

    #[test]
    fn test_nesting_depth_limited() {
        let mut raw = String::new();
        let mut boundaries = Vec::new();
        for depth in 0..20 {
            let boundary = format!("b{depth}");
            raw.push_str(&format!(
                "Content-Type: multipart/mixed; boundary={boundary}\r\n\r\n--{boundary}\r\n"
            ));
            boundaries.push(boundary);
        }
        raw.push_str("Content-Type: text/plain\r\n\r\ndeep\r\n");
        for boundary in boundaries.iter().rev() {
            raw.push_str(&format!("--{boundary}--\r\n"));
        }

        let err = Message::parse(raw.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::InvalidMultipart(_)));
    }

    #[test]
    fn test_parse_empty_input() {
        let message = Message::parse(b"").unwrap();
        assert_eq!(message.parts.len(), 1);
        assert_eq!(message.plain_text().unwrap().unwrap(), "");
    }

    #[test]
    fn test_split_multipart_ignores_preamble_and_epilogue() {
        let body = b"preamble text\r\n\
                     --sep\r\n\
                     first\r\n\
                     --sep\r\n\
                     second\r\n\
                     --sep--\r\n\
                     epilogue text\r\n";

        let sections = split_multipart(body, "sep");
        assert_eq!(sections, vec![b"first".as_slice(), b"second".as_slice()]);
    }
}
