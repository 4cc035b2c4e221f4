//! MIME decoding utilities.
//!
//! Supports Base64 and Quoted-Printable transfer decoding, charset
//! conversion, and RFC 2047 encoded-word decoding for headers. Only the
//! decode direction is implemented; this crate never generates mail.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Decodes Base64 data.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    STANDARD.decode(data).map_err(Into::into)
}

/// Decodes Quoted-Printable text (RFC 2045) to raw bytes.
///
/// Soft line breaks (`=` at end of line) are removed. Charset conversion
/// is left to the caller since the bytes may be in any encoding.
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences.
pub fn decode_quoted_printable(text: &str) -> Result<Vec<u8>> {
    let bytes = text.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'=' {
            // Soft line break: =\r\n or =\n
            if bytes.get(i + 1) == Some(&b'\r') && bytes.get(i + 2) == Some(&b'\n') {
                i += 3;
                continue;
            }
            if bytes.get(i + 1) == Some(&b'\n') {
                i += 2;
                continue;
            }

            let hex = bytes.get(i + 1..i + 3).ok_or_else(|| {
                Error::InvalidEncoding("Incomplete escape sequence".to_string())
            })?;
            let hex = std::str::from_utf8(hex)
                .map_err(|_| Error::InvalidEncoding("Invalid escape sequence".to_string()))?;
            let byte = u8::from_str_radix(hex, 16)
                .map_err(|e| Error::InvalidEncoding(format!("Invalid hex: {e}")))?;
            result.push(byte);
            i += 3;
        } else {
            result.push(bytes[i]);
            i += 1;
        }
    }

    Ok(result)
}

/// Decodes bytes in the given charset to a string, lossily.
///
/// The charset label is looked up per the WHATWG encoding rules, which
/// cover the labels seen in real mail (utf-8, iso-8859-*, windows-125x,
/// koi8-r, ...). Unknown or missing labels fall back to UTF-8.
/// Malformed sequences become replacement characters instead of errors.
#[must_use]
pub fn decode_text(data: &[u8], charset: Option<&str>) -> String {
    let encoding = charset
        .and_then(|label| encoding_rs::Encoding::for_label(label.trim().as_bytes()))
        .unwrap_or(encoding_rs::UTF_8);
    let (text, _, _) = encoding.decode(data);
    text.into_owned()
}

/// Decodes all RFC 2047 encoded words in a header value.
///
/// Encoded words have the form `=?charset?encoding?encoded-text?=` and
/// may appear anywhere in the value, mixed with plain text. Whitespace
/// between two adjacent encoded words is elided per RFC 2047. Tokens
/// that fail to decode are kept verbatim so a malformed header never
/// aborts processing.
#[must_use]
pub fn decode_encoded_words(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut rest = value;
    let mut previous_was_encoded = false;

    while let Some(start) = rest.find("=?") {
        let plain = &rest[..start];
        // Whitespace separating two encoded words is not part of the text.
        if !(previous_was_encoded && plain.chars().all(char::is_whitespace)) {
            result.push_str(plain);
        }

        match parse_encoded_word(&rest[start..]) {
            Some((decoded, consumed)) => {
                result.push_str(&decoded);
                rest = &rest[start + consumed..];
                previous_was_encoded = true;
            }
            None => {
                // Not a valid encoded word, keep the marker as text.
                result.push_str("=?");
                rest = &rest[start + 2..];
                previous_was_encoded = false;
            }
        }
    }

    result.push_str(rest);
    result
}

/// Parses one encoded word at the start of `text`.
///
/// Returns the decoded string and the number of bytes consumed.
fn parse_encoded_word(text: &str) -> Option<(String, usize)> {
    let inner = text.strip_prefix("=?")?;

    let charset_end = inner.find('?')?;
    let charset = &inner[..charset_end];

    let encoding_start = charset_end + 1;
    let encoding_end = encoding_start + inner[encoding_start..].find('?')?;
    let encoding = &inner[encoding_start..encoding_end];

    let payload_start = encoding_end + 1;
    let payload_end = payload_start + inner[payload_start..].find("?=")?;
    let payload = &inner[payload_start..payload_end];

    let bytes = if encoding.eq_ignore_ascii_case("B") {
        decode_base64(payload).ok()?
    } else if encoding.eq_ignore_ascii_case("Q") {
        // In Q encoding an underscore stands for a space.
        decode_quoted_printable(&payload.replace('_', " ")).ok()?
    } else {
        return None;
    };

    let consumed = 2 + payload_end + 2;
    Some((decode_text(&bytes, Some(charset)), consumed))
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
    fn test_base64_decode() {
        let decoded = decode_base64("SGVsbG8sIFdvcmxkIQ==").unwrap();
        assert_eq!(decoded, b"Hello, World!");
    }

    #[test]
    fn test_base64_invalid() {
        assert!(decode_base64("not base64!!!").is_err());
    }

    #[test]
    fn test_quoted_printable_plain() {
        let decoded = decode_quoted_printable("Hello, World!").unwrap();
        assert_eq!(decoded, b"Hello, World!");
    }

    #[test]
    fn test_quoted_printable_escapes() {
        let decoded = decode_quoted_printable("H=C3=A9llo").unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), "Héllo");
    }

    #[test]
    fn test_quoted_printable_soft_break() {
        let decoded = decode_quoted_printable("Hello=\r\nWorld").unwrap();
        assert_eq!(decoded, b"HelloWorld");

        let decoded = decode_quoted_printable("Hello=\nWorld").unwrap();
        assert_eq!(decoded, b"HelloWorld");
    }

    #[test]
    fn test_quoted_printable_incomplete_escape() {
        assert!(decode_quoted_printable("broken=A").is_err());
        assert!(decode_quoted_printable("broken=").is_err());
    }

    #[test]
    fn test_decode_text_utf8() {
        assert_eq!(decode_text("Привет".as_bytes(), Some("utf-8")), "Привет");
    }

    #[test]
    fn test_decode_text_latin1() {
        assert_eq!(decode_text(&[0x48, 0xE9, 0x6C, 0x6C, 0x6F], Some("iso-8859-1")), "Héllo");
    }

    #[test]
    fn test_decode_text_koi8r() {
        // "да" in KOI8-R
        assert_eq!(decode_text(&[0xC4, 0xC1], Some("koi8-r")), "да");
    }

    #[test]
    fn test_decode_text_unknown_charset_falls_back() {
        assert_eq!(decode_text(b"plain", Some("x-no-such-charset")), "plain");
    }

    #[test]
    fn test_decode_text_invalid_utf8_is_lossy() {
        let decoded = decode_text(&[0x61, 0xFF, 0x62], None);
        assert_eq!(decoded, "a\u{FFFD}b");
    }

    #[test]
    fn test_encoded_word_base64() {
        assert_eq!(decode_encoded_words("=?utf-8?B?SMOpbGxv?="), "Héllo");
    }

    #[test]
    fn test_encoded_word_q() {
        assert_eq!(decode_encoded_words("=?utf-8?Q?H=C3=A9llo_there?="), "Héllo there");
    }

    #[test]
    fn test_encoded_word_mixed_with_plain() {
        assert_eq!(
            decode_encoded_words("Re: =?utf-8?B?U8O8bW1hcnk=?= (fwd)"),
            "Re: Sümmary (fwd)"
        );
    }

    #[test]
    fn test_adjacent_encoded_words_elide_whitespace() {
        let value = "=?utf-8?B?0J/RgNC40LLQtdGC?= =?utf-8?B?INC80LjRgA==?=";
        assert_eq!(decode_encoded_words(value), "Привет мир");
    }

    #[test]
    fn test_plain_value_passes_through() {
        assert_eq!(decode_encoded_words("Monthly Invoice #45"), "Monthly Invoice #45");
    }

    #[test]
    fn test_malformed_token_kept_verbatim() {
        assert_eq!(decode_encoded_words("=?utf-8?X?abc?="), "=?utf-8?X?abc?=");
        assert_eq!(decode_encoded_words("price =? quantity"), "price =? quantity");
    }

    #[test]
    fn test_encoded_word_koi8r_subject() {
        // "Тест" base64-encoded in KOI8-R
        assert_eq!(decode_encoded_words("=?koi8-r?B?9MXT1A==?="), "Тест");
    }
}
