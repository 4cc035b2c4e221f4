//! Minimal IMAP response reading.
//!
//! A polling client only consumes a handful of response shapes: the tagged
//! completion line, `* SEARCH` id lists, `* n EXISTS` counts and FETCH
//! responses carrying a message literal. These helpers classify raw
//! response bytes without any I/O so they can be tested in isolation.

/// Status of a tagged completion response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaggedStatus {
    /// Command completed successfully.
    Ok,
    /// Command failed (server NO).
    No,
    /// Command was rejected as invalid (server BAD).
    Bad,
    /// Server is closing the connection.
    Bye,
}

/// Parses a tagged completion line for the given tag.
///
/// Returns the status and the human-readable text after it, or `None`
/// if the line is not a tagged response for `tag`.
#[must_use]
pub fn parse_tagged(line: &[u8], tag: &str) -> Option<(TaggedStatus, String)> {
    let rest = line.strip_prefix(tag.as_bytes())?;
    let rest = rest.strip_prefix(b" ")?;

    let (word, text) = match rest.iter().position(|&b| b == b' ') {
        Some(pos) => (&rest[..pos], &rest[pos + 1..]),
        None => (rest, &[][..]),
    };

    let status = if word.eq_ignore_ascii_case(b"OK") {
        TaggedStatus::Ok
    } else if word.eq_ignore_ascii_case(b"NO") {
        TaggedStatus::No
    } else if word.eq_ignore_ascii_case(b"BAD") {
        TaggedStatus::Bad
    } else if word.eq_ignore_ascii_case(b"BYE") {
        TaggedStatus::Bye
    } else {
        return None;
    };

    Some((status, trim_line(text)))
}

/// Parses an untagged `* SEARCH` response into message sequence numbers.
///
/// Returns `Some(vec![])` for a SEARCH response with no hits and `None`
/// when the line is some other response.
#[must_use]
pub fn parse_search_ids(line: &[u8]) -> Option<Vec<u32>> {
    let rest = strip_untagged(line)?;
    let rest = if rest.eq_ignore_ascii_case(b"SEARCH") {
        &[][..]
    } else if rest.len() >= 7 && rest[..7].eq_ignore_ascii_case(b"SEARCH ") {
        &rest[7..]
    } else {
        return None;
    };

    let text = std::str::from_utf8(rest).ok()?;
    let mut ids = Vec::new();
    for token in text.split_ascii_whitespace() {
        ids.push(token.parse().ok()?);
    }
    Some(ids)
}

/// Parses an untagged `* n EXISTS` response.
#[must_use]
pub fn parse_exists(line: &[u8]) -> Option<u32> {
    let rest = strip_untagged(line)?;
    let text = std::str::from_utf8(rest).ok()?;
    let (count, keyword) = text.split_once(' ')?;
    if keyword.trim().eq_ignore_ascii_case("EXISTS") {
        count.parse().ok()
    } else {
        None
    }
}

/// Extracts the message literal from an untagged FETCH response.
///
/// FETCH data arrives as `* n FETCH (RFC822 {len}\r\n<len bytes>)\r\n`.
/// Returns the literal bytes, or `None` if the response is not a FETCH
/// or carries no literal.
#[must_use]
pub fn extract_fetch_literal(response: &[u8]) -> Option<Vec<u8>> {
    let rest = strip_untagged(response)?;

    // The first atom must be a sequence number followed by FETCH.
    let space = rest.iter().position(|&b| b == b' ')?;
    if !rest[..space].iter().all(u8::is_ascii_digit) {
        return None;
    }
    if !(rest[space + 1..].len() >= 5 && rest[space + 1..][..5].eq_ignore_ascii_case(b"FETCH")) {
        return None;
    }

    // Locate the literal header {len}\r\n and slice out the payload.
    let open = response.iter().position(|&b| b == b'{')?;
    let close = open + response[open..].iter().position(|&b| b == b'}')?;
    let len: usize = std::str::from_utf8(&response[open + 1..close])
        .ok()?
        .parse()
        .ok()?;

    let start = close + 3; // skip }\r\n
    if response.len() < start + len || !response[close + 1..].starts_with(b"\r\n") {
        return None;
    }
    Some(response[start..start + len].to_vec())
}

/// Decodes a response line for log or error text, trimming the CRLF.
#[must_use]
pub fn trim_line(line: &[u8]) -> String {
    String::from_utf8_lossy(line).trim_end().to_string()
}

/// Strips the `* ` prefix from an untagged response, trimming the CRLF.
fn strip_untagged(line: &[u8]) -> Option<&[u8]> {
    let rest = line.strip_prefix(b"* ")?;
    Some(rest.strip_suffix(b"\r\n").unwrap_or(rest))
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
    fn test_tagged_ok() {
        let (status, text) = parse_tagged(b"A001 OK LOGIN completed\r\n", "A001").unwrap();
        assert_eq!(status, TaggedStatus::Ok);
        assert_eq!(text, "LOGIN completed");
    }

    #[test]
    fn test_tagged_no_with_code() {
        let (status, text) =
            parse_tagged(b"A002 NO [AUTHENTICATIONFAILED] bad credentials\r\n", "A002").unwrap();
        assert_eq!(status, TaggedStatus::No);
        assert_eq!(text, "[AUTHENTICATIONFAILED] bad credentials");
    }

    #[test]
    fn test_tagged_wrong_tag() {
        assert!(parse_tagged(b"A001 OK done\r\n", "A002").is_none());
    }

    #[test]
    fn test_tagged_rejects_untagged() {
        assert!(parse_tagged(b"* OK still here\r\n", "A001").is_none());
    }

    #[test]
    fn test_tagged_prefix_is_not_enough() {
        // A tag must be followed by a space, not merely be a prefix.
        assert!(parse_tagged(b"A0010 OK done\r\n", "A001").is_none());
    }

    #[test]
    fn test_search_ids() {
        assert_eq!(
            parse_search_ids(b"* SEARCH 4 8 15 16\r\n").unwrap(),
            vec![4, 8, 15, 16]
        );
    }

    #[test]
    fn test_search_empty() {
        assert_eq!(parse_search_ids(b"* SEARCH\r\n").unwrap(), Vec::<u32>::new());
    }

    #[test]
    fn test_search_rejects_other_responses() {
        assert!(parse_search_ids(b"* 3 EXISTS\r\n").is_none());
        assert!(parse_search_ids(b"A001 OK SEARCH completed\r\n").is_none());
    }

    #[test]
    fn test_exists() {
        assert_eq!(parse_exists(b"* 23 EXISTS\r\n"), Some(23));
        assert_eq!(parse_exists(b"* 0 EXISTS\r\n"), Some(0));
    }

    #[test]
    fn test_exists_rejects_recent() {
        assert_eq!(parse_exists(b"* 5 RECENT\r\n"), None);
    }

    #[test]
    fn test_fetch_literal() {
        let response = b"* 12 FETCH (RFC822 {5}\r\nhello)\r\n";
        assert_eq!(extract_fetch_literal(response).unwrap(), b"hello");
    }

    #[test]
    fn test_fetch_literal_empty() {
        let response = b"* 1 FETCH (RFC822 {0}\r\n)\r\n";
        assert_eq!(extract_fetch_literal(response).unwrap(), b"");
    }

    #[test]
    fn test_fetch_without_literal() {
        assert!(extract_fetch_literal(b"* 1 FETCH (FLAGS (\\Seen))\r\n").is_none());
    }

    #[test]
    fn test_fetch_rejects_truncated_literal() {
        assert!(extract_fetch_literal(b"* 1 FETCH (RFC822 {100}\r\nshort)\r\n").is_none());
    }

    #[test]
    fn test_fetch_rejects_non_fetch() {
        assert!(extract_fetch_literal(b"* 9 EXPUNGE\r\n").is_none());
    }

    #[test]
    fn test_trim_line() {
        assert_eq!(trim_line(b"* BYE logging out\r\n"), "* BYE logging out");
    }
}
