//! Command serialization helpers.

/// Writes an astring (atom or quoted string).
pub fn write_astring(buf: &mut Vec<u8>, s: &str) {
    if s.is_empty() || s.bytes().any(needs_quoting) {
        buf.push(b'"');
        for b in s.bytes() {
            if b == b'"' || b == b'\\' {
                buf.push(b'\\');
            }
            buf.push(b);
        }
        buf.push(b'"');
    } else {
        buf.extend_from_slice(s.as_bytes());
    }
}

/// Returns true if the byte needs quoting.
const fn needs_quoting(b: u8) -> bool {
    matches!(b, b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*') || b < 0x20 || b == 0x7F
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

    fn astring(s: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        write_astring(&mut buf, s);
        buf
    }

    #[test]
    fn test_atom_stays_bare() {
        assert_eq!(astring("user@example.com"), b"user@example.com");
    }

    #[test]
    fn test_space_forces_quoting() {
        assert_eq!(astring("pass word"), b"\"pass word\"");
    }

    #[test]
    fn test_empty_is_quoted() {
        assert_eq!(astring(""), b"\"\"");
    }

    #[test]
    fn test_escapes_quote_and_backslash() {
        assert_eq!(astring(r#"a"b\c"#), b"\"a\\\"b\\\\c\"");
    }
}
