//! HTML to plain text conversion.
//!
//! A deliberately simple tag stripper for turning HTML-only mail bodies
//! into preview text. It removes tags, replaces the handful of entities
//! that dominate real mail and collapses whitespace runs. It is not a
//! general HTML renderer.

/// Entities replaced after tag removal, in order.
const ENTITIES: [(&str, &str); 6] = [
    ("&nbsp;", " "),
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
];

/// Strips HTML tags and entities, collapsing all whitespace to single
/// spaces.
///
/// A `<` without a matching `>` is kept as literal text, as is the empty
/// tag `<>`.
#[must_use]
pub fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(pos) = rest.find('<') {
        text.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        match after.find('>') {
            // A tag needs at least one character between the brackets.
            Some(end) if end > 0 => rest = &after[end + 1..],
            Some(_) => {
                text.push('<');
                rest = after;
            }
            None => {
                text.push_str(&rest[pos..]);
                rest = "";
            }
        }
    }
    text.push_str(rest);

    for (entity, replacement) in ENTITIES {
        text = text.replace(entity, replacement);
    }

    text.split_whitespace().collect::<Vec<_>>().join(" ")
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
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_strip_simple_tags() {
        assert_eq!(
            strip_tags("<html><body><p>Hello</p></body></html>"),
            "Hello"
        );
    }

    #[test]
    fn test_strip_tags_with_attributes() {
        assert_eq!(
            strip_tags("<a href=\"https://example.com\">link</a> text"),
            "link text"
        );
    }

    #[test]
    fn test_entities() {
        assert_eq!(
            strip_tags("a&nbsp;b &amp; c &lt;d&gt; &quot;e&quot; &#39;f&#39;"),
            "a b & c <d> \"e\" 'f'"
        );
    }

    #[test]
    fn test_entity_order_is_not_recursive() {
        // &amp;lt; decodes to the literal text "&lt;", not to "<".
        assert_eq!(strip_tags("&amp;lt;"), "&lt;");
    }

    #[test]
    fn test_whitespace_collapsed() {
        assert_eq!(
            strip_tags("  Hello\r\n\t  World\n\n"),
            "Hello World"
        );
    }

    #[test]
    fn test_lone_angle_bracket_kept() {
        assert_eq!(strip_tags("5 < 7"), "5 < 7");
        assert_eq!(strip_tags("empty <> stays"), "empty <> stays");
    }

    #[test]
    fn test_multiline_document() {
        let html = "<html>\n<body>\n<h1>Invoice</h1>\n<p>Total: &amp;euro; 42</p>\n</body>\n</html>";
        assert_eq!(strip_tags(html), "Invoice Total: &euro; 42");
    }

    proptest! {
        #[test]
        fn strip_tags_output_is_collapsed(input in ".*") {
            let out = strip_tags(&input);
            prop_assert!(!out.starts_with(' '));
            prop_assert!(!out.ends_with(' '));
            prop_assert!(!out.contains("  "));
            prop_assert!(!out.contains('\n'));
            prop_assert!(!out.contains('\t'));
        }
    }
}
