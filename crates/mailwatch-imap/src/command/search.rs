//! SEARCH criteria supported by the polling client.
//!
//! Only the small subset of RFC 3501 search keys that mailbox polling
//! needs is modelled here. Dates are passed pre-formatted in the IMAP
//! `dd-Mon-yyyy` form so this crate stays free of date-time dependencies.

/// Search criteria for the SEARCH command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCriteria {
    /// Messages without the `\Seen` flag.
    Unseen,
    /// Messages with an internal date on or after the given day.
    ///
    /// The date must already be in IMAP format, e.g. `15-Mar-2025`.
    Since(String),
    /// All criteria must match (IMAP ANDs space-separated keys).
    And(Vec<SearchCriteria>),
}

impl SearchCriteria {
    /// Writes the criteria in wire form into `buf`.
    pub(crate) fn write(&self, buf: &mut Vec<u8>) {
        match self {
            Self::Unseen => buf.extend_from_slice(b"UNSEEN"),
            Self::Since(date) => {
                buf.extend_from_slice(b"SINCE ");
                buf.extend_from_slice(date.as_bytes());
            }
            Self::And(criteria) => {
                for (i, criterion) in criteria.iter().enumerate() {
                    if i > 0 {
                        buf.push(b' ');
                    }
                    criterion.write(buf);
                }
            }
        }
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

    fn to_wire(criteria: &SearchCriteria) -> Vec<u8> {
        let mut buf = Vec::new();
        criteria.write(&mut buf);
        buf
    }

    #[test]
    fn test_unseen() {
        assert_eq!(to_wire(&SearchCriteria::Unseen), b"UNSEEN");
    }

    #[test]
    fn test_since() {
        assert_eq!(
            to_wire(&SearchCriteria::Since("15-Mar-2025".to_string())),
            b"SINCE 15-Mar-2025"
        );
    }

    #[test]
    fn test_and_joins_with_spaces() {
        let criteria = SearchCriteria::And(vec![
            SearchCriteria::Unseen,
            SearchCriteria::Since("01-Jan-2025".to_string()),
        ]);
        assert_eq!(to_wire(&criteria), b"UNSEEN SINCE 01-Jan-2025");
    }

    #[test]
    fn test_nested_and() {
        let criteria = SearchCriteria::And(vec![SearchCriteria::And(vec![SearchCriteria::Unseen])]);
        assert_eq!(to_wire(&criteria), b"UNSEEN");
    }
}
