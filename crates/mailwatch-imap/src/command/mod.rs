//! IMAP command builder.
//!
//! This module provides types and serialization for the commands a
//! polling client sends: LOGIN, SELECT, SEARCH, FETCH, NOOP and LOGOUT.

mod search;
mod serialize;
mod tag_generator;

pub use search::SearchCriteria;
pub use tag_generator::TagGenerator;

use serialize::write_astring;

/// IMAP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// NOOP command, used as a liveness probe.
    Noop,
    /// LOGOUT command.
    Logout,
    /// LOGIN command.
    Login {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// SELECT command.
    Select {
        /// Mailbox to select.
        mailbox: String,
    },
    /// SEARCH command.
    Search {
        /// Search criteria.
        criteria: SearchCriteria,
    },
    /// FETCH command requesting the full RFC 822 message.
    Fetch {
        /// Message sequence number.
        seq: u32,
    },
}

impl Command {
    /// Serializes the command to bytes with the given tag.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(tag.as_bytes());
        buf.push(b' ');

        match self {
            Self::Noop => buf.extend_from_slice(b"NOOP"),
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),

            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN ");
                write_astring(&mut buf, username);
                buf.push(b' ');
                write_astring(&mut buf, password);
            }

            Self::Select { mailbox } => {
                buf.extend_from_slice(b"SELECT ");
                write_astring(&mut buf, mailbox);
            }

            Self::Search { criteria } => {
                buf.extend_from_slice(b"SEARCH ");
                criteria.write(&mut buf);
            }

            Self::Fetch { seq } => {
                buf.extend_from_slice(b"FETCH ");
                buf.extend_from_slice(seq.to_string().as_bytes());
                buf.extend_from_slice(b" (RFC822)");
            }
        }

        buf.extend_from_slice(b"\r\n");
        buf
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
    fn test_noop_command() {
        let cmd = Command::Noop;
        assert_eq!(cmd.serialize("A001"), b"A001 NOOP\r\n");
    }

    #[test]
    fn test_logout_command() {
        let cmd = Command::Logout;
        assert_eq!(cmd.serialize("A002"), b"A002 LOGOUT\r\n");
    }

    #[test]
    fn test_login_command() {
        let cmd = Command::Login {
            username: "user".to_string(),
            password: "pass".to_string(),
        };
        assert_eq!(cmd.serialize("A001"), b"A001 LOGIN user pass\r\n");
    }

    #[test]
    fn test_login_quoted() {
        let cmd = Command::Login {
            username: "user@example.com".to_string(),
            password: "pass word".to_string(),
        };
        assert_eq!(
            cmd.serialize("A001"),
            b"A001 LOGIN user@example.com \"pass word\"\r\n"
        );
    }

    #[test]
    fn test_select_command() {
        let cmd = Command::Select {
            mailbox: "INBOX".to_string(),
        };
        assert_eq!(cmd.serialize("A001"), b"A001 SELECT INBOX\r\n");
    }

    #[test]
    fn test_select_quoted_mailbox() {
        let cmd = Command::Select {
            mailbox: "Invoices 2025".to_string(),
        };
        assert_eq!(cmd.serialize("A001"), b"A001 SELECT \"Invoices 2025\"\r\n");
    }

    #[test]
    fn test_search_command() {
        let cmd = Command::Search {
            criteria: SearchCriteria::And(vec![
                SearchCriteria::Unseen,
                SearchCriteria::Since("02-Feb-2025".to_string()),
            ]),
        };
        assert_eq!(
            cmd.serialize("A003"),
            b"A003 SEARCH UNSEEN SINCE 02-Feb-2025\r\n"
        );
    }

    #[test]
    fn test_fetch_command() {
        let cmd = Command::Fetch { seq: 42 };
        assert_eq!(cmd.serialize("A004"), b"A004 FETCH 42 (RFC822)\r\n");
    }
}
