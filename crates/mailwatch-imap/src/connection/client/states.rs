//! Connection states for the type-state IMAP client.
//!
//! The marker states are empty; `Selected` carries runtime information
//! about the selected mailbox so a client in that state can report what
//! it is watching.

use std::sync::Arc;

/// State before authentication.
///
/// Only LOGIN (and LOGOUT) are valid here.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotAuthenticated;

/// State after a successful LOGIN.
///
/// SELECT becomes valid in this state.
#[derive(Debug, Clone, Copy, Default)]
pub struct Authenticated;

/// State with a mailbox selected.
///
/// SEARCH and FETCH become valid in this state.
#[derive(Debug, Clone)]
pub struct Selected {
    /// The selected mailbox name.
    pub(crate) mailbox: Arc<str>,
    /// Message count reported by the EXISTS response at SELECT time.
    pub(crate) exists: u32,
}

impl Selected {
    /// Returns the name of the selected mailbox.
    #[must_use]
    pub fn mailbox(&self) -> &str {
        &self.mailbox
    }

    /// Returns the message count at SELECT time.
    #[must_use]
    pub const fn exists(&self) -> u32 {
        self.exists
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

    fn _assert_send<T: Send>() {}
    fn _assert_sync<T: Sync>() {}

    #[test]
    fn test_states_are_send_sync() {
        _assert_send::<NotAuthenticated>();
        _assert_sync::<NotAuthenticated>();
        _assert_send::<Authenticated>();
        _assert_sync::<Authenticated>();
        _assert_send::<Selected>();
        _assert_sync::<Selected>();
    }

    #[test]
    fn test_selected_accessors() {
        let selected = Selected {
            mailbox: Arc::from("INBOX"),
            exists: 42,
        };
        assert_eq!(selected.mailbox(), "INBOX");
        assert_eq!(selected.exists(), 42);
    }
}
