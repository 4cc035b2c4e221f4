//! Notification dispatch.

use std::future::Future;

use tracing::info;

use crate::error::Result;

/// Capability that delivers a notification text to an opaque target.
///
/// Implemented by the messaging gateway this service feeds. Tests substitute
/// a recording fake; the binary installs [`LoggingNotifier`] when no gateway
/// is wired up.
pub trait Notifier: Send + Sync {
    /// Deliver `text` to `target`.
    fn notify(&self, target: &str, text: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Notifier that writes every message to the log instead of a gateway.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    async fn notify(&self, target: &str, text: &str) -> Result<()> {
        info!(notify_target = %target, "notification:\n{text}");
        Ok(())
    }
}
