//! Session lifecycle and circuit breaking.
//!
//! Each account owns one session slot. Connection attempts run through a
//! failure counter: once five attempts in a row have failed the circuit is
//! open and the account is skipped without network I/O, except for a single
//! half-open retry after each cooldown period. An existing session is probed
//! with NOOP before reuse; a failed probe forces a fresh connect.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use super::source::{MailSession, SessionFactory};
use crate::account::AccountConfig;
use crate::error::Result;

/// Consecutive failures after which the circuit opens.
pub const FAILURE_THRESHOLD: u32 = 5;

/// Cooldown before a half-open retry, in seconds.
pub const COOLDOWN_SECS: i64 = 300;

/// Failure counter with a cooldown-based half-open state.
#[derive(Debug, Clone, Default)]
pub struct CircuitBreaker {
    consecutive_failures: u32,
    last_failure: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    /// Record a failed connection attempt.
    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.consecutive_failures += 1;
        self.last_failure = Some(now);
    }

    /// Record a fully successful arrival at an active session.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.last_failure = None;
    }

    /// Whether the failure threshold has been reached.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.consecutive_failures >= FAILURE_THRESHOLD
    }

    /// Whether a connection attempt is currently permitted.
    ///
    /// A closed circuit always allows attempts. An open circuit allows one
    /// half-open attempt once the cooldown has elapsed since the last
    /// failure; that attempt's outcome either closes the circuit again or
    /// restarts the cooldown.
    #[must_use]
    pub fn allows_attempt(&self, now: DateTime<Utc>) -> bool {
        if !self.is_open() {
            return true;
        }
        self.last_failure.is_none_or(|last| {
            now.signed_duration_since(last) >= Duration::seconds(COOLDOWN_SECS)
        })
    }

    /// Current consecutive failure count.
    #[must_use]
    pub const fn failures(&self) -> u32 {
        self.consecutive_failures
    }
}

/// Session slot for one account, guarded by a [`CircuitBreaker`].
#[derive(Debug)]
pub struct AccountSession<S> {
    session: Option<S>,
    breaker: CircuitBreaker,
}

impl<S: MailSession> AccountSession<S> {
    /// Empty slot with a closed circuit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            session: None,
            breaker: CircuitBreaker::default(),
        }
    }

    /// Whether a cycle may attempt network work now.
    #[must_use]
    pub fn can_attempt(&self, now: DateTime<Utc>) -> bool {
        self.breaker.allows_attempt(now)
    }

    /// Whether the circuit is open.
    #[must_use]
    pub const fn is_circuit_open(&self) -> bool {
        self.breaker.is_open()
    }

    /// Ensure an active session, reusing the existing one when it passes a
    /// NOOP probe.
    ///
    /// # Errors
    ///
    /// Propagates the connect, login or select failure after recording it
    /// in the circuit breaker.
    pub async fn ensure_active<F>(
        &mut self,
        factory: &F,
        config: &AccountConfig,
        now: DateTime<Utc>,
    ) -> Result<&mut S>
    where
        F: SessionFactory<Session = S>,
    {
        if let Some(session) = self.session.as_mut()
            && session.noop().await.is_err()
        {
            debug!(host = %config.host, "liveness probe failed, discarding session");
            self.session = None;
        }

        let session = match self.session.take() {
            Some(session) => session,
            None => match factory.open(config).await {
                Ok(session) => session,
                Err(e) => {
                    self.breaker.record_failure(now);
                    warn!(
                        host = %config.host,
                        failures = self.breaker.failures(),
                        error = %e,
                        "session attempt failed"
                    );
                    return Err(e);
                }
            },
        };

        self.breaker.record_success();
        Ok(self.session.insert(session))
    }

    /// Log out and drop the session, if one is open.
    pub async fn close(&mut self) {
        if let Some(session) = self.session.take()
            && let Err(e) = session.logout().await
        {
            debug!(error = %e, "logout failed");
        }
    }
}

impl<S: MailSession> Default for AccountSession<S> {
    fn default() -> Self {
        Self::new()
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
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use chrono::TimeZone;
    use mailwatch_imap::SearchCriteria;

    use super::*;
    use crate::account::Secret;
    use crate::error::Error;

    struct FakeSession {
        probe_ok: bool,
        logged_out: Arc<AtomicBool>,
    }

    impl MailSession for FakeSession {
        async fn noop(&mut self) -> Result<()> {
            if self.probe_ok {
                Ok(())
            } else {
                Err(Error::Connection("probe failed".to_string()))
            }
        }

        async fn search(&mut self, _criteria: &SearchCriteria) -> Result<Vec<u32>> {
            Ok(Vec::new())
        }

        async fn fetch(&mut self, _seq: u32) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }

        async fn logout(self) -> Result<()> {
            self.logged_out.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeFactory {
        opens: AtomicU32,
        fail: AtomicBool,
        probe_ok: bool,
        logged_out: Arc<AtomicBool>,
    }

    impl FakeFactory {
        fn new(probe_ok: bool) -> Self {
            Self {
                opens: AtomicU32::new(0),
                fail: AtomicBool::new(false),
                probe_ok,
                logged_out: Arc::new(AtomicBool::new(false)),
            }
        }

        fn opens(&self) -> u32 {
            self.opens.load(Ordering::SeqCst)
        }
    }

    impl SessionFactory for FakeFactory {
        type Session = FakeSession;

        async fn open(&self, _config: &AccountConfig) -> Result<FakeSession> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Connection("connection refused".to_string()));
            }
            Ok(FakeSession {
                probe_ok: self.probe_ok,
                logged_out: Arc::clone(&self.logged_out),
            })
        }
    }

    fn config() -> AccountConfig {
        AccountConfig::new(
            "imap.example.com",
            993,
            "user@example.com",
            Secret::from("pw"),
            "chat-1",
        )
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_breaker_opens_at_threshold() {
        let mut breaker = CircuitBreaker::default();
        for _ in 0..4 {
            breaker.record_failure(now());
        }
        assert!(!breaker.is_open());

        breaker.record_failure(now());
        assert!(breaker.is_open());
        assert!(!breaker.allows_attempt(now()));
    }

    #[test]
    fn test_breaker_half_open_after_cooldown() {
        let mut breaker = CircuitBreaker::default();
        for _ in 0..5 {
            breaker.record_failure(now());
        }

        let just_before = now() + Duration::seconds(COOLDOWN_SECS - 1);
        assert!(!breaker.allows_attempt(just_before));

        let after = now() + Duration::seconds(COOLDOWN_SECS);
        assert!(breaker.allows_attempt(after));

        // A failed half-open attempt restarts the cooldown
        breaker.record_failure(after);
        assert!(!breaker.allows_attempt(after + Duration::seconds(1)));
        assert!(breaker.allows_attempt(after + Duration::seconds(COOLDOWN_SECS)));
    }

    #[test]
    fn test_breaker_success_closes_circuit() {
        let mut breaker = CircuitBreaker::default();
        for _ in 0..5 {
            breaker.record_failure(now());
        }
        breaker.record_success();
        assert!(!breaker.is_open());
        assert_eq!(breaker.failures(), 0);
        assert!(breaker.allows_attempt(now()));
    }

    #[tokio::test]
    async fn test_ensure_active_connects_once_and_reuses() {
        let factory = FakeFactory::new(true);
        let mut slot: AccountSession<FakeSession> = AccountSession::new();

        slot.ensure_active(&factory, &config(), now()).await.unwrap();
        slot.ensure_active(&factory, &config(), now()).await.unwrap();

        // The probe passed, so the first session was reused
        assert_eq!(factory.opens(), 1);
    }

    #[tokio::test]
    async fn test_failed_probe_forces_fresh_connect() {
        let factory = FakeFactory::new(false);
        let mut slot: AccountSession<FakeSession> = AccountSession::new();

        slot.ensure_active(&factory, &config(), now()).await.unwrap();
        slot.ensure_active(&factory, &config(), now()).await.unwrap();

        assert_eq!(factory.opens(), 2);
    }

    #[tokio::test]
    async fn test_failed_connect_counts_and_propagates() {
        let factory = FakeFactory::new(true);
        factory.fail.store(true, Ordering::SeqCst);
        let mut slot: AccountSession<FakeSession> = AccountSession::new();

        for _ in 0..5 {
            let result = slot.ensure_active(&factory, &config(), now()).await;
            assert!(matches!(result, Err(Error::Connection(_))));
        }
        assert!(slot.is_circuit_open());
        assert!(!slot.can_attempt(now()));
        assert!(slot.can_attempt(now() + Duration::seconds(COOLDOWN_SECS)));
    }

    #[tokio::test]
    async fn test_success_resets_failures() {
        let factory = FakeFactory::new(true);
        factory.fail.store(true, Ordering::SeqCst);
        let mut slot: AccountSession<FakeSession> = AccountSession::new();

        for _ in 0..3 {
            let _ = slot.ensure_active(&factory, &config(), now()).await;
        }

        factory.fail.store(false, Ordering::SeqCst);
        slot.ensure_active(&factory, &config(), now()).await.unwrap();
        assert!(!slot.is_circuit_open());

        // Three more failures stay below the threshold again
        factory.fail.store(true, Ordering::SeqCst);
        // Drop the live session so the next attempt actually connects
        slot.close().await;
        for _ in 0..3 {
            let _ = slot.ensure_active(&factory, &config(), now()).await;
        }
        assert!(!slot.is_circuit_open());
    }

    #[tokio::test]
    async fn test_close_logs_out() {
        let factory = FakeFactory::new(true);
        let mut slot: AccountSession<FakeSession> = AccountSession::new();

        slot.ensure_active(&factory, &config(), now()).await.unwrap();
        slot.close().await;

        assert!(factory.logged_out.load(Ordering::SeqCst));

        // Closing an empty slot is a no-op
        slot.close().await;
    }
}
