//! Per-account ingestion pipeline.
//!
//! One cycle: ensure a live session, search for unseen messages since the
//! high-water mark, fetch and parse the new ones, apply the account's
//! filters, notify on matches, and advance the mark. The search window is
//! day-granular (an IMAP `SINCE` constraint), so ids already handled on the
//! same day reappear in results; the per-run processed set absorbs them.

use std::collections::HashSet;

use mailwatch_imap::SearchCriteria;
use mailwatch_mime::{Message, html};
use tracing::{debug, warn};

use super::notify::Notifier;
use super::session::AccountSession;
use super::source::{MailSession, SessionFactory};
use crate::account::{AccountConfig, AccountStore, OwnerId};
use crate::error::Result;
use crate::time::Clock;

/// Body text kept per message.
const BODY_CAP: usize = 2000;

/// Body preview length in notifications.
const PREVIEW_CAP: usize = 300;

/// Per-account state owned by a polling unit.
pub struct AccountState<S> {
    /// Session slot and failure history.
    pub session: AccountSession<S>,
    /// Sequence ids already evaluated this run.
    pub processed: HashSet<u32>,
}

impl<S: MailSession> AccountState<S> {
    /// Fresh state with no session and nothing processed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            session: AccountSession::new(),
            processed: HashSet::new(),
        }
    }
}

impl<S: MailSession> Default for AccountState<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters from one pipeline cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Ids evaluated for the first time this run.
    pub evaluated: usize,
    /// Notifications dispatched.
    pub notified: usize,
    /// Whether the cycle was skipped with the circuit open.
    pub skipped: bool,
}

/// Borrowed collaborators for running poll cycles.
pub struct Pipeline<'a, F, N, C> {
    factory: &'a F,
    notifier: &'a N,
    store: &'a AccountStore,
    clock: &'a C,
}

impl<'a, F, N, C> Pipeline<'a, F, N, C>
where
    F: SessionFactory,
    N: Notifier,
    C: Clock,
{
    /// Bundle the collaborators a cycle needs.
    pub const fn new(
        factory: &'a F,
        notifier: &'a N,
        store: &'a AccountStore,
        clock: &'a C,
    ) -> Self {
        Self {
            factory,
            notifier,
            store,
            clock,
        }
    }

    /// Run one poll cycle for one account.
    ///
    /// Per-message fetch and parse failures are logged and the id still
    /// marked processed; notification dispatch failures are logged only.
    ///
    /// # Errors
    ///
    /// Returns the connect, login or select failure (already recorded in
    /// the circuit breaker), a search failure, or a persistence failure
    /// from advancing the high-water mark.
    pub async fn run_cycle(
        &self,
        state: &mut AccountState<F::Session>,
        owner: OwnerId,
        name: &str,
        config: &AccountConfig,
    ) -> Result<CycleReport> {
        let now = self.clock.now();
        if !state.session.can_attempt(now) {
            debug!(owner = %owner, name = %name, "circuit open, skipping cycle");
            return Ok(CycleReport {
                skipped: true,
                ..CycleReport::default()
            });
        }

        let session = state.session.ensure_active(self.factory, config, now).await?;

        let criteria = search_criteria(config);
        let ids = session.search(&criteria).await?;

        let mut report = CycleReport::default();
        for id in ids {
            if state.processed.contains(&id) {
                continue;
            }
            report.evaluated += 1;

            match session.fetch(id).await {
                Ok(Some(raw)) => match parse_mail(&raw) {
                    Ok(mail) => {
                        if filters_match(config, &mail) {
                            let text = format_notification(name, &mail);
                            match self.notifier.notify(&config.notify_target, &text).await {
                                Ok(()) => report.notified += 1,
                                Err(e) => warn!(
                                    owner = %owner,
                                    name = %name,
                                    error = %e,
                                    "notification dispatch failed"
                                ),
                            }
                        }
                    }
                    Err(e) => {
                        warn!(owner = %owner, name = %name, seq = id, error = %e, "unparsable message");
                    }
                },
                Ok(None) => {
                    debug!(owner = %owner, name = %name, seq = id, "message vanished before fetch");
                }
                Err(e) => {
                    warn!(owner = %owner, name = %name, seq = id, error = %e, "fetch failed");
                }
            }
            state.processed.insert(id);
        }

        self.store
            .advance_last_check(owner, name, self.clock.now())
            .await?;

        debug!(
            owner = %owner,
            name = %name,
            evaluated = report.evaluated,
            notified = report.notified,
            "cycle complete"
        );
        Ok(report)
    }
}

/// Fields extracted from one message.
struct ParsedMail {
    sender: String,
    subject: String,
    date: String,
    attachment_count: usize,
    body: String,
}

/// UNSEEN, bounded by a day-granular SINCE once a mark exists.
fn search_criteria(config: &AccountConfig) -> SearchCriteria {
    match config.last_check_time {
        Some(mark) => SearchCriteria::And(vec![
            SearchCriteria::Unseen,
            SearchCriteria::Since(mark.format("%d-%b-%Y").to_string()),
        ]),
        None => SearchCriteria::Unseen,
    }
}

/// Parse headers and body out of raw RFC822 content.
///
/// The body prefers the first plain-text part; an HTML part is stripped of
/// tags only when no plain part exists. Body extraction is best-effort and
/// falls back to an empty string.
fn parse_mail(raw: &[u8]) -> Result<ParsedMail> {
    let message = Message::parse(raw)?;

    let sender = message
        .headers
        .decoded("from")
        .unwrap_or_else(|| "Unknown Sender".to_string());
    let subject = message
        .headers
        .decoded("subject")
        .unwrap_or_else(|| "No Subject".to_string());
    let date = message
        .headers
        .decoded("date")
        .unwrap_or_else(|| "Unknown Date".to_string());

    let body = match message.plain_text().ok().flatten() {
        Some(text) => text,
        None => message
            .html_text()
            .ok()
            .flatten()
            .map(|h| html::strip_tags(&h))
            .unwrap_or_default(),
    };

    Ok(ParsedMail {
        sender,
        subject,
        date,
        attachment_count: message.attachment_count(),
        body: truncate_with_ellipsis(body.trim(), BODY_CAP),
    })
}

/// AND-combined filters; substring matches are case-insensitive.
fn filters_match(config: &AccountConfig, mail: &ParsedMail) -> bool {
    if let Some(sender) = &config.sender_contains
        && !mail.sender.to_lowercase().contains(&sender.to_lowercase())
    {
        return false;
    }
    if let Some(subject) = &config.subject_contains
        && !mail.subject.to_lowercase().contains(&subject.to_lowercase())
    {
        return false;
    }
    if let Some(wanted) = config.has_attachments
        && (mail.attachment_count > 0) != wanted
    {
        return false;
    }
    true
}

/// Notification text: account name, headers, attachment count and a body
/// preview.
fn format_notification(name: &str, mail: &ParsedMail) -> String {
    let mut text = format!(
        "New mail on {name}\nFrom: {}\nSubject: {}\nDate: {}",
        mail.sender, mail.subject, mail.date
    );
    if mail.attachment_count > 0 {
        text.push_str(&format!("\nAttachments: {}", mail.attachment_count));
    }
    let preview = truncate_with_ellipsis(&mail.body, PREVIEW_CAP);
    if !preview.is_empty() {
        text.push_str("\n\n");
        text.push_str(&preview);
    }
    text
}

/// Keep at most `cap` characters, appending an ellipsis when cut.
fn truncate_with_ellipsis(text: &str, cap: usize) -> String {
    if text.chars().count() <= cap {
        return text.to_string();
    }
    let cut: String = text.chars().take(cap).collect();
    format!("{cut}...")
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
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::*;
    use crate::account::{CredentialCipher, Secret};
    use crate::error::Error;
    use crate::time::MockClock;
    use crate::watch::session::COOLDOWN_SECS;

    #[derive(Clone, Default)]
    struct Mailbox {
        ids: Vec<u32>,
        messages: HashMap<u32, Vec<u8>>,
    }

    impl Mailbox {
        fn with_message(id: u32, raw: Vec<u8>) -> Self {
            Self {
                ids: vec![id],
                messages: HashMap::from([(id, raw)]),
            }
        }
    }

    struct ScriptedSession {
        mailbox: Mailbox,
    }

    impl MailSession for ScriptedSession {
        async fn noop(&mut self) -> Result<()> {
            Ok(())
        }

        async fn search(&mut self, _criteria: &SearchCriteria) -> Result<Vec<u32>> {
            Ok(self.mailbox.ids.clone())
        }

        async fn fetch(&mut self, seq: u32) -> Result<Option<Vec<u8>>> {
            Ok(self.mailbox.messages.get(&seq).cloned())
        }

        async fn logout(self) -> Result<()> {
            Ok(())
        }
    }

    struct ScriptedFactory {
        mailbox: Mailbox,
        opens: AtomicU32,
        fail: AtomicBool,
    }

    impl ScriptedFactory {
        fn new(mailbox: Mailbox) -> Self {
            Self {
                mailbox,
                opens: AtomicU32::new(0),
                fail: AtomicBool::new(false),
            }
        }

        fn failing() -> Self {
            let factory = Self::new(Mailbox::default());
            factory.fail.store(true, Ordering::SeqCst);
            factory
        }

        fn opens(&self) -> u32 {
            self.opens.load(Ordering::SeqCst)
        }
    }

    impl SessionFactory for ScriptedFactory {
        type Session = ScriptedSession;

        async fn open(&self, _config: &AccountConfig) -> Result<ScriptedSession> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Connection("connection refused".to_string()));
            }
            Ok(ScriptedSession {
                mailbox: self.mailbox.clone(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
        fail: AtomicBool,
    }

    impl RecordingNotifier {
        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Notifier for RecordingNotifier {
        async fn notify(&self, target: &str, text: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((target.to_string(), text.to_string()));
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Notify("gateway down".to_string()));
            }
            Ok(())
        }
    }

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "mailwatch-pipeline-{tag}-{}.json",
            std::process::id()
        ))
    }

    fn cleanup(path: &Path) {
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(path.with_extension("tmp"));
    }

    fn store(path: &Path) -> AccountStore {
        let (store, _) =
            AccountStore::with_cipher(path, CredentialCipher::from_passphrase("pipeline-tests"))
                .unwrap();
        store
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

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn raw_message(from: &str, subject: &str, body: &str) -> Vec<u8> {
        format!(
            "From: {from}\r\nSubject: {subject}\r\nDate: Mon, 2 Mar 2026 10:00:00 +0000\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\r\n{body}"
        )
        .into_bytes()
    }

    #[test]
    fn test_search_criteria_without_mark() {
        assert_eq!(search_criteria(&config()), SearchCriteria::Unseen);
    }

    #[test]
    fn test_search_criteria_with_mark() {
        let mut config = config();
        config.last_check_time = Some(Utc.with_ymd_and_hms(2026, 3, 1, 23, 30, 0).unwrap());

        assert_eq!(
            search_criteria(&config),
            SearchCriteria::And(vec![
                SearchCriteria::Unseen,
                SearchCriteria::Since("01-Mar-2026".to_string()),
            ])
        );
    }

    #[test]
    fn test_truncate_with_ellipsis() {
        assert_eq!(truncate_with_ellipsis("short", 10), "short");
        assert_eq!(truncate_with_ellipsis("exactly10!", 10), "exactly10!");
        assert_eq!(truncate_with_ellipsis("0123456789ab", 10), "0123456789...");
        // Counts characters, not bytes
        assert_eq!(truncate_with_ellipsis("ééééé", 5), "ééééé");
        assert_eq!(truncate_with_ellipsis("éééééé", 5), "ééééé...");
    }

    #[test]
    fn test_filters_case_insensitive_substring() {
        let mut config = config();
        config.subject_contains = Some("invoice".to_string());
        config.sender_contains = Some("BILLING@".to_string());

        let mail = ParsedMail {
            sender: "Billing Dept <billing@x.com>".to_string(),
            subject: "Monthly Invoice #45".to_string(),
            date: "today".to_string(),
            attachment_count: 0,
            body: String::new(),
        };
        assert!(filters_match(&config, &mail));

        let wrong_subject = ParsedMail {
            subject: "Newsletter".to_string(),
            sender: mail.sender.clone(),
            date: mail.date.clone(),
            attachment_count: 0,
            body: String::new(),
        };
        assert!(!filters_match(&config, &wrong_subject));
    }

    #[test]
    fn test_filters_attachments_exact() {
        let mut config = config();
        config.has_attachments = Some(true);

        let with = ParsedMail {
            sender: String::new(),
            subject: String::new(),
            date: String::new(),
            attachment_count: 2,
            body: String::new(),
        };
        let without = ParsedMail {
            attachment_count: 0,
            sender: String::new(),
            subject: String::new(),
            date: String::new(),
            body: String::new(),
        };

        assert!(filters_match(&config, &with));
        assert!(!filters_match(&config, &without));

        config.has_attachments = Some(false);
        assert!(!filters_match(&config, &with));
        assert!(filters_match(&config, &without));
    }

    #[test]
    fn test_no_filters_match_everything() {
        let mail = ParsedMail {
            sender: "anyone".to_string(),
            subject: "anything".to_string(),
            date: "whenever".to_string(),
            attachment_count: 3,
            body: String::new(),
        };
        assert!(filters_match(&config(), &mail));
    }

    #[test]
    fn test_format_notification() {
        let mail = ParsedMail {
            sender: "billing@x.com".to_string(),
            subject: "Monthly Invoice #45".to_string(),
            date: "Mon, 2 Mar 2026 10:00:00 +0000".to_string(),
            attachment_count: 0,
            body: "Please find the invoice attached.".to_string(),
        };
        let text = format_notification("work", &mail);

        assert!(text.contains("New mail on work"));
        assert!(text.contains("From: billing@x.com"));
        assert!(text.contains("Subject: Monthly Invoice #45"));
        assert!(text.contains("Date: Mon, 2 Mar 2026"));
        assert!(!text.contains("Attachments:"));
        assert!(text.contains("Please find the invoice attached."));
    }

    #[test]
    fn test_format_notification_with_attachments_and_long_body() {
        let mail = ParsedMail {
            sender: "a@b.com".to_string(),
            subject: "big".to_string(),
            date: "today".to_string(),
            attachment_count: 2,
            body: "x".repeat(500),
        };
        let text = format_notification("work", &mail);

        assert!(text.contains("Attachments: 2"));
        assert!(text.contains(&format!("{}...", "x".repeat(300))));
        assert!(!text.contains(&"x".repeat(301)));
    }

    #[test]
    fn test_parse_mail_header_defaults() {
        let mail = parse_mail(b"X-Other: nothing useful\r\n\r\nhello").unwrap();
        assert_eq!(mail.sender, "Unknown Sender");
        assert_eq!(mail.subject, "No Subject");
        assert_eq!(mail.date, "Unknown Date");
        assert_eq!(mail.body, "hello");
    }

    #[test]
    fn test_parse_mail_decodes_encoded_words() {
        let raw = b"From: =?utf-8?q?Caf=C3=A9?= <cafe@example.com>\r\nSubject: =?utf-8?b?SGVsbG8=?=\r\n\r\nbody";
        let mail = parse_mail(raw).unwrap();
        assert_eq!(mail.sender, "Caf\u{e9} <cafe@example.com>");
        assert_eq!(mail.subject, "Hello");
    }

    #[test]
    fn test_parse_mail_html_fallback() {
        let raw = b"From: a@b.com\r\nContent-Type: text/html\r\n\r\n<p>Hello <b>there</b></p>";
        let mail = parse_mail(raw).unwrap();
        assert_eq!(mail.body, "Hello there");
    }

    #[tokio::test]
    async fn test_cycle_notifies_matching_message() {
        let path = temp_path("match");
        cleanup(&path);
        let store = store(&path);

        let owner = OwnerId::new(1);
        let mut config = config();
        config.subject_contains = Some("invoice".to_string());
        store.save(owner, "work", config.clone()).await.unwrap();

        let raw = raw_message("billing@x.com", "Monthly Invoice #45", "Total due: $100");
        let factory = ScriptedFactory::new(Mailbox::with_message(7, raw));
        let notifier = RecordingNotifier::default();
        let clock = MockClock::new(base_time());
        let pipeline = Pipeline::new(&factory, &notifier, &store, &clock);

        let mut state = AccountState::new();
        let report = pipeline
            .run_cycle(&mut state, owner, "work", &config)
            .await
            .unwrap();

        assert_eq!(report.evaluated, 1);
        assert_eq!(report.notified, 1);
        assert!(!report.skipped);

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "chat-1");
        assert!(sent[0].1.contains("From: billing@x.com"));
        assert!(sent[0].1.contains("Subject: Monthly Invoice #45"));
        assert!(sent[0].1.contains("Total due: $100"));

        // The high-water mark advanced and was persisted
        let stored = store.get(owner, "work").await.unwrap();
        assert_eq!(stored.last_check_time, Some(base_time()));

        cleanup(&path);
    }

    #[tokio::test]
    async fn test_cycle_filters_out_non_matching() {
        let path = temp_path("filtered");
        cleanup(&path);
        let store = store(&path);

        let owner = OwnerId::new(1);
        let mut config = config();
        config.subject_contains = Some("invoice".to_string());
        store.save(owner, "work", config.clone()).await.unwrap();

        let raw = raw_message("news@x.com", "Newsletter", "This week in news");
        let factory = ScriptedFactory::new(Mailbox::with_message(8, raw));
        let notifier = RecordingNotifier::default();
        let clock = MockClock::new(base_time());
        let pipeline = Pipeline::new(&factory, &notifier, &store, &clock);

        let mut state = AccountState::new();
        let report = pipeline
            .run_cycle(&mut state, owner, "work", &config)
            .await
            .unwrap();

        assert_eq!(report.evaluated, 1);
        assert_eq!(report.notified, 0);
        assert!(notifier.sent().is_empty());
        assert!(state.processed.contains(&8));

        cleanup(&path);
    }

    #[tokio::test]
    async fn test_cycle_dedups_across_cycles() {
        let path = temp_path("dedup");
        cleanup(&path);
        let store = store(&path);

        let owner = OwnerId::new(1);
        let config = config();
        store.save(owner, "work", config.clone()).await.unwrap();

        let raw = raw_message("a@b.com", "Hello", "body");
        let factory = ScriptedFactory::new(Mailbox::with_message(101, raw));
        let notifier = RecordingNotifier::default();
        let clock = MockClock::new(base_time());
        let pipeline = Pipeline::new(&factory, &notifier, &store, &clock);

        let mut state = AccountState::new();
        let first = pipeline
            .run_cycle(&mut state, owner, "work", &config)
            .await
            .unwrap();
        let second = pipeline
            .run_cycle(&mut state, owner, "work", &config)
            .await
            .unwrap();

        // The same id shows up in both searches but is evaluated once
        assert_eq!(first.evaluated, 1);
        assert_eq!(second.evaluated, 0);
        assert_eq!(notifier.sent().len(), 1);

        cleanup(&path);
    }

    #[tokio::test]
    async fn test_circuit_opens_then_skips_without_io() {
        let path = temp_path("circuit");
        cleanup(&path);
        let store = store(&path);

        let owner = OwnerId::new(1);
        let config = config();
        store.save(owner, "work", config.clone()).await.unwrap();

        let factory = ScriptedFactory::failing();
        let notifier = RecordingNotifier::default();
        let clock = MockClock::new(base_time());
        let pipeline = Pipeline::new(&factory, &notifier, &store, &clock);

        let mut state = AccountState::new();
        for _ in 0..5 {
            let result = pipeline.run_cycle(&mut state, owner, "work", &config).await;
            assert!(result.is_err());
            clock.advance(Duration::seconds(1));
        }
        assert_eq!(factory.opens(), 5);

        // Sixth cycle: circuit open, no connection attempt at all
        let report = pipeline
            .run_cycle(&mut state, owner, "work", &config)
            .await
            .unwrap();
        assert!(report.skipped);
        assert_eq!(factory.opens(), 5);

        cleanup(&path);
    }

    #[tokio::test]
    async fn test_half_open_attempt_after_cooldown() {
        let path = temp_path("half-open");
        cleanup(&path);
        let store = store(&path);

        let owner = OwnerId::new(1);
        let config = config();
        store.save(owner, "work", config.clone()).await.unwrap();

        let factory = ScriptedFactory::failing();
        let notifier = RecordingNotifier::default();
        let clock = MockClock::new(base_time());
        let pipeline = Pipeline::new(&factory, &notifier, &store, &clock);

        let mut state = AccountState::new();
        for _ in 0..5 {
            let _ = pipeline.run_cycle(&mut state, owner, "work", &config).await;
        }
        assert_eq!(factory.opens(), 5);

        // One half-open attempt is allowed after the cooldown
        clock.advance(Duration::seconds(COOLDOWN_SECS));
        let result = pipeline.run_cycle(&mut state, owner, "work", &config).await;
        assert!(result.is_err());
        assert_eq!(factory.opens(), 6);

        // The failed retry restarted the cooldown
        clock.advance(Duration::seconds(1));
        let report = pipeline
            .run_cycle(&mut state, owner, "work", &config)
            .await
            .unwrap();
        assert!(report.skipped);
        assert_eq!(factory.opens(), 6);

        // A successful half-open attempt closes the circuit
        clock.advance(Duration::seconds(COOLDOWN_SECS));
        factory.fail.store(false, Ordering::SeqCst);
        let report = pipeline
            .run_cycle(&mut state, owner, "work", &config)
            .await
            .unwrap();
        assert!(!report.skipped);
        assert_eq!(factory.opens(), 7);
        assert!(!state.session.is_circuit_open());

        cleanup(&path);
    }

    #[tokio::test]
    async fn test_vanished_message_still_marked_processed() {
        let path = temp_path("vanished");
        cleanup(&path);
        let store = store(&path);

        let owner = OwnerId::new(1);
        let config = config();
        store.save(owner, "work", config.clone()).await.unwrap();

        // Search returns an id the mailbox no longer has
        let factory = ScriptedFactory::new(Mailbox {
            ids: vec![13],
            messages: HashMap::new(),
        });
        let notifier = RecordingNotifier::default();
        let clock = MockClock::new(base_time());
        let pipeline = Pipeline::new(&factory, &notifier, &store, &clock);

        let mut state = AccountState::new();
        let report = pipeline
            .run_cycle(&mut state, owner, "work", &config)
            .await
            .unwrap();

        assert_eq!(report.notified, 0);
        assert!(state.processed.contains(&13));

        cleanup(&path);
    }

    #[tokio::test]
    async fn test_unparsable_message_is_isolated() {
        let path = temp_path("unparsable");
        cleanup(&path);
        let store = store(&path);

        let owner = OwnerId::new(1);
        let config = config();
        store.save(owner, "work", config.clone()).await.unwrap();

        // Multipart without a boundary parameter fails to parse
        let broken = b"From: a@b.com\r\nContent-Type: multipart/mixed\r\n\r\nbody".to_vec();
        let factory = ScriptedFactory::new(Mailbox::with_message(21, broken));
        let notifier = RecordingNotifier::default();
        let clock = MockClock::new(base_time());
        let pipeline = Pipeline::new(&factory, &notifier, &store, &clock);

        let mut state = AccountState::new();
        let report = pipeline
            .run_cycle(&mut state, owner, "work", &config)
            .await
            .unwrap();

        assert_eq!(report.evaluated, 1);
        assert_eq!(report.notified, 0);
        assert!(notifier.sent().is_empty());
        assert!(state.processed.contains(&21));

        cleanup(&path);
    }

    #[tokio::test]
    async fn test_notify_failure_logged_only() {
        let path = temp_path("notify-fail");
        cleanup(&path);
        let store = store(&path);

        let owner = OwnerId::new(1);
        let config = config();
        store.save(owner, "work", config.clone()).await.unwrap();

        let raw = raw_message("a@b.com", "Hello", "body");
        let factory = ScriptedFactory::new(Mailbox::with_message(5, raw));
        let notifier = RecordingNotifier::default();
        notifier.fail.store(true, Ordering::SeqCst);
        let clock = MockClock::new(base_time());
        let pipeline = Pipeline::new(&factory, &notifier, &store, &clock);

        let mut state = AccountState::new();
        let report = pipeline
            .run_cycle(&mut state, owner, "work", &config)
            .await
            .unwrap();

        assert_eq!(report.notified, 0);
        assert!(state.processed.contains(&5));

        cleanup(&path);
    }
}
