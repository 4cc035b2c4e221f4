//! Polling engine.
//!
//! One scheduling unit (a tokio task) per owner runs poll cycles for all
//! of that owner's accounts sequentially, then sleeps for the shortest
//! poll interval among them. Stopping is cooperative: the unit observes a
//! stop request at its next wake point, finishes in-flight cycle work,
//! logs out its open sessions and exits. A unit that hits an error no
//! cycle can absorb sends one best-effort notice to the owner and
//! terminates; it is not restarted automatically.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::account::{
    AccountConfig, AccountStore, DEFAULT_POLL_INTERVAL_SECS, MIN_POLL_INTERVAL_SECS, OwnerId,
};
use crate::error::Error;
use crate::time::Clock;
use crate::watch::{AccountState, Notifier, Pipeline, SessionFactory};

/// One running owner unit: its stop signal and task handle.
struct OwnerUnit {
    id: u64,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

type SharedUnits = Arc<Mutex<HashMap<OwnerId, OwnerUnit>>>;

/// Schedules mailbox polling, one independent unit per owner.
///
/// The engine owns the session factory, the notifier and the clock; each
/// unit owns its accounts' session slots and dedup sets for as long as it
/// runs. Accounts are re-read from the store at every cycle, so saves and
/// deletes take effect without restarting the unit.
pub struct PollingEngine<F, N, C> {
    store: AccountStore,
    factory: Arc<F>,
    notifier: Arc<N>,
    clock: Arc<C>,
    units: SharedUnits,
    next_unit: AtomicU64,
}

impl<F, N, C> PollingEngine<F, N, C>
where
    F: SessionFactory + 'static,
    F::Session: 'static,
    N: Notifier + 'static,
    C: Clock + 'static,
{
    /// Create an engine with no units running.
    #[must_use]
    pub fn new(store: AccountStore, factory: F, notifier: N, clock: C) -> Self {
        Self {
            store,
            factory: Arc::new(factory),
            notifier: Arc::new(notifier),
            clock: Arc::new(clock),
            units: Arc::new(Mutex::new(HashMap::new())),
            next_unit: AtomicU64::new(0),
        }
    }

    /// Start monitoring an owner's accounts.
    ///
    /// Returns `false` without side effects when a unit for the owner is
    /// already running. A unit started for an owner with no stored
    /// accounts exits on its first cycle.
    pub async fn start(&self, owner: OwnerId) -> bool {
        let mut units = self.units.lock().await;
        if units.get(&owner).is_some_and(|unit| !unit.handle.is_finished()) {
            info!(owner = %owner, "monitoring already running");
            return false;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let id = self.next_unit.fetch_add(1, Ordering::Relaxed);
        let context = UnitContext {
            owner,
            store: self.store.clone(),
            factory: Arc::clone(&self.factory),
            notifier: Arc::clone(&self.notifier),
            clock: Arc::clone(&self.clock),
            units: Arc::clone(&self.units),
            id,
        };
        let handle = tokio::spawn(context.run(shutdown_rx));
        units.insert(
            owner,
            OwnerUnit {
                id,
                shutdown: shutdown_tx,
                handle,
            },
        );
        true
    }

    /// Stop monitoring an owner's accounts.
    ///
    /// Removes the unit from the running set, wakes it and waits for it
    /// to log out its sessions and exit. Returns `false` when no unit
    /// was running for the owner.
    pub async fn stop(&self, owner: OwnerId) -> bool {
        let Some(unit) = self.units.lock().await.remove(&owner) else {
            return false;
        };

        let _ = unit.shutdown.send(true);
        if let Err(e) = unit.handle.await {
            warn!(owner = %owner, error = %e, "monitoring unit join failed");
        }
        true
    }

    /// Whether a unit is currently running for the owner.
    pub async fn status(&self, owner: OwnerId) -> bool {
        self.units
            .lock()
            .await
            .get(&owner)
            .is_some_and(|unit| !unit.handle.is_finished())
    }

    /// Stop every running unit.
    pub async fn stop_all(&self) {
        let owners: Vec<OwnerId> = self.units.lock().await.keys().copied().collect();
        for owner in owners {
            self.stop(owner).await;
        }
    }
}

impl<F, N, C> std::fmt::Debug for PollingEngine<F, N, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PollingEngine")
    }
}

/// Everything one owner unit needs, moved into its task.
struct UnitContext<F: SessionFactory, N, C> {
    owner: OwnerId,
    store: AccountStore,
    factory: Arc<F>,
    notifier: Arc<N>,
    clock: Arc<C>,
    units: SharedUnits,
    id: u64,
}

impl<F, N, C> UnitContext<F, N, C>
where
    F: SessionFactory,
    N: Notifier,
    C: Clock,
{
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(owner = %self.owner, "mailbox monitoring started");
        let mut states: HashMap<String, AccountState<F::Session>> = HashMap::new();

        loop {
            if *shutdown.borrow() {
                info!(owner = %self.owner, "monitoring stopped");
                break;
            }

            let configs = self.store.get_all(self.owner).await;
            if configs.is_empty() {
                info!(owner = %self.owner, "no accounts left to watch, monitoring ends");
                break;
            }

            self.drop_deleted_accounts(&mut states, &configs).await;

            if let Some((target, e)) = self.poll_accounts(&mut states, &configs).await {
                error!(owner = %self.owner, error = %e, "monitoring unit failed");
                let text = format!(
                    "Mailbox monitoring for your accounts has stopped: {e}\n\
                     It will not retry on its own; start it again once the problem is fixed."
                );
                if let Err(notify_err) = self.notifier.notify(&target, &text).await {
                    warn!(owner = %self.owner, error = %notify_err, "failure notice not delivered");
                }
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    // A closed channel means the engine itself is gone.
                    if changed.is_err() {
                        break;
                    }
                }
                () = sleep(cycle_wait(&configs)) => {}
            }
        }

        for state in states.values_mut() {
            state.session.close().await;
        }

        let mut units = self.units.lock().await;
        if units.get(&self.owner).is_some_and(|unit| unit.id == self.id) {
            units.remove(&self.owner);
        }
    }

    /// Run one cycle for every account, in name order.
    ///
    /// Connection-class failures are confined to their account; anything
    /// else is fatal to the unit and returned with the notify target of
    /// the account that hit it.
    async fn poll_accounts(
        &self,
        states: &mut HashMap<String, AccountState<F::Session>>,
        configs: &BTreeMap<String, AccountConfig>,
    ) -> Option<(String, Error)> {
        let pipeline = Pipeline::new(
            self.factory.as_ref(),
            self.notifier.as_ref(),
            &self.store,
            self.clock.as_ref(),
        );
        for (name, config) in configs {
            let state = states.entry(name.clone()).or_default();
            match pipeline.run_cycle(state, self.owner, name, config).await {
                Ok(_) => {}
                Err(
                    e @ (Error::Connection(_)
                    | Error::Authentication(_)
                    | Error::FolderSelection(_)),
                ) => {
                    warn!(owner = %self.owner, name = %name, error = %e, "account cycle failed");
                }
                Err(e) => return Some((config.notify_target.clone(), e)),
            }
        }
        None
    }

    /// Drop state for accounts deleted since the last cycle, logging out
    /// their sessions.
    async fn drop_deleted_accounts(
        &self,
        states: &mut HashMap<String, AccountState<F::Session>>,
        configs: &BTreeMap<String, AccountConfig>,
    ) {
        let gone: Vec<String> = states
            .keys()
            .filter(|name| !configs.contains_key(*name))
            .cloned()
            .collect();
        for name in gone {
            if let Some(mut state) = states.remove(&name) {
                debug!(owner = %self.owner, name = %name, "account deleted, closing its session");
                state.session.close().await;
            }
        }
    }
}

/// Sleep until the next cycle: the owner's shortest poll interval,
/// floored at the minimum.
fn cycle_wait(configs: &BTreeMap<String, AccountConfig>) -> Duration {
    let shortest = configs
        .values()
        .map(|config| config.poll_interval_seconds)
        .min()
        .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
    Duration::from_secs(shortest.max(MIN_POLL_INTERVAL_SECS))
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
    use std::path::{Path, PathBuf};
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, AtomicU32};

    use chrono::{TimeZone, Utc};
    use mailwatch_imap::SearchCriteria;

    use super::*;
    use crate::account::{CredentialCipher, Secret};
    use crate::error::Result;
    use crate::time::MockClock;
    use crate::watch::MailSession;

    struct CountingSession {
        counters: Arc<Counters>,
        ids: Vec<u32>,
        raw: Vec<u8>,
    }

    impl MailSession for CountingSession {
        async fn noop(&mut self) -> Result<()> {
            Ok(())
        }

        async fn search(&mut self, _criteria: &SearchCriteria) -> Result<Vec<u32>> {
            self.counters.searches.fetch_add(1, Ordering::SeqCst);
            Ok(self.ids.clone())
        }

        async fn fetch(&mut self, _seq: u32) -> Result<Option<Vec<u8>>> {
            Ok(Some(self.raw.clone()))
        }

        async fn logout(self) -> Result<()> {
            self.counters.logouts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Counters {
        opens: AtomicU32,
        searches: AtomicU32,
        logouts: AtomicU32,
    }

    struct CountingFactory {
        counters: Arc<Counters>,
        fail: AtomicBool,
        ids: Vec<u32>,
        raw: Vec<u8>,
    }

    impl CountingFactory {
        fn new(ids: Vec<u32>, raw: Vec<u8>) -> (Self, Arc<Counters>) {
            let counters = Arc::new(Counters::default());
            let factory = Self {
                counters: Arc::clone(&counters),
                fail: AtomicBool::new(false),
                ids,
                raw,
            };
            (factory, counters)
        }
    }

    impl SessionFactory for CountingFactory {
        type Session = CountingSession;

        async fn open(&self, _config: &AccountConfig) -> Result<CountingSession> {
            self.counters.opens.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Connection("connection refused".to_string()));
            }
            Ok(CountingSession {
                counters: Arc::clone(&self.counters),
                ids: self.ids.clone(),
                raw: self.raw.clone(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: StdMutex<Vec<(String, String)>>,
    }

    impl RecordingNotifier {
        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Notifier for Arc<RecordingNotifier> {
        async fn notify(&self, target: &str, text: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((target.to_string(), text.to_string()));
            Ok(())
        }
    }

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "mailwatch-engine-{tag}-{}.json",
            std::process::id()
        ))
    }

    fn cleanup(path: &Path) {
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_dir(path);
        let _ = std::fs::remove_file(path.with_extension("tmp"));
    }

    fn store(path: &Path) -> AccountStore {
        let (store, _) =
            AccountStore::with_cipher(path, CredentialCipher::from_passphrase("engine-tests"))
                .unwrap();
        store
    }

    fn config(target: &str, interval: u64) -> AccountConfig {
        let mut config = AccountConfig::new(
            "imap.example.com",
            993,
            "user@example.com",
            Secret::from("pw"),
            target,
        );
        config.poll_interval_seconds = interval;
        config
    }

    fn raw_message() -> Vec<u8> {
        b"From: a@b.com\r\nSubject: Hello\r\nDate: Mon, 2 Mar 2026 10:00:00 +0000\r\n\r\nhi"
            .to_vec()
    }

    fn clock() -> Arc<MockClock> {
        MockClock::shared(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap())
    }

    fn engine(
        store: &AccountStore,
        factory: CountingFactory,
        notifier: &Arc<RecordingNotifier>,
    ) -> PollingEngine<CountingFactory, Arc<RecordingNotifier>, Arc<MockClock>> {
        PollingEngine::new(store.clone(), factory, Arc::clone(notifier), clock())
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop_status() {
        let path = temp_path("start-stop");
        cleanup(&path);
        let store = store(&path);

        let owner = OwnerId::new(1);
        store.save(owner, "work", config("chat-1", 60)).await.unwrap();

        let (factory, _) = CountingFactory::new(vec![], raw_message());
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = engine(&store, factory, &notifier);

        assert!(engine.start(owner).await);
        assert!(engine.status(owner).await);

        // Starting again is a reported no-op
        assert!(!engine.start(owner).await);

        assert!(engine.stop(owner).await);
        assert!(!engine.status(owner).await);
        assert!(!engine.stop(owner).await);

        cleanup(&path);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unit_cycles_all_accounts_at_min_interval() {
        let path = temp_path("cycles");
        cleanup(&path);
        let store = store(&path);

        let owner = OwnerId::new(2);
        store.save(owner, "a", config("chat-a", 60)).await.unwrap();
        store.save(owner, "b", config("chat-b", 300)).await.unwrap();

        let (factory, counters) = CountingFactory::new(vec![1], raw_message());
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = engine(&store, factory, &notifier);

        engine.start(owner).await;

        // First cycle runs immediately: both accounts searched, in name
        // order, and the single unseen message notified once per account.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(counters.searches.load(Ordering::SeqCst), 2);
        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, "chat-a");
        assert_eq!(sent[1].0, "chat-b");

        // The unit sleeps for the shortest interval (60s, not 300s); the
        // second cycle finds nothing new thanks to the dedup sets.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(counters.searches.load(Ordering::SeqCst), 4);
        assert_eq!(notifier.sent().len(), 2);

        engine.stop(owner).await;
        cleanup(&path);
    }

    #[tokio::test(start_paused = true)]
    async fn test_account_changes_picked_up_between_cycles() {
        let path = temp_path("changes");
        cleanup(&path);
        let store = store(&path);

        let owner = OwnerId::new(3);
        store.save(owner, "a", config("chat-a", 60)).await.unwrap();

        let (factory, counters) = CountingFactory::new(vec![], raw_message());
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = engine(&store, factory, &notifier);

        engine.start(owner).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(counters.searches.load(Ordering::SeqCst), 1);

        // An account saved mid-run joins the next cycle.
        store.save(owner, "b", config("chat-b", 60)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(counters.searches.load(Ordering::SeqCst), 3);

        // A deleted account has its session logged out at the next cycle.
        store.delete(owner, Some("b")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(counters.logouts.load(Ordering::SeqCst), 1);
        assert!(engine.status(owner).await);

        // Stopping logs out the remaining session.
        engine.stop(owner).await;
        assert_eq!(counters.logouts.load(Ordering::SeqCst), 2);

        cleanup(&path);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unit_exits_when_owner_has_no_accounts() {
        let path = temp_path("empty-owner");
        cleanup(&path);
        let store = store(&path);

        let (factory, counters) = CountingFactory::new(vec![], raw_message());
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = engine(&store, factory, &notifier);

        assert!(engine.start(OwnerId::new(9)).await);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(!engine.status(OwnerId::new(9)).await);
        assert_eq!(counters.opens.load(Ordering::SeqCst), 0);

        cleanup(&path);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_failures_stay_local_to_the_account() {
        let path = temp_path("conn-local");
        cleanup(&path);
        let store = store(&path);

        let owner = OwnerId::new(4);
        store.save(owner, "broken", config("chat-x", 60)).await.unwrap();

        let (factory, counters) = CountingFactory::new(vec![], raw_message());
        factory.fail.store(true, Ordering::SeqCst);
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = engine(&store, factory, &notifier);

        engine.start(owner).await;
        tokio::time::sleep(Duration::from_secs(61)).await;

        // Two failed cycles so far; the unit is still alive and no
        // failure notice went out.
        assert_eq!(counters.opens.load(Ordering::SeqCst), 2);
        assert!(engine.status(owner).await);
        assert!(notifier.sent().is_empty());

        engine.stop(owner).await;
        cleanup(&path);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unit_failure_notifies_owner_and_terminates() {
        let path = temp_path("fatal");
        cleanup(&path);
        let store = store(&path);

        let owner = OwnerId::new(5);
        store.save(owner, "work", config("chat-5", 60)).await.unwrap();

        // Make the next persist fail: the live file becomes a directory,
        // so the atomic rename in advance_last_check cannot succeed.
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        let (factory, _) = CountingFactory::new(vec![1], raw_message());
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = engine(&store, factory, &notifier);

        engine.start(owner).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(!engine.status(owner).await);
        let sent = notifier.sent();
        // The message notification went out before the persist failure,
        // then the best-effort failure notice.
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].0, "chat-5");
        assert!(sent[1].1.contains("stopped"));

        cleanup(&path);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_all() {
        let path = temp_path("stop-all");
        cleanup(&path);
        let store = store(&path);

        store
            .save(OwnerId::new(6), "a", config("chat-6", 60))
            .await
            .unwrap();
        store
            .save(OwnerId::new(7), "b", config("chat-7", 60))
            .await
            .unwrap();

        let (factory, _) = CountingFactory::new(vec![], raw_message());
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = engine(&store, factory, &notifier);

        engine.start(OwnerId::new(6)).await;
        engine.start(OwnerId::new(7)).await;

        engine.stop_all().await;
        assert!(!engine.status(OwnerId::new(6)).await);
        assert!(!engine.status(OwnerId::new(7)).await);

        cleanup(&path);
    }
}
