//! Durable account storage.
//!
//! All owners' named configurations live in one JSON document with
//! credentials encrypted at rest. Every mutation re-serializes the full
//! registry, writes it to a temporary sibling and atomically renames it over
//! the live file, so a reader always observes a complete old or new version.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::cipher::CredentialCipher;
use super::model::{
    AccountConfig, AccountPatch, DEFAULT_FOLDER, DEFAULT_POLL_INTERVAL_SECS, OwnerId, Secret,
};
use super::validation::{ValidationError, validate_config};
use crate::error::{Error, Result};

/// Version written into the persisted document.
const STORE_VERSION: u32 = 2;

/// In-memory registry: owner, then config name, to configuration.
pub type AccountRegistry = BTreeMap<OwnerId, BTreeMap<String, AccountConfig>>;

/// Outcome of loading the store from disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Records decrypted and loaded.
    pub recovered: usize,
    /// Records skipped because they were malformed or failed to decrypt.
    pub failed: usize,
}

/// Store for all owners' watched-mailbox configurations.
///
/// Cheap to clone; clones share the registry and serialize mutations through
/// one async mutex.
#[derive(Clone)]
pub struct AccountStore {
    inner: Arc<Mutex<StoreInner>>,
}

struct StoreInner {
    path: PathBuf,
    cipher: CredentialCipher,
    registry: AccountRegistry,
}

impl AccountStore {
    /// Open the store at `path`, with an empty registry when the file does
    /// not exist yet.
    ///
    /// The credential cipher is derived per [`CredentialCipher::for_store_path`].
    /// Legacy documents are migrated and immediately re-written in the
    /// versioned layout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] if the file exists but cannot be read
    /// or is structurally not a store document.
    pub fn open(path: impl Into<PathBuf>) -> Result<(Self, LoadReport)> {
        let path = path.into();
        let cipher = CredentialCipher::for_store_path(&path);
        Self::with_cipher(path, cipher)
    }

    /// Open the store with an explicit cipher.
    ///
    /// # Errors
    ///
    /// Same conditions as [`AccountStore::open`].
    pub fn with_cipher(
        path: impl Into<PathBuf>,
        cipher: CredentialCipher,
    ) -> Result<(Self, LoadReport)> {
        let path = path.into();
        let (registry, report, migrated) = load_registry(&path, &cipher)?;
        let inner = StoreInner {
            path,
            cipher,
            registry,
        };
        if migrated {
            persist(&inner)?;
            info!(path = %inner.path.display(), "legacy store document migrated to version {STORE_VERSION}");
        }
        Ok((
            Self {
                inner: Arc::new(Mutex::new(inner)),
            },
            report,
        ))
    }

    /// Insert or fully replace a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAccount`] if the configuration fails
    /// validation, or [`Error::Persistence`] / [`Error::Crypto`] if writing
    /// the document fails.
    pub async fn save(&self, owner: OwnerId, name: &str, config: AccountConfig) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::InvalidAccount("Config name is required".to_string()));
        }
        validate(&config)?;

        let mut inner = self.inner.lock().await;
        inner
            .registry
            .entry(owner)
            .or_default()
            .insert(name.to_string(), config);
        persist(&inner)?;
        debug!(owner = %owner, name = %name, "account saved");
        Ok(())
    }

    /// Partially update an existing configuration.
    ///
    /// Fields absent from the patch keep their current values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] if no configuration exists under
    /// the owner and name, [`Error::InvalidAccount`] if the patched result
    /// fails validation, or a persistence error if writing fails.
    pub async fn update(&self, owner: OwnerId, name: &str, patch: AccountPatch) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let config = inner
            .registry
            .get_mut(&owner)
            .and_then(|configs| configs.get_mut(name))
            .ok_or_else(|| Error::AccountNotFound(format!("owner {owner}, config '{name}'")))?;

        let mut updated = config.clone();
        updated.apply(patch);
        validate(&updated)?;
        *config = updated;

        persist(&inner)?;
        debug!(owner = %owner, name = %name, "account updated");
        Ok(())
    }

    /// Configuration stored under the owner and name, if any.
    pub async fn get(&self, owner: OwnerId, name: &str) -> Option<AccountConfig> {
        let inner = self.inner.lock().await;
        inner
            .registry
            .get(&owner)
            .and_then(|configs| configs.get(name))
            .cloned()
    }

    /// All of an owner's configurations, keyed by name.
    pub async fn get_all(&self, owner: OwnerId) -> BTreeMap<String, AccountConfig> {
        let inner = self.inner.lock().await;
        inner.registry.get(&owner).cloned().unwrap_or_default()
    }

    /// Delete one named configuration, or all of the owner's configurations
    /// when `name` is `None`.
    ///
    /// Removing the last configuration removes the owner entry entirely.
    /// Returns whether anything was removed.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if writing the document fails.
    pub async fn delete(&self, owner: OwnerId, name: Option<&str>) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let removed = match name {
            Some(name) => {
                if let Some(configs) = inner.registry.get_mut(&owner) {
                    let removed = configs.remove(name).is_some();
                    if configs.is_empty() {
                        inner.registry.remove(&owner);
                    }
                    removed
                } else {
                    false
                }
            }
            None => inner.registry.remove(&owner).is_some(),
        };

        if removed {
            persist(&inner)?;
            debug!(owner = %owner, name = ?name, "account(s) deleted");
        }
        Ok(removed)
    }

    /// Names configured for an owner.
    pub async fn list_names(&self, owner: OwnerId) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner
            .registry
            .get(&owner)
            .map(|configs| configs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Owners with at least one configuration.
    pub async fn owners(&self) -> Vec<OwnerId> {
        let inner = self.inner.lock().await;
        inner.registry.keys().copied().collect()
    }

    /// Copy of the whole registry.
    pub async fn snapshot(&self) -> AccountRegistry {
        self.inner.lock().await.registry.clone()
    }

    /// Persist a new high-water mark for one account.
    ///
    /// Marks never move backwards; an older timestamp is ignored. A missing
    /// account is also ignored, since it may have been deleted while a poll
    /// cycle was in flight.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if writing the document fails.
    pub async fn advance_last_check(
        &self,
        owner: OwnerId,
        name: &str,
        t: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let Some(config) = inner
            .registry
            .get_mut(&owner)
            .and_then(|configs| configs.get_mut(name))
        else {
            return Ok(());
        };
        if config.last_check_time.is_some_and(|prev| prev >= t) {
            return Ok(());
        }
        config.last_check_time = Some(t);
        persist(&inner)
    }

    /// Copy the live store file to `path`.
    ///
    /// The registry is persisted first when nothing has been written yet, so
    /// the backup always reflects the current state.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if writing or copying fails.
    pub async fn backup(&self, path: &Path) -> Result<()> {
        let inner = self.inner.lock().await;
        if !inner.path.exists() {
            persist(&inner)?;
        }
        std::fs::copy(&inner.path, path).map_err(|e| {
            Error::Persistence(format!("copy store to {}: {e}", path.display()))
        })?;
        info!(backup = %path.display(), "store backed up");
        Ok(())
    }

    /// Replace the live store from a backup file and reload the registry.
    ///
    /// The current live file is first copied to a `.bak` sibling so a bad
    /// restore can be undone. A backup in a legacy layout is migrated on
    /// load like any other document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] if the backup does not exist, cannot
    /// be copied, or does not load as a store document.
    pub async fn restore(&self, path: &Path) -> Result<LoadReport> {
        let mut inner = self.inner.lock().await;
        if !path.exists() {
            return Err(Error::Persistence(format!(
                "backup {} does not exist",
                path.display()
            )));
        }

        if inner.path.exists() {
            let safety = inner.path.with_extension("bak");
            std::fs::copy(&inner.path, &safety).map_err(|e| {
                Error::Persistence(format!("copy live store to {}: {e}", safety.display()))
            })?;
        }

        std::fs::copy(path, &inner.path).map_err(|e| {
            Error::Persistence(format!("copy backup over {}: {e}", inner.path.display()))
        })?;

        let (registry, report, migrated) = load_registry(&inner.path, &inner.cipher)?;
        inner.registry = registry;
        if migrated {
            persist(&inner)?;
        }
        info!(
            recovered = report.recovered,
            failed = report.failed,
            "store restored from backup"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for AccountStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccountStore")
    }
}

/// On-disk record shape; `secret` holds the encrypted token.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredAccount {
    host: String,
    port: u16,
    login: String,
    secret: String,
    #[serde(default = "default_folder")]
    folder: String,
    #[serde(default = "default_poll_interval")]
    poll_interval_seconds: u64,
    notify_target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sender_contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subject_contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    has_attachments: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_check_time: Option<DateTime<Utc>>,
}

fn default_folder() -> String {
    DEFAULT_FOLDER.to_string()
}

const fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

impl StoredAccount {
    /// Build the on-disk record, encrypting the secret.
    fn seal(config: &AccountConfig, cipher: &CredentialCipher) -> Result<Self> {
        Ok(Self {
            host: config.host.clone(),
            port: config.port,
            login: config.login.clone(),
            secret: cipher.encrypt(config.secret.expose())?,
            folder: config.folder.clone(),
            poll_interval_seconds: config.poll_interval_seconds,
            notify_target: config.notify_target.clone(),
            sender_contains: config.sender_contains.clone(),
            subject_contains: config.subject_contains.clone(),
            has_attachments: config.has_attachments,
            last_check_time: config.last_check_time,
        })
    }

    /// Recover the in-memory configuration, decrypting the secret.
    fn unseal(self, cipher: &CredentialCipher) -> Result<AccountConfig> {
        let secret = Secret::new(cipher.decrypt(&self.secret)?);
        Ok(AccountConfig {
            host: self.host,
            port: self.port,
            login: self.login,
            secret,
            folder: self.folder,
            poll_interval_seconds: self.poll_interval_seconds,
            notify_target: self.notify_target,
            sender_contains: self.sender_contains,
            subject_contains: self.subject_contains,
            has_attachments: self.has_attachments,
            last_check_time: self.last_check_time,
        })
    }
}

/// Serialized document layout.
#[derive(Serialize)]
struct VersionedDoc {
    version: u32,
    owners: BTreeMap<String, BTreeMap<String, StoredAccount>>,
}

/// Serialize the registry and write it via temp file + atomic rename.
fn persist(inner: &StoreInner) -> Result<()> {
    let mut owners = BTreeMap::new();
    for (owner, configs) in &inner.registry {
        let mut records = BTreeMap::new();
        for (name, config) in configs {
            records.insert(name.clone(), StoredAccount::seal(config, &inner.cipher)?);
        }
        owners.insert(owner.to_string(), records);
    }
    let doc = VersionedDoc {
        version: STORE_VERSION,
        owners,
    };
    let json = serde_json::to_string_pretty(&doc)
        .map_err(|e| Error::Persistence(format!("serialize store document: {e}")))?;

    if let Some(parent) = inner.path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::Persistence(format!("create {}: {e}", parent.display())))?;
    }

    let tmp = inner.path.with_extension("tmp");
    std::fs::write(&tmp, json)
        .map_err(|e| Error::Persistence(format!("write {}: {e}", tmp.display())))?;
    std::fs::rename(&tmp, &inner.path)
        .map_err(|e| Error::Persistence(format!("replace {}: {e}", inner.path.display())))?;
    Ok(())
}

/// Load the registry from disk.
///
/// Returns the registry, the per-record load report, and whether the
/// document was in a legacy layout and needs re-saving.
fn load_registry(
    path: &Path,
    cipher: &CredentialCipher,
) -> Result<(AccountRegistry, LoadReport, bool)> {
    if !path.exists() {
        return Ok((AccountRegistry::new(), LoadReport::default(), false));
    }

    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Persistence(format!("read {}: {e}", path.display())))?;
    let value: Value = serde_json::from_str(&text)
        .map_err(|e| Error::Persistence(format!("parse {}: {e}", path.display())))?;
    let Some(doc) = value.as_object() else {
        return Err(Error::Persistence(format!(
            "{} is not a JSON object",
            path.display()
        )));
    };

    if let Some(version) = doc.get("version") {
        let (registry, report) = load_versioned(doc, version, cipher)?;
        Ok((registry, report, false))
    } else {
        let (registry, report) = migrate_legacy(doc, cipher)?;
        info!(
            owners = registry.len(),
            recovered = report.recovered,
            failed = report.failed,
            "loaded legacy store document"
        );
        Ok((registry, report, true))
    }
}

fn load_versioned(
    doc: &Map<String, Value>,
    version: &Value,
    cipher: &CredentialCipher,
) -> Result<(AccountRegistry, LoadReport)> {
    let version = version
        .as_u64()
        .ok_or_else(|| Error::Persistence("store version is not a number".to_string()))?;
    if version != u64::from(STORE_VERSION) {
        return Err(Error::Persistence(format!(
            "unsupported store version {version}"
        )));
    }

    let owners = doc
        .get("owners")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::Persistence("store document has no owners map".to_string()))?;

    let mut registry = AccountRegistry::new();
    let mut report = LoadReport::default();
    for (owner_key, names) in owners {
        let owner = parse_owner(owner_key)?;
        let Some(names) = names.as_object() else {
            return Err(Error::Persistence(format!(
                "accounts of owner {owner} are not a map"
            )));
        };
        for (name, record) in names {
            collect_record(&mut registry, &mut report, owner, name, record, cipher);
        }
    }
    Ok((registry, report))
}

/// Accept the two pre-versioning layouts: `owner -> config` (flat, probed by
/// the `host` field) and `owner -> name -> config` (nested). Flat configs
/// take their name from the login.
fn migrate_legacy(
    doc: &Map<String, Value>,
    cipher: &CredentialCipher,
) -> Result<(AccountRegistry, LoadReport)> {
    let mut registry = AccountRegistry::new();
    let mut report = LoadReport::default();
    for (owner_key, entry) in doc {
        let owner = parse_owner(owner_key)?;
        let Some(obj) = entry.as_object() else {
            return Err(Error::Persistence(format!(
                "entry for owner {owner} is not a map"
            )));
        };

        if obj.contains_key("host") {
            let name = obj
                .get("login")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            collect_record(&mut registry, &mut report, owner, &name, entry, cipher);
        } else {
            for (name, record) in obj {
                collect_record(&mut registry, &mut report, owner, name, record, cipher);
            }
        }
    }
    Ok((registry, report))
}

/// Decode one record into the registry, isolating per-record failures.
fn collect_record(
    registry: &mut AccountRegistry,
    report: &mut LoadReport,
    owner: OwnerId,
    name: &str,
    record: &Value,
    cipher: &CredentialCipher,
) {
    match unseal_record(record, cipher) {
        Ok(config) => {
            registry
                .entry(owner)
                .or_default()
                .insert(name.to_string(), config);
            report.recovered += 1;
        }
        Err(e) => {
            warn!(owner = %owner, name = %name, error = %e, "skipping unreadable account record");
            report.failed += 1;
        }
    }
}

fn unseal_record(value: &Value, cipher: &CredentialCipher) -> Result<AccountConfig> {
    let record: StoredAccount = serde_json::from_value(value.clone())
        .map_err(|e| Error::Persistence(format!("malformed account record: {e}")))?;
    record.unseal(cipher)
}

fn parse_owner(key: &str) -> Result<OwnerId> {
    key.parse::<i64>().map(OwnerId::new).map_err(|_| {
        Error::Persistence(format!("invalid owner id '{key}' in store document"))
    })
}

fn validate(config: &AccountConfig) -> Result<()> {
    validate_config(config).map_err(|errors| {
        let joined = errors
            .iter()
            .map(ValidationError::message)
            .collect::<Vec<_>>()
            .join("; ");
        Error::InvalidAccount(joined)
    })
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
    use chrono::TimeZone;

    use super::*;

    fn test_cipher() -> CredentialCipher {
        CredentialCipher::from_passphrase("store-tests")
    }

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "mailwatch-store-{tag}-{}.json",
            std::process::id()
        ))
    }

    fn cleanup(path: &Path) {
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(path.with_extension("tmp"));
        let _ = std::fs::remove_file(path.with_extension("bak"));
    }

    fn config() -> AccountConfig {
        let mut config = AccountConfig::new(
            "imap.example.com",
            993,
            "user@example.com",
            Secret::from("pw"),
            "chat-1",
        );
        config.subject_contains = Some("invoice".to_string());
        config
    }

    #[tokio::test]
    async fn test_open_missing_file_starts_empty() {
        let path = temp_path("missing");
        cleanup(&path);

        let (store, report) = AccountStore::with_cipher(&path, test_cipher()).unwrap();
        assert_eq!(report, LoadReport::default());
        assert!(store.owners().await.is_empty());

        cleanup(&path);
    }

    #[tokio::test]
    async fn test_save_and_reload_round_trip() {
        let path = temp_path("round-trip");
        cleanup(&path);

        let (store, _) = AccountStore::with_cipher(&path, test_cipher()).unwrap();
        store
            .save(OwnerId::new(1), "work", config())
            .await
            .unwrap();

        let (reloaded, report) = AccountStore::with_cipher(&path, test_cipher()).unwrap();
        assert_eq!(report.recovered, 1);
        assert_eq!(report.failed, 0);

        let loaded = reloaded.get(OwnerId::new(1), "work").await.unwrap();
        assert_eq!(loaded.host, "imap.example.com");
        assert_eq!(loaded.port, 993);
        assert_eq!(loaded.login, "user@example.com");
        assert_eq!(loaded.secret.expose(), "pw");
        assert_eq!(loaded.folder, "INBOX");
        assert_eq!(loaded.poll_interval_seconds, 300);
        assert_eq!(loaded.notify_target, "chat-1");
        assert_eq!(loaded.subject_contains.as_deref(), Some("invoice"));
        assert!(loaded.sender_contains.is_none());
        assert!(loaded.has_attachments.is_none());

        cleanup(&path);
    }

    #[tokio::test]
    async fn test_secret_never_plaintext_on_disk() {
        let path = temp_path("sealed");
        cleanup(&path);

        let (store, _) = AccountStore::with_cipher(&path, test_cipher()).unwrap();
        let mut cfg = config();
        cfg.secret = Secret::from("super-secret-password");
        store.save(OwnerId::new(1), "work", cfg).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("super-secret-password"));
        assert!(text.contains("\"version\": 2"));

        cleanup(&path);
    }

    #[tokio::test]
    async fn test_delete_last_config_removes_owner() {
        let path = temp_path("delete-last");
        cleanup(&path);

        let (store, _) = AccountStore::with_cipher(&path, test_cipher()).unwrap();
        let owner = OwnerId::new(9);
        store.save(owner, "only", config()).await.unwrap();

        assert!(store.delete(owner, Some("only")).await.unwrap());
        assert!(store.list_names(owner).await.is_empty());
        assert!(store.owners().await.is_empty());

        // The persisted document has no residue either
        let (reloaded, _) = AccountStore::with_cipher(&path, test_cipher()).unwrap();
        assert!(reloaded.owners().await.is_empty());

        cleanup(&path);
    }

    #[tokio::test]
    async fn test_delete_all_for_owner() {
        let path = temp_path("delete-all");
        cleanup(&path);

        let (store, _) = AccountStore::with_cipher(&path, test_cipher()).unwrap();
        let owner = OwnerId::new(3);
        store.save(owner, "a", config()).await.unwrap();
        store.save(owner, "b", config()).await.unwrap();

        assert!(store.delete(owner, None).await.unwrap());
        assert!(store.owners().await.is_empty());
        assert!(!store.delete(owner, None).await.unwrap());

        cleanup(&path);
    }

    #[tokio::test]
    async fn test_delete_missing_returns_false() {
        let path = temp_path("delete-missing");
        cleanup(&path);

        let (store, _) = AccountStore::with_cipher(&path, test_cipher()).unwrap();
        assert!(!store.delete(OwnerId::new(1), Some("nope")).await.unwrap());

        cleanup(&path);
    }

    #[tokio::test]
    async fn test_update_patches_and_persists() {
        let path = temp_path("update");
        cleanup(&path);

        let (store, _) = AccountStore::with_cipher(&path, test_cipher()).unwrap();
        let owner = OwnerId::new(5);
        store.save(owner, "work", config()).await.unwrap();

        store
            .update(
                owner,
                "work",
                AccountPatch {
                    port: Some(1993),
                    sender_contains: Some(Some("billing@".to_string())),
                    subject_contains: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let (reloaded, _) = AccountStore::with_cipher(&path, test_cipher()).unwrap();
        let loaded = reloaded.get(owner, "work").await.unwrap();
        assert_eq!(loaded.port, 1993);
        assert_eq!(loaded.sender_contains.as_deref(), Some("billing@"));
        assert!(loaded.subject_contains.is_none());
        // Untouched fields survive
        assert_eq!(loaded.secret.expose(), "pw");

        cleanup(&path);
    }

    #[tokio::test]
    async fn test_update_missing_account() {
        let path = temp_path("update-missing");
        cleanup(&path);

        let (store, _) = AccountStore::with_cipher(&path, test_cipher()).unwrap();
        let result = store
            .update(OwnerId::new(1), "ghost", AccountPatch::default())
            .await;
        assert!(matches!(result, Err(Error::AccountNotFound(_))));

        cleanup(&path);
    }

    #[tokio::test]
    async fn test_save_rejects_invalid_config() {
        let path = temp_path("invalid");
        cleanup(&path);

        let (store, _) = AccountStore::with_cipher(&path, test_cipher()).unwrap();
        let mut bad = config();
        bad.port = 0;
        bad.secret = Secret::default();

        let result = store.save(OwnerId::new(1), "work", bad).await;
        assert!(matches!(result, Err(Error::InvalidAccount(_))));
        assert!(store.owners().await.is_empty());

        cleanup(&path);
    }

    #[tokio::test]
    async fn test_save_rejects_empty_name() {
        let path = temp_path("empty-name");
        cleanup(&path);

        let (store, _) = AccountStore::with_cipher(&path, test_cipher()).unwrap();
        let result = store.save(OwnerId::new(1), "  ", config()).await;
        assert!(matches!(result, Err(Error::InvalidAccount(_))));

        cleanup(&path);
    }

    #[tokio::test]
    async fn test_legacy_flat_migration() {
        let path = temp_path("legacy-flat");
        cleanup(&path);

        let cipher = test_cipher();
        let token = cipher.encrypt("pw").unwrap();
        let legacy = serde_json::json!({
            "42": {
                "host": "imap.example.com",
                "port": 993,
                "login": "a@b.com",
                "secret": token,
                "notify_target": "chat-42"
            }
        });
        std::fs::write(&path, serde_json::to_string(&legacy).unwrap()).unwrap();

        let (store, report) = AccountStore::with_cipher(&path, cipher).unwrap();
        assert_eq!(report.recovered, 1);
        assert_eq!(report.failed, 0);

        // The flat config lands under its login, with defaults filled in
        let loaded = store.get(OwnerId::new(42), "a@b.com").await.unwrap();
        assert_eq!(loaded.secret.expose(), "pw");
        assert_eq!(loaded.folder, "INBOX");
        assert_eq!(loaded.poll_interval_seconds, 300);

        // The file is immediately re-written in the versioned layout
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"version\": 2"));
        assert!(text.contains("\"a@b.com\""));

        cleanup(&path);
    }

    #[tokio::test]
    async fn test_legacy_nested_migration() {
        let path = temp_path("legacy-nested");
        cleanup(&path);

        let cipher = test_cipher();
        let record = |login: &str| {
            serde_json::json!({
                "host": "imap.example.com",
                "port": 993,
                "login": login,
                "secret": cipher.encrypt("pw").unwrap(),
                "notify_target": "chat-7"
            })
        };
        let legacy = serde_json::json!({
            "7": {
                "work": record("w@example.com"),
                "home": record("h@example.com")
            }
        });
        std::fs::write(&path, serde_json::to_string(&legacy).unwrap()).unwrap();

        let (store, report) = AccountStore::with_cipher(&path, cipher).unwrap();
        assert_eq!(report.recovered, 2);
        assert_eq!(
            store.list_names(OwnerId::new(7)).await,
            vec!["home".to_string(), "work".to_string()]
        );

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"version\": 2"));

        cleanup(&path);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_skipped() {
        let path = temp_path("corrupt");
        cleanup(&path);

        let cipher = test_cipher();
        let good_token = cipher.encrypt("pw").unwrap();
        let doc = serde_json::json!({
            "version": 2,
            "owners": {
                "1": {
                    "good": {
                        "host": "imap.example.com",
                        "port": 993,
                        "login": "good@example.com",
                        "secret": good_token,
                        "notify_target": "chat-1"
                    },
                    "bad": {
                        "host": "imap.example.com",
                        "port": 993,
                        "login": "bad@example.com",
                        "secret": "%%% not a token %%%",
                        "notify_target": "chat-1"
                    }
                }
            }
        });
        std::fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();

        let (store, report) = AccountStore::with_cipher(&path, cipher).unwrap();
        assert_eq!(report.recovered, 1);
        assert_eq!(report.failed, 1);
        assert!(store.get(OwnerId::new(1), "good").await.is_some());
        assert!(store.get(OwnerId::new(1), "bad").await.is_none());

        cleanup(&path);
    }

    #[tokio::test]
    async fn test_unsupported_version_is_an_error() {
        let path = temp_path("future-version");
        cleanup(&path);

        std::fs::write(&path, r#"{"version": 3, "owners": {}}"#).unwrap();
        let result = AccountStore::with_cipher(&path, test_cipher());
        assert!(matches!(result, Err(Error::Persistence(_))));

        cleanup(&path);
    }

    #[tokio::test]
    async fn test_advance_last_check_is_monotonic() {
        let path = temp_path("advance");
        cleanup(&path);

        let (store, _) = AccountStore::with_cipher(&path, test_cipher()).unwrap();
        let owner = OwnerId::new(2);
        store.save(owner, "work", config()).await.unwrap();

        let t1 = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 11, 0, 0).unwrap();

        store.advance_last_check(owner, "work", t1).await.unwrap();
        store.advance_last_check(owner, "work", t0).await.unwrap();

        let (reloaded, _) = AccountStore::with_cipher(&path, test_cipher()).unwrap();
        let loaded = reloaded.get(owner, "work").await.unwrap();
        assert_eq!(loaded.last_check_time, Some(t1));

        // Advancing an unknown account is quietly ignored
        store
            .advance_last_check(owner, "ghost", t1)
            .await
            .unwrap();

        cleanup(&path);
    }

    #[tokio::test]
    async fn test_backup_and_restore() {
        let path = temp_path("backup");
        let backup = temp_path("backup-copy");
        cleanup(&path);
        cleanup(&backup);

        let (store, _) = AccountStore::with_cipher(&path, test_cipher()).unwrap();
        let owner = OwnerId::new(4);
        store.save(owner, "keep", config()).await.unwrap();
        store.backup(&backup).await.unwrap();

        // Mutate past the backup point
        store.save(owner, "extra", config()).await.unwrap();
        store.delete(owner, Some("keep")).await.unwrap();
        assert_eq!(store.list_names(owner).await, vec!["extra".to_string()]);

        let report = store.restore(&backup).await.unwrap();
        assert_eq!(report.recovered, 1);
        assert_eq!(store.list_names(owner).await, vec!["keep".to_string()]);

        // The pre-restore live file was kept as a .bak sibling
        assert!(path.with_extension("bak").exists());

        cleanup(&path);
        cleanup(&backup);
    }

    #[tokio::test]
    async fn test_restore_missing_backup() {
        let path = temp_path("restore-missing");
        cleanup(&path);

        let (store, _) = AccountStore::with_cipher(&path, test_cipher()).unwrap();
        let bogus = temp_path("no-such-backup");
        let result = store.restore(&bogus).await;
        assert!(matches!(result, Err(Error::Persistence(_))));

        cleanup(&path);
    }
}
