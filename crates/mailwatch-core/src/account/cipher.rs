//! Credential encryption at rest.
//!
//! Stored credentials are sealed with AES-256-GCM under a key derived from a
//! passphrase via PBKDF2-HMAC-SHA256. The salt is a fixed application
//! constant so the same passphrase yields the same key across restarts.
//!
//! The passphrase comes from the `MAILWATCH_MASTER_SECRET` environment
//! variable when set, and otherwise from a machine-and-path identity so the
//! store stays usable without operator input. The fallback only protects
//! against casual inspection of the store file; set the environment variable
//! for a real secret.

use std::path::Path;

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use pbkdf2::pbkdf2_hmac_array;
use sha2::Sha256;
use tracing::debug;

use crate::error::{Error, Result};

/// Application-specific salt for key derivation.
const APP_SALT: &[u8] = b"mailwatch.credential.salt.v1";

/// PBKDF2 iteration count.
const PBKDF2_ROUNDS: u32 = 100_000;

/// Nonce size for AES-GCM (96 bits / 12 bytes).
const NONCE_SIZE: usize = 12;

/// Environment variable holding the master passphrase.
pub const MASTER_SECRET_ENV: &str = "MAILWATCH_MASTER_SECRET";

/// Seals and opens credential tokens for the account store.
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl CredentialCipher {
    /// Derive the cipher from an explicit passphrase.
    #[must_use]
    pub fn from_passphrase(passphrase: &str) -> Self {
        let key =
            pbkdf2_hmac_array::<Sha256, 32>(passphrase.as_bytes(), APP_SALT, PBKDF2_ROUNDS);
        Self {
            cipher: Aes256Gcm::new(&key.into()),
        }
    }

    /// Build the cipher for a store file at `path`.
    ///
    /// Uses [`MASTER_SECRET_ENV`] when set and non-empty, otherwise derives
    /// the passphrase from the machine hostname and the absolute store path.
    #[must_use]
    pub fn for_store_path(path: &Path) -> Self {
        match std::env::var(MASTER_SECRET_ENV) {
            Ok(passphrase) if !passphrase.is_empty() => Self::from_passphrase(&passphrase),
            _ => {
                debug!(
                    "{MASTER_SECRET_ENV} not set, deriving key from machine identity and store path"
                );
                Self::from_passphrase(&fallback_passphrase(path))
            }
        }
    }

    /// Encrypt a plaintext credential.
    ///
    /// Returns a base64-encoded token containing `nonce || ciphertext`. A
    /// fresh random nonce is drawn per call, so encrypting the same value
    /// twice yields different tokens.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Crypto`] if encryption fails.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| Error::Crypto(format!("encryption failed: {e}")))?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(&combined))
    }

    /// Decrypt a token produced by [`CredentialCipher::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Crypto`] if the token is not valid base64, is too
    /// short to carry a nonce, fails authentication (wrong key or tampered
    /// data), or does not decrypt to UTF-8.
    pub fn decrypt(&self, token: &str) -> Result<String> {
        let combined = BASE64
            .decode(token)
            .map_err(|e| Error::Crypto(format!("invalid token encoding: {e}")))?;

        if combined.len() < NONCE_SIZE {
            return Err(Error::Crypto(format!(
                "token too short: {} bytes",
                combined.len()
            )));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| Error::Crypto("decryption failed (wrong key or corrupted token)".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| Error::Crypto(format!("decrypted data is not valid UTF-8: {e}")))
    }
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialCipher")
    }
}

/// Machine-and-path passphrase used when no master secret is configured.
fn fallback_passphrase(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    format!("{}-{}", hostname(), absolute.display())
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "localhost".to_string())
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
    use std::sync::LazyLock;

    use proptest::prelude::*;

    use super::*;

    static CIPHER: LazyLock<CredentialCipher> =
        LazyLock::new(|| CredentialCipher::from_passphrase("test-passphrase"));

    #[test]
    fn test_round_trip() {
        let token = CIPHER.encrypt("my_secret_password_123!").unwrap();
        assert_ne!(token, "my_secret_password_123!");
        assert!(BASE64.decode(&token).is_ok());
        assert_eq!(CIPHER.decrypt(&token).unwrap(), "my_secret_password_123!");
    }

    #[test]
    fn test_same_plaintext_different_tokens() {
        let token1 = CIPHER.encrypt("same_password").unwrap();
        let token2 = CIPHER.encrypt("same_password").unwrap();

        // Random nonces make tokens unique
        assert_ne!(token1, token2);
        assert_eq!(CIPHER.decrypt(&token1).unwrap(), "same_password");
        assert_eq!(CIPHER.decrypt(&token2).unwrap(), "same_password");
    }

    #[test]
    fn test_same_passphrase_same_key() {
        let other = CredentialCipher::from_passphrase("test-passphrase");
        let token = CIPHER.encrypt("pw").unwrap();
        assert_eq!(other.decrypt(&token).unwrap(), "pw");
    }

    #[test]
    fn test_wrong_passphrase_fails() {
        let other = CredentialCipher::from_passphrase("another-passphrase");
        let token = CIPHER.encrypt("pw").unwrap();
        assert!(matches!(other.decrypt(&token), Err(Error::Crypto(_))));
    }

    #[test]
    fn test_malformed_tokens() {
        // Not base64
        assert!(CIPHER.decrypt("not_base64!@#$%").is_err());

        // Valid base64 but shorter than a nonce
        assert!(CIPHER.decrypt(&BASE64.encode("short")).is_err());

        // Valid base64, nonce-sized, but not a real token
        assert!(CIPHER.decrypt(&BASE64.encode([0u8; 32])).is_err());

        // Empty token
        assert!(CIPHER.decrypt("").is_err());
    }

    #[test]
    fn test_store_path_cipher_is_deterministic() {
        let path = Path::new("/tmp/mailwatch-test/accounts.json");
        let first = CredentialCipher::for_store_path(path);
        let second = CredentialCipher::for_store_path(path);

        let token = first.encrypt("pw").unwrap();
        assert_eq!(second.decrypt(&token).unwrap(), "pw");
    }

    proptest! {
        #[test]
        fn round_trip_preserves_plaintext(plaintext in ".*") {
            let token = CIPHER.encrypt(&plaintext).unwrap();
            prop_assert_eq!(CIPHER.decrypt(&token).unwrap(), plaintext);
        }
    }
}
