//! Credential vault: symmetric encryption of stored account secrets.
//!
//! Secrets live in the account table as `base64(nonce || ciphertext)` under
//! AES-256-GCM. The key is read from a key file (created with fresh random
//! bytes on first use) or supplied directly. Decryption of corrupt or
//! foreign ciphertext returns `None` rather than an error: a missing secret
//! is an operational condition the caller reports, never a panic.

use std::path::Path;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

/// Length of the AES-256 key in bytes.
const KEY_LEN: usize = 32;

/// Length of the AES-GCM nonce in bytes.
const NONCE_LEN: usize = 12;

/// Errors raised by vault setup and encryption.
///
/// Decryption deliberately has no error type; see [`CredentialVault::decrypt`].
#[derive(Debug, Error)]
pub enum VaultError {
    /// Key file could not be read or written.
    #[error("key file error: {0}")]
    KeyFile(#[from] std::io::Error),

    /// Key material has the wrong length or encoding.
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// Encryption failed.
    #[error("encryption failed")]
    Encrypt,
}

/// Symmetric encrypt/decrypt of stored secrets.
pub struct CredentialVault {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault").finish_non_exhaustive()
    }
}

impl CredentialVault {
    /// Creates a vault from raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not exactly 32 bytes.
    pub fn from_key(key: &[u8]) -> Result<Self, VaultError> {
        if key.len() != KEY_LEN {
            return Err(VaultError::InvalidKey(format!(
                "expected {KEY_LEN} bytes, got {}",
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|_| VaultError::InvalidKey("unusable key".to_string()))?;
        Ok(Self { cipher })
    }

    /// Loads the key from a file, generating and persisting a fresh random
    /// key when the file does not exist yet.
    ///
    /// The file stores the key base64-encoded.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read/written or holds invalid
    /// key material.
    pub fn from_key_file(path: impl AsRef<Path>) -> Result<Self, VaultError> {
        let path = path.as_ref();

        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let key = STANDARD
                .decode(contents.trim())
                .map_err(|e| VaultError::InvalidKey(format!("key file is not base64: {e}")))?;
            return Self::from_key(&key);
        }

        let key: [u8; KEY_LEN] = rand::random();
        std::fs::write(path, STANDARD.encode(key))?;
        Self::from_key(&key)
    }

    /// Encrypts a plaintext secret. Returns `base64(nonce || ciphertext)`.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| VaultError::Encrypt)?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(STANDARD.encode(&combined))
    }

    /// Decrypts a stored secret.
    ///
    /// Returns `None` on any corruption: bad base64, truncated payload,
    /// authentication failure, or non-UTF-8 plaintext. Callers surface the
    /// missing secret as a per-operation data-integrity error.
    #[must_use]
    pub fn decrypt(&self, encoded: &str) -> Option<String> {
        let combined = STANDARD.decode(encoded).ok()?;
        if combined.len() <= NONCE_LEN {
            return None;
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self.cipher.decrypt(nonce, ciphertext).ok()?;
        String::from_utf8(plaintext).ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn vault() -> CredentialVault {
        CredentialVault::from_key(&[7u8; KEY_LEN]).unwrap()
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let vault = vault();
        let encrypted = vault.encrypt("hunter2").unwrap();
        assert_ne!(encrypted, "hunter2");
        assert_eq!(vault.decrypt(&encrypted).as_deref(), Some("hunter2"));
    }

    #[test]
    fn encrypt_is_nondeterministic() {
        let vault = vault();
        let a = vault.encrypt("same").unwrap();
        let b = vault.encrypt("same").unwrap();
        assert_ne!(a, b, "nonce must differ per encryption");
    }

    #[test]
    fn decrypt_garbage_returns_none() {
        let vault = vault();
        assert!(vault.decrypt("not base64 at all!").is_none());
        assert!(vault.decrypt("").is_none());
        assert!(vault.decrypt(&STANDARD.encode(b"short")).is_none());
    }

    #[test]
    fn decrypt_with_wrong_key_returns_none() {
        let vault_a = CredentialVault::from_key(&[1u8; KEY_LEN]).unwrap();
        let vault_b = CredentialVault::from_key(&[2u8; KEY_LEN]).unwrap();
        let encrypted = vault_a.encrypt("secret").unwrap();
        assert!(vault_b.decrypt(&encrypted).is_none());
    }

    #[test]
    fn tampered_ciphertext_returns_none() {
        let vault = vault();
        let encrypted = vault.encrypt("secret").unwrap();
        let mut bytes = STANDARD.decode(&encrypted).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let tampered = STANDARD.encode(&bytes);
        assert!(vault.decrypt(&tampered).is_none());
    }

    #[test]
    fn wrong_key_length_rejected() {
        assert!(CredentialVault::from_key(&[0u8; 16]).is_err());
    }

    #[test]
    fn key_file_is_created_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.key");

        let vault_a = CredentialVault::from_key_file(&path).unwrap();
        let encrypted = vault_a.encrypt("persisted").unwrap();

        // A second vault from the same file must decrypt the first's output.
        let vault_b = CredentialVault::from_key_file(&path).unwrap();
        assert_eq!(vault_b.decrypt(&encrypted).as_deref(), Some("persisted"));
    }
}
