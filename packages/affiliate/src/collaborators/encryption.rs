//! Payout account encryption.
//!
//! Account names and numbers are stored as AES-256-GCM ciphertext only. The
//! stored form is base64 of `nonce (12 bytes) || ciphertext`.

use aes_gcm::{Aes256Gcm, KeyInit, Nonce, aead::Aead};
use base64::Engine;

use crate::error::{LedgerError, Result};

pub const ENCRYPTION_KEY_ENV: &str = "AFFILIATE_ENCRYPTION_KEY";

const NONCE_LEN: usize = 12;

pub trait EncryptionService: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String>;
    fn decrypt(&self, ciphertext: &str) -> Result<String>;
}

pub struct AesGcmEncryption {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for AesGcmEncryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcmEncryption").finish_non_exhaustive()
    }
}

impl AesGcmEncryption {
    pub fn new(key: &[u8]) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|_| LedgerError::Encryption("encryption key must be 32 bytes".into()))?;
        Ok(Self { cipher })
    }

    /// Key given as 64 hex characters.
    pub fn from_hex(key: &str) -> Result<Self> {
        let bytes = hex::decode(key.trim())
            .map_err(|e| LedgerError::Encryption(format!("invalid hex key: {e}")))?;
        Self::new(&bytes)
    }

    pub fn from_env() -> Result<Self> {
        let key = std::env::var(ENCRYPTION_KEY_ENV)
            .map_err(|_| LedgerError::Encryption(format!("{ENCRYPTION_KEY_ENV} is not set")))?;
        Self::from_hex(&key)
    }
}

impl EncryptionService for AesGcmEncryption {
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        getrandom::fill(&mut nonce_bytes)
            .map_err(|e| LedgerError::Encryption(format!("nonce generation failed: {e}")))?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| LedgerError::Encryption("encryption failed".into()))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend(ciphertext);
        Ok(base64::engine::general_purpose::STANDARD.encode(combined))
    }

    fn decrypt(&self, encrypted: &str) -> Result<String> {
        let combined = base64::engine::general_purpose::STANDARD
            .decode(encrypted)
            .map_err(|e| LedgerError::Encryption(format!("invalid ciphertext encoding: {e}")))?;

        if combined.len() <= NONCE_LEN {
            return Err(LedgerError::Encryption("ciphertext too short".into()));
        }
        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| LedgerError::Encryption("decryption failed".into()))?;
        String::from_utf8(plaintext)
            .map_err(|_| LedgerError::Encryption("plaintext is not utf-8".into()))
    }
}

/// `****` followed by the last four characters. Short values are fully masked.
pub fn mask_string(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}
