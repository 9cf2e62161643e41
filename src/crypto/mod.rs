//! AES-256-GCM encryption for secrets at rest.
//!
//! The cipher key is derived by hashing two long-lived server secrets, never
//! the secrets themselves. Each call uses a fresh random nonce, prepended to
//! the ciphertext so the whole value round-trips as a single base64 string.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sha2::{Digest, Sha256};

/// Size of the nonce in bytes (96 bits, standard for GCM)
const NONCE_SIZE: usize = 12;

/// Environment variable holding the first keying secret
pub const AUTH_KEY_ENV: &str = "DRIVEGATE_AUTH_KEY";

/// Environment variable holding the second keying secret
pub const SECRET_KEY_ENV: &str = "DRIVEGATE_SECRET_KEY";

/// Symmetric cipher for secret strings stored in the option store.
///
/// # Security
/// - Key is a SHA-256 digest over two server secrets, held in memory only
/// - Nonces are random per call (never reused) and travel with the ciphertext
/// - Authenticated encryption (tampering is a decrypt failure)
///
/// The empty string is the identity in both directions: callers use "" to
/// mean "nothing stored," and that must survive a round-trip unchanged.
#[derive(Clone)]
pub struct SecretCipher {
    key: [u8; 32],
}

impl SecretCipher {
    /// Derives the cipher key from two long-lived server secrets.
    pub fn from_secrets(auth_key: &str, secret_key: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(auth_key.as_bytes());
        hasher.update(secret_key.as_bytes());
        Self {
            key: hasher.finalize().into(),
        }
    }

    /// Reads the two keying secrets from the environment.
    ///
    /// # Errors
    /// Fails if either variable is unset or empty.
    pub fn from_env() -> Result<Self> {
        let auth_key = std::env::var(AUTH_KEY_ENV)
            .with_context(|| format!("{} is not set", AUTH_KEY_ENV))?;
        let secret_key = std::env::var(SECRET_KEY_ENV)
            .with_context(|| format!("{} is not set", SECRET_KEY_ENV))?;

        if auth_key.is_empty() || secret_key.is_empty() {
            return Err(anyhow!(
                "{} and {} must be non-empty",
                AUTH_KEY_ENV,
                SECRET_KEY_ENV
            ));
        }

        Ok(Self::from_secrets(&auth_key, &secret_key))
    }

    /// Encrypts a secret string for storage.
    ///
    /// # Returns
    /// * `Ok(String)` - base64 of nonce || ciphertext, or "" for "" input
    /// * `Err` - if encryption fails
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| anyhow!("Failed to create cipher: {}", e))?;

        // Random nonce (never reuse!)
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| anyhow!("Encryption failed: {}", e))?;

        // Prepend the nonce so the value is one opaque string
        let mut buf = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        buf.extend_from_slice(&nonce);
        buf.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(&buf))
    }

    /// Decrypts a previously encrypted value.
    ///
    /// Any malformed, truncated, or tampered input is an error. Callers must
    /// treat a failed decrypt as "no valid secret" rather than surfacing it.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String> {
        if ciphertext.is_empty() {
            return Ok(String::new());
        }

        let data = BASE64.decode(ciphertext).context("Failed to decode ciphertext")?;

        if data.len() <= NONCE_SIZE {
            return Err(anyhow!(
                "Ciphertext too short: expected more than {} bytes, got {}",
                NONCE_SIZE,
                data.len()
            ));
        }

        // Split the nonce back off its fixed-length prefix
        let (nonce_bytes, payload) = data.split_at(NONCE_SIZE);

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| anyhow!("Failed to create cipher: {}", e))?;

        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), payload)
            .map_err(|e| anyhow!("Decryption failed (wrong key or corrupted data): {}", e))?;

        String::from_utf8(plaintext).context("Decrypted data is not valid UTF-8")
    }
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material never reaches Debug output
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}

/// Fixed-length preview of a secret for log lines.
///
/// Keeps the first and last six characters so an operator can correlate
/// values without the log ever containing a usable token.
pub fn redact(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 12 {
        return "[REDACTED]".to_string();
    }

    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 6..].iter().collect();
    format!("[REDACTED:{}...{}]", head, tail)
}
