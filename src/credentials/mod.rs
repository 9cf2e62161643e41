//! Encrypted OAuth client credential storage.
//!
//! The client ID and client secret are encrypted independently and persisted
//! as one option record. Credentials and tokens are coupled: a token obtained
//! under old credentials is meaningless once they change, so every save wipes
//! all stored token state and forces a fresh authorization.

use crate::crypto::SecretCipher;
use crate::error::AuthError;
use crate::store::OptionStore;
use crate::token;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Option key for the encrypted credential record
pub(crate) const CREDENTIALS_KEY: &str = "drive_auth_credentials";

/// OAuth client credentials, decrypted.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &crate::crypto::redact(&self.client_secret))
            .finish()
    }
}

/// Outcome of decrypting one stored credential field.
///
/// `Unset` means nothing was ever saved; `Invalid` means a record exists but
/// the field no longer decrypts to a usable value (key rotation, corruption,
/// or an empty plaintext). Both count as "not configured," but status and
/// logs can tell them apart.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoredSecret {
    Unset,
    Invalid,
    Valid(String),
}

impl StoredSecret {
    pub fn is_valid(&self) -> bool {
        matches!(self, StoredSecret::Valid(_))
    }
}

/// Persisted shape of the credential record (both fields encrypted).
#[derive(Serialize, Deserialize)]
struct CredentialRecord {
    client_id: String,
    client_secret: String,
}

/// Encrypted credential storage on top of the option store.
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn OptionStore>,
    cipher: SecretCipher,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn OptionStore>, cipher: SecretCipher) -> Self {
        Self { store, cipher }
    }

    /// Saves a credential pair, replacing any existing record.
    ///
    /// Side effect: deletes every stored token (access, refresh, expiry).
    /// Changing credentials always forces re-authentication.
    ///
    /// # Errors
    /// * `InvalidInput` - either field is empty
    pub fn save(&self, client_id: &str, client_secret: &str) -> Result<(), AuthError> {
        if client_id.is_empty() || client_secret.is_empty() {
            return Err(AuthError::InvalidInput(
                "client_id and client_secret are required".to_string(),
            ));
        }

        let record = CredentialRecord {
            client_id: self.cipher.encrypt(client_id)?,
            client_secret: self.cipher.encrypt(client_secret)?,
        };

        let json = serde_json::to_string(&record).context("Failed to serialize credentials")?;
        self.store.set(CREDENTIALS_KEY, &json)?;

        // Tokens obtained under the previous credentials are void
        token::delete_token_state(self.store.as_ref())?;

        debug!("client credentials saved, stored tokens cleared");
        Ok(())
    }

    /// Loads and decrypts the credential pair.
    ///
    /// Returns `None` unless both fields decrypt to non-empty strings.
    pub fn load(&self) -> Result<Option<ClientCredentials>, AuthError> {
        let (client_id, client_secret) = self.load_raw()?;

        match (client_id, client_secret) {
            (StoredSecret::Valid(client_id), StoredSecret::Valid(client_secret)) => {
                Ok(Some(ClientCredentials {
                    client_id,
                    client_secret,
                }))
            }
            _ => Ok(None),
        }
    }

    /// Tri-state view of the stored record, field by field.
    pub fn load_raw(&self) -> Result<(StoredSecret, StoredSecret), AuthError> {
        let json = match self.store.get(CREDENTIALS_KEY)? {
            Some(json) => json,
            None => return Ok((StoredSecret::Unset, StoredSecret::Unset)),
        };

        let record: CredentialRecord = match serde_json::from_str(&json) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "credential record is not valid JSON");
                return Ok((StoredSecret::Invalid, StoredSecret::Invalid));
            }
        };

        Ok((
            self.decode_field(&record.client_id, "client_id"),
            self.decode_field(&record.client_secret, "client_secret"),
        ))
    }

    /// True iff both fields decrypt to non-empty strings.
    pub fn is_configured(&self) -> bool {
        match self.load() {
            Ok(creds) => creds.is_some(),
            Err(e) => {
                warn!(error = %e, "failed to load credentials");
                false
            }
        }
    }

    /// Removes the credential record and all token state.
    pub fn clear(&self) -> Result<(), AuthError> {
        self.store.delete(CREDENTIALS_KEY)?;
        token::delete_token_state(self.store.as_ref())?;
        Ok(())
    }

    fn decode_field(&self, ciphertext: &str, field: &str) -> StoredSecret {
        if ciphertext.is_empty() {
            return StoredSecret::Unset;
        }

        match self.cipher.decrypt(ciphertext) {
            Ok(plaintext) if !plaintext.is_empty() => StoredSecret::Valid(plaintext),
            Ok(_) => {
                warn!(field, "stored credential decrypted to an empty string");
                StoredSecret::Invalid
            }
            Err(e) => {
                warn!(field, error = %e, "stored credential failed to decrypt");
                StoredSecret::Invalid
            }
        }
    }
}
