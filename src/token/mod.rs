//! Access/refresh token lifecycle.
//!
//! The manager owns the stored token pair and is the single gate in front of
//! every provider-touching operation: it detects expiry, refreshes
//! transparently, and persists the result. All state lives in the option
//! store; each call loads it fresh and writes back, so the manager itself is
//! stateless between requests.
//!
//! Persistence layout:
//! - access-token record as plain JSON (short-lived, provider-opaque)
//! - refresh token encrypted under its own key
//! - expiry as absolute epoch seconds, derived as `now + expires_in` when a
//!   token response is accepted, never trusted verbatim from the provider

use crate::credentials::CredentialStore;
use crate::crypto::{self, SecretCipher};
use crate::error::AuthError;
use crate::oauth::exchange::{TokenEndpoint, TokenResponse};
use crate::store::OptionStore;
use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Option key for the access-token record (JSON)
pub(crate) const ACCESS_TOKEN_KEY: &str = "drive_access_token";

/// Option key for the encrypted refresh token
pub(crate) const REFRESH_TOKEN_KEY: &str = "drive_refresh_token";

/// Option key for the absolute expiry (epoch seconds)
pub(crate) const TOKEN_EXPIRES_KEY: &str = "drive_token_expires";

/// Deletes all three token options. Shared with the credential store, which
/// must void tokens whenever credentials change.
pub(crate) fn delete_token_state(store: &dyn OptionStore) -> Result<(), AuthError> {
    store.delete(ACCESS_TOKEN_KEY)?;
    store.delete(REFRESH_TOKEN_KEY)?;
    store.delete(TOKEN_EXPIRES_KEY)?;
    Ok(())
}

/// Stored access-token record. The refresh token is never embedded here; it
/// lives encrypted under its own key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Where the stored token pair currently sits in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenState {
    /// No client credentials saved
    Unconfigured,
    /// Credentials present, no access token obtained yet
    NoToken,
    /// Token present and not expired
    Valid,
    /// Token present but past its expiry
    Expired,
}

/// Authentication status snapshot for the admin surface.
#[derive(Clone, Debug, Serialize)]
pub struct AuthStatus {
    pub configured: bool,
    pub token_present: bool,
    pub token_expired: bool,
    pub expires_at: i64,
}

/// Token lifecycle manager.
///
/// Constructed with its store, cipher, credential and endpoint dependencies
/// injected; holds no ambient state of its own.
#[derive(Clone)]
pub struct TokenManager {
    store: Arc<dyn OptionStore>,
    cipher: SecretCipher,
    credentials: CredentialStore,
    endpoint: Arc<dyn TokenEndpoint>,
}

impl TokenManager {
    pub fn new(
        store: Arc<dyn OptionStore>,
        cipher: SecretCipher,
        credentials: CredentialStore,
        endpoint: Arc<dyn TokenEndpoint>,
    ) -> Self {
        Self {
            store,
            cipher,
            credentials,
            endpoint,
        }
    }

    /// Accepts a provider token response and persists it.
    ///
    /// The access record is stored as-is (minus any embedded refresh token);
    /// the refresh token is encrypted under its own key; expiry is computed
    /// from `expires_in` against our own clock.
    pub fn persist(&self, response: &TokenResponse) -> Result<(), AuthError> {
        let record = TokenRecord {
            access_token: response.access_token.clone(),
            token_type: response.token_type.clone(),
            scope: response.scope.clone(),
        };

        let json = serde_json::to_string(&record).context("Failed to serialize token record")?;
        self.store.set(ACCESS_TOKEN_KEY, &json)?;

        if let Some(refresh_token) = &response.refresh_token {
            let encrypted = self.cipher.encrypt(refresh_token)?;
            self.store.set(REFRESH_TOKEN_KEY, &encrypted)?;
        }

        if let Some(expires_in) = response.expires_in {
            let expires_at = Utc::now().timestamp() + expires_in;
            self.store.set(TOKEN_EXPIRES_KEY, &expires_at.to_string())?;
        }

        debug!(
            has_refresh_token = response.refresh_token.is_some(),
            expires_in = ?response.expires_in,
            "token response persisted"
        );
        Ok(())
    }

    /// Deletes all stored token state.
    pub fn invalidate(&self) -> Result<(), AuthError> {
        delete_token_state(self.store.as_ref())
    }

    /// The gate every provider-touching operation calls first.
    ///
    /// Performs the expired-to-valid transition transparently (at most one
    /// refresh call) and returns false on anything other than a valid token.
    /// Failure reasons are logged, never raised.
    pub async fn ensure_valid(&self) -> bool {
        match self.bearer_token().await {
            Ok(_) => true,
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "token validation failed");
                false
            }
        }
    }

    /// Returns a currently valid access token, refreshing if expired.
    ///
    /// # Errors
    /// * `NotConfigured` - no client credentials
    /// * `Unauthenticated` - no access token stored
    /// * `RefreshFailed` - no usable refresh token, or the provider rejected it
    /// * `Transport` - network failure or timeout during refresh
    ///
    /// A failed refresh leaves stored state untouched; recovery requires a
    /// full new authorization.
    pub async fn bearer_token(&self) -> Result<String, AuthError> {
        let creds = self.credentials.load()?.ok_or(AuthError::NotConfigured)?;

        let record = self.load_record()?.ok_or(AuthError::Unauthenticated)?;

        if !self.is_expired()? {
            return Ok(record.access_token);
        }

        // Expired: try the stored refresh token
        let refresh_token = self
            .load_refresh_token()?
            .ok_or_else(|| AuthError::RefreshFailed("no refresh token available".to_string()))?;

        debug!(
            refresh_token = %crypto::redact(&refresh_token),
            "access token expired, refreshing"
        );

        let mut response = self
            .endpoint
            .refresh_access_token(&creds, &refresh_token)
            .await
            .map_err(|e| match e {
                // A provider rejection during refresh is a refresh failure,
                // terminal until a new authorization
                AuthError::Provider { code, description } => {
                    AuthError::RefreshFailed(format!("{}: {}", code, description))
                }
                other => other,
            })?;

        // The provider may not resend the refresh token; carry it forward
        if response.refresh_token.is_none() {
            response.refresh_token = Some(refresh_token);
        }

        self.persist(&response)?;

        Ok(response.access_token)
    }

    /// Current lifecycle state, without side effects.
    pub fn state(&self) -> Result<TokenState, AuthError> {
        if !self.credentials.is_configured() {
            return Ok(TokenState::Unconfigured);
        }

        if self.load_record()?.is_none() {
            return Ok(TokenState::NoToken);
        }

        if self.is_expired()? {
            Ok(TokenState::Expired)
        } else {
            Ok(TokenState::Valid)
        }
    }

    /// Status snapshot for the admin surface. Store failures degrade to the
    /// most pessimistic answer rather than erroring.
    pub fn status(&self) -> AuthStatus {
        let token_present = self.load_record().unwrap_or_default().is_some();
        let expires_at = self.expires_at().unwrap_or(0);

        AuthStatus {
            configured: self.credentials.is_configured(),
            token_present,
            token_expired: Utc::now().timestamp() >= expires_at,
            expires_at,
        }
    }

    fn load_record(&self) -> Result<Option<TokenRecord>, AuthError> {
        let json = match self.store.get(ACCESS_TOKEN_KEY)? {
            Some(json) => json,
            None => return Ok(None),
        };

        match serde_json::from_str(&json) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                // An unreadable record is treated as no token at all
                warn!(error = %e, "stored access token record is not valid JSON");
                Ok(None)
            }
        }
    }

    fn load_refresh_token(&self) -> Result<Option<String>, AuthError> {
        let encrypted = match self.store.get(REFRESH_TOKEN_KEY)? {
            Some(encrypted) => encrypted,
            None => return Ok(None),
        };

        match self.cipher.decrypt(&encrypted) {
            Ok(token) if !token.is_empty() => Ok(Some(token)),
            Ok(_) => Ok(None),
            Err(e) => {
                warn!(error = %e, "stored refresh token failed to decrypt");
                Ok(None)
            }
        }
    }

    fn expires_at(&self) -> Result<i64, AuthError> {
        let raw = match self.store.get(TOKEN_EXPIRES_KEY)? {
            Some(raw) => raw,
            None => return Ok(0),
        };

        Ok(raw.parse().unwrap_or(0))
    }

    fn is_expired(&self) -> Result<bool, AuthError> {
        // A token with no recorded expiry counts as expired
        Ok(Utc::now().timestamp() >= self.expires_at()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::exchange::testing::FakeEndpoint;
    use crate::store::MemoryStore;

    fn test_manager(endpoint: Arc<FakeEndpoint>) -> (Arc<MemoryStore>, TokenManager) {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let cipher = SecretCipher::from_secrets("auth-key", "secret-key");
        let credentials = CredentialStore::new(store.clone(), cipher.clone());
        let manager = TokenManager::new(store.clone(), cipher, credentials, endpoint);
        (store, manager)
    }

    fn configure(manager: &TokenManager) {
        manager
            .credentials
            .save("client-id", "client-secret")
            .unwrap();
    }

    fn seed_token(manager: &TokenManager, access: &str, refresh: Option<&str>, expires_in: i64) {
        let response = TokenResponse {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_in: Some(expires_in),
            token_type: Some("Bearer".to_string()),
            scope: None,
        };
        manager.persist(&response).unwrap();
    }

    #[tokio::test]
    async fn test_unconfigured_fails_fast() {
        let endpoint = Arc::new(FakeEndpoint::returning("A", Some("R"), 3600));
        let (_, manager) = test_manager(endpoint.clone());

        assert!(!manager.ensure_valid().await);
        assert_eq!(manager.state().unwrap(), TokenState::Unconfigured);
        assert_eq!(
            manager.bearer_token().await.unwrap_err().kind(),
            "not_configured"
        );
        assert_eq!(endpoint.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_no_token_is_unauthenticated() {
        let endpoint = Arc::new(FakeEndpoint::returning("A", Some("R"), 3600));
        let (_, manager) = test_manager(endpoint.clone());
        configure(&manager);

        assert_eq!(manager.state().unwrap(), TokenState::NoToken);
        assert!(!manager.ensure_valid().await);
        assert_eq!(
            manager.bearer_token().await.unwrap_err().kind(),
            "unauthenticated"
        );
    }

    #[tokio::test]
    async fn test_valid_token_no_refresh_call() {
        let endpoint = Arc::new(FakeEndpoint::returning("new", Some("R2"), 3600));
        let (_, manager) = test_manager(endpoint.clone());
        configure(&manager);
        seed_token(&manager, "current", Some("R"), 3600);

        assert_eq!(manager.bearer_token().await.unwrap(), "current");
        assert!(manager.ensure_valid().await);
        assert_eq!(endpoint.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_expired_token_refreshes_once() {
        let endpoint = Arc::new(FakeEndpoint::returning("fresh", None, 3600));
        let (store, manager) = test_manager(endpoint.clone());
        configure(&manager);
        seed_token(&manager, "stale", Some("R"), -10);

        assert_eq!(manager.state().unwrap(), TokenState::Expired);
        assert_eq!(manager.bearer_token().await.unwrap(), "fresh");
        assert_eq!(endpoint.refresh_calls(), 1);

        // New access token and expiry persisted
        let record = manager.load_record().unwrap().unwrap();
        assert_eq!(record.access_token, "fresh");
        let expires_at: i64 = store
            .get(TOKEN_EXPIRES_KEY)
            .unwrap()
            .unwrap()
            .parse()
            .unwrap();
        assert!(expires_at > Utc::now().timestamp());

        // The provider omitted the refresh token; the old one is carried over
        assert_eq!(manager.load_refresh_token().unwrap().unwrap(), "R");
    }

    #[tokio::test]
    async fn test_refresh_replaces_refresh_token_when_reissued() {
        let endpoint = Arc::new(FakeEndpoint::returning("fresh", Some("R2"), 3600));
        let (_, manager) = test_manager(endpoint.clone());
        configure(&manager);
        seed_token(&manager, "stale", Some("R1"), -10);

        assert!(manager.ensure_valid().await);
        assert_eq!(manager.load_refresh_token().unwrap().unwrap(), "R2");
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token() {
        let endpoint = Arc::new(FakeEndpoint::returning("fresh", None, 3600));
        let (store, manager) = test_manager(endpoint.clone());
        configure(&manager);
        seed_token(&manager, "stale", None, -10);

        let before = store.get(ACCESS_TOKEN_KEY).unwrap();

        assert!(!manager.ensure_valid().await);
        assert_eq!(
            manager.bearer_token().await.unwrap_err().kind(),
            "refresh_failed"
        );
        assert_eq!(endpoint.refresh_calls(), 0);

        // Stored state untouched
        assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap(), before);
    }

    #[tokio::test]
    async fn test_provider_rejection_is_refresh_failed() {
        let endpoint = Arc::new(FakeEndpoint::failing("invalid_grant", "expired or revoked"));
        let (store, manager) = test_manager(endpoint.clone());
        configure(&manager);
        seed_token(&manager, "stale", Some("R"), -10);

        let before_access = store.get(ACCESS_TOKEN_KEY).unwrap();
        let before_expiry = store.get(TOKEN_EXPIRES_KEY).unwrap();

        let err = manager.bearer_token().await.unwrap_err();
        assert_eq!(err.kind(), "refresh_failed");
        assert_eq!(err.http_status(), 401);

        // No partial writes
        assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap(), before_access);
        assert_eq!(store.get(TOKEN_EXPIRES_KEY).unwrap(), before_expiry);
    }

    #[tokio::test]
    async fn test_status_snapshot() {
        let endpoint = Arc::new(FakeEndpoint::returning("A", Some("R"), 3600));
        let (_, manager) = test_manager(endpoint);

        let status = manager.status();
        assert!(!status.configured);
        assert!(!status.token_present);
        assert!(status.token_expired);

        configure(&manager);
        seed_token(&manager, "A", Some("R"), 3600);

        let status = manager.status();
        assert!(status.configured);
        assert!(status.token_present);
        assert!(!status.token_expired);
        assert!(status.expires_at > Utc::now().timestamp());
    }

    #[test]
    fn test_record_never_embeds_refresh_token() {
        let endpoint = Arc::new(FakeEndpoint::returning("A", Some("R"), 3600));
        let (store, manager) = test_manager(endpoint);
        configure(&manager);
        seed_token(&manager, "A", Some("R"), 3600);

        let json = store.get(ACCESS_TOKEN_KEY).unwrap().unwrap();
        assert!(!json.contains("refresh"));
        assert!(!json.contains("\"R\""));

        // And the refresh key holds ciphertext, not the raw value
        let stored = store.get(REFRESH_TOKEN_KEY).unwrap().unwrap();
        assert_ne!(stored, "R");
    }
}
