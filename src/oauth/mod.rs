//! OAuth 2.0 authorization flow for the Drive connection.
//!
//! Implements the authorization code flow:
//! 1. Admin saves client credentials (encrypted at rest)
//! 2. "Start auth" mints a CSRF state payload and returns the provider URL
//! 3. User authorizes on the provider's site
//! 4. Provider redirects back with a code and the state payload
//! 5. Callback verifies the state, exchanges the code, persists the tokens
//! 6. Drive-touching operations call `ensure_valid` / `bearer_token`

pub mod exchange;
pub mod provider;
pub mod state;


pub use exchange::{HttpTokenEndpoint, TokenEndpoint, TokenResponse};
pub use provider::ProviderConfig;
pub use state::StateManager;

use crate::config::DriveConfig;
use crate::credentials::CredentialStore;
use crate::crypto::SecretCipher;
use crate::error::AuthError;
use crate::store::OptionStore;
use crate::token::{AuthStatus, TokenManager};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Result of a verified callback.
#[derive(Clone, Debug)]
pub struct CallbackOutcome {
    /// The user who initiated the handshake
    pub user_id: u64,
    /// Where that user started, for the caller to redirect back to
    pub return_to: Option<String>,
}

/// Authorization flow facade.
///
/// Composes the credential store, state manager, and token lifecycle manager
/// over one option store. All dependencies are injected at construction; the
/// facade holds no state of its own between calls.
#[derive(Clone)]
pub struct DriveAuth {
    credentials: CredentialStore,
    tokens: TokenManager,
    states: StateManager,
    provider: ProviderConfig,
    endpoint: Arc<dyn TokenEndpoint>,
}

impl DriveAuth {
    pub fn new(
        store: Arc<dyn OptionStore>,
        cipher: SecretCipher,
        endpoint: Arc<dyn TokenEndpoint>,
        provider: ProviderConfig,
        state_ttl_seconds: i64,
    ) -> Self {
        let credentials = CredentialStore::new(store.clone(), cipher.clone());
        let tokens = TokenManager::new(
            store.clone(),
            cipher,
            credentials.clone(),
            endpoint.clone(),
        );
        let states = StateManager::new(store, state_ttl_seconds);

        Self {
            credentials,
            tokens,
            states,
            provider,
            endpoint,
        }
    }

    /// Wires the facade from configuration, with a real HTTP token endpoint.
    pub fn from_config(
        config: &DriveConfig,
        store: Arc<dyn OptionStore>,
        cipher: SecretCipher,
    ) -> Result<Self, AuthError> {
        let endpoint = HttpTokenEndpoint::new(
            config.provider.token_url.clone(),
            Duration::from_secs(config.http.timeout_seconds),
        )?;

        Ok(Self::new(
            store,
            cipher,
            Arc::new(endpoint),
            config.provider.clone(),
            config.state.ttl_seconds,
        ))
    }

    /// Saves the OAuth client credentials, voiding all stored tokens.
    pub fn save_credentials(&self, client_id: &str, client_secret: &str) -> Result<(), AuthError> {
        self.credentials.save(client_id, client_secret)
    }

    /// True iff a usable credential pair is stored.
    pub fn is_configured(&self) -> bool {
        self.credentials.is_configured()
    }

    /// Starts the authorization flow for a user.
    ///
    /// Returns the provider authorization URL carrying the state payload.
    /// Has no effect on stored tokens.
    ///
    /// # Errors
    /// * `Unauthenticated` - `user_id` is not a valid authenticated caller
    /// * `NotConfigured` - no client credentials saved
    pub fn start_auth(
        &self,
        user_id: u64,
        return_to: Option<String>,
    ) -> Result<String, AuthError> {
        if user_id == 0 {
            return Err(AuthError::Unauthenticated);
        }

        let creds = self.credentials.load()?.ok_or(AuthError::NotConfigured)?;

        let payload = self.states.create(user_id, return_to)?;
        let auth_url = self.provider.build_auth_url(&creds.client_id, &payload);

        info!(user_id, "authorization URL issued");
        Ok(auth_url)
    }

    /// Handles the provider's redirect back.
    ///
    /// Verifies the state payload, exchanges the code for a token pair, and
    /// persists it. A CSRF rejection performs no token exchange and mutates
    /// nothing.
    ///
    /// # Errors
    /// * `InvalidInput` - missing code or payload
    /// * `CsrfSuspected` - state mismatch or expiry
    /// * `NotConfigured` - credentials disappeared mid-handshake
    /// * `Provider` / `Transport` - the exchange itself failed
    pub async fn handle_callback(
        &self,
        code: &str,
        state_payload: &str,
    ) -> Result<CallbackOutcome, AuthError> {
        if code.is_empty() || state_payload.is_empty() {
            return Err(AuthError::InvalidInput(
                "missing authorization code or state".to_string(),
            ));
        }

        let claims = self.states.validate_and_consume(state_payload)?;

        let creds = self.credentials.load()?.ok_or(AuthError::NotConfigured)?;

        let response = self
            .endpoint
            .exchange_code(&creds, code, &self.provider.redirect_uri)
            .await
            .map_err(|e| {
                warn!(user_id = claims.user_id, kind = e.kind(), "code exchange failed");
                e
            })?;

        self.tokens.persist(&response)?;

        info!(
            user_id = claims.user_id,
            has_refresh_token = response.refresh_token.is_some(),
            "authorization completed"
        );

        Ok(CallbackOutcome {
            user_id: claims.user_id,
            return_to: claims.return_to,
        })
    }

    /// Gate for Drive-touching operations; refreshes transparently.
    pub async fn ensure_valid(&self) -> bool {
        self.tokens.ensure_valid().await
    }

    /// A currently valid access token, refreshing if expired.
    pub async fn bearer_token(&self) -> Result<String, AuthError> {
        self.tokens.bearer_token().await
    }

    /// Authentication status snapshot.
    pub fn status(&self) -> AuthStatus {
        self.tokens.status()
    }
}
