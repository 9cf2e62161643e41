//! CSRF state management for the OAuth redirect round-trip.
//!
//! Binds an in-flight handshake to the user who started it: a random
//! correlation id is stored per user with a bounded lifetime, and travels to
//! the provider and back inside an opaque payload. A callback is only honored
//! when the payload's id exactly matches the stored one.

use crate::error::AuthError;
use crate::store::OptionStore;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

const STATE_KEY_PREFIX: &str = "drive_oauth_state_";

/// Contents of the state payload carried through the redirect.
#[derive(Debug, Serialize, Deserialize)]
pub struct StateClaims {
    /// Correlation id matched against the stored transient
    pub uuid: String,
    pub user_id: u64,
    /// Where to send the user after a successful callback
    #[serde(default)]
    pub return_to: Option<String>,
}

/// Mints and verifies state payloads, one pending handshake per user.
#[derive(Clone)]
pub struct StateManager {
    store: Arc<dyn OptionStore>,
    ttl_seconds: i64,
}

impl StateManager {
    /// # Arguments
    /// * `ttl_seconds` - how long a pending handshake stays valid (default: 900)
    pub fn new(store: Arc<dyn OptionStore>, ttl_seconds: i64) -> Self {
        Self { store, ttl_seconds }
    }

    /// Start a handshake for a user, overwriting any pending one.
    ///
    /// Returns the encoded payload to attach to the authorization URL.
    pub fn create(&self, user_id: u64, return_to: Option<String>) -> Result<String, AuthError> {
        let uuid = Uuid::new_v4().to_string();

        self.store
            .set_transient(&state_key(user_id), &uuid, self.ttl_seconds)?;

        let claims = StateClaims {
            uuid,
            user_id,
            return_to,
        };
        let json = serde_json::to_string(&claims)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("Failed to encode state: {}", e)))?;

        debug!(user_id, "pending authorization state created");
        Ok(BASE64.encode(json))
    }

    /// Validate a callback payload and consume the pending state.
    ///
    /// The stored id is deleted only on an exact match (single-use). A
    /// mismatched or expired payload consumes nothing, so replaying it keeps
    /// failing while a genuine pending payload stays honorable.
    ///
    /// # Errors
    /// * `InvalidInput` - payload does not decode to claims with a user id
    /// * `CsrfSuspected` - no pending state, expired, or id mismatch
    pub fn validate_and_consume(&self, payload: &str) -> Result<StateClaims, AuthError> {
        let claims = decode_payload(payload)?;

        let key = state_key(claims.user_id);
        let expected = self.store.get_transient(&key)?;

        match expected {
            Some(expected) if expected == claims.uuid => {
                self.store.delete_transient(&key)?;
                debug!(user_id = claims.user_id, "authorization state verified");
                Ok(claims)
            }
            _ => {
                warn!(
                    user_id = claims.user_id,
                    "state parameter does not match pending authorization"
                );
                Err(AuthError::CsrfSuspected)
            }
        }
    }
}

fn state_key(user_id: u64) -> String {
    format!("{}{}", STATE_KEY_PREFIX, user_id)
}

fn decode_payload(payload: &str) -> Result<StateClaims, AuthError> {
    let json = BASE64
        .decode(payload)
        .map_err(|_| AuthError::InvalidInput("malformed state parameter".to_string()))?;

    let claims: StateClaims = serde_json::from_slice(&json)
        .map_err(|_| AuthError::InvalidInput("malformed state parameter".to_string()))?;

    if claims.user_id == 0 {
        return Err(AuthError::InvalidInput(
            "state parameter carries no user".to_string(),
        ));
    }

    Ok(claims)
}
