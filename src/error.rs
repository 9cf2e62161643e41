//! Error taxonomy for the authorization subsystem.
//!
//! Every failure reported to a caller carries a machine-readable kind and an
//! HTTP status so the surrounding API layer can translate it without pattern
//! matching on message text.

use thiserror::Error;

/// Errors surfaced by credential storage, the OAuth handshake, and the token
/// lifecycle.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed or missing caller input (empty credentials, missing code,
    /// undecodable state payload).
    #[error("{0}")]
    InvalidInput(String),

    /// OAuth client credentials have not been saved (or no longer decrypt).
    #[error("OAuth client credentials not configured")]
    NotConfigured,

    /// No authenticated user context, or no usable access token.
    #[error("not authenticated")]
    Unauthenticated,

    /// The callback's state parameter does not match the pending handshake.
    #[error("invalid state parameter, possible CSRF")]
    CsrfSuspected,

    /// The token endpoint answered with an error payload.
    #[error("provider error {code}: {description}")]
    Provider { code: String, description: String },

    /// No refresh token was available, or the provider rejected it.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// Network failure or timeout talking to the provider.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Unexpected internal failure (store, cipher, serialization).
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::InvalidInput(_) => "invalid_input",
            AuthError::NotConfigured => "not_configured",
            AuthError::Unauthenticated => "unauthenticated",
            AuthError::CsrfSuspected => "csrf_suspected",
            AuthError::Provider { .. } => "provider_error",
            AuthError::RefreshFailed(_) => "refresh_failed",
            AuthError::Transport(_) => "transport",
            AuthError::Internal(_) => "internal",
        }
    }

    /// HTTP status the surrounding API layer should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            AuthError::InvalidInput(_) | AuthError::NotConfigured => 400,
            AuthError::Unauthenticated | AuthError::RefreshFailed(_) => 401,
            AuthError::CsrfSuspected => 403,
            AuthError::Provider { .. } | AuthError::Transport(_) | AuthError::Internal(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
