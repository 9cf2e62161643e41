//! OAuth token endpoint client.
//!
//! Handles exchanging authorization codes for tokens and refreshing expired
//! access tokens. The `TokenEndpoint` trait is the narrow seam the lifecycle
//! manager depends on, so tests can supply fakes without a real provider.

use crate::credentials::ClientCredentials;
use crate::error::AuthError;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// OAuth token response (standard OAuth 2.0)
#[derive(Clone, Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,

    #[serde(default)]
    pub refresh_token: Option<String>,

    #[serde(default)]
    pub expires_in: Option<i64>,

    #[serde(default)]
    pub token_type: Option<String>,

    #[serde(default)]
    pub scope: Option<String>,
}

/// Error payload the token endpoint answers with on rejection
#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: Option<String>,

    #[serde(default)]
    error_description: Option<String>,
}

/// The two token-endpoint operations the lifecycle manager uses.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Exchange an authorization code for a token pair.
    async fn exchange_code(
        &self,
        creds: &ClientCredentials,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, AuthError>;

    /// Mint a new access token from a refresh token.
    async fn refresh_access_token(
        &self,
        creds: &ClientCredentials,
        refresh_token: &str,
    ) -> Result<TokenResponse, AuthError>;
}

/// Token endpoint client on reqwest.
pub struct HttpTokenEndpoint {
    client: reqwest::Client,
    token_url: String,
}

impl HttpTokenEndpoint {
    /// Creates a client with the given request timeout. A timed-out call
    /// surfaces as `Transport` and is treated as an exchange/refresh failure.
    pub fn new(token_url: impl Into<String>, timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            token_url: token_url.into(),
        })
    }

    async fn post_form(&self, form: &HashMap<&str, &str>) -> Result<TokenResponse, AuthError> {
        let response = self
            .client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AuthError::Transport("token endpoint request timed out".to_string())
                } else {
                    AuthError::Transport(format!("token endpoint request failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Transport(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            let parsed: Option<TokenErrorBody> = serde_json::from_str(&body).ok();
            let (code, description) = match parsed {
                Some(TokenErrorBody {
                    error: Some(error),
                    error_description,
                }) => (error, error_description.unwrap_or_default()),
                _ => (status.as_u16().to_string(), body),
            };
            return Err(AuthError::Provider { code, description });
        }

        // Some providers answer 200 with an error field; check before parsing
        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| AuthError::Transport(format!("token response is not JSON: {}", e)))?;

        if let Some(error) = value.get("error").and_then(|e| e.as_str()) {
            let description = value
                .get("error_description")
                .and_then(|d| d.as_str())
                .unwrap_or_default()
                .to_string();
            return Err(AuthError::Provider {
                code: error.to_string(),
                description,
            });
        }

        serde_json::from_value(value)
            .map_err(|e| AuthError::Transport(format!("malformed token response: {}", e)))
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn exchange_code(
        &self,
        creds: &ClientCredentials,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, AuthError> {
        let mut form = HashMap::new();
        form.insert("grant_type", "authorization_code");
        form.insert("code", code);
        form.insert("redirect_uri", redirect_uri);
        form.insert("client_id", creds.client_id.as_str());
        form.insert("client_secret", creds.client_secret.as_str());

        debug!(token_url = %self.token_url, "exchanging authorization code");
        let response = self.post_form(&form).await?;

        debug!(
            has_refresh_token = response.refresh_token.is_some(),
            expires_in = ?response.expires_in,
            "authorization code exchanged"
        );
        Ok(response)
    }

    async fn refresh_access_token(
        &self,
        creds: &ClientCredentials,
        refresh_token: &str,
    ) -> Result<TokenResponse, AuthError> {
        let mut form = HashMap::new();
        form.insert("grant_type", "refresh_token");
        form.insert("refresh_token", refresh_token);
        form.insert("client_id", creds.client_id.as_str());
        form.insert("client_secret", creds.client_secret.as_str());

        debug!(token_url = %self.token_url, "refreshing access token");
        self.post_form(&form).await
    }
}
