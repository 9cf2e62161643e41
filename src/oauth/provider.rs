//! OAuth provider endpoint configuration.

use serde::{Deserialize, Serialize};

fn default_auth_url() -> String {
    "https://accounts.google.com/o/oauth2/v2/auth".to_string()
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_scopes() -> Vec<String> {
    // Limited safe scopes (upload + metadata)
    vec![
        "https://www.googleapis.com/auth/drive.file".to_string(),
        "https://www.googleapis.com/auth/drive.metadata.readonly".to_string(),
    ]
}

fn default_redirect_uri() -> String {
    "http://localhost:8080/drive/callback".to_string()
}

/// Provider endpoints and scopes for the authorization-code flow.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// OAuth authorization endpoint URL
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// OAuth token exchange endpoint URL
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Required OAuth scopes
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Redirect URI registered with the provider
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            scopes: default_scopes(),
            redirect_uri: default_redirect_uri(),
        }
    }
}

impl ProviderConfig {
    /// Google Drive endpoints with the given redirect URI.
    pub fn google(redirect_uri: impl Into<String>) -> Self {
        Self {
            redirect_uri: redirect_uri.into(),
            ..Self::default()
        }
    }

    /// Build the authorization URL carrying the state payload.
    ///
    /// `access_type=offline` and `prompt=consent` force the provider to issue
    /// a refresh token on every authorization, not just the first.
    pub fn build_auth_url(&self, client_id: &str, state: &str) -> String {
        let scopes = self.scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&scope={}&state={}&response_type=code\
             &access_type=offline&prompt=consent&include_granted_scopes=true",
            self.auth_url,
            urlencoding::encode(client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&scopes),
            urlencoding::encode(state)
        )
    }
}
