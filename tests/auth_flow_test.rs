// Integration tests for the authorization flow against the SQLite store

use async_trait::async_trait;
use drivegate::credentials::ClientCredentials;
use drivegate::crypto::SecretCipher;
use drivegate::error::AuthError;
use drivegate::oauth::{DriveAuth, ProviderConfig, TokenEndpoint, TokenResponse};
use drivegate::store::SqliteStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Stub provider answering every call with a fixed token response.
struct StubEndpoint {
    refresh_token: Option<String>,
    refresh_calls: AtomicUsize,
}

impl StubEndpoint {
    fn new(refresh_token: Option<&str>) -> Self {
        Self {
            refresh_token: refresh_token.map(str::to_string),
            refresh_calls: AtomicUsize::new(0),
        }
    }

    fn response(&self, access: &str) -> TokenResponse {
        TokenResponse {
            access_token: access.to_string(),
            refresh_token: self.refresh_token.clone(),
            expires_in: Some(3600),
            token_type: Some("Bearer".to_string()),
            scope: None,
        }
    }
}

#[async_trait]
impl TokenEndpoint for StubEndpoint {
    async fn exchange_code(
        &self,
        _creds: &ClientCredentials,
        code: &str,
        _redirect_uri: &str,
    ) -> Result<TokenResponse, AuthError> {
        assert_eq!(code, "abc");
        Ok(self.response("A"))
    }

    async fn refresh_access_token(
        &self,
        _creds: &ClientCredentials,
        _refresh_token: &str,
    ) -> Result<TokenResponse, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response("A2"))
    }
}

fn create_auth(store: Arc<SqliteStore>, endpoint: Arc<StubEndpoint>) -> DriveAuth {
    DriveAuth::new(
        store,
        SecretCipher::from_secrets("auth-key", "secret-key"),
        endpoint,
        ProviderConfig::google("https://example.com/wp-json/drive/callback"),
        900,
    )
}

fn extract_state(auth_url: &str) -> String {
    let query = auth_url.split_once('?').unwrap().1;
    let raw = query
        .split('&')
        .find_map(|pair| pair.strip_prefix("state="))
        .unwrap();
    urlencoding::decode(raw).unwrap().into_owned()
}

#[tokio::test]
async fn test_flow_end_to_end_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::new(dir.path().join("options.db")).unwrap());
    let endpoint = Arc::new(StubEndpoint::new(Some("R")));

    let auth = create_auth(store, endpoint.clone());

    assert!(!auth.is_configured());
    auth.save_credentials("id1", "secret1").unwrap();
    assert!(auth.is_configured());

    let url = auth.start_auth(42, None).unwrap();
    let outcome = auth.handle_callback("abc", &extract_state(&url)).await.unwrap();
    assert_eq!(outcome.user_id, 42);

    assert!(auth.ensure_valid().await);
    assert_eq!(auth.bearer_token().await.unwrap(), "A");
    assert_eq!(endpoint.refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_tokens_survive_process_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("options.db");

    // First "request" completes the flow
    {
        let store = Arc::new(SqliteStore::new(&db_path).unwrap());
        let endpoint = Arc::new(StubEndpoint::new(Some("R")));
        let auth = create_auth(store, endpoint);

        auth.save_credentials("id1", "secret1").unwrap();
        let url = auth.start_auth(42, None).unwrap();
        auth.handle_callback("abc", &extract_state(&url)).await.unwrap();
    }

    // A later request rebuilds everything from the store alone
    let store = Arc::new(SqliteStore::new(&db_path).unwrap());
    let endpoint = Arc::new(StubEndpoint::new(None));
    let auth = create_auth(store, endpoint.clone());

    assert!(auth.is_configured());
    assert_eq!(auth.bearer_token().await.unwrap(), "A");

    let status = auth.status();
    assert!(status.token_present);
    assert!(!status.token_expired);
}

#[tokio::test]
async fn test_cipher_key_rotation_degrades_to_unconfigured() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("options.db");

    {
        let store = Arc::new(SqliteStore::new(&db_path).unwrap());
        let auth = create_auth(store, Arc::new(StubEndpoint::new(Some("R"))));
        auth.save_credentials("id1", "secret1").unwrap();
    }

    // Same database, different server secrets
    let store = Arc::new(SqliteStore::new(&db_path).unwrap());
    let auth = DriveAuth::new(
        store,
        SecretCipher::from_secrets("rotated-auth-key", "rotated-secret-key"),
        Arc::new(StubEndpoint::new(Some("R"))),
        ProviderConfig::default(),
        900,
    );

    // Undecryptable credentials read as not configured, not as an error
    assert!(!auth.is_configured());
    let err = auth.start_auth(42, None).unwrap_err();
    assert_eq!(err.kind(), "not_configured");
}
