use anyhow::Result;
use drivegate::config::{self, DriveConfig};
use drivegate::crypto::SecretCipher;
use drivegate::oauth::DriveAuth;
use drivegate::store::SqliteStore;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drivegate=info".into()),
        )
        .init();

    let config_path =
        std::env::var("DRIVEGATE_CONFIG").unwrap_or_else(|_| "drivegate.toml".to_string());

    let config = match config::load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %config_path, error = %e, "config not loaded, using defaults");
            DriveConfig::default()
        }
    };

    let cipher = SecretCipher::from_env()?;
    let store = Arc::new(SqliteStore::new(&config.store.db_path)?);

    let auth = DriveAuth::from_config(&config, store, cipher)?;

    let status = auth.status();
    info!(
        configured = status.configured,
        token_present = status.token_present,
        token_expired = status.token_expired,
        "drivegate ready"
    );

    Ok(())
}
