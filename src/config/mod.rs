use crate::oauth::ProviderConfig;
use serde::Deserialize;

/// Complete drivegate configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DriveConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Outbound HTTP configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Timeout for calls to the provider's token endpoint (seconds)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    10
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// Pending-handshake configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    /// How long a pending authorization stays valid (seconds)
    #[serde(default = "default_state_ttl")]
    pub ttl_seconds: i64,
}

fn default_state_ttl() -> i64 {
    900
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_state_ttl(),
        }
    }
}

/// Option store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "drivegate.db".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            http: HttpConfig::default(),
            state: StateConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<DriveConfig, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: DriveConfig = toml::from_str(&contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DriveConfig::default();
        assert_eq!(config.http.timeout_seconds, 10);
        assert_eq!(config.state.ttl_seconds, 900);
        assert_eq!(config.store.db_path, "drivegate.db");
        assert!(config.provider.auth_url.contains("accounts.google.com"));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let toml_str = r#"
            [provider]
            redirect_uri = "https://example.com/wp-json/drive/callback"

            [http]
            timeout_seconds = 30
        "#;

        let config: DriveConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(
            config.provider.redirect_uri,
            "https://example.com/wp-json/drive/callback"
        );
        assert!(config.provider.token_url.contains("googleapis.com"));
        assert_eq!(config.http.timeout_seconds, 30);
        assert_eq!(config.state.ttl_seconds, 900);
    }

    #[test]
    fn test_empty_toml_is_all_defaults() {
        let config: DriveConfig = toml::from_str("").unwrap();
        assert_eq!(config.http.timeout_seconds, 10);
        assert_eq!(config.state.ttl_seconds, 900);
    }
}
