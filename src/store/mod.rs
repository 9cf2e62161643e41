//! Persistent key-value option store.
//!
//! The authorization subsystem keeps all of its state (credentials, tokens,
//! pending handshakes) in a small key-value store: plain options plus
//! transients that expire after a TTL. The trait is the seam the rest of the
//! crate depends on; `MemoryStore` backs tests and embedding, `SqliteStore`
//! backs real deployments.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

mod sqlite;

pub use sqlite::SqliteStore;

/// Key-value persistence consumed by the authorization subsystem.
///
/// Writes are last-writer-wins; the store is the single source of truth and
/// the only state shared across requests.
pub trait OptionStore: Send + Sync {
    /// Returns the stored value, or `None` if the key was never set.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Sets or overwrites a value.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Deletes a value. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    /// Sets a value that expires `ttl_seconds` from now, overwriting any
    /// pending value under the same key.
    fn set_transient(&self, key: &str, value: &str, ttl_seconds: i64) -> Result<()>;

    /// Returns the transient value if it has not expired yet.
    fn get_transient(&self, key: &str) -> Result<Option<String>>;

    /// Deletes a transient. Deleting a missing key is not an error.
    fn delete_transient(&self, key: &str) -> Result<()>;
}

/// In-memory store for tests and short-lived embedding.
#[derive(Default)]
pub struct MemoryStore {
    options: Mutex<HashMap<String, String>>,
    transients: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OptionStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.options.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.options
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.options.lock().unwrap().remove(key);
        Ok(())
    }

    fn set_transient(&self, key: &str, value: &str, ttl_seconds: i64) -> Result<()> {
        let expires_at = Utc::now() + Duration::seconds(ttl_seconds);
        self.transients
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    fn get_transient(&self, key: &str) -> Result<Option<String>> {
        let mut transients = self.transients.lock().unwrap();

        match transients.get(key) {
            Some((value, expires_at)) if Utc::now() < *expires_at => Ok(Some(value.clone())),
            Some(_) => {
                // Lazy cleanup on read
                transients.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn delete_transient(&self, key: &str) -> Result<()> {
        self.transients.lock().unwrap().remove(key);
        Ok(())
    }
}
