//! SQLite-backed option store.
//!
//! # Schema
//! ```sql
//! CREATE TABLE options (
//!     name TEXT PRIMARY KEY,
//!     value TEXT NOT NULL
//! );
//! CREATE TABLE transients (
//!     name TEXT PRIMARY KEY,
//!     value TEXT NOT NULL,
//!     expires_at INTEGER NOT NULL   -- epoch seconds
//! );
//! ```
//!
//! Expired transients are removed lazily when read. Secrets are encrypted
//! before they reach this layer, so the database only ever holds ciphertext
//! for sensitive values.

use super::OptionStore;
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Option store backed by a SQLite database.
///
/// # Thread Safety
/// - Connection is wrapped in Mutex for safe concurrent access
/// - SQLite itself is thread-safe with serialized mode
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Creates or opens the store at `db_path`.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path).context("Failed to open database")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS options (
                name TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create options table")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS transients (
                name TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )",
            [],
        )
        .context("Failed to create transients table")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl OptionStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            "SELECT value FROM options WHERE name = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to read option")
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO options (name, value) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .context("Failed to write option")?;

        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute("DELETE FROM options WHERE name = ?1", params![key])
            .context("Failed to delete option")?;

        Ok(())
    }

    fn set_transient(&self, key: &str, value: &str, ttl_seconds: i64) -> Result<()> {
        let expires_at = Utc::now().timestamp() + ttl_seconds;

        self.conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO transients (name, value, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET
                    value = excluded.value,
                    expires_at = excluded.expires_at",
                params![key, value, expires_at],
            )
            .context("Failed to write transient")?;

        Ok(())
    }

    fn get_transient(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();

        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT value, expires_at FROM transients WHERE name = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("Failed to read transient")?;

        match row {
            Some((value, expires_at)) if Utc::now().timestamp() < expires_at => Ok(Some(value)),
            Some(_) => {
                // Lazy cleanup on read
                conn.execute("DELETE FROM transients WHERE name = ?1", params![key])
                    .context("Failed to delete expired transient")?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn delete_transient(&self, key: &str) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute("DELETE FROM transients WHERE name = ?1", params![key])
            .context("Failed to delete transient")?;

        Ok(())
    }
}
