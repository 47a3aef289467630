//! Encrypted credential storage using SQLite.
//!
//! One row per profile. The username is stored in clear (it is either the
//! endpoint-list sentinel or a public account name); the password, which
//! embeds access tokens, is sealed with AES-256-GCM.

use super::{encryption, CredentialVault, Credentials};
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Encrypted credential storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE credentials (
///     profile    TEXT PRIMARY KEY,
///     username   TEXT NOT NULL,
///     password   TEXT,              -- Sealed (nonce || ciphertext), optional
///     updated_at TEXT NOT NULL      -- RFC 3339 timestamp
/// );
/// ```
pub struct CredentialStore {
    conn: Mutex<Connection>,
    encryption_key: Vec<u8>,
}

impl CredentialStore {
    /// Creates or opens a credential store.
    ///
    /// # Arguments
    /// * `db_path` - Path to SQLite database file (`:memory:` for tests)
    /// * `encryption_key` - Base64-encoded 32-byte master key
    pub fn new<P: AsRef<Path>>(db_path: P, encryption_key: &str) -> Result<Self> {
        let key_bytes =
            encryption::validate_key(encryption_key).context("Invalid encryption key")?;

        let conn = Connection::open(db_path).context("Failed to open database")?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS credentials (
                profile TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                password TEXT,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )
        .context("Failed to create credentials table")?;

        Ok(Self {
            conn: Mutex::new(conn),
            encryption_key: key_bytes,
        })
    }

    /// Stores credentials for a profile, replacing any previous pair.
    pub fn save(&self, profile: &str, credentials: &Credentials) -> Result<()> {
        let sealed = credentials
            .password
            .as_deref()
            .map(|p| encryption::seal(p, &self.encryption_key))
            .transpose()
            .context("Failed to encrypt password")?;

        self.conn
            .lock()
            .unwrap()
            .execute(
                r#"
                INSERT INTO credentials (profile, username, password, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(profile) DO UPDATE SET
                    username = excluded.username,
                    password = excluded.password,
                    updated_at = excluded.updated_at
                "#,
                params![profile, credentials.username, sealed, Utc::now().to_rfc3339()],
            )
            .context("Failed to store credentials")?;

        Ok(())
    }

    /// Retrieves and decrypts the credentials of a profile.
    pub fn load(&self, profile: &str) -> Result<Option<Credentials>> {
        let row: Option<(String, Option<String>)> = self
            .conn
            .lock()
            .unwrap()
            .query_row(
                "SELECT username, password FROM credentials WHERE profile = ?1",
                params![profile],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("Failed to query credentials")?;

        let Some((username, sealed)) = row else {
            return Ok(None);
        };

        let password = sealed
            .map(|s| encryption::open(&s, &self.encryption_key))
            .transpose()
            .context("Failed to decrypt password")?;

        Ok(Some(Credentials { username, password }))
    }

    /// Deletes a profile. Returns `false` if nothing was stored.
    pub fn delete(&self, profile: &str) -> Result<bool> {
        let rows_affected = self
            .conn
            .lock()
            .unwrap()
            .execute(
                "DELETE FROM credentials WHERE profile = ?1",
                params![profile],
            )
            .context("Failed to delete credentials")?;

        Ok(rows_affected > 0)
    }
}

/// [`CredentialVault`] view of one profile of a [`CredentialStore`].
#[derive(Clone)]
pub struct ProfileVault {
    store: Arc<CredentialStore>,
    profile: String,
}

impl ProfileVault {
    pub fn new(store: Arc<CredentialStore>, profile: impl Into<String>) -> Self {
        Self {
            store,
            profile: profile.into(),
        }
    }
}

impl CredentialVault for ProfileVault {
    fn load(&self) -> Result<Option<Credentials>> {
        self.store.load(&self.profile)
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        self.store.save(&self.profile, credentials)
    }

    fn clear(&self) -> Result<()> {
        self.store.delete(&self.profile).map(|_| ())
    }
}
