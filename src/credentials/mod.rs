//! Persisted endpoint credentials.
//!
//! The host persists a single username/password pair between phases. In
//! multi-connection mode the username is the [`API_ENDPOINTS_USERNAME`]
//! sentinel and the password is the comma-joined list of API endpoints. Any
//! other username means a single connection whose endpoint is the password.
//!
//! Two vaults are provided: [`MemoryVault`] for hosts that keep credentials
//! themselves, and [`ProfileVault`] over the encrypted SQLite
//! [`CredentialStore`].

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

mod encryption;
mod storage;

pub use encryption::{open, seal, validate_key};
pub use storage::{CredentialStore, ProfileVault};

/// Username under which a list of API endpoints is stored.
pub const API_ENDPOINTS_USERNAME: &str = "Pryv ApiEndpoints";

/// Username/password pair persisted by the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl Credentials {
    /// Encodes an endpoint list. An empty list clears the password.
    pub fn for_endpoints(endpoints: &[String]) -> Self {
        Self {
            username: API_ENDPOINTS_USERNAME.to_string(),
            password: if endpoints.is_empty() {
                None
            } else {
                Some(endpoints.join(","))
            },
        }
    }

    /// True when the pair encodes an endpoint list.
    pub fn is_multi_connection(&self) -> bool {
        self.username == API_ENDPOINTS_USERNAME
    }

    /// Endpoints encoded in the password, in registration order.
    pub fn endpoints(&self) -> Vec<String> {
        let Some(password) = self.password.as_deref() else {
            return Vec::new();
        };
        if self.is_multi_connection() {
            password
                .split(',')
                .filter(|e| !e.is_empty())
                .map(str::to_string)
                .collect()
        } else if password.is_empty() {
            Vec::new()
        } else {
            vec![password.to_string()]
        }
    }
}

/// Read/write access to the persisted credential pair.
pub trait CredentialVault: Send + Sync {
    fn load(&self) -> Result<Option<Credentials>>;

    fn save(&self, credentials: &Credentials) -> Result<()>;

    /// Forgets the stored pair. Idempotent.
    fn clear(&self) -> Result<()>;
}

/// Vault kept in memory.
#[derive(Debug, Default)]
pub struct MemoryVault {
    credentials: Mutex<Option<Credentials>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            credentials: Mutex::new(Some(credentials)),
        }
    }
}

impl CredentialVault for MemoryVault {
    fn load(&self) -> Result<Option<Credentials>> {
        Ok(self.credentials.lock().unwrap().clone())
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        *self.credentials.lock().unwrap() = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.credentials.lock().unwrap() = None;
        Ok(())
    }
}
