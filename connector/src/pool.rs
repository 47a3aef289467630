//! Connection pool for one run.
//!
//! Handles are built lazily from the persisted credentials, at most once while
//! any handle exists, and in registration order. The pool is the only owner
//! of its connections; every operation that touches them borrows the pool
//! mutably, so at most one iteration can be in flight per pool.

use anyhow::{Context, Result};
use pryv_wdc::credentials::{CredentialVault, Credentials};
use pryv_wdc::AccessInfo;
use std::sync::Arc;
use tracing::{debug, info};

use crate::connection::{Connection, ConnectionFactory};
use crate::descriptor::{parse_descriptors, ConnectionDescriptor};
use crate::validator::{validate_all, ValidationReport};

/// Result of the one access probe of a handle.
#[derive(Clone, Debug, PartialEq)]
pub enum Validity {
    Unchecked,
    Valid(AccessInfo),
    Invalid(String),
}

/// One pooled connection and its validation state.
pub struct PooledConnection {
    descriptor: ConnectionDescriptor,
    connection: Box<dyn Connection>,
    validity: Validity,
}

impl PooledConnection {
    pub fn connection(&self) -> &dyn Connection {
        self.connection.as_ref()
    }

    pub fn username(&self) -> &str {
        self.descriptor.username()
    }

    pub fn validity(&self) -> &Validity {
        &self.validity
    }

    pub fn is_valid(&self) -> bool {
        matches!(self.validity, Validity::Valid(_))
    }

    pub(crate) fn set_validity(&mut self, validity: Validity) {
        self.validity = validity;
    }
}

pub struct ConnectionPool {
    vault: Arc<dyn CredentialVault>,
    factory: Arc<dyn ConnectionFactory>,
    handles: Vec<PooledConnection>,
    validation: Option<ValidationReport>,
    multi_connection: bool,
}

impl ConnectionPool {
    pub fn new(vault: Arc<dyn CredentialVault>, factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            vault,
            factory,
            handles: Vec::new(),
            validation: None,
            multi_connection: false,
        }
    }

    /// Resolves the pool.
    ///
    /// Returns the existing handles unchanged when there is at least one.
    /// Otherwise builds one connection per persisted endpoint; an empty slice
    /// means no credentials are stored yet.
    pub fn get(&mut self) -> Result<&[PooledConnection]> {
        if !self.handles.is_empty() {
            return Ok(&self.handles);
        }

        let Some(credentials) = self.vault.load().context("Failed to load credentials")? else {
            debug!("No persisted credentials");
            return Ok(&self.handles);
        };
        let endpoints = credentials.endpoints();
        if endpoints.is_empty() {
            return Ok(&self.handles);
        }

        let descriptors =
            parse_descriptors(&endpoints).context("Persisted endpoints are invalid")?;
        let mut handles = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let connection = self
                .factory
                .connect(&descriptor)
                .with_context(|| format!("Failed to connect to {}", descriptor.username()))?;
            handles.push(PooledConnection {
                descriptor,
                connection,
                validity: Validity::Unchecked,
            });
        }

        info!(count = handles.len(), "Connection pool built");
        self.handles = handles;
        self.multi_connection = credentials.is_multi_connection();
        self.validation = None;
        Ok(&self.handles)
    }

    /// Resolves the pool and probes every handle once per pool lifetime.
    pub async fn ensure_validated(&mut self) -> Result<ValidationReport> {
        self.get()?;
        if let Some(report) = &self.validation {
            return Ok(report.clone());
        }
        let report = validate_all(&mut self.handles).await;
        self.validation = Some(report.clone());
        Ok(report)
    }

    /// Handles in registration order, without resolving.
    pub fn handles(&self) -> &[PooledConnection] {
        &self.handles
    }

    /// True when rows carry a `username` column.
    pub fn multi_connection(&self) -> bool {
        self.multi_connection
    }

    /// Username of the persisted credential pair, if any.
    pub fn credentials_username(&self) -> Result<Option<String>> {
        Ok(self.vault.load()?.map(|c| c.username))
    }

    pub fn factory(&self) -> &Arc<dyn ConnectionFactory> {
        &self.factory
    }

    /// Persists a new endpoint list and drops the current handles so the next
    /// resolution uses it.
    pub fn save_descriptors(&mut self, descriptors: &[ConnectionDescriptor]) -> Result<()> {
        let endpoints: Vec<String> = descriptors
            .iter()
            .map(|d| d.api_endpoint().to_string())
            .collect();
        self.vault
            .save(&Credentials::for_endpoints(&endpoints))
            .context("Failed to save endpoints")?;
        self.clear();
        info!(count = endpoints.len(), "Endpoints saved");
        Ok(())
    }

    /// Clears the persisted credentials and empties the pool. Idempotent.
    pub fn reset(&mut self) -> Result<()> {
        self.vault.clear().context("Failed to clear credentials")?;
        self.clear();
        debug!("Connection pool reset");
        Ok(())
    }

    fn clear(&mut self) {
        self.handles.clear();
        self.validation = None;
        self.multi_connection = false;
    }
}
