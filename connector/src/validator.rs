//! Access probes for pooled connections.
//!
//! Every handle is probed concurrently; each probe writes only its own
//! handle's validity. A failing handle is recorded and kept in the pool.

use anyhow::Result;
use futures::future::join_all;
use pryv_wdc::AccessInfo;
use tracing::{info, warn};

use crate::pool::{PooledConnection, Validity};

/// A connection whose access probe failed.
#[derive(Clone, Debug, PartialEq)]
pub struct InvalidConnection {
    pub username: String,
    pub reason: String,
}

/// Aggregated outcome of validating a pool.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationReport {
    pub valid: usize,
    pub invalid: Vec<InvalidConnection>,
}

impl ValidationReport {
    /// True when there were connections and none of them is usable.
    pub fn all_invalid(&self) -> bool {
        self.valid == 0 && !self.invalid.is_empty()
    }

    /// Single user-visible message for all failed probes.
    pub fn failure_message(&self) -> Option<String> {
        if self.invalid.is_empty() {
            return None;
        }
        let details: Vec<String> = self
            .invalid
            .iter()
            .map(|c| format!("{} ({})", c.username, c.reason))
            .collect();
        Some(format!("Invalid connection(s): {}", details.join(", ")))
    }
}

/// Probes every handle concurrently, results in handle order.
pub async fn probe_all(handles: &[PooledConnection]) -> Vec<Result<AccessInfo>> {
    join_all(handles.iter().map(|h| h.connection().access_info())).await
}

/// Probes every handle and records its validity.
pub async fn validate_all(handles: &mut [PooledConnection]) -> ValidationReport {
    let results = probe_all(handles).await;
    let mut report = ValidationReport::default();

    for (handle, result) in handles.iter_mut().zip(results) {
        match result {
            Ok(access) => {
                info!(
                    username = %handle.username(),
                    access = %access.display_name(),
                    "Connection valid"
                );
                report.valid += 1;
                handle.set_validity(Validity::Valid(access));
            }
            Err(e) => {
                warn!(username = %handle.username(), error = %e, "Connection invalid");
                report.invalid.push(InvalidConnection {
                    username: handle.username().to_string(),
                    reason: e.to_string(),
                });
                handle.set_validity(Validity::Invalid(e.to_string()));
            }
        }
    }

    report
}
